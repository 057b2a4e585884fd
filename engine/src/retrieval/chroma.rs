//! Chroma REST client
//!
//! Talks to a Chroma server over its v1 HTTP API. Collections are addressed
//! by name in configuration and resolved to their server-side id on first use.

use super::{CollectionBackend, MetadataFilter, RawHit};
use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::ChunkMetadata;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::sync::OnceCell;

fn store_error(base_url: &str, e: reqwest::Error) -> EngineError {
    if e.is_connect() || e.is_timeout() {
        EngineError::VectorStoreUnavailable(format!("{}: {}", base_url, e))
    } else {
        EngineError::Network(e.to_string())
    }
}

async fn read_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
    what: &str,
) -> Result<T, EngineError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EngineError::Network(format!(
            "{} returned {}: {}",
            what, status, body
        )));
    }
    response
        .json()
        .await
        .map_err(|e| EngineError::Network(format!("{} returned malformed JSON: {}", what, e)))
}

/// Server-level operations: heartbeat, listing, opening collections
#[derive(Debug, Clone)]
pub struct ChromaClient {
    base_url: String,
    client: reqwest::Client,
}

impl ChromaClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Network(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub async fn heartbeat(&self) -> Result<(), EngineError> {
        let response = self
            .client
            .get(format!("{}/api/v1/heartbeat", self.base_url))
            .send()
            .await
            .map_err(|e| store_error(&self.base_url, e))?;

        read_json::<Value>(response, "heartbeat").await.map(|_| ())
    }

    pub async fn list_collections(&self) -> Result<Vec<String>, EngineError> {
        #[derive(Deserialize)]
        struct Entry {
            name: String,
        }

        let response = self
            .client
            .get(format!("{}/api/v1/collections", self.base_url))
            .send()
            .await
            .map_err(|e| store_error(&self.base_url, e))?;

        let entries: Vec<Entry> = read_json(response, "list collections").await?;
        Ok(entries.into_iter().map(|e| e.name).collect())
    }

    /// Handle on a named collection. Nothing is fetched until first use.
    pub fn collection(&self, name: impl Into<String>) -> ChromaCollection {
        ChromaCollection {
            base_url: self.base_url.clone(),
            client: self.client.clone(),
            name: name.into(),
            id: OnceCell::new(),
        }
    }
}

/// One Chroma collection
#[derive(Debug)]
pub struct ChromaCollection {
    base_url: String,
    client: reqwest::Client,
    name: String,
    id: OnceCell<String>,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Value>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f64>>>>,
}

#[derive(Debug, Default, Deserialize)]
struct GetResponse {
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default)]
    documents: Option<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Option<Vec<Option<Value>>>,
}

impl ChromaCollection {
    async fn collection_id(&self) -> Result<&str, EngineError> {
        self.id
            .get_or_try_init(|| async {
                let response = self
                    .client
                    .get(format!("{}/api/v1/collections/{}", self.base_url, self.name))
                    .send()
                    .await
                    .map_err(|e| store_error(&self.base_url, e))?;

                let info: CollectionInfo = read_json(response, "get collection")
                    .await
                    .map_err(|e| self.query_error(e))?;
                tracing::debug!("Resolved collection '{}' to id {}", self.name, info.id);
                Ok(info.id)
            })
            .await
            .map(String::as_str)
    }

    fn query_error(&self, e: EngineError) -> EngineError {
        match e {
            EngineError::VectorStoreUnavailable(_) => e,
            other => EngineError::CollectionQuery {
                collection: self.name.clone(),
                reason: other.to_string(),
            },
        }
    }

    async fn post(&self, endpoint: &str, body: Value) -> Result<reqwest::Response, EngineError> {
        let id = self.collection_id().await?;
        self.client
            .post(format!(
                "{}/api/v1/collections/{}/{}",
                self.base_url, id, endpoint
            ))
            .json(&body)
            .send()
            .await
            .map_err(|e| store_error(&self.base_url, e))
    }
}

fn where_clause(body: &mut Value, filter: Option<&MetadataFilter>) {
    if let Some(f) = filter {
        let clause = f.to_chroma_where();
        if clause.as_object().is_some_and(|o| !o.is_empty()) {
            body["where"] = clause;
        }
    }
}

#[async_trait]
impl CollectionBackend for ChromaCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RawHit>, EngineError> {
        let mut body = json!({
            "query_embeddings": [embedding],
            "n_results": k,
            "include": ["documents", "metadatas", "distances"]
        });
        where_clause(&mut body, filter);

        let response = self.post("query", body).await?;
        let parsed: QueryResponse = read_json(response, "query")
            .await
            .map_err(|e| self.query_error(e))?;

        let ids = parsed.ids.into_iter().next().unwrap_or_default();
        let documents = parsed
            .documents
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();
        let metadatas = parsed
            .metadatas
            .and_then(|m| m.into_iter().next())
            .unwrap_or_default();
        let distances = parsed
            .distances
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();

        Ok(ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| RawHit {
                id,
                text: documents.get(i).cloned().flatten().unwrap_or_default(),
                metadata: metadata_from_value(metadatas.get(i).cloned().flatten()),
                distance: Some(distances.get(i).copied().flatten().unwrap_or(f64::MAX)),
            })
            .collect())
    }

    async fn get(
        &self,
        filter: Option<&MetadataFilter>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<RawHit>, EngineError> {
        let mut body = json!({
            "offset": offset,
            "limit": limit,
            "include": ["documents", "metadatas"]
        });
        where_clause(&mut body, filter);

        let response = self.post("get", body).await?;
        let parsed: GetResponse = read_json(response, "get")
            .await
            .map_err(|e| self.query_error(e))?;

        let documents = parsed.documents.unwrap_or_default();
        let metadatas = parsed.metadatas.unwrap_or_default();

        Ok(parsed
            .ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| RawHit {
                id,
                text: documents.get(i).cloned().flatten().unwrap_or_default(),
                metadata: metadata_from_value(metadatas.get(i).cloned().flatten()),
                distance: None,
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), EngineError> {
        self.collection_id().await.map(|_| ())
    }
}

/// Chroma stores metadata as flat scalars; line numbers may come back as
/// floats or strings depending on the ingestion pipeline.
fn metadata_from_value(value: Option<Value>) -> ChunkMetadata {
    let map = match value {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };

    let text = |keys: &[&str]| {
        keys.iter().find_map(|k| match map.get(*k) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    };
    let line = |key: &str| match map.get(key) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    };

    ChunkMetadata {
        path: text(&["path", "file_path"]).unwrap_or_default(),
        symbol_name: text(&["symbol_name", "symbol"]),
        class_name: text(&["class_name"]),
        method_name: text(&["method_name"]),
        start_line: line("start_line"),
        end_line: line("end_line"),
        chunk_type: text(&["chunk_type"]),
        language: text(&["language"]),
        content_hash: text(&["content_hash"]),
    }
}
