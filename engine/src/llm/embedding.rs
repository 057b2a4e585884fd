//! Embedding providers
//!
//! Queries must be embedded with the same model the collections were indexed
//! with; `[embedding].model` names it. The same embedder feeds the answer cache
//! in conversation memory.

use super::{check_status, map_transport_error, LLMError};
use crate::config::Config;
use crate::secrets::SecretString;
use async_trait::async_trait;
use sdk::errors::EngineError;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Turns text into a dense vector
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, for logging
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError>;
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client, EngineError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| EngineError::Embedding(e.to_string()))
}

fn parse_vector(value: Option<&Value>) -> Result<Vec<f32>, EngineError> {
    let values = value
        .and_then(|v| v.as_array())
        .ok_or_else(|| EngineError::Embedding("response carries no embedding".to_string()))?;

    let vector: Vec<f32> = values
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect();

    if vector.is_empty() || vector.len() != values.len() {
        return Err(EngineError::Embedding(
            "embedding is empty or not numeric".to_string(),
        ));
    }
    Ok(vector)
}

fn embedding_error(e: LLMError) -> EngineError {
    EngineError::Embedding(crate::secrets::scrub_secrets(&e.to_string()))
}

/// OpenAI `/embeddings`
pub struct OpenAIEmbedder {
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    client: reqwest::Client,
}

impl OpenAIEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<SecretString>,
        timeout_secs: u64,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            client: http_client(timeout_secs)?,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| EngineError::Embedding("no OpenAI API key".to_string()))?;

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", api_key.unsecure()))
            .json(&json!({"model": self.model, "input": text}))
            .send()
            .await
            .map_err(|e| embedding_error(map_transport_error("OpenAI", &self.base_url, e)))?;

        let data: Value = check_status(response)
            .await
            .map_err(embedding_error)?
            .json()
            .await
            .map_err(|e| EngineError::Embedding(e.to_string()))?;

        parse_vector(data.pointer("/data/0/embedding"))
    }
}

/// Ollama `/api/embed`
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            base_url: base_url.into(),
            model: model.into(),
            client: http_client(timeout_secs)?,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&json!({"model": self.model, "input": text}))
            .send()
            .await
            .map_err(|e| embedding_error(map_transport_error("Ollama", &self.base_url, e)))?;

        let data: Value = check_status(response)
            .await
            .map_err(embedding_error)?
            .json()
            .await
            .map_err(|e| EngineError::Embedding(e.to_string()))?;

        parse_vector(data.pointer("/embeddings/0"))
    }
}

/// Build the embedder selected by `[embedding]`.
///
/// The base URL falls back to the matching `[llm.*]` section so a single
/// Ollama or OpenAI endpoint needs configuring only once.
pub fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>, EngineError> {
    let embedding = &config.embedding;
    let embedder: Arc<dyn Embedder> = match embedding.provider.as_str() {
        "openai" => Arc::new(OpenAIEmbedder::new(
            embedding
                .base_url
                .clone()
                .unwrap_or_else(|| config.llm.openai.base_url.clone()),
            embedding.model.clone(),
            config.llm.openai.api_key.clone(),
            config.llm.openai.request_timeout_secs,
        )?),
        "ollama" => Arc::new(OllamaEmbedder::new(
            embedding
                .base_url
                .clone()
                .unwrap_or_else(|| config.llm.ollama.base_url.clone()),
            embedding.model.clone(),
            config.llm.ollama.request_timeout_secs,
        )?),
        other => {
            return Err(EngineError::Config(format!(
                "unknown embedding provider '{}'",
                other
            )))
        }
    };

    tracing::debug!("Using embedding model {}", embedder.model());
    Ok(embedder)
}
