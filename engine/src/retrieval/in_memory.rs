//! In-process collection
//!
//! Brute-force nearest neighbour search over chunks held in memory, using the
//! same squared-L2 distance Chroma reports by default. Used by tests and for
//! small offline corpora.

use super::{CollectionBackend, MetadataFilter, RawHit};
use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::ChunkMetadata;
use sha2::{Digest, Sha256};
use std::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredChunk {
    id: String,
    text: String,
    embedding: Vec<f32>,
    metadata: ChunkMetadata,
}

#[derive(Debug)]
pub struct InMemoryCollection {
    name: String,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// Store a chunk. A missing content hash is filled with the text's SHA-256.
    pub fn add(
        &self,
        id: impl Into<String>,
        text: impl Into<String>,
        embedding: Vec<f32>,
        mut metadata: ChunkMetadata,
    ) {
        let text = text.into();
        if metadata.content_hash.is_none() {
            metadata.content_hash = Some(hex::encode(Sha256::digest(text.as_bytes())));
        }

        self.chunks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(StoredChunk {
                id: id.into(),
                text,
                embedding,
                metadata,
            });
    }

    pub fn len(&self) -> usize {
        self.chunks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matching(&self, filter: Option<&MetadataFilter>) -> Vec<StoredChunk> {
        self.chunks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|c| filter.map_or(true, |f| f.matches(&c.metadata)))
            .cloned()
            .collect()
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum()
}

#[async_trait]
impl CollectionBackend for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RawHit>, EngineError> {
        let candidates = self.matching(filter);

        if let Some(bad) = candidates
            .iter()
            .find(|c| c.embedding.len() != embedding.len())
        {
            return Err(EngineError::CollectionQuery {
                collection: self.name.clone(),
                reason: format!(
                    "chunk {} has dimension {}, query has {}",
                    bad.id,
                    bad.embedding.len(),
                    embedding.len()
                ),
            });
        }

        let mut scored: Vec<(f64, StoredChunk)> = candidates
            .into_iter()
            .map(|c| (squared_l2(&c.embedding, embedding), c))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, c)| RawHit {
                id: c.id,
                text: c.text,
                metadata: c.metadata,
                distance: Some(distance),
            })
            .collect())
    }

    async fn get(
        &self,
        filter: Option<&MetadataFilter>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<RawHit>, EngineError> {
        Ok(self
            .matching(filter)
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|c| RawHit {
                id: c.id,
                text: c.text,
                metadata: c.metadata,
                distance: None,
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), EngineError> {
        Ok(())
    }
}
