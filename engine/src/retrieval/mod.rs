//! Retrieval Adapter
//!
//! Presents one logical code store over several independently maintained
//! vector-store collections.
//!
//! # Architecture
//!
//! - [`CollectionBackend`]: one collection (Chroma over HTTP, or in memory)
//! - [`MultiCollectionStore`]: fans a query out to every backend concurrently,
//!   unions the results, reassembles split code units and ranks them
//! - [`CodeRetriever`]: the query surface the tools consume
//!
//! A single collection's failure is logged and contributes nothing; it never
//! aborts the overall query.

pub mod chroma;
pub mod filter;
pub mod in_memory;
pub mod reconstruct;

pub use chroma::{ChromaClient, ChromaCollection};
pub use filter::{path_filter, MetadataFilter, SearchFilter};
pub use in_memory::InMemoryCollection;
pub use reconstruct::reconstruct;

use crate::llm::embedding::Embedder;
use async_trait::async_trait;
use futures::future::join_all;
use regex::RegexBuilder;
use sdk::errors::EngineError;
use sdk::types::{ChunkMetadata, FileContent, SearchHit};
use std::cmp::Ordering;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// A chunk as returned by a backend, before scoring
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,

    /// Present for nearest-neighbour queries
    pub distance: Option<f64>,
}

/// One vector-store collection
#[async_trait]
pub trait CollectionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Nearest neighbours of `embedding`, closest first
    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RawHit>, EngineError>;

    /// Chunks matching `filter`, in storage order, skipping the first `offset`
    async fn get(
        &self,
        filter: Option<&MetadataFilter>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<RawHit>, EngineError>;

    /// Whether the collection is reachable
    async fn ping(&self) -> Result<(), EngineError>;
}

/// The query surface consumed by the retrieval tools
#[async_trait]
pub trait CodeRetriever: Send + Sync {
    /// Chunks whose symbol, class or method name contains `name`
    async fn search_by_symbol(
        &self,
        name: &str,
        path_filters: &[String],
    ) -> Result<Vec<SearchHit>, EngineError>;

    /// Every chunk of `path`, concatenated in line order
    async fn get_file(&self, path: &str) -> Result<FileContent, EngineError>;

    /// Chunks whose text matches `pattern`
    async fn regex_search(
        &self,
        pattern: &str,
        path_filters: &[String],
    ) -> Result<Vec<SearchHit>, EngineError>;

    /// Top-`k` chunks by embedding similarity, across all collections
    async fn semantic_search(
        &self,
        query: &str,
        k: Option<usize>,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>, EngineError>;

    async fn health_check(&self) -> bool;

    fn list_collections(&self) -> Vec<String>;
}

/// Convert a backend distance into a similarity in `(0, 1]`
pub fn similarity_from_distance(distance: f64) -> f64 {
    1.0 / (1.0 + distance.max(0.0))
}

/// Ranking order: score descending, then path, start line, collection and
/// chunk id so that equal scores still sort deterministically.
pub fn rank_order(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.metadata.path.cmp(&b.metadata.path))
        .then_with(|| a.metadata.start_line.cmp(&b.metadata.start_line))
        .then_with(|| a.collection.cmp(&b.collection))
        .then_with(|| a.chunk_id.cmp(&b.chunk_id))
}

fn to_hit(raw: RawHit, collection: &str) -> SearchHit {
    let (score, distance) = match raw.distance {
        Some(d) => (similarity_from_distance(d), Some(d)),
        None => (1.0, None),
    };
    SearchHit {
        chunk_id: raw.id,
        text: raw.text,
        score,
        distance,
        metadata: raw.metadata,
        collection: collection.to_string(),
    }
}

/// Tuning for [`MultiCollectionStore`]
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Default K for semantic search
    pub top_k: usize,

    /// Page size used when symbol, regex and file lookups scan a collection
    pub page_size: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            page_size: 500,
        }
    }
}

/// One logical store over several collections
pub struct MultiCollectionStore {
    backends: Vec<Arc<dyn CollectionBackend>>,
    embedder: Arc<dyn Embedder>,
    options: StoreOptions,
}

impl MultiCollectionStore {
    pub fn new(
        backends: Vec<Arc<dyn CollectionBackend>>,
        embedder: Arc<dyn Embedder>,
        options: StoreOptions,
    ) -> Self {
        Self {
            backends,
            embedder,
            options,
        }
    }

    /// Run `op` against every selected backend concurrently.
    ///
    /// Failed collections are logged and contribute nothing. Results keep
    /// backend order.
    async fn fan_out<'a, F, Fut>(
        &'a self,
        operation: &str,
        include: impl Fn(&str) -> bool,
        op: F,
    ) -> Vec<SearchHit>
    where
        F: Fn(&'a Arc<dyn CollectionBackend>) -> Fut,
        Fut: Future<Output = Result<Vec<SearchHit>, EngineError>>,
    {
        let selected: Vec<&Arc<dyn CollectionBackend>> = self
            .backends
            .iter()
            .filter(|b| include(b.name()))
            .collect();

        let results = join_all(selected.iter().map(|backend| op(*backend))).await;

        let mut hits = Vec::new();
        for (backend, result) in selected.iter().zip(results) {
            match result {
                Ok(found) => {
                    debug!(
                        "{}: collection '{}' returned {} hits",
                        operation,
                        backend.name(),
                        found.len()
                    );
                    hits.extend(found);
                }
                Err(e) => {
                    warn!(
                        "{}: collection '{}' failed, skipping it: {}",
                        operation,
                        backend.name(),
                        e
                    );
                }
            }
        }
        hits
    }

    /// Scan every chunk matching the native part of `filter`, one page at a
    /// time, and apply the residue locally.
    ///
    /// A short page ends the scan.
    async fn filtered_get(
        backend: &Arc<dyn CollectionBackend>,
        filter: Option<MetadataFilter>,
        page_size: usize,
    ) -> Result<Vec<SearchHit>, EngineError> {
        let (native, residue) = match filter {
            Some(f) => f.split_native(),
            None => (None, None),
        };
        let page_size = page_size.max(1);

        let mut hits = Vec::new();
        let mut offset = 0;
        let mut pages = 0;
        loop {
            let page = backend.get(native.as_ref(), offset, page_size).await?;
            let fetched = page.len();
            pages += 1;
            hits.extend(
                page.into_iter()
                    .filter(|r| residue.as_ref().map_or(true, |f| f.matches(&r.metadata)))
                    .map(|r| to_hit(r, backend.name())),
            );

            offset += fetched;
            if fetched < page_size {
                break;
            }
        }

        if pages > 1 {
            debug!(
                "Scanned {} chunks of '{}' in {} pages",
                offset,
                backend.name(),
                pages
            );
        }
        Ok(hits)
    }
}

#[async_trait]
impl CodeRetriever for MultiCollectionStore {
    async fn search_by_symbol(
        &self,
        name: &str,
        path_filters: &[String],
    ) -> Result<Vec<SearchHit>, EngineError> {
        let name_filter = MetadataFilter::Or(vec![
            MetadataFilter::contains("symbol_name", name),
            MetadataFilter::contains("class_name", name),
            MetadataFilter::contains("method_name", name),
        ]);
        let filter = MetadataFilter::all(
            path_filter(path_filters)
                .into_iter()
                .chain(std::iter::once(name_filter))
                .collect(),
        );
        let page_size = self.options.page_size;

        let hits = self
            .fan_out(
                "symbol_search",
                |_| true,
                |backend| Self::filtered_get(backend, filter.clone(), page_size),
            )
            .await;

        Ok(reconstruct(hits))
    }

    async fn get_file(&self, path: &str) -> Result<FileContent, EngineError> {
        let filter = Some(MetadataFilter::eq("path", path));
        let page_size = self.options.page_size;

        let mut chunks = self
            .fan_out(
                "get_file",
                |_| true,
                |backend| Self::filtered_get(backend, filter.clone(), page_size),
            )
            .await;

        if chunks.is_empty() {
            return Err(EngineError::FileNotFound(path.to_string()));
        }

        chunks.sort_by_key(|h| (h.metadata.start_line, h.metadata.end_line));
        let text = chunks
            .iter()
            .map(|h| h.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(FileContent {
            path: path.to_string(),
            text,
        })
    }

    async fn regex_search(
        &self,
        pattern: &str,
        path_filters: &[String],
    ) -> Result<Vec<SearchHit>, EngineError> {
        let regex = RegexBuilder::new(pattern)
            .size_limit(1 << 20)
            .build()
            .map_err(|e| EngineError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        let filter = path_filter(path_filters);
        let page_size = self.options.page_size;

        let hits = self
            .fan_out(
                "regex_search",
                |_| true,
                |backend| Self::filtered_get(backend, filter.clone(), page_size),
            )
            .await;

        Ok(reconstruct(
            hits.into_iter().filter(|h| regex.is_match(&h.text)).collect(),
        ))
    }

    async fn semantic_search(
        &self,
        query: &str,
        k: Option<usize>,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>, EngineError> {
        let k = k.unwrap_or(self.options.top_k).max(1);
        let embedding = self.embedder.embed(query).await?;

        let (native, residue) = match filter.metadata.clone() {
            Some(f) => f.split_native(),
            None => (None, None),
        };

        let hits = self
            .fan_out(
                "semantic_search",
                |name| filter.includes_collection(name),
                |backend| {
                    let embedding = &embedding;
                    let native = native.as_ref();
                    let residue = residue.as_ref();
                    async move {
                        let raw = backend.query(embedding, k, native).await?;
                        Ok(raw
                            .into_iter()
                            .filter(|r| residue.map_or(true, |f| f.matches(&r.metadata)))
                            .map(|r| to_hit(r, backend.name()))
                            .collect())
                    }
                },
            )
            .await;

        let mut merged = reconstruct(hits);
        merged.sort_by(rank_order);
        merged.truncate(k);
        Ok(merged)
    }

    /// True when at least one collection answers. The others are logged and
    /// contribute nothing to later queries.
    async fn health_check(&self) -> bool {
        let results = join_all(self.backends.iter().map(|b| b.ping())).await;

        let mut healthy = false;
        for (backend, result) in self.backends.iter().zip(results) {
            match result {
                Ok(()) => healthy = true,
                Err(e) => warn!("Collection '{}' is unavailable: {}", backend.name(), e),
            }
        }
        healthy
    }

    fn list_collections(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }
}
