//! Retrieval tools
//!
//! Thin wrappers over [`CodeRetriever`](crate::retrieval::CodeRetriever).
//! Every hit is rendered with its `path:start-end` location so the model can
//! cite it verbatim.

use super::{ToolContext, TypedTool};
use crate::retrieval::{path_filter, MetadataFilter, SearchFilter};
use async_trait::async_trait;
use schemars::JsonSchema;
use sdk::errors::EngineError;
use sdk::types::{SearchHit, ToolError};
use serde::Deserialize;
use serde_json::{json, Value};

fn execution_failed(tool: &str, e: EngineError) -> ToolError {
    ToolError::ExecutionFailed {
        tool: tool.to_string(),
        reason: e.to_string(),
    }
}

fn hit_view(hit: &SearchHit) -> Value {
    let meta = &hit.metadata;
    let mut view = json!({
        "location": hit.location(),
        "collection": hit.collection,
        "score": (hit.score * 1000.0).round() / 1000.0,
        "text": hit.text,
    });
    for (key, value) in [
        ("symbol_name", &meta.symbol_name),
        ("class_name", &meta.class_name),
        ("method_name", &meta.method_name),
        ("chunk_type", &meta.chunk_type),
        ("language", &meta.language),
    ] {
        if let Some(v) = value {
            view[key] = Value::String(v.clone());
        }
    }
    view
}

fn hits_payload(hits: &[SearchHit]) -> Value {
    json!({
        "count": hits.len(),
        "hits": hits.iter().map(hit_view).collect::<Vec<_>>()
    })
}

fn non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("`{}` must not be empty", field))
    } else {
        Ok(())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SymbolSearchArgs {
    /// Symbol, class or method name (case-insensitive substring)
    pub name: String,

    /// Restrict to these exact file paths
    #[serde(default)]
    pub path_filters: Vec<String>,
}

pub struct SymbolSearchTool;

#[async_trait]
impl TypedTool for SymbolSearchTool {
    type Args = SymbolSearchArgs;

    const NAME: &'static str = "symbol_search";
    const DESCRIPTION: &'static str =
        "Find classes, methods and functions whose name contains the given text.";

    fn check(&self, args: &Self::Args) -> Result<(), String> {
        non_empty("name", &args.name)
    }

    async fn execute(&self, ctx: &ToolContext, args: Self::Args) -> Result<Value, ToolError> {
        let hits = ctx
            .retriever
            .search_by_symbol(&args.name, &args.path_filters)
            .await
            .map_err(|e| execution_failed(Self::NAME, e))?;
        Ok(hits_payload(&hits))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetFileArgs {
    /// Path exactly as it appears in hit locations
    pub path: String,
}

pub struct GetFileTool;

#[async_trait]
impl TypedTool for GetFileTool {
    type Args = GetFileArgs;

    const NAME: &'static str = "get_file";
    const DESCRIPTION: &'static str =
        "Return the full indexed text of one file, reassembled from all of its chunks.";

    fn check(&self, args: &Self::Args) -> Result<(), String> {
        non_empty("path", &args.path)
    }

    async fn execute(&self, ctx: &ToolContext, args: Self::Args) -> Result<Value, ToolError> {
        let file = ctx
            .retriever
            .get_file(&args.path)
            .await
            .map_err(|e| execution_failed(Self::NAME, e))?;
        Ok(json!({"path": file.path, "text": file.text}))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RegexSearchArgs {
    /// Regular expression matched against chunk text; prefix with (?i) for case-insensitive
    pub pattern: String,

    /// Restrict to these exact file paths
    #[serde(default)]
    pub path_filters: Vec<String>,
}

pub struct RegexSearchTool;

#[async_trait]
impl TypedTool for RegexSearchTool {
    type Args = RegexSearchArgs;

    const NAME: &'static str = "regex_search";
    const DESCRIPTION: &'static str =
        "Find chunks whose text matches a regular expression. Best for exact identifiers and string literals.";

    fn check(&self, args: &Self::Args) -> Result<(), String> {
        non_empty("pattern", &args.pattern)
    }

    async fn execute(&self, ctx: &ToolContext, args: Self::Args) -> Result<Value, ToolError> {
        let hits = ctx
            .retriever
            .regex_search(&args.pattern, &args.path_filters)
            .await
            .map_err(|e| execution_failed(Self::NAME, e))?;
        Ok(hits_payload(&hits))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SemanticSearchArgs {
    /// Natural-language description of the code you are looking for
    pub query: String,

    /// Number of results across all collections (1-100)
    #[serde(default)]
    pub k: Option<usize>,

    /// Only search these collections
    #[serde(default)]
    pub collections: Option<Vec<String>>,

    /// Restrict to these exact file paths
    #[serde(default)]
    pub path_filters: Vec<String>,

    /// Restrict to these languages, e.g. "python"
    #[serde(default)]
    pub languages: Vec<String>,

    /// Restrict to these chunk types, e.g. "class", "method"
    #[serde(default)]
    pub chunk_types: Vec<String>,
}

impl SemanticSearchArgs {
    fn filter(&self) -> SearchFilter {
        let mut parts: Vec<MetadataFilter> = Vec::new();
        parts.extend(path_filter(&self.path_filters));
        if !self.languages.is_empty() {
            parts.push(MetadataFilter::one_of("language", self.languages.clone()));
        }
        if !self.chunk_types.is_empty() {
            parts.push(MetadataFilter::one_of("chunk_type", self.chunk_types.clone()));
        }

        SearchFilter {
            collections: self.collections.clone(),
            metadata: MetadataFilter::all(parts),
        }
    }
}

pub struct SemanticSearchTool;

#[async_trait]
impl TypedTool for SemanticSearchTool {
    type Args = SemanticSearchArgs;

    const NAME: &'static str = "semantic_search";
    const DESCRIPTION: &'static str =
        "Find code by meaning across all collections, ranked by similarity.";

    fn check(&self, args: &Self::Args) -> Result<(), String> {
        non_empty("query", &args.query)?;
        match args.k {
            Some(k) if !(1..=100).contains(&k) => Err("`k` must be between 1 and 100".to_string()),
            _ => Ok(()),
        }
    }

    async fn execute(&self, ctx: &ToolContext, args: Self::Args) -> Result<Value, ToolError> {
        let filter = args.filter();
        let hits = ctx
            .retriever
            .semantic_search(&args.query, args.k, &filter)
            .await
            .map_err(|e| execution_failed(Self::NAME, e))?;
        Ok(hits_payload(&hits))
    }
}
