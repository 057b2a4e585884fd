//! Retrieval and tool types shared between the engine and its tests

use serde::{Deserialize, Serialize};

/// Location and identity metadata attached to every indexed chunk.
///
/// Field names follow the ingestion pipeline's metadata keys; the aliases
/// accept the older `file_path` / `symbol` spellings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    #[serde(alias = "file_path")]
    pub path: String,

    #[serde(default, alias = "symbol", skip_serializing_if = "Option::is_none")]
    pub symbol_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_name: Option<String>,

    #[serde(default)]
    pub start_line: u32,

    #[serde(default)]
    pub end_line: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl ChunkMetadata {
    /// Look up a metadata field by its key, as used by metadata filters.
    pub fn field(&self, key: &str) -> Option<String> {
        match key {
            "path" => Some(self.path.clone()),
            "symbol_name" => self.symbol_name.clone(),
            "class_name" => self.class_name.clone(),
            "method_name" => self.method_name.clone(),
            "start_line" => Some(self.start_line.to_string()),
            "end_line" => Some(self.end_line.to_string()),
            "chunk_type" => self.chunk_type.clone(),
            "language" => self.language.clone(),
            "content_hash" => self.content_hash.clone(),
            _ => None,
        }
    }

    /// `path:start-end`, the citation form used in answers.
    pub fn location(&self) -> String {
        format!("{}:{}-{}", self.path, self.start_line, self.end_line)
    }
}

/// A single retrieval result. Immutable once produced by the retrieval layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub chunk_id: String,
    pub text: String,

    /// Similarity in `(0, 1]`; `1.0` for exact-match paths (symbol, regex)
    pub score: f64,

    /// Raw backend distance, present only for semantic hits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,

    pub metadata: ChunkMetadata,
    pub collection: String,
}

impl SearchHit {
    pub fn location(&self) -> String {
        self.metadata.location()
    }
}

/// The reassembled text of one file, aggregated across collections
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileContent {
    pub path: String,
    pub text: String,
}

/// Errors raised while validating or executing a tool call
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool {tool} failed: {reason}")]
    ExecutionFailed { tool: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_accepts_legacy_keys() {
        let meta: ChunkMetadata = serde_json::from_value(json!({
            "file_path": "src/foo.py",
            "symbol": "Foo",
            "start_line": 1,
            "end_line": 20
        }))
        .unwrap();
        assert_eq!(meta.path, "src/foo.py");
        assert_eq!(meta.symbol_name.as_deref(), Some("Foo"));
        assert_eq!(meta.location(), "src/foo.py:1-20");
    }

    #[test]
    fn test_metadata_field_lookup() {
        let meta = ChunkMetadata {
            path: "a.rs".into(),
            class_name: Some("Widget".into()),
            language: Some("rust".into()),
            ..Default::default()
        };
        assert_eq!(meta.field("path").as_deref(), Some("a.rs"));
        assert_eq!(meta.field("class_name").as_deref(), Some("Widget"));
        assert_eq!(meta.field("method_name"), None);
        assert_eq!(meta.field("no_such_key"), None);
    }

    #[test]
    fn test_tool_error_display() {
        let err = ToolError::InvalidArguments {
            tool: "get_file".into(),
            reason: "missing field `path`".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid arguments for get_file: missing field `path`"
        );
    }
}
