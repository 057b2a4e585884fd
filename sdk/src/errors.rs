//! Error types and handling
//!
//! This module provides the error types used throughout the Sonar engine.
//! All errors implement the `ErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Hints are static strings. They never echo API keys, raw model output, or
//! the contents of indexed source files.

use std::fmt;
use thiserror::Error;

/// Trait for Sonar error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait ErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors are absorbed inside a query (fed back to the model,
    /// or replaced by a safe default). Non-recoverable errors end the query.
    fn is_recoverable(&self) -> bool;
}

/// A single configuration field that failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path of the offending key, e.g. `vector_store.collections`
    pub field: String,

    /// What is wrong with it
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("\n  - {}", e))
        .collect::<String>()
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **LLM Provider**: API failures, authentication errors, malformed output
/// - **Retrieval**: Vector store connectivity, missing files, bad patterns
/// - **File System**: Path validation and access errors
/// - **History**: Conversation log persistence
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, ErrorExt};
/// use std::path::PathBuf;
///
/// let error = EngineError::PathDenied(PathBuf::from(".ssh"));
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::VectorStoreUnavailable("connection refused".into());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration:{}", join_field_errors(.0))]
    InvalidConfig(Vec<FieldError>),

    // LLM provider errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    #[error("Structured output did not match schema '{schema}': {reason}")]
    StructuredOutput { schema: String, reason: String },

    // Retrieval errors
    #[error("Vector store unavailable: {0}")]
    VectorStoreUnavailable(String),

    #[error("Collection '{collection}' query failed: {reason}")]
    CollectionQuery { collection: String, reason: String },

    #[error("File not found in any collection: {0}")]
    FileNotFound(String),

    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    // File system security errors
    #[error("Path denied: {0:?}")]
    PathDenied(std::path::PathBuf),

    #[error("Path outside source root: {0:?}")]
    PathOutsideRoot(std::path::PathBuf),

    #[error("Path canonicalization failed for {0:?}: {1}")]
    PathCanonicalization(std::path::PathBuf, String),

    // Conversation history errors
    #[error("History error: {0}")]
    History(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            // Configuration errors
            Self::Config(_) => "Check your config.toml file for errors",
            Self::InvalidConfig(_) => "Fix the listed config.toml fields and try again",

            // LLM provider errors
            Self::LLMProvider(_) => "LLM provider unavailable. Check your API keys and network",
            Self::StructuredOutput { .. } => {
                "The model returned malformed output. Try again or use a stronger model"
            }

            // Retrieval errors
            Self::VectorStoreUnavailable(_) => {
                "Vector store unreachable. Check vector_store.host and vector_store.port"
            }
            Self::CollectionQuery { .. } => "A collection query failed. Check the collection name",
            Self::FileNotFound(_) => "No indexed chunk has that path. Check the path spelling",
            Self::InvalidPattern { .. } => "The regular expression is invalid",
            Self::Embedding(_) => "Embedding provider failed. Check the [embedding] section",

            // File system security errors
            Self::PathDenied(_) => "Access to this path is not allowed",
            Self::PathOutsideRoot(_) => "Only files under core.source_root can be read",
            Self::PathCanonicalization(_, _) => "Invalid path specified",

            // History errors
            Self::History(_) => "Conversation history could not be read or written",

            // Network errors
            Self::Network(_) => "Network operation failed. Check your connection",

            // Generic IO error
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_)
            | Self::InvalidConfig(_)
            | Self::VectorStoreUnavailable(_)
            | Self::History(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}
