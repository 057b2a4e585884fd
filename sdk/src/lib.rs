//! Sonar SDK
//!
//! Shared types used by the engine and by anything that talks to it:
//! the error enum with user hints, and the retrieval data model.

/// Error types and handling
pub mod errors;

/// Retrieval and tool types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, ErrorExt, FieldError};
pub use types::{ChunkMetadata, FileContent, SearchHit, ToolError};
