//! Sonar Engine Library
//!
//! This library provides the core functionality of the Sonar engine.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Secret handling module
pub mod secrets;

/// File system security module
pub mod fs_guard;

/// LLM provider abstraction layer
pub mod llm;

/// Multi-collection retrieval over the vector store
pub mod retrieval;

/// Tools offered to the model
pub mod tools;

/// Built-in and overridable prompts
pub mod prompts;

/// Conductor orchestration module
pub mod conductor;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
