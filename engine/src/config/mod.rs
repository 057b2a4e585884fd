//! Configuration management
//!
//! This module handles loading, validation, and management of the Sonar configuration.
//! Configuration is stored in TOML format at ~/.sonar/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, optional source root for file-system tools
//! - **llm**: Chat provider selection, model, tool-spec format, credentials
//! - **embedding**: Embedding provider used for queries and the answer cache
//! - **vector_store**: Host, port and the collections to query
//! - **retrieval**: top-K, per-step turn budget, output caps
//! - **prompts**: Optional prompt override files
//! - **memory**: Conversation history, cache and summarization settings
//!
//! # Validation
//!
//! Validation is eager and exhaustive: every invalid field is collected and
//! reported together as `EngineError::InvalidConfig` before any network call
//! is made. API keys may be omitted from the file and are then read from
//! `OPENAI_API_KEY` / `ANTHROPIC_API_KEY`.
//!
//! # Examples
//!
//! ```no_run
//! use sonar_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Provider: {}", config.llm.provider);
//! println!("Collections: {:?}", config.vector_store.collections);
//! # Ok(())
//! # }
//! ```

use crate::secrets::SecretString;
use sdk::errors::{EngineError, FieldError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Chat model provider configuration
    pub llm: LLMConfig,

    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Vector store connection
    pub vector_store: VectorStoreConfig,

    /// Retrieval defaults
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Prompt override paths
    #[serde(default)]
    pub prompts: PromptsConfig,

    /// Conversation memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Root of the checked-out sources (supports ~ expansion).
    /// When set, the read-only file-system tools are registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            source_root: None,
        }
    }
}

/// Chat provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAI,
    Anthropic,
    Ollama,
}

impl ProviderKind {
    pub const NAMES: [&'static str; 3] = ["openai", "anthropic", "ollama"];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "openai" => Some(Self::OpenAI),
            "anthropic" => Some(Self::Anthropic),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }

    /// The tool-spec wire format a provider understands natively
    pub fn native_tool_format(self) -> ToolFormat {
        match self {
            Self::Anthropic => ToolFormat::Anthropic,
            Self::OpenAI | Self::Ollama => ToolFormat::OpenAI,
        }
    }
}

/// Wire format tools are rendered into for the model provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolFormat {
    /// `{"type": "function", "function": {name, description, parameters}}`
    OpenAI,
    /// `{name, description, input_schema}`
    Anthropic,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Chat provider (openai, anthropic, ollama)
    pub provider: String,

    /// Model identifier; overrides the selected provider section's model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Tool-spec format; defaults to the provider's native format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_format: Option<ToolFormat>,

    /// OpenAI provider settings
    #[serde(default)]
    pub openai: OpenAIConfig,

    /// Anthropic provider settings
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,
}

impl LLMConfig {
    /// Provider kind; only meaningful after validation
    pub fn provider_kind(&self) -> ProviderKind {
        ProviderKind::parse(&self.provider).unwrap_or(ProviderKind::Ollama)
    }

    /// Effective tool-spec format
    pub fn effective_tool_format(&self) -> ToolFormat {
        self.tool_format
            .unwrap_or_else(|| self.provider_kind().native_tool_format())
    }

    /// Effective model identifier for the selected provider
    pub fn effective_model(&self) -> String {
        if let Some(model) = &self.model {
            return model.clone();
        }
        match self.provider_kind() {
            ProviderKind::OpenAI => self.openai.model.clone(),
            ProviderKind::Anthropic => self.anthropic.model.clone(),
            ProviderKind::Ollama => self.ollama.model.clone(),
        }
    }
}

/// OpenAI provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// Base URL for OpenAI API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// API key; falls back to OPENAI_API_KEY
    #[serde(default, skip_serializing)]
    pub api_key: Option<SecretString>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Anthropic provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// Base URL for Anthropic API
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_anthropic_model")]
    pub model: String,

    /// API key; falls back to ANTHROPIC_API_KEY
    #[serde(default, skip_serializing)]
    pub api_key: Option<SecretString>,

    /// Maximum tokens per completion
    #[serde(default = "default_anthropic_max_tokens")]
    pub max_tokens: u32,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding provider (openai, ollama)
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Embedding model; must match the model the index was built with
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Base URL; defaults to the matching `[llm.*]` section's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            base_url: None,
        }
    }
}

/// Vector store connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Host name of the Chroma-compatible server
    #[serde(default = "default_vector_host")]
    pub host: String,

    /// Port of the Chroma-compatible server
    #[serde(default = "default_vector_port")]
    pub port: u16,

    /// Collections to query; results are merged across all of them
    pub collections: Vec<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl VectorStoreConfig {
    pub fn base_url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

/// Retrieval defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Default number of semantic hits, counted over the merged set
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Maximum model turns per plan step
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Chunks requested per page when symbol, regex and file lookups scan a
    /// collection. Every page is read until the collection is exhausted.
    #[serde(default = "default_scan_page_size")]
    pub scan_page_size: usize,

    /// Tool results longer than this are truncated before reaching the model
    #[serde(default = "default_max_tool_output_chars")]
    pub max_tool_output_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_turns: default_max_turns(),
            scan_page_size: default_scan_page_size(),
            max_tool_output_chars: default_max_tool_output_chars(),
        }
    }
}

/// Optional prompt override files. Unset entries use the built-in prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planner: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalizer: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_outcome: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summarizer: Option<PathBuf>,
}

impl PromptsConfig {
    fn entries_mut(&mut self) -> [(&'static str, &mut Option<PathBuf>); 6] {
        [
            ("prompts.system", &mut self.system),
            ("prompts.planner", &mut self.planner),
            ("prompts.evaluator", &mut self.evaluator),
            ("prompts.finalizer", &mut self.finalizer),
            ("prompts.step_outcome", &mut self.step_outcome),
            ("prompts.summarizer", &mut self.summarizer),
        ]
    }
}

/// Conversation memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Enable history, answer cache and summarization
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Path of the persisted history document (supports ~ expansion)
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,

    /// Number of recent raw turns handed to the planner and finalizer
    #[serde(default = "default_context_window_turns")]
    pub context_window_turns: usize,

    /// Maximum raw turns kept on disk
    #[serde(default = "default_max_retained_turns")]
    pub max_retained_turns: usize,

    /// Fold old turns into a rolling summary instead of silently dropping them
    #[serde(default = "default_true")]
    pub summarization_enabled: bool,

    /// In-window token estimate above which the oldest turns are folded
    #[serde(default = "default_summary_threshold_tokens")]
    pub summary_threshold_tokens: usize,

    /// Cap on the rolling summary's size, in estimated tokens
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: usize,

    /// Cosine similarity above which a stored answer is reused
    #[serde(default = "default_cache_similarity_threshold")]
    pub cache_similarity_threshold: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_path: default_history_path(),
            context_window_turns: default_context_window_turns(),
            max_retained_turns: default_max_retained_turns(),
            summarization_enabled: true,
            summary_threshold_tokens: default_summary_threshold_tokens(),
            summary_max_tokens: default_summary_max_tokens(),
            cache_similarity_threshold: default_cache_similarity_threshold(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    300
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_anthropic_max_tokens() -> u32 {
    4096
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_vector_host() -> String {
    "localhost".to_string()
}

fn default_vector_port() -> u16 {
    8000
}

fn default_top_k() -> usize {
    10
}

fn default_max_turns() -> usize {
    8
}

fn default_scan_page_size() -> usize {
    500
}

fn default_max_tool_output_chars() -> usize {
    12_000
}

fn default_history_path() -> PathBuf {
    PathBuf::from("~/.sonar/history.json")
}

fn default_context_window_turns() -> usize {
    6
}

fn default_max_retained_turns() -> usize {
    40
}

fn default_summary_threshold_tokens() -> usize {
    2000
}

fn default_summary_max_tokens() -> usize {
    1000
}

fn default_cache_similarity_threshold() -> f32 {
    0.95
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            api_key: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: default_anthropic_base_url(),
            model: default_anthropic_model(),
            api_key: None,
            max_tokens: default_anthropic_max_tokens(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.sonar/config.toml)
    ///
    /// If the configuration file doesn't exist, a default configuration
    /// (local Ollama, local Chroma, one `codebase` collection) is written
    /// there first.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if any
    /// field fails validation.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default_config();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Wrote default configuration to {}", path.display());

        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.sonar/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".sonar").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig::default(),
            llm: LLMConfig {
                provider: "ollama".to_string(),
                model: None,
                tool_format: None,
                openai: OpenAIConfig::default(),
                anthropic: AnthropicConfig::default(),
                ollama: OllamaConfig::default(),
            },
            embedding: EmbeddingConfig::default(),
            vector_store: VectorStoreConfig {
                host: default_vector_host(),
                port: default_vector_port(),
                collections: vec!["codebase".to_string()],
                request_timeout_secs: default_request_timeout(),
            },
            retrieval: RetrievalConfig::default(),
            prompts: PromptsConfig::default(),
            memory: MemoryConfig::default(),
        }
    }

    /// Validate and process configuration
    ///
    /// Collects every field error instead of stopping at the first one, fills
    /// API keys from the environment, and expands `~` in paths.
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let mut errors = Vec::new();

        // Core
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            errors.push(FieldError::new(
                "core.log_level",
                format!(
                    "'{}' is not one of: {}",
                    self.core.log_level,
                    valid_log_levels.join(", ")
                ),
            ));
        }

        if let Some(root) = self.core.source_root.take() {
            match expand_path(&root).and_then(|p| {
                p.canonicalize()
                    .map_err(|e| EngineError::PathCanonicalization(p.clone(), e.to_string()))
            }) {
                Ok(canonical) if canonical.is_dir() => self.core.source_root = Some(canonical),
                Ok(canonical) => errors.push(FieldError::new(
                    "core.source_root",
                    format!("{} is not a directory", canonical.display()),
                )),
                Err(e) => errors.push(FieldError::new("core.source_root", e.to_string())),
            }
        }

        // LLM
        match ProviderKind::parse(&self.llm.provider) {
            None => errors.push(FieldError::new(
                "llm.provider",
                format!(
                    "'{}' is not one of: {}",
                    self.llm.provider,
                    ProviderKind::NAMES.join(", ")
                ),
            )),
            Some(kind) => {
                if let Some(format) = self.llm.tool_format {
                    if format != kind.native_tool_format() {
                        errors.push(FieldError::new(
                            "llm.tool_format",
                            format!(
                                "{:?} tool specs are not understood by provider '{}'",
                                format, self.llm.provider
                            ),
                        ));
                    }
                }
                match kind {
                    ProviderKind::OpenAI => {
                        fill_api_key(&mut self.llm.openai.api_key, "OPENAI_API_KEY");
                        if self.llm.openai.api_key.is_none() {
                            errors.push(FieldError::new(
                                "llm.openai.api_key",
                                "required for provider 'openai' (or set OPENAI_API_KEY)",
                            ));
                        }
                        check_url(&mut errors, "llm.openai.base_url", &self.llm.openai.base_url);
                    }
                    ProviderKind::Anthropic => {
                        fill_api_key(&mut self.llm.anthropic.api_key, "ANTHROPIC_API_KEY");
                        if self.llm.anthropic.api_key.is_none() {
                            errors.push(FieldError::new(
                                "llm.anthropic.api_key",
                                "required for provider 'anthropic' (or set ANTHROPIC_API_KEY)",
                            ));
                        }
                        check_url(
                            &mut errors,
                            "llm.anthropic.base_url",
                            &self.llm.anthropic.base_url,
                        );
                    }
                    ProviderKind::Ollama => {
                        check_url(&mut errors, "llm.ollama.base_url", &self.llm.ollama.base_url);
                    }
                }
                if self.llm.effective_model().trim().is_empty() {
                    errors.push(FieldError::new("llm.model", "must not be empty"));
                }
            }
        }

        // Embedding
        match self.embedding.provider.as_str() {
            "openai" => {
                fill_api_key(&mut self.llm.openai.api_key, "OPENAI_API_KEY");
                if self.llm.openai.api_key.is_none() {
                    errors.push(FieldError::new(
                        "llm.openai.api_key",
                        "required for embedding provider 'openai' (or set OPENAI_API_KEY)",
                    ));
                }
            }
            "ollama" => {}
            other => errors.push(FieldError::new(
                "embedding.provider",
                format!("'{}' is not one of: openai, ollama", other),
            )),
        }
        if self.embedding.model.trim().is_empty() {
            errors.push(FieldError::new("embedding.model", "must not be empty"));
        }
        if let Some(url) = &self.embedding.base_url {
            check_url(&mut errors, "embedding.base_url", url);
        }

        // Vector store
        if self.vector_store.host.trim().is_empty() {
            errors.push(FieldError::new("vector_store.host", "must not be empty"));
        }
        if self.vector_store.port == 0 {
            errors.push(FieldError::new("vector_store.port", "must not be 0"));
        }
        if self.vector_store.collections.is_empty() {
            errors.push(FieldError::new(
                "vector_store.collections",
                "at least one collection is required",
            ));
        }
        let mut seen = HashSet::new();
        for name in &self.vector_store.collections {
            if name.trim().is_empty() {
                errors.push(FieldError::new(
                    "vector_store.collections",
                    "collection names must not be empty",
                ));
            } else if !seen.insert(name.as_str()) {
                errors.push(FieldError::new(
                    "vector_store.collections",
                    format!("collection '{}' is listed twice", name),
                ));
            }
        }

        // Retrieval
        if !(1..=100).contains(&self.retrieval.top_k) {
            errors.push(FieldError::new(
                "retrieval.top_k",
                "must be between 1 and 100",
            ));
        }
        if !(1..=50).contains(&self.retrieval.max_turns) {
            errors.push(FieldError::new(
                "retrieval.max_turns",
                "must be between 1 and 50",
            ));
        }
        if self.retrieval.scan_page_size == 0 {
            errors.push(FieldError::new(
                "retrieval.scan_page_size",
                "must be at least 1",
            ));
        }
        if self.retrieval.max_tool_output_chars < 256 {
            errors.push(FieldError::new(
                "retrieval.max_tool_output_chars",
                "must be at least 256",
            ));
        }

        // Prompts
        for (field, entry) in self.prompts.entries_mut() {
            if let Some(path) = entry.take() {
                match expand_path(&path) {
                    Ok(expanded) if expanded.is_file() => *entry = Some(expanded),
                    Ok(expanded) => errors.push(FieldError::new(
                        field,
                        format!("{} does not exist", expanded.display()),
                    )),
                    Err(e) => errors.push(FieldError::new(field, e.to_string())),
                }
            }
        }

        // Memory
        if self.memory.max_retained_turns == 0 {
            errors.push(FieldError::new(
                "memory.max_retained_turns",
                "must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.memory.cache_similarity_threshold) {
            errors.push(FieldError::new(
                "memory.cache_similarity_threshold",
                "must be between 0.0 and 1.0",
            ));
        }
        if self.memory.summary_threshold_tokens == 0 {
            errors.push(FieldError::new(
                "memory.summary_threshold_tokens",
                "must be at least 1",
            ));
        }
        if self.memory.summary_max_tokens == 0 {
            errors.push(FieldError::new(
                "memory.summary_max_tokens",
                "must be at least 1",
            ));
        }
        match expand_path(&self.memory.history_path) {
            Ok(expanded) => self.memory.history_path = expanded,
            Err(e) => errors.push(FieldError::new("memory.history_path", e.to_string())),
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(EngineError::InvalidConfig(errors))
        }
    }
}

fn fill_api_key(slot: &mut Option<SecretString>, env_var: &str) {
    if slot.as_ref().map(|k| k.unsecure().is_empty()).unwrap_or(true) {
        *slot = std::env::var(env_var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(SecretString::from);
    }
}

fn check_url(errors: &mut Vec<FieldError>, field: &str, url: &str) {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        errors.push(FieldError::new(
            field,
            format!("'{}' must start with http:// or https://", url),
        ));
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
