//! Tool contract and registry
//!
//! Tools are what the step runner offers the model. Each one has a typed
//! argument struct; its JSON schema is derived with `schemars` and rendered
//! into whichever tool-spec format the provider expects.
//!
//! Dispatch never fails: bad arguments, unknown names and downstream errors
//! all come back as an `{"error": ...}` payload the model can read and
//! correct itself from.

pub mod filesystem;
pub mod retrieval;

pub use filesystem::FilesystemTool;

use crate::config::ToolFormat;
use crate::retrieval::CodeRetriever;
use async_trait::async_trait;
use schemars::JsonSchema;
use sdk::types::ToolError;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared state every tool executes against
#[derive(Clone)]
pub struct ToolContext {
    pub retriever: Arc<dyn CodeRetriever>,

    /// Present only when `core.source_root` is configured
    pub fs: Option<Arc<FilesystemTool>>,
}

/// A tool with a typed argument struct
#[async_trait]
pub trait TypedTool: Send + Sync {
    type Args: DeserializeOwned + JsonSchema + Send;

    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    /// Checks serde cannot express, e.g. non-empty strings
    fn check(&self, _args: &Self::Args) -> Result<(), String> {
        Ok(())
    }

    /// Run the tool; the returned value is serialized as the tool result
    async fn execute(&self, ctx: &ToolContext, args: Self::Args) -> Result<Value, ToolError>;
}

/// Object-safe view of a tool, as stored in the registry
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema of the arguments
    fn parameters(&self) -> Value;

    /// Parse and check raw arguments, then execute. Returns JSON text.
    async fn call(&self, ctx: &ToolContext, raw_args: &str) -> Result<String, ToolError>;

    /// Render the tool spec in a provider's wire format
    fn spec(&self, format: ToolFormat) -> Value {
        match format {
            ToolFormat::OpenAI => json!({
                "type": "function",
                "function": {
                    "name": self.name(),
                    "description": self.description(),
                    "parameters": self.parameters()
                }
            }),
            ToolFormat::Anthropic => json!({
                "name": self.name(),
                "description": self.description(),
                "input_schema": self.parameters()
            }),
        }
    }
}

/// Validate raw JSON arguments into a tool's argument type.
pub fn validate<T: TypedTool>(tool: &T, raw_args: &str) -> Result<T::Args, ToolError> {
    let invalid = |reason: String| ToolError::InvalidArguments {
        tool: T::NAME.to_string(),
        reason,
    };

    // Some models send an empty string for a tool without required arguments
    let raw = if raw_args.trim().is_empty() {
        "{}"
    } else {
        raw_args
    };
    let args: T::Args = serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))?;
    tool.check(&args).map_err(invalid)?;
    Ok(args)
}

/// Argument schema with the draft metadata providers do not want
fn parameters_schema<T: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or_else(|_| json!({}));
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    schema
}

#[async_trait]
impl<T: TypedTool> Tool for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn description(&self) -> &'static str {
        T::DESCRIPTION
    }

    fn parameters(&self) -> Value {
        parameters_schema::<T::Args>()
    }

    async fn call(&self, ctx: &ToolContext, raw_args: &str) -> Result<String, ToolError> {
        let args = validate(self, raw_args)?;
        let output = self.execute(ctx, args).await?;
        Ok(output.to_string())
    }
}

/// Render a tool error as the payload the model sees
pub fn error_payload(error: &ToolError, available: &[&str]) -> String {
    json!({
        "error": error.to_string(),
        "available_tools": available
    })
    .to_string()
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_output(text: String, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }

    let kept: String = text.chars().take(max_chars).collect();
    format!(
        "{}\n[truncated: showing {} of {} characters]",
        kept, max_chars, total
    )
}

/// Name-indexed catalog of the tools offered to the model
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Box<dyn Tool>>,
    ctx: ToolContext,
}

impl ToolRegistry {
    /// Registry with the retrieval tools, plus the file-system tools when
    /// the context carries a sandboxed file system.
    pub fn new(ctx: ToolContext) -> Self {
        let mut registry = Self {
            tools: BTreeMap::new(),
            ctx,
        };

        registry.register(Box::new(retrieval::SymbolSearchTool));
        registry.register(Box::new(retrieval::GetFileTool));
        registry.register(Box::new(retrieval::RegexSearchTool));
        registry.register(Box::new(retrieval::SemanticSearchTool));

        if registry.ctx.fs.is_some() {
            registry.register(Box::new(filesystem::ReadFileTool));
            registry.register(Box::new(filesystem::ListDirTool));
        }

        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool specs for the provider, in name order
    pub fn specs(&self, format: ToolFormat) -> Vec<Value> {
        self.tools.values().map(|t| t.spec(format)).collect()
    }

    /// One line per tool, for prompts
    pub fn catalog(&self) -> String {
        self.tools
            .values()
            .map(|t| format!("- {}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn collections(&self) -> Vec<String> {
        self.ctx.retriever.list_collections()
    }

    /// Dispatch a tool call by name.
    ///
    /// Always returns JSON text. Errors are rendered as an error payload so
    /// the model can see them and self-correct.
    pub async fn dispatch(&self, name: &str, raw_args: &str) -> String {
        debug!("Dispatching tool '{}' with args: {}", name, raw_args);

        let Some(tool) = self.tools.get(name) else {
            warn!("Unknown tool requested: {}", name);
            return error_payload(&ToolError::UnknownTool(name.to_string()), &self.names());
        };

        match tool.call(&self.ctx, raw_args).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Tool '{}' failed: {}", name, e);
                error_payload(&e, &self.names())
            }
        }
    }
}
