//! LLM Provider Abstraction Layer
//!
//! A common interface over the chat providers Sonar can drive (OpenAI,
//! Anthropic, Ollama). Each provider speaks its own wire format; everything
//! above this module sees only [`Message`], [`LLMResponse`] and
//! [`OutputSchema`].
//!
//! Two kinds of completion are supported:
//! - `generate`: a free-form turn that may request tool calls
//! - `generate_structured`: a turn constrained to a JSON schema, used for
//!   plans, step outcomes and evaluator decisions

use async_trait::async_trait;
use schemars::JsonSchema;
use sdk::errors::EngineError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::config::{LLMConfig, ProviderKind};
use crate::secrets::scrub_secrets;
use std::sync::Arc;
use std::time::Duration;

pub mod anthropic;
pub mod embedding;
pub mod ollama;
pub mod openai;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<LLMError> for EngineError {
    fn from(err: LLMError) -> Self {
        EngineError::LLMProvider(scrub_secrets(&err.to_string()))
    }
}

/// Map a transport failure into an `LLMError`.
pub(crate) fn map_transport_error(provider: &str, base_url: &str, e: reqwest::Error) -> LLMError {
    if e.is_timeout() {
        LLMError::Timeout
    } else if e.is_connect() {
        LLMError::ProviderUnavailable(format!(
            "Cannot connect to {} at {}",
            provider, base_url
        ))
    } else {
        LLMError::NetworkError(e.to_string())
    }
}

/// Turn a non-success HTTP response into an `LLMError`; pass successes through.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = scrub_secrets(&response.text().await.unwrap_or_default());
    Err(match status.as_u16() {
        401 | 403 => LLMError::AuthenticationFailed(text),
        429 => LLMError::RateLimitExceeded,
        500..=599 => LLMError::ProviderUnavailable(format!("{}: {}", status, text)),
        _ => LLMError::InvalidRequest(format!("{}: {}", status, text)),
    })
}

/// Message in a conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender
    pub role: MessageRole,

    /// Content of the message
    pub content: String,

    /// Tool call ID for tool result messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Tool calls requested by an assistant message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl Message {
    fn with_role(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::System, content)
    }

    /// Instructions that sit between the system prompt and the user turn.
    /// Providers without a developer role fold it into the system prompt.
    pub fn developer(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::Developer, content)
    }

    /// An assistant turn that requested tool calls
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.unwrap_or_default(),
            tool_call_id: None,
            tool_calls,
        }
    }

    /// Create a new tool result message
    pub fn tool_result(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: Vec::new(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    Developer,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::Developer => write!(f, "developer"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// Tool call request from the LLM
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Unique identifier for this tool call
    pub id: String,

    /// Name of the tool to call
    pub name: String,

    /// Arguments to pass to the tool (JSON string)
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Response from an LLM provider: optional text plus any requested tool calls
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LLMResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl LLMResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Per-request options
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatOptions {
    /// Ask the provider for at most one tool call per turn
    pub single_tool_call: bool,
}

/// A named JSON schema a structured completion must satisfy
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
}

impl OutputSchema {
    /// Derive the schema from a Rust type
    pub fn of<T: JsonSchema>(name: &str) -> Self {
        let schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null);
        Self {
            name: name.to_string(),
            schema,
        }
    }
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "ollama", "openai", "anthropic")
    fn name(&self) -> &str;

    /// Returns true if this is a local provider (e.g., Ollama), false for cloud providers
    fn is_local(&self) -> bool;

    /// Generate one completion, offering the given tool specs.
    ///
    /// `tools` are already rendered in the provider's wire format.
    async fn generate(
        &self,
        messages: &[Message],
        tools: &[Value],
        options: ChatOptions,
    ) -> Result<LLMResponse>;

    /// Generate a completion constrained to `schema` and return the parsed JSON.
    async fn generate_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<Value>;

    /// Check if the provider is currently healthy and available
    /// Default implementation returns true.
    async fn check_health(&self) -> bool {
        true
    }
}

/// Build the chat provider selected by `[llm]`.
///
/// Expects a validated configuration.
pub fn build_provider(config: &LLMConfig) -> std::result::Result<Arc<dyn LLMProvider>, EngineError> {
    let model = config.effective_model();
    let provider: Arc<dyn LLMProvider> = match config.provider_kind() {
        ProviderKind::OpenAI => Arc::new(openai::OpenAIProvider::new(config.openai.clone(), model)?),
        ProviderKind::Anthropic => Arc::new(anthropic::AnthropicProvider::new(
            config.anthropic.clone(),
            model,
        )?),
        ProviderKind::Ollama => Arc::new(ollama::OllamaProvider::new(
            config.ollama.base_url.clone(),
            model,
            Duration::from_secs(config.ollama.request_timeout_secs),
        )?),
    };

    tracing::info!(
        "Using LLM provider '{}' (model {}, local: {})",
        provider.name(),
        config.effective_model(),
        provider.is_local()
    );

    Ok(provider)
}

/// Request a structured completion and deserialize it into `T`.
///
/// # Errors
///
/// `EngineError::LLMProvider` if the request fails,
/// `EngineError::StructuredOutput` if the payload does not fit `T`.
pub async fn structured<T>(
    provider: &dyn LLMProvider,
    messages: &[Message],
    name: &str,
) -> std::result::Result<T, EngineError>
where
    T: DeserializeOwned + JsonSchema,
{
    let schema = OutputSchema::of::<T>(name);
    let value = provider.generate_structured(messages, &schema).await?;

    serde_json::from_value(value).map_err(|e| EngineError::StructuredOutput {
        schema: name.to_string(),
        reason: e.to_string(),
    })
}

/// Extract a JSON value from model text.
///
/// Accepts raw JSON, a fenced code block, or a JSON object embedded in prose.
pub fn parse_json_payload(content: &str) -> Option<Value> {
    let trimmed = content.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(inner.trim()) {
            return Some(value);
        }
    }

    let pos = trimmed.find('{')?;
    let json_str = extract_balanced_json(&trimmed[pos..])?;
    serde_json::from_str(json_str).ok()
}

/// Parse a tool call a model wrote into its text instead of the native field.
///
/// Local models served without tool support often do this. Handles:
/// 1. Raw JSON: `{"function": "...", "arguments": {...}}` (or `"name"`)
/// 2. Fenced JSON (with or without trailing text)
/// 3. `<tool_call>name({...})</tool_call>` markers
/// 4. JSON embedded in prose
pub fn parse_tool_calls(content: &str) -> Option<ToolCall> {
    let trimmed = content.trim();

    if let Some(tc) = try_parse_function_json(trimmed) {
        return Some(tc);
    }

    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Some(tc) = try_parse_function_json(inner.trim()) {
            return Some(tc);
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find("<tool_call>"), trimmed.find("</tool_call>")) {
        if start + 11 <= end {
            let tool_content = &trimmed[start + 11..end];
            if let Some(paren_pos) = tool_content.find('(') {
                let tool_name = &tool_content[..paren_pos];
                let args_end = tool_content.rfind(')').unwrap_or(tool_content.len());
                if paren_pos < args_end {
                    return Some(ToolCall::new(
                        format!("call_{}", uuid::Uuid::new_v4()),
                        tool_name.trim(),
                        &tool_content[paren_pos + 1..args_end],
                    ));
                }
            }
        }
    }

    for marker in ["{\"function\"", "{\"name\""] {
        if let Some(pos) = trimmed.find(marker) {
            if let Some(json_str) = extract_balanced_json(&trimmed[pos..]) {
                if let Some(tc) = try_parse_function_json(json_str) {
                    return Some(tc);
                }
            }
        }
    }

    None
}

fn try_parse_function_json(s: &str) -> Option<ToolCall> {
    let json: Value = serde_json::from_str(s).ok()?;
    let function = json
        .get("function")
        .or_else(|| json.get("name"))?
        .as_str()?;
    let arguments = json.get("arguments")?;
    let arguments = match arguments {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    };
    Some(ToolCall::new(
        format!("call_{}", uuid::Uuid::new_v4()),
        function,
        arguments,
    ))
}

/// Extract the body of the first markdown code fence in the text.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Verdict {
        ok: bool,
        note: String,
    }

    struct CannedProvider(Value);

    #[async_trait]
    impl LLMProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        fn is_local(&self) -> bool {
            true
        }

        async fn generate(
            &self,
            _messages: &[Message],
            _tools: &[Value],
            _options: ChatOptions,
        ) -> Result<LLMResponse> {
            Ok(LLMResponse::default())
        }

        async fn generate_structured(
            &self,
            _messages: &[Message],
            _schema: &OutputSchema,
        ) -> Result<Value> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_message_creation() {
        let tool_msg = Message::tool_result("result", "call_123");
        assert_eq!(tool_msg.role, MessageRole::Tool);
        assert_eq!(tool_msg.tool_call_id, Some("call_123".to_string()));

        let calls = vec![ToolCall::new("call_1", "get_file", r#"{"path":"a.rs"}"#)];
        let assistant = Message::assistant_tool_calls(None, calls.clone());
        assert_eq!(assistant.role, MessageRole::Assistant);
        assert_eq!(assistant.content, "");
        assert_eq!(assistant.tool_calls, calls);

        assert_eq!(Message::developer("x").role.to_string(), "developer");
    }

    #[test]
    fn test_message_serialization() {
        let msg = Message::user("test");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("tool_calls"));
        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, deserialized);
    }

    #[test]
    fn test_output_schema_derived_from_type() {
        let schema = OutputSchema::of::<Verdict>("verdict");
        assert_eq!(schema.name, "verdict");
        let props = schema.schema.get("properties").unwrap();
        assert!(props.get("ok").is_some());
        assert!(props.get("note").is_some());
    }

    #[tokio::test]
    async fn test_structured_helper_parses_payload() {
        let provider = CannedProvider(serde_json::json!({"ok": true, "note": "fine"}));
        let verdict: Verdict = structured(&provider, &[], "verdict").await.unwrap();
        assert_eq!(
            verdict,
            Verdict {
                ok: true,
                note: "fine".into()
            }
        );
    }

    #[tokio::test]
    async fn test_structured_helper_rejects_mismatch() {
        let provider = CannedProvider(serde_json::json!({"ok": "maybe"}));
        let err = structured::<Verdict>(&provider, &[], "verdict")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StructuredOutput { .. }));
    }

    #[test]
    fn test_parse_json_payload_variants() {
        assert_eq!(
            parse_json_payload(r#"{"a": 1}"#),
            Some(serde_json::json!({"a": 1}))
        );
        assert_eq!(
            parse_json_payload("```json\n{\"a\": 2}\n```"),
            Some(serde_json::json!({"a": 2}))
        );
        assert_eq!(
            parse_json_payload("Sure! Here it is: {\"a\": {\"b\": \"}\"}} hope that helps"),
            Some(serde_json::json!({"a": {"b": "}"}}))
        );
        assert_eq!(parse_json_payload("no json here"), None);
    }

    #[test]
    fn test_parse_tool_calls_from_text() {
        let tc = parse_tool_calls(r#"{"function": "get_file", "arguments": {"path": "a.rs"}}"#)
            .unwrap();
        assert_eq!(tc.name, "get_file");
        assert_eq!(tc.arguments, r#"{"path":"a.rs"}"#);

        let tc = parse_tool_calls(r#"<tool_call>symbol_search({"name": "Foo"})</tool_call>"#)
            .unwrap();
        assert_eq!(tc.name, "symbol_search");

        let tc = parse_tool_calls(
            "I'll search.\n{\"name\": \"regex_search\", \"arguments\": {\"pattern\": \"fn main\"}}",
        )
        .unwrap();
        assert_eq!(tc.name, "regex_search");

        assert!(parse_tool_calls("The answer is in src/lib.rs").is_none());
    }

    #[test]
    fn test_llm_error_maps_and_scrubs() {
        let err: EngineError =
            LLMError::AuthenticationFailed("bad key sk-abcdefghijklmnopqrstuvwx".into()).into();
        let text = err.to_string();
        assert!(text.contains("Authentication failed"));
        assert!(!text.contains("abcdefghijklmnopqrstuvwx"));
    }
}
