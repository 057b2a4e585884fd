//! Ollama LLM Provider
//!
//! Local models served by Ollama, typically at http://localhost:11434.
//!
//! Key features:
//! - Local execution (no API keys required)
//! - Native tool calling in the OpenAI tool-spec format
//! - Structured output through the `format` field (a JSON schema)
//! - Text fallback for models that write tool calls into their content

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::{
    check_status, map_transport_error, parse_json_payload, parse_tool_calls, ChatOptions,
    LLMError, LLMProvider, LLMResponse, Message, MessageRole, OutputSchema, Result, ToolCall,
};

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: String,
    model: String,
    client: Client,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    ///
    /// # Arguments
    /// * `base_url` - Base URL for Ollama API (e.g., "http://localhost:11434")
    /// * `model` - Model name to use (e.g., "llama3.1:8b")
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LLMError::NetworkError(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into(),
            model: model.into(),
            client,
        })
    }

    /// Convert our Message format to Ollama's format
    fn convert_messages(messages: &[Message]) -> Vec<OllamaMessage> {
        messages
            .iter()
            .map(|msg| OllamaMessage {
                role: match msg.role {
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                    MessageRole::System | MessageRole::Developer => "system",
                    MessageRole::Tool => "tool",
                }
                .to_string(),
                content: msg.content.clone(),
                tool_calls: msg
                    .tool_calls
                    .iter()
                    .map(|tc| OllamaToolCall {
                        function: OllamaFunction {
                            name: tc.name.clone(),
                            arguments: serde_json::from_str(&tc.arguments)
                                .unwrap_or_else(|_| Value::Object(Default::default())),
                        },
                    })
                    .collect(),
            })
            .collect()
    }

    async fn chat(&self, request: &OllamaRequest<'_>) -> Result<OllamaMessage> {
        tracing::debug!(
            "Ollama request: model={}, messages={}, total_chars={}",
            self.model,
            request.messages.len(),
            request
                .messages
                .iter()
                .map(|m| m.content.len())
                .sum::<usize>()
        );

        let url = format!("{}/api/chat", self.base_url);
        let start = std::time::Instant::now();
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| map_transport_error("Ollama", &self.base_url, e))?;

        let ollama_response: OllamaResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| LLMError::ParseError(format!("Failed to parse Ollama response: {}", e)))?;

        tracing::debug!(
            "Ollama response received in {:.1}s",
            start.elapsed().as_secs_f64()
        );

        Ok(ollama_response.message)
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn check_health(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        matches!(self.client.get(&url).send().await, Ok(r) if r.status().is_success())
    }

    async fn generate(
        &self,
        messages: &[Message],
        tools: &[Value],
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let request = OllamaRequest {
            model: &self.model,
            messages: Self::convert_messages(messages),
            tools,
            format: None,
            stream: false,
        };

        let message = self.chat(&request).await?;

        let mut tool_calls: Vec<ToolCall> = message
            .tool_calls
            .into_iter()
            .map(|tc| {
                ToolCall::new(
                    format!("call_{}", uuid::Uuid::new_v4()),
                    tc.function.name,
                    tc.function.arguments.to_string(),
                )
            })
            .collect();

        if tool_calls.is_empty() && !tools.is_empty() {
            if let Some(tc) = parse_tool_calls(&message.content) {
                return Ok(LLMResponse::with_tool_calls(vec![tc]));
            }
        }

        if options.single_tool_call {
            tool_calls.truncate(1);
        }

        Ok(LLMResponse {
            content: Some(message.content).filter(|c| !c.trim().is_empty()),
            tool_calls,
        })
    }

    async fn generate_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<Value> {
        let request = OllamaRequest {
            model: &self.model,
            messages: Self::convert_messages(messages),
            tools: &[],
            format: Some(&schema.schema),
            stream: false,
        };

        let message = self.chat(&request).await?;
        parse_json_payload(&message.content).ok_or_else(|| {
            LLMError::ParseError(format!("'{}' output is not JSON", schema.name))
        })
    }
}

/// Ollama API request format
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [Value],
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a Value>,
    stream: bool,
}

fn no_tools(tools: &&[Value]) -> bool {
    tools.is_empty()
}

/// Ollama message format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Ollama API response format
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}
