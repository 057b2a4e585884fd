//! Anthropic Messages API provider
//!
//! System and developer messages become the top-level `system` prompt; tool
//! calls travel as `tool_use` / `tool_result` content blocks. Structured
//! output is obtained by forcing a single tool whose input schema is the
//! requested schema.

use super::{
    check_status, map_transport_error, parse_json_payload, ChatOptions, LLMError, LLMProvider,
    LLMResponse, Message, MessageRole, OutputSchema, ToolCall,
};
use crate::config::AnthropicConfig;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    config: AnthropicConfig,
    model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig, model: impl Into<String>) -> super::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LLMError::NetworkError(e.to_string()))?;

        Ok(Self {
            config,
            model: model.into(),
            client,
        })
    }

    /// Split our messages into the `system` prompt and the `messages` array.
    fn convert_messages(messages: &[Message]) -> (String, Vec<Value>) {
        let mut system_prompt = String::new();
        let mut api_messages: Vec<Value> = Vec::new();

        for msg in messages {
            match msg.role {
                MessageRole::System | MessageRole::Developer => {
                    if !system_prompt.is_empty() {
                        system_prompt.push_str("\n\n");
                    }
                    system_prompt.push_str(&msg.content);
                }
                MessageRole::User => {
                    api_messages.push(json!({"role": "user", "content": msg.content}));
                }
                MessageRole::Assistant if !msg.tool_calls.is_empty() => {
                    let mut blocks = Vec::new();
                    if !msg.content.is_empty() {
                        blocks.push(json!({"type": "text", "text": msg.content}));
                    }
                    for tc in &msg.tool_calls {
                        let input: Value =
                            serde_json::from_str(&tc.arguments).unwrap_or_else(|_| json!({}));
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": tc.id,
                            "name": tc.name,
                            "input": input
                        }));
                    }
                    api_messages.push(json!({"role": "assistant", "content": blocks}));
                }
                MessageRole::Assistant => {
                    api_messages.push(json!({"role": "assistant", "content": msg.content}));
                }
                MessageRole::Tool => {
                    let block = json!({
                        "type": "tool_result",
                        "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                        "content": msg.content
                    });
                    // Consecutive tool results share one user message
                    let merged = api_messages.last_mut().and_then(|last| {
                        let is_tool_results = last["role"] == "user"
                            && last["content"]
                                .as_array()
                                .and_then(|blocks| blocks.first())
                                .is_some_and(|b| b["type"] == "tool_result");
                        if is_tool_results {
                            last["content"].as_array_mut()
                        } else {
                            None
                        }
                    });
                    match merged {
                        Some(blocks) => blocks.push(block),
                        None => api_messages.push(json!({"role": "user", "content": [block]})),
                    }
                }
            }
        }

        (system_prompt, api_messages)
    }

    fn base_payload(&self, messages: &[Message]) -> Value {
        let (system_prompt, api_messages) = Self::convert_messages(messages);
        let mut payload = json!({
            "model": self.model,
            "max_tokens": self.config.max_tokens,
            "messages": api_messages,
        });
        if !system_prompt.is_empty() {
            payload["system"] = Value::String(system_prompt);
        }
        payload
    }

    async fn post(&self, payload: &Value) -> super::Result<Value> {
        let api_key =
            self.config.api_key.as_ref().ok_or_else(|| {
                LLMError::AuthenticationFailed("no Anthropic API key".to_string())
            })?;

        let url = format!("{}/messages", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key.unsecure())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| map_transport_error("Anthropic", &self.config.base_url, e))?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))
    }

    fn content_blocks(data: &Value) -> super::Result<&Vec<Value>> {
        data.get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| LLMError::ParseError("No content array in response".to_string()))
    }

    fn parse_response(data: &Value) -> super::Result<LLMResponse> {
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in Self::content_blocks(data)? {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(t) = block.get("text").and_then(|t| t.as_str()) {
                        text.push_str(t);
                    }
                }
                Some("tool_use") => {
                    let id = block.get("id").and_then(|v| v.as_str()).unwrap_or_default();
                    let name = block.get("name").and_then(|v| v.as_str()).unwrap_or_default();
                    let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                    tool_calls.push(ToolCall::new(id, name, input.to_string()));
                }
                _ => {}
            }
        }

        Ok(LLMResponse {
            content: if text.is_empty() { None } else { Some(text) },
            tool_calls,
        })
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn is_local(&self) -> bool {
        false
    }

    async fn check_health(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn generate(
        &self,
        messages: &[Message],
        tools: &[Value],
        options: ChatOptions,
    ) -> super::Result<LLMResponse> {
        let mut payload = self.base_payload(messages);

        if !tools.is_empty() {
            payload["tools"] = Value::Array(tools.to_vec());
            payload["tool_choice"] = json!({
                "type": "auto",
                "disable_parallel_tool_use": options.single_tool_call
            });
        }

        let data = self.post(&payload).await?;
        Self::parse_response(&data)
    }

    async fn generate_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> super::Result<Value> {
        let mut input_schema = schema.schema.clone();
        if let Some(obj) = input_schema.as_object_mut() {
            obj.remove("$schema");
        }

        let mut payload = self.base_payload(messages);
        payload["tools"] = json!([{
            "name": schema.name,
            "description": format!("Record the {} as structured data", schema.name),
            "input_schema": input_schema
        }]);
        payload["tool_choice"] = json!({"type": "tool", "name": schema.name});

        let data = self.post(&payload).await?;
        let blocks = Self::content_blocks(&data)?;

        if let Some(input) = blocks
            .iter()
            .find(|b| b.get("type").and_then(|t| t.as_str()) == Some("tool_use"))
            .and_then(|b| b.get("input"))
        {
            return Ok(input.clone());
        }

        // Some proxies drop forced tool use and answer in text
        let text: String = blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect();
        parse_json_payload(&text).ok_or_else(|| {
            LLMError::ParseError(format!("'{}' output is not JSON", schema.name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_and_developer_fold_into_system_prompt() {
        let (system, messages) = AnthropicProvider::convert_messages(&[
            Message::system("behave"),
            Message::developer("metadata fields: path"),
            Message::user("What is Foo?"),
        ]);
        assert_eq!(system, "behave\n\nmetadata fields: path");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn test_tool_use_and_results_blocks() {
        let (_, messages) = AnthropicProvider::convert_messages(&[
            Message::user("q"),
            Message::assistant_tool_calls(
                Some("Looking it up".into()),
                vec![
                    ToolCall::new("toolu_1", "symbol_search", r#"{"name":"Foo"}"#),
                    ToolCall::new("toolu_2", "get_file", r#"{"path":"foo.py"}"#),
                ],
            ),
            Message::tool_result("r1", "toolu_1"),
            Message::tool_result("r2", "toolu_2"),
        ]);

        assert_eq!(messages.len(), 3);
        let assistant = &messages[1]["content"];
        assert_eq!(assistant[0]["type"], "text");
        assert_eq!(assistant[1]["type"], "tool_use");
        assert_eq!(assistant[1]["input"]["name"], "Foo");

        let results = messages[2]["content"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1]["tool_use_id"], "toolu_2");
    }

    #[test]
    fn test_parse_tool_use_response() {
        let data = json!({
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_9", "name": "regex_search", "input": {"pattern": "class Foo"}}
            ]
        });
        let response = AnthropicProvider::parse_response(&data).unwrap();
        assert_eq!(response.content.as_deref(), Some("Let me check."));
        assert_eq!(response.tool_calls[0].name, "regex_search");
        assert_eq!(response.tool_calls[0].arguments, r#"{"pattern":"class Foo"}"#);
    }
}
