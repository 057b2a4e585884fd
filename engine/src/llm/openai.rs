//! OpenAI chat-completions provider
//!
//! Native tool calling (`tools` / `tool_calls`), and structured output via
//! `response_format: {"type": "json_schema"}`. Works with any server that
//! speaks the same API when `base_url` is pointed at it.

use super::{
    check_status, map_transport_error, parse_json_payload, ChatOptions, LLMError, LLMProvider,
    LLMResponse, Message, MessageRole, OutputSchema, ToolCall,
};
use crate::config::OpenAIConfig;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

pub struct OpenAIProvider {
    config: OpenAIConfig,
    model: String,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig, model: impl Into<String>) -> super::Result<Self> {
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

    fn convert_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| match msg.role {
                // Not every compatible server knows the developer role
                MessageRole::System | MessageRole::Developer => {
                    json!({"role": "system", "content": msg.content})
                }
                MessageRole::User => json!({"role": "user", "content": msg.content}),
                MessageRole::Assistant if !msg.tool_calls.is_empty() => {
                    let calls: Vec<Value> = msg
                        .tool_calls
                        .iter()
                        .map(|tc| {
                            json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {"name": tc.name, "arguments": tc.arguments}
                            })
                        })
                        .collect();
                    let content = if msg.content.is_empty() {
                        Value::Null
                    } else {
                        Value::String(msg.content.clone())
                    };
                    json!({"role": "assistant", "content": content, "tool_calls": calls})
                }
                MessageRole::Assistant => json!({"role": "assistant", "content": msg.content}),
                MessageRole::Tool => json!({
                    "role": "tool",
                    "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
                    "content": msg.content
                }),
            })
            .collect()
    }

    async fn post(&self, payload: &Value) -> super::Result<Value> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| LLMError::AuthenticationFailed("no OpenAI API key".to_string()))?;

        let url = format!("{}/chat/completions", self.config.base_url);

        tracing::debug!(
            "OpenAI request: model={}, messages={}",
            self.model,
            payload["messages"].as_array().map(Vec::len).unwrap_or(0)
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key.unsecure()))
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| map_transport_error("OpenAI", &self.config.base_url, e))?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))
    }

    fn first_message(data: &Value) -> super::Result<&Value> {
        data.get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .ok_or_else(|| LLMError::ParseError("No message in response".to_string()))
    }

    fn parse_response(data: &Value) -> super::Result<LLMResponse> {
        let message = Self::first_message(data)?;

        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        let tool_calls = message
            .get("tool_calls")
            .and_then(|t| t.as_array())
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|call| {
                        let function = call.get("function")?;
                        Some(ToolCall::new(
                            call.get("id")?.as_str()?,
                            function.get("name")?.as_str()?,
                            function
                                .get("arguments")
                                .and_then(|a| a.as_str())
                                .unwrap_or("{}"),
                        ))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content,
            tool_calls,
        })
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
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
        let mut payload = json!({
            "model": self.model,
            "messages": Self::convert_messages(messages),
        });

        if !tools.is_empty() {
            payload["tools"] = Value::Array(tools.to_vec());
            if options.single_tool_call {
                payload["parallel_tool_calls"] = Value::Bool(false);
            }
        }

        let data = self.post(&payload).await?;
        Self::parse_response(&data)
    }

    async fn generate_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> super::Result<Value> {
        let payload = json!({
            "model": self.model,
            "messages": Self::convert_messages(messages),
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "schema": schema.schema,
                    "strict": false
                }
            }
        });

        let data = self.post(&payload).await?;
        let content = Self::first_message(&data)?
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or_default();

        parse_json_payload(content).ok_or_else(|| {
            LLMError::ParseError(format!("'{}' output is not JSON", schema.name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_round_trip_messages() {
        let messages = vec![
            Message::system("sys"),
            Message::developer("dev"),
            Message::user("What is Foo?"),
            Message::assistant_tool_calls(
                None,
                vec![ToolCall::new("call_1", "symbol_search", r#"{"name":"Foo"}"#)],
            ),
            Message::tool_result(r#"{"hits":[]}"#, "call_1"),
        ];

        let converted = OpenAIProvider::convert_messages(&messages);
        assert_eq!(converted[1]["role"], "system");
        assert_eq!(converted[3]["content"], Value::Null);
        assert_eq!(converted[3]["tool_calls"][0]["function"]["name"], "symbol_search");
        assert_eq!(converted[4]["role"], "tool");
        assert_eq!(converted[4]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_parse_tool_call_response() {
        let data = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "get_file", "arguments": "{\"path\":\"src/foo.py\"}"}
                    }]
                }
            }]
        });

        let response = OpenAIProvider::parse_response(&data).unwrap();
        assert_eq!(response.content, None);
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].id, "call_abc");
        assert_eq!(response.tool_calls[0].arguments, r#"{"path":"src/foo.py"}"#);
    }

    #[test]
    fn test_parse_response_without_choices() {
        let err = OpenAIProvider::parse_response(&json!({"choices": []})).unwrap_err();
        assert!(matches!(err, LLMError::ParseError(_)));
    }
}
