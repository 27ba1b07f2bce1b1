//! OpenAI-compatible chat completions client.
//!
//! Built directly on `reqwest` rather than an `openai-rust2`-style
//! dependency: the platform needs raw control over the request body to
//! support native tool-calling plus arbitrary OpenAI-compatible base URLs
//! (local inference, Azure, etc.) — see `DESIGN.md` for the dependency swap.

use super::{ClientWrapper, HttpClientPool, Message, MessageChunk, MessageChunkStream, MessageStreamFuture, NativeToolCall, Role, TokenUsage, ToolDefinition};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::error::Error;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct OpenAIClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    usage: Mutex<Option<TokenUsage>>,
}

impl OpenAIClient {
    pub fn new(pool: &HttpClientPool, api_key: &str, base_url: &str, model: &str) -> Self {
        Self {
            http: pool.get(base_url),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            usage: Mutex::new(None),
        }
    }

    fn role_str(role: &Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool { .. } => "tool",
        }
    }

    fn to_wire_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| {
                let mut obj = json!({
                    "role": Self::role_str(&m.role),
                    "content": m.content.to_string(),
                });
                if let Role::Tool { call_id } = &m.role {
                    obj["tool_call_id"] = json!(call_id);
                }
                if !m.tool_calls.is_empty() {
                    obj["tool_calls"] = json!(m
                        .tool_calls
                        .iter()
                        .map(|tc| json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {"name": tc.name, "arguments": tc.arguments.to_string()},
                        }))
                        .collect::<Vec<_>>());
                }
                obj
            })
            .collect()
    }

    fn to_wire_tools(tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters_schema,
                    }
                })
            })
            .collect()
    }
}

#[async_trait]
impl ClientWrapper for OpenAIClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn send_message(
        &self,
        messages: &[Message],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        let mut body = json!({
            "model": self.model,
            "messages": Self::to_wire_messages(messages),
        });
        if let Some(tools) = &tools {
            if !tools.is_empty() {
                body["tools"] = json!(Self::to_wire_tools(tools));
            }
        }

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(format!("openai request failed ({status}): {text}").into());
        }

        let payload: Value = response.json().await?;
        let choice = payload
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or("openai response missing choices")?;
        let message = choice.get("message").ok_or("openai choice missing message")?;
        let content = message.get("content").and_then(|c| c.as_str()).unwrap_or("").to_string();

        let tool_calls = message
            .get("tool_calls")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|tc| {
                        let id = tc.get("id")?.as_str()?.to_string();
                        let function = tc.get("function")?;
                        let name = function.get("name")?.as_str()?.to_string();
                        let arguments_str = function.get("arguments")?.as_str().unwrap_or("{}");
                        let arguments = serde_json::from_str(arguments_str).unwrap_or(Value::Null);
                        Some(NativeToolCall { id, name, arguments })
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Some(usage) = payload.get("usage") {
            let input_tokens = usage.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
            let output_tokens = usage.get("completion_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
            *self.usage.lock().await = Some(TokenUsage {
                input_tokens,
                output_tokens,
                total_tokens: input_tokens + output_tokens,
            });
        }

        Ok(Message { role: Role::Assistant, content: Arc::from(content), tool_calls })
    }

    fn send_message_stream<'a>(
        &'a self,
        messages: &'a [Message],
        tools: Option<Vec<ToolDefinition>>,
    ) -> MessageStreamFuture<'a> {
        Box::pin(async move {
            let mut body = json!({
                "model": self.model,
                "messages": Self::to_wire_messages(messages),
                "stream": true,
            });
            if let Some(tools) = &tools {
                if !tools.is_empty() {
                    body["tools"] = json!(Self::to_wire_tools(tools));
                }
            }

            let response = self
                .http
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                return Err(format!("openai streaming request failed ({status})").into());
            }

            let byte_stream = response.bytes_stream();
            let chunk_stream = byte_stream.map(|chunk| -> Result<MessageChunk, Box<dyn Error + Send + Sync>> {
                let bytes = chunk?;
                let text = String::from_utf8_lossy(&bytes);
                for line in text.lines() {
                    let Some(data) = line.strip_prefix("data: ") else { continue };
                    if data == "[DONE]" {
                        return Ok(MessageChunk { content: String::new(), finish_reason: Some("stop".to_string()) });
                    }
                    if let Ok(value) = serde_json::from_str::<Value>(data) {
                        let delta = value
                            .get("choices")
                            .and_then(|c| c.get(0))
                            .and_then(|c| c.get("delta"))
                            .and_then(|d| d.get("content"))
                            .and_then(|c| c.as_str())
                            .unwrap_or("")
                            .to_string();
                        let finish_reason = value
                            .get("choices")
                            .and_then(|c| c.get(0))
                            .and_then(|c| c.get("finish_reason"))
                            .and_then(|f| f.as_str())
                            .map(|s| s.to_string());
                        return Ok(MessageChunk { content: delta, finish_reason });
                    }
                }
                Ok(MessageChunk { content: String::new(), finish_reason: None })
            });

            Ok(Some(Box::pin(chunk_stream) as MessageChunkStream))
        })
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.usage)
    }
}
