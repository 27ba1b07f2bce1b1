//! Anthropic client wrapper.
//!
//! Delegates HTTP concerns to [`OpenAIClient`] pointed at an
//! OpenAI-compatible Anthropic gateway (Anthropic's native Messages API
//! has a different wire format; the platform is configured to reach
//! Claude through such a compatibility endpoint rather than carrying a
//! second bespoke HTTP client).

use super::openai::OpenAIClient;
use super::{ClientWrapper, HttpClientPool, Message, MessageChunkStream, MessageStreamFuture, TokenUsage, ToolDefinition};
use async_trait::async_trait;
use std::error::Error;
use tokio::sync::Mutex;

pub struct ClaudeClient {
    delegate: OpenAIClient,
    model: String,
}

impl ClaudeClient {
    pub fn new(pool: &HttpClientPool, api_key: &str, base_url: &str, model: &str) -> Self {
        Self {
            delegate: OpenAIClient::new(pool, api_key, base_url, model),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl ClientWrapper for ClaudeClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn send_message(
        &self,
        messages: &[Message],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        self.delegate.send_message(messages, tools).await
    }

    fn send_message_stream<'a>(
        &'a self,
        messages: &'a [Message],
        tools: Option<Vec<ToolDefinition>>,
    ) -> MessageStreamFuture<'a> {
        self.delegate.send_message_stream(messages, tools)
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        self.delegate.usage_slot()
    }
}
