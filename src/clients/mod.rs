//! Provider-agnostic LLM client abstraction, adapted from
//! `cloudllm::client_wrapper::ClientWrapper`. The trait is unchanged in
//! shape; connection pooling moves from a process-global `Lazy` map to
//! an explicit [`HttpClientPool`] owned by [`crate::context::AppContext`]
//! so tests can construct an isolated context instead of sharing process
//! state.

pub mod claude;
pub mod openai;

use async_trait::async_trait;
use futures_util::stream::Stream;
use std::collections::HashMap;
use std::error::Error;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct NativeToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

#[derive(Debug, Clone)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool { call_id: String },
}

#[derive(Clone, Debug)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

#[derive(Clone)]
pub struct Message {
    pub role: Role,
    pub content: Arc<str>,
    pub tool_calls: Vec<NativeToolCall>,
}

impl Message {
    pub fn system(content: impl Into<Arc<str>>) -> Self {
        Self { role: Role::System, content: content.into(), tool_calls: vec![] }
    }

    pub fn user(content: impl Into<Arc<str>>) -> Self {
        Self { role: Role::User, content: content.into(), tool_calls: vec![] }
    }

    pub fn assistant(content: impl Into<Arc<str>>) -> Self {
        Self { role: Role::Assistant, content: content.into(), tool_calls: vec![] }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<Arc<str>>) -> Self {
        Self { role: Role::Tool { call_id: call_id.into() }, content: content.into(), tool_calls: vec![] }
    }
}

#[derive(Clone, Debug)]
pub struct MessageChunk {
    pub content: String,
    pub finish_reason: Option<String>,
}

pub type MessageChunkStream = Pin<Box<dyn Stream<Item = Result<MessageChunk, Box<dyn Error + Send + Sync>>> + Send>>;
pub type MessageStreamFuture<'a> =
    Pin<Box<dyn std::future::Future<Output = Result<Option<MessageChunkStream>, Box<dyn Error + Send + Sync>>> + Send + 'a>>;

/// Trait defining the interface to interact with various LLM providers.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    async fn send_message(
        &self,
        messages: &[Message],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message, Box<dyn Error + Send + Sync>>;

    fn send_message_stream<'a>(
        &'a self,
        _messages: &'a [Message],
        _tools: Option<Vec<ToolDefinition>>,
    ) -> MessageStreamFuture<'a> {
        Box::pin(async { Ok(None) })
    }

    fn model_name(&self) -> &str;

    async fn get_last_usage(&self) -> Option<TokenUsage> {
        if let Some(slot) = self.usage_slot() {
            slot.lock().await.clone()
        } else {
            None
        }
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        None
    }
}

/// Per-base-URL `reqwest::Client` cache owned by [`crate::context::AppContext`].
/// Tuning mirrors a global connection pool; lifetime is scoped to the
/// context instead of the process.
pub struct HttpClientPool {
    clients: StdMutex<HashMap<String, reqwest::Client>>,
    request_timeout: Duration,
}

impl HttpClientPool {
    pub fn new(request_timeout: Duration) -> Self {
        Self { clients: StdMutex::new(HashMap::new()), request_timeout }
    }

    pub fn get(&self, base_url: &str) -> reqwest::Client {
        let mut pool = self.clients.lock().expect("http client pool poisoned");
        if let Some(client) = pool.get(base_url) {
            return client.clone();
        }
        let client = reqwest::ClientBuilder::new()
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .timeout(self.request_timeout)
            .build()
            .expect("failed to build http client");
        pool.insert(base_url.to_string(), client.clone());
        client
    }
}

/// Minimal client stand-ins for tests that wire up a full [`crate::context::AppContext`]
/// but don't exercise LLM behaviour themselves.
pub mod tests_support {
    use super::*;

    /// Echoes the last user message back as the assistant reply, never
    /// emits a tool call.
    pub struct EchoClient;

    #[async_trait]
    impl ClientWrapper for EchoClient {
        async fn send_message(&self, messages: &[Message], _tools: Option<Vec<ToolDefinition>>) -> Result<Message, Box<dyn Error + Send + Sync>> {
            let reply = messages.last().map(|m| m.content.to_string()).unwrap_or_default();
            Ok(Message::assistant(reply))
        }

        fn model_name(&self) -> &str {
            "echo-test-model"
        }
    }
}
