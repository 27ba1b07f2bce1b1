//! Bounded reason-act loop, adapted from an `Agent::send`/
//! `Agent::generate` tool-calling cycle: send the
//! conversation plus the specialist's scoped tool definitions, execute
//! any native tool calls the model requests, feed results back as
//! `Role::Tool` messages, and repeat until the model answers in prose or
//! the iteration cap is hit.

use crate::agent::router::SpecialistProfile;
use crate::clients::{ClientWrapper, Message, ToolDefinition};
use crate::error::{PlatformError, PlatformResult};
use crate::streaming::{StreamBus, StreamEvent};
use std::sync::Arc;
use std::time::Instant;
use tools::ToolRegistry;

pub struct Specialist {
    pub profile: SpecialistProfile,
    llm: Arc<dyn ClientWrapper>,
    tools: Arc<ToolRegistry>,
    max_iterations: u32,
}

#[derive(Debug, Clone)]
pub struct SpecialistTurn {
    pub final_message: String,
    pub tool_calls_made: u32,
}

impl Specialist {
    pub fn new(profile: SpecialistProfile, llm: Arc<dyn ClientWrapper>, tools: Arc<ToolRegistry>) -> Self {
        Self { profile, llm, tools, max_iterations: 6 }
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let allowed = self.profile.allowed_tools();
        self.tools
            .list()
            .into_iter()
            .filter(|m| allowed.contains(&m.name.as_str()))
            .map(|m| ToolDefinition { name: m.name.clone(), description: m.description.clone(), parameters_schema: m.input_schema() })
            .collect()
    }

    /// Runs the loop to completion, mutating `history` in place so the
    /// caller's thread memory reflects every intermediate tool exchange.
    pub async fn run(&self, history: &mut Vec<Message>, stream: &StreamBus) -> PlatformResult<SpecialistTurn> {
        let tool_defs = self.tool_definitions();
        let mut tool_calls_made = 0;

        for _ in 0..self.max_iterations {
            stream.emit(StreamEvent::Thinking { status: format!("{} is reasoning", self.profile.as_str()) });

            let response = self
                .llm
                .send_message(history, Some(tool_defs.clone()))
                .await
                .map_err(|e| PlatformError::UpstreamUnavailable(e.to_string()))?;

            if response.tool_calls.is_empty() {
                let final_message = response.content.to_string();
                stream.emit(StreamEvent::Token { content: final_message.clone() });
                history.push(response);
                return Ok(SpecialistTurn { final_message, tool_calls_made });
            }

            let calls = response.tool_calls.clone();
            history.push(response);

            for call in calls {
                tool_calls_made += 1;
                if !self.profile.allowed_tools().contains(&call.name.as_str()) {
                    history.push(Message::tool_result(call.id, format!("tool '{}' is not permitted for this specialist", call.name)));
                    continue;
                }
                stream.emit(StreamEvent::ToolStart { name: call.name.clone(), args: call.arguments.clone() });
                let started = Instant::now();
                let result = self.tools.execute(&call.name, call.arguments).await;
                let duration_ms = started.elapsed().as_millis() as u64;
                let content = match result {
                    Ok(tool_result) => serde_json::to_string(&tool_result).unwrap_or_default(),
                    Err(e) => format!("{{\"success\": false, \"error\": {:?}}}", e.to_string()),
                };
                stream.emit(StreamEvent::ToolEnd {
                    name: call.name.clone(),
                    result_preview: content.chars().take(200).collect(),
                    duration_ms,
                });
                history.push(Message::tool_result(call.id, content));
            }
        }

        Err(PlatformError::Internal(format!("specialist exceeded {} reasoning iterations without a final answer", self.max_iterations)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{MessageStreamFuture, NativeToolCall, Role, TokenUsage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    struct ToolCallingClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ClientWrapper for ToolCallingClient {
        async fn send_message(&self, _messages: &[Message], _tools: Option<Vec<ToolDefinition>>) -> Result<Message, Box<dyn std::error::Error + Send + Sync>> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            if i == 0 {
                Ok(Message {
                    role: Role::Assistant,
                    content: std::sync::Arc::from(""),
                    tool_calls: vec![NativeToolCall { id: "call_1".into(), name: "get_developer_workload".into(), arguments: serde_json::json!({"employee_id": uuid::Uuid::nil()}) }],
                })
            } else {
                Ok(Message::assistant("Your workload is at 80%."))
            }
        }

        fn model_name(&self) -> &str {
            "test"
        }

        fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
            None
        }

        fn send_message_stream<'a>(&'a self, _m: &'a [Message], _t: Option<Vec<ToolDefinition>>) -> MessageStreamFuture<'a> {
            Box::pin(async { Ok(None) })
        }
    }

    #[tokio::test]
    async fn runs_a_tool_call_then_returns_final_answer() {
        let relational = Arc::new(stores::InMemoryRelationalStore::new());
        let event_log = Arc::new(stores::InMemoryEventLog::new());
        let graph = Arc::new(stores::InMemoryGraphStore::new());
        let embeddings = Arc::new(crate::embedding::tests_support::NullEmbeddingClient);
        let llm_stub: Arc<dyn ClientWrapper> = Arc::new(crate::clients::tests_support::EchoClient);
        let rag = Arc::new(crate::rag::RagPipeline::new(relational.clone(), embeddings.clone(), llm_stub.clone()));
        let graph_rag = Arc::new(crate::graph_rag::GraphRagPipeline::new(relational.clone(), graph.clone(), embeddings.clone(), llm_stub));
        let actions = Arc::new(crate::actions::tests_support::RecordingActionExecutor::default());
        let mut registry = ToolRegistry::new();
        crate::agent::builtin_tools::register_builtin_tools(&mut registry, event_log, relational, graph, embeddings, rag, graph_rag, actions);

        let specialist = Specialist::new(SpecialistProfile::ProjectCoordinator, Arc::new(ToolCallingClient { calls: AtomicUsize::new(0) }), Arc::new(registry));
        let mut history = vec![Message::user("what's my workload?")];
        let (stream, _receiver) = StreamBus::new(16);
        let turn = specialist.run(&mut history, &stream).await.unwrap();
        assert_eq!(turn.tool_calls_made, 1);
        assert!(turn.final_message.contains("80%"));
    }
}
