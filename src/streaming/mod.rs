//! Typed streaming event bus, generalised from an `AgentEvent`/
//! `EventHandler` pair into a channel-based bus that both a console
//! renderer and an SSE HTTP handler can drain.

use axum::response::sse::Event as SseEvent;
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    TurnStarted { thread_id: String },
    RoutingDecision { specialist: String, reason: String },
    ModelSelection { model_name: String, display_name: String, emoji: String, reason: String },
    Thinking { status: String },
    ToolStart { name: String, args: serde_json::Value },
    ToolEnd { name: String, result_preview: String, duration_ms: u64 },
    Token { content: String },
    Final { message: String },
    TurnFinished { thread_id: String },
    Error { category: String, message: String },
}

impl StreamEvent {
    /// Non-essential events (token deltas, thinking status) are dropped
    /// under backpressure; lifecycle and routing events are never dropped.
    pub fn is_essential(&self) -> bool {
        !matches!(self, StreamEvent::Token { .. } | StreamEvent::Thinking { .. })
    }

    pub fn into_sse(self) -> SseEvent {
        let name = match &self {
            StreamEvent::TurnStarted { .. } => "turn_started",
            StreamEvent::RoutingDecision { .. } => "routing_decision",
            StreamEvent::ModelSelection { .. } => "model_selection",
            StreamEvent::Thinking { .. } => "thinking",
            StreamEvent::ToolStart { .. } => "tool_start",
            StreamEvent::ToolEnd { .. } => "tool_end",
            StreamEvent::Token { .. } => "token",
            StreamEvent::Final { .. } => "final",
            StreamEvent::TurnFinished { .. } => "turn_finished",
            StreamEvent::Error { .. } => "error",
        };
        SseEvent::default().event(name).json_data(self).unwrap_or_else(|_| SseEvent::default().event("error").data("serialization failure"))
    }
}

/// Per-turn event bus. Bounded so a stalled SSE client cannot make the
/// agent loop block; non-essential events are dropped first when full.
pub struct StreamBus {
    sender: mpsc::Sender<StreamEvent>,
}

impl StreamBus {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: StreamEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) if !event.is_essential() => {
                tracing::trace!("dropping non-essential stream event under backpressure");
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!("stream bus full, blocking to deliver essential event");
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    let _ = sender.send(event).await;
                });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Renders events to stdout, in the shape of a console `EventHandler`.
pub async fn console_renderer(mut receiver: mpsc::Receiver<StreamEvent>) {
    while let Some(event) = receiver.recv().await {
        match event {
            StreamEvent::Token { content } => print!("{content}"),
            other => println!("[event] {other:?}"),
        }
    }
}

impl std::fmt::Debug for StreamEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", serde_json::to_string(self).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_events_are_non_essential() {
        assert!(!StreamEvent::Token { content: "hi".into() }.is_essential());
        assert!(!StreamEvent::Thinking { status: "retrieving".into() }.is_essential());
        assert!(StreamEvent::TurnFinished { thread_id: "t".into() }.is_essential());
    }

    #[tokio::test]
    async fn full_queue_drops_non_essential_events_without_blocking() {
        let (bus, mut receiver) = StreamBus::new(1);
        bus.emit(StreamEvent::TurnStarted { thread_id: "t".into() });
        bus.emit(StreamEvent::Token { content: "dropped".into() });
        let first = receiver.recv().await.unwrap();
        assert!(matches!(first, StreamEvent::TurnStarted { .. }));
    }
}
