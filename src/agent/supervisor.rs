//! Supervisor state machine: classify → select model → route to
//! specialist → run specialist loop → persist thread memory. Loosely
//! grounded on a "Hierarchical" orchestration mode, narrowed from
//! free-form multi-agent debate to a single classify-then-delegate hop
//! per turn.

use crate::agent::router::{classify_task, provider_for_model, route_to_specialist, select_model, SpecialistProfile};
use crate::agent::specialist::{Specialist, SpecialistTurn};
use crate::clients::{ClientWrapper, Message, Role};
use crate::context::AppContext;
use crate::error::{PlatformError, PlatformResult};
use crate::streaming::{StreamBus, StreamEvent};
use stores::model::{ThreadMessage, ThreadRole};
use stores::ThreadMemoryStore;
use uuid::Uuid;

const CONTEXT_TOKEN_BUDGET: usize = 8_000;

fn thread_role_to_clients_role(role: ThreadRole) -> Role {
    match role {
        ThreadRole::System => Role::System,
        ThreadRole::User => Role::User,
        ThreadRole::Assistant => Role::Assistant,
        ThreadRole::Tool => Role::Tool { call_id: String::new() },
    }
}

pub struct SupervisorTurnResult {
    pub profile: SpecialistProfile,
    pub turn: SpecialistTurn,
}

pub async fn handle_turn(ctx: &AppContext, thread_id: Uuid, user_message: &str, stream: &StreamBus) -> PlatformResult<SupervisorTurnResult> {
    stream.emit(StreamEvent::TurnStarted { thread_id: thread_id.to_string() });

    ctx.memory
        .append_message(
            thread_id,
            ThreadMessage { role: ThreadRole::User, content: user_message.to_string(), model_used: None, timestamp: chrono::Utc::now() },
        )
        .await?;

    let task = classify_task(user_message);
    let profile = route_to_specialist(task);
    let selection = select_model(&ctx.config, task);
    let provider = provider_for_model(&ctx.config, &selection.model_name);

    stream.emit(StreamEvent::RoutingDecision {
        specialist: profile.as_str().to_string(),
        reason: selection.reason.clone(),
    });
    stream.emit(StreamEvent::ModelSelection {
        model_name: selection.model_name.clone(),
        display_name: selection.display_name.clone(),
        emoji: selection.emoji.clone(),
        reason: selection.reason.clone(),
    });

    let llm: std::sync::Arc<dyn ClientWrapper> = ctx.llm_client_for(provider, &selection.model_name);

    let trimmed = ctx.memory.trim_for_context(thread_id, CONTEXT_TOKEN_BUDGET).await?;
    let mut history: Vec<Message> = trimmed
        .iter()
        .map(|m| Message { role: thread_role_to_clients_role(m.role), content: std::sync::Arc::from(m.content.as_str()), tool_calls: vec![] })
        .collect();

    let specialist = Specialist::new(profile, llm, ctx.tools.clone());
    let turn = specialist.run(&mut history, stream).await?;

    if turn.final_message.trim().is_empty() {
        stream.emit(StreamEvent::Error { category: "internal".into(), message: "specialist returned an empty final answer".into() });
        return Err(PlatformError::Internal("specialist returned an empty final answer".into()));
    }

    stream.emit(StreamEvent::Final { message: turn.final_message.clone() });

    ctx.memory
        .append_message(
            thread_id,
            ThreadMessage { role: ThreadRole::Assistant, content: turn.final_message.clone(), model_used: Some(selection.model_name), timestamp: chrono::Utc::now() },
        )
        .await?;

    stream.emit(StreamEvent::TurnFinished { thread_id: thread_id.to_string() });

    Ok(SupervisorTurnResult { profile, turn })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;

    #[tokio::test]
    async fn rejects_unknown_thread() {
        let ctx = test_context();
        let (stream, _receiver) = StreamBus::new(16);
        let result = handle_turn(&ctx, Uuid::new_v4(), "hello", &stream).await;
        assert!(result.is_err());
    }
}
