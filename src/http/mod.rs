//! HTTP surface: webhook ingress, the agent chat API (sync and SSE),
//! thread management, and the read-side analytics/retrieval endpoints.
//! Built on `axum`, matching the optional `axum`/`tower` feature set
//! used elsewhere in the stack.

use crate::context::AppContext;
use crate::error::PlatformError;
use crate::ingest::hmac_verify::verify_sha256_signature;
use crate::ingest::normalize::normalize;
use crate::ingest::pipeline::IngestQueue;
use crate::streaming::{StreamBus, StreamEvent};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use stores::model::EventSource;
use uuid::Uuid;

pub struct HttpState {
    pub ctx: Arc<AppContext>,
    pub ingest: Arc<IngestQueue>,
}

impl IntoResponse for PlatformError {
    fn into_response(self) -> Response {
        let status = match &self {
            PlatformError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PlatformError::NotFound(_) => StatusCode::NOT_FOUND,
            PlatformError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            PlatformError::UpstreamUnavailable(_) | PlatformError::Timeout(_) => StatusCode::BAD_GATEWAY,
            PlatformError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string(), "category": self.category() }))).into_response()
    }
}

pub fn router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/webhooks/{source}", post(webhook_ingress))
        .route("/threads", post(new_thread))
        .route("/threads/{thread_id}/messages", post(post_message))
        .route("/api/health", get(health))
        .route("/api/chat", post(chat_stream))
        .route("/api/chat/sync", post(chat_sync))
        .route("/api/threads", get(list_threads))
        .route("/api/threads/{thread_id}", delete(delete_thread))
        .route("/api/prep/1on1", post(prep_one_on_one))
        .route("/api/anomalies", get(anomalies))
        .route("/api/experts/find", post(experts_find))
        .route("/api/search", post(search))
        .route("/api/metrics/dora", get(metrics_dora))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
struct NewThreadRequest {
    title: String,
}

async fn new_thread(State(state): State<Arc<HttpState>>, Json(req): Json<NewThreadRequest>) -> Result<Json<serde_json::Value>, PlatformError> {
    let thread = state.ctx.memory.new_thread(req.title).await.map_err(PlatformError::from)?;
    Ok(Json(serde_json::json!({ "thread_id": thread.thread_id })))
}

async fn list_threads(State(state): State<Arc<HttpState>>) -> Result<Json<serde_json::Value>, PlatformError> {
    let threads = state.ctx.memory.list_threads().await.map_err(PlatformError::from)?;
    Ok(Json(serde_json::json!({ "threads": threads })))
}

async fn delete_thread(State(state): State<Arc<HttpState>>, Path(thread_id): Path<Uuid>) -> Result<StatusCode, PlatformError> {
    state.ctx.memory.delete_thread(thread_id).await.map_err(PlatformError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct PostMessageRequest {
    message: String,
}

#[derive(Serialize)]
struct PostMessageResponse {
    profile: String,
    message: String,
    tool_calls_made: u32,
}

async fn post_message(State(state): State<Arc<HttpState>>, Path(thread_id): Path<Uuid>, Json(req): Json<PostMessageRequest>) -> Result<Json<PostMessageResponse>, PlatformError> {
    let (stream, _receiver) = StreamBus::new(64);
    let result = crate::agent::supervisor::handle_turn(&state.ctx, thread_id, &req.message, &stream).await?;
    Ok(Json(PostMessageResponse {
        profile: result.profile.as_str().to_string(),
        message: result.turn.final_message,
        tool_calls_made: result.turn.tool_calls_made,
    }))
}

#[derive(Deserialize)]
struct ChatRequest {
    thread_id: Uuid,
    message: String,
}

async fn chat_sync(State(state): State<Arc<HttpState>>, Json(req): Json<ChatRequest>) -> Result<Json<PostMessageResponse>, PlatformError> {
    let (stream, _receiver) = StreamBus::new(64);
    let result = crate::agent::supervisor::handle_turn(&state.ctx, req.thread_id, &req.message, &stream).await?;
    Ok(Json(PostMessageResponse {
        profile: result.profile.as_str().to_string(),
        message: result.turn.final_message,
        tool_calls_made: result.turn.tool_calls_made,
    }))
}

/// Runs the turn in the background and streams every [`StreamEvent`] it
/// emits as an SSE frame, closing the connection once the turn finishes
/// or errors.
async fn chat_stream(State(state): State<Arc<HttpState>>, Json(req): Json<ChatRequest>) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let (bus, receiver) = StreamBus::new(256);
    let ctx = state.ctx.clone();
    tokio::spawn(async move {
        if let Err(e) = crate::agent::supervisor::handle_turn(&ctx, req.thread_id, &req.message, &bus).await {
            bus.emit(StreamEvent::Error { category: e.category().to_string(), message: e.to_string() });
        }
    });

    let events = stream::unfold(receiver, |mut receiver| async move {
        receiver.recv().await.map(|event| (Ok::<_, Infallible>(event.into_sse()), receiver))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

#[derive(Deserialize)]
struct EmployeeIdQuery {
    employee_id: Uuid,
}

async fn prep_one_on_one(State(state): State<Arc<HttpState>>, Json(req): Json<EmployeeIdQuery>) -> Result<Json<serde_json::Value>, PlatformError> {
    let result = state.ctx.tools.execute("prepare_one_on_one", serde_json::json!({ "employee_id": req.employee_id })).await.map_err(|e| PlatformError::Internal(e.to_string()))?;
    Ok(Json(serde_json::to_value(result).unwrap_or_default()))
}

#[derive(Deserialize)]
struct AnomaliesQuery {
    project_id: Option<String>,
    days_back: Option<u32>,
}

async fn anomalies(State(state): State<Arc<HttpState>>, Query(query): Query<AnomaliesQuery>) -> Result<Json<serde_json::Value>, PlatformError> {
    let params = serde_json::json!({ "project_id": query.project_id, "days_back": query.days_back.unwrap_or(30) });
    let result = state.ctx.tools.execute("detect_anomalies", params).await.map_err(|e| PlatformError::Internal(e.to_string()))?;
    Ok(Json(serde_json::to_value(result).unwrap_or_default()))
}

#[derive(Deserialize)]
struct ExpertsFindRequest {
    topic: String,
    topic_node_id: Uuid,
    limit: Option<usize>,
}

async fn experts_find(State(state): State<Arc<HttpState>>, Json(req): Json<ExpertsFindRequest>) -> Result<Json<serde_json::Value>, PlatformError> {
    let result = state.ctx.graph_rag.find_experts(req.topic, req.topic_node_id, req.limit.unwrap_or(5)).await?;
    Ok(Json(serde_json::json!({ "candidates": result.candidates, "explanation": result.explanation })))
}

#[derive(Deserialize)]
struct SearchRequest {
    question: String,
    embedding_type: Option<String>,
}

async fn search(State(state): State<Arc<HttpState>>, Json(req): Json<SearchRequest>) -> Result<Json<serde_json::Value>, PlatformError> {
    let embedding_type = req
        .embedding_type
        .as_deref()
        .unwrap_or("project_doc")
        .parse::<stores::model::EmbeddingType>()
        .map_err(PlatformError::InvalidInput)?;
    let answer = state.ctx.rag.answer(&req.question, embedding_type).await?;
    Ok(Json(serde_json::json!({
        "content": answer.content,
        "sources": answer.sources,
        "rewrites_used": answer.rewrites_used,
        "hallucination_flagged": answer.hallucination_flagged,
    })))
}

#[derive(Deserialize)]
struct DoraQuery {
    project_id: Option<String>,
    days_back: Option<u32>,
}

async fn metrics_dora(State(state): State<Arc<HttpState>>, Query(query): Query<DoraQuery>) -> Result<Json<serde_json::Value>, PlatformError> {
    let metrics = state.ctx.event_log.deployment_metrics(query.project_id, query.days_back.unwrap_or(30)).await.map_err(PlatformError::from)?;
    Ok(Json(serde_json::to_value(metrics).unwrap_or_default()))
}

async fn webhook_ingress(State(state): State<Arc<HttpState>>, Path(source): Path<String>, headers: HeaderMap, body: axum::body::Bytes) -> Result<StatusCode, PlatformError> {
    if body.len() > state.ctx.config.ingest.max_payload_bytes {
        return Err(PlatformError::InvalidInput("payload exceeds configured limit".into()));
    }

    let signature = headers
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| PlatformError::InvalidInput("missing webhook signature header".into()))?;
    verify_sha256_signature(&state.ctx.config.ingest.webhook_secret, &body, signature)
        .map_err(|e| PlatformError::InvalidInput(e.to_string()))?;

    let event_source: EventSource = source.parse().map_err(PlatformError::InvalidInput)?;
    let payload: serde_json::Value = serde_json::from_slice(&body).map_err(|e| PlatformError::InvalidInput(e.to_string()))?;
    let event_type = payload.get("event_type").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();

    let event = normalize(event_source, &event_type, &payload, state.ctx.config.ingest.max_payload_bytes)?;
    state.ingest.enqueue(event).await?;
    Ok(StatusCode::ACCEPTED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;

    #[tokio::test]
    async fn health_check_is_ok() {
        assert_eq!(health().await, "ok");
    }

    #[tokio::test]
    async fn new_thread_round_trips() {
        let ctx = Arc::new(test_context());
        let (queue, _worker) = IngestQueue::new(8, ctx.event_log.clone(), ctx.embeddings.clone(), ctx.relational.clone());
        let state = Arc::new(HttpState { ctx, ingest: Arc::new(queue) });
        let response = new_thread(State(state), Json(NewThreadRequest { title: "t".into() })).await.unwrap();
        assert!(response.0.get("thread_id").is_some());
    }

    #[tokio::test]
    async fn list_threads_reflects_created_threads() {
        let ctx = Arc::new(test_context());
        let (queue, _worker) = IngestQueue::new(8, ctx.event_log.clone(), ctx.embeddings.clone(), ctx.relational.clone());
        let state = Arc::new(HttpState { ctx, ingest: Arc::new(queue) });
        new_thread(State(state.clone()), Json(NewThreadRequest { title: "t".into() })).await.unwrap();
        let response = list_threads(State(state)).await.unwrap();
        assert_eq!(response.0["threads"].as_array().unwrap().len(), 1);
    }
}
