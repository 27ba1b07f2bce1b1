//! End-to-end ingestion: a signed webhook delivery reaches the event log
//! through the HTTP handler, the ingest queue, and the worker loop.

use engintel::context::test_context;
use engintel::http::{router, HttpState};
use engintel::ingest::pipeline::IngestQueue;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use std::sync::Arc;
use stores::EventLogStore;

fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    format!("sha256={}", digest.iter().map(|b| format!("{b:02x}")).collect::<String>())
}

#[tokio::test]
async fn signed_webhook_lands_in_the_event_log() {
    let ctx = Arc::new(test_context());
    let (queue, worker) = IngestQueue::new(16, ctx.event_log.clone(), ctx.embeddings.clone(), ctx.relational.clone());
    let queue = Arc::new(queue);
    let worker_handle = tokio::spawn(worker.run());

    let state = Arc::new(HttpState { ctx: ctx.clone(), ingest: queue.clone() });
    let app = router(state);

    let payload = json!({
        "event_type": "push",
        "after": "deadbeef",
        "repository": {"full_name": "acme/api"},
        "sender": {"login": "octocat"},
        "head_commit": {"timestamp": "2026-01-01T00:00:00Z"},
    });
    let body = payload.to_string();
    let signature = sign(&ctx.config.ingest.webhook_secret, body.as_bytes());

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/webhooks/code-host")
        .header("content-type", "application/json")
        .header("X-Hub-Signature-256", signature)
        .body(axum::body::Body::from(body))
        .unwrap();

    let response = tower::ServiceExt::oneshot(app, request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::ACCEPTED);

    drop(queue);
    worker_handle.await.unwrap();

    let events = ctx.event_log.query_events(stores::EventFilter::default()).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].entity_id, "deadbeef");
}

#[tokio::test]
async fn unsigned_webhook_is_rejected() {
    let ctx = Arc::new(test_context());
    let (queue, _worker) = IngestQueue::new(16, ctx.event_log.clone(), ctx.embeddings.clone(), ctx.relational.clone());
    let state = Arc::new(HttpState { ctx, ingest: Arc::new(queue) });
    let app = router(state);

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/webhooks/code-host")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{}"))
        .unwrap();

    let response = tower::ServiceExt::oneshot(app, request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
}
