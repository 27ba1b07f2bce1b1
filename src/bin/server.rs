//! Process entry point: wires [`AppContext`], starts the ingestion
//! worker and the periodic materialiser, and serves the HTTP API.

use engintel::config::AppConfig;
use engintel::context::AppContext;
use engintel::http::{router, HttpState};
use engintel::ingest::pipeline::IngestQueue;
use engintel::materializer::Materializer;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = AppConfig::from_env();
    let ctx = Arc::new(AppContext::build(config).await);

    let (ingest_queue, ingest_worker) = IngestQueue::new(ctx.config.ingest.queue_capacity, ctx.event_log.clone(), ctx.embeddings.clone(), ctx.relational.clone());
    let ingest_queue = Arc::new(ingest_queue);
    tokio::spawn(ingest_worker.run());

    let materializer = Arc::new(Materializer::new(ctx.event_log.clone(), ctx.relational.clone()));
    materializer.spawn_periodic(Duration::from_secs(3600));

    let bind_addr = ctx.config.server.bind_addr.clone();
    let state = Arc::new(HttpState { ctx, ingest: ingest_queue });
    let app = router(state);

    tracing::info!(%bind_addr, "starting server");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await.expect("failed to bind server address");
    axum::serve(listener, app).await.expect("server exited unexpectedly");
}
