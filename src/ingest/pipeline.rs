//! Ingestion pipeline: webhook handlers and the broker consumer both push
//! onto one bounded queue; a pool of workers drains it into the event
//! log and fans embeddable events out to the embedding client. Grounded
//! on a Lambda/MSK handler's broker message envelope, generalised into a
//! Rust `tokio::sync::mpsc` worker loop.

use crate::embedding::EmbeddingClient;
use crate::error::{PlatformError, PlatformResult};
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use stores::model::{Embedding, EmbeddingType, Event, EventSource};
use stores::{EventLogStore, RelationalStore};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Maps an event's entity type to the embedding it should produce, or
/// `None` when the entity carries no text worth embedding.
fn embeddable_type(entity_type: &str) -> Option<EmbeddingType> {
    match entity_type {
        "developer" | "developer_profile" => Some(EmbeddingType::DeveloperProfile),
        "doc" | "project_doc" => Some(EmbeddingType::ProjectDoc),
        _ => None,
    }
}

fn embeddable_content(event: &Event) -> Option<String> {
    event
        .metadata
        .get("content")
        .or_else(|| event.metadata.get("profile_content"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// One broker-delivered record, mirroring the MSK/Lambda envelope the
/// original consumer unwrapped before re-dispatching to the router.
#[derive(Debug, Deserialize)]
pub struct BrokerRecord {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub timestamp: i64,
    pub key: Option<String>,
    /// Base64-encoded JSON payload, matching the original Lambda handler's
    /// wire format.
    pub value: String,
}

impl BrokerRecord {
    pub fn decode_value(&self) -> PlatformResult<Value> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&self.value)
            .map_err(|e| PlatformError::InvalidInput(format!("invalid base64 broker payload: {e}")))?;
        serde_json::from_slice(&bytes).map_err(|e| PlatformError::InvalidInput(format!("invalid json broker payload: {e}")))
    }

    pub fn source(&self) -> Option<EventSource> {
        match self.topic.as_str() {
            t if t.contains("code-host") || t.contains("github") => Some(EventSource::CodeHost),
            t if t.contains("issue") || t.contains("jira") => Some(EventSource::IssueTracker),
            t if t.contains("docs") || t.contains("notion") || t.contains("confluence") => Some(EventSource::Docs),
            _ => None,
        }
    }
}

pub enum IngestJob {
    Normalized(Event),
}

/// Bounded ingestion queue. Senders get backpressure instead of an
/// unbounded memory blow-up when the event log falls behind.
pub struct IngestQueue {
    sender: mpsc::Sender<IngestJob>,
}

pub struct IngestWorker {
    receiver: mpsc::Receiver<IngestJob>,
    event_log: Arc<dyn EventLogStore>,
    embeddings: Arc<dyn EmbeddingClient>,
    relational: Arc<dyn RelationalStore>,
    dead_letter: Arc<dyn DeadLetterSink>,
}

#[async_trait::async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn record(&self, event: Event, reason: String);
}

/// Default sink: logs and drops. Production deployments swap this for a
/// sink backed by a durable queue; the trait boundary exists so that swap
/// never touches worker logic.
pub struct LoggingDeadLetterSink;

#[async_trait::async_trait]
impl DeadLetterSink for LoggingDeadLetterSink {
    async fn record(&self, event: Event, reason: String) {
        tracing::error!(event_id = %event.event_id, reason, "event dead-lettered");
    }
}

impl IngestQueue {
    pub fn new(
        capacity: usize,
        event_log: Arc<dyn EventLogStore>,
        embeddings: Arc<dyn EmbeddingClient>,
        relational: Arc<dyn RelationalStore>,
    ) -> (Self, IngestWorker) {
        let (sender, receiver) = mpsc::channel(capacity);
        (
            Self { sender },
            IngestWorker { receiver, event_log, embeddings, relational, dead_letter: Arc::new(LoggingDeadLetterSink) },
        )
    }

    /// Enqueues a normalized event. Returns `QuotaExceeded` when the queue
    /// is full rather than blocking the HTTP handler indefinitely.
    pub async fn enqueue(&self, event: Event) -> PlatformResult<()> {
        self.sender
            .try_send(IngestJob::Normalized(event))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => PlatformError::QuotaExceeded("ingestion queue is full".into()),
                mpsc::error::TrySendError::Closed(_) => PlatformError::Internal("ingestion queue closed".into()),
            })
    }
}

impl IngestWorker {
    pub fn with_dead_letter_sink(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letter = sink;
        self
    }

    /// Drains the queue until the sender side is dropped. Spawn this as a
    /// background task per the ingestion worker-pool concurrency model.
    pub async fn run(mut self) {
        while let Some(job) = self.receiver.recv().await {
            let IngestJob::Normalized(event) = job;
            match self.event_log.insert(event.clone()).await {
                Ok(true) => {
                    tracing::debug!(event_id = %event.event_id, "event ingested");
                    self.embed_if_applicable(&event).await;
                    tracing::debug!(event_id = %event.event_id, state = "done", "ingestion complete");
                }
                Ok(false) => tracing::debug!(event_id = %event.event_id, "duplicate event skipped"),
                Err(e) if matches!(e, stores::StoreError::Unavailable(_) | stores::StoreError::Timeout(_)) => {
                    self.dead_letter.record(event, e.to_string()).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "event rejected permanently");
                    self.dead_letter.record(event, e.to_string()).await;
                }
            }
        }
    }

    /// Runs the per-event embedding fan-out for entity types the data
    /// model marks embeddable, moving the event through the EMBEDDED or
    /// EMBED_FAILED state before it's considered DONE. Entity types that
    /// carry no embeddable content skip straight to DONE.
    async fn embed_if_applicable(&self, event: &Event) {
        let Some(entity_type) = event.entity_type.as_deref() else { return };
        let Some(embedding_type) = embeddable_type(entity_type) else { return };
        let Some(content) = embeddable_content(event) else { return };

        match self.embeddings.embed(&content).await {
            Ok(vector) => {
                let embedding = Embedding {
                    id: Uuid::new_v4(),
                    embedding_type,
                    source_id: event.entity_id.clone(),
                    source_table: entity_type.to_string(),
                    title: event.entity_id.clone(),
                    content,
                    metadata: event.metadata.clone(),
                    embedding: vector,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                };
                match self.relational.upsert_embedding(embedding).await {
                    Ok(()) => tracing::debug!(event_id = %event.event_id, state = "embedded", "event embedding stored"),
                    Err(e) => {
                        tracing::warn!(event_id = %event.event_id, state = "embed_failed", error = %e, "embedding upsert failed");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(event_id = %event.event_id, state = "embed_failed", error = %e, "embedding generation failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::tests_support::NullEmbeddingClient;
    use serde_json::json;
    use stores::{InMemoryEventLog, InMemoryRelationalStore};

    fn sample_event() -> Event {
        Event::new(EventSource::CodeHost, "push", "abc", Utc::now(), None, None, None, json!({}))
    }

    fn test_deps() -> (Arc<InMemoryEventLog>, Arc<dyn EmbeddingClient>, Arc<dyn RelationalStore>) {
        (Arc::new(InMemoryEventLog::new()), Arc::new(NullEmbeddingClient), Arc::new(InMemoryRelationalStore::new()))
    }

    #[tokio::test]
    async fn enqueued_event_reaches_the_log() {
        let (log, embeddings, relational) = test_deps();
        let (queue, worker) = IngestQueue::new(8, log.clone(), embeddings, relational);
        let handle = tokio::spawn(worker.run());
        queue.enqueue(sample_event()).await.unwrap();
        drop(queue);
        handle.await.unwrap();
        assert_eq!(
            log.query_events(stores::EventFilter::default()).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn full_queue_rejects_with_quota_exceeded() {
        let (log, embeddings, relational) = test_deps();
        let (queue, _worker) = IngestQueue::new(1, log, embeddings, relational);
        queue.enqueue(sample_event()).await.unwrap();
        let second = queue.enqueue(sample_event()).await;
        assert!(matches!(second, Err(PlatformError::QuotaExceeded(_))));
    }

    #[tokio::test]
    async fn embeddable_event_upserts_an_embedding() {
        let (log, embeddings, relational) = test_deps();
        let (queue, worker) = IngestQueue::new(8, log, embeddings, relational.clone());
        let handle = tokio::spawn(worker.run());
        let mut event = sample_event();
        event.entity_type = Some("developer".to_string());
        event.metadata = json!({ "content": "backend engineer focused on payments" });
        queue.enqueue(event).await.unwrap();
        drop(queue);
        handle.await.unwrap();
        let hits = relational
            .search_similar(stores::model::EmbeddingType::DeveloperProfile, &vec![0.0; 8], 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn broker_record_decodes_base64_json() {
        let payload = json!({"hello": "world"});
        let encoded = base64::engine::general_purpose::STANDARD.encode(payload.to_string());
        let record = BrokerRecord {
            topic: "code-host-events".into(),
            partition: 0,
            offset: 1,
            timestamp: 0,
            key: None,
            value: encoded,
        };
        assert_eq!(record.decode_value().unwrap(), payload);
        assert_eq!(record.source(), Some(EventSource::CodeHost));
    }
}
