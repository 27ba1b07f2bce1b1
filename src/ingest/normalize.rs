//! Normalises raw webhook payloads into the canonical [`Event`] shape.
//! Each source has its own field mapping; all converge on the same
//! deterministic `event_id` derivation so retries and at-least-once
//! broker delivery collapse into one row downstream.

use crate::error::{PlatformError, PlatformResult};
use chrono::{DateTime, Utc};
use serde_json::Value;
use stores::model::{Event, EventSource};

fn truncate_metadata(mut value: Value, max_bytes: usize) -> Value {
    let encoded = value.to_string();
    if encoded.len() <= max_bytes {
        return value;
    }
    if let Value::Object(map) = &mut value {
        map.insert("_truncated".to_string(), Value::Bool(true));
        map.retain(|k, _| k == "_truncated" || encoded.len() <= max_bytes);
    }
    value
}

fn field<'a>(payload: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(payload, |acc, key| acc.get(key))
}

fn str_field(payload: &Value, path: &[&str]) -> Option<String> {
    field(payload, path).and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn timestamp_field(payload: &Value, path: &[&str]) -> DateTime<Utc> {
    field(payload, path)
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

/// Normalises a code-host webhook delivery (`push`, `pull_request`,
/// `deployment_status`, …) into an [`Event`].
pub fn normalize_code_host(event_type: &str, payload: &Value, max_metadata_bytes: usize) -> PlatformResult<Event> {
    let entity_id = str_field(payload, &["after"])
        .or_else(|| str_field(payload, &["pull_request", "id"]).map(|id| id))
        .or_else(|| str_field(payload, &["deployment", "id"]))
        .ok_or_else(|| PlatformError::InvalidInput("code-host payload missing entity id".into()))?;

    let project_id = str_field(payload, &["repository", "full_name"]);
    let actor_id = str_field(payload, &["sender", "login"]);
    let timestamp = timestamp_field(payload, &["head_commit", "timestamp"]);

    Ok(Event::new(
        EventSource::CodeHost,
        event_type,
        entity_id,
        timestamp,
        project_id,
        actor_id,
        None,
        truncate_metadata(payload.clone(), max_metadata_bytes),
    ))
}

/// Normalises an issue-tracker webhook (`issue_updated`, `comment_created`, …).
pub fn normalize_issue_tracker(event_type: &str, payload: &Value, max_metadata_bytes: usize) -> PlatformResult<Event> {
    let entity_id = str_field(payload, &["issue", "key"])
        .ok_or_else(|| PlatformError::InvalidInput("issue-tracker payload missing issue key".into()))?;
    let project_id = str_field(payload, &["issue", "fields", "project", "key"]);
    let actor_id = str_field(payload, &["user", "accountId"]);
    let timestamp = timestamp_field(payload, &["timestamp"]);

    Ok(Event::new(
        EventSource::IssueTracker,
        event_type,
        entity_id,
        timestamp,
        project_id,
        actor_id,
        Some("task".to_string()),
        truncate_metadata(payload.clone(), max_metadata_bytes),
    ))
}

/// Normalises a docs-platform webhook (`page_created`, `page_updated`, …).
pub fn normalize_docs(event_type: &str, payload: &Value, max_metadata_bytes: usize) -> PlatformResult<Event> {
    let entity_id = str_field(payload, &["page", "id"])
        .ok_or_else(|| PlatformError::InvalidInput("docs payload missing page id".into()))?;
    let actor_id = str_field(payload, &["author", "id"]);
    let timestamp = timestamp_field(payload, &["page", "updated_at"]);

    Ok(Event::new(
        EventSource::Docs,
        event_type,
        entity_id,
        timestamp,
        None,
        actor_id,
        Some("doc".to_string()),
        truncate_metadata(payload.clone(), max_metadata_bytes),
    ))
}

pub fn normalize(source: EventSource, event_type: &str, payload: &Value, max_metadata_bytes: usize) -> PlatformResult<Event> {
    match source {
        EventSource::CodeHost => normalize_code_host(event_type, payload, max_metadata_bytes),
        EventSource::IssueTracker => normalize_issue_tracker(event_type, payload, max_metadata_bytes),
        EventSource::Docs => normalize_docs(event_type, payload, max_metadata_bytes),
        EventSource::Internal => Err(PlatformError::InvalidInput("internal events are not webhook-normalised".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_push_event() {
        let payload = json!({
            "after": "abc123",
            "repository": {"full_name": "acme/api"},
            "sender": {"login": "octocat"},
            "head_commit": {"timestamp": "2026-01-01T00:00:00Z"},
        });
        let event = normalize(EventSource::CodeHost, "push", &payload, 65536).unwrap();
        assert_eq!(event.entity_id, "abc123");
        assert_eq!(event.project_id.as_deref(), Some("acme/api"));
        assert_eq!(event.actor_id.as_deref(), Some("octocat"));
    }

    #[test]
    fn missing_entity_id_is_invalid_input() {
        let payload = json!({});
        let result = normalize(EventSource::CodeHost, "push", &payload, 65536);
        assert!(matches!(result, Err(PlatformError::InvalidInput(_))));
    }

    #[test]
    fn reprocessing_same_payload_yields_same_event_id() {
        let payload = json!({
            "after": "abc123",
            "repository": {"full_name": "acme/api"},
            "sender": {"login": "octocat"},
            "head_commit": {"timestamp": "2026-01-01T00:00:00Z"},
        });
        let a = normalize(EventSource::CodeHost, "push", &payload, 65536).unwrap();
        let b = normalize(EventSource::CodeHost, "push", &payload, 65536).unwrap();
        assert_eq!(a.event_id, b.event_id);
    }
}
