//! Time-series event log adapter.
//!
//! Backed in production by ClickHouse (`events` table, `MergeTree`
//! partitioned daily, ordered `(source, event_type, timestamp)`). The
//! adapter is the **only writer** of the log and is the durability
//! boundary for ingestion.

use crate::error::{StoreError, StoreResult};
use crate::model::{Event, EventSource};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub source: Option<EventSource>,
    pub event_type: Option<String>,
    pub project_id: Option<String>,
    pub actor_id: Option<String>,
    pub window_days: Option<u32>,
    pub limit: Option<usize>,
}

/// Deployment/DORA metrics over a window for a project.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DeploymentMetrics {
    pub project_id: Option<String>,
    pub total_deployments: u64,
    pub total_failed_deployments: u64,
    /// `failed / total * 100`, `None` when `total_deployments == 0`.
    pub change_failure_rate_pct: Option<f64>,
    pub deployment_freq_per_week: f64,
    pub avg_lead_time_hours: Option<f64>,
    pub total_prs_merged: u64,
    pub total_commits: u64,
    pub total_story_points: f64,
}

#[async_trait]
pub trait EventLogStore: Send + Sync {
    /// Idempotent insert. Returns `true` if a new row was written, `false`
    /// if `event_id` already existed.
    async fn insert(&self, event: Event) -> StoreResult<bool>;

    async fn insert_batch(&self, events: Vec<Event>) -> StoreResult<usize> {
        let mut written = 0;
        for event in events {
            if self.insert(event).await? {
                written += 1;
            }
        }
        Ok(written)
    }

    async fn query_events(&self, filter: EventFilter) -> StoreResult<Vec<Event>>;

    async fn deployment_metrics(
        &self,
        project_id: Option<String>,
        days_back: u32,
    ) -> StoreResult<DeploymentMetrics> {
        let events = self
            .query_events(EventFilter {
                project_id: project_id.clone(),
                window_days: Some(days_back),
                ..Default::default()
            })
            .await?;
        Ok(compute_deployment_metrics(&events, project_id, days_back))
    }

    async fn ping(&self) -> StoreResult<()>;
}

/// Pure computation shared by every backend so the DORA arithmetic is
/// tested once regardless of which store fetched the rows.
pub fn compute_deployment_metrics(
    events: &[Event],
    project_id: Option<String>,
    days_back: u32,
) -> DeploymentMetrics {
    let deployments: Vec<&Event> = events.iter().filter(|e| e.event_type == "deployment").collect();
    let total_deployments = deployments.len() as u64;
    let total_failed_deployments = deployments
        .iter()
        .filter(|e| {
            e.metadata
                .get("conclusion")
                .and_then(|v| v.as_str())
                .map(|c| c == "failure")
                .unwrap_or(false)
        })
        .count() as u64;

    let change_failure_rate_pct = if total_deployments > 0 {
        Some(total_failed_deployments as f64 / total_deployments as f64 * 100.0)
    } else {
        None
    };

    let weeks = (days_back as f64 / 7.0).max(1.0);
    let deployment_freq_per_week = total_deployments as f64 / weeks;

    let lead_times: Vec<f64> = deployments
        .iter()
        .filter_map(|e| e.metadata.get("lead_time_hours").and_then(|v| v.as_f64()))
        .collect();
    let avg_lead_time_hours = if lead_times.is_empty() {
        None
    } else {
        Some(lead_times.iter().sum::<f64>() / lead_times.len() as f64)
    };

    let total_prs_merged = events.iter().filter(|e| e.event_type == "pr_merged").count() as u64;
    let total_commits = events.iter().filter(|e| e.event_type == "push").count() as u64;
    let total_story_points: f64 = events
        .iter()
        .filter(|e| e.event_type == "pr_merged")
        .filter_map(|e| e.metadata.get("story_points").and_then(|v| v.as_f64()))
        .sum();

    DeploymentMetrics {
        project_id,
        total_deployments,
        total_failed_deployments,
        change_failure_rate_pct,
        deployment_freq_per_week,
        avg_lead_time_hours,
        total_prs_merged,
        total_commits,
        total_story_points,
    }
}

/// Per-actor activity rollup used by `get_developer_activity`.
pub fn compute_developer_activity(events: &[Event], actor_id: &str) -> HashMap<String, u64> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for event in events.iter().filter(|e| e.actor_id.as_deref() == Some(actor_id)) {
        *counts.entry(event.event_type.clone()).or_insert(0) += 1;
    }
    counts
}

/// In-process event log used in tests and as the default store when no
/// ClickHouse DSN is configured. Keyed by `event_id` for O(1) dedup checks.
#[derive(Default)]
pub struct InMemoryEventLog {
    rows: DashMap<uuid::Uuid, Event>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventLogStore for InMemoryEventLog {
    async fn insert(&self, event: Event) -> StoreResult<bool> {
        if self.rows.contains_key(&event.event_id) {
            return Ok(false);
        }
        self.rows.insert(event.event_id, event);
        Ok(true)
    }

    async fn query_events(&self, filter: EventFilter) -> StoreResult<Vec<Event>> {
        let cutoff = filter
            .window_days
            .map(|days| Utc::now() - ChronoDuration::days(days as i64));
        let mut rows: Vec<Event> = self
            .rows
            .iter()
            .map(|r| r.value().clone())
            .filter(|e| filter.source.map(|s| s == e.source).unwrap_or(true))
            .filter(|e| {
                filter
                    .event_type
                    .as_ref()
                    .map(|t| t == &e.event_type)
                    .unwrap_or(true)
            })
            .filter(|e| {
                filter
                    .project_id
                    .as_ref()
                    .map(|p| e.project_id.as_deref() == Some(p.as_str()))
                    .unwrap_or(true)
            })
            .filter(|e| {
                filter
                    .actor_id
                    .as_ref()
                    .map(|a| e.actor_id.as_deref() == Some(a.as_str()))
                    .unwrap_or(true)
            })
            .filter(|e| cutoff.map(|c| e.timestamp >= c).unwrap_or(true))
            .collect();
        rows.sort_by_key(|e: &Event| (e.source.as_str().to_string(), e.event_type.clone(), e.timestamp));
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// ClickHouse-backed log (production configuration).
///
/// Every call carries a per-operation deadline via [`tokio::time::timeout`]
/// so no operation can block indefinitely.
pub struct ClickHouseEventLog {
    client: clickhouse::Client,
    deadline: Duration,
}

impl ClickHouseEventLog {
    pub fn new(url: &str, database: &str, deadline: Duration) -> Self {
        let client = clickhouse::Client::default().with_url(url).with_database(database);
        Self { client, deadline }
    }

    async fn with_deadline<F, T>(&self, fut: F) -> StoreResult<T>
    where
        F: std::future::Future<Output = Result<T, clickhouse::error::Error>>,
    {
        match tokio::time::timeout(self.deadline, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(StoreError::Unavailable(e.to_string())),
            Err(_) => Err(StoreError::Timeout(self.deadline)),
        }
    }
}

#[derive(clickhouse::Row, serde::Serialize, serde::Deserialize)]
struct EventRow {
    event_id: String,
    timestamp: i64,
    source: String,
    event_type: String,
    project_id: String,
    actor_id: String,
    entity_id: String,
    entity_type: String,
    metadata: String,
}

impl EventRow {
    fn from_event(e: &Event) -> Self {
        Self {
            event_id: e.event_id.to_string(),
            timestamp: e.timestamp.timestamp(),
            source: e.source.as_str().to_string(),
            event_type: e.event_type.clone(),
            project_id: e.project_id.clone().unwrap_or_default(),
            actor_id: e.actor_id.clone().unwrap_or_default(),
            entity_id: e.entity_id.clone(),
            entity_type: e.entity_type.clone().unwrap_or_default(),
            metadata: e.metadata.to_string(),
        }
    }

    fn into_event(self) -> Option<Event> {
        Some(Event {
            event_id: self.event_id.parse().ok()?,
            timestamp: DateTime::from_timestamp(self.timestamp, 0)?,
            source: self.source.parse().ok()?,
            event_type: self.event_type,
            project_id: (!self.project_id.is_empty()).then_some(self.project_id),
            actor_id: (!self.actor_id.is_empty()).then_some(self.actor_id),
            entity_id: self.entity_id,
            entity_type: (!self.entity_type.is_empty()).then_some(self.entity_type),
            metadata: serde_json::from_str(&self.metadata).unwrap_or(serde_json::Value::Null),
        })
    }
}

#[async_trait]
impl EventLogStore for ClickHouseEventLog {
    async fn insert(&self, event: Event) -> StoreResult<bool> {
        let exists = self
            .with_deadline(
                self.client
                    .query("SELECT count() FROM events WHERE event_id = ?")
                    .bind(event.event_id.to_string())
                    .fetch_one::<u64>(),
            )
            .await?;
        if exists > 0 {
            return Ok(false);
        }
        let row = EventRow::from_event(&event);
        let mut insert = self
            .client
            .insert::<EventRow>("events")
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        self.with_deadline(async {
            insert.write(&row).await?;
            insert.end().await
        })
        .await?;
        Ok(true)
    }

    async fn query_events(&self, filter: EventFilter) -> StoreResult<Vec<Event>> {
        let mut sql = String::from("SELECT * FROM events WHERE 1 = 1");
        if let Some(source) = filter.source {
            sql.push_str(&format!(" AND source = '{}'", source.as_str()));
        }
        if let Some(et) = &filter.event_type {
            sql.push_str(&format!(" AND event_type = '{}'", et.replace('\'', "")));
        }
        if let Some(project_id) = &filter.project_id {
            sql.push_str(&format!(" AND project_id = '{}'", project_id.replace('\'', "")));
        }
        if let Some(actor_id) = &filter.actor_id {
            sql.push_str(&format!(" AND actor_id = '{}'", actor_id.replace('\'', "")));
        }
        if let Some(days) = filter.window_days {
            sql.push_str(&format!(" AND timestamp >= now() - INTERVAL {days} DAY"));
        }
        sql.push_str(" ORDER BY source, event_type, timestamp");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        let rows: Vec<EventRow> = self
            .with_deadline(self.client.query(&sql).fetch_all::<EventRow>())
            .await?;
        Ok(rows.into_iter().filter_map(EventRow::into_event).collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.with_deadline(self.client.query("SELECT 1").fetch_one::<u8>())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deployment(ts_days_ago: i64, failed: bool, lead_time: f64) -> Event {
        Event::new(
            EventSource::CodeHost,
            "deployment",
            format!("dep-{ts_days_ago}-{lead_time}"),
            Utc::now() - ChronoDuration::days(ts_days_ago),
            Some("proj-api".to_string()),
            Some("ci-bot".to_string()),
            None,
            json!({
                "conclusion": if failed { "failure" } else { "success" },
                "lead_time_hours": lead_time,
            }),
        )
    }

    #[tokio::test]
    async fn dedup_on_reinsert() {
        let log = InMemoryEventLog::new();
        let event = deployment(1, false, 2.0);
        assert!(log.insert(event.clone()).await.unwrap());
        assert!(!log.insert(event).await.unwrap());
        assert_eq!(
            log.query_events(EventFilter::default()).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn dora_metrics_scenario_3() {
        let log = InMemoryEventLog::new();
        for i in 0..10 {
            let failed = i < 2;
            log.insert(deployment(i, failed, 0.0)).await.unwrap();
        }
        for lt in [2.0, 4.0, 6.0, 8.0, 10.0] {
            log.insert(deployment(29, false, lt)).await.unwrap();
        }
        for i in 0..20 {
            log.insert(Event::new(
                EventSource::CodeHost,
                "pr_merged",
                format!("pr-{i}"),
                Utc::now(),
                Some("proj-api".to_string()),
                Some("dev".to_string()),
                None,
                json!({}),
            ))
            .await
            .unwrap();
        }

        let metrics = log
            .deployment_metrics(Some("proj-api".to_string()), 30)
            .await
            .unwrap();
        assert_eq!(metrics.total_deployments, 15);
        assert_eq!(metrics.total_failed_deployments, 2);
        assert_eq!(metrics.total_prs_merged, 20);
        assert!(metrics.change_failure_rate_pct.unwrap() > 0.0);
        assert!(metrics.change_failure_rate_pct.unwrap() <= 100.0);
    }

    #[tokio::test]
    async fn change_failure_rate_is_none_without_deployments() {
        let log = InMemoryEventLog::new();
        let metrics = log.deployment_metrics(None, 30).await.unwrap();
        assert_eq!(metrics.total_deployments, 0);
        assert!(metrics.change_failure_rate_pct.is_none());
    }
}
