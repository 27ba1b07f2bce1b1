//! Canonical domain entities.
//!
//! These types are shared by every store adapter and by the tool
//! implementations in the agent runtime. Enums are kept closed and
//! low-cardinality — extending them is a schema change, not a runtime
//! concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Where an event originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventSource {
    CodeHost,
    IssueTracker,
    Docs,
    Internal,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::CodeHost => "code-host",
            EventSource::IssueTracker => "issue-tracker",
            EventSource::Docs => "docs",
            EventSource::Internal => "internal",
        }
    }
}

impl std::str::FromStr for EventSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code-host" => Ok(EventSource::CodeHost),
            "issue-tracker" => Ok(EventSource::IssueTracker),
            "docs" => Ok(EventSource::Docs),
            "internal" => Ok(EventSource::Internal),
            other => Err(format!("unknown event source: {other}")),
        }
    }
}

/// Immutable, append-only record in the time-series event log.
///
/// `event_id` is derived deterministically from `(source, event_type,
/// entity_id, timestamp)` so re-delivery of the same logical event
/// produces the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub source: EventSource,
    pub event_type: String,
    pub project_id: Option<String>,
    pub actor_id: Option<String>,
    pub entity_id: String,
    pub entity_type: Option<String>,
    /// Opaque JSON payload, capped at 64 KiB by the normaliser before insert.
    pub metadata: serde_json::Value,
}

impl Event {
    /// Deterministic idempotency key derivation.
    ///
    /// Earlier ingestion code sometimes generated `event_id` from a
    /// random UUID instead; that path is retired — this is the only
    /// derivation used.
    pub fn derive_event_id(
        source: EventSource,
        event_type: &str,
        entity_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Uuid {
        let mut hasher = Sha256::new();
        hasher.update(source.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(event_type.as_bytes());
        hasher.update(b"|");
        hasher.update(entity_id.as_bytes());
        hasher.update(b"|");
        hasher.update(timestamp.to_rfc3339().as_bytes());
        let digest = hasher.finalize();
        Uuid::new_v8(digest[..16].try_into().expect("sha256 digest >= 16 bytes"))
    }

    pub fn new(
        source: EventSource,
        event_type: impl Into<String>,
        entity_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        project_id: Option<String>,
        actor_id: Option<String>,
        entity_type: Option<String>,
        metadata: serde_json::Value,
    ) -> Self {
        let event_type = event_type.into();
        let entity_id = entity_id.into();
        let event_id = Self::derive_event_id(source, &event_type, &entity_id, timestamp);
        Self {
            event_id,
            timestamp,
            source,
            event_type,
            project_id,
            actor_id,
            entity_id,
            entity_type,
            metadata,
        }
    }

    /// The natural dedup key.
    pub fn dedup_key(&self) -> (EventSource, &str, &str, DateTime<Utc>) {
        (self.source, &self.event_type, &self.entity_id, self.timestamp)
    }
}

/// Closed set — extending requires a schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingType {
    DeveloperProfile,
    ProjectDoc,
}

impl EmbeddingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingType::DeveloperProfile => "developer_profile",
            EmbeddingType::ProjectDoc => "project_doc",
        }
    }
}

impl std::str::FromStr for EmbeddingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "developer_profile" => Ok(EmbeddingType::DeveloperProfile),
            "project_doc" => Ok(EmbeddingType::ProjectDoc),
            other => Err(format!("unknown embedding type: {other}")),
        }
    }
}

/// Mutable-by-upsert semantic vector row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub id: Uuid,
    pub embedding_type: EmbeddingType,
    pub source_id: String,
    pub source_table: String,
    pub title: String,
    pub content: String,
    pub metadata: serde_json::Value,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarEmbedding {
    pub id: Uuid,
    pub source_id: String,
    pub title: String,
    pub content: String,
    pub metadata: serde_json::Value,
    /// `1 - cosine_distance`, clamped to `[-1, 1]`.
    pub similarity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub title: Option<String>,
    pub role: Option<String>,
    pub team_id: Option<Uuid>,
    pub level: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Planned,
    Active,
    OnHold,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Planned => "planned",
            ProjectStatus::Active => "active",
            ProjectStatus::OnHold => "on_hold",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(ProjectStatus::Planned),
            "active" => Ok(ProjectStatus::Active),
            "on_hold" => Ok(ProjectStatus::OnHold),
            "completed" => Ok(ProjectStatus::Completed),
            "cancelled" => Ok(ProjectStatus::Cancelled),
            other => Err(format!("unknown project status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl ProjectPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectPriority::Low => "low",
            ProjectPriority::Medium => "medium",
            ProjectPriority::High => "high",
            ProjectPriority::Critical => "critical",
        }
    }
}

impl std::str::FromStr for ProjectPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(ProjectPriority::Low),
            "medium" => Ok(ProjectPriority::Medium),
            "high" => Ok(ProjectPriority::High),
            "critical" => Ok(ProjectPriority::Critical),
            other => Err(format!("unknown project priority: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub priority: ProjectPriority,
    pub target_date: Option<DateTime<Utc>>,
    pub code_repo_slug: Option<String>,
    pub issue_tracker_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectAssignment {
    pub employee_id: Uuid,
    pub project_id: Uuid,
    pub role: String,
    /// `[0, 100]`. The *sum* across an employee's active projects may exceed
    /// 100 — that is exactly the condition the resource planner flags.
    pub allocated_percent: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityMapping {
    pub employee_id: Uuid,
    pub source: EventSource,
    pub external_id: String,
    pub external_username: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    Todo,
    InProgress,
    Done,
    Blocked,
}

impl StatusCategory {
    /// Fixed status-text mapping table.
    pub fn from_status_text(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase();
        const TODO: &[&str] = &["to do", "open", "backlog", "new"];
        const IN_PROGRESS: &[&str] = &["in progress", "in development", "in review", "code review"];
        const DONE: &[&str] = &["done", "closed", "resolved", "completed"];
        const BLOCKED: &[&str] = &["blocked", "on hold", "waiting"];
        if TODO.contains(&normalized.as_str()) {
            StatusCategory::Todo
        } else if IN_PROGRESS.contains(&normalized.as_str()) {
            StatusCategory::InProgress
        } else if DONE.contains(&normalized.as_str()) {
            StatusCategory::Done
        } else if BLOCKED.contains(&normalized.as_str()) {
            StatusCategory::Blocked
        } else {
            StatusCategory::Todo
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCategory::Todo => "todo",
            StatusCategory::InProgress => "in_progress",
            StatusCategory::Done => "done",
            StatusCategory::Blocked => "blocked",
        }
    }
}

impl std::str::FromStr for StatusCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(StatusCategory::Todo),
            "in_progress" => Ok(StatusCategory::InProgress),
            "done" => Ok(StatusCategory::Done),
            "blocked" => Ok(StatusCategory::Blocked),
            other => Err(format!("unknown status category: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub source: EventSource,
    pub external_key: String,
    pub project_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub status_category: StatusCategory,
    pub priority: Option<String>,
    pub reporter_employee_id: Option<Uuid>,
    pub assignee_employee_id: Option<Uuid>,
    pub created_at_source: DateTime<Utc>,
    pub updated_at_source: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub estimate_points: Option<f32>,
    pub labels: Vec<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub event_type: String,
    pub from_value: Option<String>,
    pub to_value: Option<String>,
    pub actor_employee_id: Option<Uuid>,
    pub payload: serde_json::Value,
}

/// A person associated with a task beyond its reporter/assignee — a PR
/// reviewer or a collaborator named in a branch or title. Extracted from
/// issue-key-shaped tokens (`[A-Z]+-[0-9]+`) in code-host payloads and
/// joined back to the task they reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskParticipant {
    pub task_id: Uuid,
    pub employee_id: Uuid,
    pub role: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiStatus {
    Pending,
    Success,
    Failure,
    Cancelled,
}

impl CiStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CiStatus::Pending => "pending",
            CiStatus::Success => "success",
            CiStatus::Failure => "failure",
            CiStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for CiStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CiStatus::Pending),
            "success" => Ok(CiStatus::Success),
            "failure" => Ok(CiStatus::Failure),
            "cancelled" => Ok(CiStatus::Cancelled),
            other => Err(format!("unknown ci status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiPipeline {
    pub project_id: Uuid,
    pub commit_sha: String,
    pub status: CiStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_log: Option<String>,
    pub trigger_actor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeMonthlyMetrics {
    pub employee_id: Uuid,
    /// First day of the month, UTC.
    pub month: DateTime<Utc>,
    pub tasks_completed: u32,
    pub tasks_started: u32,
    pub overdue_open: u32,
    pub blocked_items: u32,
    pub prs_merged_count: u32,
    pub pr_reviews_count: u32,
    pub generated_at: DateTime<Utc>,
}

/// Role of a message in a [`ConversationThread`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadRole {
    User,
    Assistant,
    Tool,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub role: ThreadRole,
    pub content: String,
    pub model_used: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationThread {
    pub thread_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub messages: Vec<ThreadMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_is_deterministic() {
        let ts = Utc::now();
        let a = Event::derive_event_id(EventSource::CodeHost, "push", "abc123", ts);
        let b = Event::derive_event_id(EventSource::CodeHost, "push", "abc123", ts);
        assert_eq!(a, b);
    }

    #[test]
    fn event_id_changes_with_entity() {
        let ts = Utc::now();
        let a = Event::derive_event_id(EventSource::CodeHost, "push", "abc123", ts);
        let b = Event::derive_event_id(EventSource::CodeHost, "push", "def456", ts);
        assert_ne!(a, b);
    }

    #[test]
    fn status_category_maps_known_buckets() {
        assert_eq!(StatusCategory::from_status_text("In Review"), StatusCategory::InProgress);
        assert_eq!(StatusCategory::from_status_text("Closed"), StatusCategory::Done);
        assert_eq!(StatusCategory::from_status_text("On Hold"), StatusCategory::Blocked);
        assert_eq!(StatusCategory::from_status_text("Something Else"), StatusCategory::Todo);
    }
}
