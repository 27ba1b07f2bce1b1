//! Analytics materialiser: periodically folds the raw event log and task
//! state into the pre-aggregated rows the agent tools read, so a chat turn
//! never pays the cost of scanning the full log.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use stores::model::{
    CiPipeline, Employee, EmployeeMonthlyMetrics, Event, EventSource, Project, StatusCategory,
    Task, TaskEvent, TaskParticipant,
};
use stores::{EventFilter, EventLogStore, RelationalStore};
use uuid::Uuid;

pub struct Materializer {
    event_log: Arc<dyn EventLogStore>,
    relational: Arc<dyn RelationalStore>,
}

fn month_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(ts.year(), ts.month(), 1, 0, 0, 0).unwrap()
}

/// Matches issue-tracker keys (`PROJ-123`) referenced in PR titles and
/// branch names so code-host activity can be linked back to a task.
fn task_key_pattern() -> Regex {
    Regex::new(r"[A-Z]+-[0-9]+").expect("static pattern is valid")
}

fn resolve_project(projects: &[Project], source: EventSource, external_key: &str) -> Option<Uuid> {
    projects
        .iter()
        .find(|p| match source {
            EventSource::CodeHost => p.code_repo_slug.as_deref() == Some(external_key),
            EventSource::IssueTracker => p.issue_tracker_key.as_deref() == Some(external_key),
            _ => false,
        })
        .map(|p| p.id)
}

fn merge_task_from_event(existing: Option<Task>, event: &Event, project_id: Option<Uuid>) -> Task {
    let meta = &event.metadata;
    let mut task = existing.unwrap_or_else(|| Task {
        id: Uuid::new_v4(),
        source: event.source,
        external_key: event.entity_id.clone(),
        project_id,
        title: event.entity_id.clone(),
        description: None,
        status: "unknown".to_string(),
        status_category: StatusCategory::Todo,
        priority: None,
        reporter_employee_id: None,
        assignee_employee_id: None,
        created_at_source: event.timestamp,
        updated_at_source: event.timestamp,
        due_date: None,
        estimate_points: None,
        labels: Vec::new(),
        metadata: serde_json::json!({}),
    });

    if let Some(title) = meta.get("title").and_then(|v| v.as_str()) {
        task.title = title.to_string();
    }
    if let Some(description) = meta.get("description").and_then(|v| v.as_str()) {
        task.description = Some(description.to_string());
    }
    if let Some(status) = meta.get("to").or_else(|| meta.get("status")).and_then(|v| v.as_str()) {
        task.status = status.to_string();
        task.status_category = StatusCategory::from_status_text(status);
    }
    if let Some(priority) = meta.get("priority").and_then(|v| v.as_str()) {
        task.priority = Some(priority.to_string());
    }
    if let Some(points) = meta.get("estimate_points").and_then(|v| v.as_f64()) {
        task.estimate_points = Some(points as f32);
    }
    if let Some(labels) = meta.get("labels").and_then(|v| v.as_array()) {
        task.labels = labels.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
    }
    task.project_id = project_id.or(task.project_id);
    task.updated_at_source = event.timestamp;
    task
}

impl Materializer {
    pub fn new(event_log: Arc<dyn EventLogStore>, relational: Arc<dyn RelationalStore>) -> Self {
        Self { event_log, relational }
    }

    /// Runs one materialisation pass over the current window, idempotently
    /// overwriting this month's per-employee row and the task/pipeline
    /// state derived from the same events. Recomputing is always safe: the
    /// materialised rows are a pure function of the underlying log.
    pub async fn run_once(&self) -> stores::StoreResult<usize> {
        let employees = self.relational.list_employees(true).await?;
        let now = Utc::now();
        let month = month_start(now);
        let events = self.event_log.query_events(EventFilter { window_days: Some(31), ..Default::default() }).await?;
        let projects = self.relational.list_projects().await?;

        let mut all_tasks = Vec::new();
        for project in &projects {
            all_tasks.extend(self.relational.tasks_for_project(project.id).await?);
        }

        let mut written = 0;
        for employee in &employees {
            let metrics = self.compute_employee_metrics(employee, &events, &all_tasks, month).await?;
            self.relational.upsert_monthly_metrics(metrics).await?;
            written += 1;
        }

        self.materialize_tasks_and_pipelines(&events, &projects).await?;
        Ok(written)
    }

    async fn employee_matches_event(&self, employee: &Employee, event: &Event) -> stores::StoreResult<bool> {
        let Some(actor_id) = event.actor_id.as_deref() else { return Ok(false) };
        if let Some(resolved) = self.relational.resolve_identity(event.source, actor_id).await? {
            if resolved == employee.id {
                return Ok(true);
            }
        }
        Ok(event
            .metadata
            .get("actor_email")
            .and_then(|v| v.as_str())
            .is_some_and(|email| email.eq_ignore_ascii_case(&employee.email)))
    }

    async fn compute_employee_metrics(
        &self,
        employee: &Employee,
        events: &[Event],
        tasks: &[Task],
        month: DateTime<Utc>,
    ) -> stores::StoreResult<EmployeeMonthlyMetrics> {
        let mut tasks_completed = 0;
        let mut tasks_started = 0;
        let mut prs_merged_count = 0;
        let mut pr_reviews_count = 0;
        let mut overdue_open = 0;

        for event in events {
            if !self.employee_matches_event(employee, event).await? {
                continue;
            }
            match event.event_type.as_str() {
                "task_status_changed" => {
                    if let Some(to) = event.metadata.get("to").and_then(|v| v.as_str()) {
                        match StatusCategory::from_status_text(to) {
                            StatusCategory::Done => tasks_completed += 1,
                            StatusCategory::InProgress => tasks_started += 1,
                            _ => {}
                        }
                    }
                }
                "pr_merged" => prs_merged_count += 1,
                "pr_reviewed" => pr_reviews_count += 1,
                "task_overdue" => overdue_open += 1,
                _ => {}
            }
        }

        let blocked_items = tasks
            .iter()
            .filter(|t| t.assignee_employee_id == Some(employee.id) && t.status_category == StatusCategory::Blocked)
            .count() as u32;

        Ok(EmployeeMonthlyMetrics {
            employee_id: employee.id,
            month,
            tasks_completed,
            tasks_started,
            overdue_open,
            blocked_items,
            prs_merged_count,
            pr_reviews_count,
            generated_at: Utc::now(),
        })
    }

    /// Folds issue-tracker and code-host events into `tasks`, `task_events`,
    /// `ci_pipelines`, and `task_participants` rows. Each of these upserts
    /// is keyed so a rerun over the same window never duplicates a row.
    async fn materialize_tasks_and_pipelines(&self, events: &[Event], projects: &[Project]) -> stores::StoreResult<()> {
        let pattern = task_key_pattern();

        for event in events {
            if event.source == EventSource::IssueTracker && event.entity_type.as_deref() == Some("task") {
                let project_id = event
                    .project_id
                    .as_deref()
                    .and_then(|key| resolve_project(projects, EventSource::IssueTracker, key));
                let existing = self.relational.get_task_by_external_key(EventSource::IssueTracker, &event.entity_id).await?;
                let task = merge_task_from_event(existing, event, project_id);
                let task_id = task.id;
                self.relational.upsert_task(task).await?;

                let actor_employee_id = match event.actor_id.as_deref() {
                    Some(actor) => self.relational.resolve_identity(event.source, actor).await?,
                    None => None,
                };
                self.relational
                    .append_task_event(TaskEvent {
                        task_id,
                        occurred_at: event.timestamp,
                        event_type: event.event_type.clone(),
                        from_value: event.metadata.get("from").and_then(|v| v.as_str()).map(str::to_string),
                        to_value: event.metadata.get("to").and_then(|v| v.as_str()).map(str::to_string),
                        actor_employee_id,
                        payload: event.metadata.clone(),
                    })
                    .await?;
            }

            if event.source == EventSource::CodeHost {
                if matches!(event.event_type.as_str(), "ci_status" | "deployment_status" | "workflow_run") {
                    self.materialize_ci_pipeline(event, projects).await?;
                }
                if matches!(event.event_type.as_str(), "pr_opened" | "pr_merged") {
                    self.materialize_task_participants(event, &pattern).await?;
                }
            }
        }
        Ok(())
    }

    async fn materialize_ci_pipeline(&self, event: &Event, projects: &[Project]) -> stores::StoreResult<()> {
        let meta = &event.metadata;
        let (Some(commit_sha), Some(status_str)) =
            (meta.get("commit_sha").and_then(|v| v.as_str()), meta.get("status").and_then(|v| v.as_str()))
        else {
            return Ok(());
        };
        let Ok(status) = status_str.parse() else { return Ok(()) };
        let Some(project_id) = event
            .project_id
            .as_deref()
            .and_then(|key| resolve_project(projects, EventSource::CodeHost, key))
        else {
            return Ok(());
        };

        let parse_ts = |field: &str| {
            meta.get(field)
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
        };

        self.relational
            .upsert_ci_pipeline(CiPipeline {
                project_id,
                commit_sha: commit_sha.to_string(),
                status,
                started_at: parse_ts("started_at"),
                finished_at: parse_ts("finished_at"),
                error_log: meta.get("error_log").and_then(|v| v.as_str()).map(str::to_string),
                trigger_actor: event.actor_id.clone(),
            })
            .await
    }

    async fn materialize_task_participants(&self, event: &Event, pattern: &Regex) -> stores::StoreResult<()> {
        let Some(actor) = event.actor_id.as_deref() else { return Ok(()) };
        let Some(employee_id) = self.relational.resolve_identity(event.source, actor).await? else { return Ok(()) };

        let text = [event.metadata.get("title"), event.metadata.get("branch")]
            .into_iter()
            .flatten()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        for key in pattern.find_iter(&text).map(|m| m.as_str()) {
            if let Some(task) = self.relational.get_task_by_external_key(EventSource::IssueTracker, key).await? {
                self.relational
                    .upsert_task_participant(TaskParticipant { task_id: task.id, employee_id, role: "contributor".into() })
                    .await?;
            }
        }
        Ok(())
    }

    /// Spawns the periodic materialisation loop, independent of request
    /// handling.
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.run_once().await {
                    Ok(n) => tracing::info!(rows = n, "materialisation pass complete"),
                    Err(e) => tracing::error!(error = %e, "materialisation pass failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stores::model::{Employee, Event, EventSource, IdentityMapping};
    use stores::{InMemoryEventLog, InMemoryRelationalStore};

    fn employee(name: &str, email: &str) -> Employee {
        Employee {
            id: Uuid::new_v4(),
            full_name: name.into(),
            email: email.into(),
            title: None,
            role: None,
            team_id: None,
            level: None,
            active: true,
        }
    }

    #[tokio::test]
    async fn run_once_only_counts_events_for_the_matching_employee() {
        let event_log = Arc::new(InMemoryEventLog::new());
        let relational = Arc::new(InMemoryRelationalStore::new());

        let grace = employee("Grace Hopper", "grace@example.com");
        let ada = employee("Ada Lovelace", "ada@example.com");
        relational.upsert_employee(grace.clone()).await.unwrap();
        relational.upsert_employee(ada.clone()).await.unwrap();
        relational
            .upsert_identity_mapping(IdentityMapping {
                employee_id: grace.id,
                source: EventSource::IssueTracker,
                external_id: "jira-grace".into(),
                external_username: None,
            })
            .await
            .unwrap();

        event_log
            .insert(Event::new(
                EventSource::IssueTracker,
                "task_status_changed",
                "PROJ-1",
                Utc::now(),
                None,
                Some("jira-grace".into()),
                Some("task".into()),
                serde_json::json!({"to": "Done"}),
            ))
            .await
            .unwrap();

        let materializer = Materializer::new(event_log, relational.clone());
        let written = materializer.run_once().await.unwrap();
        assert_eq!(written, 2);

        let grace_metrics = relational.monthly_metrics(grace.id, month_start(Utc::now())).await.unwrap().unwrap();
        assert_eq!(grace_metrics.tasks_completed, 1);

        let ada_metrics = relational.monthly_metrics(ada.id, month_start(Utc::now())).await.unwrap().unwrap();
        assert_eq!(ada_metrics.tasks_completed, 0);
    }

    #[tokio::test]
    async fn run_once_materializes_a_task_row_from_the_event_log() {
        let event_log = Arc::new(InMemoryEventLog::new());
        let relational = Arc::new(InMemoryRelationalStore::new());

        event_log
            .insert(Event::new(
                EventSource::IssueTracker,
                "task_status_changed",
                "PROJ-7",
                Utc::now(),
                None,
                None,
                Some("task".into()),
                serde_json::json!({"to": "In Progress", "title": "Ship the thing"}),
            ))
            .await
            .unwrap();

        let materializer = Materializer::new(event_log, relational.clone());
        materializer.run_once().await.unwrap();

        let task = relational.get_task_by_external_key(EventSource::IssueTracker, "PROJ-7").await.unwrap();
        let task = task.expect("task row materialized");
        assert_eq!(task.title, "Ship the thing");
        assert_eq!(task.status_category, StatusCategory::InProgress);

        let events = relational.task_events(task.id).await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn run_once_extracts_task_participants_from_pr_titles() {
        let event_log = Arc::new(InMemoryEventLog::new());
        let relational = Arc::new(InMemoryRelationalStore::new());

        let ada = employee("Ada Lovelace", "ada@example.com");
        relational.upsert_employee(ada.clone()).await.unwrap();
        relational
            .upsert_identity_mapping(IdentityMapping {
                employee_id: ada.id,
                source: EventSource::CodeHost,
                external_id: "ada-gh".into(),
                external_username: None,
            })
            .await
            .unwrap();
        relational
            .upsert_task(Task {
                id: Uuid::new_v4(),
                source: EventSource::IssueTracker,
                external_key: "PROJ-9".into(),
                project_id: None,
                title: "Fix the bug".into(),
                description: None,
                status: "To Do".into(),
                status_category: StatusCategory::Todo,
                priority: None,
                reporter_employee_id: None,
                assignee_employee_id: None,
                created_at_source: Utc::now(),
                updated_at_source: Utc::now(),
                due_date: None,
                estimate_points: None,
                labels: Vec::new(),
                metadata: serde_json::json!({}),
            })
            .await
            .unwrap();

        event_log
            .insert(Event::new(
                EventSource::CodeHost,
                "pr_merged",
                "abc123",
                Utc::now(),
                None,
                Some("ada-gh".into()),
                None,
                serde_json::json!({"title": "PROJ-9: fix the bug"}),
            ))
            .await
            .unwrap();

        let materializer = Materializer::new(event_log, relational.clone());
        materializer.run_once().await.unwrap();

        let task = relational.get_task_by_external_key(EventSource::IssueTracker, "PROJ-9").await.unwrap().unwrap();
        let participants = relational.participants_for_task(task.id).await.unwrap();
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].employee_id, ada.id);
    }
}
