//! Relational + vector store adapter for employees, projects, tasks, and
//! their embeddings.
//!
//! Production backend is PostgreSQL with the `pgvector` extension, with
//! a `check_extension` / `execute_query` / `execute_write_returning`
//! shape translated into a typed Rust trait.

use crate::error::{StoreError, StoreResult};
use crate::model::{
    CiPipeline, CiStatus, Embedding, EmbeddingType, Employee, EmployeeMonthlyMetrics, EventSource,
    IdentityMapping, Project, ProjectAssignment, ProjectPriority, ProjectStatus, SimilarEmbedding,
    StatusCategory, Task, TaskEvent, TaskParticipant,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn upsert_employee(&self, employee: Employee) -> StoreResult<()>;
    async fn get_employee(&self, id: Uuid) -> StoreResult<Employee>;
    async fn list_employees(&self, active_only: bool) -> StoreResult<Vec<Employee>>;

    async fn upsert_project(&self, project: Project) -> StoreResult<()>;
    async fn get_project(&self, id: Uuid) -> StoreResult<Project>;
    async fn list_projects(&self) -> StoreResult<Vec<Project>>;

    async fn upsert_assignment(&self, assignment: ProjectAssignment) -> StoreResult<()>;
    async fn assignments_for_employee(&self, employee_id: Uuid) -> StoreResult<Vec<ProjectAssignment>>;

    /// Sum of `allocated_percent` across active assignments. Overallocation
    /// is >100, under-allocation is <50.
    async fn workload_percent(&self, employee_id: Uuid) -> StoreResult<u32> {
        let sum: u32 = self
            .assignments_for_employee(employee_id)
            .await?
            .into_iter()
            .map(|a| a.allocated_percent as u32)
            .sum();
        Ok(sum)
    }

    async fn upsert_identity_mapping(&self, mapping: IdentityMapping) -> StoreResult<()>;
    async fn resolve_identity(&self, source: EventSource, external_id: &str) -> StoreResult<Option<Uuid>>;

    async fn upsert_task(&self, task: Task) -> StoreResult<()>;
    async fn get_task_by_external_key(&self, source: EventSource, external_key: &str) -> StoreResult<Option<Task>>;
    async fn tasks_for_project(&self, project_id: Uuid) -> StoreResult<Vec<Task>>;
    async fn append_task_event(&self, event: TaskEvent) -> StoreResult<()>;
    async fn task_events(&self, task_id: Uuid) -> StoreResult<Vec<TaskEvent>>;

    /// Conflict-ignored on `(task_id, employee_id, role)` — re-running the
    /// materialiser over the same log never duplicates a participant row.
    async fn upsert_task_participant(&self, participant: TaskParticipant) -> StoreResult<()>;
    async fn participants_for_task(&self, task_id: Uuid) -> StoreResult<Vec<TaskParticipant>>;

    async fn upsert_ci_pipeline(&self, pipeline: CiPipeline) -> StoreResult<()>;
    async fn ci_pipelines_for_project(&self, project_id: Uuid) -> StoreResult<Vec<CiPipeline>>;

    async fn upsert_monthly_metrics(&self, metrics: EmployeeMonthlyMetrics) -> StoreResult<()>;
    async fn monthly_metrics(&self, employee_id: Uuid, month: chrono::DateTime<chrono::Utc>) -> StoreResult<Option<EmployeeMonthlyMetrics>>;

    async fn upsert_embedding(&self, embedding: Embedding) -> StoreResult<()>;

    /// Cosine similarity search. `similarity ∈ [-1, 1]`, results ordered
    /// descending, ties broken by `id`.
    async fn search_similar(
        &self,
        embedding_type: EmbeddingType,
        query: &[f32],
        limit: usize,
    ) -> StoreResult<Vec<SimilarEmbedding>>;

    async fn ping(&self) -> StoreResult<()>;
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

/// In-process relational store used in tests and as a local fallback.
#[derive(Default)]
pub struct InMemoryRelationalStore {
    employees: DashMap<Uuid, Employee>,
    projects: DashMap<Uuid, Project>,
    assignments: DashMap<Uuid, Vec<ProjectAssignment>>,
    identities: DashMap<(String, String), Uuid>,
    tasks: DashMap<Uuid, Task>,
    tasks_by_key: DashMap<(String, String), Uuid>,
    task_events: DashMap<Uuid, Vec<TaskEvent>>,
    task_participants: DashMap<Uuid, Vec<TaskParticipant>>,
    ci_pipelines: DashMap<Uuid, Vec<CiPipeline>>,
    monthly_metrics: DashMap<(Uuid, chrono::DateTime<chrono::Utc>), EmployeeMonthlyMetrics>,
    embeddings: DashMap<Uuid, Embedding>,
}

impl InMemoryRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RelationalStore for InMemoryRelationalStore {
    async fn upsert_employee(&self, employee: Employee) -> StoreResult<()> {
        self.employees.insert(employee.id, employee);
        Ok(())
    }

    async fn get_employee(&self, id: Uuid) -> StoreResult<Employee> {
        self.employees
            .get(&id)
            .map(|e| e.clone())
            .ok_or_else(|| StoreError::NotFound(format!("employee {id}")))
    }

    async fn list_employees(&self, active_only: bool) -> StoreResult<Vec<Employee>> {
        Ok(self
            .employees
            .iter()
            .map(|e| e.value().clone())
            .filter(|e| !active_only || e.active)
            .collect())
    }

    async fn upsert_project(&self, project: Project) -> StoreResult<()> {
        self.projects.insert(project.id, project);
        Ok(())
    }

    async fn get_project(&self, id: Uuid) -> StoreResult<Project> {
        self.projects
            .get(&id)
            .map(|p| p.clone())
            .ok_or_else(|| StoreError::NotFound(format!("project {id}")))
    }

    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        Ok(self.projects.iter().map(|p| p.value().clone()).collect())
    }

    async fn upsert_assignment(&self, assignment: ProjectAssignment) -> StoreResult<()> {
        let mut entry = self.assignments.entry(assignment.employee_id).or_default();
        if let Some(existing) = entry.iter_mut().find(|a| a.project_id == assignment.project_id) {
            *existing = assignment;
        } else {
            entry.push(assignment);
        }
        Ok(())
    }

    async fn assignments_for_employee(&self, employee_id: Uuid) -> StoreResult<Vec<ProjectAssignment>> {
        Ok(self
            .assignments
            .get(&employee_id)
            .map(|v| v.clone())
            .unwrap_or_default())
    }

    async fn upsert_identity_mapping(&self, mapping: IdentityMapping) -> StoreResult<()> {
        self.identities.insert(
            (mapping.source.as_str().to_string(), mapping.external_id.clone()),
            mapping.employee_id,
        );
        Ok(())
    }

    async fn resolve_identity(&self, source: EventSource, external_id: &str) -> StoreResult<Option<Uuid>> {
        Ok(self
            .identities
            .get(&(source.as_str().to_string(), external_id.to_string()))
            .map(|id| *id))
    }

    async fn upsert_task(&self, task: Task) -> StoreResult<()> {
        self.tasks_by_key
            .insert((task.source.as_str().to_string(), task.external_key.clone()), task.id);
        self.tasks.insert(task.id, task);
        Ok(())
    }

    async fn get_task_by_external_key(&self, source: EventSource, external_key: &str) -> StoreResult<Option<Task>> {
        let Some(id) = self
            .tasks_by_key
            .get(&(source.as_str().to_string(), external_key.to_string()))
            .map(|id| *id)
        else {
            return Ok(None);
        };
        Ok(self.tasks.get(&id).map(|t| t.clone()))
    }

    async fn tasks_for_project(&self, project_id: Uuid) -> StoreResult<Vec<Task>> {
        Ok(self
            .tasks
            .iter()
            .map(|t| t.value().clone())
            .filter(|t| t.project_id == Some(project_id))
            .collect())
    }

    async fn append_task_event(&self, event: TaskEvent) -> StoreResult<()> {
        let mut entry = self.task_events.entry(event.task_id).or_default();
        let duplicate = entry
            .iter()
            .any(|e| e.occurred_at == event.occurred_at && e.event_type == event.event_type);
        if !duplicate {
            entry.push(event);
        }
        Ok(())
    }

    async fn task_events(&self, task_id: Uuid) -> StoreResult<Vec<TaskEvent>> {
        Ok(self.task_events.get(&task_id).map(|v| v.clone()).unwrap_or_default())
    }

    async fn upsert_task_participant(&self, participant: TaskParticipant) -> StoreResult<()> {
        let mut entry = self.task_participants.entry(participant.task_id).or_default();
        let exists = entry
            .iter()
            .any(|p| p.employee_id == participant.employee_id && p.role == participant.role);
        if !exists {
            entry.push(participant);
        }
        Ok(())
    }

    async fn participants_for_task(&self, task_id: Uuid) -> StoreResult<Vec<TaskParticipant>> {
        Ok(self.task_participants.get(&task_id).map(|v| v.clone()).unwrap_or_default())
    }

    async fn upsert_ci_pipeline(&self, pipeline: CiPipeline) -> StoreResult<()> {
        let mut entry = self.ci_pipelines.entry(pipeline.project_id).or_default();
        if let Some(existing) = entry.iter_mut().find(|p| p.commit_sha == pipeline.commit_sha) {
            *existing = pipeline;
        } else {
            entry.push(pipeline);
        }
        Ok(())
    }

    async fn ci_pipelines_for_project(&self, project_id: Uuid) -> StoreResult<Vec<CiPipeline>> {
        Ok(self
            .ci_pipelines
            .get(&project_id)
            .map(|v| v.clone())
            .unwrap_or_default())
    }

    async fn upsert_monthly_metrics(&self, metrics: EmployeeMonthlyMetrics) -> StoreResult<()> {
        self.monthly_metrics.insert((metrics.employee_id, metrics.month), metrics);
        Ok(())
    }

    async fn monthly_metrics(
        &self,
        employee_id: Uuid,
        month: chrono::DateTime<chrono::Utc>,
    ) -> StoreResult<Option<EmployeeMonthlyMetrics>> {
        Ok(self.monthly_metrics.get(&(employee_id, month)).map(|m| m.clone()))
    }

    async fn upsert_embedding(&self, embedding: Embedding) -> StoreResult<()> {
        self.embeddings.insert(embedding.id, embedding);
        Ok(())
    }

    async fn search_similar(
        &self,
        embedding_type: EmbeddingType,
        query: &[f32],
        limit: usize,
    ) -> StoreResult<Vec<SimilarEmbedding>> {
        let mut scored: Vec<SimilarEmbedding> = self
            .embeddings
            .iter()
            .map(|e| e.value().clone())
            .filter(|e| e.embedding_type == embedding_type)
            .map(|e| SimilarEmbedding {
                id: e.id,
                source_id: e.source_id,
                title: e.title,
                content: e.content,
                metadata: e.metadata,
                similarity: cosine_similarity(query, &e.embedding),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// PostgreSQL + pgvector backend. A single pipelined connection is shared
/// behind a [`Semaphore`] that bounds concurrent in-flight statements,
/// mirroring the orchestration layer's bounded-pool pattern.
pub struct PostgresStore {
    client: Arc<tokio_postgres::Client>,
    limiter: Arc<Semaphore>,
    deadline: Duration,
}

impl PostgresStore {
    pub async fn connect(dsn: &str, max_concurrency: usize, deadline: Duration) -> StoreResult<Self> {
        let (client, connection) = tokio_postgres::connect(dsn, tokio_postgres::NoTls)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "postgres connection terminated");
            }
        });
        Ok(Self {
            client: Arc::new(client),
            limiter: Arc::new(Semaphore::new(max_concurrency)),
            deadline,
        })
    }

    async fn permit(&self) -> StoreResult<tokio::sync::SemaphorePermit<'_>> {
        tokio::time::timeout(self.deadline, self.limiter.acquire())
            .await
            .map_err(|_| StoreError::Timeout(self.deadline))?
            .map_err(|e| StoreError::Internal(e.to_string()))
    }
}

fn row_to_project(row: &tokio_postgres::Row) -> StoreResult<Project> {
    let status: String = row.get(3);
    let priority: String = row.get(4);
    Ok(Project {
        id: row.get(0),
        name: row.get(1),
        description: row.get(2),
        status: ProjectStatus::from_str(&status).map_err(StoreError::Internal)?,
        priority: ProjectPriority::from_str(&priority).map_err(StoreError::Internal)?,
        target_date: row.get(5),
        code_repo_slug: row.get(6),
        issue_tracker_key: row.get(7),
    })
}

fn row_to_task(row: &tokio_postgres::Row) -> StoreResult<Task> {
    let source: String = row.get(1);
    let status_category: String = row.get(7);
    Ok(Task {
        id: row.get(0),
        source: EventSource::from_str(&source).map_err(StoreError::Internal)?,
        external_key: row.get(2),
        project_id: row.get(3),
        title: row.get(4),
        description: row.get(5),
        status: row.get(6),
        status_category: StatusCategory::from_str(&status_category).map_err(StoreError::Internal)?,
        priority: row.get(8),
        reporter_employee_id: row.get(9),
        assignee_employee_id: row.get(10),
        created_at_source: row.get(11),
        updated_at_source: row.get(12),
        due_date: row.get(13),
        estimate_points: row.get(14),
        labels: row.get(15),
        metadata: row.get(16),
    })
}

fn row_to_ci_pipeline(row: &tokio_postgres::Row) -> StoreResult<CiPipeline> {
    let status: String = row.get(2);
    Ok(CiPipeline {
        project_id: row.get(0),
        commit_sha: row.get(1),
        status: CiStatus::from_str(&status).map_err(StoreError::Internal)?,
        started_at: row.get(3),
        finished_at: row.get(4),
        error_log: row.get(5),
        trigger_actor: row.get(6),
    })
}

#[async_trait]
impl RelationalStore for PostgresStore {
    async fn upsert_employee(&self, employee: Employee) -> StoreResult<()> {
        let _permit = self.permit().await?;
        self.client
            .execute(
                "INSERT INTO employees (id, full_name, email, title, role, team_id, level, active)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 ON CONFLICT (id) DO UPDATE SET
                   full_name = EXCLUDED.full_name, email = EXCLUDED.email,
                   title = EXCLUDED.title, role = EXCLUDED.role,
                   team_id = EXCLUDED.team_id, level = EXCLUDED.level,
                   active = EXCLUDED.active",
                &[
                    &employee.id,
                    &employee.full_name,
                    &employee.email,
                    &employee.title,
                    &employee.role,
                    &employee.team_id,
                    &employee.level,
                    &employee.active,
                ],
            )
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn get_employee(&self, id: Uuid) -> StoreResult<Employee> {
        let _permit = self.permit().await?;
        let row = self
            .client
            .query_opt("SELECT id, full_name, email, title, role, team_id, level, active FROM employees WHERE id = $1", &[&id])
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .ok_or_else(|| StoreError::NotFound(format!("employee {id}")))?;
        Ok(Employee {
            id: row.get(0),
            full_name: row.get(1),
            email: row.get(2),
            title: row.get(3),
            role: row.get(4),
            team_id: row.get(5),
            level: row.get(6),
            active: row.get(7),
        })
    }

    async fn list_employees(&self, active_only: bool) -> StoreResult<Vec<Employee>> {
        let _permit = self.permit().await?;
        let sql = if active_only {
            "SELECT id, full_name, email, title, role, team_id, level, active FROM employees WHERE active"
        } else {
            "SELECT id, full_name, email, title, role, team_id, level, active FROM employees"
        };
        let rows = self
            .client
            .query(sql, &[])
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|row| Employee {
                id: row.get(0),
                full_name: row.get(1),
                email: row.get(2),
                title: row.get(3),
                role: row.get(4),
                team_id: row.get(5),
                level: row.get(6),
                active: row.get(7),
            })
            .collect())
    }

    async fn upsert_project(&self, project: Project) -> StoreResult<()> {
        let _permit = self.permit().await?;
        self.client
            .execute(
                "INSERT INTO projects (id, name, description, status, priority, target_date, code_repo_slug, issue_tracker_key)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 ON CONFLICT (id) DO UPDATE SET
                   name = EXCLUDED.name, description = EXCLUDED.description,
                   status = EXCLUDED.status, priority = EXCLUDED.priority,
                   target_date = EXCLUDED.target_date, code_repo_slug = EXCLUDED.code_repo_slug,
                   issue_tracker_key = EXCLUDED.issue_tracker_key",
                &[
                    &project.id,
                    &project.name,
                    &project.description,
                    &project.status.as_str(),
                    &project.priority.as_str(),
                    &project.target_date,
                    &project.code_repo_slug,
                    &project.issue_tracker_key,
                ],
            )
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn get_project(&self, id: Uuid) -> StoreResult<Project> {
        let _permit = self.permit().await?;
        let row = self
            .client
            .query_opt(
                "SELECT id, name, description, status, priority, target_date, code_repo_slug, issue_tracker_key
                 FROM projects WHERE id = $1",
                &[&id],
            )
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .ok_or_else(|| StoreError::NotFound(format!("project {id}")))?;
        row_to_project(&row)
    }

    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        let _permit = self.permit().await?;
        let rows = self
            .client
            .query(
                "SELECT id, name, description, status, priority, target_date, code_repo_slug, issue_tracker_key FROM projects",
                &[],
            )
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        rows.iter().map(row_to_project).collect()
    }

    async fn upsert_assignment(&self, assignment: ProjectAssignment) -> StoreResult<()> {
        let _permit = self.permit().await?;
        self.client
            .execute(
                "INSERT INTO project_assignments (employee_id, project_id, role, allocated_percent)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (employee_id, project_id) DO UPDATE SET
                   role = EXCLUDED.role, allocated_percent = EXCLUDED.allocated_percent",
                &[&assignment.employee_id, &assignment.project_id, &assignment.role, &(assignment.allocated_percent as i16)],
            )
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn assignments_for_employee(&self, employee_id: Uuid) -> StoreResult<Vec<ProjectAssignment>> {
        let _permit = self.permit().await?;
        let rows = self
            .client
            .query(
                "SELECT employee_id, project_id, role, allocated_percent FROM project_assignments WHERE employee_id = $1",
                &[&employee_id],
            )
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|row| ProjectAssignment {
                employee_id: row.get(0),
                project_id: row.get(1),
                role: row.get(2),
                allocated_percent: row.get::<_, i16>(3) as u8,
            })
            .collect())
    }

    async fn upsert_identity_mapping(&self, mapping: IdentityMapping) -> StoreResult<()> {
        let _permit = self.permit().await?;
        self.client
            .execute(
                "INSERT INTO identity_mappings (employee_id, source, external_id, external_username)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (source, external_id) DO UPDATE SET employee_id = EXCLUDED.employee_id",
                &[&mapping.employee_id, &mapping.source.as_str(), &mapping.external_id, &mapping.external_username],
            )
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn resolve_identity(&self, source: EventSource, external_id: &str) -> StoreResult<Option<Uuid>> {
        let _permit = self.permit().await?;
        let row = self
            .client
            .query_opt(
                "SELECT employee_id FROM identity_mappings WHERE source = $1 AND external_id = $2",
                &[&source.as_str(), &external_id],
            )
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(row.map(|r| r.get(0)))
    }

    async fn upsert_task(&self, task: Task) -> StoreResult<()> {
        let _permit = self.permit().await?;
        self.client
            .execute(
                "INSERT INTO tasks (id, source, external_key, project_id, title, description, status,
                   status_category, priority, reporter_employee_id, assignee_employee_id,
                   created_at_source, updated_at_source, due_date, estimate_points, labels, metadata)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
                 ON CONFLICT (source, external_key) DO UPDATE SET
                   project_id = EXCLUDED.project_id, title = EXCLUDED.title,
                   description = EXCLUDED.description, status = EXCLUDED.status,
                   status_category = EXCLUDED.status_category, priority = EXCLUDED.priority,
                   reporter_employee_id = EXCLUDED.reporter_employee_id,
                   assignee_employee_id = EXCLUDED.assignee_employee_id,
                   updated_at_source = EXCLUDED.updated_at_source, due_date = EXCLUDED.due_date,
                   estimate_points = EXCLUDED.estimate_points, labels = EXCLUDED.labels,
                   metadata = EXCLUDED.metadata",
                &[
                    &task.id,
                    &task.source.as_str(),
                    &task.external_key,
                    &task.project_id,
                    &task.title,
                    &task.description,
                    &task.status,
                    &task.status_category.as_str(),
                    &task.priority,
                    &task.reporter_employee_id,
                    &task.assignee_employee_id,
                    &task.created_at_source,
                    &task.updated_at_source,
                    &task.due_date,
                    &task.estimate_points,
                    &task.labels,
                    &task.metadata,
                ],
            )
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn get_task_by_external_key(&self, source: EventSource, external_key: &str) -> StoreResult<Option<Task>> {
        let _permit = self.permit().await?;
        let row = self
            .client
            .query_opt(
                "SELECT id, source, external_key, project_id, title, description, status, status_category,
                   priority, reporter_employee_id, assignee_employee_id, created_at_source, updated_at_source,
                   due_date, estimate_points, labels, metadata
                 FROM tasks WHERE source = $1 AND external_key = $2",
                &[&source.as_str(), &external_key],
            )
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn tasks_for_project(&self, project_id: Uuid) -> StoreResult<Vec<Task>> {
        let _permit = self.permit().await?;
        let rows = self
            .client
            .query(
                "SELECT id, source, external_key, project_id, title, description, status, status_category,
                   priority, reporter_employee_id, assignee_employee_id, created_at_source, updated_at_source,
                   due_date, estimate_points, labels, metadata
                 FROM tasks WHERE project_id = $1",
                &[&project_id],
            )
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        rows.iter().map(row_to_task).collect()
    }

    async fn append_task_event(&self, event: TaskEvent) -> StoreResult<()> {
        let _permit = self.permit().await?;
        self.client
            .execute(
                "INSERT INTO task_events (task_id, occurred_at, event_type, from_value, to_value, actor_employee_id, payload)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (task_id, occurred_at, event_type) DO NOTHING",
                &[
                    &event.task_id,
                    &event.occurred_at,
                    &event.event_type,
                    &event.from_value,
                    &event.to_value,
                    &event.actor_employee_id,
                    &event.payload,
                ],
            )
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn task_events(&self, task_id: Uuid) -> StoreResult<Vec<TaskEvent>> {
        let _permit = self.permit().await?;
        let rows = self
            .client
            .query(
                "SELECT task_id, occurred_at, event_type, from_value, to_value, actor_employee_id, payload
                 FROM task_events WHERE task_id = $1 ORDER BY occurred_at",
                &[&task_id],
            )
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|row| TaskEvent {
                task_id: row.get(0),
                occurred_at: row.get(1),
                event_type: row.get(2),
                from_value: row.get(3),
                to_value: row.get(4),
                actor_employee_id: row.get(5),
                payload: row.get(6),
            })
            .collect())
    }

    async fn upsert_task_participant(&self, participant: TaskParticipant) -> StoreResult<()> {
        let _permit = self.permit().await?;
        self.client
            .execute(
                "INSERT INTO task_participants (task_id, employee_id, role)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (task_id, employee_id, role) DO NOTHING",
                &[&participant.task_id, &participant.employee_id, &participant.role],
            )
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn participants_for_task(&self, task_id: Uuid) -> StoreResult<Vec<TaskParticipant>> {
        let _permit = self.permit().await?;
        let rows = self
            .client
            .query("SELECT task_id, employee_id, role FROM task_participants WHERE task_id = $1", &[&task_id])
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|row| TaskParticipant { task_id: row.get(0), employee_id: row.get(1), role: row.get(2) })
            .collect())
    }

    async fn upsert_ci_pipeline(&self, pipeline: CiPipeline) -> StoreResult<()> {
        let _permit = self.permit().await?;
        self.client
            .execute(
                "INSERT INTO ci_pipelines (project_id, commit_sha, status, started_at, finished_at, error_log, trigger_actor)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (project_id, commit_sha) DO UPDATE SET
                   status = EXCLUDED.status, started_at = EXCLUDED.started_at,
                   finished_at = EXCLUDED.finished_at, error_log = EXCLUDED.error_log,
                   trigger_actor = EXCLUDED.trigger_actor",
                &[
                    &pipeline.project_id,
                    &pipeline.commit_sha,
                    &pipeline.status.as_str(),
                    &pipeline.started_at,
                    &pipeline.finished_at,
                    &pipeline.error_log,
                    &pipeline.trigger_actor,
                ],
            )
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn ci_pipelines_for_project(&self, project_id: Uuid) -> StoreResult<Vec<CiPipeline>> {
        let _permit = self.permit().await?;
        let rows = self
            .client
            .query(
                "SELECT project_id, commit_sha, status, started_at, finished_at, error_log, trigger_actor
                 FROM ci_pipelines WHERE project_id = $1",
                &[&project_id],
            )
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        rows.iter().map(row_to_ci_pipeline).collect()
    }

    async fn upsert_monthly_metrics(&self, metrics: EmployeeMonthlyMetrics) -> StoreResult<()> {
        let _permit = self.permit().await?;
        self.client
            .execute(
                "INSERT INTO employee_monthly_metrics (employee_id, month, tasks_completed, tasks_started,
                   overdue_open, blocked_items, prs_merged_count, pr_reviews_count, generated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 ON CONFLICT (employee_id, month) DO UPDATE SET
                   tasks_completed = EXCLUDED.tasks_completed, tasks_started = EXCLUDED.tasks_started,
                   overdue_open = EXCLUDED.overdue_open, blocked_items = EXCLUDED.blocked_items,
                   prs_merged_count = EXCLUDED.prs_merged_count, pr_reviews_count = EXCLUDED.pr_reviews_count,
                   generated_at = EXCLUDED.generated_at",
                &[
                    &metrics.employee_id,
                    &metrics.month,
                    &(metrics.tasks_completed as i32),
                    &(metrics.tasks_started as i32),
                    &(metrics.overdue_open as i32),
                    &(metrics.blocked_items as i32),
                    &(metrics.prs_merged_count as i32),
                    &(metrics.pr_reviews_count as i32),
                    &metrics.generated_at,
                ],
            )
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn monthly_metrics(
        &self,
        employee_id: Uuid,
        month: chrono::DateTime<chrono::Utc>,
    ) -> StoreResult<Option<EmployeeMonthlyMetrics>> {
        let _permit = self.permit().await?;
        let row = self
            .client
            .query_opt(
                "SELECT employee_id, month, tasks_completed, tasks_started, overdue_open, blocked_items,
                   prs_merged_count, pr_reviews_count, generated_at
                 FROM employee_monthly_metrics WHERE employee_id = $1 AND month = $2",
                &[&employee_id, &month],
            )
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(row.map(|row| EmployeeMonthlyMetrics {
            employee_id: row.get(0),
            month: row.get(1),
            tasks_completed: row.get::<_, i32>(2) as u32,
            tasks_started: row.get::<_, i32>(3) as u32,
            overdue_open: row.get::<_, i32>(4) as u32,
            blocked_items: row.get::<_, i32>(5) as u32,
            prs_merged_count: row.get::<_, i32>(6) as u32,
            pr_reviews_count: row.get::<_, i32>(7) as u32,
            generated_at: row.get(8),
        }))
    }

    async fn upsert_embedding(&self, embedding: Embedding) -> StoreResult<()> {
        let _permit = self.permit().await?;
        let vector = pgvector::Vector::from(embedding.embedding.clone());
        self.client
            .execute(
                "INSERT INTO embeddings (id, embedding_type, source_id, source_table, title, content, metadata, embedding, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                 ON CONFLICT (id) DO UPDATE SET
                   title = EXCLUDED.title, content = EXCLUDED.content,
                   metadata = EXCLUDED.metadata, embedding = EXCLUDED.embedding,
                   updated_at = EXCLUDED.updated_at",
                &[
                    &embedding.id,
                    &embedding.embedding_type.as_str(),
                    &embedding.source_id,
                    &embedding.source_table,
                    &embedding.title,
                    &embedding.content,
                    &embedding.metadata,
                    &vector,
                    &embedding.created_at,
                    &embedding.updated_at,
                ],
            )
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn search_similar(
        &self,
        embedding_type: EmbeddingType,
        query: &[f32],
        limit: usize,
    ) -> StoreResult<Vec<SimilarEmbedding>> {
        let _permit = self.permit().await?;
        let vector = pgvector::Vector::from(query.to_vec());
        let rows = self
            .client
            .query(
                "SELECT id, source_id, title, content, metadata, 1 - (embedding <=> $1) AS similarity
                 FROM embeddings WHERE embedding_type = $2
                 ORDER BY embedding <=> $1 LIMIT $3",
                &[&vector, &embedding_type.as_str(), &(limit as i64)],
            )
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|row| SimilarEmbedding {
                id: row.get(0),
                source_id: row.get(1),
                title: row.get(2),
                content: row.get(3),
                metadata: row.get(4),
                similarity: (row.get::<_, f64>(5) as f32).clamp(-1.0, 1.0),
            })
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        let _permit = self.permit().await?;
        self.client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn employee(active: bool) -> Employee {
        Employee {
            id: Uuid::new_v4(),
            full_name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            title: Some("Engineer".into()),
            role: Some("ic".into()),
            team_id: None,
            level: Some("L4".into()),
            active,
        }
    }

    #[tokio::test]
    async fn workload_overallocation_is_detectable() {
        let store = InMemoryRelationalStore::new();
        let emp = employee(true);
        store.upsert_employee(emp.clone()).await.unwrap();
        for _ in 0..3 {
            store
                .upsert_assignment(ProjectAssignment {
                    employee_id: emp.id,
                    project_id: Uuid::new_v4(),
                    role: "contributor".into(),
                    allocated_percent: 50,
                })
                .await
                .unwrap();
        }
        let workload = store.workload_percent(emp.id).await.unwrap();
        assert_eq!(workload, 150);
        assert!(workload > 100);
    }

    #[tokio::test]
    async fn identity_resolution_round_trips() {
        let store = InMemoryRelationalStore::new();
        let emp_id = Uuid::new_v4();
        store
            .upsert_identity_mapping(IdentityMapping {
                employee_id: emp_id,
                source: EventSource::CodeHost,
                external_id: "ghuser".into(),
                external_username: Some("ghuser".into()),
            })
            .await
            .unwrap();
        let resolved = store
            .resolve_identity(EventSource::CodeHost, "ghuser")
            .await
            .unwrap();
        assert_eq!(resolved, Some(emp_id));
        assert_eq!(
            store.resolve_identity(EventSource::Docs, "ghuser").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn search_similar_orders_by_descending_similarity() {
        let store = InMemoryRelationalStore::new();
        let now = Utc::now();
        for (i, vec) in [vec![1.0, 0.0], vec![0.0, 1.0], vec![0.9, 0.1]].into_iter().enumerate() {
            store
                .upsert_embedding(Embedding {
                    id: Uuid::new_v4(),
                    embedding_type: EmbeddingType::ProjectDoc,
                    source_id: format!("doc-{i}"),
                    source_table: "docs".into(),
                    title: format!("doc {i}"),
                    content: "content".into(),
                    metadata: json!({}),
                    embedding: vec,
                    created_at: now,
                    updated_at: now,
                })
                .await
                .unwrap();
        }
        let results = store
            .search_similar(EmbeddingType::ProjectDoc, &[1.0, 0.0], 3)
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].similarity >= results[1].similarity);
        assert!(results[1].similarity >= results[2].similarity);
        for r in &results {
            assert!(r.similarity >= -1.0 && r.similarity <= 1.0);
        }
    }
}
