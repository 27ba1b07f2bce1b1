//! Built-in tool handlers bound to the store adapters and retrieval
//! pipelines. Registered once at startup into the shared
//! [`tools::ToolRegistry`] owned by [`crate::context::AppContext`].

use crate::actions::{ActionExecutor, ActionVerb};
use crate::embedding::EmbeddingClient;
use crate::graph_rag::GraphRagPipeline;
use crate::rag::RagPipeline;
use async_trait::async_trait;
use std::error::Error;
use std::sync::Arc;
use stores::model::EmbeddingType;
use stores::{compute_developer_activity, EventFilter, EventLogStore, GraphStore, RelationalStore};
use tools::{Tool, ToolHandler, ToolParameter, ToolParameterType, ToolRegistry, ToolResult};
use uuid::Uuid;

fn parse_uuid(params: &serde_json::Value, field: &str) -> Option<Uuid> {
    params.get(field).and_then(|v| v.as_str()).and_then(|s| s.parse::<Uuid>().ok())
}

struct DeploymentMetricsTool {
    event_log: Arc<dyn EventLogStore>,
}

#[async_trait]
impl ToolHandler for DeploymentMetricsTool {
    async fn invoke(&self, params: serde_json::Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let project_id = params.get("project_id").and_then(|v| v.as_str()).map(|s| s.to_string());
        let days_back = params.get("days_back").and_then(|v| v.as_u64()).unwrap_or(30) as u32;
        match self.event_log.deployment_metrics(project_id, days_back).await {
            Ok(metrics) => Ok(ToolResult::success(serde_json::to_value(metrics)?)),
            Err(e) => Ok(ToolResult::failure(e.to_string())),
        }
    }
}

struct DeveloperWorkloadTool {
    relational: Arc<dyn RelationalStore>,
}

#[async_trait]
impl ToolHandler for DeveloperWorkloadTool {
    async fn invoke(&self, params: serde_json::Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let Some(employee_id) = parse_uuid(&params, "employee_id") else {
            return Ok(ToolResult::failure("employee_id must be a UUID"));
        };
        match self.relational.workload_percent(employee_id).await {
            Ok(percent) => Ok(ToolResult::success(serde_json::json!({
                "total_allocation_percent": percent,
                "is_overallocated": percent > 100,
                "available_capacity_percent": 100i64.saturating_sub(percent as i64).max(0),
            }))),
            Err(e) => Ok(ToolResult::failure(e.to_string())),
        }
    }
}

struct FindExpertsTool {
    graph: Arc<dyn GraphStore>,
}

#[async_trait]
impl ToolHandler for FindExpertsTool {
    async fn invoke(&self, params: serde_json::Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let Some(topic_node_id) = parse_uuid(&params, "topic_node_id") else {
            return Ok(ToolResult::failure("topic_node_id must be a UUID"));
        };
        let limit = params.get("limit").and_then(|v| v.as_u64()).unwrap_or(5) as usize;
        match self.graph.find_experts(topic_node_id, limit).await {
            Ok(hits) => Ok(ToolResult::success(serde_json::to_value(hits)?)),
            Err(e) => Ok(ToolResult::failure(e.to_string())),
        }
    }
}

struct ListTasksTool {
    relational: Arc<dyn RelationalStore>,
}

#[async_trait]
impl ToolHandler for ListTasksTool {
    async fn invoke(&self, params: serde_json::Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let Some(project_id) = parse_uuid(&params, "project_id") else {
            return Ok(ToolResult::failure("project_id must be a UUID"));
        };
        match self.relational.tasks_for_project(project_id).await {
            Ok(tasks) => Ok(ToolResult::success(serde_json::to_value(tasks)?)),
            Err(e) => Ok(ToolResult::failure(e.to_string())),
        }
    }
}

struct GetDeveloperTool {
    relational: Arc<dyn RelationalStore>,
}

#[async_trait]
impl ToolHandler for GetDeveloperTool {
    async fn invoke(&self, params: serde_json::Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let Some(employee_id) = parse_uuid(&params, "employee_id") else {
            return Ok(ToolResult::failure("employee_id must be a UUID"));
        };
        match self.relational.get_employee(employee_id).await {
            Ok(employee) => Ok(ToolResult::success(serde_json::to_value(employee)?)),
            Err(e) => Ok(ToolResult::failure(e.to_string())),
        }
    }
}

struct ListDevelopersTool {
    relational: Arc<dyn RelationalStore>,
}

#[async_trait]
impl ToolHandler for ListDevelopersTool {
    async fn invoke(&self, params: serde_json::Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let active_only = params.get("active_only").and_then(|v| v.as_bool()).unwrap_or(true);
        match self.relational.list_employees(active_only).await {
            Ok(employees) => Ok(ToolResult::success(serde_json::to_value(employees)?)),
            Err(e) => Ok(ToolResult::failure(e.to_string())),
        }
    }
}

struct GetProjectTool {
    relational: Arc<dyn RelationalStore>,
}

#[async_trait]
impl ToolHandler for GetProjectTool {
    async fn invoke(&self, params: serde_json::Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let Some(project_id) = parse_uuid(&params, "project_id") else {
            return Ok(ToolResult::failure("project_id must be a UUID"));
        };
        match self.relational.get_project(project_id).await {
            Ok(project) => Ok(ToolResult::success(serde_json::to_value(project)?)),
            Err(e) => Ok(ToolResult::failure(e.to_string())),
        }
    }
}

struct ListProjectsTool {
    relational: Arc<dyn RelationalStore>,
}

#[async_trait]
impl ToolHandler for ListProjectsTool {
    async fn invoke(&self, _params: serde_json::Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        match self.relational.list_projects().await {
            Ok(projects) => Ok(ToolResult::success(serde_json::to_value(projects)?)),
            Err(e) => Ok(ToolResult::failure(e.to_string())),
        }
    }
}

struct QueryEventsTool {
    event_log: Arc<dyn EventLogStore>,
}

#[async_trait]
impl ToolHandler for QueryEventsTool {
    async fn invoke(&self, params: serde_json::Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let filter = EventFilter {
            event_type: params.get("event_type").and_then(|v| v.as_str()).map(str::to_string),
            project_id: params.get("project_id").and_then(|v| v.as_str()).map(str::to_string),
            actor_id: params.get("actor_id").and_then(|v| v.as_str()).map(str::to_string),
            window_days: params.get("window_days").and_then(|v| v.as_u64()).map(|n| n as u32),
            limit: params.get("limit").and_then(|v| v.as_u64()).map(|n| n as usize),
            ..Default::default()
        };
        match self.event_log.query_events(filter).await {
            Ok(events) => Ok(ToolResult::success(serde_json::to_value(events)?)),
            Err(e) => Ok(ToolResult::failure(e.to_string())),
        }
    }
}

struct DeveloperActivityTool {
    event_log: Arc<dyn EventLogStore>,
}

#[async_trait]
impl ToolHandler for DeveloperActivityTool {
    async fn invoke(&self, params: serde_json::Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let Some(actor_id) = params.get("actor_id").and_then(|v| v.as_str()) else {
            return Ok(ToolResult::failure("actor_id is required"));
        };
        let window_days = params.get("window_days").and_then(|v| v.as_u64()).map(|n| n as u32).unwrap_or(30);
        match self.event_log.query_events(EventFilter { actor_id: Some(actor_id.to_string()), window_days: Some(window_days), ..Default::default() }).await {
            Ok(events) => Ok(ToolResult::success(serde_json::to_value(compute_developer_activity(&events, actor_id))?)),
            Err(e) => Ok(ToolResult::failure(e.to_string())),
        }
    }
}

struct CollaboratorsTool {
    graph: Arc<dyn GraphStore>,
}

#[async_trait]
impl ToolHandler for CollaboratorsTool {
    async fn invoke(&self, params: serde_json::Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let Some(employee_id) = parse_uuid(&params, "employee_id") else {
            return Ok(ToolResult::failure("employee_id must be a UUID"));
        };
        let max_hops = params.get("max_hops").and_then(|v| v.as_u64()).unwrap_or(2) as u32;
        match self.graph.collaborators(employee_id, max_hops).await {
            Ok(ids) => Ok(ToolResult::success(serde_json::to_value(ids)?)),
            Err(e) => Ok(ToolResult::failure(e.to_string())),
        }
    }
}

struct SemanticSearchTool {
    embeddings: Arc<dyn EmbeddingClient>,
    relational: Arc<dyn RelationalStore>,
}

#[async_trait]
impl ToolHandler for SemanticSearchTool {
    async fn invoke(&self, params: serde_json::Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let Some(query) = params.get("query").and_then(|v| v.as_str()) else {
            return Ok(ToolResult::failure("query is required"));
        };
        let Some(embedding_type) = params
            .get("embedding_type")
            .and_then(|v| v.as_str())
            .unwrap_or("project_doc")
            .parse::<EmbeddingType>()
            .ok()
        else {
            return Ok(ToolResult::failure("embedding_type must be 'developer_profile' or 'project_doc'"));
        };
        let limit = params.get("limit").and_then(|v| v.as_u64()).unwrap_or(5) as usize;
        let vector = self.embeddings.embed(query).await?;
        match self.relational.search_similar(embedding_type, &vector, limit).await {
            Ok(hits) => Ok(ToolResult::success(serde_json::to_value(hits)?)),
            Err(e) => Ok(ToolResult::failure(e.to_string())),
        }
    }
}

struct RagSearchTool {
    rag: Arc<RagPipeline>,
}

#[async_trait]
impl ToolHandler for RagSearchTool {
    async fn invoke(&self, params: serde_json::Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let Some(question) = params.get("question").and_then(|v| v.as_str()) else {
            return Ok(ToolResult::failure("question is required"));
        };
        let embedding_type = params
            .get("embedding_type")
            .and_then(|v| v.as_str())
            .unwrap_or("project_doc")
            .parse::<EmbeddingType>()
            .unwrap_or(EmbeddingType::ProjectDoc);
        match self.rag.answer(question, embedding_type).await {
            Ok(answer) => Ok(ToolResult::success(serde_json::json!({
                "content": answer.content,
                "sources": answer.sources,
                "rewrites_used": answer.rewrites_used,
                "hallucination_flagged": answer.hallucination_flagged,
            }))),
            Err(e) => Ok(ToolResult::failure(e.to_string())),
        }
    }
}

struct FindExpertForTopicTool {
    graph_rag: Arc<GraphRagPipeline>,
}

#[async_trait]
impl ToolHandler for FindExpertForTopicTool {
    async fn invoke(&self, params: serde_json::Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let Some(topic) = params.get("topic").and_then(|v| v.as_str()) else {
            return Ok(ToolResult::failure("topic is required"));
        };
        let Some(topic_node_id) = parse_uuid(&params, "topic_node_id") else {
            return Ok(ToolResult::failure("topic_node_id must be a UUID"));
        };
        let limit = params.get("limit").and_then(|v| v.as_u64()).unwrap_or(5) as usize;
        match self.graph_rag.find_experts(topic.to_string(), topic_node_id, limit).await {
            Ok(result) => Ok(ToolResult::success(serde_json::json!({
                "candidates": result.candidates,
                "explanation": result.explanation,
            }))),
            Err(e) => Ok(ToolResult::failure(e.to_string())),
        }
    }
}

/// Combines an employee's workload and open/blocked task counts into a
/// single briefing so a manager can prep a 1:1 without five separate
/// lookups.
struct PrepareOneOnOneTool {
    relational: Arc<dyn RelationalStore>,
}

#[async_trait]
impl ToolHandler for PrepareOneOnOneTool {
    async fn invoke(&self, params: serde_json::Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let Some(employee_id) = parse_uuid(&params, "employee_id") else {
            return Ok(ToolResult::failure("employee_id must be a UUID"));
        };
        let employee = self.relational.get_employee(employee_id).await?;
        let workload = self.relational.workload_percent(employee_id).await?;
        let assignments = self.relational.assignments_for_employee(employee_id).await?;

        let mut blocked_tasks = Vec::new();
        for assignment in &assignments {
            let tasks = self.relational.tasks_for_project(assignment.project_id).await?;
            blocked_tasks.extend(
                tasks
                    .into_iter()
                    .filter(|t| t.assignee_employee_id == Some(employee_id) && t.status_category == stores::model::StatusCategory::Blocked),
            );
        }

        Ok(ToolResult::success(serde_json::json!({
            "employee_name": employee.full_name,
            "total_allocation_percent": workload,
            "active_project_count": assignments.len(),
            "blocked_task_keys": blocked_tasks.iter().map(|t| t.external_key.clone()).collect::<Vec<_>>(),
        })))
    }
}

/// Flags simple threshold-based anomalies in a project's delivery
/// metrics — a change failure rate spike or a deployment drought — so a
/// specialist can surface them without a human having to ask the right
/// question first.
struct DetectAnomaliesTool {
    event_log: Arc<dyn EventLogStore>,
}

#[async_trait]
impl ToolHandler for DetectAnomaliesTool {
    async fn invoke(&self, params: serde_json::Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let project_id = params.get("project_id").and_then(|v| v.as_str()).map(str::to_string);
        let days_back = params.get("days_back").and_then(|v| v.as_u64()).unwrap_or(30) as u32;
        let metrics = self.event_log.deployment_metrics(project_id, days_back).await?;

        let mut anomalies = Vec::new();
        if let Some(rate) = metrics.change_failure_rate_pct {
            if rate > 30.0 {
                anomalies.push(format!("change failure rate is {rate:.1}%, above the 30% threshold"));
            }
        }
        if metrics.total_deployments == 0 {
            anomalies.push("no deployments recorded in this window".to_string());
        }

        Ok(ToolResult::success(serde_json::json!({ "anomalies": anomalies })))
    }
}

/// Generic wrapper around one [`ActionVerb`], so each external side effect
/// the agent can take gets its own tool name without its own struct.
pub struct ActionTool {
    executor: Arc<dyn ActionExecutor>,
    verb: ActionVerb,
}

#[async_trait]
impl ToolHandler for ActionTool {
    async fn invoke(&self, params: serde_json::Value) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        match self.verb.invoke(self.executor.as_ref(), params).await {
            Ok(output) => Ok(ToolResult::success(output)),
            Err(e) => Ok(ToolResult::failure(e.to_string())),
        }
    }
}

pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    event_log: Arc<dyn EventLogStore>,
    relational: Arc<dyn RelationalStore>,
    graph: Arc<dyn GraphStore>,
    embeddings: Arc<dyn EmbeddingClient>,
    rag: Arc<RagPipeline>,
    graph_rag: Arc<GraphRagPipeline>,
    actions: Arc<dyn ActionExecutor>,
) {
    registry.register(
        Tool::new("get_deployment_metrics", "DORA deployment metrics for a project over a trailing window.", Arc::new(DeploymentMetricsTool { event_log: event_log.clone() }))
            .with_parameter(ToolParameter::new("project_id", ToolParameterType::String).with_description("Project identifier"))
            .with_parameter(ToolParameter::new("days_back", ToolParameterType::Number).with_description("Trailing window in days").with_default(serde_json::json!(30))),
    );

    registry.register(
        Tool::new("get_developer_workload", "Total allocation percentage and overallocation status for an employee.", Arc::new(DeveloperWorkloadTool { relational: relational.clone() }))
            .with_parameter(ToolParameter::new("employee_id", ToolParameterType::String).required()),
    );

    registry.register(
        Tool::new("list_tasks", "Lists tasks for a project.", Arc::new(ListTasksTool { relational: relational.clone() }))
            .with_parameter(ToolParameter::new("project_id", ToolParameterType::String).required()),
    );

    registry.register(
        Tool::new("find_experts", "Finds employees with expertise on a topic via the collaboration graph.", Arc::new(FindExpertsTool { graph: graph.clone() }))
            .with_parameter(ToolParameter::new("topic_node_id", ToolParameterType::String).required())
            .with_parameter(ToolParameter::new("limit", ToolParameterType::Number).with_default(serde_json::json!(5))),
    );

    registry.register(
        Tool::new("get_developer", "Fetches a single employee by id.", Arc::new(GetDeveloperTool { relational: relational.clone() }))
            .with_parameter(ToolParameter::new("employee_id", ToolParameterType::String).required()),
    );

    registry.register(
        Tool::new("list_developers", "Lists employees, active only by default.", Arc::new(ListDevelopersTool { relational: relational.clone() }))
            .with_parameter(ToolParameter::new("active_only", ToolParameterType::Boolean).with_default(serde_json::json!(true))),
    );

    registry.register(
        Tool::new("get_project", "Fetches a single project by id.", Arc::new(GetProjectTool { relational: relational.clone() }))
            .with_parameter(ToolParameter::new("project_id", ToolParameterType::String).required()),
    );

    registry.register(Tool::new("list_projects", "Lists every tracked project.", Arc::new(ListProjectsTool { relational: relational.clone() })));

    registry.register(
        Tool::new("query_events", "Queries the raw event log with optional filters.", Arc::new(QueryEventsTool { event_log: event_log.clone() }))
            .with_parameter(ToolParameter::new("event_type", ToolParameterType::String))
            .with_parameter(ToolParameter::new("project_id", ToolParameterType::String))
            .with_parameter(ToolParameter::new("actor_id", ToolParameterType::String))
            .with_parameter(ToolParameter::new("window_days", ToolParameterType::Integer))
            .with_parameter(ToolParameter::new("limit", ToolParameterType::Integer)),
    );

    registry.register(
        Tool::new("get_developer_activity", "Per-event-type activity counts for one actor over a trailing window.", Arc::new(DeveloperActivityTool { event_log: event_log.clone() }))
            .with_parameter(ToolParameter::new("actor_id", ToolParameterType::String).required())
            .with_parameter(ToolParameter::new("window_days", ToolParameterType::Integer).with_default(serde_json::json!(30))),
    );

    registry.register(
        Tool::new("get_collaborators", "Employees reachable within a hop count of a given employee in the collaboration graph.", Arc::new(CollaboratorsTool { graph: graph.clone() }))
            .with_parameter(ToolParameter::new("employee_id", ToolParameterType::String).required())
            .with_parameter(ToolParameter::new("max_hops", ToolParameterType::Integer).with_default(serde_json::json!(2))),
    );

    registry.register(
        Tool::new("semantic_search", "Vector similarity search over developer-profile or project-doc embeddings.", Arc::new(SemanticSearchTool { embeddings: embeddings.clone(), relational: relational.clone() }))
            .with_parameter(ToolParameter::new("query", ToolParameterType::String).required())
            .with_parameter(ToolParameter::new("embedding_type", ToolParameterType::String).with_default(serde_json::json!("project_doc")))
            .with_parameter(ToolParameter::new("limit", ToolParameterType::Integer).with_default(serde_json::json!(5))),
    );

    registry.register(
        Tool::new("rag_search", "Self-correcting retrieval-augmented answer over the docs corpus.", Arc::new(RagSearchTool { rag }))
            .with_parameter(ToolParameter::new("question", ToolParameterType::String).required())
            .with_parameter(ToolParameter::new("embedding_type", ToolParameterType::String).with_default(serde_json::json!("project_doc"))),
    );

    registry.register(
        Tool::new("find_expert_for_topic", "Fuses semantic and graph signals to find the best-matching expert for a topic.", Arc::new(FindExpertForTopicTool { graph_rag }))
            .with_parameter(ToolParameter::new("topic", ToolParameterType::String).required())
            .with_parameter(ToolParameter::new("topic_node_id", ToolParameterType::String).required())
            .with_parameter(ToolParameter::new("limit", ToolParameterType::Integer).with_default(serde_json::json!(5))),
    );

    registry.register(
        Tool::new("prepare_one_on_one", "Briefing of workload, allocation, and blocked work for an employee's 1:1.", Arc::new(PrepareOneOnOneTool { relational: relational.clone() }))
            .with_parameter(ToolParameter::new("employee_id", ToolParameterType::String).required()),
    );

    registry.register(
        Tool::new("detect_anomalies", "Flags deployment-metric anomalies for a project over a trailing window.", Arc::new(DetectAnomaliesTool { event_log }))
            .with_parameter(ToolParameter::new("project_id", ToolParameterType::String))
            .with_parameter(ToolParameter::new("days_back", ToolParameterType::Integer).with_default(serde_json::json!(30))),
    );

    for verb in [ActionVerb::IssueTrackerComment, ActionVerb::CodeHostCreate, ActionVerb::DocsCreate] {
        registry.register(
            Tool::new(verb.name(), verb.description(), Arc::new(ActionTool { executor: actions.clone(), verb }))
                .with_parameter(ToolParameter::new("params", ToolParameterType::Object).required()),
        );
    }
}
