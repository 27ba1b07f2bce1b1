//! Query classifier: maps an incoming user turn to a task type, a model
//! selection, and the specialist profile that should handle it, before
//! any specialist runs.

use crate::config::AppConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialistProfile {
    /// DORA metrics, deployment frequency, change failure rate.
    DeliveryAnalyst,
    /// Task status, workload, sprint/backlog questions.
    ProjectCoordinator,
    /// Pull request, commit, and diff review questions.
    CodeAnalyst,
    /// "Who knows X" / collaboration and expertise lookups.
    ExpertFinder,
    /// Free-form questions answered from docs via RAG.
    KnowledgeAssistant,
}

impl SpecialistProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecialistProfile::DeliveryAnalyst => "delivery_analyst",
            SpecialistProfile::ProjectCoordinator => "project_coordinator",
            SpecialistProfile::CodeAnalyst => "code_analyst",
            SpecialistProfile::ExpertFinder => "expert_finder",
            SpecialistProfile::KnowledgeAssistant => "knowledge_assistant",
        }
    }

    /// Tool names registered for this profile. Must stay a subset of
    /// whatever `register_builtin_tools` actually registers — an
    /// unregistered name here fails every specialist invocation at
    /// runtime instead of at startup.
    pub fn allowed_tools(&self) -> &'static [&'static str] {
        match self {
            SpecialistProfile::DeliveryAnalyst => &["get_deployment_metrics", "get_developer_activity", "detect_anomalies"],
            SpecialistProfile::ProjectCoordinator => {
                &["list_tasks", "get_developer_workload", "get_project", "list_projects", "prepare_one_on_one"]
            }
            SpecialistProfile::CodeAnalyst => &["query_events", "get_developer_activity", "list_tasks"],
            SpecialistProfile::ExpertFinder => {
                &["find_experts", "find_expert_for_topic", "get_collaborators", "get_developer", "list_developers"]
            }
            SpecialistProfile::KnowledgeAssistant => &["semantic_search", "rag_search"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    Analytics,
    Planning,
    CodeAnalysis,
    QuickLookup,
    General,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSelection {
    pub model_name: String,
    pub display_name: String,
    pub emoji: String,
    pub temperature: f32,
    pub reason: String,
}

/// Pinned keyword table, checked in a fixed priority order so a query that
/// matches more than one category (e.g. "PR velocity") resolves the same
/// way every time.
pub fn classify_task(query: &str) -> TaskType {
    let lower = query.to_lowercase();
    const ANALYTICS_KEYWORDS: &[&str] = &["metrics", "dora", "deployment", "velocity", "throughput"];
    const PLANNING_KEYWORDS: &[&str] = &["workload", "allocation", "1:1", "one-on-one", "capacity", "assign"];
    const CODE_ANALYSIS_KEYWORDS: &[&str] = &["pull request", "pr", "commit", "diff", "review"];
    const QUICK_LOOKUP_KEYWORDS: &[&str] = &["who is", "find", "lookup", "contact"];

    if ANALYTICS_KEYWORDS.iter().any(|k| lower.contains(k)) {
        TaskType::Analytics
    } else if PLANNING_KEYWORDS.iter().any(|k| lower.contains(k)) {
        TaskType::Planning
    } else if CODE_ANALYSIS_KEYWORDS.iter().any(|k| lower.contains(k)) {
        TaskType::CodeAnalysis
    } else if QUICK_LOOKUP_KEYWORDS.iter().any(|k| lower.contains(k)) {
        TaskType::QuickLookup
    } else {
        TaskType::General
    }
}

pub fn route_to_specialist(task: TaskType) -> SpecialistProfile {
    match task {
        TaskType::Analytics => SpecialistProfile::DeliveryAnalyst,
        TaskType::Planning => SpecialistProfile::ProjectCoordinator,
        TaskType::CodeAnalysis => SpecialistProfile::CodeAnalyst,
        TaskType::QuickLookup => SpecialistProfile::ExpertFinder,
        TaskType::General => SpecialistProfile::KnowledgeAssistant,
    }
}

pub fn select_model(config: &AppConfig, task: TaskType) -> ModelSelection {
    match task {
        TaskType::Analytics => ModelSelection {
            model_name: config.llm.openai.default_model.clone(),
            display_name: "Analytics Reasoner".into(),
            emoji: "📊".into(),
            temperature: 0.2,
            reason: "deployment and DORA metrics need precise numeric reasoning".into(),
        },
        TaskType::Planning => ModelSelection {
            model_name: config.llm.openai.default_model.clone(),
            display_name: "Planning Assistant".into(),
            emoji: "🗓️".into(),
            temperature: 0.4,
            reason: "workload and allocation questions need structured, low-variance answers".into(),
        },
        TaskType::CodeAnalysis => ModelSelection {
            model_name: config.llm.anthropic.default_model.clone(),
            display_name: "Code Analyst".into(),
            emoji: "🔍".into(),
            temperature: 0.2,
            reason: "PR and diff review is where Claude's code reasoning earns its keep".into(),
        },
        TaskType::QuickLookup => ModelSelection {
            model_name: config.llm.openai.default_model.clone(),
            display_name: "Quick Lookup".into(),
            emoji: "⚡".into(),
            temperature: 0.1,
            reason: "directory lookups are short, factual, and cheap to answer".into(),
        },
        TaskType::General => ModelSelection {
            model_name: config.llm.anthropic.default_model.clone(),
            display_name: "Knowledge Assistant".into(),
            emoji: "💬".into(),
            temperature: 0.5,
            reason: "open-ended questions default to the general-purpose assistant".into(),
        },
    }
}

pub fn provider_for_model(config: &AppConfig, model_name: &str) -> &'static str {
    if model_name == config.llm.anthropic.default_model {
        "anthropic"
    } else {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;

    #[test]
    fn classifies_deployment_questions() {
        assert_eq!(classify_task("what's our change failure rate this month?"), TaskType::Analytics);
        assert_eq!(route_to_specialist(TaskType::Analytics), SpecialistProfile::DeliveryAnalyst);
    }

    #[test]
    fn classifies_code_review_questions() {
        assert_eq!(classify_task("can you review this pull request diff"), TaskType::CodeAnalysis);
    }

    #[test]
    fn classifies_expert_questions() {
        assert_eq!(classify_task("who is the best contact for billing"), TaskType::QuickLookup);
        assert_eq!(route_to_specialist(TaskType::QuickLookup), SpecialistProfile::ExpertFinder);
    }

    #[test]
    fn defaults_to_general() {
        assert_eq!(classify_task("what's the weather like"), TaskType::General);
    }

    #[test]
    fn model_selection_reports_the_configured_provider() {
        let ctx = test_context();
        let selection = select_model(&ctx.config, TaskType::CodeAnalysis);
        assert_eq!(provider_for_model(&ctx.config, &selection.model_name), "anthropic");
    }
}
