//! Hosted action executor: the write side of the tool catalogue. Where
//! every other tool reads from a store, these reach out
//! to the issue tracker, code host, and docs platform on the user's
//! behalf through a single hosted gateway instead of one client per
//! vendor — the same "one HTTP surface, many verbs" shape as
//! [`crate::embedding::OpenAIEmbeddingClient`].

use crate::clients::HttpClientPool;
use crate::error::{PlatformError, PlatformResult};
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn issue_tracker_create(&self, params: Value) -> PlatformResult<Value>;
    async fn issue_tracker_update(&self, params: Value) -> PlatformResult<Value>;
    async fn issue_tracker_comment(&self, params: Value) -> PlatformResult<Value>;
    async fn issue_tracker_transition(&self, params: Value) -> PlatformResult<Value>;

    async fn code_host_create(&self, params: Value) -> PlatformResult<Value>;
    async fn code_host_update(&self, params: Value) -> PlatformResult<Value>;
    async fn code_host_close(&self, params: Value) -> PlatformResult<Value>;

    async fn docs_create(&self, params: Value) -> PlatformResult<Value>;
    async fn docs_update(&self, params: Value) -> PlatformResult<Value>;
    async fn docs_assign(&self, params: Value) -> PlatformResult<Value>;
}

/// Names the ten verbs [`ActionExecutor`] exposes, so a single generic
/// [`crate::agent::builtin_tools::ActionTool`] wrapper can dispatch to the
/// right one instead of ten near-identical `ToolHandler` structs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionVerb {
    IssueTrackerCreate,
    IssueTrackerUpdate,
    IssueTrackerComment,
    IssueTrackerTransition,
    CodeHostCreate,
    CodeHostUpdate,
    CodeHostClose,
    DocsCreate,
    DocsUpdate,
    DocsAssign,
}

impl ActionVerb {
    pub fn name(&self) -> &'static str {
        match self {
            ActionVerb::IssueTrackerCreate => "create_issue",
            ActionVerb::IssueTrackerUpdate => "update_issue",
            ActionVerb::IssueTrackerComment => "comment_on_issue",
            ActionVerb::IssueTrackerTransition => "transition_issue",
            ActionVerb::CodeHostCreate => "create_pull_request",
            ActionVerb::CodeHostUpdate => "update_pull_request",
            ActionVerb::CodeHostClose => "close_pull_request",
            ActionVerb::DocsCreate => "create_doc_page",
            ActionVerb::DocsUpdate => "update_doc_page",
            ActionVerb::DocsAssign => "assign_doc_page",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ActionVerb::IssueTrackerCreate => "Creates a new issue-tracker ticket.",
            ActionVerb::IssueTrackerUpdate => "Updates fields on an existing issue-tracker ticket.",
            ActionVerb::IssueTrackerComment => "Posts a comment on an issue-tracker ticket.",
            ActionVerb::IssueTrackerTransition => "Moves an issue-tracker ticket to a new status.",
            ActionVerb::CodeHostCreate => "Opens a new pull request.",
            ActionVerb::CodeHostUpdate => "Updates an existing pull request's title or description.",
            ActionVerb::CodeHostClose => "Closes a pull request without merging.",
            ActionVerb::DocsCreate => "Creates a new docs page.",
            ActionVerb::DocsUpdate => "Updates an existing docs page's content.",
            ActionVerb::DocsAssign => "Assigns a docs page to an owner.",
        }
    }

    async fn dispatch(&self, executor: &dyn ActionExecutor, params: Value) -> PlatformResult<Value> {
        match self {
            ActionVerb::IssueTrackerCreate => executor.issue_tracker_create(params).await,
            ActionVerb::IssueTrackerUpdate => executor.issue_tracker_update(params).await,
            ActionVerb::IssueTrackerComment => executor.issue_tracker_comment(params).await,
            ActionVerb::IssueTrackerTransition => executor.issue_tracker_transition(params).await,
            ActionVerb::CodeHostCreate => executor.code_host_create(params).await,
            ActionVerb::CodeHostUpdate => executor.code_host_update(params).await,
            ActionVerb::CodeHostClose => executor.code_host_close(params).await,
            ActionVerb::DocsCreate => executor.docs_create(params).await,
            ActionVerb::DocsUpdate => executor.docs_update(params).await,
            ActionVerb::DocsAssign => executor.docs_assign(params).await,
        }
    }

    pub async fn invoke(&self, executor: &dyn ActionExecutor, params: Value) -> PlatformResult<Value> {
        self.dispatch(executor, params).await
    }
}

/// Proxies every action verb to a hosted gateway over HTTP, one POST per
/// verb against `{base_url}/actions/{verb}`.
pub struct HostedActionExecutor {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HostedActionExecutor {
    pub fn new(pool: &HttpClientPool, base_url: &str, api_key: &str) -> Self {
        Self { http: pool.get(base_url), base_url: base_url.trim_end_matches('/').to_string(), api_key: api_key.to_string() }
    }

    async fn post(&self, verb: &str, params: Value) -> PlatformResult<Value> {
        let response = self
            .http
            .post(format!("{}/actions/{verb}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&params)
            .send()
            .await
            .map_err(|e| PlatformError::UpstreamUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(PlatformError::UpstreamUnavailable(format!("action {verb} failed: {status}")));
        }

        response.json().await.map_err(|e| PlatformError::UpstreamUnavailable(e.to_string()))
    }
}

#[async_trait]
impl ActionExecutor for HostedActionExecutor {
    async fn issue_tracker_create(&self, params: Value) -> PlatformResult<Value> {
        self.post("create_issue", params).await
    }

    async fn issue_tracker_update(&self, params: Value) -> PlatformResult<Value> {
        self.post("update_issue", params).await
    }

    async fn issue_tracker_comment(&self, params: Value) -> PlatformResult<Value> {
        self.post("comment_on_issue", params).await
    }

    async fn issue_tracker_transition(&self, params: Value) -> PlatformResult<Value> {
        self.post("transition_issue", params).await
    }

    async fn code_host_create(&self, params: Value) -> PlatformResult<Value> {
        self.post("create_pull_request", params).await
    }

    async fn code_host_update(&self, params: Value) -> PlatformResult<Value> {
        self.post("update_pull_request", params).await
    }

    async fn code_host_close(&self, params: Value) -> PlatformResult<Value> {
        self.post("close_pull_request", params).await
    }

    async fn docs_create(&self, params: Value) -> PlatformResult<Value> {
        self.post("create_doc_page", params).await
    }

    async fn docs_update(&self, params: Value) -> PlatformResult<Value> {
        self.post("update_doc_page", params).await
    }

    async fn docs_assign(&self, params: Value) -> PlatformResult<Value> {
        self.post("assign_doc_page", params).await
    }
}

/// Records every call instead of reaching the network, for contexts and
/// tests that need an [`ActionExecutor`] without a hosted gateway.
pub mod tests_support {
    use super::*;
    use std::sync::Mutex;

    /// Records every call instead of reaching the network, for specialist
    /// and tool-registry tests that only need to assert an action fired.
    #[derive(Default)]
    pub struct RecordingActionExecutor {
        pub calls: Mutex<Vec<(&'static str, Value)>>,
    }

    macro_rules! record {
        ($self:ident, $name:literal, $params:ident) => {{
            $self.calls.lock().unwrap().push(($name, $params.clone()));
            Ok(serde_json::json!({ "status": "ok" }))
        }};
    }

    #[async_trait]
    impl ActionExecutor for RecordingActionExecutor {
        async fn issue_tracker_create(&self, params: Value) -> PlatformResult<Value> {
            record!(self, "issue_tracker_create", params)
        }
        async fn issue_tracker_update(&self, params: Value) -> PlatformResult<Value> {
            record!(self, "issue_tracker_update", params)
        }
        async fn issue_tracker_comment(&self, params: Value) -> PlatformResult<Value> {
            record!(self, "issue_tracker_comment", params)
        }
        async fn issue_tracker_transition(&self, params: Value) -> PlatformResult<Value> {
            record!(self, "issue_tracker_transition", params)
        }
        async fn code_host_create(&self, params: Value) -> PlatformResult<Value> {
            record!(self, "code_host_create", params)
        }
        async fn code_host_update(&self, params: Value) -> PlatformResult<Value> {
            record!(self, "code_host_update", params)
        }
        async fn code_host_close(&self, params: Value) -> PlatformResult<Value> {
            record!(self, "code_host_close", params)
        }
        async fn docs_create(&self, params: Value) -> PlatformResult<Value> {
            record!(self, "docs_create", params)
        }
        async fn docs_update(&self, params: Value) -> PlatformResult<Value> {
            record!(self, "docs_update", params)
        }
        async fn docs_assign(&self, params: Value) -> PlatformResult<Value> {
            record!(self, "docs_assign", params)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::tests_support::RecordingActionExecutor;
    use super::*;

    #[tokio::test]
    async fn action_verb_dispatches_to_the_matching_executor_method() {
        let executor = RecordingActionExecutor::default();
        ActionVerb::IssueTrackerComment.invoke(&executor, serde_json::json!({"key": "PROJ-1", "body": "done"})).await.unwrap();
        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "issue_tracker_comment");
    }
}
