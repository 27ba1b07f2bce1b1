//! Typed tool protocol and registry.
//!
//! Every capability the agent runtime exposes to an LLM — a relational
//! read, a time-series aggregation, a graph traversal, a RAG pipeline
//! invocation, or an external side-effecting action — is a [`ToolHandler`]
//! registered in a [`ToolRegistry`] under a stable name. The registry
//! validates the LLM's JSON arguments against the tool's declared
//! [`ToolParameter`]s before invoking the handler, and normalises every
//! result (including errors) into a [`ToolResult`] the reason-act loop can
//! feed back to the model as a tool message.
//!
//! # Example
//!
//! ```rust
//! use tools::{Tool, ToolHandler, ToolMetadata, ToolParameter, ToolParameterType, ToolRegistry, ToolResult};
//! use async_trait::async_trait;
//! use std::error::Error;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl ToolHandler for Echo {
//!     async fn invoke(
//!         &self,
//!         params: serde_json::Value,
//!     ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
//!         Ok(ToolResult::success(params))
//!     }
//! }
//!
//! # async {
//! let mut registry = ToolRegistry::new();
//! registry.register(
//!     Tool::new("echo", "Echoes back its input", std::sync::Arc::new(Echo))
//!         .with_parameter(ToolParameter::new("text", ToolParameterType::String).required()),
//! );
//! let result = registry.execute("echo", serde_json::json!({"text": "hi"})).await.unwrap();
//! assert!(result.success);
//! # };
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Outcome of a tool invocation, always returned even on failure so the
/// reason-act loop can hand it back to the LLM as a tool message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: serde_json::Value,
    pub error: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ToolResult {
    pub fn success(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
            metadata: HashMap::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error.into()),
            metadata: HashMap::new(),
        }
    }

    /// Structured "not found" payload per the error taxonomy — never a thrown error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            success: true,
            output: serde_json::json!({ "status": "not_found", "message": message.into() }),
            error: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ToolParameterType,
    pub description: Option<String>,
    pub required: bool,
    pub default: Option<serde_json::Value>,
    pub items: Option<Box<ToolParameterType>>,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, param_type: ToolParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            required: false,
            default: None,
            items: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_items(mut self, item_type: ToolParameterType) -> Self {
        self.items = Some(Box::new(item_type));
        self
    }

    /// Validate a single JSON value against this parameter's declared type.
    fn type_matches(&self, value: &serde_json::Value) -> bool {
        match self.param_type {
            ToolParameterType::String => value.is_string(),
            ToolParameterType::Number => value.is_number(),
            ToolParameterType::Integer => value.is_i64() || value.is_u64(),
            ToolParameterType::Boolean => value.is_boolean(),
            ToolParameterType::Array => value.is_array(),
            ToolParameterType::Object => value.is_object(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Project this tool's schema into the JSON Schema object an LLM's
    /// function-calling API expects in its `tools` array.
    pub fn input_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            let mut prop = serde_json::json!({ "type": schema_type(&param.param_type) });
            if let Some(desc) = &param.description {
                prop["description"] = serde_json::json!(desc);
            }
            if let Some(items) = &param.items {
                prop["items"] = serde_json::json!({ "type": schema_type(items) });
            }
            properties.insert(param.name.clone(), prop);
            if param.required {
                required.push(param.name.clone());
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

fn schema_type(t: &ToolParameterType) -> &'static str {
    match t {
        ToolParameterType::String => "string",
        ToolParameterType::Number => "number",
        ToolParameterType::Integer => "integer",
        ToolParameterType::Boolean => "boolean",
        ToolParameterType::Array => "array",
        ToolParameterType::Object => "object",
    }
}

/// Errors surfaced by tool lookup and argument validation, distinct from
/// the `ToolResult::failure` path which represents an application-level
/// failure the LLM should be allowed to see and recover from.
#[derive(Debug, Clone)]
pub enum ToolError {
    NotFound(String),
    InvalidParameters(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::NotFound(name) => write!(f, "tool not found: {name}"),
            ToolError::InvalidParameters(msg) => write!(f, "invalid parameters: {msg}"),
        }
    }
}

impl Error for ToolError {}

/// Implemented by each concrete capability (a relational read, a pipeline
/// invocation, an external action). Handlers receive already-validated
/// JSON arguments.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(
        &self,
        params: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>>;
}

/// A named, schema-described capability bound to a handler implementation.
pub struct Tool {
    metadata: ToolMetadata,
    handler: Arc<dyn ToolHandler>,
}

impl Tool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            metadata: ToolMetadata::new(name, description),
            handler,
        }
    }

    pub fn with_parameter(mut self, param: ToolParameter) -> Self {
        self.metadata.parameters.push(param);
        self
    }

    pub fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    /// Validate `params` against the declared schema, filling in defaults
    /// for missing optional arguments, then invoke the handler.
    pub async fn execute(
        &self,
        mut params: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        if !params.is_object() {
            return Err(Box::new(ToolError::InvalidParameters(
                "arguments must be a JSON object".to_string(),
            )));
        }
        let obj = params.as_object_mut().unwrap();
        for param in &self.metadata.parameters {
            match obj.get(&param.name) {
                Some(value) => {
                    if !param.type_matches(value) {
                        return Err(Box::new(ToolError::InvalidParameters(format!(
                            "{} must be of type {:?}",
                            param.name, param.param_type
                        ))));
                    }
                }
                None => {
                    if let Some(default) = &param.default {
                        obj.insert(param.name.clone(), default.clone());
                    } else if param.required {
                        return Err(Box::new(ToolError::InvalidParameters(format!(
                            "missing required parameter: {}",
                            param.name
                        ))));
                    }
                }
            }
        }
        self.handler.invoke(params).await
    }
}

/// The set of tools visible to a given specialist. Agents never see the
/// handler implementations directly — only names, schemas, and results.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.metadata.name.clone(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn list(&self) -> Vec<&ToolMetadata> {
        self.tools.values().map(|t| &t.metadata).collect()
    }

    /// Build a registry scoped to a subset of names, used to give each
    /// specialist only its allowed tools.
    pub fn subset(&self, names: &[&str]) -> ToolRegistrySubset<'_> {
        ToolRegistrySubset {
            registry: self,
            allowed: names.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub async fn execute(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;
        tool.execute(parameters).await
    }
}

/// A read-only view over a [`ToolRegistry`] restricted to a named subset,
/// used to enforce each specialist's fixed allowed-tool list.
pub struct ToolRegistrySubset<'a> {
    registry: &'a ToolRegistry,
    allowed: std::collections::HashSet<String>,
}

impl<'a> ToolRegistrySubset<'a> {
    pub fn list(&self) -> Vec<&ToolMetadata> {
        self.registry
            .list()
            .into_iter()
            .filter(|m| self.allowed.contains(&m.name))
            .collect()
    }

    pub async fn execute(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        if !self.allowed.contains(tool_name) {
            return Err(Box::new(ToolError::NotFound(tool_name.to_string())));
        }
        self.registry.execute(tool_name, parameters).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn invoke(
            &self,
            params: serde_json::Value,
        ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
            Ok(ToolResult::success(params))
        }
    }

    #[tokio::test]
    async fn validates_required_parameters() {
        let mut registry = ToolRegistry::new();
        registry.register(
            Tool::new("echo", "Echoes input", Arc::new(Echo))
                .with_parameter(ToolParameter::new("text", ToolParameterType::String).required()),
        );

        let err = registry.execute("echo", serde_json::json!({})).await;
        assert!(err.is_err());

        let ok = registry
            .execute("echo", serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        assert!(ok.success);
    }

    #[tokio::test]
    async fn fills_defaults_for_missing_optional_params() {
        let mut registry = ToolRegistry::new();
        registry.register(
            Tool::new("echo", "Echoes input", Arc::new(Echo)).with_parameter(
                ToolParameter::new("limit", ToolParameterType::Integer)
                    .with_default(serde_json::json!(20)),
            ),
        );
        let result = registry.execute("echo", serde_json::json!({})).await.unwrap();
        assert_eq!(result.output["limit"], 20);
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let registry = ToolRegistry::new();
        let err = registry.execute("nope", serde_json::json!({})).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn subset_hides_tools_outside_allow_list() {
        let mut registry = ToolRegistry::new();
        registry.register(Tool::new("a", "tool a", Arc::new(Echo)));
        registry.register(Tool::new("b", "tool b", Arc::new(Echo)));
        let subset = registry.subset(&["a"]);
        assert_eq!(subset.list().len(), 1);
        assert!(subset.execute("b", serde_json::json!({})).await.is_err());
        assert!(subset.execute("a", serde_json::json!({})).await.is_ok());
    }
}
