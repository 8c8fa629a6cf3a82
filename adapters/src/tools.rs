//! In-memory tool registry.
//!
//! Tools register with a schema and a canned response; `execute` records
//! every call so tests can assert on dispatch. A real deployment
//! replaces this with the adapter-backed registry at the HTTP boundary.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use wd_core::traits::{ToolDispatchError, ToolRegistry};
use wd_core::types::{ToolSchema, WorkspaceId};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub tool_name: String,
    pub workspace_id: WorkspaceId,
    pub arguments: Value
}

enum CannedResponse {
    Result(Value),
    DispatchFailure(String)
}

#[derive(Default)]
pub struct StaticToolRegistry {
    tools: Mutex<Vec<ToolSchema>>,
    responses: Mutex<HashMap<String, CannedResponse>>,
    calls: Mutex<Vec<RecordedCall>>
}

impl StaticToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool with the result its execution returns.
    pub fn register(&self, name: &str, description: &str, response: Value) {
        self.tools.lock().push(ToolSchema {
            name: name.to_string(),
            description: description.to_string(),
            parameters: json!({})
        });
        self.responses
            .lock()
            .insert(name.to_string(), CannedResponse::Result(response));
    }

    /// Register a tool whose dispatch fails outright (transport error,
    /// panic in the adapter).
    pub fn register_failing(&self, name: &str, error: &str) {
        self.tools.lock().push(ToolSchema {
            name: name.to_string(),
            description: String::new(),
            parameters: json!({})
        });
        self.responses
            .lock()
            .insert(name.to_string(), CannedResponse::DispatchFailure(error.to_string()));
    }

    /// Every call made through this registry, in order.
    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ToolRegistry for StaticToolRegistry {
    async fn tools_for_workspace(&self, _workspace_id: WorkspaceId) -> Vec<ToolSchema> {
        self.tools.lock().clone()
    }

    async fn execute(
        &self,
        tool_name: &str,
        workspace_id: WorkspaceId,
        arguments: &Value
    ) -> Result<Value, ToolDispatchError> {
        self.calls.lock().push(RecordedCall {
            tool_name: tool_name.to_string(),
            workspace_id,
            arguments: arguments.clone()
        });

        let responses = self.responses.lock();
        match responses.get(tool_name) {
            Some(CannedResponse::Result(value)) => Ok(value.clone()),
            Some(CannedResponse::DispatchFailure(error)) => {
                Err(ToolDispatchError(error.clone()))
            }
            None => Ok(json!({ "error": format!("Unknown tool: {tool_name}") }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_returns_canned_response() {
        let registry = StaticToolRegistry::new();
        registry.register("web_search", "search the web", json!({"ok": true}));

        let result = registry
            .execute("web_search", WorkspaceId::new(1), &json!({"q": "rust"}))
            .await
            .unwrap();
        assert_eq!(result, json!({"ok": true}));
        assert_eq!(registry.recorded_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_error_map() {
        let registry = StaticToolRegistry::new();
        let result = registry
            .execute("nope", WorkspaceId::new(1), &json!({}))
            .await
            .unwrap();
        assert!(result["error"].as_str().unwrap().contains("Unknown tool"));
    }
}
