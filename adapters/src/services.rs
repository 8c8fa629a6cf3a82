//! Reference service adapters for the approval queue executor.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use wd_core::traits::ServiceAdapter;
use wd_core::types::WorkspaceId;

/// Canned adapter: returns a fixed `(result, error)` pair and records
/// each invocation.
pub struct MockAdapter {
    result: Option<Value>,
    error: Option<String>,
    calls: Mutex<Vec<(WorkspaceId, Value)>>
}

impl MockAdapter {
    /// An adapter that succeeds with `result`.
    #[must_use]
    pub fn succeeding(result: Value) -> Self {
        Self {
            result: Some(result),
            error: None,
            calls: Mutex::new(Vec::new())
        }
    }

    /// An adapter that fails with `error`.
    #[must_use]
    pub fn failing(error: &str) -> Self {
        Self {
            result: None,
            error: Some(error.to_string()),
            calls: Mutex::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn last_call(&self) -> Option<(WorkspaceId, Value)> {
        self.calls.lock().last().cloned()
    }
}

#[async_trait]
impl ServiceAdapter for MockAdapter {
    async fn execute(
        &self,
        workspace_id: WorkspaceId,
        action_data: &Value
    ) -> (Option<Value>, Option<String>) {
        self.calls.lock().push((workspace_id, action_data.clone()));
        (self.result.clone(), self.error.clone())
    }
}
