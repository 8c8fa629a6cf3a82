//! Scoped tool gateway — every tool call goes through here.
//!
//! Flow: capability check → governance gate → emit tool_call → dispatch
//! → emit tool_result. Denials return an error map and never reach the
//! underlying tool. The capability check fails closed; the governance
//! check fails open when its subsystem is unavailable; observability is
//! best-effort throughout.
//!
//! The gateway holds no mutable state beyond the context it was built
//! with. One gateway per (workspace, agent, run).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value, json};
use wd_core::traits::{GovernanceHooks, ObservabilityHooks, ToolRegistry};
use wd_core::types::{EventRecord, EventStatus, EventType, GateDecision, ToolSchema};

use crate::context::ExecutionContext;

const ARGUMENT_PREVIEW_MAX_LEN: usize = 500;
const ERROR_PREVIEW_MAX_LEN: usize = 300;

pub struct ToolGateway {
    ctx: ExecutionContext,
    registry: Arc<dyn ToolRegistry>,
    observability: Arc<dyn ObservabilityHooks>,
    governance: Arc<dyn GovernanceHooks>
}

impl std::fmt::Debug for ToolGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolGateway").field("ctx", &self.ctx).finish_non_exhaustive()
    }
}

impl ToolGateway {
    pub fn new(
        ctx: ExecutionContext,
        registry: Arc<dyn ToolRegistry>,
        observability: Arc<dyn ObservabilityHooks>,
        governance: Arc<dyn GovernanceHooks>
    ) -> Self {
        Self { ctx, registry, observability, governance }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Tool schemas available to this context. Restricted contexts see
    /// only their allowed set; legacy agents see the whole workspace
    /// catalog. Ordering is the registry's and is unspecified.
    pub async fn list_tools(&self) -> Vec<ToolSchema> {
        let all_tools = self.registry.tools_for_workspace(self.ctx.workspace_id).await;
        match self.ctx.allowed_tools() {
            None => all_tools,
            Some(allowed) => all_tools
                .into_iter()
                .filter(|t| allowed.contains(&t.name))
                .collect()
        }
    }

    /// Execute a tool scoped to this context. Always returns a result
    /// map; failures are materialized as `{"error": ...}`.
    pub async fn execute(&self, tool_name: &str, arguments: Value) -> Value {
        // 1. Capability boundary (blueprint enforcement). Fails closed.
        if let Some(denial) = self.check_capability(tool_name) {
            self.emit_tool_result(tool_name, &denial, EventStatus::Error, 0).await;
            return denial;
        }

        // 2. Governance gate (tier limits). Fails open when the
        // subsystem is unavailable.
        if let Some(denial) = self.check_governance().await {
            self.emit_tool_result(tool_name, &denial, EventStatus::Error, 0).await;
            return denial;
        }

        // 3. Pre-execution event.
        self.emit_tool_call(tool_name, &arguments).await;

        // 4. Dispatch, materializing dispatch failures as error maps.
        let start = Instant::now();
        let result = match self
            .registry
            .execute(tool_name, self.ctx.workspace_id, &arguments)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                let mut message = e.to_string();
                message.truncate(ERROR_PREVIEW_MAX_LEN);
                json!({ "error": format!("Tool execution failed: {message}") })
            }
        };
        let elapsed_ms = start.elapsed().as_millis() as i64;

        let status = if result.get("error").is_some() {
            EventStatus::Error
        } else {
            EventStatus::Success
        };

        // 5. Post-execution event.
        self.emit_tool_result(tool_name, &result, status, elapsed_ms).await;

        result
    }

    /// Check a model identifier against the capability snapshot. Exact
    /// match, or prefix match on either side of a `/` separator
    /// (`"openai"` allows `"openai/gpt-4o"` and vice versa).
    pub fn check_model_allowed(&self, model_identifier: &str) -> (bool, Option<String>) {
        let Some(allowed) = self.ctx.allowed_models() else {
            return (true, None);
        };

        if allowed.contains(model_identifier) {
            return (true, None);
        }
        for entry in &allowed {
            if model_identifier.starts_with(&format!("{entry}/"))
                || entry.starts_with(&format!("{model_identifier}/"))
            {
                return (true, None);
            }
        }

        (
            false,
            Some(format!(
                "Model '{model_identifier}' is not in agent capabilities. Allowed: {}",
                format_allowlist(&allowed)
            ))
        )
    }

    fn check_capability(&self, tool_name: &str) -> Option<Value> {
        let allowed = self.ctx.allowed_tools()?;

        if !allowed.contains(tool_name) {
            return Some(json!({
                "error": format!(
                    "Tool '{tool_name}' is not in agent capabilities. Allowed tools: {}",
                    format_allowlist(&allowed)
                ),
                "governance": true,
                "capability_denied": true,
            }));
        }
        None
    }

    async fn check_governance(&self) -> Option<Value> {
        match self
            .governance
            .check_agent_allowed(self.ctx.workspace_id, self.ctx.agent_id)
            .await
        {
            GateDecision::Allowed => None,
            GateDecision::Denied(reason) => Some(json!({
                "error": format!("Workspace limit reached: {reason}"),
                "governance": true,
            })),
            GateDecision::Unavailable(reason) => {
                tracing::warn!("governance unavailable, failing open: {reason}");
                None
            }
        }
    }

    async fn emit_tool_call(&self, tool_name: &str, arguments: &Value) {
        let mut event =
            EventRecord::new(self.ctx.workspace_id, EventType::ToolCall, EventStatus::Info);
        event.agent_id = Some(self.ctx.agent_id);
        event.run_id = Some(self.ctx.run_id);
        event.payload = json!({
            "tool": tool_name,
            "arguments": safe_payload(arguments),
        });
        self.observability.emit_event(event).await;
    }

    async fn emit_tool_result(
        &self,
        tool_name: &str,
        result: &Value,
        status: EventStatus,
        latency_ms: i64
    ) {
        let mut event =
            EventRecord::new(self.ctx.workspace_id, EventType::ToolResult, status);
        event.agent_id = Some(self.ctx.agent_id);
        event.run_id = Some(self.ctx.run_id);
        event.latency_ms = Some(latency_ms);
        event.payload = json!({
            "tool": tool_name,
            "has_error": result.get("error").is_some(),
        });
        self.observability.emit_event(event).await;
    }
}

/// `['a', 'b']` — sorted, quoted form used in denial messages.
fn format_allowlist(allowed: &HashSet<String>) -> String {
    let mut entries: Vec<&String> = allowed.iter().collect();
    entries.sort();
    let quoted: Vec<String> = entries.iter().map(|e| format!("'{e}'")).collect();
    format!("[{}]", quoted.join(", "))
}

/// Truncate argument values so event payloads stay bounded.
fn safe_payload(arguments: &Value) -> Value {
    let Some(map) = arguments.as_object() else {
        let mut s = arguments.to_string();
        s.truncate(ARGUMENT_PREVIEW_MAX_LEN);
        return Value::String(s);
    };

    let mut safe = Map::new();
    for (key, value) in map {
        let mut s = match value {
            Value::String(s) => s.clone(),
            other => other.to_string()
        };
        s.truncate(ARGUMENT_PREVIEW_MAX_LEN);
        safe.insert(key.clone(), Value::String(s));
    }
    Value::Object(safe)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_allowlist_is_sorted_and_quoted() {
        let allowed: HashSet<String> =
            ["write", "read"].iter().map(|s| s.to_string()).collect();
        assert_eq!(format_allowlist(&allowed), "['read', 'write']");
    }

    #[test]
    fn test_safe_payload_truncates_long_values() {
        let long = "x".repeat(2000);
        let args = json!({ "body": long });
        let safe = safe_payload(&args);
        assert_eq!(
            safe["body"].as_str().unwrap().len(),
            ARGUMENT_PREVIEW_MAX_LEN
        );
    }

    #[test]
    fn test_safe_payload_stringifies_non_strings() {
        let args = json!({ "count": 7, "nested": {"a": 1} });
        let safe = safe_payload(&args);
        assert_eq!(safe["count"], json!("7"));
        assert!(safe["nested"].as_str().unwrap().contains("\"a\""));
    }
}
