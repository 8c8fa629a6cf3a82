//! Immutable execution context.
//!
//! Binds a workspace, agent, and run together so ownership, cost
//! attribution, and audit trail are unambiguous on every call. All
//! derivations return a fresh context; nothing here mutates.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use errors::SessionError;
use uuid::Uuid;
use wd_core::types::{AgentId, PolicySnapshot, WorkspaceId};

use storage::agents::AgentStore;

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub workspace_id: WorkspaceId,
    pub agent_id: AgentId,
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Blueprint capability snapshot. `None` means legacy agent — no
    /// restrictions.
    pub resolved_capabilities: Option<PolicySnapshot>
}

impl ExecutionContext {
    /// Build a context after verifying the agent belongs to the caller's
    /// workspace. In v1 the workspace id is the user id.
    pub async fn create(
        agents: &AgentStore,
        user_id: i64,
        agent_id: AgentId
    ) -> Result<Self, SessionError> {
        let workspace_id = WorkspaceId::new(user_id);
        let agent = agents
            .get(workspace_id, agent_id)
            .await
            .map_err(|e| SessionError::Database { reason: e.to_string() })?;
        if agent.is_none() {
            return Err(SessionError::AgentNotOwned {
                agent_id: agent_id.as_i64(),
                workspace_id: workspace_id.as_i64()
            });
        }

        Ok(Self {
            workspace_id,
            agent_id,
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            resolved_capabilities: None
        })
    }

    /// A copy with the blueprint capability snapshot attached. Used by
    /// the runtime at session start.
    #[must_use]
    pub fn with_capabilities(&self, capabilities: PolicySnapshot) -> Self {
        Self {
            resolved_capabilities: Some(capabilities),
            ..self.clone()
        }
    }

    /// A copy pinned to an externally assigned run id.
    #[must_use]
    pub fn with_run(&self, run_id: Uuid) -> Self {
        Self { run_id, ..self.clone() }
    }

    /// Derive a sibling context for another agent in the same workspace.
    /// A fresh run id keeps the two observability streams separate.
    pub async fn for_agent(
        &self,
        agents: &AgentStore,
        agent_id: AgentId
    ) -> Result<Self, SessionError> {
        let agent = agents
            .get(self.workspace_id, agent_id)
            .await
            .map_err(|e| SessionError::Database { reason: e.to_string() })?;
        if agent.is_none() {
            return Err(SessionError::AgentNotOwned {
                agent_id: agent_id.as_i64(),
                workspace_id: self.workspace_id.as_i64()
            });
        }

        Ok(Self {
            workspace_id: self.workspace_id,
            agent_id,
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            resolved_capabilities: None
        })
    }

    #[must_use]
    pub fn has_capabilities(&self) -> bool {
        self.resolved_capabilities.is_some()
    }

    /// The allowed tool set, or `None` for unrestricted (legacy agent or
    /// wildcard snapshot). An empty set is a real restriction.
    #[must_use]
    pub fn allowed_tools(&self) -> Option<HashSet<String>> {
        self.resolved_capabilities.as_ref()?.tool_allowlist()
    }

    /// The allowed model set, or `None` for unrestricted.
    #[must_use]
    pub fn allowed_models(&self) -> Option<HashSet<String>> {
        self.resolved_capabilities.as_ref()?.model_allowlist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(tools: &[&str], models: &[&str]) -> PolicySnapshot {
        PolicySnapshot {
            allowed_tools: tools.iter().map(|s| s.to_string()).collect(),
            allowed_models: models.iter().map(|s| s.to_string()).collect(),
            risk_profile: json!({}),
            llm_defaults: json!({}),
            identity_defaults: json!({})
        }
    }

    fn bare_context() -> ExecutionContext {
        ExecutionContext {
            workspace_id: WorkspaceId::new(1),
            agent_id: AgentId::new(2),
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            resolved_capabilities: None
        }
    }

    #[test]
    fn test_legacy_context_is_unrestricted() {
        let ctx = bare_context();
        assert!(!ctx.has_capabilities());
        assert!(ctx.allowed_tools().is_none());
        assert!(ctx.allowed_models().is_none());
    }

    #[test]
    fn test_wildcard_snapshot_is_unrestricted() {
        let ctx = bare_context().with_capabilities(snapshot(&["*"], &["*"]));
        assert!(ctx.has_capabilities());
        assert!(ctx.allowed_tools().is_none());
        assert!(ctx.allowed_models().is_none());
    }

    #[test]
    fn test_restricted_snapshot() {
        let ctx = bare_context().with_capabilities(snapshot(&["web_search"], &["openai"]));
        let tools = ctx.allowed_tools().unwrap();
        assert!(tools.contains("web_search"));
        assert!(!tools.contains("send_email"));
    }

    #[test]
    fn test_empty_tool_list_denies_everything() {
        let ctx = bare_context().with_capabilities(snapshot(&[], &["*"]));
        let tools = ctx.allowed_tools().unwrap();
        assert!(tools.is_empty());
    }

    #[test]
    fn test_with_capabilities_returns_new_context() {
        let ctx = bare_context();
        let derived = ctx.with_capabilities(snapshot(&["read"], &[]));
        assert!(ctx.resolved_capabilities.is_none());
        assert!(derived.resolved_capabilities.is_some());
        assert_eq!(ctx.run_id, derived.run_id);
    }
}
