//! Cross-crate traits for the governed runtime.
//!
//! The runtime accepts these as trait objects at construction time, so
//! tests can substitute no-ops instead of patching globals.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::types::{
    AgentId, EventRecord, GateDecision, RunStatus, RunTotals, ToolSchema, WorkspaceId
};

/// Sink for observability events and run lifecycle.
///
/// Every method is best-effort: implementations must swallow their own
/// failures (logging them) so that observability can never fail a tool
/// call or a session.
#[async_trait]
pub trait ObservabilityHooks: Send + Sync {
    /// Append a single event. Never fails; on error the event is dropped.
    async fn emit_event(&self, event: EventRecord);

    /// Open a run and return its id.
    async fn start_run(
        &self,
        workspace_id: WorkspaceId,
        agent_id: Option<AgentId>,
        model: Option<String>,
        metadata: Value
    ) -> Uuid;

    /// Close a run, adding totals monotonically.
    async fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error_message: Option<String>,
        totals: RunTotals
    );
}

/// Governance gate consulted before sessions open and tools execute.
#[async_trait]
pub trait GovernanceHooks: Send + Sync {
    /// Can this workspace monitor another agent?
    async fn check_agent_limit(&self, workspace_id: WorkspaceId) -> GateDecision;

    /// Is this specific agent within the monitored set? Agents with any
    /// prior event are grandfathered.
    async fn check_agent_allowed(
        &self,
        workspace_id: WorkspaceId,
        agent_id: AgentId
    ) -> GateDecision;
}

/// Error raised by a tool dispatch. The gateway materializes this into an
/// error result dict; it never propagates to the session caller.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ToolDispatchError(pub String);

/// The workspace tool registry — the adapter layer boundary.
///
/// `execute` follows the result-map convention: a map containing an
/// `error` key denotes failure even when the call itself returns `Ok`.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Tool schemas available to a workspace. Ordering is unspecified.
    async fn tools_for_workspace(&self, workspace_id: WorkspaceId) -> Vec<ToolSchema>;

    /// Execute a tool. `Err` is reserved for dispatch-level failures
    /// (panics, transport); tool-level failures come back as `Ok` maps
    /// with an `error` key.
    async fn execute(
        &self,
        tool_name: &str,
        workspace_id: WorkspaceId,
        arguments: &Value
    ) -> Result<Value, ToolDispatchError>;
}

/// Workspace notification dispatch (alerts, risk interventions).
/// Best-effort: callers log failures and continue.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, workspace_id: WorkspaceId, message: &str) -> Result<(), String>;
}

/// A third-party service adapter, as used by the approval queue executor.
///
/// Contract: never panics, never mutates domain state directly. Returns
/// `(result, error)` where exactly one side is `Some`. Idempotency is the
/// caller's responsibility.
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    async fn execute(
        &self,
        workspace_id: WorkspaceId,
        action_data: &Value
    ) -> (Option<Value>, Option<String>);
}
