//! # Warden Adapters
//!
//! The third-party boundary. The real Gmail/Slack/Binance integrations
//! live outside the governance core; this crate carries the contracts
//! they implement plus in-memory reference implementations used for
//! tests and local wiring.
//!
//! Adapter contract: `(workspace, action_data) → (result, error)` —
//! never panics, never mutates domain state, idempotency belongs to the
//! caller.

pub mod notify;
pub mod observability;
pub mod services;
pub mod tools;

pub use notify::{LogNotifier, RecordingNotifier};
pub use observability::RecordingObservability;
pub use services::MockAdapter;
pub use tools::StaticToolRegistry;

use async_trait::async_trait;
use wd_core::traits::GovernanceHooks;
use wd_core::types::{AgentId, GateDecision, WorkspaceId};

/// Governance gate that allows everything. Used where governance is
/// intentionally absent (tests, single-tenant embedding).
pub struct AllowAllGovernance;

#[async_trait]
impl GovernanceHooks for AllowAllGovernance {
    async fn check_agent_limit(&self, _workspace_id: WorkspaceId) -> GateDecision {
        GateDecision::Allowed
    }

    async fn check_agent_allowed(
        &self,
        _workspace_id: WorkspaceId,
        _agent_id: AgentId
    ) -> GateDecision {
        GateDecision::Allowed
    }
}

/// Governance gate that denies everything with a fixed reason.
pub struct DenyAllGovernance(pub String);

#[async_trait]
impl GovernanceHooks for DenyAllGovernance {
    async fn check_agent_limit(&self, _workspace_id: WorkspaceId) -> GateDecision {
        GateDecision::Denied(self.0.clone())
    }

    async fn check_agent_allowed(
        &self,
        _workspace_id: WorkspaceId,
        _agent_id: AgentId
    ) -> GateDecision {
        GateDecision::Denied(self.0.clone())
    }
}
