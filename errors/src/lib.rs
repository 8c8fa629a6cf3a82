//! # Warden Errors
//!
//! Shared domain error enums for the governed agent runtime.
//!
//! Error kinds follow the platform-wide policy:
//! - *Validation* errors describe bad input and never mutate state.
//! - *Permission* errors never disclose cross-workspace resource existence.
//! - *Conflict* errors carry the explicit reason (duplicate name, stale
//!   lifecycle state).
//! - *Governance* denials include a remedial suggestion where one exists.
//! - Infrastructure failures are wrapped as `Database` variants by the
//!   service layer; stores keep their own `sqlx`-sourced enums.

use thiserror::Error;

/// Identity subsystem errors: blueprints, capability bundles, instances.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("{resource} {id} not found in workspace {workspace_id}")]
    NotFound {
        resource: &'static str,
        id: String,
        workspace_id: i64
    },

    #[error("Invalid role_type: {role}")]
    InvalidRoleType { role: String },

    #[error("Cannot update blueprint in {status} status. Only drafts are mutable.")]
    NotDraft { status: String },

    #[error("Cannot publish an archived blueprint")]
    PublishArchived,

    #[error("Cannot archive a draft blueprint. Publish it first or delete it.")]
    ArchiveDraft,

    #[error("Blueprint {blueprint_id} is in {status} status. Only published blueprints can be instantiated.")]
    NotPublished { blueprint_id: String, status: String },

    #[error(
        "Agent {agent_id} already has an instance binding (blueprint={blueprint_id} v{version}). Remove the existing instance first."
    )]
    AlreadyInstantiated {
        agent_id: i64,
        blueprint_id: String,
        version: i64
    },

    #[error("Override validation failed: {reason}")]
    OverrideDenied { reason: String },

    #[error("CapabilityBundle {name:?} already exists in workspace {workspace_id}")]
    BundleNameConflict { name: String, workspace_id: i64 },

    #[error("Cannot modify a system capability bundle")]
    SystemBundleImmutable,

    #[error("Database error: {reason}")]
    Database { reason: String }
}

/// Runtime subsystem errors: contexts, sessions, the tool gateway.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Agent {agent_id} does not belong to workspace {workspace_id}")]
    AgentNotOwned { agent_id: i64, workspace_id: i64 },

    #[error(
        "Agent {agent_id} resolved to workspace {agent_workspace}, but this runtime serves workspace {runtime_workspace}"
    )]
    WorkspaceMismatch {
        agent_id: i64,
        agent_workspace: i64,
        runtime_workspace: i64
    },

    #[error("Workspace limit reached: {reason}")]
    LimitReached { reason: String },

    #[error("Agent blocked: {reason}")]
    AgentBlocked { reason: String },

    #[error("Session for agent {agent_id} (run {run_id}) has been stopped")]
    Stopped { agent_id: i64, run_id: String },

    #[error("Database error: {reason}")]
    Database { reason: String }
}

/// Risk engine errors.
#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Policy {policy_id} not found in workspace {workspace_id}")]
    PolicyNotFound { policy_id: String, workspace_id: i64 },

    #[error("Invalid policy configuration: {reason}")]
    InvalidPolicy { reason: String },

    #[error("Database error: {reason}")]
    Database { reason: String }
}

/// Approval queue errors.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("Action not found or already processed")]
    NotFound,

    #[error("No executor for ({action_type}, {service_type})")]
    NoHandler {
        action_type: String,
        service_type: String
    },

    #[error("Invalid action_data: {reason}")]
    InvalidActionData { reason: String },

    #[error("{reason}")]
    HandlerFailed { reason: String },

    #[error("An internal error occurred")]
    Internal,

    #[error("Database error: {reason}")]
    Database { reason: String }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_are_descriptive() {
        let err = IdentityError::AlreadyInstantiated {
            agent_id: 7,
            blueprint_id: "bp-1".to_string(),
            version: 3
        };
        let msg = err.to_string();
        assert!(msg.contains("Agent 7"));
        assert!(msg.contains("v3"));

        let err = SessionError::Stopped {
            agent_id: 2,
            run_id: "r-9".to_string()
        };
        assert!(err.to_string().contains("has been stopped"));

        let err = ApprovalError::NoHandler {
            action_type: "send_email".to_string(),
            service_type: "gmail".to_string()
        };
        assert_eq!(err.to_string(), "No executor for (send_email, gmail)");
    }
}
