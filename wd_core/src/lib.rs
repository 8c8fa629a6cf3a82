//! # Warden Core
//!
//! Shared types and traits for the Warden governed agent runtime.
//!
//! This crate provides:
//! - Workspace-scoped identifier newtypes
//! - The enum vocabulary shared by every subsystem (event types, policy
//!   types, lifecycle statuses)
//! - The resolved [`types::PolicySnapshot`] that instances pin at runtime
//! - Cross-crate traits for observability, governance, tool dispatch, and
//!   notification hooks

pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use types::{
    AgentId, ApprovalStatus, BlueprintStatus, CollabRole, EventRecord, EventStatus, EventType,
    GateDecision, PolicyAction, PolicySnapshot, PolicyType, RoleType, RunStatus, RunTotals,
    WorkspaceId
};
