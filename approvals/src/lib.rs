//! # Warden Approvals
//!
//! Agents propose externally-facing actions; humans resolve them.
//!
//! State machine: pending → approved → executed | failed, or
//! pending → rejected. No reverse transitions. The approve-and-execute
//! path is a single database transaction around the adapter call, so at
//! most one approval ever drives an action to completion.

pub mod executor;
pub mod queue;

pub use executor::HandlerRegistry;
pub use queue::ApprovalQueue;
