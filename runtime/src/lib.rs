//! # Warden Runtime
//!
//! Governed lifecycle for agent sessions.
//!
//! - [`context`] — the immutable scope token every runtime operation
//!   carries: (workspace, agent, run) plus the frozen capability
//!   snapshot. An agent cannot escalate its own privileges because the
//!   context cannot be mutated after creation.
//! - [`gateway`] — the scoped tool proxy: capability check, governance
//!   gate, dispatch, observability events. One gateway per session.
//! - [`session`] — the per-workspace runtime: session registry and
//!   per-agent FIFO inboxes behind one short-lived lock.
//!
//! Collaborators (tool registry, observability, governance) are injected
//! as trait objects at construction, so tests swap in no-ops.

pub mod context;
pub mod gateway;
pub mod session;

pub use context::ExecutionContext;
pub use gateway::ToolGateway;
pub use session::{AgentMessage, AgentRuntime, RuntimeSession};
