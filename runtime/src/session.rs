//! Per-workspace agent runtime: session registry and inter-agent
//! mailboxes.
//!
//! One runtime per workspace; two runtimes share nothing. The registry
//! and inboxes live behind a single mutex held only for O(1) map
//! operations — never across an await point. Messages are immutable and
//! delivered FIFO per recipient; messaging is in-process only.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use errors::SessionError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;
use wd_core::traits::{GovernanceHooks, ObservabilityHooks, ToolRegistry};
use wd_core::types::{
    AgentId, EventRecord, EventStatus, EventType, GateDecision, PolicySnapshot, RunStatus,
    RunTotals, ToolSchema, WorkspaceId
};

use crate::context::ExecutionContext;
use crate::gateway::ToolGateway;
use storage::agents::AgentStore;
use storage::instances::InstanceStore;

/// Immutable message exchanged between agents within a workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: Uuid,
    pub from_agent_id: AgentId,
    pub to_agent_id: AgentId,
    pub workspace_id: WorkspaceId,
    pub content: Value,
    pub created_at: DateTime<Utc>
}

#[derive(Default)]
struct RuntimeInner {
    sessions: HashMap<Uuid, Arc<RuntimeSession>>,
    inboxes: HashMap<i64, VecDeque<AgentMessage>>
}

/// Governed runtime for one workspace.
pub struct AgentRuntime {
    workspace_id: WorkspaceId,
    agents: AgentStore,
    instances: InstanceStore,
    registry: Arc<dyn ToolRegistry>,
    observability: Arc<dyn ObservabilityHooks>,
    governance: Arc<dyn GovernanceHooks>,
    inner: Mutex<RuntimeInner>
}

impl AgentRuntime {
    pub fn new(
        pool: sqlx::PgPool,
        workspace_id: WorkspaceId,
        registry: Arc<dyn ToolRegistry>,
        observability: Arc<dyn ObservabilityHooks>,
        governance: Arc<dyn GovernanceHooks>
    ) -> Arc<Self> {
        Arc::new(Self {
            workspace_id,
            agents: AgentStore::new(pool.clone()),
            instances: InstanceStore::new(pool),
            registry,
            observability,
            governance,
            inner: Mutex::new(RuntimeInner::default())
        })
    }

    pub fn workspace_id(&self) -> WorkspaceId {
        self.workspace_id
    }

    /// Start a governed session for an agent in this workspace.
    ///
    /// Ownership is verified, blueprint capabilities are attached when
    /// an instance binding exists (legacy agents proceed unrestricted),
    /// and the pre-start governance gate runs before a run is opened.
    /// A governance denial refuses the session; an unavailable
    /// governance subsystem fails open.
    pub async fn start_session(
        self: &Arc<Self>,
        user_id: i64,
        agent_id: AgentId
    ) -> Result<Arc<RuntimeSession>, SessionError> {
        let ctx = ExecutionContext::create(&self.agents, user_id, agent_id).await?;

        if ctx.workspace_id != self.workspace_id {
            return Err(SessionError::WorkspaceMismatch {
                agent_id: agent_id.as_i64(),
                agent_workspace: ctx.workspace_id.as_i64(),
                runtime_workspace: self.workspace_id.as_i64()
            });
        }

        let ctx = self.load_capabilities(ctx).await;
        self.pre_start_check(&ctx).await?;

        let run_id = self
            .observability
            .start_run(
                ctx.workspace_id,
                Some(ctx.agent_id),
                None,
                json!({"source": "agent_runtime"})
            )
            .await;
        let ctx = ctx.with_run(run_id);

        let gateway = ToolGateway::new(
            ctx.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.observability),
            Arc::clone(&self.governance)
        );

        let session = Arc::new(RuntimeSession {
            ctx,
            gateway,
            runtime: Arc::downgrade(self),
            stopped: AtomicBool::new(false)
        });

        self.inner
            .lock()
            .sessions
            .insert(session.ctx.run_id, Arc::clone(&session));

        Ok(session)
    }

    /// Look up an active session by run id.
    pub fn get_session(&self, run_id: Uuid) -> Option<Arc<RuntimeSession>> {
        self.inner.lock().sessions.get(&run_id).cloned()
    }

    /// Snapshot of currently active sessions.
    pub fn active_sessions(&self) -> Vec<Arc<RuntimeSession>> {
        self.inner
            .lock()
            .sessions
            .values()
            .filter(|s| s.is_active())
            .cloned()
            .collect()
    }

    /// Attach the policy snapshot when the agent has an instance
    /// binding. Failures fail open: the agent proceeds as legacy.
    async fn load_capabilities(&self, ctx: ExecutionContext) -> ExecutionContext {
        match self.instances.get(ctx.agent_id).await {
            Ok(Some(instance)) => {
                match serde_json::from_value::<PolicySnapshot>(instance.policy_snapshot) {
                    Ok(snapshot) => ctx.with_capabilities(snapshot),
                    Err(e) => {
                        tracing::warn!(
                            "unreadable policy snapshot for agent {}; treating as legacy: {e}",
                            ctx.agent_id
                        );
                        ctx
                    }
                }
            }
            Ok(None) => ctx,
            Err(e) => {
                // Identity tables may not exist yet; the runtime stays
                // usable for legacy agents.
                tracing::warn!("instance lookup failed, treating as legacy: {e}");
                ctx
            }
        }
    }

    /// Pre-start governance. Denials refuse the session; infrastructure
    /// failures fail open.
    async fn pre_start_check(&self, ctx: &ExecutionContext) -> Result<(), SessionError> {
        match self.governance.check_agent_limit(ctx.workspace_id).await {
            GateDecision::Denied(reason) => {
                return Err(SessionError::LimitReached { reason });
            }
            GateDecision::Unavailable(reason) => {
                tracing::warn!("governance unavailable at session start, failing open: {reason}");
            }
            GateDecision::Allowed => {}
        }

        match self
            .governance
            .check_agent_allowed(ctx.workspace_id, ctx.agent_id)
            .await
        {
            GateDecision::Denied(reason) => Err(SessionError::AgentBlocked { reason }),
            GateDecision::Unavailable(reason) => {
                tracing::warn!("governance unavailable at session start, failing open: {reason}");
                Ok(())
            }
            GateDecision::Allowed => Ok(())
        }
    }

    /// Route a message between agents in this workspace.
    async fn deliver_message(
        &self,
        from_ctx: &ExecutionContext,
        to_agent_id: AgentId,
        content: Value
    ) -> Result<AgentMessage, SessionError> {
        let target = self
            .agents
            .get(self.workspace_id, to_agent_id)
            .await
            .map_err(|e| SessionError::Database { reason: e.to_string() })?;
        if target.is_none() {
            return Err(SessionError::AgentNotOwned {
                agent_id: to_agent_id.as_i64(),
                workspace_id: self.workspace_id.as_i64()
            });
        }

        let message = AgentMessage {
            id: Uuid::new_v4(),
            from_agent_id: from_ctx.agent_id,
            to_agent_id,
            workspace_id: self.workspace_id,
            content,
            created_at: Utc::now()
        };

        self.inner
            .lock()
            .inboxes
            .entry(to_agent_id.as_i64())
            .or_default()
            .push_back(message.clone());

        // Best-effort observability for the hand-off.
        let mut event = EventRecord::new(
            self.workspace_id,
            EventType::ActionStarted,
            EventStatus::Info
        );
        event.agent_id = Some(from_ctx.agent_id);
        event.run_id = Some(from_ctx.run_id);
        event.payload = json!({
            "type": "agent_message",
            "to_agent_id": to_agent_id,
            "message_id": message.id,
        });
        self.observability.emit_event(event).await;

        Ok(message)
    }

    /// Drain an agent's inbox atomically. Messages come back in send
    /// order.
    fn drain_inbox(&self, agent_id: AgentId) -> Vec<AgentMessage> {
        let mut inner = self.inner.lock();
        match inner.inboxes.get_mut(&agent_id.as_i64()) {
            Some(inbox) => inbox.drain(..).collect(),
            None => Vec::new()
        }
    }

    async fn finalize_session(
        &self,
        ctx: &ExecutionContext,
        status: RunStatus,
        error: Option<String>
    ) {
        self.observability
            .finish_run(ctx.run_id, status, error, RunTotals::default())
            .await;
        self.inner.lock().sessions.remove(&ctx.run_id);
    }
}

/// Active, governed session for a single agent. Obtained via
/// [`AgentRuntime::start_session`].
pub struct RuntimeSession {
    ctx: ExecutionContext,
    gateway: ToolGateway,
    runtime: Weak<AgentRuntime>,
    stopped: AtomicBool
}

impl std::fmt::Debug for RuntimeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeSession")
            .field("ctx", &self.ctx)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl RuntimeSession {
    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn tools(&self) -> &ToolGateway {
        &self.gateway
    }

    pub fn is_active(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    pub async fn execute_tool(
        &self,
        tool_name: &str,
        arguments: Value
    ) -> Result<Value, SessionError> {
        self.assert_active()?;
        Ok(self.gateway.execute(tool_name, arguments).await)
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolSchema>, SessionError> {
        self.assert_active()?;
        Ok(self.gateway.list_tools().await)
    }

    /// Send a message to another agent in the same workspace.
    pub async fn send_message(
        &self,
        to_agent_id: AgentId,
        content: Value
    ) -> Result<AgentMessage, SessionError> {
        self.assert_active()?;
        let runtime = self.runtime()?;
        runtime.deliver_message(&self.ctx, to_agent_id, content).await
    }

    /// Drain this agent's inbox. Returns messages in send order.
    pub fn receive_messages(&self) -> Result<Vec<AgentMessage>, SessionError> {
        self.assert_active()?;
        let runtime = self.runtime()?;
        Ok(runtime.drain_inbox(self.ctx.agent_id))
    }

    /// Finalize the session's run. Idempotent; operations after stop
    /// fail with a non-retryable error.
    pub async fn stop(&self, status: RunStatus, error: Option<String>) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(runtime) = self.runtime() {
            runtime.finalize_session(&self.ctx, status, error).await;
        }
    }

    fn assert_active(&self) -> Result<(), SessionError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SessionError::Stopped {
                agent_id: self.ctx.agent_id.as_i64(),
                run_id: self.ctx.run_id.to_string()
            });
        }
        Ok(())
    }

    fn runtime(&self) -> Result<Arc<AgentRuntime>, SessionError> {
        self.runtime.upgrade().ok_or(SessionError::Stopped {
            agent_id: self.ctx.agent_id.as_i64(),
            run_id: self.ctx.run_id.to_string()
        })
    }
}
