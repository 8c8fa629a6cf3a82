//! Approval queue state transitions.
//!
//! `approve_and_execute` claims the action (pending → approved) inside a
//! transaction, invokes the handler while the transaction is open, and
//! commits the terminal status plus the service usage bump together.
//! A second concurrent approval loses the pending guard and sees "not
//! found or already processed".

use std::sync::Arc;

use errors::ApprovalError;
use serde_json::Value;
use sqlx::PgPool;
use wd_core::types::{AgentId, WorkspaceId};

use crate::executor::HandlerRegistry;
use storage::approvals::{ActionRecord, ApprovalStore};

fn db_err(e: sqlx::Error) -> ApprovalError {
    ApprovalError::Database { reason: e.to_string() }
}

pub struct ApprovalQueue {
    store: ApprovalStore,
    handlers: Arc<HandlerRegistry>
}

impl ApprovalQueue {
    pub fn new(pool: PgPool, handlers: Arc<HandlerRegistry>) -> Self {
        Self {
            store: ApprovalStore::new(pool),
            handlers
        }
    }

    /// Queue a new pending action.
    pub async fn create_action(
        &self,
        workspace_id: WorkspaceId,
        agent_id: Option<AgentId>,
        action_type: &str,
        service_type: &str,
        action_data: Value,
        ai_reasoning: &str,
        ai_confidence: f64
    ) -> Result<ActionRecord, ApprovalError> {
        self.store
            .create(
                workspace_id,
                agent_id,
                action_type,
                service_type,
                action_data,
                ai_reasoning,
                ai_confidence
            )
            .await
            .map_err(db_err)
    }

    /// Pending actions for a workspace, newest first.
    pub async fn get_pending_actions(
        &self,
        workspace_id: WorkspaceId
    ) -> Result<Vec<ActionRecord>, ApprovalError> {
        self.store.pending(workspace_id).await.map_err(db_err)
    }

    pub async fn get_action(
        &self,
        workspace_id: WorkspaceId,
        action_id: i64
    ) -> Result<Option<ActionRecord>, ApprovalError> {
        self.store.get(workspace_id, action_id).await.map_err(db_err)
    }

    /// Approve a pending action and execute it through its handler.
    ///
    /// Outcomes:
    /// - executed: handler returned a result; usage counter bumped.
    /// - failed: no handler for the pair, or the handler reported an
    ///   error. The error is persisted on the action.
    /// - not found: missing, foreign, or already processed.
    pub async fn approve_and_execute(
        &self,
        workspace_id: WorkspaceId,
        action_id: i64
    ) -> Result<ActionRecord, ApprovalError> {
        let Some((tx, action)) = self
            .store
            .claim_pending(workspace_id, action_id)
            .await
            .map_err(db_err)?
        else {
            return Err(ApprovalError::NotFound);
        };

        let Some(handler) = self.handlers.get(&action.action_type, &action.service_type) else {
            let error = ApprovalError::NoHandler {
                action_type: action.action_type.clone(),
                service_type: action.service_type.clone()
            };
            self.store
                .commit_failed(tx, action_id, &error.to_string())
                .await
                .map_err(db_err)?;
            return Err(error);
        };

        let (result, error) = handler.execute(workspace_id, &action.action_data).await;

        if let Some(error) = error {
            self.store
                .commit_failed(tx, action_id, &error)
                .await
                .map_err(db_err)?;
            return Err(ApprovalError::HandlerFailed { reason: error });
        }

        let result = result.unwrap_or(Value::Null);
        self.store
            .commit_executed(tx, workspace_id, action_id, &action.service_type, result)
            .await
            .map_err(db_err)
    }

    /// Reject a pending action.
    pub async fn reject_action(
        &self,
        workspace_id: WorkspaceId,
        action_id: i64
    ) -> Result<ActionRecord, ApprovalError> {
        self.store
            .reject(workspace_id, action_id)
            .await
            .map_err(db_err)?
            .ok_or(ApprovalError::NotFound)
    }

    /// Usage counter for a service in a workspace.
    pub async fn service_usage(
        &self,
        workspace_id: WorkspaceId,
        service_type: &str
    ) -> Result<i64, ApprovalError> {
        Ok(self
            .store
            .service_usage(workspace_id, service_type)
            .await
            .map_err(db_err)?
            .map_or(0, |(count, _)| count))
    }
}
