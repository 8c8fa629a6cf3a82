//! Approval queue rows and the per-service usage counters.
//!
//! The execute path is a single transaction: the pending→approved guard,
//! the terminal status, and the usage bump commit together. The caller
//! holds the transaction open across the adapter call so at most one
//! worker can drive an action to completion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use wd_core::types::{AgentId, WorkspaceId};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActionRecord {
    pub id: i64,
    pub workspace_id: i64,
    pub agent_id: Option<i64>,
    pub action_type: String,
    pub service_type: String,
    pub status: String,
    pub action_data: serde_json::Value,
    pub ai_reasoning: Option<String>,
    pub ai_confidence: Option<f64>,
    pub result_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>
}

pub struct ApprovalStore {
    pool: PgPool
}

impl ApprovalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        workspace_id: WorkspaceId,
        agent_id: Option<AgentId>,
        action_type: &str,
        service_type: &str,
        action_data: serde_json::Value,
        ai_reasoning: &str,
        ai_confidence: f64
    ) -> Result<ActionRecord, sqlx::Error> {
        sqlx::query_as(
            "INSERT INTO agent_actions (
                workspace_id, agent_id, action_type, service_type,
                action_data, ai_reasoning, ai_confidence
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *"
        )
        .bind(workspace_id.as_i64())
        .bind(agent_id.map(AgentId::as_i64))
        .bind(action_type)
        .bind(service_type)
        .bind(action_data)
        .bind(ai_reasoning)
        .bind(ai_confidence)
        .fetch_one(&self.pool)
        .await
    }

    /// Pending actions for a workspace, newest first.
    pub async fn pending(&self, workspace_id: WorkspaceId) -> Result<Vec<ActionRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM agent_actions
             WHERE workspace_id = $1 AND status = 'pending'
             ORDER BY created_at DESC"
        )
        .bind(workspace_id.as_i64())
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get(
        &self,
        workspace_id: WorkspaceId,
        action_id: i64
    ) -> Result<Option<ActionRecord>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM agent_actions WHERE id = $1 AND workspace_id = $2")
            .bind(action_id)
            .bind(workspace_id.as_i64())
            .fetch_optional(&self.pool)
            .await
    }

    /// Open the approval transaction: atomically move the action from
    /// pending to approved and return it with the live transaction.
    /// Returns `None` (and no open transaction) when the action is
    /// missing, foreign, or already processed.
    pub async fn claim_pending(
        &self,
        workspace_id: WorkspaceId,
        action_id: i64
    ) -> Result<Option<(Transaction<'static, Postgres>, ActionRecord)>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let claimed: Option<ActionRecord> = sqlx::query_as(
            "UPDATE agent_actions SET status = 'approved', approved_at = NOW()
             WHERE id = $1 AND workspace_id = $2 AND status = 'pending'
             RETURNING *"
        )
        .bind(action_id)
        .bind(workspace_id.as_i64())
        .fetch_optional(&mut *tx)
        .await?;

        match claimed {
            Some(action) => Ok(Some((tx, action))),
            None => {
                tx.rollback().await?;
                Ok(None)
            }
        }
    }

    /// Finish an approved action as executed, bump the service usage
    /// counter, and commit.
    pub async fn commit_executed(
        &self,
        mut tx: Transaction<'static, Postgres>,
        workspace_id: WorkspaceId,
        action_id: i64,
        service_type: &str,
        result_data: serde_json::Value
    ) -> Result<ActionRecord, sqlx::Error> {
        let action: ActionRecord = sqlx::query_as(
            "UPDATE agent_actions SET
                status = 'executed',
                executed_at = NOW(),
                result_data = $2
             WHERE id = $1
             RETURNING *"
        )
        .bind(action_id)
        .bind(result_data)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO service_usage (workspace_id, service_type, usage_count, last_used)
             VALUES ($1, $2, 1, NOW())
             ON CONFLICT (workspace_id, service_type) DO UPDATE SET
                usage_count = service_usage.usage_count + 1,
                last_used = NOW()"
        )
        .bind(workspace_id.as_i64())
        .bind(service_type)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(action)
    }

    /// Finish an approved action as failed and commit.
    pub async fn commit_failed(
        &self,
        mut tx: Transaction<'static, Postgres>,
        action_id: i64,
        error_message: &str
    ) -> Result<ActionRecord, sqlx::Error> {
        let action: ActionRecord = sqlx::query_as(
            "UPDATE agent_actions SET status = 'failed', error_message = $2
             WHERE id = $1
             RETURNING *"
        )
        .bind(action_id)
        .bind(error_message)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(action)
    }

    /// Reject a pending action. Returns `None` when it is missing or no
    /// longer pending.
    pub async fn reject(
        &self,
        workspace_id: WorkspaceId,
        action_id: i64
    ) -> Result<Option<ActionRecord>, sqlx::Error> {
        sqlx::query_as(
            "UPDATE agent_actions SET status = 'rejected', approved_at = NOW()
             WHERE id = $1 AND workspace_id = $2 AND status = 'pending'
             RETURNING *"
        )
        .bind(action_id)
        .bind(workspace_id.as_i64())
        .fetch_optional(&self.pool)
        .await
    }

    /// Usage counter for a (workspace, service) pair.
    pub async fn service_usage(
        &self,
        workspace_id: WorkspaceId,
        service_type: &str
    ) -> Result<Option<(i64, Option<DateTime<Utc>>)>, sqlx::Error> {
        let row: Option<(i64, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT usage_count, last_used FROM service_usage
             WHERE workspace_id = $1 AND service_type = $2"
        )
        .bind(workspace_id.as_i64())
        .bind(service_type)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}
