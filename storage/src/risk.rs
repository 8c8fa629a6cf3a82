//! Risk engine persistence: policies, breach events, and the append-only
//! intervention audit trail.
//!
//! The status transition on a risk event commits in the same transaction
//! as its audit row, so the trail can never disagree with the event.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use wd_core::types::{AgentId, RiskEventStatus, WorkspaceId};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PolicyRecord {
    pub id: Uuid,
    pub workspace_id: i64,
    pub agent_id: Option<i64>,
    pub policy_type: String,
    pub threshold_value: Decimal,
    pub action_type: String,
    pub cooldown_minutes: i64,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RiskEventRecord {
    pub id: Uuid,
    pub policy_id: Uuid,
    pub workspace_id: i64,
    pub agent_id: Option<i64>,
    pub policy_type: String,
    pub breach_value: Decimal,
    pub threshold_value: Decimal,
    pub action_type: String,
    pub status: String,
    pub dedupe_key: String,
    pub evaluated_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub execution_result: Option<serde_json::Value>
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RiskAuditRecord {
    pub id: i64,
    pub event_id: Uuid,
    pub workspace_id: i64,
    pub agent_id: Option<i64>,
    pub action_type: String,
    pub previous_state: serde_json::Value,
    pub new_state: serde_json::Value,
    pub result: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>
}

/// Audit entry written alongside an event status transition.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action_type: String,
    pub previous_state: serde_json::Value,
    pub new_state: serde_json::Value,
    pub result: String,
    pub error_message: Option<String>
}

pub struct RiskStore {
    pool: PgPool
}

impl RiskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // -- policies ---------------------------------------------------------

    /// Insert-or-update on the (workspace, agent, policy_type) scope.
    pub async fn upsert_policy(
        &self,
        workspace_id: WorkspaceId,
        agent_id: Option<AgentId>,
        policy_type: &str,
        threshold_value: Decimal,
        action_type: &str,
        cooldown_minutes: i64,
        is_enabled: bool
    ) -> Result<PolicyRecord, sqlx::Error> {
        // The partial unique index uses COALESCE(agent_id, -1), which
        // ON CONFLICT cannot target directly; do a guarded update first.
        let updated: Option<PolicyRecord> = sqlx::query_as(
            "UPDATE risk_policies SET
                threshold_value = $4,
                action_type = $5,
                cooldown_minutes = $6,
                is_enabled = $7,
                updated_at = NOW()
             WHERE workspace_id = $1
               AND agent_id IS NOT DISTINCT FROM $2
               AND policy_type = $3
             RETURNING *"
        )
        .bind(workspace_id.as_i64())
        .bind(agent_id.map(AgentId::as_i64))
        .bind(policy_type)
        .bind(threshold_value)
        .bind(action_type)
        .bind(cooldown_minutes)
        .bind(is_enabled)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(record) = updated {
            return Ok(record);
        }

        sqlx::query_as(
            "INSERT INTO risk_policies (
                id, workspace_id, agent_id, policy_type,
                threshold_value, action_type, cooldown_minutes, is_enabled
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *"
        )
        .bind(Uuid::new_v4())
        .bind(workspace_id.as_i64())
        .bind(agent_id.map(AgentId::as_i64))
        .bind(policy_type)
        .bind(threshold_value)
        .bind(action_type)
        .bind(cooldown_minutes)
        .bind(is_enabled)
        .fetch_one(&self.pool)
        .await
    }

    /// All enabled policies, optionally filtered to one workspace.
    pub async fn enabled_policies(
        &self,
        workspace_id: Option<WorkspaceId>
    ) -> Result<Vec<PolicyRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM risk_policies
             WHERE is_enabled AND ($1::BIGINT IS NULL OR workspace_id = $1)
             ORDER BY created_at"
        )
        .bind(workspace_id.map(WorkspaceId::as_i64))
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_policy(
        &self,
        policy_id: Uuid,
        workspace_id: Option<WorkspaceId>
    ) -> Result<Option<PolicyRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM risk_policies
             WHERE id = $1 AND ($2::BIGINT IS NULL OR workspace_id = $2)"
        )
        .bind(policy_id)
        .bind(workspace_id.map(WorkspaceId::as_i64))
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn policies_for_agent(
        &self,
        workspace_id: WorkspaceId,
        agent_id: AgentId
    ) -> Result<Vec<PolicyRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM risk_policies
             WHERE workspace_id = $1 AND agent_id = $2
             ORDER BY policy_type"
        )
        .bind(workspace_id.as_i64())
        .bind(agent_id.as_i64())
        .fetch_all(&self.pool)
        .await
    }

    pub async fn set_policy_enabled(
        &self,
        workspace_id: WorkspaceId,
        policy_id: Uuid,
        is_enabled: bool
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE risk_policies SET is_enabled = $3, updated_at = NOW()
             WHERE id = $1 AND workspace_id = $2"
        )
        .bind(policy_id)
        .bind(workspace_id.as_i64())
        .bind(is_enabled)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // -- events -----------------------------------------------------------

    pub async fn insert_event(
        &self,
        policy: &PolicyRecord,
        breach_value: Decimal,
        threshold_value: Decimal,
        dedupe_key: &str,
        evaluated_at: DateTime<Utc>
    ) -> Result<RiskEventRecord, sqlx::Error> {
        sqlx::query_as(
            "INSERT INTO risk_events (
                id, policy_id, workspace_id, agent_id, policy_type,
                breach_value, threshold_value, action_type, status,
                dedupe_key, evaluated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9, $10)
            RETURNING *"
        )
        .bind(Uuid::new_v4())
        .bind(policy.id)
        .bind(policy.workspace_id)
        .bind(policy.agent_id)
        .bind(&policy.policy_type)
        .bind(breach_value)
        .bind(threshold_value)
        .bind(&policy.action_type)
        .bind(dedupe_key)
        .bind(evaluated_at)
        .fetch_one(&self.pool)
        .await
    }

    /// Most recent event for a policy in pending or executed status.
    /// This is the cooldown reference point.
    pub async fn latest_active_event(
        &self,
        policy_id: Uuid
    ) -> Result<Option<RiskEventRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM risk_events
             WHERE policy_id = $1 AND status IN ('pending', 'executed')
             ORDER BY evaluated_at DESC
             LIMIT 1"
        )
        .bind(policy_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn dedupe_exists(&self, dedupe_key: &str) -> Result<bool, sqlx::Error> {
        let row: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM risk_events WHERE dedupe_key = $1)")
                .bind(dedupe_key)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    /// Pending events, oldest first, capped.
    pub async fn pending_events(&self, limit: i64) -> Result<Vec<RiskEventRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM risk_events WHERE status = 'pending'
             ORDER BY evaluated_at ASC
             LIMIT $1"
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_event(&self, event_id: Uuid) -> Result<Option<RiskEventRecord>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM risk_events WHERE id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn events_for_workspace(
        &self,
        workspace_id: WorkspaceId,
        limit: i64
    ) -> Result<Vec<RiskEventRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM risk_events WHERE workspace_id = $1
             ORDER BY evaluated_at DESC LIMIT $2"
        )
        .bind(workspace_id.as_i64())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Move a pending event to a terminal status and write the audit row
    /// in one transaction. Returns false when the guard finds the event
    /// no longer pending (another worker got there first); nothing is
    /// written in that case.
    pub async fn finalize_event(
        &self,
        event_id: Uuid,
        status: RiskEventStatus,
        execution_result: serde_json::Value,
        audit: &AuditEntry
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let updated: Option<RiskEventRecord> = sqlx::query_as(
            "UPDATE risk_events SET
                status = $2,
                executed_at = NOW(),
                execution_result = $3
             WHERE id = $1 AND status = 'pending'
             RETURNING *"
        )
        .bind(event_id)
        .bind(status.to_string())
        .bind(&execution_result)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(event) = updated else {
            tx.rollback().await?;
            return Ok(false);
        };

        sqlx::query(
            "INSERT INTO risk_audit_log (
                event_id, workspace_id, agent_id, action_type,
                previous_state, new_state, result, error_message
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        )
        .bind(event.id)
        .bind(event.workspace_id)
        .bind(event.agent_id)
        .bind(&audit.action_type)
        .bind(&audit.previous_state)
        .bind(&audit.new_state)
        .bind(&audit.result)
        .bind(&audit.error_message)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    // -- audit ------------------------------------------------------------

    pub async fn audit_trail(
        &self,
        workspace_id: WorkspaceId,
        agent_id: Option<AgentId>,
        limit: i64
    ) -> Result<Vec<RiskAuditRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM risk_audit_log
             WHERE workspace_id = $1 AND ($2::BIGINT IS NULL OR agent_id = $2)
             ORDER BY created_at DESC
             LIMIT $3"
        )
        .bind(workspace_id.as_i64())
        .bind(agent_id.map(AgentId::as_i64))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}
