//! Append-only governance audit log (blueprint publishes, instance
//! lifecycle). Writes are best-effort at the call sites: a failed audit
//! write never blocks the operation it describes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use wd_core::types::{AgentId, WorkspaceId};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GovernanceAuditRecord {
    pub id: i64,
    pub workspace_id: i64,
    pub event_type: String,
    pub agent_id: Option<i64>,
    pub actor_id: Option<i64>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>
}

pub struct GovernanceAuditStore {
    pool: PgPool
}

impl GovernanceAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn log(
        &self,
        workspace_id: WorkspaceId,
        event_type: &str,
        details: serde_json::Value,
        agent_id: Option<AgentId>,
        actor_id: Option<i64>
    ) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO governance_audit_log (workspace_id, event_type, agent_id, actor_id, details)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id"
        )
        .bind(workspace_id.as_i64())
        .bind(event_type)
        .bind(agent_id.map(AgentId::as_i64))
        .bind(actor_id)
        .bind(details)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    pub async fn list(
        &self,
        workspace_id: WorkspaceId,
        limit: i64
    ) -> Result<Vec<GovernanceAuditRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM governance_audit_log WHERE workspace_id = $1
             ORDER BY created_at DESC LIMIT $2"
        )
        .bind(workspace_id.as_i64())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}
