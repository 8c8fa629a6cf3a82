//! Agent instance bindings. At most one per agent (primary key on
//! agent_id); a delete returns the agent to legacy mode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use wd_core::types::{AgentId, WorkspaceId};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InstanceRecord {
    pub agent_id: i64,
    pub workspace_id: i64,
    pub blueprint_id: Uuid,
    pub blueprint_version: i64,
    pub overrides: Option<serde_json::Value>,
    pub policy_snapshot: serde_json::Value,
    pub instantiated_at: DateTime<Utc>,
    pub instantiated_by: Option<i64>,
    pub last_policy_refresh: Option<DateTime<Utc>>
}

pub struct InstanceStore {
    pool: PgPool
}

impl InstanceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        agent_id: AgentId,
        workspace_id: WorkspaceId,
        blueprint_id: Uuid,
        blueprint_version: i64,
        overrides: Option<serde_json::Value>,
        policy_snapshot: serde_json::Value,
        instantiated_by: Option<i64>
    ) -> Result<InstanceRecord, sqlx::Error> {
        sqlx::query_as(
            "INSERT INTO agent_instances (
                agent_id, workspace_id, blueprint_id, blueprint_version,
                overrides, policy_snapshot, instantiated_by
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *"
        )
        .bind(agent_id.as_i64())
        .bind(workspace_id.as_i64())
        .bind(blueprint_id)
        .bind(blueprint_version)
        .bind(overrides)
        .bind(policy_snapshot)
        .bind(instantiated_by)
        .fetch_one(&self.pool)
        .await
    }

    /// The binding for an agent, if any. `None` means the agent runs in
    /// legacy mode.
    pub async fn get(&self, agent_id: AgentId) -> Result<Option<InstanceRecord>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM agent_instances WHERE agent_id = $1")
            .bind(agent_id.as_i64())
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_scoped(
        &self,
        workspace_id: WorkspaceId,
        agent_id: AgentId
    ) -> Result<Option<InstanceRecord>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM agent_instances WHERE agent_id = $1 AND workspace_id = $2")
            .bind(agent_id.as_i64())
            .bind(workspace_id.as_i64())
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn refresh(
        &self,
        agent_id: AgentId,
        blueprint_version: i64,
        overrides: Option<serde_json::Value>,
        policy_snapshot: serde_json::Value
    ) -> Result<Option<InstanceRecord>, sqlx::Error> {
        sqlx::query_as(
            "UPDATE agent_instances SET
                blueprint_version = $2,
                overrides = $3,
                policy_snapshot = $4,
                last_policy_refresh = NOW()
             WHERE agent_id = $1
             RETURNING *"
        )
        .bind(agent_id.as_i64())
        .bind(blueprint_version)
        .bind(overrides)
        .bind(policy_snapshot)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn delete(&self, agent_id: AgentId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM agent_instances WHERE agent_id = $1")
            .bind(agent_id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Whether any instance still pins this blueprint version.
    pub async fn version_referenced(
        &self,
        blueprint_id: Uuid,
        version: i64
    ) -> Result<bool, sqlx::Error> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS(
                SELECT 1 FROM agent_instances
                WHERE blueprint_id = $1 AND blueprint_version = $2
            )"
        )
        .bind(blueprint_id)
        .bind(version)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }
}
