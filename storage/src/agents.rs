//! Agent and workspace-user rows.
//!
//! These tables belong to the auth layer in production; the store exposes
//! just the operations the governance core needs: ownership checks, the
//! pause switch, and llm_config mutation for model downgrades.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use wd_core::types::{AgentId, WorkspaceId};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AgentRecord {
    pub id: i64,
    pub workspace_id: i64,
    pub name: String,
    pub is_active: bool,
    pub llm_config: serde_json::Value,
    pub identity_config: serde_json::Value,
    pub created_at: DateTime<Utc>
}

pub struct AgentStore {
    pool: PgPool
}

impl AgentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a workspace owner row. Returns the new workspace id.
    pub async fn create_workspace(&self, email: &str) -> Result<WorkspaceId, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO users (email) VALUES ($1)
             ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
             RETURNING id"
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(WorkspaceId::new(row.0))
    }

    pub async fn create_agent(
        &self,
        workspace_id: WorkspaceId,
        name: &str,
        llm_config: serde_json::Value,
        identity_config: serde_json::Value
    ) -> Result<AgentRecord, sqlx::Error> {
        sqlx::query_as(
            "INSERT INTO agents (workspace_id, name, llm_config, identity_config)
             VALUES ($1, $2, $3, $4)
             RETURNING *"
        )
        .bind(workspace_id.as_i64())
        .bind(name)
        .bind(llm_config)
        .bind(identity_config)
        .fetch_one(&self.pool)
        .await
    }

    /// Fetch an agent scoped to a workspace. A foreign agent reads as
    /// absent.
    pub async fn get(
        &self,
        workspace_id: WorkspaceId,
        agent_id: AgentId
    ) -> Result<Option<AgentRecord>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM agents WHERE id = $1 AND workspace_id = $2")
            .bind(agent_id.as_i64())
            .bind(workspace_id.as_i64())
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_for_workspace(
        &self,
        workspace_id: WorkspaceId
    ) -> Result<Vec<AgentRecord>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM agents WHERE workspace_id = $1 ORDER BY id")
            .bind(workspace_id.as_i64())
            .fetch_all(&self.pool)
            .await
    }

    pub async fn set_active(
        &self,
        workspace_id: WorkspaceId,
        agent_id: AgentId,
        is_active: bool
    ) -> Result<Option<AgentRecord>, sqlx::Error> {
        sqlx::query_as(
            "UPDATE agents SET is_active = $3
             WHERE id = $1 AND workspace_id = $2
             RETURNING *"
        )
        .bind(agent_id.as_i64())
        .bind(workspace_id.as_i64())
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await
    }

    /// Replace the agent's llm_config document wholesale. Callers that
    /// change a single key read-modify-write.
    pub async fn update_llm_config(
        &self,
        workspace_id: WorkspaceId,
        agent_id: AgentId,
        llm_config: serde_json::Value
    ) -> Result<Option<AgentRecord>, sqlx::Error> {
        sqlx::query_as(
            "UPDATE agents SET llm_config = $3
             WHERE id = $1 AND workspace_id = $2
             RETURNING *"
        )
        .bind(agent_id.as_i64())
        .bind(workspace_id.as_i64())
        .bind(llm_config)
        .fetch_optional(&self.pool)
        .await
    }
}
