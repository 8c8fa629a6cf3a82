//! Collaboration hierarchy rows: per-agent roles and workspace team
//! rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use wd_core::types::{AgentId, WorkspaceId};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RoleRecord {
    pub id: i64,
    pub workspace_id: i64,
    pub agent_id: i64,
    pub role: String,
    pub can_assign_to_peers: bool,
    pub can_escalate_to_supervisor: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TeamRulesRecord {
    pub workspace_id: i64,
    pub allow_peer_assignment: bool,
    pub require_supervisor_for_tasks: bool,
    pub default_supervisor_agent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>
}

pub struct RoleStore {
    pool: PgPool
}

impl RoleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_role(
        &self,
        workspace_id: WorkspaceId,
        agent_id: AgentId,
        role: &str,
        can_assign_to_peers: bool,
        can_escalate_to_supervisor: bool
    ) -> Result<RoleRecord, sqlx::Error> {
        sqlx::query_as(
            "INSERT INTO agent_roles (
                workspace_id, agent_id, role,
                can_assign_to_peers, can_escalate_to_supervisor
            ) VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (workspace_id, agent_id) DO UPDATE SET
                role = EXCLUDED.role,
                can_assign_to_peers = EXCLUDED.can_assign_to_peers,
                can_escalate_to_supervisor = EXCLUDED.can_escalate_to_supervisor,
                updated_at = NOW()
            RETURNING *"
        )
        .bind(workspace_id.as_i64())
        .bind(agent_id.as_i64())
        .bind(role)
        .bind(can_assign_to_peers)
        .bind(can_escalate_to_supervisor)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get_role(
        &self,
        workspace_id: WorkspaceId,
        agent_id: AgentId
    ) -> Result<Option<RoleRecord>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM agent_roles WHERE workspace_id = $1 AND agent_id = $2")
            .bind(workspace_id.as_i64())
            .bind(agent_id.as_i64())
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn team_rules(
        &self,
        workspace_id: WorkspaceId
    ) -> Result<Option<TeamRulesRecord>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM team_rules WHERE workspace_id = $1")
            .bind(workspace_id.as_i64())
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn upsert_team_rules(
        &self,
        workspace_id: WorkspaceId,
        allow_peer_assignment: bool,
        require_supervisor_for_tasks: bool,
        default_supervisor_agent_id: Option<AgentId>
    ) -> Result<TeamRulesRecord, sqlx::Error> {
        sqlx::query_as(
            "INSERT INTO team_rules (
                workspace_id, allow_peer_assignment,
                require_supervisor_for_tasks, default_supervisor_agent_id
            ) VALUES ($1, $2, $3, $4)
            ON CONFLICT (workspace_id) DO UPDATE SET
                allow_peer_assignment = EXCLUDED.allow_peer_assignment,
                require_supervisor_for_tasks = EXCLUDED.require_supervisor_for_tasks,
                default_supervisor_agent_id = EXCLUDED.default_supervisor_agent_id,
                updated_at = NOW()
            RETURNING *"
        )
        .bind(workspace_id.as_i64())
        .bind(allow_peer_assignment)
        .bind(require_supervisor_for_tasks)
        .bind(default_supervisor_agent_id.map(AgentId::as_i64))
        .fetch_one(&self.pool)
        .await
    }
}
