//! Run index. A run is the root of an event tree; totals are applied
//! additively when the run closes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use wd_core::types::{AgentId, RunStatus, RunTotals, WorkspaceId};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub workspace_id: i64,
    pub agent_id: Option<i64>,
    pub model: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub total_tokens_in: i64,
    pub total_tokens_out: i64,
    pub total_cost_usd: Decimal,
    pub total_latency_ms: i64,
    pub tool_calls_count: i64,
    pub metadata: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>
}

pub struct RunStore {
    pool: PgPool
}

impl RunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        run_id: Uuid,
        workspace_id: WorkspaceId,
        agent_id: Option<AgentId>,
        model: Option<&str>,
        metadata: serde_json::Value
    ) -> Result<RunRecord, sqlx::Error> {
        sqlx::query_as(
            "INSERT INTO obs_runs (run_id, workspace_id, agent_id, model, metadata)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *"
        )
        .bind(run_id)
        .bind(workspace_id.as_i64())
        .bind(agent_id.map(AgentId::as_i64))
        .bind(model)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get(&self, run_id: Uuid) -> Result<Option<RunRecord>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM obs_runs WHERE run_id = $1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Close a run. Totals add onto whatever was already recorded, so a
    /// second finish only ever grows the counters.
    pub async fn finish(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error_message: Option<&str>,
        totals: &RunTotals
    ) -> Result<Option<RunRecord>, sqlx::Error> {
        sqlx::query_as(
            "UPDATE obs_runs SET
                status = $2,
                error_message = $3,
                total_tokens_in = total_tokens_in + $4,
                total_tokens_out = total_tokens_out + $5,
                total_cost_usd = total_cost_usd + $6,
                total_latency_ms = total_latency_ms + $7,
                tool_calls_count = tool_calls_count + $8,
                finished_at = NOW()
             WHERE run_id = $1
             RETURNING *"
        )
        .bind(run_id)
        .bind(status.to_string())
        .bind(error_message)
        .bind(totals.tokens_in)
        .bind(totals.tokens_out)
        .bind(totals.cost_usd)
        .bind(totals.latency_ms)
        .bind(totals.tool_calls)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete one batch of runs started before `cutoff`.
    pub async fn delete_batch_before(
        &self,
        workspace_id: WorkspaceId,
        cutoff: DateTime<Utc>,
        batch_size: i64
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM obs_runs WHERE run_id IN (
                SELECT run_id FROM obs_runs
                WHERE workspace_id = $1 AND started_at < $2
                LIMIT $3
            )"
        )
        .bind(workspace_id.as_i64())
        .bind(cutoff)
        .bind(batch_size)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_for_workspace(
        &self,
        workspace_id: WorkspaceId
    ) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM obs_runs WHERE workspace_id = $1")
            .bind(workspace_id.as_i64())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}
