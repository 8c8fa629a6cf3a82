//! Daily rollup rows. The aggregator upserts; re-running a day replaces
//! the row with identical values.
//!
//! `agent_id = 0` encodes the workspace-level bucket (events with no
//! agent), so the (workspace, agent, date) primary key stays simple.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use wd_core::types::WorkspaceId;

/// Sentinel agent id for the workspace-level (agent-less) bucket.
pub const WORKSPACE_BUCKET: i64 = 0;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DailyMetricsRecord {
    pub workspace_id: i64,
    pub agent_id: i64,
    pub date: NaiveDate,
    pub total_runs: i64,
    pub successful_runs: i64,
    pub failed_runs: i64,
    pub total_events: i64,
    pub total_tokens_in: i64,
    pub total_tokens_out: i64,
    pub total_cost_usd: Decimal,
    pub total_tool_calls: i64,
    pub tool_errors: i64,
    pub latency_p50_ms: Option<i64>,
    pub latency_p95_ms: Option<i64>,
    pub latency_avg_ms: Option<i64>,
    pub models_used: serde_json::Value,
    pub last_heartbeat_at: Option<DateTime<Utc>>
}

pub struct DailyMetricsStore {
    pool: PgPool
}

impl DailyMetricsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, m: &DailyMetricsRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO obs_daily_metrics (
                workspace_id, agent_id, date,
                total_runs, successful_runs, failed_runs, total_events,
                total_tokens_in, total_tokens_out, total_cost_usd,
                total_tool_calls, tool_errors,
                latency_p50_ms, latency_p95_ms, latency_avg_ms,
                models_used, last_heartbeat_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (workspace_id, agent_id, date) DO UPDATE SET
                total_runs = EXCLUDED.total_runs,
                successful_runs = EXCLUDED.successful_runs,
                failed_runs = EXCLUDED.failed_runs,
                total_events = EXCLUDED.total_events,
                total_tokens_in = EXCLUDED.total_tokens_in,
                total_tokens_out = EXCLUDED.total_tokens_out,
                total_cost_usd = EXCLUDED.total_cost_usd,
                total_tool_calls = EXCLUDED.total_tool_calls,
                tool_errors = EXCLUDED.tool_errors,
                latency_p50_ms = EXCLUDED.latency_p50_ms,
                latency_p95_ms = EXCLUDED.latency_p95_ms,
                latency_avg_ms = EXCLUDED.latency_avg_ms,
                models_used = EXCLUDED.models_used,
                last_heartbeat_at = EXCLUDED.last_heartbeat_at"
        )
        .bind(m.workspace_id)
        .bind(m.agent_id)
        .bind(m.date)
        .bind(m.total_runs)
        .bind(m.successful_runs)
        .bind(m.failed_runs)
        .bind(m.total_events)
        .bind(m.total_tokens_in)
        .bind(m.total_tokens_out)
        .bind(m.total_cost_usd)
        .bind(m.total_tool_calls)
        .bind(m.tool_errors)
        .bind(m.latency_p50_ms)
        .bind(m.latency_p95_ms)
        .bind(m.latency_avg_ms)
        .bind(&m.models_used)
        .bind(m.last_heartbeat_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(
        &self,
        workspace_id: WorkspaceId,
        agent_id: i64,
        date: NaiveDate
    ) -> Result<Option<DailyMetricsRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM obs_daily_metrics
             WHERE workspace_id = $1 AND agent_id = $2 AND date = $3"
        )
        .bind(workspace_id.as_i64())
        .bind(agent_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn count_for_day(&self, date: NaiveDate) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM obs_daily_metrics WHERE date = $1")
            .bind(date)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}
