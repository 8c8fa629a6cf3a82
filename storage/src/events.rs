//! Append-only observability event log.
//!
//! Events are immutable once written; the only delete path is the
//! retention GC. `dedupe_key` carries a partial unique index, so a
//! duplicate insert surfaces as a database error that callers treat as
//! "already recorded".

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use wd_core::types::{AgentId, EventRecord, WorkspaceId};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StoredEvent {
    pub id: i64,
    pub uid: Uuid,
    pub workspace_id: i64,
    pub agent_id: Option<i64>,
    pub run_id: Option<Uuid>,
    pub event_type: String,
    pub status: String,
    pub model: Option<String>,
    pub tokens_in: Option<i64>,
    pub tokens_out: Option<i64>,
    pub cost_usd: Option<Decimal>,
    pub latency_ms: Option<i64>,
    pub payload: serde_json::Value,
    pub dedupe_key: Option<String>,
    pub created_at: DateTime<Utc>
}

pub struct EventStore {
    pool: PgPool
}

impl EventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, event: &EventRecord) -> Result<StoredEvent, sqlx::Error> {
        self.insert_with_uid(event, Uuid::new_v4()).await
    }

    pub async fn insert_with_uid(
        &self,
        event: &EventRecord,
        uid: Uuid
    ) -> Result<StoredEvent, sqlx::Error> {
        sqlx::query_as(
            "INSERT INTO obs_events (
                uid, workspace_id, agent_id, run_id, event_type, status,
                model, tokens_in, tokens_out, cost_usd, latency_ms, payload, dedupe_key
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *"
        )
        .bind(uid)
        .bind(event.workspace_id.as_i64())
        .bind(event.agent_id.map(AgentId::as_i64))
        .bind(event.run_id)
        .bind(event.event_type.to_string())
        .bind(event.status.to_string())
        .bind(&event.model)
        .bind(event.tokens_in)
        .bind(event.tokens_out)
        .bind(event.cost_usd)
        .bind(event.latency_ms)
        .bind(&event.payload)
        .bind(&event.dedupe_key)
        .fetch_one(&self.pool)
        .await
    }

    /// Insert a whole batch in one transaction. Any failure (including a
    /// dedupe collision) aborts the batch; the caller falls back to
    /// row-by-row inserts to isolate the conflicting item.
    pub async fn insert_many(&self, events: &[EventRecord]) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;
        for event in events {
            sqlx::query(
                "INSERT INTO obs_events (
                    uid, workspace_id, agent_id, run_id, event_type, status,
                    model, tokens_in, tokens_out, cost_usd, latency_ms, payload, dedupe_key
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
            )
            .bind(Uuid::new_v4())
            .bind(event.workspace_id.as_i64())
            .bind(event.agent_id.map(AgentId::as_i64))
            .bind(event.run_id)
            .bind(event.event_type.to_string())
            .bind(event.status.to_string())
            .bind(&event.model)
            .bind(event.tokens_in)
            .bind(event.tokens_out)
            .bind(event.cost_usd)
            .bind(event.latency_ms)
            .bind(&event.payload)
            .bind(&event.dedupe_key)
            .execute(&mut *tx)
            .await?;
            written += 1;
        }
        tx.commit().await?;
        Ok(written)
    }

    pub async fn dedupe_exists(&self, dedupe_key: &str) -> Result<bool, sqlx::Error> {
        let row: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM obs_events WHERE dedupe_key = $1)")
                .bind(dedupe_key)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    /// Total cost since `since`, optionally scoped to one agent.
    /// `agent_id = None` aggregates across all agents in the workspace.
    pub async fn sum_cost_since(
        &self,
        workspace_id: WorkspaceId,
        agent_id: Option<AgentId>,
        since: DateTime<Utc>
    ) -> Result<Decimal, sqlx::Error> {
        let row: (Option<Decimal>,) = match agent_id {
            Some(agent) => {
                sqlx::query_as(
                    "SELECT SUM(cost_usd) FROM obs_events
                     WHERE workspace_id = $1 AND agent_id = $2 AND created_at >= $3"
                )
                .bind(workspace_id.as_i64())
                .bind(agent.as_i64())
                .bind(since)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT SUM(cost_usd) FROM obs_events
                     WHERE workspace_id = $1 AND created_at >= $2"
                )
                .bind(workspace_id.as_i64())
                .bind(since)
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(row.0.unwrap_or(Decimal::ZERO))
    }

    /// How many distinct agents have ever emitted an event in this
    /// workspace. This is the "monitored agent" count tier limits apply to.
    pub async fn distinct_agent_count(
        &self,
        workspace_id: WorkspaceId
    ) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(DISTINCT agent_id) FROM obs_events
             WHERE workspace_id = $1 AND agent_id IS NOT NULL"
        )
        .bind(workspace_id.as_i64())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Whether an agent has any prior event (grandfathering check).
    pub async fn agent_has_events(
        &self,
        workspace_id: WorkspaceId,
        agent_id: AgentId
    ) -> Result<bool, sqlx::Error> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM obs_events WHERE workspace_id = $1 AND agent_id = $2)"
        )
        .bind(workspace_id.as_i64())
        .bind(agent_id.as_i64())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Distinct (workspace, agent) pairs with events inside a window.
    pub async fn distinct_pairs_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>
    ) -> Result<Vec<(i64, Option<i64>)>, sqlx::Error> {
        sqlx::query_as(
            "SELECT DISTINCT workspace_id, agent_id FROM obs_events
             WHERE created_at >= $1 AND created_at < $2"
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
    }

    /// All events for one (workspace, agent) pair inside a window.
    /// `agent_id = None` selects rows with a NULL agent.
    pub async fn events_for_pair_between(
        &self,
        workspace_id: WorkspaceId,
        agent_id: Option<AgentId>,
        start: DateTime<Utc>,
        end: DateTime<Utc>
    ) -> Result<Vec<StoredEvent>, sqlx::Error> {
        match agent_id {
            Some(agent) => {
                sqlx::query_as(
                    "SELECT * FROM obs_events
                     WHERE workspace_id = $1 AND agent_id = $2
                       AND created_at >= $3 AND created_at < $4
                     ORDER BY created_at"
                )
                .bind(workspace_id.as_i64())
                .bind(agent.as_i64())
                .bind(start)
                .bind(end)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(
                    "SELECT * FROM obs_events
                     WHERE workspace_id = $1 AND agent_id IS NULL
                       AND created_at >= $2 AND created_at < $3
                     ORDER BY created_at"
                )
                .bind(workspace_id.as_i64())
                .bind(start)
                .bind(end)
                .fetch_all(&self.pool)
                .await
            }
        }
    }

    /// `run_finished` event statuses inside a trailing window, for error
    /// rate alerting.
    pub async fn finished_run_statuses_since(
        &self,
        workspace_id: WorkspaceId,
        agent_id: Option<AgentId>,
        since: DateTime<Utc>
    ) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = match agent_id {
            Some(agent) => {
                sqlx::query_as(
                    "SELECT status FROM obs_events
                     WHERE workspace_id = $1 AND agent_id = $2
                       AND event_type = 'run_finished' AND created_at >= $3"
                )
                .bind(workspace_id.as_i64())
                .bind(agent.as_i64())
                .bind(since)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT status FROM obs_events
                     WHERE workspace_id = $1
                       AND event_type = 'run_finished' AND created_at >= $2"
                )
                .bind(workspace_id.as_i64())
                .bind(since)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }

    pub async fn last_heartbeat(
        &self,
        workspace_id: WorkspaceId,
        agent_id: Option<AgentId>
    ) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        let row: Option<(DateTime<Utc>,)> = match agent_id {
            Some(agent) => {
                sqlx::query_as(
                    "SELECT created_at FROM obs_events
                     WHERE workspace_id = $1 AND agent_id = $2 AND event_type = 'heartbeat'
                     ORDER BY created_at DESC LIMIT 1"
                )
                .bind(workspace_id.as_i64())
                .bind(agent.as_i64())
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT created_at FROM obs_events
                     WHERE workspace_id = $1 AND event_type = 'heartbeat'
                     ORDER BY created_at DESC LIMIT 1"
                )
                .bind(workspace_id.as_i64())
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(row.map(|(t,)| t))
    }

    /// Workspaces that have at least one event (retention GC worklist).
    pub async fn workspaces_with_events(&self) -> Result<Vec<i64>, sqlx::Error> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT DISTINCT workspace_id FROM obs_events")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Delete one batch of events older than `cutoff`. Returns the number
    /// of rows removed; callers loop until this returns zero.
    pub async fn delete_batch_before(
        &self,
        workspace_id: WorkspaceId,
        cutoff: DateTime<Utc>,
        batch_size: i64
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM obs_events WHERE id IN (
                SELECT id FROM obs_events
                WHERE workspace_id = $1 AND created_at < $2
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
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM obs_events WHERE workspace_id = $1")
                .bind(workspace_id.as_i64())
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    /// Most recent events for a workspace, newest first.
    pub async fn recent_for_workspace(
        &self,
        workspace_id: WorkspaceId,
        limit: i64
    ) -> Result<Vec<StoredEvent>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM obs_events WHERE workspace_id = $1
             ORDER BY created_at DESC LIMIT $2"
        )
        .bind(workspace_id.as_i64())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Events for a run in submission order.
    pub async fn events_for_run(
        &self,
        workspace_id: WorkspaceId,
        run_id: Uuid
    ) -> Result<Vec<StoredEvent>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM obs_events WHERE workspace_id = $1 AND run_id = $2
             ORDER BY id"
        )
        .bind(workspace_id.as_i64())
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
    }
}
