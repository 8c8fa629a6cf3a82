//! Daily aggregation of the event log into rollup rows.
//!
//! Idempotent: the rollup is recomputed from raw events and upserted, so
//! re-running a day replaces each row with identical values.

use std::collections::HashMap;

use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use wd_core::types::{AgentId, WorkspaceId};

use storage::events::{EventStore, StoredEvent};
use storage::metrics::{DailyMetricsRecord, DailyMetricsStore, WORKSPACE_BUCKET};

pub struct DailyAggregator {
    events: EventStore,
    metrics: DailyMetricsStore
}

impl DailyAggregator {
    pub fn new(pool: PgPool) -> Self {
        Self {
            events: EventStore::new(pool.clone()),
            metrics: DailyMetricsStore::new(pool)
        }
    }

    /// Aggregate every (workspace, agent) pair with events on
    /// `target_date`. Returns the number of rows upserted. Per-pair
    /// failures are logged and skipped; the rest of the day still
    /// aggregates.
    pub async fn aggregate_daily(&self, target_date: NaiveDate) -> Result<usize, sqlx::Error> {
        let day_start = Utc
            .from_utc_datetime(&target_date.and_hms_opt(0, 0, 0).expect("valid midnight"));
        let day_end = day_start + chrono::Duration::days(1);

        let pairs = self.events.distinct_pairs_between(day_start, day_end).await?;

        let mut upserted = 0;
        for (workspace_id, agent_id) in pairs {
            let result = self
                .aggregate_one(
                    WorkspaceId::new(workspace_id),
                    agent_id.map(AgentId::new),
                    target_date,
                    day_start,
                    day_end
                )
                .await;
            match result {
                Ok(true) => upserted += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        "aggregate failed for workspace={workspace_id} agent={agent_id:?}: {e}"
                    );
                }
            }
        }
        Ok(upserted)
    }

    async fn aggregate_one(
        &self,
        workspace_id: WorkspaceId,
        agent_id: Option<AgentId>,
        date: NaiveDate,
        day_start: chrono::DateTime<Utc>,
        day_end: chrono::DateTime<Utc>
    ) -> Result<bool, sqlx::Error> {
        let events = self
            .events
            .events_for_pair_between(workspace_id, agent_id, day_start, day_end)
            .await?;
        if events.is_empty() {
            return Ok(false);
        }

        let run_events: Vec<&StoredEvent> =
            events.iter().filter(|e| e.event_type == "run_finished").collect();
        let llm_events: Vec<&StoredEvent> =
            events.iter().filter(|e| e.event_type == "llm_call").collect();

        let total_runs = run_events.len() as i64;
        let successful_runs = run_events.iter().filter(|e| e.status == "success").count() as i64;
        let failed_runs = run_events.iter().filter(|e| e.status == "error").count() as i64;

        let total_tokens_in: i64 = events.iter().filter_map(|e| e.tokens_in).sum();
        let total_tokens_out: i64 = events.iter().filter_map(|e| e.tokens_out).sum();
        let total_cost_usd: Decimal = events.iter().filter_map(|e| e.cost_usd).sum();

        let total_tool_calls =
            events.iter().filter(|e| e.event_type == "tool_call").count() as i64;
        let tool_errors = events
            .iter()
            .filter(|e| {
                (e.event_type == "tool_call" || e.event_type == "tool_result")
                    && e.status == "error"
            })
            .count() as i64;

        // Latency percentiles come from llm_call events only.
        let mut latencies: Vec<i64> = llm_events.iter().filter_map(|e| e.latency_ms).collect();
        latencies.sort_unstable();
        let latency_p50_ms = percentile(&latencies, 50);
        let latency_p95_ms = percentile(&latencies, 95);
        let latency_avg_ms = if latencies.is_empty() {
            None
        } else {
            Some(latencies.iter().sum::<i64>() / latencies.len() as i64)
        };

        let mut models: HashMap<String, i64> = HashMap::new();
        for event in &llm_events {
            if let Some(model) = &event.model {
                *models.entry(model.clone()).or_insert(0) += 1;
            }
        }

        let last_heartbeat_at = events
            .iter()
            .filter(|e| e.event_type == "heartbeat")
            .map(|e| e.created_at)
            .max();

        let record = DailyMetricsRecord {
            workspace_id: workspace_id.as_i64(),
            agent_id: agent_id.map_or(WORKSPACE_BUCKET, AgentId::as_i64),
            date,
            total_runs,
            successful_runs,
            failed_runs,
            total_events: events.len() as i64,
            total_tokens_in,
            total_tokens_out,
            total_cost_usd: total_cost_usd.round_dp(8),
            total_tool_calls,
            tool_errors,
            latency_p50_ms,
            latency_p95_ms,
            latency_avg_ms,
            models_used: serde_json::json!(models),
            last_heartbeat_at
        };

        self.metrics.upsert(&record).await?;
        Ok(true)
    }
}

/// Nearest-rank percentile over a sorted slice.
fn percentile(sorted: &[i64], pct: usize) -> Option<i64> {
    if sorted.is_empty() {
        return None;
    }
    let mut idx = sorted.len() * pct / 100;
    if idx >= sorted.len() {
        idx = sorted.len() - 1;
    }
    Some(sorted[idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_empty() {
        assert_eq!(percentile(&[], 50), None);
    }

    #[test]
    fn test_percentile_single() {
        assert_eq!(percentile(&[42], 50), Some(42));
        assert_eq!(percentile(&[42], 95), Some(42));
    }

    #[test]
    fn test_percentile_typical() {
        let values: Vec<i64> = (1..=100).collect();
        assert_eq!(percentile(&values, 50), Some(51));
        assert_eq!(percentile(&values, 95), Some(96));
    }

    #[test]
    fn test_percentile_clamps_to_last() {
        assert_eq!(percentile(&[1, 2, 3], 100), Some(3));
    }
}
