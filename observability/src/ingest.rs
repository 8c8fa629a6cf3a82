//! Event ingestion and run tracking.
//!
//! `emit_event` is the one write path every subsystem shares, and it is
//! best-effort by contract: a database failure is logged and swallowed so
//! the calling tool or session never fails on observability.
//!
//! Cost attribution: when an event carries tokens and a model but no
//! cost, the pricing table supplies per-mtok rates (most recent row whose
//! effective window covers today). Rates are cached for five minutes.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;
use wd_core::traits::ObservabilityHooks;
use wd_core::types::{
    AgentId, EventRecord, EventStatus, EventType, RunStatus, RunTotals, WorkspaceId
};

use storage::events::{EventStore, StoredEvent};
use storage::pricing::PricingStore;
use storage::runs::{RunRecord, RunStore};

const PRICING_CACHE_TTL: Duration = Duration::from_secs(300);
const MTOK: i64 = 1_000_000;

type PricingMap = HashMap<(String, String), (Decimal, Decimal)>;

#[derive(Debug, Clone, Serialize)]
pub struct RejectedEvent {
    pub index: usize,
    pub reason: String
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub accepted: usize,
    pub rejected: Vec<RejectedEvent>
}

pub struct ObservabilityService {
    events: EventStore,
    runs: RunStore,
    pricing: PricingStore,
    pricing_cache: RwLock<Option<(PricingMap, Instant)>>
}

impl ObservabilityService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            events: EventStore::new(pool.clone()),
            runs: RunStore::new(pool.clone()),
            pricing: PricingStore::new(pool),
            pricing_cache: RwLock::new(None)
        }
    }

    // -- cost -------------------------------------------------------------

    async fn load_pricing(&self) -> PricingMap {
        {
            let cache = self.pricing_cache.read();
            if let Some((map, loaded_at)) = cache.as_ref() {
                if loaded_at.elapsed() < PRICING_CACHE_TTL {
                    return map.clone();
                }
            }
        }

        let today = Utc::now().date_naive();
        let map: PricingMap = match self.pricing.active_on(today).await {
            Ok(rows) => rows
                .into_iter()
                .map(|r| {
                    (
                        (r.provider, r.model),
                        (r.input_cost_per_mtok, r.output_cost_per_mtok)
                    )
                })
                .collect(),
            Err(e) => {
                tracing::warn!("pricing load failed: {e}");
                return HashMap::new();
            }
        };

        *self.pricing_cache.write() = Some((map.clone(), Instant::now()));
        map
    }

    /// Estimated cost in USD. Zero when no pricing row matches. Exact
    /// `(provider, model)` match first, then prefix match on the model.
    pub async fn calculate_cost(
        &self,
        provider: &str,
        model: &str,
        tokens_in: i64,
        tokens_out: i64
    ) -> Decimal {
        let pricing = self.load_pricing().await;

        let rates = pricing
            .get(&(provider.to_string(), model.to_string()))
            .or_else(|| {
                pricing
                    .iter()
                    .find(|((p, m), _)| p == provider && !model.is_empty() && model.starts_with(m.as_str()))
                    .map(|(_, rates)| rates)
            });

        let Some((input_rate, output_rate)) = rates else {
            return Decimal::ZERO;
        };

        let cost = (Decimal::from(tokens_in) * *input_rate
            + Decimal::from(tokens_out) * *output_rate)
            / Decimal::from(MTOK);
        cost.round_dp(8)
    }

    // -- emission ---------------------------------------------------------

    /// Write a single event. Never fails: errors are logged and the event
    /// is dropped. A duplicate dedupe_key is treated as already recorded.
    pub async fn emit(&self, mut event: EventRecord) -> Option<StoredEvent> {
        if event.cost_usd.is_none() {
            if let (Some(tokens_in), Some(model)) = (event.tokens_in, event.model.clone()) {
                if tokens_in > 0 {
                    let provider = event
                        .payload
                        .get("provider")
                        .and_then(|p| p.as_str())
                        .unwrap_or("");
                    let cost = self
                        .calculate_cost(provider, &model, tokens_in, event.tokens_out.unwrap_or(0))
                        .await;
                    if cost > Decimal::ZERO {
                        event.cost_usd = Some(cost);
                    }
                }
            }
        }

        if let Some(key) = &event.dedupe_key {
            match self.events.dedupe_exists(key).await {
                Ok(true) => return None,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("dedupe check failed for {key}: {e}");
                    return None;
                }
            }
        }

        match self.events.insert(&event).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                tracing::warn!("failed to emit {}: {e}", event.event_type);
                None
            }
        }
    }

    /// Ingest a batch of raw event documents for one workspace.
    ///
    /// Items with an unknown event_type are rejected individually; an
    /// invalid status falls back to `info`. The accepted rows insert in
    /// one transaction; if that fails (a dedupe collision, typically) the
    /// batch is retried row by row so one duplicate doesn't reject the
    /// rest.
    pub async fn emit_batch(
        &self,
        workspace_id: WorkspaceId,
        items: &[serde_json::Value]
    ) -> BatchOutcome {
        let mut records = Vec::new();
        let mut rejected = Vec::new();
        let mut indices = Vec::new();

        for (index, item) in items.iter().enumerate() {
            match parse_batch_item(workspace_id, item) {
                Ok(mut record) => {
                    if record.cost_usd.is_none() {
                        if let (Some(tokens_in), Some(model)) =
                            (record.tokens_in, record.model.clone())
                        {
                            let provider = record
                                .payload
                                .get("provider")
                                .and_then(|p| p.as_str())
                                .unwrap_or("");
                            if tokens_in > 0 && !provider.is_empty() {
                                let cost = self
                                    .calculate_cost(
                                        provider,
                                        &model,
                                        tokens_in,
                                        record.tokens_out.unwrap_or(0)
                                    )
                                    .await;
                                if cost > Decimal::ZERO {
                                    record.cost_usd = Some(cost);
                                }
                            }
                        }
                    }
                    records.push(record);
                    indices.push(index);
                }
                Err(reason) => rejected.push(RejectedEvent { index, reason })
            }
        }

        if records.is_empty() {
            return BatchOutcome { accepted: 0, rejected };
        }

        match self.events.insert_many(&records).await {
            Ok(written) => BatchOutcome {
                accepted: written as usize,
                rejected
            },
            Err(e) => {
                tracing::warn!("bulk insert failed, retrying row-by-row: {e}");
                let mut accepted = 0;
                for (record, index) in records.into_iter().zip(indices) {
                    if self.emit(record).await.is_some() {
                        accepted += 1;
                    } else {
                        rejected.push(RejectedEvent {
                            index,
                            reason: "write failed (possible dedupe conflict)".to_string()
                        });
                    }
                }
                BatchOutcome { accepted, rejected }
            }
        }
    }

    // -- run tracking -----------------------------------------------------

    /// Open a run and emit `run_started`. Returns the run id even when
    /// the insert fails, so callers stay decoupled from storage health.
    pub async fn start_run(
        &self,
        workspace_id: WorkspaceId,
        agent_id: Option<AgentId>,
        model: Option<&str>,
        metadata: serde_json::Value
    ) -> Uuid {
        let run_id = Uuid::new_v4();

        if let Err(e) = self
            .runs
            .insert(run_id, workspace_id, agent_id, model, metadata.clone())
            .await
        {
            tracing::warn!("start_run failed: {e}");
            return run_id;
        }

        let mut event = EventRecord::new(workspace_id, EventType::RunStarted, EventStatus::Info);
        event.agent_id = agent_id;
        event.run_id = Some(run_id);
        event.model = model.map(str::to_string);
        event.payload = serde_json::json!({ "metadata": metadata });
        self.emit(event).await;

        run_id
    }

    /// Close a run, apply totals additively, and emit `run_finished`.
    pub async fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error_message: Option<&str>,
        totals: &RunTotals
    ) -> Option<RunRecord> {
        let run = match self.runs.finish(run_id, status, error_message, totals).await {
            Ok(Some(run)) => run,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("finish_run failed: {e}");
                return None;
            }
        };

        let event_status = match status {
            RunStatus::Error => EventStatus::Error,
            _ => EventStatus::Success
        };
        let mut event = EventRecord::new(
            WorkspaceId::new(run.workspace_id),
            EventType::RunFinished,
            event_status
        );
        event.agent_id = run.agent_id.map(AgentId::new);
        event.run_id = Some(run_id);
        event.model = run.model.clone();
        event.tokens_in = Some(run.total_tokens_in);
        event.tokens_out = Some(run.total_tokens_out);
        event.cost_usd = Some(run.total_cost_usd);
        event.latency_ms = Some(run.total_latency_ms);
        event.payload = match error_message {
            Some(err) => serde_json::json!({ "error": err }),
            None => serde_json::json!({})
        };
        self.emit(event).await;

        Some(run)
    }

    pub async fn get_run(&self, run_id: Uuid) -> Result<Option<RunRecord>, sqlx::Error> {
        self.runs.get(run_id).await
    }
}

fn parse_batch_item(
    workspace_id: WorkspaceId,
    item: &serde_json::Value
) -> Result<EventRecord, String> {
    let event_type_str = item.get("event_type").and_then(|v| v.as_str()).unwrap_or("");
    let event_type = EventType::from_str(event_type_str)?;

    let status = item
        .get("status")
        .and_then(|v| v.as_str())
        .and_then(|s| EventStatus::from_str(s).ok())
        .unwrap_or(EventStatus::Info);

    let mut record = EventRecord::new(workspace_id, event_type, status);
    record.agent_id = item.get("agent_id").and_then(|v| v.as_i64()).map(AgentId::new);
    record.run_id = item
        .get("run_id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok());
    record.model = item.get("model").and_then(|v| v.as_str()).map(str::to_string);
    record.tokens_in = item.get("tokens_in").and_then(|v| v.as_i64());
    record.tokens_out = item.get("tokens_out").and_then(|v| v.as_i64());
    record.cost_usd = item
        .get("cost_usd")
        .and_then(|v| v.as_f64())
        .and_then(|f| Decimal::try_from(f).ok());
    record.latency_ms = item.get("latency_ms").and_then(|v| v.as_i64());
    record.payload = item.get("payload").cloned().unwrap_or_else(|| serde_json::json!({}));
    record.dedupe_key = item
        .get("dedupe_key")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    Ok(record)
}

#[async_trait]
impl ObservabilityHooks for ObservabilityService {
    async fn emit_event(&self, event: EventRecord) {
        self.emit(event).await;
    }

    async fn start_run(
        &self,
        workspace_id: WorkspaceId,
        agent_id: Option<AgentId>,
        model: Option<String>,
        metadata: serde_json::Value
    ) -> Uuid {
        ObservabilityService::start_run(self, workspace_id, agent_id, model.as_deref(), metadata)
            .await
    }

    async fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error_message: Option<String>,
        totals: RunTotals
    ) {
        ObservabilityService::finish_run(self, run_id, status, error_message.as_deref(), &totals)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_batch_item_rejects_unknown_type() {
        let item = serde_json::json!({ "event_type": "bogus" });
        let err = parse_batch_item(WorkspaceId::new(1), &item).unwrap_err();
        assert!(err.contains("bogus"));
    }

    #[test]
    fn test_parse_batch_item_defaults_status_to_info() {
        let item = serde_json::json!({ "event_type": "metric", "status": "weird" });
        let record = parse_batch_item(WorkspaceId::new(1), &item).unwrap();
        assert_eq!(record.status, EventStatus::Info);
    }

    #[test]
    fn test_parse_batch_item_reads_fields() {
        let item = serde_json::json!({
            "event_type": "llm_call",
            "status": "success",
            "agent_id": 4,
            "model": "gpt-4o",
            "tokens_in": 120,
            "tokens_out": 30,
            "latency_ms": 900,
            "payload": { "provider": "openai" },
            "dedupe_key": "k-1"
        });
        let record = parse_batch_item(WorkspaceId::new(9), &item).unwrap();
        assert_eq!(record.agent_id, Some(AgentId::new(4)));
        assert_eq!(record.model.as_deref(), Some("gpt-4o"));
        assert_eq!(record.tokens_in, Some(120));
        assert_eq!(record.dedupe_key.as_deref(), Some("k-1"));
    }
}
