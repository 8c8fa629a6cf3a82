//! Ingestion, cost attribution, aggregation, and retention GC against a
//! real database. Skips when Docker is unavailable.

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;

use observability::{DailyAggregator, ObservabilityService, RetentionSweeper, TierEnforcement};
use storage::agents::AgentStore;
use storage::events::EventStore;
use storage::metrics::DailyMetricsStore;
use storage::pricing::PricingStore;
use storage::runs::RunStore;
use testing::{postgres, unique_email, unique_id};
use wd_core::types::{
    AgentId, EventRecord, EventStatus, EventType, RunStatus, RunTotals, WorkspaceId
};

struct Env {
    pool: PgPool,
    workspace: WorkspaceId,
    service: ObservabilityService
}

async fn setup() -> Option<Env> {
    let fixture = postgres().await?;
    let pool = PgPool::connect(fixture.url()).await.ok()?;
    storage::initialize_schema(&pool).await.ok()?;

    let agents = AgentStore::new(pool.clone());
    let workspace = agents.create_workspace(&unique_email()).await.ok()?;

    Some(Env {
        service: ObservabilityService::new(pool.clone()),
        pool,
        workspace
    })
}

#[tokio::test]
async fn test_emit_dedupe_suppresses_second_write() {
    let Some(env) = setup().await else { return };
    let key = unique_id("dedupe");

    let mut event = EventRecord::new(env.workspace, EventType::Metric, EventStatus::Info);
    event.dedupe_key = Some(key.clone());

    assert!(env.service.emit(event.clone()).await.is_some());
    // Same key again: dropped, not an error.
    assert!(env.service.emit(event).await.is_none());

    let count = EventStore::new(env.pool.clone())
        .count_for_workspace(env.workspace)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_batch_rejects_invalid_and_keeps_valid() {
    let Some(env) = setup().await else { return };

    let items = vec![
        json!({"event_type": "metric", "agent_id": 1}),
        json!({"event_type": "definitely_not_a_type"}),
        json!({"event_type": "heartbeat", "agent_id": 1}),
    ];
    let outcome = env.service.emit_batch(env.workspace, &items).await;
    assert_eq!(outcome.accepted, 2);
    assert_eq!(outcome.rejected.len(), 1);
    assert_eq!(outcome.rejected[0].index, 1);
    assert!(outcome.rejected[0].reason.contains("definitely_not_a_type"));
}

#[tokio::test]
async fn test_batch_dedupe_conflict_falls_back_row_by_row() {
    let Some(env) = setup().await else { return };
    let key = unique_id("batch-dup");

    // Pre-existing event holding the dedupe key.
    let mut existing = EventRecord::new(env.workspace, EventType::Metric, EventStatus::Info);
    existing.dedupe_key = Some(key.clone());
    env.service.emit(existing).await.unwrap();

    let items = vec![
        json!({"event_type": "metric", "dedupe_key": key}),
        json!({"event_type": "metric", "payload": {"n": 1}}),
        json!({"event_type": "metric", "payload": {"n": 2}}),
    ];
    let outcome = env.service.emit_batch(env.workspace, &items).await;

    // The duplicate is rejected; the rest land.
    assert_eq!(outcome.accepted, 2);
    assert_eq!(outcome.rejected.len(), 1);
    assert_eq!(outcome.rejected[0].index, 0);

    let count = EventStore::new(env.pool.clone())
        .count_for_workspace(env.workspace)
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_cost_calculation_from_pricing_table() {
    let Some(env) = setup().await else { return };
    let pricing = PricingStore::new(env.pool.clone());

    let provider = unique_id("prov");
    pricing
        .insert(
            &provider,
            "gpt-4o",
            Decimal::new(2500, 3),  // $2.500 per mtok in
            Decimal::new(10_000, 3), // $10.000 per mtok out
            Utc::now().date_naive() - ChronoDuration::days(1),
            None
        )
        .await
        .unwrap();

    // 1M in + 1M out = 2.5 + 10.0
    let cost = env.service.calculate_cost(&provider, "gpt-4o", 1_000_000, 1_000_000).await;
    assert_eq!(cost, Decimal::new(125, 1));

    // Prefix match: a dated model id resolves to the base row.
    let cost = env
        .service
        .calculate_cost(&provider, "gpt-4o-2024-08-06", 1_000_000, 0)
        .await;
    assert_eq!(cost, Decimal::new(25, 1));

    // Unknown pricing is free, not an error.
    let cost = env.service.calculate_cost("nobody", "mystery", 1000, 1000).await;
    assert_eq!(cost, Decimal::ZERO);
}

#[tokio::test]
async fn test_run_lifecycle_totals_are_additive() {
    let Some(env) = setup().await else { return };

    let run_id = env
        .service
        .start_run(env.workspace, Some(AgentId::new(7)), Some("gpt-4o"), json!({}))
        .await;

    let totals = RunTotals {
        tokens_in: 100,
        tokens_out: 50,
        cost_usd: Decimal::new(125, 2),
        latency_ms: 900,
        tool_calls: 3
    };
    let run = env
        .service
        .finish_run(run_id, RunStatus::Success, None, &totals)
        .await
        .unwrap();
    assert_eq!(run.total_tokens_in, 100);
    assert_eq!(run.total_cost_usd, Decimal::new(125, 2));
    assert!(run.finished_at.is_some());

    // A second finish only adds.
    let run = env
        .service
        .finish_run(run_id, RunStatus::Success, None, &totals)
        .await
        .unwrap();
    assert_eq!(run.total_tokens_in, 200);
    assert_eq!(run.total_cost_usd, Decimal::new(250, 2));

    // run_started and run_finished events were emitted.
    let events = EventStore::new(env.pool.clone())
        .events_for_run(env.workspace, run_id)
        .await
        .unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert!(types.contains(&"run_started"));
    assert!(types.contains(&"run_finished"));
}

#[tokio::test]
async fn test_daily_aggregation_is_idempotent() {
    let Some(env) = setup().await else { return };
    let agent = AgentId::new(42);

    // Two finished runs, three llm calls with latencies, one heartbeat.
    for status in [EventStatus::Success, EventStatus::Error] {
        let mut event = EventRecord::new(env.workspace, EventType::RunFinished, status);
        event.agent_id = Some(agent);
        env.service.emit(event).await.unwrap();
    }
    for latency in [100i64, 200, 900] {
        let mut event = EventRecord::new(env.workspace, EventType::LlmCall, EventStatus::Success);
        event.agent_id = Some(agent);
        event.model = Some("gpt-4o".to_string());
        event.latency_ms = Some(latency);
        event.tokens_in = Some(10);
        event.tokens_out = Some(5);
        event.cost_usd = Some(Decimal::new(50, 2));
        env.service.emit(event).await.unwrap();
    }
    let mut hb = EventRecord::new(env.workspace, EventType::Heartbeat, EventStatus::Info);
    hb.agent_id = Some(agent);
    env.service.emit(hb).await.unwrap();

    let aggregator = DailyAggregator::new(env.pool.clone());
    let today = Utc::now().date_naive();
    let first = aggregator.aggregate_daily(today).await.unwrap();
    assert!(first >= 1);

    let metrics = DailyMetricsStore::new(env.pool.clone())
        .get(env.workspace, agent.as_i64(), today)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(metrics.total_runs, 2);
    assert_eq!(metrics.successful_runs, 1);
    assert_eq!(metrics.failed_runs, 1);
    assert_eq!(metrics.total_events, 6);
    assert_eq!(metrics.total_tokens_in, 30);
    assert_eq!(metrics.total_cost_usd, Decimal::new(150, 2));
    assert_eq!(metrics.latency_p50_ms, Some(200));
    assert_eq!(metrics.latency_p95_ms, Some(900));
    assert_eq!(metrics.models_used["gpt-4o"], json!(3));
    assert!(metrics.last_heartbeat_at.is_some());

    // Re-running produces identical rows, not duplicates.
    aggregator.aggregate_daily(today).await.unwrap();
    let again = DailyMetricsStore::new(env.pool.clone())
        .get(env.workspace, agent.as_i64(), today)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.total_events, metrics.total_events);
    assert_eq!(again.total_cost_usd, metrics.total_cost_usd);
}

#[tokio::test]
async fn test_retention_gc_deletes_only_expired() {
    let Some(env) = setup().await else { return };
    let events = EventStore::new(env.pool.clone());
    let runs = RunStore::new(env.pool.clone());

    // One recent event (2d) and one expired event (10d) for a free-tier
    // workspace: cutoff is 7d + 24h grace.
    let mut recent = EventRecord::new(env.workspace, EventType::Metric, EventStatus::Info);
    recent.agent_id = Some(AgentId::new(1));
    let recent = events.insert(&recent).await.unwrap();
    let mut old = EventRecord::new(env.workspace, EventType::Metric, EventStatus::Info);
    old.agent_id = Some(AgentId::new(1));
    let old = events.insert(&old).await.unwrap();

    sqlx::query("UPDATE obs_events SET created_at = $2 WHERE id = $1")
        .bind(recent.id)
        .bind(Utc::now() - ChronoDuration::days(2))
        .execute(&env.pool)
        .await
        .unwrap();
    sqlx::query("UPDATE obs_events SET created_at = $2 WHERE id = $1")
        .bind(old.id)
        .bind(Utc::now() - ChronoDuration::days(10))
        .execute(&env.pool)
        .await
        .unwrap();

    // An expired run as well.
    let run_id = uuid::Uuid::new_v4();
    runs.insert(run_id, env.workspace, None, None, json!({})).await.unwrap();
    sqlx::query("UPDATE obs_runs SET started_at = $2 WHERE run_id = $1")
        .bind(run_id)
        .bind(Utc::now() - ChronoDuration::days(10))
        .execute(&env.pool)
        .await
        .unwrap();

    let tiers = TierEnforcement::new(env.pool.clone());
    let sweeper = RetentionSweeper::new(env.pool.clone());
    let results = sweeper.cleanup_expired(&tiers, 30).await.unwrap();

    let counts = results.get(&env.workspace.as_i64()).unwrap();
    assert_eq!(counts.events_deleted, 1);
    assert_eq!(counts.runs_deleted, 1);

    // The recent event survives; the old one is gone.
    assert_eq!(events.count_for_workspace(env.workspace).await.unwrap(), 1);
    assert!(runs.get(run_id).await.unwrap().is_none());

    // A second sweep is a no-op for this workspace.
    let results = sweeper.cleanup_expired(&tiers, 30).await.unwrap();
    assert!(!results.contains_key(&env.workspace.as_i64()));
}
