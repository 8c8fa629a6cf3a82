//! Store-level invariants against a real database. Skips when Docker is
//! unavailable.

use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;

use storage::agents::AgentStore;
use storage::events::EventStore;
use storage::risk::RiskStore;
use testing::{postgres, unique_email, unique_id};
use wd_core::types::{AgentId, EventRecord, EventStatus, EventType, WorkspaceId};

async fn pool() -> Option<PgPool> {
    let fixture = postgres().await?;
    let pool = PgPool::connect(fixture.url()).await.ok()?;
    storage::initialize_schema(&pool).await.ok()?;
    Some(pool)
}

async fn workspace(pool: &PgPool) -> WorkspaceId {
    AgentStore::new(pool.clone())
        .create_workspace(&unique_email())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_event_dedupe_key_is_unique() {
    let Some(pool) = pool().await else { return };
    let ws = workspace(&pool).await;
    let events = EventStore::new(pool.clone());
    let key = unique_id("uniq");

    let mut event = EventRecord::new(ws, EventType::Metric, EventStatus::Info);
    event.dedupe_key = Some(key.clone());
    events.insert(&event).await.unwrap();

    // The partial unique index rejects a second row with the same key.
    assert!(events.insert(&event).await.is_err());
    assert!(events.dedupe_exists(&key).await.unwrap());
}

#[tokio::test]
async fn test_events_for_run_preserve_submission_order() {
    let Some(pool) = pool().await else { return };
    let ws = workspace(&pool).await;
    let events = EventStore::new(pool.clone());
    let run_id = uuid::Uuid::new_v4();

    for n in 0..5 {
        let mut event = EventRecord::new(ws, EventType::Metric, EventStatus::Info);
        event.run_id = Some(run_id);
        event.payload = json!({"n": n});
        events.insert(&event).await.unwrap();
    }

    let stored = events.events_for_run(ws, run_id).await.unwrap();
    let order: Vec<i64> = stored.iter().map(|e| e.payload["n"].as_i64().unwrap()).collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_risk_policy_scope_is_unique() {
    let Some(pool) = pool().await else { return };
    let ws = workspace(&pool).await;
    let risk = RiskStore::new(pool.clone());
    let agent = AgentId::new(31);

    let first = risk
        .upsert_policy(ws, Some(agent), "daily_spend_cap", Decimal::from(5), "alert_only", 360, true)
        .await
        .unwrap();
    // A second upsert on the same (workspace, agent, type) updates in
    // place rather than creating a sibling.
    let second = risk
        .upsert_policy(ws, Some(agent), "daily_spend_cap", Decimal::from(9), "pause_agent", 60, true)
        .await
        .unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.threshold_value, Decimal::from(9));
    assert_eq!(second.action_type, "pause_agent");

    let policies = risk.policies_for_agent(ws, agent).await.unwrap();
    assert_eq!(policies.len(), 1);

    // The workspace-wide scope (null agent) is its own row.
    let workspace_wide = risk
        .upsert_policy(ws, None, "daily_spend_cap", Decimal::from(50), "alert_only", 360, true)
        .await
        .unwrap();
    assert_ne!(workspace_wide.id, first.id);
    let again = risk
        .upsert_policy(ws, None, "daily_spend_cap", Decimal::from(60), "alert_only", 360, true)
        .await
        .unwrap();
    assert_eq!(workspace_wide.id, again.id);
}

#[tokio::test]
async fn test_finalize_event_guards_double_execution() {
    let Some(pool) = pool().await else { return };
    let ws = workspace(&pool).await;
    let risk = RiskStore::new(pool.clone());

    let policy = risk
        .upsert_policy(ws, None, "daily_spend_cap", Decimal::from(1), "alert_only", 360, true)
        .await
        .unwrap();
    let event = risk
        .insert_event(
            &policy,
            Decimal::from(2),
            Decimal::from(1),
            &unique_id("dk"),
            chrono::Utc::now()
        )
        .await
        .unwrap();

    let audit = storage::risk::AuditEntry {
        action_type: "alert_only".to_string(),
        previous_state: json!({}),
        new_state: json!({}),
        result: "success".to_string(),
        error_message: None
    };

    let applied = risk
        .finalize_event(event.id, wd_core::types::RiskEventStatus::Executed, json!({"ok": true}), &audit)
        .await
        .unwrap();
    assert!(applied);

    // The second worker loses the pending guard and writes nothing.
    let applied = risk
        .finalize_event(event.id, wd_core::types::RiskEventStatus::Failed, json!({}), &audit)
        .await
        .unwrap();
    assert!(!applied);

    let stored = risk.get_event(event.id).await.unwrap().unwrap();
    assert_eq!(stored.status, "executed");
    let trail = risk.audit_trail(ws, None, 10).await.unwrap();
    assert_eq!(trail.len(), 1);
}

#[tokio::test]
async fn test_agent_store_scoping() {
    let Some(pool) = pool().await else { return };
    let ws = workspace(&pool).await;
    let other = workspace(&pool).await;
    let agents = AgentStore::new(pool.clone());

    let agent = agents.create_agent(ws, "scoped", json!({}), json!({})).await.unwrap();

    assert!(agents.get(ws, AgentId::new(agent.id)).await.unwrap().is_some());
    // From another workspace the agent does not exist.
    assert!(agents.get(other, AgentId::new(agent.id)).await.unwrap().is_none());
    assert!(
        agents
            .set_active(other, AgentId::new(agent.id), false)
            .await
            .unwrap()
            .is_none()
    );
}
