//! Alert rule evaluation against a real database. Skips when Docker is
//! unavailable.

use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::PgPool;

use observability::AlertEvaluator;
use serial_test::serial;
use storage::agents::AgentStore;
use storage::alerts::AlertStore;
use storage::events::EventStore;
use testing::{postgres, unique_email};
use wd_core::traits::Notifier;
use wd_core::types::{AgentId, EventRecord, EventStatus, EventType, WorkspaceId};

struct CountingNotifier(parking_lot::Mutex<Vec<String>>);

#[async_trait::async_trait]
impl Notifier for CountingNotifier {
    async fn notify(&self, _workspace_id: WorkspaceId, message: &str) -> Result<(), String> {
        self.0.lock().push(message.to_string());
        Ok(())
    }
}

struct Env {
    pool: PgPool,
    workspace: WorkspaceId,
    alerts: AlertStore,
    events: EventStore
}

async fn setup() -> Option<Env> {
    let fixture = postgres().await?;
    let pool = PgPool::connect(fixture.url()).await.ok()?;
    storage::initialize_schema(&pool).await.ok()?;

    let agents = AgentStore::new(pool.clone());
    let workspace = agents.create_workspace(&unique_email()).await.ok()?;
    Some(Env {
        alerts: AlertStore::new(pool.clone()),
        events: EventStore::new(pool.clone()),
        pool,
        workspace
    })
}

fn evaluator(env: &Env) -> AlertEvaluator {
    AlertEvaluator::new(
        env.pool.clone(),
        Arc::new(CountingNotifier(parking_lot::Mutex::new(Vec::new())))
    )
}

#[tokio::test]
#[serial]
async fn test_cost_per_day_fires_strictly_above_threshold() {
    let Some(env) = setup().await else { return };

    env.alerts
        .create_rule(env.workspace, None, "cost_per_day", Decimal::from(10), 60, 60)
        .await
        .unwrap();

    // Exactly at the threshold: no alert.
    let mut event = EventRecord::new(env.workspace, EventType::LlmCall, EventStatus::Success);
    event.agent_id = Some(AgentId::new(1));
    event.cost_usd = Some(Decimal::from(10));
    env.events.insert(&event).await.unwrap();

    evaluator(&env).evaluate_alerts().await.unwrap();
    assert!(env.alerts.alert_events(env.workspace, 10).await.unwrap().is_empty());

    // One cent over: fires once, then the cooldown holds.
    let mut event = EventRecord::new(env.workspace, EventType::LlmCall, EventStatus::Success);
    event.agent_id = Some(AgentId::new(1));
    event.cost_usd = Some(Decimal::new(1, 2));
    env.events.insert(&event).await.unwrap();

    evaluator(&env).evaluate_alerts().await.unwrap();
    let fired = env.alerts.alert_events(env.workspace, 10).await.unwrap();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].rule_type, "cost_per_day");
    assert!(fired[0].message.contains("Daily cost"));

    evaluator(&env).evaluate_alerts().await.unwrap();
    assert_eq!(env.alerts.alert_events(env.workspace, 10).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn test_error_rate_needs_data() {
    let Some(env) = setup().await else { return };

    env.alerts
        .create_rule(env.workspace, None, "error_rate", Decimal::from(25), 60, 60)
        .await
        .unwrap();

    // No finished runs in the window: no alert.
    evaluator(&env).evaluate_alerts().await.unwrap();
    assert!(env.alerts.alert_events(env.workspace, 10).await.unwrap().is_empty());

    // One error out of two runs = 50% > 25%.
    for status in [EventStatus::Success, EventStatus::Error] {
        let mut event = EventRecord::new(env.workspace, EventType::RunFinished, status);
        event.agent_id = Some(AgentId::new(1));
        env.events.insert(&event).await.unwrap();
    }
    evaluator(&env).evaluate_alerts().await.unwrap();
    let fired = env.alerts.alert_events(env.workspace, 10).await.unwrap();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].metric_value, Decimal::from(50));
}

#[tokio::test]
#[serial]
async fn test_no_heartbeat_fires_when_never_seen() {
    let Some(env) = setup().await else { return };

    env.alerts
        .create_rule(env.workspace, None, "no_heartbeat", Decimal::from(30), 60, 60)
        .await
        .unwrap();

    // No heartbeat ever: triggers immediately.
    evaluator(&env).evaluate_alerts().await.unwrap();
    let fired = env.alerts.alert_events(env.workspace, 10).await.unwrap();
    assert_eq!(fired.len(), 1);
    assert!(fired[0].message.contains("No heartbeat"));
}

#[tokio::test]
#[serial]
async fn test_fresh_heartbeat_keeps_quiet() {
    let Some(env) = setup().await else { return };

    env.alerts
        .create_rule(env.workspace, None, "no_heartbeat", Decimal::from(30), 60, 60)
        .await
        .unwrap();

    let mut event = EventRecord::new(env.workspace, EventType::Heartbeat, EventStatus::Info);
    event.agent_id = Some(AgentId::new(1));
    env.events.insert(&event).await.unwrap();

    evaluator(&env).evaluate_alerts().await.unwrap();
    assert!(env.alerts.alert_events(env.workspace, 10).await.unwrap().is_empty());
}
