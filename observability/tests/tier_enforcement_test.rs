//! Tier enforcement and cache behavior against a real database. Skips
//! when Docker is unavailable.

use sqlx::PgPool;

use observability::TierEnforcement;
use storage::agents::AgentStore;
use storage::alerts::AlertStore;
use storage::events::EventStore;
use storage::tiers::{TierRecord, TierStore};
use testing::{postgres, unique_email};
use wd_core::types::{AgentId, EventRecord, EventStatus, EventType, WorkspaceId};

struct Env {
    pool: PgPool,
    workspace: WorkspaceId
}

async fn setup() -> Option<Env> {
    let fixture = postgres().await?;
    let pool = PgPool::connect(fixture.url()).await.ok()?;
    storage::initialize_schema(&pool).await.ok()?;

    let agents = AgentStore::new(pool.clone());
    let workspace = agents.create_workspace(&unique_email()).await.ok()?;
    Some(Env { pool, workspace })
}

async fn seed_agent_event(env: &Env, agent_id: i64) {
    let mut event = EventRecord::new(env.workspace, EventType::Metric, EventStatus::Info);
    event.agent_id = Some(AgentId::new(agent_id));
    EventStore::new(env.pool.clone()).insert(&event).await.unwrap();
}

#[tokio::test]
async fn test_missing_row_yields_free_defaults() {
    let Some(env) = setup().await else { return };
    let tiers = TierEnforcement::new(env.pool.clone());

    let tier = tiers.get_workspace_tier(env.workspace).await.unwrap();
    assert_eq!(tier.tier_name, "free");
    assert_eq!(tier.agent_limit, 2);
    assert_eq!(tier.retention_days, 7);
    assert_eq!(tier.alert_rule_limit, 0);
}

#[tokio::test]
async fn test_agent_limit_denies_at_threshold() {
    let Some(env) = setup().await else { return };
    let tiers = TierEnforcement::new(env.pool.clone());

    // Free tier allows 2 monitored agents.
    let (allowed, _) = tiers.check_agent_limit(env.workspace).await.unwrap();
    assert!(allowed);

    seed_agent_event(&env, 101).await;
    seed_agent_event(&env, 102).await;

    let (allowed, message) = tiers.check_agent_limit(env.workspace).await.unwrap();
    assert!(!allowed);
    let message = message.unwrap();
    assert!(message.contains("Agent monitoring limit reached (2)"));
    assert!(message.contains("Upgrade"));
}

#[tokio::test]
async fn test_known_agents_are_grandfathered() {
    let Some(env) = setup().await else { return };
    let tiers = TierEnforcement::new(env.pool.clone());

    seed_agent_event(&env, 201).await;
    seed_agent_event(&env, 202).await;

    // At the limit: a known agent passes, a new one is refused.
    let (allowed, _) = tiers
        .check_agent_allowed(env.workspace, AgentId::new(201))
        .await
        .unwrap();
    assert!(allowed);

    let (allowed, _) = tiers
        .check_agent_allowed(env.workspace, AgentId::new(999))
        .await
        .unwrap();
    assert!(!allowed);
}

#[tokio::test]
async fn test_cache_ttl_and_invalidation() {
    let Some(env) = setup().await else { return };
    let tiers = TierEnforcement::new(env.pool.clone());
    let store = TierStore::new(env.pool.clone());

    // Prime the cache with free defaults.
    let before = tiers.get_workspace_tier(env.workspace).await.unwrap();
    assert_eq!(before.tier_name, "free");

    // Mutate the row behind the cache's back.
    store
        .upsert(&TierRecord::template("production", env.workspace))
        .await
        .unwrap();

    // Within the TTL the stale value is served.
    let cached = tiers.get_workspace_tier(env.workspace).await.unwrap();
    assert_eq!(cached.tier_name, "free");

    // Invalidation makes the next read observe the mutation.
    tiers.invalidate(Some(env.workspace));
    let fresh = tiers.get_workspace_tier(env.workspace).await.unwrap();
    assert_eq!(fresh.tier_name, "production");
    assert_eq!(fresh.agent_limit, 10);
}

#[tokio::test]
async fn test_alert_rule_limit_per_tier() {
    let Some(env) = setup().await else { return };
    let tiers = TierEnforcement::new(env.pool.clone());
    let store = TierStore::new(env.pool.clone());
    let alerts = AlertStore::new(env.pool.clone());

    // Free tier: zero alert rules.
    let (allowed, message) = tiers.check_alert_rule_limit(env.workspace).await.unwrap();
    assert!(!allowed);
    assert!(message.unwrap().contains("not available on the free tier"));

    // Production tier: three rules, then denial.
    store
        .upsert(&TierRecord::template("production", env.workspace))
        .await
        .unwrap();
    tiers.invalidate(Some(env.workspace));

    for _ in 0..3 {
        let (allowed, _) = tiers.check_alert_rule_limit(env.workspace).await.unwrap();
        assert!(allowed);
        alerts
            .create_rule(
                env.workspace,
                None,
                "cost_per_day",
                rust_decimal::Decimal::from(10),
                60,
                60
            )
            .await
            .unwrap();
    }

    let (allowed, message) = tiers.check_alert_rule_limit(env.workspace).await.unwrap();
    assert!(!allowed);
    assert!(message.unwrap().contains("Alert rule limit reached (3)"));
}

#[tokio::test]
async fn test_clamp_date_range_respects_retention() {
    let Some(env) = setup().await else { return };
    let tiers = TierEnforcement::new(env.pool.clone());

    let today = chrono::Utc::now().date_naive();
    let ancient = today - chrono::Duration::days(365);

    // Free tier retains 7 days.
    let (from, to) = tiers
        .clamp_date_range(env.workspace, Some(ancient), None)
        .await
        .unwrap();
    assert_eq!(from, today - chrono::Duration::days(7));
    assert_eq!(to, today);

    // A start inside the window is untouched.
    let recent = today - chrono::Duration::days(2);
    let (from, _) = tiers
        .clamp_date_range(env.workspace, Some(recent), Some(today))
        .await
        .unwrap();
    assert_eq!(from, recent);
}

#[tokio::test]
async fn test_feature_flags_and_batch_size() {
    let Some(env) = setup().await else { return };
    let tiers = TierEnforcement::new(env.pool.clone());
    let store = TierStore::new(env.pool.clone());

    assert!(!tiers.check_anomaly_detection(env.workspace).await.unwrap());
    assert!(!tiers.check_slack_notifications(env.workspace).await.unwrap());
    assert_eq!(tiers.get_max_batch_size(env.workspace).await.unwrap(), 100);

    store.upsert(&TierRecord::template("pro", env.workspace)).await.unwrap();
    tiers.invalidate(Some(env.workspace));

    assert!(tiers.check_anomaly_detection(env.workspace).await.unwrap());
    assert!(tiers.check_slack_notifications(env.workspace).await.unwrap());
    assert_eq!(tiers.get_max_batch_size(env.workspace).await.unwrap(), 1000);
}

#[tokio::test]
async fn test_verify_workspace_limits_all() {
    let Some(env) = setup().await else { return };
    let tiers = TierEnforcement::new(env.pool.clone());

    let (allowed, _) = tiers.verify_workspace_limits(env.workspace, "all").await.unwrap();
    assert!(allowed);

    seed_agent_event(&env, 301).await;
    seed_agent_event(&env, 302).await;

    let (allowed, message) = tiers.verify_workspace_limits(env.workspace, "all").await.unwrap();
    assert!(!allowed);
    assert!(message.unwrap().contains("Agent monitoring limit"));
}

#[tokio::test]
async fn test_api_key_limit() {
    let Some(env) = setup().await else { return };
    let tiers = TierEnforcement::new(env.pool.clone());
    let keys = storage::api_keys::ApiKeyStore::new(env.pool.clone());

    // Free tier: one key.
    let (allowed, _) = tiers.check_api_key_limit(env.workspace).await.unwrap();
    assert!(allowed);

    let (_, token) = keys.create(env.workspace, "ingest").await.unwrap();
    assert!(token.starts_with("obsk_"));

    let (allowed, message) = tiers.check_api_key_limit(env.workspace).await.unwrap();
    assert!(!allowed);
    assert!(message.unwrap().contains("API key limit reached (1)"));

    // The token authenticates back to its workspace.
    let resolved = keys.authenticate(&token).await.unwrap();
    assert_eq!(resolved, Some(env.workspace));
    assert!(keys.authenticate("obsk_bogus").await.unwrap().is_none());
}

#[tokio::test]
async fn test_retention_and_health_cutoffs() {
    let Some(env) = setup().await else { return };
    let tiers = TierEnforcement::new(env.pool.clone());

    // Health history on free is today-only.
    let cutoff = tiers.get_health_history_cutoff(env.workspace).await.unwrap();
    assert_eq!(cutoff, chrono::Utc::now().date_naive());

    let retention_cutoff = tiers.get_retention_cutoff(env.workspace).await.unwrap();
    let expected = chrono::Utc::now() - chrono::Duration::days(7);
    assert!((retention_cutoff - expected).num_seconds().abs() < 5);
}
