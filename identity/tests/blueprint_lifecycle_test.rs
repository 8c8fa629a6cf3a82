//! Blueprint catalog and instance binder against a real database.
//! Skips when Docker is unavailable.

use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use identity::{
    BlueprintCatalog, CapabilityService, InstanceBinder, LegacyConverter, resolve_capabilities
};
use storage::agents::AgentStore;
use storage::blueprints::NewVersion;
use storage::capabilities::CreateBundle;
use storage::risk::RiskStore;
use storage::roles::RoleStore;
use testing::{postgres, unique_email, unique_id};
use wd_core::types::{AgentId, PolicySnapshot, WorkspaceId};

struct Env {
    pool: PgPool,
    workspace: WorkspaceId,
    agent: AgentId
}

async fn setup() -> Option<Env> {
    let fixture = postgres().await?;
    let pool = PgPool::connect(fixture.url()).await.ok()?;
    storage::initialize_schema(&pool).await.ok()?;

    let agents = AgentStore::new(pool.clone());
    let workspace = agents.create_workspace(&unique_email()).await.ok()?;
    let agent = agents
        .create_agent(
            workspace,
            "researcher-1",
            json!({"provider": "openai", "model": "gpt-4o"}),
            json!({})
        )
        .await
        .ok()?;

    Some(Env {
        pool,
        workspace,
        agent: AgentId::new(agent.id)
    })
}

fn version_fields(tools: &[&str], models: &[&str], risk: serde_json::Value) -> NewVersion {
    NewVersion {
        allowed_models: models.iter().map(|s| s.to_string()).collect(),
        allowed_tools: tools.iter().map(|s| s.to_string()).collect(),
        default_risk_profile: risk,
        llm_defaults: json!({"provider": "openai"}),
        identity_defaults: json!({}),
        ..NewVersion::default()
    }
}

#[tokio::test]
async fn test_lifecycle_draft_publish_archive() {
    let Some(env) = setup().await else { return };
    let catalog = BlueprintCatalog::new(env.pool.clone());

    let blueprint = catalog
        .create_blueprint(env.workspace, &unique_id("bp"), "researcher", Some("desc"), None)
        .await
        .unwrap();
    assert_eq!(blueprint.status, "draft");
    assert_eq!(blueprint.latest_version, 0);

    // Drafts are mutable.
    let updated = catalog
        .update_draft_blueprint(env.workspace, blueprint.id, Some("renamed"), None, None)
        .await
        .unwrap();
    assert_eq!(updated.name, "renamed");

    // Archive refuses drafts.
    let err = catalog.archive_blueprint(env.workspace, blueprint.id).await.unwrap_err();
    assert!(err.to_string().contains("Cannot archive a draft"));

    // Publish transitions draft -> published with version 1.
    let version = catalog
        .publish_blueprint(
            env.workspace,
            blueprint.id,
            version_fields(&["web_search"], &["openai"], json!({})),
            &[],
            None
        )
        .await
        .unwrap();
    assert_eq!(version.version, 1);

    let republished = catalog
        .publish_blueprint(
            env.workspace,
            blueprint.id,
            version_fields(&["web_search", "read_file"], &["openai"], json!({})),
            &[],
            None
        )
        .await
        .unwrap();
    assert_eq!(republished.version, 2);

    let record = catalog.get_blueprint(env.workspace, blueprint.id).await.unwrap().unwrap();
    assert_eq!(record.status, "published");
    assert_eq!(record.latest_version, 2);

    // Published blueprints are no longer draft-editable.
    let err = catalog
        .update_draft_blueprint(env.workspace, blueprint.id, Some("nope"), None, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Only drafts are mutable"));

    // Archive is idempotent once published.
    catalog.archive_blueprint(env.workspace, blueprint.id).await.unwrap();
    let again = catalog.archive_blueprint(env.workspace, blueprint.id).await.unwrap();
    assert_eq!(again.status, "archived");

    // Archived blueprints refuse further publishes.
    let err = catalog
        .publish_blueprint(
            env.workspace,
            blueprint.id,
            version_fields(&[], &[], json!({})),
            &[],
            None
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("archived"));
}

#[tokio::test]
async fn test_published_versions_are_immutable_reads() {
    let Some(env) = setup().await else { return };
    let catalog = BlueprintCatalog::new(env.pool.clone());

    let blueprint = catalog
        .create_blueprint(env.workspace, &unique_id("bp"), "worker", None, None)
        .await
        .unwrap();
    let written = catalog
        .publish_blueprint(
            env.workspace,
            blueprint.id,
            version_fields(&["a", "b"], &["openai"], json!({"daily_spend_cap": 4})),
            &[],
            None
        )
        .await
        .unwrap();

    let read = catalog
        .get_blueprint_version(env.workspace, blueprint.id, 1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read.allowed_tools, written.allowed_tools);
    assert_eq!(read.allowed_models, written.allowed_models);
    assert_eq!(read.default_risk_profile, written.default_risk_profile);
    assert_eq!(read.published_at, written.published_at);
}

#[tokio::test]
async fn test_publish_with_foreign_capability_aborts() {
    let Some(env) = setup().await else { return };
    let catalog = BlueprintCatalog::new(env.pool.clone());
    let bundles = CapabilityService::new(env.pool.clone());

    // A bundle in someone else's workspace.
    let agents = AgentStore::new(env.pool.clone());
    let other_workspace = agents.create_workspace(&unique_email()).await.unwrap();
    let foreign = bundles
        .create_bundle(CreateBundle {
            workspace_id: other_workspace,
            name: unique_id("foreign"),
            description: None,
            tool_set: vec!["read".to_string()],
            model_constraints: json!({}),
            risk_constraints: json!({}),
            is_system: false
        })
        .await
        .unwrap();

    let blueprint = catalog
        .create_blueprint(env.workspace, &unique_id("bp"), "worker", None, None)
        .await
        .unwrap();

    let err = catalog
        .publish_blueprint(
            env.workspace,
            blueprint.id,
            version_fields(&["*"], &[], json!({})),
            &[foreign.id],
            None
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));

    // Nothing was committed: the blueprint is still an unversioned draft.
    let record = catalog.get_blueprint(env.workspace, blueprint.id).await.unwrap().unwrap();
    assert_eq!(record.status, "draft");
    assert_eq!(record.latest_version, 0);
}

#[tokio::test]
async fn test_instantiate_snapshot_matches_resolution() {
    let Some(env) = setup().await else { return };
    let catalog = BlueprintCatalog::new(env.pool.clone());
    let bundles = CapabilityService::new(env.pool.clone());
    let binder = InstanceBinder::new(env.pool.clone());

    let bundle_a = bundles
        .create_bundle(CreateBundle {
            workspace_id: env.workspace,
            name: unique_id("bundle-a"),
            description: None,
            tool_set: vec!["read".to_string(), "write".to_string()],
            model_constraints: json!({"allowed_providers": ["openai", "anthropic"]}),
            risk_constraints: json!({"daily_spend_cap": 5}),
            is_system: false
        })
        .await
        .unwrap();
    let bundle_b = bundles
        .create_bundle(CreateBundle {
            workspace_id: env.workspace,
            name: unique_id("bundle-b"),
            description: None,
            tool_set: vec!["read".to_string(), "delete".to_string()],
            model_constraints: json!({"allowed_providers": ["openai"]}),
            risk_constraints: json!({"daily_spend_cap": 10}),
            is_system: false
        })
        .await
        .unwrap();

    let blueprint = catalog
        .create_blueprint(env.workspace, &unique_id("bp"), "executor", None, None)
        .await
        .unwrap();
    catalog
        .publish_blueprint(
            env.workspace,
            blueprint.id,
            version_fields(&["*"], &[], json!({})),
            &[bundle_a.id, bundle_b.id],
            None
        )
        .await
        .unwrap();

    let instance = binder
        .instantiate_agent(env.workspace, env.agent, blueprint.id, 1, None, None)
        .await
        .unwrap();

    let snapshot: PolicySnapshot =
        serde_json::from_value(instance.policy_snapshot.clone()).unwrap();
    assert_eq!(snapshot.allowed_tools, vec!["delete", "read", "write"]);
    assert_eq!(snapshot.allowed_models, vec!["openai"]);
    assert_eq!(snapshot.risk_profile["daily_spend_cap"], json!(5));

    // Round-trip law: the stored snapshot equals re-resolving the
    // version with its bundles.
    let version = catalog
        .get_blueprint_version(env.workspace, blueprint.id, 1)
        .await
        .unwrap()
        .unwrap();
    let attached = catalog
        .bundles_for_version(env.workspace, blueprint.id, 1)
        .await
        .unwrap();
    assert_eq!(snapshot, resolve_capabilities(&version, &attached));

    // Seeded: the minimum spend cap became a risk policy on the agent.
    let risk = RiskStore::new(env.pool.clone());
    let policies = risk.policies_for_agent(env.workspace, env.agent).await.unwrap();
    assert_eq!(policies.len(), 1);
    assert_eq!(policies[0].policy_type, "daily_spend_cap");
    assert_eq!(policies[0].threshold_value, rust_decimal::Decimal::from(5));
    assert_eq!(policies[0].cooldown_minutes, 360);
    assert_eq!(policies[0].action_type, "alert_only");

    // Seeded: executor role_type maps to the worker collaboration role.
    let roles = RoleStore::new(env.pool.clone());
    let role = roles.get_role(env.workspace, env.agent).await.unwrap().unwrap();
    assert_eq!(role.role, "worker");

    // Second instantiation refuses.
    let err = binder
        .instantiate_agent(env.workspace, env.agent, blueprint.id, 1, None, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already has an instance binding"));
}

#[tokio::test]
async fn test_instantiate_guards() {
    let Some(env) = setup().await else { return };
    let catalog = BlueprintCatalog::new(env.pool.clone());
    let binder = InstanceBinder::new(env.pool.clone());

    // Draft blueprints cannot be instantiated.
    let draft = catalog
        .create_blueprint(env.workspace, &unique_id("bp"), "worker", None, None)
        .await
        .unwrap();
    let err = binder
        .instantiate_agent(env.workspace, env.agent, draft.id, 1, None, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Only published blueprints"));

    // Unknown blueprint.
    let err = binder
        .instantiate_agent(env.workspace, env.agent, Uuid::new_v4(), 1, None, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));

    // Overrides with no override policy are refused.
    catalog
        .publish_blueprint(
            env.workspace,
            draft.id,
            version_fields(&["*"], &["*"], json!({})),
            &[],
            None
        )
        .await
        .unwrap();
    let err = binder
        .instantiate_agent(
            env.workspace,
            env.agent,
            draft.id,
            1,
            Some(json!({"llm_defaults": {"model": "gpt-4o-mini"}})),
            None
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Override validation failed"));

    // Missing version.
    let err = binder
        .instantiate_agent(env.workspace, env.agent, draft.id, 9, None, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn test_refresh_and_remove() {
    let Some(env) = setup().await else { return };
    let catalog = BlueprintCatalog::new(env.pool.clone());
    let binder = InstanceBinder::new(env.pool.clone());

    let blueprint = catalog
        .create_blueprint(env.workspace, &unique_id("bp"), "worker", None, None)
        .await
        .unwrap();
    catalog
        .publish_blueprint(
            env.workspace,
            blueprint.id,
            version_fields(&["read"], &["openai"], json!({})),
            &[],
            None
        )
        .await
        .unwrap();
    binder
        .instantiate_agent(env.workspace, env.agent, blueprint.id, 1, None, None)
        .await
        .unwrap();

    catalog
        .publish_blueprint(
            env.workspace,
            blueprint.id,
            version_fields(&["read", "write"], &["openai"], json!({})),
            &[],
            None
        )
        .await
        .unwrap();

    let refreshed = binder
        .refresh_instance_policy(env.workspace, env.agent, Some(2), None)
        .await
        .unwrap();
    assert_eq!(refreshed.blueprint_version, 2);
    assert!(refreshed.last_policy_refresh.is_some());
    let snapshot: PolicySnapshot =
        serde_json::from_value(refreshed.policy_snapshot).unwrap();
    assert_eq!(snapshot.allowed_tools, vec!["read", "write"]);

    assert!(binder.remove_agent_instance(env.workspace, env.agent).await.unwrap());
    assert!(binder.get_agent_instance(env.agent).await.unwrap().is_none());
    // Removing twice reports absence.
    assert!(!binder.remove_agent_instance(env.workspace, env.agent).await.unwrap());
}

#[tokio::test]
async fn test_clone_produces_fresh_draft() {
    let Some(env) = setup().await else { return };
    let catalog = BlueprintCatalog::new(env.pool.clone());

    let source = catalog
        .create_blueprint(env.workspace, "origin", "supervisor", Some("original"), None)
        .await
        .unwrap();
    catalog
        .publish_blueprint(
            env.workspace,
            source.id,
            version_fields(&["read"], &[], json!({})),
            &[],
            None
        )
        .await
        .unwrap();

    let (draft, source_version) = catalog
        .clone_blueprint(env.workspace, source.id, 1, None, None)
        .await
        .unwrap();
    assert_ne!(draft.id, source.id);
    assert_eq!(draft.name, "origin (Clone)");
    assert_eq!(draft.role_type, "supervisor");
    assert_eq!(draft.status, "draft");
    assert_eq!(draft.latest_version, 0);
    assert_eq!(source_version.version, 1);

    let versions = catalog
        .list_blueprint_versions(env.workspace, draft.id, 10)
        .await
        .unwrap();
    assert!(versions.is_empty());
}

#[tokio::test]
async fn test_implicit_blueprint_preserves_existing_state() {
    let Some(env) = setup().await else { return };
    let converter = LegacyConverter::new(env.pool.clone());
    let risk = RiskStore::new(env.pool.clone());
    let roles = RoleStore::new(env.pool.clone());

    // Pre-existing runtime artefacts that must survive conversion.
    let policy = risk
        .upsert_policy(
            env.workspace,
            Some(env.agent),
            "daily_spend_cap",
            rust_decimal::Decimal::from(42),
            "pause_agent",
            120,
            true
        )
        .await
        .unwrap();
    roles
        .upsert_role(env.workspace, env.agent, "specialist", true, false)
        .await
        .unwrap();

    let (blueprint, version, instance) = converter
        .generate_implicit_blueprint(env.workspace, env.agent, None)
        .await
        .unwrap();

    assert_eq!(blueprint.status, "published");
    assert!(blueprint.name.ends_with("(Auto)"));
    // Existing specialist role maps to the researcher archetype.
    assert_eq!(blueprint.role_type, "researcher");
    assert_eq!(version.allowed_tools, json!(["*"]));
    assert_eq!(version.allowed_models, json!(["*"]));

    let snapshot: PolicySnapshot = serde_json::from_value(instance.policy_snapshot).unwrap();
    assert!(snapshot.tool_allowlist().is_none());
    assert!(snapshot.model_allowlist().is_none());

    // Untouched: the pre-existing policy and role are byte-identical.
    let after = risk.policies_for_agent(env.workspace, env.agent).await.unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].threshold_value, policy.threshold_value);
    assert_eq!(after[0].action_type, "pause_agent");
    assert_eq!(after[0].cooldown_minutes, 120);
    assert_eq!(after[0].updated_at, policy.updated_at);

    let role = roles.get_role(env.workspace, env.agent).await.unwrap().unwrap();
    assert_eq!(role.role, "specialist");
    assert!(role.can_assign_to_peers);

    // Converting again is refused; workspace migration reports a skip.
    let err = converter
        .generate_implicit_blueprint(env.workspace, env.agent, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already has an instance binding"));

    let results = converter
        .migrate_workspace_agents(env.workspace, None)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, "skipped");
}
