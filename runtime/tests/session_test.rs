//! Session lifecycle and inter-agent messaging over a real database.
//! Skips when Docker is unavailable.

use std::sync::Arc;

use serde_json::json;
use sqlx::PgPool;

use adapters::observability::RecordingObservability;
use adapters::{AllowAllGovernance, DenyAllGovernance, StaticToolRegistry};
use runtime::AgentRuntime;
use storage::agents::AgentStore;
use testing::{postgres, unique_email};
use wd_core::types::{AgentId, EventType, RunStatus, WorkspaceId};

struct Env {
    pool: PgPool,
    workspace: WorkspaceId,
    agent_a: AgentId,
    agent_b: AgentId,
    observability: Arc<RecordingObservability>
}

async fn setup() -> Option<Env> {
    let fixture = postgres().await?;
    let pool = PgPool::connect(fixture.url()).await.ok()?;
    storage::initialize_schema(&pool).await.ok()?;

    let agents = AgentStore::new(pool.clone());
    let workspace = agents.create_workspace(&unique_email()).await.ok()?;
    let agent_a = agents
        .create_agent(workspace, "alpha", json!({}), json!({}))
        .await
        .ok()?;
    let agent_b = agents
        .create_agent(workspace, "beta", json!({}), json!({}))
        .await
        .ok()?;

    Some(Env {
        pool,
        workspace,
        agent_a: AgentId::new(agent_a.id),
        agent_b: AgentId::new(agent_b.id),
        observability: Arc::new(RecordingObservability::new())
    })
}

fn runtime_for(env: &Env) -> Arc<AgentRuntime> {
    let registry = Arc::new(StaticToolRegistry::new());
    registry.register("web_search", "", json!({"ok": true}));
    AgentRuntime::new(
        env.pool.clone(),
        env.workspace,
        registry,
        env.observability.clone(),
        Arc::new(AllowAllGovernance)
    )
}

#[tokio::test]
async fn test_session_lifecycle_and_run_tracking() {
    let Some(env) = setup().await else { return };
    let runtime = runtime_for(&env);

    let session = runtime
        .start_session(env.workspace.as_i64(), env.agent_a)
        .await
        .unwrap();

    // The session is registered under its run id.
    let run_id = session.context().run_id;
    assert!(runtime.get_session(run_id).is_some());
    assert_eq!(env.observability.started_runs(), vec![run_id]);

    let result = session.execute_tool("web_search", json!({})).await.unwrap();
    assert_eq!(result, json!({"ok": true}));

    session.stop(RunStatus::Success, None).await;
    assert!(!session.is_active());
    assert!(runtime.get_session(run_id).is_none());
    assert_eq!(env.observability.finished_runs().len(), 1);

    // Stop is idempotent; later operations fail.
    session.stop(RunStatus::Success, None).await;
    assert_eq!(env.observability.finished_runs().len(), 1);
    assert!(session.execute_tool("web_search", json!({})).await.is_err());
    assert!(session.receive_messages().is_err());
}

#[tokio::test]
async fn test_cross_workspace_session_refused() {
    let Some(env) = setup().await else { return };

    let agents = AgentStore::new(env.pool.clone());
    let other_workspace = agents.create_workspace(&unique_email()).await.unwrap();
    let foreign_agent = agents
        .create_agent(other_workspace, "intruder", json!({}), json!({}))
        .await
        .unwrap();

    let runtime = runtime_for(&env);

    // A foreign agent under this workspace's credentials is unknown.
    let err = runtime
        .start_session(env.workspace.as_i64(), AgentId::new(foreign_agent.id))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("does not belong to workspace"));
}

#[tokio::test]
async fn test_governance_denial_refuses_session() {
    let Some(env) = setup().await else { return };
    let registry = Arc::new(StaticToolRegistry::new());
    let runtime = AgentRuntime::new(
        env.pool.clone(),
        env.workspace,
        registry,
        env.observability.clone(),
        Arc::new(DenyAllGovernance("limit".to_string()))
    );

    let err = runtime
        .start_session(env.workspace.as_i64(), env.agent_a)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Workspace limit reached"));
    // No run was opened for the refused session.
    assert!(env.observability.started_runs().is_empty());
}

#[tokio::test]
async fn test_messaging_is_fifo_and_drains() {
    let Some(env) = setup().await else { return };
    let runtime = runtime_for(&env);

    let session_a = runtime
        .start_session(env.workspace.as_i64(), env.agent_a)
        .await
        .unwrap();
    let session_b = runtime
        .start_session(env.workspace.as_i64(), env.agent_b)
        .await
        .unwrap();

    session_a
        .send_message(env.agent_b, json!({"seq": 1}))
        .await
        .unwrap();
    session_a
        .send_message(env.agent_b, json!({"seq": 2}))
        .await
        .unwrap();

    let messages = session_b.receive_messages().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, json!({"seq": 1}));
    assert_eq!(messages[1].content, json!({"seq": 2}));
    assert_eq!(messages[0].from_agent_id, env.agent_a);

    // Drained: a second receive is empty.
    assert!(session_b.receive_messages().unwrap().is_empty());

    // Message hand-offs are observable as action_started events.
    let hand_offs = env.observability.events_of_type(EventType::ActionStarted);
    assert_eq!(hand_offs.len(), 2);
    assert_eq!(hand_offs[0].payload["type"], json!("agent_message"));
}

#[tokio::test]
async fn test_message_to_foreign_agent_refused() {
    let Some(env) = setup().await else { return };

    let agents = AgentStore::new(env.pool.clone());
    let other_workspace = agents.create_workspace(&unique_email()).await.unwrap();
    let foreign_agent = agents
        .create_agent(other_workspace, "outsider", json!({}), json!({}))
        .await
        .unwrap();

    let runtime = runtime_for(&env);
    let session = runtime
        .start_session(env.workspace.as_i64(), env.agent_a)
        .await
        .unwrap();

    let err = session
        .send_message(AgentId::new(foreign_agent.id), json!({}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("does not belong to workspace"));
}
