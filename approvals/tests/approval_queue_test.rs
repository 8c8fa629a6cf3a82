//! Approval queue state machine against a real database. Skips when
//! Docker is unavailable.

use std::sync::Arc;

use serde_json::json;
use sqlx::PgPool;

use adapters::MockAdapter;
use approvals::{ApprovalQueue, HandlerRegistry};
use testing::{postgres, unique_email};
use wd_core::types::{AgentId, WorkspaceId};

struct Env {
    pool: PgPool,
    workspace: WorkspaceId
}

async fn setup() -> Option<Env> {
    let fixture = postgres().await?;
    let pool = PgPool::connect(fixture.url()).await.ok()?;
    storage::initialize_schema(&pool).await.ok()?;

    let agents = storage::agents::AgentStore::new(pool.clone());
    let workspace = agents.create_workspace(&unique_email()).await.ok()?;
    Some(Env { pool, workspace })
}

fn queue_with(env: &Env, adapter: Arc<MockAdapter>) -> ApprovalQueue {
    let mut handlers = HandlerRegistry::new();
    handlers.register("send_email", "gmail", adapter);
    ApprovalQueue::new(env.pool.clone(), Arc::new(handlers))
}

#[tokio::test]
async fn test_happy_path_executes_and_bumps_usage() {
    let Some(env) = setup().await else { return };
    let adapter = Arc::new(MockAdapter::succeeding(json!({"message_id": "m1"})));
    let queue = queue_with(&env, adapter.clone());

    let action = queue
        .create_action(
            env.workspace,
            Some(AgentId::new(5)),
            "send_email",
            "gmail",
            json!({"to": "x@y", "subject": "hi", "body": "hey"}),
            "user asked for a follow-up",
            0.92
        )
        .await
        .unwrap();
    assert_eq!(action.status, "pending");

    let pending = queue.get_pending_actions(env.workspace).await.unwrap();
    assert_eq!(pending.len(), 1);

    let executed = queue.approve_and_execute(env.workspace, action.id).await.unwrap();
    assert_eq!(executed.status, "executed");
    assert!(executed.approved_at.is_some());
    assert!(executed.executed_at.is_some());
    assert_eq!(executed.result_data.unwrap()["message_id"], json!("m1"));

    // The adapter saw the parsed action data.
    assert_eq!(adapter.call_count(), 1);
    let (workspace, data) = adapter.last_call().unwrap();
    assert_eq!(workspace, env.workspace);
    assert_eq!(data["to"], json!("x@y"));

    // gmail usage incremented once.
    assert_eq!(queue.service_usage(env.workspace, "gmail").await.unwrap(), 1);

    // The queue no longer lists it, and a second approval is refused.
    assert!(queue.get_pending_actions(env.workspace).await.unwrap().is_empty());
    let err = queue.approve_and_execute(env.workspace, action.id).await.unwrap_err();
    assert_eq!(err.to_string(), "Action not found or already processed");
    assert_eq!(adapter.call_count(), 1, "handler must run at most once");
}

#[tokio::test]
async fn test_handler_error_fails_action() {
    let Some(env) = setup().await else { return };
    let adapter = Arc::new(MockAdapter::failing("gmail quota exceeded"));
    let queue = queue_with(&env, adapter);

    let action = queue
        .create_action(env.workspace, None, "send_email", "gmail", json!({}), "", 0.0)
        .await
        .unwrap();

    let err = queue.approve_and_execute(env.workspace, action.id).await.unwrap_err();
    assert_eq!(err.to_string(), "gmail quota exceeded");

    let stored = queue.get_action(env.workspace, action.id).await.unwrap().unwrap();
    assert_eq!(stored.status, "failed");
    assert_eq!(stored.error_message.as_deref(), Some("gmail quota exceeded"));
    // Usage is only counted on success.
    assert_eq!(queue.service_usage(env.workspace, "gmail").await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_handler_fails_explicitly() {
    let Some(env) = setup().await else { return };
    let queue = ApprovalQueue::new(env.pool.clone(), Arc::new(HandlerRegistry::new()));

    let action = queue
        .create_action(env.workspace, None, "place_order", "binance", json!({}), "", 0.0)
        .await
        .unwrap();

    let err = queue.approve_and_execute(env.workspace, action.id).await.unwrap_err();
    assert_eq!(err.to_string(), "No executor for (place_order, binance)");

    let stored = queue.get_action(env.workspace, action.id).await.unwrap().unwrap();
    assert_eq!(stored.status, "failed");
}

#[tokio::test]
async fn test_reject_is_terminal() {
    let Some(env) = setup().await else { return };
    let adapter = Arc::new(MockAdapter::succeeding(json!({})));
    let queue = queue_with(&env, adapter.clone());

    let action = queue
        .create_action(env.workspace, None, "send_email", "gmail", json!({}), "", 0.0)
        .await
        .unwrap();

    let rejected = queue.reject_action(env.workspace, action.id).await.unwrap();
    assert_eq!(rejected.status, "rejected");

    // Neither approval nor a second rejection can move it.
    assert!(queue.approve_and_execute(env.workspace, action.id).await.is_err());
    assert!(queue.reject_action(env.workspace, action.id).await.is_err());
    assert_eq!(adapter.call_count(), 0);
}

#[tokio::test]
async fn test_foreign_workspace_cannot_touch_action() {
    let Some(env) = setup().await else { return };
    let adapter = Arc::new(MockAdapter::succeeding(json!({})));
    let queue = queue_with(&env, adapter);

    let agents = storage::agents::AgentStore::new(env.pool.clone());
    let other_workspace = agents.create_workspace(&unique_email()).await.unwrap();

    let action = queue
        .create_action(env.workspace, None, "send_email", "gmail", json!({}), "", 0.0)
        .await
        .unwrap();

    // The foreign workspace sees a 404-equivalent, not a 403.
    assert!(queue.approve_and_execute(other_workspace, action.id).await.is_err());
    assert!(queue.reject_action(other_workspace, action.id).await.is_err());

    let stored = queue.get_action(env.workspace, action.id).await.unwrap().unwrap();
    assert_eq!(stored.status, "pending");
}
