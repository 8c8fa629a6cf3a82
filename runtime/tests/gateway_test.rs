//! Tool gateway behavior with injected collaborators — no database.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use adapters::observability::RecordingObservability;
use adapters::{AllowAllGovernance, DenyAllGovernance, StaticToolRegistry};
use runtime::{ExecutionContext, ToolGateway};
use wd_core::types::{AgentId, EventStatus, EventType, PolicySnapshot, WorkspaceId};

fn context_with_tools(tools: &[&str], models: &[&str]) -> ExecutionContext {
    let ctx = ExecutionContext {
        workspace_id: WorkspaceId::new(1),
        agent_id: AgentId::new(11),
        run_id: Uuid::new_v4(),
        created_at: Utc::now(),
        resolved_capabilities: None
    };
    ctx.with_capabilities(PolicySnapshot {
        allowed_tools: tools.iter().map(|s| s.to_string()).collect(),
        allowed_models: models.iter().map(|s| s.to_string()).collect(),
        risk_profile: json!({}),
        llm_defaults: json!({}),
        identity_defaults: json!({})
    })
}

fn legacy_context() -> ExecutionContext {
    ExecutionContext {
        workspace_id: WorkspaceId::new(1),
        agent_id: AgentId::new(11),
        run_id: Uuid::new_v4(),
        created_at: Utc::now(),
        resolved_capabilities: None
    }
}

struct Harness {
    gateway: ToolGateway,
    registry: Arc<StaticToolRegistry>,
    observability: Arc<RecordingObservability>
}

fn harness(ctx: ExecutionContext) -> Harness {
    let registry = Arc::new(StaticToolRegistry::new());
    registry.register("web_search", "search the web", json!({"ok": true}));
    registry.register("send_email", "send an email", json!({"sent": true}));

    let observability = Arc::new(RecordingObservability::new());
    let gateway = ToolGateway::new(
        ctx,
        registry.clone(),
        observability.clone(),
        Arc::new(AllowAllGovernance)
    );
    Harness { gateway, registry, observability }
}

#[tokio::test]
async fn test_capability_denial_never_reaches_the_tool() {
    let h = harness(context_with_tools(&["web_search"], &["openai"]));

    let result = h.gateway.execute("send_email", json!({})).await;

    assert_eq!(
        result["error"].as_str().unwrap(),
        "Tool 'send_email' is not in agent capabilities. Allowed tools: ['web_search']"
    );
    assert_eq!(result["governance"], json!(true));
    assert_eq!(result["capability_denied"], json!(true));

    // The underlying tool was never called.
    assert!(h.registry.recorded_calls().is_empty());

    // One tool_result event with status=error, no tool_call.
    let results = h.observability.events_of_type(EventType::ToolResult);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, EventStatus::Error);
    assert!(h.observability.events_of_type(EventType::ToolCall).is_empty());
}

#[tokio::test]
async fn test_allowed_tool_executes_and_emits_event_pair() {
    let h = harness(context_with_tools(&["web_search"], &["openai"]));

    let result = h.gateway.execute("web_search", json!({"q": "rust"})).await;
    assert_eq!(result, json!({"ok": true}));

    assert_eq!(h.registry.recorded_calls().len(), 1);

    let calls = h.observability.events_of_type(EventType::ToolCall);
    let results = h.observability.events_of_type(EventType::ToolResult);
    assert_eq!(calls.len(), 1);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, EventStatus::Success);

    // Events carry the session's full scope.
    let ctx = h.gateway.context();
    for event in calls.iter().chain(results.iter()) {
        assert_eq!(event.workspace_id, ctx.workspace_id);
        assert_eq!(event.agent_id, Some(ctx.agent_id));
        assert_eq!(event.run_id, Some(ctx.run_id));
    }
}

#[tokio::test]
async fn test_legacy_context_skips_capability_checks() {
    let h = harness(legacy_context());
    let result = h.gateway.execute("send_email", json!({})).await;
    assert_eq!(result, json!({"sent": true}));
}

#[tokio::test]
async fn test_tool_error_result_marks_event_error() {
    let h = harness(legacy_context());
    let result = h.gateway.execute("unknown_tool", json!({})).await;
    assert!(result["error"].as_str().unwrap().contains("Unknown tool"));

    let results = h.observability.events_of_type(EventType::ToolResult);
    assert_eq!(results[0].status, EventStatus::Error);
    assert_eq!(results[0].payload["has_error"], json!(true));
}

#[tokio::test]
async fn test_dispatch_failure_is_materialized() {
    let registry = Arc::new(StaticToolRegistry::new());
    registry.register_failing("flaky", "connection reset");

    let gateway = ToolGateway::new(
        legacy_context(),
        registry,
        Arc::new(RecordingObservability::new()),
        Arc::new(AllowAllGovernance)
    );

    let result = gateway.execute("flaky", json!({})).await;
    assert!(
        result["error"]
            .as_str()
            .unwrap()
            .starts_with("Tool execution failed:")
    );
}

#[tokio::test]
async fn test_governance_denial_blocks_execution() {
    let registry = Arc::new(StaticToolRegistry::new());
    registry.register("web_search", "", json!({"ok": true}));
    let observability = Arc::new(RecordingObservability::new());

    let gateway = ToolGateway::new(
        legacy_context(),
        registry.clone(),
        observability,
        Arc::new(DenyAllGovernance("Agent monitoring limit reached (2)".to_string()))
    );

    let result = gateway.execute("web_search", json!({})).await;
    assert!(
        result["error"]
            .as_str()
            .unwrap()
            .starts_with("Workspace limit reached:")
    );
    assert_eq!(result["governance"], json!(true));
    assert!(registry.recorded_calls().is_empty());
}

#[tokio::test]
async fn test_list_tools_filters_by_capability() {
    let h = harness(context_with_tools(&["web_search"], &[]));
    let tools = h.gateway.list_tools().await;
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["web_search"]);
}

#[tokio::test]
async fn test_check_model_allowed_prefix_matching() {
    let h = harness(context_with_tools(&["*"], &["openai"]));

    assert!(h.gateway.check_model_allowed("openai").0);
    assert!(h.gateway.check_model_allowed("openai/gpt-4o").0);

    let (allowed, message) = h.gateway.check_model_allowed("anthropic");
    assert!(!allowed);
    assert!(message.unwrap().contains("Allowed: ['openai']"));
}

#[tokio::test]
async fn test_wildcard_models_allow_everything() {
    let h = harness(context_with_tools(&["*"], &["*"]));
    assert!(h.gateway.check_model_allowed("anything/at-all").0);
}
