use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;
use wd_core::types::AgentId;

use crate::auth::workspace_from_headers;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn list_policies(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let policies = state.policies.enabled_policies(Some(workspace)).await?;
    Ok(Json(json!({ "success": true, "policies": policies })))
}

#[derive(Deserialize)]
pub struct UpsertPolicyBody {
    pub policy_type: String,
    pub threshold_value: Decimal,
    #[serde(default)]
    pub agent_id: Option<i64>,
    #[serde(default = "default_action")]
    pub action_type: String,
    #[serde(default = "default_cooldown")]
    pub cooldown_minutes: i64,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool
}

fn default_action() -> String {
    "alert_only".to_string()
}

fn default_cooldown() -> i64 {
    360
}

fn default_enabled() -> bool {
    true
}

pub async fn upsert_policy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<UpsertPolicyBody>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let policy = state
        .policies
        .upsert_policy(
            workspace,
            body.agent_id.map(AgentId::new),
            &body.policy_type,
            body.threshold_value,
            &body.action_type,
            body.cooldown_minutes,
            body.is_enabled
        )
        .await?;
    Ok(Json(json!({ "success": true, "policy": policy })))
}

#[derive(Deserialize)]
pub struct SetEnabledBody {
    pub is_enabled: bool
}

pub async fn set_policy_enabled(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<SetEnabledBody>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    state.policies.set_enabled(workspace, id, body.is_enabled).await?;
    Ok(Json(json!({ "success": true })))
}
