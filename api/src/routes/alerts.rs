use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use wd_core::types::AgentId;

use crate::auth::workspace_from_headers;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn list_rules(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let rules = state.alert_store.enabled_rules(Some(workspace)).await?;
    Ok(Json(json!({ "success": true, "rules": rules })))
}

#[derive(Deserialize)]
pub struct CreateRuleBody {
    pub rule_type: String,
    pub threshold: Decimal,
    #[serde(default)]
    pub agent_id: Option<i64>,
    #[serde(default = "default_window")]
    pub window_minutes: i64,
    #[serde(default = "default_cooldown")]
    pub cooldown_minutes: i64
}

fn default_window() -> i64 {
    60
}

fn default_cooldown() -> i64 {
    60
}

pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateRuleBody>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;

    if !matches!(body.rule_type.as_str(), "cost_per_day" | "error_rate" | "no_heartbeat") {
        return Err(ApiError::bad_request(format!(
            "Invalid rule_type: {}. Use: cost_per_day, error_rate, no_heartbeat",
            body.rule_type
        )));
    }

    // Tier limit applies before creation; at or above the limit denies.
    let (allowed, message) = state
        .tiers
        .check_alert_rule_limit(workspace)
        .await
        .map_err(ApiError::internal)?;
    if !allowed {
        return Err(ApiError::bad_request(message.unwrap_or_default()));
    }

    let rule = state
        .alert_store
        .create_rule(
            workspace,
            body.agent_id.map(AgentId::new),
            &body.rule_type,
            body.threshold,
            body.window_minutes,
            body.cooldown_minutes
        )
        .await?;
    Ok(Json(json!({ "success": true, "rule": rule })))
}

pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let deleted = state.alert_store.delete_rule(workspace, id).await?;
    if !deleted {
        return Err(ApiError::not_found("Alert rule not found"));
    }
    Ok(Json(json!({ "success": true })))
}
