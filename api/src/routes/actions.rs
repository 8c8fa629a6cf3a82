use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use wd_core::types::AgentId;

use crate::auth::workspace_from_headers;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateActionBody {
    pub action_type: String,
    pub service_type: String,
    pub action_data: Value,
    #[serde(default)]
    pub agent_id: Option<i64>,
    #[serde(default)]
    pub ai_reasoning: String,
    #[serde(default)]
    pub ai_confidence: f64
}

pub async fn create_action(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateActionBody>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let action = state
        .approvals
        .create_action(
            workspace,
            body.agent_id.map(AgentId::new),
            &body.action_type,
            &body.service_type,
            body.action_data,
            &body.ai_reasoning,
            body.ai_confidence
        )
        .await?;
    Ok(Json(json!({ "success": true, "action": action })))
}

pub async fn pending_actions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let actions = state.approvals.get_pending_actions(workspace).await?;
    Ok(Json(json!({ "success": true, "actions": actions })))
}

pub async fn approve_action(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let action = state.approvals.approve_and_execute(workspace, id).await?;
    Ok(Json(json!({ "success": true, "action": action })))
}

pub async fn reject_action(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    state.approvals.reject_action(workspace, id).await?;
    Ok(Json(json!({ "success": true, "message": "Action rejected" })))
}
