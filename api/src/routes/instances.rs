use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;
use wd_core::types::AgentId;

use crate::auth::workspace_from_headers;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct InstantiateBody {
    pub blueprint_id: Uuid,
    pub version: i64,
    #[serde(default)]
    pub overrides: Option<Value>
}

pub async fn instantiate_agent(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(agent_id): Path<i64>,
    Json(body): Json<InstantiateBody>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let instance = state
        .binder
        .instantiate_agent(
            workspace,
            AgentId::new(agent_id),
            body.blueprint_id,
            body.version,
            body.overrides,
            None
        )
        .await?;
    Ok(Json(json!({ "success": true, "instance": instance })))
}

pub async fn get_instance(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(agent_id): Path<i64>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let instance = state
        .binder
        .get_agent_instance(AgentId::new(agent_id))
        .await?
        .filter(|i| i.workspace_id == workspace.as_i64())
        .ok_or_else(|| ApiError::not_found("Agent instance not found"))?;
    Ok(Json(json!({ "success": true, "instance": instance })))
}

#[derive(Deserialize, Default)]
pub struct RefreshBody {
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default)]
    pub overrides: Option<Value>
}

pub async fn refresh_instance(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(agent_id): Path<i64>,
    body: Option<Json<RefreshBody>>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let instance = state
        .binder
        .refresh_instance_policy(workspace, AgentId::new(agent_id), body.version, body.overrides)
        .await?;
    Ok(Json(json!({ "success": true, "instance": instance })))
}

pub async fn remove_instance(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(agent_id): Path<i64>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let removed = state
        .binder
        .remove_agent_instance(workspace, AgentId::new(agent_id))
        .await?;
    if !removed {
        return Err(ApiError::not_found("Agent instance not found"));
    }
    Ok(Json(json!({ "success": true })))
}

pub async fn convert_to_blueprint(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(agent_id): Path<i64>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let (blueprint, version, instance) = state
        .converter
        .generate_implicit_blueprint(workspace, AgentId::new(agent_id), None)
        .await?;
    Ok(Json(json!({
        "success": true,
        "blueprint": blueprint,
        "version": version,
        "instance": instance,
    })))
}

pub async fn migrate_workspace(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let results = state.converter.migrate_workspace_agents(workspace, None).await?;
    Ok(Json(json!({ "success": true, "results": results })))
}
