use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{Value, json};

use storage::capabilities::{CreateBundle, UpdateBundle};

use crate::auth::workspace_from_headers;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn list_bundles(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let bundles = state.bundles.list_bundles(workspace).await?;
    Ok(Json(json!({ "success": true, "capabilities": bundles })))
}

#[derive(Deserialize)]
pub struct CreateBundleBody {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub tool_set: Vec<String>,
    #[serde(default)]
    pub model_constraints: Option<Value>,
    #[serde(default)]
    pub risk_constraints: Option<Value>
}

pub async fn create_bundle(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBundleBody>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let bundle = state
        .bundles
        .create_bundle(CreateBundle {
            workspace_id: workspace,
            name: body.name,
            description: body.description,
            tool_set: body.tool_set,
            model_constraints: body.model_constraints.unwrap_or_else(|| json!({})),
            risk_constraints: body.risk_constraints.unwrap_or_else(|| json!({})),
            is_system: false
        })
        .await?;
    Ok(Json(json!({ "success": true, "capability": bundle })))
}

pub async fn get_bundle(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let bundle = state
        .bundles
        .get_bundle(workspace, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Capability bundle not found"))?;
    Ok(Json(json!({ "success": true, "capability": bundle })))
}

#[derive(Deserialize)]
pub struct UpdateBundleBody {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tool_set: Option<Vec<String>>,
    pub model_constraints: Option<Value>,
    pub risk_constraints: Option<Value>
}

pub async fn update_bundle(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<UpdateBundleBody>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let bundle = state
        .bundles
        .update_bundle(
            workspace,
            id,
            UpdateBundle {
                name: body.name,
                description: body.description.map(Some),
                tool_set: body.tool_set,
                model_constraints: body.model_constraints,
                risk_constraints: body.risk_constraints
            }
        )
        .await?;
    Ok(Json(json!({ "success": true, "capability": bundle })))
}

pub async fn delete_bundle(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let deleted = state.bundles.delete_bundle(workspace, id).await?;
    if !deleted {
        return Err(ApiError::not_found("Capability bundle not found"));
    }
    Ok(Json(json!({ "success": true })))
}
