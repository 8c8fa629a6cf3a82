use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use storage::blueprints::NewVersion;

use crate::auth::workspace_from_headers;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub role_type: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64
}

fn default_limit() -> i64 {
    50
}

pub async fn list_blueprints(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let blueprints = state
        .catalog
        .list_blueprints(
            workspace,
            query.status.as_deref(),
            query.role_type.as_deref(),
            query.limit,
            query.offset
        )
        .await?;
    let total = state.catalog.count_blueprints(workspace).await?;
    Ok(Json(json!({ "success": true, "blueprints": blueprints, "total": total })))
}

#[derive(Deserialize)]
pub struct CreateBlueprintBody {
    pub name: String,
    #[serde(default = "default_role_type")]
    pub role_type: String,
    pub description: Option<String>
}

fn default_role_type() -> String {
    "worker".to_string()
}

pub async fn create_blueprint(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBlueprintBody>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let blueprint = state
        .catalog
        .create_blueprint(workspace, &body.name, &body.role_type, body.description.as_deref(), None)
        .await?;
    Ok(Json(json!({ "success": true, "blueprint": blueprint })))
}

pub async fn get_blueprint(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let blueprint = state
        .catalog
        .get_blueprint(workspace, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Blueprint not found"))?;
    Ok(Json(json!({ "success": true, "blueprint": blueprint })))
}

#[derive(Deserialize)]
pub struct UpdateBlueprintBody {
    pub name: Option<String>,
    pub description: Option<String>,
    pub role_type: Option<String>
}

pub async fn update_blueprint(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateBlueprintBody>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let blueprint = state
        .catalog
        .update_draft_blueprint(
            workspace,
            id,
            body.name.as_deref(),
            body.description.as_deref(),
            body.role_type.as_deref()
        )
        .await?;
    Ok(Json(json!({ "success": true, "blueprint": blueprint })))
}

#[derive(Deserialize, Default)]
pub struct PublishBody {
    #[serde(default)]
    pub allowed_models: Vec<String>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub default_risk_profile: Option<Value>,
    #[serde(default)]
    pub hierarchy_defaults: Option<Value>,
    #[serde(default)]
    pub memory_strategy: Option<Value>,
    #[serde(default)]
    pub escalation_rules: Option<Value>,
    #[serde(default)]
    pub llm_defaults: Option<Value>,
    #[serde(default)]
    pub identity_defaults: Option<Value>,
    #[serde(default)]
    pub override_policy: Option<Value>,
    #[serde(default)]
    pub changelog: Option<String>,
    #[serde(default)]
    pub capability_ids: Vec<i64>
}

pub async fn publish_blueprint(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<PublishBody>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let fields = NewVersion {
        allowed_models: body.allowed_models,
        allowed_tools: body.allowed_tools,
        default_risk_profile: body.default_risk_profile.unwrap_or_else(|| json!({})),
        hierarchy_defaults: body.hierarchy_defaults,
        memory_strategy: body.memory_strategy,
        escalation_rules: body.escalation_rules,
        llm_defaults: body.llm_defaults.unwrap_or_else(|| json!({})),
        identity_defaults: body.identity_defaults.unwrap_or_else(|| json!({})),
        override_policy: body.override_policy,
        changelog: body.changelog
    };
    let version = state
        .catalog
        .publish_blueprint(workspace, id, fields, &body.capability_ids, None)
        .await?;
    Ok(Json(json!({ "success": true, "version": version })))
}

pub async fn archive_blueprint(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let blueprint = state.catalog.archive_blueprint(workspace, id).await?;
    Ok(Json(json!({ "success": true, "blueprint": blueprint })))
}

#[derive(Deserialize)]
pub struct CloneBody {
    pub version: i64,
    pub name: Option<String>
}

pub async fn clone_blueprint(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<CloneBody>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let (draft, source_version) = state
        .catalog
        .clone_blueprint(workspace, id, body.version, body.name.as_deref(), None)
        .await?;
    Ok(Json(json!({
        "success": true,
        "blueprint": draft,
        "source_version": source_version,
    })))
}

#[derive(Deserialize)]
pub struct VersionsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64
}

pub async fn list_versions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Query(query): Query<VersionsQuery>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let versions = state
        .catalog
        .list_blueprint_versions(workspace, id, query.limit)
        .await?;
    Ok(Json(json!({ "success": true, "versions": versions })))
}

pub async fn get_version(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, version)): Path<(Uuid, i64)>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let record = state
        .catalog
        .get_blueprint_version(workspace, id, version)
        .await?
        .ok_or_else(|| ApiError::not_found("Blueprint version not found"))?;
    Ok(Json(json!({ "success": true, "version": record })))
}
