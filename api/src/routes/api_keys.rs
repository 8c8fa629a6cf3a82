use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::workspace_from_headers;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateKeyBody {
    pub name: String
}

/// Create an ingest key. The raw token appears once in this response
/// and is never recoverable afterwards.
pub async fn create_key(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateKeyBody>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;

    let (allowed, message) = state
        .tiers
        .check_api_key_limit(workspace)
        .await
        .map_err(ApiError::internal)?;
    if !allowed {
        return Err(ApiError::bad_request(message.unwrap_or_default()));
    }

    let (record, token) = state.api_keys.create(workspace, &body.name).await?;
    Ok(Json(json!({ "success": true, "key": record, "token": token })))
}

pub async fn deactivate_key(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_headers(&headers)?;
    let deactivated = state.api_keys.deactivate(workspace, id).await?;
    if !deactivated {
        return Err(ApiError::not_found("API key not found"));
    }
    Ok(Json(json!({ "success": true })))
}
