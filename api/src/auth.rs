//! Request authentication helpers.
//!
//! The session layer in front of this service owns cookie auth; by the
//! time a request lands here it carries `x-workspace-id`. Ingest and
//! internal routes authenticate on their own headers.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use wd_core::types::WorkspaceId;

use crate::error::ApiError;
use crate::state::AppState;

/// The caller's workspace, from the session layer.
pub fn workspace_from_headers(headers: &HeaderMap) -> Result<WorkspaceId, ApiError> {
    headers
        .get("x-workspace-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<i64>().ok())
        .map(WorkspaceId::new)
        .ok_or_else(|| ApiError::unauthorized("Not authenticated"))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
}

/// Resolve an `obsk_` ingest key to its workspace.
pub async fn workspace_from_ingest_key(
    state: &AppState,
    headers: &HeaderMap
) -> Result<WorkspaceId, ApiError> {
    let token = bearer_token(headers)
        .ok_or_else(|| ApiError::unauthorized("Missing API key"))?;
    state
        .api_keys
        .authenticate(token)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::unauthorized("Invalid API key"))
}

/// Gate for the internal cron/admin endpoints. With no secret
/// configured, nothing gets in.
pub fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(secret) = &state.config.admin_secret else {
        return Err(ApiError::unauthorized("Admin access is not configured"));
    };
    match bearer_token(headers) {
        Some(token) if token == secret => Ok(()),
        _ => Err(ApiError::unauthorized("Invalid admin credentials"))
    }
}
