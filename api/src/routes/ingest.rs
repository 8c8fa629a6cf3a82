use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use wd_core::types::{AgentId, EventRecord, EventStatus, EventType};

use crate::auth::workspace_from_ingest_key;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct IngestBody {
    pub events: Vec<Value>
}

/// Batch event ingestion, bounded by the workspace tier's max batch
/// size. Items are validated individually; the response reports
/// accepted and rejected counts.
pub async fn ingest_events(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<IngestBody>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_ingest_key(&state, &headers).await?;

    let max_batch = state
        .tiers
        .get_max_batch_size(workspace)
        .await
        .map_err(ApiError::internal)?;
    if body.events.len() as i64 > max_batch {
        return Err(ApiError::bad_request(format!(
            "Batch of {} events exceeds tier max batch size {max_batch}",
            body.events.len()
        )));
    }

    let outcome = state.observability.emit_batch(workspace, &body.events).await;
    Ok(Json(json!({
        "success": true,
        "accepted": outcome.accepted,
        "rejected": outcome.rejected,
    })))
}

#[derive(Deserialize)]
pub struct HeartbeatBody {
    #[serde(default)]
    pub agent_id: Option<i64>,
    #[serde(default)]
    pub payload: Option<Value>
}

pub async fn ingest_heartbeat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<HeartbeatBody>
) -> Result<Json<Value>, ApiError> {
    let workspace = workspace_from_ingest_key(&state, &headers).await?;

    let mut event = EventRecord::new(workspace, EventType::Heartbeat, EventStatus::Info);
    event.agent_id = body.agent_id.map(AgentId::new);
    event.payload = body.payload.unwrap_or_else(|| json!({}));
    state.observability.emit(event).await;

    Ok(Json(json!({ "success": true })))
}
