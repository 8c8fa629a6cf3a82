//! Cron/admin endpoints. Never called from request cycles; a scheduler
//! hits these with the shared secret.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use wd_core::types::WorkspaceId;

use storage::tiers::TierRecord;

use crate::auth::require_admin;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize, Default)]
pub struct EnforceBody {
    #[serde(default)]
    pub max_seconds: Option<f64>
}

pub async fn enforce_risk(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<EnforceBody>>
) -> Result<Json<Value>, ApiError> {
    require_admin(&state, &headers)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let summary = state.enforcement.run_enforcement_cycle(body.max_seconds).await;
    Ok(Json(json!({ "success": true, "summary": summary })))
}

#[derive(Deserialize, Default)]
pub struct RetentionBody {
    #[serde(default = "default_retention_budget")]
    pub max_seconds: u64
}

fn default_retention_budget() -> u64 {
    50
}

impl RetentionBody {
    fn budget(&self) -> u64 {
        self.max_seconds
    }
}

pub async fn retention_cleanup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<RetentionBody>>
) -> Result<Json<Value>, ApiError> {
    require_admin(&state, &headers)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let results = state
        .retention
        .cleanup_expired(&state.tiers, body.budget())
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "success": true, "results": results })))
}

#[derive(Deserialize, Default)]
pub struct AggregateBody {
    #[serde(default)]
    pub date: Option<chrono::NaiveDate>
}

pub async fn aggregate_daily(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<AggregateBody>>
) -> Result<Json<Value>, ApiError> {
    require_admin(&state, &headers)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let target = body.date.unwrap_or_else(|| chrono::Utc::now().date_naive());
    let upserted = state
        .aggregator
        .aggregate_daily(target)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "success": true, "date": target, "rows": upserted })))
}

pub async fn evaluate_alerts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap
) -> Result<Json<Value>, ApiError> {
    require_admin(&state, &headers)?;
    let fired = state
        .alert_evaluator
        .evaluate_alerts()
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "success": true, "alerts_fired": fired })))
}

#[derive(Deserialize)]
pub struct SetTierBody {
    pub workspace_id: i64,
    pub tier_name: String
}

/// Billing hook: assign a tier template to a workspace and invalidate
/// the enforcement cache so the next check observes it.
pub async fn set_tier(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SetTierBody>
) -> Result<Json<Value>, ApiError> {
    require_admin(&state, &headers)?;

    if !TierRecord::tier_names().contains(&body.tier_name.as_str()) {
        return Err(ApiError::bad_request(format!(
            "Unknown tier: {}. Use: {:?}",
            body.tier_name,
            TierRecord::tier_names()
        )));
    }

    let workspace = WorkspaceId::new(body.workspace_id);
    let record = TierRecord::template(&body.tier_name, workspace);
    let stored = state.tier_store.upsert(&record).await?;
    state.tiers.invalidate(Some(workspace));

    Ok(Json(json!({ "success": true, "tier": stored })))
}
