use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod actions;
pub mod alerts;
pub mod api_keys;
pub mod blueprints;
pub mod capabilities;
pub mod ingest;
pub mod instances;
pub mod internal;
pub mod risk_policies;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Blueprints
        .route(
            "/api/blueprints",
            get(blueprints::list_blueprints).post(blueprints::create_blueprint)
        )
        .route("/api/blueprints/migrate-workspace", post(instances::migrate_workspace))
        .route(
            "/api/blueprints/{id}",
            get(blueprints::get_blueprint).post(blueprints::update_blueprint)
        )
        .route("/api/blueprints/{id}/publish", post(blueprints::publish_blueprint))
        .route("/api/blueprints/{id}/archive", post(blueprints::archive_blueprint))
        .route("/api/blueprints/{id}/clone", post(blueprints::clone_blueprint))
        .route("/api/blueprints/{id}/versions", get(blueprints::list_versions))
        .route("/api/blueprints/{id}/versions/{version}", get(blueprints::get_version))
        // Capability bundles
        .route(
            "/api/capabilities",
            get(capabilities::list_bundles).post(capabilities::create_bundle)
        )
        .route(
            "/api/capabilities/{id}",
            get(capabilities::get_bundle)
                .post(capabilities::update_bundle)
                .delete(capabilities::delete_bundle)
        )
        // Agent instance binding
        .route("/api/agents/{id}/instantiate", post(instances::instantiate_agent))
        .route(
            "/api/agents/{id}/instance",
            get(instances::get_instance).delete(instances::remove_instance)
        )
        .route("/api/agents/{id}/instance/refresh", post(instances::refresh_instance))
        .route(
            "/api/agents/{id}/convert-to-blueprint",
            post(instances::convert_to_blueprint)
        )
        // Approval queue
        .route(
            "/api/agent-actions",
            post(actions::create_action)
        )
        .route("/api/agent-actions/pending", get(actions::pending_actions))
        .route("/api/agent-actions/{id}/approve", post(actions::approve_action))
        .route("/api/agent-actions/{id}/reject", post(actions::reject_action))
        // Risk policies
        .route(
            "/api/risk/policies",
            get(risk_policies::list_policies).post(risk_policies::upsert_policy)
        )
        .route("/api/risk/policies/{id}/enabled", post(risk_policies::set_policy_enabled))
        // Observability ingest keys
        .route("/api/obs/api-keys", post(api_keys::create_key))
        .route("/api/obs/api-keys/{id}", delete(api_keys::deactivate_key))
        // Observability ingest
        .route("/api/obs/ingest/events", post(ingest::ingest_events))
        .route("/api/obs/ingest/heartbeat", post(ingest::ingest_heartbeat))
        // Alert rules
        .route(
            "/api/obs/alerts/rules",
            get(alerts::list_rules).post(alerts::create_rule)
        )
        .route("/api/obs/alerts/rules/{id}", delete(alerts::delete_rule))
        // Cron / admin
        .route("/api/obs/internal/enforce-risk", post(internal::enforce_risk))
        .route("/api/obs/internal/retention-cleanup", post(internal::retention_cleanup))
        .route("/api/obs/internal/aggregate-daily", post(internal::aggregate_daily))
        .route("/api/obs/internal/evaluate-alerts", post(internal::evaluate_alerts))
        .route("/api/obs/internal/set-tier", post(internal::set_tier))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
