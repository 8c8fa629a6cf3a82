//! # Warden Storage
//!
//! Relational persistence for every governed-runtime entity. One store
//! struct per concern, each wrapping a shared [`sqlx::PgPool`]. Schema
//! creation is idempotent (`CREATE TABLE IF NOT EXISTS`) and lives in
//! [`schema`], so tests and fresh deployments bootstrap with a single
//! call.
//!
//! Workspace scoping is enforced at the query level: every lookup that
//! crosses a trust boundary filters on `workspace_id`, and a miss is
//! indistinguishable from a foreign resource.

pub mod agents;
pub mod alerts;
pub mod api_keys;
pub mod approvals;
pub mod blueprints;
pub mod capabilities;
pub mod events;
pub mod governance_audit;
pub mod instances;
pub mod metrics;
pub mod pricing;
pub mod risk;
pub mod roles;
pub mod runs;
pub mod schema;
pub mod tiers;

pub use schema::initialize_schema;
