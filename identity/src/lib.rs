//! # Warden Identity
//!
//! Blueprints declare what an agent is permitted to do; versions freeze
//! that declaration; instances bind a live agent to one frozen version.
//!
//! - [`capabilities`] — deterministic capability resolution and override
//!   validation (pure functions).
//! - [`blueprints`] — the catalog lifecycle: draft → published →
//!   archived, immutable versions, cloning.
//! - [`instances`] — the binder: validates, snapshots policy, seeds risk
//!   policies and collaboration roles.
//! - [`compat`] — opt-in migration for legacy agents via implicit
//!   wildcard blueprints.

pub mod blueprints;
pub mod bundles;
pub mod capabilities;
pub mod compat;
pub mod instances;

pub use blueprints::BlueprintCatalog;
pub use bundles::CapabilityService;
pub use capabilities::{resolve_capabilities, validate_overrides};
pub use compat::{LegacyConverter, MigrationResult};
pub use instances::InstanceBinder;

/// Shorthand used across the crate to wrap storage failures.
pub(crate) fn db_err(e: sqlx::Error) -> errors::IdentityError {
    errors::IdentityError::Database { reason: e.to_string() }
}
