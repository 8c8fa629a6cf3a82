//! # Warden Observability
//!
//! The service layer over the event store:
//! - [`ingest`] — event emission with cost attribution, batch ingestion,
//!   and run tracking. Emission is best-effort end to end.
//! - [`tiers`] — cached workspace tier lookup and the limit predicates
//!   every governance gate consults.
//! - [`aggregate`] — idempotent daily rollups.
//! - [`alerts`] — threshold alert evaluation with cooldowns.
//! - [`retention`] — per-workspace hard-delete of expired events and runs
//!   under a time budget.

pub mod aggregate;
pub mod alerts;
pub mod ingest;
pub mod retention;
pub mod tiers;

pub use aggregate::DailyAggregator;
pub use alerts::AlertEvaluator;
pub use ingest::{BatchOutcome, ObservabilityService, RejectedEvent};
pub use retention::{RetentionCounts, RetentionSweeper, GRACE_PERIOD_HOURS};
pub use tiers::{LimitCheck, TierEnforcement, TIER_CACHE_TTL_SECS};
