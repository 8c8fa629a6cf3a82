//! # Warden API
//!
//! The REST surface over the governance core. Handlers stay thin: they
//! parse, delegate to a service crate, and shape the response. Success
//! payloads are `{"success": true, ...}`; errors are `{"error": "..."}`
//! with the status code carrying the kind (400 validation, 401
//! unauthenticated, 404 missing-or-foreign, 500 internal).
//!
//! Authentication at this boundary:
//! - Workspace routes: the session layer in front of this service
//!   resolves the user and passes `x-workspace-id`.
//! - Ingest routes: bearer keys with the `obsk_` prefix.
//! - Internal cron/admin routes: a shared-secret bearer token.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use state::AppState;
