//! Shared test fixtures for the Warden workspace.
//!
//! Provides a single shared PostgreSQL testcontainer across all test
//! files. The fixture is lazily initialized once per test process and
//! cleaned up when the process exits. When Docker is unavailable the
//! fixture resolves to `None` and database-backed tests skip themselves.

mod fixtures;

pub use fixtures::*;
