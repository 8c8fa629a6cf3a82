//! Retention cleanup — hard-delete events and runs past each workspace's
//! retention window.
//!
//! The cutoff is `now - retention_days - 24h`; the grace day keeps rows
//! around long enough for the daily aggregator to see them. Deletes run
//! in batches with a commit per batch, and the whole sweep stops early
//! when the time budget runs out. Workspaces fail independently.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use wd_core::types::WorkspaceId;

use crate::tiers::TierEnforcement;
use storage::events::EventStore;
use storage::runs::RunStore;

/// Extra time before deletion so aggregation catches up.
pub const GRACE_PERIOD_HOURS: i64 = 24;

const DEFAULT_BATCH_SIZE: i64 = 500;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RetentionCounts {
    pub events_deleted: u64,
    pub runs_deleted: u64
}

pub struct RetentionSweeper {
    events: EventStore,
    runs: RunStore,
    batch_size: i64
}

impl RetentionSweeper {
    pub fn new(pool: PgPool) -> Self {
        Self {
            events: EventStore::new(pool.clone()),
            runs: RunStore::new(pool),
            batch_size: DEFAULT_BATCH_SIZE
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sweep every workspace with events. Returns per-workspace delete
    /// counts; workspaces with nothing to delete are omitted.
    pub async fn cleanup_expired(
        &self,
        tiers: &TierEnforcement,
        max_seconds: u64
    ) -> Result<HashMap<i64, RetentionCounts>, sqlx::Error> {
        let start = Instant::now();
        let mut results = HashMap::new();

        let workspace_ids = self.events.workspaces_with_events().await?;

        for workspace_id in workspace_ids {
            if start.elapsed().as_secs() > max_seconds {
                break;
            }
            let workspace = WorkspaceId::new(workspace_id);

            let tier = match tiers.get_workspace_tier(workspace).await {
                Ok(tier) => tier,
                Err(e) => {
                    tracing::warn!("retention skipped workspace={workspace_id}: {e}");
                    continue;
                }
            };
            let cutoff = Utc::now()
                - ChronoDuration::days(tier.retention_days)
                - ChronoDuration::hours(GRACE_PERIOD_HOURS);

            let mut counts = RetentionCounts::default();

            loop {
                if start.elapsed().as_secs() > max_seconds {
                    break;
                }
                match self
                    .events
                    .delete_batch_before(workspace, cutoff, self.batch_size)
                    .await
                {
                    Ok(0) => break,
                    Ok(deleted) => counts.events_deleted += deleted,
                    Err(e) => {
                        tracing::warn!("event retention failed workspace={workspace_id}: {e}");
                        break;
                    }
                }
            }

            loop {
                if start.elapsed().as_secs() > max_seconds {
                    break;
                }
                match self
                    .runs
                    .delete_batch_before(workspace, cutoff, self.batch_size)
                    .await
                {
                    Ok(0) => break,
                    Ok(deleted) => counts.runs_deleted += deleted,
                    Err(e) => {
                        tracing::warn!("run retention failed workspace={workspace_id}: {e}");
                        break;
                    }
                }
            }

            if counts.events_deleted > 0 || counts.runs_deleted > 0 {
                results.insert(workspace_id, counts);
            }
        }

        Ok(results)
    }
}
