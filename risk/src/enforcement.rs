//! Enforcement worker — one evaluate-then-execute cycle under a time
//! budget.
//!
//! Never runs inside a tool call or request cycle; the cron endpoint is
//! the only trigger. Each phase is independently callable for tests and
//! partial runs, and each swallows its own failures so a bad cycle
//! reports zeros instead of propagating.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use sqlx::PgPool;
use wd_core::traits::Notifier;

use crate::evaluator::RiskEvaluator;
use crate::interventions::InterventionExecutor;

/// Default cycle budget in seconds.
pub const MAX_CYCLE_SECONDS: f64 = 45.0;

/// Reserve before starting the execution phase.
const EXECUTION_RESERVE_SECONDS: f64 = 2.0;

#[derive(Debug, Clone, Serialize)]
pub struct EnforcementSummary {
    pub events_created: usize,
    pub events_executed: usize,
    pub elapsed_seconds: f64,
    pub truncated: bool
}

pub struct EnforcementWorker {
    evaluator: RiskEvaluator,
    executor: InterventionExecutor
}

impl EnforcementWorker {
    pub fn new(pool: PgPool, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            evaluator: RiskEvaluator::new(pool.clone()),
            executor: InterventionExecutor::new(pool, notifier)
        }
    }

    /// One full cycle. The executor phase is skipped when less than two
    /// seconds of budget remain after evaluation.
    pub async fn run_enforcement_cycle(&self, max_seconds: Option<f64>) -> EnforcementSummary {
        let budget = max_seconds.unwrap_or(MAX_CYCLE_SECONDS);
        let start = Instant::now();

        let events_created = self.run_evaluation_only().await;

        let elapsed = start.elapsed().as_secs_f64();
        if budget - elapsed < EXECUTION_RESERVE_SECONDS {
            return EnforcementSummary {
                events_created,
                events_executed: 0,
                elapsed_seconds: round2(start.elapsed().as_secs_f64()),
                truncated: true
            };
        }

        let events_executed = self.run_execution_only().await;

        EnforcementSummary {
            events_created,
            events_executed,
            elapsed_seconds: round2(start.elapsed().as_secs_f64()),
            truncated: false
        }
    }

    /// Evaluator phase only.
    pub async fn run_evaluation_only(&self) -> usize {
        match self.evaluator.evaluate_policies(None).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("risk evaluation cycle failed: {e}");
                0
            }
        }
    }

    /// Executor phase only.
    pub async fn run_execution_only(&self) -> usize {
        match self.executor.execute_pending_events(None).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("risk execution cycle failed: {e}");
                0
            }
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
