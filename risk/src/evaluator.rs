//! Breach detection.
//!
//! For each enabled policy: cooldown check, metric evaluation, strict
//! threshold comparison (equality does not trigger), daily dedupe, then
//! a pending risk event carrying the policy's action at evaluation time
//! (a later action change never rewrites history).
//!
//! The evaluator only creates events. It never touches agents and never
//! writes the audit log.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use wd_core::types::{AgentId, WorkspaceId};

use storage::events::EventStore;
use storage::risk::{PolicyRecord, RiskStore};

pub struct RiskEvaluator {
    risk: RiskStore,
    events: EventStore
}

impl RiskEvaluator {
    pub fn new(pool: PgPool) -> Self {
        Self {
            risk: RiskStore::new(pool.clone()),
            events: EventStore::new(pool)
        }
    }

    /// Evaluate every enabled policy (optionally one workspace's).
    /// Returns the number of new pending events. Per-policy failures are
    /// logged and skipped.
    pub async fn evaluate_policies(
        &self,
        workspace_id: Option<WorkspaceId>
    ) -> Result<usize, sqlx::Error> {
        let policies = self.risk.enabled_policies(workspace_id).await?;
        let mut created = 0;

        for policy in policies {
            match self.process_policy(&policy).await {
                Ok(true) => created += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("risk evaluate failed policy={}: {e}", policy.id);
                }
            }
        }
        Ok(created)
    }

    /// Evaluate one policy. Returns true when a new event was created.
    async fn process_policy(&self, policy: &PolicyRecord) -> Result<bool, sqlx::Error> {
        let now = Utc::now();

        // 1. Cooldown: the most recent pending/executed event anchors
        // the window.
        if self.in_cooldown(policy, now).await? {
            return Ok(false);
        }

        // 2. Current metric value.
        let Some(metric_value) = self.evaluate_metric(policy, now).await? else {
            return Ok(false);
        };

        // 3. Strictly exceed; equality does not trigger.
        if metric_value <= policy.threshold_value {
            return Ok(false);
        }

        // 4. One event per policy per calendar day.
        let dedupe_key = build_dedupe_key(policy, now);
        if self.risk.dedupe_exists(&dedupe_key).await? {
            return Ok(false);
        }

        // 5. Pending event with the action copied in.
        self.risk
            .insert_event(policy, metric_value, policy.threshold_value, &dedupe_key, now)
            .await?;
        Ok(true)
    }

    async fn in_cooldown(
        &self,
        policy: &PolicyRecord,
        now: DateTime<Utc>
    ) -> Result<bool, sqlx::Error> {
        let Some(last) = self.risk.latest_active_event(policy.id).await? else {
            return Ok(false);
        };
        let cooldown_end = last.evaluated_at + ChronoDuration::minutes(policy.cooldown_minutes);
        Ok(now < cooldown_end)
    }

    /// Metric dispatch. `None` means no data or a policy type this
    /// version does not evaluate (error_rate_cap, token_rate_cap).
    async fn evaluate_metric(
        &self,
        policy: &PolicyRecord,
        now: DateTime<Utc>
    ) -> Result<Option<Decimal>, sqlx::Error> {
        match policy.policy_type.as_str() {
            "daily_spend_cap" => self.evaluate_daily_spend(policy, now).await.map(Some),
            _ => Ok(None)
        }
    }

    /// Cost since today's UTC midnight. A null agent scope aggregates
    /// the whole workspace.
    async fn evaluate_daily_spend(
        &self,
        policy: &PolicyRecord,
        now: DateTime<Utc>
    ) -> Result<Decimal, sqlx::Error> {
        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("valid midnight")
            .and_utc();
        self.events
            .sum_cost_since(
                WorkspaceId::new(policy.workspace_id),
                policy.agent_id.map(AgentId::new),
                day_start
            )
            .await
    }
}

/// `"{policy_id}:{YYYY-MM-DD}"` — one event per policy per day.
pub fn build_dedupe_key(policy: &PolicyRecord, now: DateTime<Utc>) -> String {
    format!("{}:{}", policy.id, now.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    #[test]
    fn test_dedupe_key_format() {
        let policy = PolicyRecord {
            id: Uuid::nil(),
            workspace_id: 1,
            agent_id: None,
            policy_type: "daily_spend_cap".to_string(),
            threshold_value: Decimal::from(10),
            action_type: "alert_only".to_string(),
            cooldown_minutes: 360,
            is_enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now()
        };
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap();
        assert_eq!(
            build_dedupe_key(&policy, now),
            "00000000-0000-0000-0000-000000000000:2026-03-14"
        );
    }
}
