//! Alert rule evaluation.
//!
//! Three rule types:
//! - `cost_per_day` — today's cost sum against the threshold.
//! - `error_rate` — percentage of `run_finished` events with status
//!   error inside the trailing window. No runs means no alert.
//! - `no_heartbeat` — minutes since the last heartbeat; a workspace that
//!   has never sent one triggers immediately.
//!
//! Comparisons are strictly-greater; equality does not fire. Each rule
//! honors its cooldown via `last_triggered_at`.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use wd_core::traits::Notifier;
use wd_core::types::{AgentId, WorkspaceId};

use storage::alerts::{AlertRuleRecord, AlertStore};
use storage::events::EventStore;

pub struct AlertEvaluator {
    alerts: AlertStore,
    events: EventStore,
    notifier: Arc<dyn Notifier>
}

impl AlertEvaluator {
    pub fn new(pool: PgPool, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            alerts: AlertStore::new(pool.clone()),
            events: EventStore::new(pool),
            notifier
        }
    }

    /// Evaluate every enabled rule. Returns the number of alerts fired.
    /// Per-rule failures are logged and skipped.
    pub async fn evaluate_alerts(&self) -> Result<usize, sqlx::Error> {
        let rules = self.alerts.enabled_rules(None).await?;
        let now = Utc::now();
        let mut fired = 0;

        for rule in rules {
            if let Some(last) = rule.last_triggered_at {
                let cooldown_end = last + ChronoDuration::minutes(rule.cooldown_minutes);
                if now < cooldown_end {
                    continue;
                }
            }

            let metric_value = match self.evaluate_rule_metric(&rule).await {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("alert eval failed rule={}: {e}", rule.id);
                    continue;
                }
            };

            if metric_value > rule.threshold {
                if let Err(e) = self.fire(&rule, metric_value).await {
                    tracing::warn!("alert fire failed rule={}: {e}", rule.id);
                    continue;
                }
                fired += 1;
            }
        }

        Ok(fired)
    }

    async fn evaluate_rule_metric(
        &self,
        rule: &AlertRuleRecord
    ) -> Result<Option<Decimal>, sqlx::Error> {
        let workspace_id = WorkspaceId::new(rule.workspace_id);
        let agent_id = rule.agent_id.map(AgentId::new);
        let now = Utc::now();

        match rule.rule_type.as_str() {
            "cost_per_day" => {
                let day_start = now
                    .date_naive()
                    .and_hms_opt(0, 0, 0)
                    .expect("valid midnight")
                    .and_utc();
                let total = self
                    .events
                    .sum_cost_since(workspace_id, agent_id, day_start)
                    .await?;
                Ok(Some(total))
            }
            "error_rate" => {
                let window_start = now - ChronoDuration::minutes(rule.window_minutes);
                let statuses = self
                    .events
                    .finished_run_statuses_since(workspace_id, agent_id, window_start)
                    .await?;
                if statuses.is_empty() {
                    return Ok(None);
                }
                let errors = statuses.iter().filter(|s| s.as_str() == "error").count();
                let rate = Decimal::from(errors as i64) * Decimal::from(100)
                    / Decimal::from(statuses.len() as i64);
                Ok(Some(rate.round_dp(4)))
            }
            "no_heartbeat" => {
                match self.events.last_heartbeat(workspace_id, agent_id).await? {
                    Some(last) => {
                        let minutes = (now - last).num_seconds() as f64 / 60.0;
                        Ok(Decimal::try_from(minutes).ok().map(|d| d.round_dp(4)))
                    }
                    // Never seen a heartbeat: report just over the
                    // threshold so the rule fires.
                    None => Ok(Some(rule.threshold + Decimal::ONE))
                }
            }
            other => {
                tracing::warn!("unknown alert rule_type: {other}");
                Ok(None)
            }
        }
    }

    async fn fire(
        &self,
        rule: &AlertRuleRecord,
        metric_value: Decimal
    ) -> Result<(), sqlx::Error> {
        let message = build_alert_message(rule, metric_value);
        self.alerts
            .fire(rule, metric_value.round_dp(4), rule.threshold, &message)
            .await?;

        if let Err(e) = self
            .notifier
            .notify(WorkspaceId::new(rule.workspace_id), &message)
            .await
        {
            tracing::warn!("alert notification failed rule={}: {e}", rule.id);
        }
        Ok(())
    }
}

fn build_alert_message(rule: &AlertRuleRecord, metric_value: Decimal) -> String {
    let scope = match rule.agent_id {
        Some(agent) => format!(" (agent #{agent})"),
        None => String::new()
    };
    match rule.rule_type.as_str() {
        "cost_per_day" => format!(
            "Daily cost ${metric_value} exceeds ${} threshold{scope}",
            rule.threshold
        ),
        "error_rate" => format!(
            "Error rate {metric_value}% exceeds {}% threshold{scope}",
            rule.threshold
        ),
        "no_heartbeat" => format!(
            "No heartbeat for {metric_value} minutes (threshold {}){scope}",
            rule.threshold
        ),
        other => format!("Alert {other}: {metric_value} exceeds {}{scope}", rule.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rule(rule_type: &str, agent_id: Option<i64>) -> AlertRuleRecord {
        AlertRuleRecord {
            id: 1,
            workspace_id: 1,
            agent_id,
            rule_type: rule_type.to_string(),
            threshold: Decimal::from(10),
            window_minutes: 60,
            cooldown_minutes: 60,
            is_enabled: true,
            last_triggered_at: None,
            created_at: Utc::now()
        }
    }

    #[test]
    fn test_alert_messages() {
        let msg = build_alert_message(&rule("cost_per_day", None), Decimal::from(12));
        assert!(msg.contains("Daily cost $12"));
        assert!(msg.contains("$10 threshold"));

        let msg = build_alert_message(&rule("error_rate", Some(3)), Decimal::from(50));
        assert!(msg.contains("50%"));
        assert!(msg.contains("agent #3"));
    }
}
