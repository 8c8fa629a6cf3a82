//! Intervention executor.
//!
//! Drains pending risk events oldest-first (batch cap 50) and applies
//! the action each event carries. Every terminal transition commits
//! atomically with its audit row; a failure on one event is recorded and
//! the batch moves on.
//!
//! Capability check on re-read: a second worker observing the same
//! pending event loses the status guard inside the transaction and
//! writes nothing.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::{Value, json};
use sqlx::PgPool;
use wd_core::traits::Notifier;
use wd_core::types::{AgentId, RiskEventStatus, WorkspaceId};

use storage::agents::{AgentRecord, AgentStore};
use storage::risk::{AuditEntry, RiskEventRecord, RiskStore};

const DEFAULT_BATCH_SIZE: i64 = 50;

/// Cheaper model per provider when model_downgrade fires. Unknown
/// providers downgrade to the default target.
fn downgrade_target(provider: &str) -> &'static str {
    match provider {
        "openai" => "gpt-4o-mini",
        "anthropic" => "claude-haiku-4-5-20251001",
        "google" => "gemini-2.0-flash",
        _ => "gpt-4o-mini"
    }
}

pub struct InterventionExecutor {
    risk: RiskStore,
    agents: AgentStore,
    notifier: Arc<dyn Notifier>
}

impl InterventionExecutor {
    pub fn new(pool: PgPool, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            risk: RiskStore::new(pool.clone()),
            agents: AgentStore::new(pool),
            notifier
        }
    }

    /// Process pending events. Returns the count that reached
    /// `executed`.
    pub async fn execute_pending_events(
        &self,
        max_events: Option<i64>
    ) -> Result<usize, sqlx::Error> {
        let pending = self
            .risk
            .pending_events(max_events.unwrap_or(DEFAULT_BATCH_SIZE))
            .await?;

        let mut executed = 0;
        for event in pending {
            match self.process_event(&event).await {
                Ok(true) => executed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("risk executor failed event={}: {e}", event.id);
                    self.mark_failed(&event, &e.to_string()).await;
                }
            }
        }
        Ok(executed)
    }

    /// Apply one event's action. Returns true when the event reached
    /// `executed`.
    async fn process_event(&self, event: &RiskEventRecord) -> Result<bool, sqlx::Error> {
        // Guard against a duplicate worker having already processed it.
        let Some(current) = self.risk.get_event(event.id).await? else {
            return Ok(false);
        };
        if current.status != "pending" {
            return Ok(false);
        }

        match current.action_type.as_str() {
            "alert_only" => self.execute_alert_only(&current).await,
            "pause_agent" => self.execute_pause_agent(&current).await,
            "model_downgrade" => self.execute_model_downgrade(&current).await,
            "throttle" => {
                self.finalize(
                    &current,
                    RiskEventStatus::Skipped,
                    json!({"action": "throttle", "skipped": true, "reason": "not_implemented"}),
                    AuditEntry {
                        action_type: "throttle".to_string(),
                        previous_state: json!({}),
                        new_state: json!({}),
                        result: "skipped".to_string(),
                        error_message: Some("throttle is not implemented".to_string())
                    }
                )
                .await?;
                Ok(false)
            }
            other => {
                tracing::warn!("unknown action_type {other} on event {}", current.id);
                self.finalize(
                    &current,
                    RiskEventStatus::Skipped,
                    json!({"skipped": true, "reason": format!("unknown action_type: {other}")}),
                    AuditEntry {
                        action_type: other.to_string(),
                        previous_state: json!({}),
                        new_state: json!({}),
                        result: "skipped".to_string(),
                        error_message: Some(format!("Unknown action_type: {other}"))
                    }
                )
                .await?;
                Ok(false)
            }
        }
    }

    /// Notification only; agent state is untouched.
    async fn execute_alert_only(&self, event: &RiskEventRecord) -> Result<bool, sqlx::Error> {
        let mut message = format!(
            "[Risk Policy] {}: ${} exceeds ${} threshold",
            event.policy_type,
            format_money(event.breach_value),
            format_money(event.threshold_value)
        );
        if let Some(agent) = event.agent_id {
            message.push_str(&format!(" (agent #{agent})"));
        }

        let notification = match self
            .notifier
            .notify(WorkspaceId::new(event.workspace_id), &message)
            .await
        {
            Ok(()) => json!({"dispatched": true}),
            Err(e) => {
                tracing::warn!("risk notification failed event={}: {e}", event.id);
                json!({"dispatched": false, "error": e})
            }
        };

        self.finalize(
            event,
            RiskEventStatus::Executed,
            json!({"action": "alert_only", "notification": notification}),
            AuditEntry {
                action_type: "alert_only".to_string(),
                previous_state: json!({}),
                new_state: json!({}),
                result: "success".to_string(),
                error_message: None
            }
        )
        .await?;
        Ok(true)
    }

    async fn execute_pause_agent(&self, event: &RiskEventRecord) -> Result<bool, sqlx::Error> {
        let Some(agent_id) = event.agent_id else {
            self.finalize(
                event,
                RiskEventStatus::Skipped,
                json!({"action": "pause_agent", "skipped": true, "reason": "no agent_id"}),
                AuditEntry {
                    action_type: "pause_agent".to_string(),
                    previous_state: json!({}),
                    new_state: json!({}),
                    result: "skipped".to_string(),
                    error_message: Some(
                        "No agent_id on event; cannot pause workspace-wide".to_string()
                    )
                }
            )
            .await?;
            return Ok(false);
        };

        let workspace = WorkspaceId::new(event.workspace_id);
        let Some(agent) = self.agents.get(workspace, AgentId::new(agent_id)).await? else {
            self.finalize(
                event,
                RiskEventStatus::Failed,
                json!({"action": "pause_agent", "failed": true, "reason": "agent_not_found"}),
                AuditEntry {
                    action_type: "pause_agent".to_string(),
                    previous_state: json!({}),
                    new_state: json!({}),
                    result: "failed".to_string(),
                    error_message: Some("Agent not found".to_string())
                }
            )
            .await?;
            return Ok(false);
        };

        let previous_state = snapshot_agent(&agent);
        let Some(updated) = self
            .agents
            .set_active(workspace, AgentId::new(agent_id), false)
            .await?
        else {
            // Deleted between the read and the write.
            self.mark_failed(event, "Agent disappeared during pause").await;
            return Ok(false);
        };
        let new_state = snapshot_agent(&updated);

        self.finalize(
            event,
            RiskEventStatus::Executed,
            json!({
                "action": "pause_agent",
                "agent_id": agent_id,
                "was_active": agent.is_active,
            }),
            AuditEntry {
                action_type: "pause_agent".to_string(),
                previous_state,
                new_state,
                result: "success".to_string(),
                error_message: None
            }
        )
        .await?;
        Ok(true)
    }

    async fn execute_model_downgrade(&self, event: &RiskEventRecord) -> Result<bool, sqlx::Error> {
        let Some(agent_id) = event.agent_id else {
            self.finalize(
                event,
                RiskEventStatus::Skipped,
                json!({"action": "model_downgrade", "skipped": true, "reason": "no agent_id"}),
                AuditEntry {
                    action_type: "model_downgrade".to_string(),
                    previous_state: json!({}),
                    new_state: json!({}),
                    result: "skipped".to_string(),
                    error_message: Some(
                        "No agent_id on event; cannot downgrade workspace-wide".to_string()
                    )
                }
            )
            .await?;
            return Ok(false);
        };

        let workspace = WorkspaceId::new(event.workspace_id);
        let Some(agent) = self.agents.get(workspace, AgentId::new(agent_id)).await? else {
            self.finalize(
                event,
                RiskEventStatus::Failed,
                json!({"action": "model_downgrade", "failed": true, "reason": "agent_not_found"}),
                AuditEntry {
                    action_type: "model_downgrade".to_string(),
                    previous_state: json!({}),
                    new_state: json!({}),
                    result: "failed".to_string(),
                    error_message: Some("Agent not found".to_string())
                }
            )
            .await?;
            return Ok(false);
        };

        let provider = agent
            .llm_config
            .get("provider")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let current_model = agent
            .llm_config
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let target = downgrade_target(provider);

        if current_model == target {
            self.finalize(
                event,
                RiskEventStatus::Skipped,
                json!({
                    "action": "model_downgrade",
                    "skipped": true,
                    "reason": "already_on_target",
                    "model": target,
                }),
                AuditEntry {
                    action_type: "model_downgrade".to_string(),
                    previous_state: snapshot_agent(&agent),
                    new_state: snapshot_agent(&agent),
                    result: "skipped".to_string(),
                    error_message: Some(format!("Agent already on downgrade target {target}"))
                }
            )
            .await?;
            return Ok(false);
        }

        let previous_state = snapshot_agent(&agent);

        // Only the model key changes; every other llm_config field stays.
        let mut llm_config = agent.llm_config.clone();
        if let Some(map) = llm_config.as_object_mut() {
            map.insert("model".to_string(), Value::String(target.to_string()));
        }
        let Some(updated) = self
            .agents
            .update_llm_config(workspace, AgentId::new(agent_id), llm_config)
            .await?
        else {
            self.mark_failed(event, "Agent disappeared during downgrade").await;
            return Ok(false);
        };
        let new_state = snapshot_agent(&updated);

        self.finalize(
            event,
            RiskEventStatus::Executed,
            json!({
                "action": "model_downgrade",
                "agent_id": agent_id,
                "from_model": current_model,
                "to_model": target,
            }),
            AuditEntry {
                action_type: "model_downgrade".to_string(),
                previous_state,
                new_state,
                result: "success".to_string(),
                error_message: None
            }
        )
        .await?;
        Ok(true)
    }

    async fn finalize(
        &self,
        event: &RiskEventRecord,
        status: RiskEventStatus,
        execution_result: Value,
        audit: AuditEntry
    ) -> Result<(), sqlx::Error> {
        let applied = self
            .risk
            .finalize_event(event.id, status, execution_result, &audit)
            .await?;
        if !applied {
            tracing::debug!("event {} already finalized by another worker", event.id);
        }
        Ok(())
    }

    async fn mark_failed(&self, event: &RiskEventRecord, error: &str) {
        let result = self
            .risk
            .finalize_event(
                event.id,
                RiskEventStatus::Failed,
                json!({"failed": true, "error": error}),
                &AuditEntry {
                    action_type: event.action_type.clone(),
                    previous_state: json!({}),
                    new_state: json!({}),
                    result: "failed".to_string(),
                    error_message: Some(error.to_string())
                }
            )
            .await;
        if let Err(e) = result {
            tracing::warn!("failed to mark event {} as failed: {e}", event.id);
        }
    }
}

fn snapshot_agent(agent: &AgentRecord) -> Value {
    json!({
        "is_active": agent.is_active,
        "llm_config": agent.llm_config,
    })
}

fn format_money(value: Decimal) -> String {
    value.round_dp(4).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downgrade_targets() {
        assert_eq!(downgrade_target("openai"), "gpt-4o-mini");
        assert_eq!(downgrade_target("anthropic"), "claude-haiku-4-5-20251001");
        assert_eq!(downgrade_target("google"), "gemini-2.0-flash");
        assert_eq!(downgrade_target("mistral"), "gpt-4o-mini");
    }

    #[test]
    fn test_format_money_rounds_to_four_places() {
        assert_eq!(format_money(Decimal::new(123456789, 7)), "12.3457");
    }
}
