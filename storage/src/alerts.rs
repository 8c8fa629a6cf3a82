//! Alert rules and fired-alert records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use wd_core::types::{AgentId, WorkspaceId};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AlertRuleRecord {
    pub id: i64,
    pub workspace_id: i64,
    pub agent_id: Option<i64>,
    pub rule_type: String,
    pub threshold: Decimal,
    pub window_minutes: i64,
    pub cooldown_minutes: i64,
    pub is_enabled: bool,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AlertEventRecord {
    pub id: i64,
    pub rule_id: i64,
    pub workspace_id: i64,
    pub agent_id: Option<i64>,
    pub rule_type: String,
    pub metric_value: Decimal,
    pub threshold_value: Decimal,
    pub message: String,
    pub created_at: DateTime<Utc>
}

pub struct AlertStore {
    pool: PgPool
}

impl AlertStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_rule(
        &self,
        workspace_id: WorkspaceId,
        agent_id: Option<AgentId>,
        rule_type: &str,
        threshold: Decimal,
        window_minutes: i64,
        cooldown_minutes: i64
    ) -> Result<AlertRuleRecord, sqlx::Error> {
        sqlx::query_as(
            "INSERT INTO obs_alert_rules (
                workspace_id, agent_id, rule_type, threshold,
                window_minutes, cooldown_minutes
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *"
        )
        .bind(workspace_id.as_i64())
        .bind(agent_id.map(AgentId::as_i64))
        .bind(rule_type)
        .bind(threshold)
        .bind(window_minutes)
        .bind(cooldown_minutes)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn count_rules(&self, workspace_id: WorkspaceId) -> Result<i64, sqlx::Error> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM obs_alert_rules WHERE workspace_id = $1")
                .bind(workspace_id.as_i64())
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    pub async fn enabled_rules(
        &self,
        workspace_id: Option<WorkspaceId>
    ) -> Result<Vec<AlertRuleRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM obs_alert_rules
             WHERE is_enabled AND ($1::BIGINT IS NULL OR workspace_id = $1)
             ORDER BY id"
        )
        .bind(workspace_id.map(WorkspaceId::as_i64))
        .fetch_all(&self.pool)
        .await
    }

    pub async fn delete_rule(
        &self,
        workspace_id: WorkspaceId,
        rule_id: i64
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM obs_alert_rules WHERE id = $1 AND workspace_id = $2")
            .bind(rule_id)
            .bind(workspace_id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a fired alert and stamp the rule's trigger time together.
    pub async fn fire(
        &self,
        rule: &AlertRuleRecord,
        metric_value: Decimal,
        threshold_value: Decimal,
        message: &str
    ) -> Result<AlertEventRecord, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let event: AlertEventRecord = sqlx::query_as(
            "INSERT INTO obs_alert_events (
                rule_id, workspace_id, agent_id, rule_type,
                metric_value, threshold_value, message
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *"
        )
        .bind(rule.id)
        .bind(rule.workspace_id)
        .bind(rule.agent_id)
        .bind(&rule.rule_type)
        .bind(metric_value)
        .bind(threshold_value)
        .bind(message)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE obs_alert_rules SET last_triggered_at = NOW() WHERE id = $1")
            .bind(rule.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(event)
    }

    pub async fn alert_events(
        &self,
        workspace_id: WorkspaceId,
        limit: i64
    ) -> Result<Vec<AlertEventRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM obs_alert_events WHERE workspace_id = $1
             ORDER BY created_at DESC LIMIT $2"
        )
        .bind(workspace_id.as_i64())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}
