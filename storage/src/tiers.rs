//! Workspace tier rows and the built-in tier templates.
//!
//! A workspace with no row is on the `free` template. Billing writes
//! rows; the enforcement layer only reads them (through its cache).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use wd_core::types::WorkspaceId;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TierRecord {
    pub workspace_id: i64,
    pub tier_name: String,
    pub agent_limit: i64,
    pub retention_days: i64,
    pub alert_rule_limit: i64,
    pub health_history_days: i64,
    pub anomaly_detection_enabled: bool,
    pub slack_notifications_enabled: bool,
    pub multi_workspace_enabled: bool,
    pub priority_processing: bool,
    pub max_api_keys: i64,
    pub max_batch_size: i64,
    pub updated_at: Option<DateTime<Utc>>
}

impl TierRecord {
    /// The built-in template for a tier name. Unknown names fall back to
    /// the free template.
    #[must_use]
    pub fn template(tier_name: &str, workspace_id: WorkspaceId) -> Self {
        let base = Self {
            workspace_id: workspace_id.as_i64(),
            tier_name: "free".to_string(),
            agent_limit: 2,
            retention_days: 7,
            alert_rule_limit: 0,
            health_history_days: 0,
            anomaly_detection_enabled: false,
            slack_notifications_enabled: false,
            multi_workspace_enabled: false,
            priority_processing: false,
            max_api_keys: 1,
            max_batch_size: 100,
            updated_at: None
        };
        match tier_name {
            "production" => Self {
                tier_name: "production".to_string(),
                agent_limit: 10,
                retention_days: 30,
                alert_rule_limit: 3,
                health_history_days: 7,
                slack_notifications_enabled: true,
                max_api_keys: 3,
                max_batch_size: 500,
                ..base
            },
            "pro" => Self {
                tier_name: "pro".to_string(),
                agent_limit: 50,
                retention_days: 90,
                alert_rule_limit: 9999,
                health_history_days: 30,
                anomaly_detection_enabled: true,
                slack_notifications_enabled: true,
                priority_processing: true,
                max_api_keys: 10,
                max_batch_size: 1000,
                ..base
            },
            "agency" => Self {
                tier_name: "agency".to_string(),
                agent_limit: 9999,
                retention_days: 180,
                alert_rule_limit: 9999,
                health_history_days: 90,
                anomaly_detection_enabled: true,
                slack_notifications_enabled: true,
                multi_workspace_enabled: true,
                priority_processing: true,
                max_api_keys: 25,
                max_batch_size: 1000,
                ..base
            },
            _ => base
        }
    }

    pub fn tier_names() -> &'static [&'static str] {
        &["free", "production", "pro", "agency"]
    }
}

pub struct TierStore {
    pool: PgPool
}

impl TierStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(
        &self,
        workspace_id: WorkspaceId
    ) -> Result<Option<TierRecord>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM workspace_tiers WHERE workspace_id = $1")
            .bind(workspace_id.as_i64())
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn upsert(&self, record: &TierRecord) -> Result<TierRecord, sqlx::Error> {
        sqlx::query_as(
            "INSERT INTO workspace_tiers (
                workspace_id, tier_name, agent_limit, retention_days,
                alert_rule_limit, health_history_days,
                anomaly_detection_enabled, slack_notifications_enabled,
                multi_workspace_enabled, priority_processing,
                max_api_keys, max_batch_size, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW())
            ON CONFLICT (workspace_id) DO UPDATE SET
                tier_name = EXCLUDED.tier_name,
                agent_limit = EXCLUDED.agent_limit,
                retention_days = EXCLUDED.retention_days,
                alert_rule_limit = EXCLUDED.alert_rule_limit,
                health_history_days = EXCLUDED.health_history_days,
                anomaly_detection_enabled = EXCLUDED.anomaly_detection_enabled,
                slack_notifications_enabled = EXCLUDED.slack_notifications_enabled,
                multi_workspace_enabled = EXCLUDED.multi_workspace_enabled,
                priority_processing = EXCLUDED.priority_processing,
                max_api_keys = EXCLUDED.max_api_keys,
                max_batch_size = EXCLUDED.max_batch_size,
                updated_at = NOW()
            RETURNING *"
        )
        .bind(record.workspace_id)
        .bind(&record.tier_name)
        .bind(record.agent_limit)
        .bind(record.retention_days)
        .bind(record.alert_rule_limit)
        .bind(record.health_history_days)
        .bind(record.anomaly_detection_enabled)
        .bind(record.slack_notifications_enabled)
        .bind(record.multi_workspace_enabled)
        .bind(record.priority_processing)
        .bind(record.max_api_keys)
        .bind(record.max_batch_size)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn delete(&self, workspace_id: WorkspaceId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM workspace_tiers WHERE workspace_id = $1")
            .bind(workspace_id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_template_defaults() {
        let t = TierRecord::template("free", WorkspaceId::new(1));
        assert_eq!(t.agent_limit, 2);
        assert_eq!(t.retention_days, 7);
        assert_eq!(t.alert_rule_limit, 0);
        assert_eq!(t.health_history_days, 0);
        assert!(!t.anomaly_detection_enabled);
        assert!(!t.slack_notifications_enabled);
        assert_eq!(t.max_batch_size, 100);
    }

    #[test]
    fn test_production_template() {
        let t = TierRecord::template("production", WorkspaceId::new(1));
        assert_eq!(t.agent_limit, 10);
        assert_eq!(t.retention_days, 30);
        assert_eq!(t.alert_rule_limit, 3);
        assert_eq!(t.health_history_days, 7);
        assert!(t.slack_notifications_enabled);
    }

    #[test]
    fn test_pro_template() {
        let t = TierRecord::template("pro", WorkspaceId::new(1));
        assert_eq!(t.agent_limit, 50);
        assert_eq!(t.retention_days, 90);
        assert_eq!(t.alert_rule_limit, 9999);
        assert!(t.anomaly_detection_enabled);
    }

    #[test]
    fn test_agency_template() {
        let t = TierRecord::template("agency", WorkspaceId::new(1));
        assert_eq!(t.agent_limit, 9999);
        assert_eq!(t.retention_days, 180);
        assert!(t.multi_workspace_enabled);
        assert!(t.priority_processing);
    }

    #[test]
    fn test_unknown_tier_falls_back_to_free() {
        let t = TierRecord::template("platinum", WorkspaceId::new(1));
        assert_eq!(t.tier_name, "free");
        assert_eq!(t.agent_limit, 2);
    }
}
