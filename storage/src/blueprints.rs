//! Blueprint catalog rows: blueprints, their immutable versions, and the
//! version↔capability attachments.
//!
//! Versions are never updated after insert. Publishing is transactional:
//! the version row, its capability attachments, the `latest_version`
//! bump, and the draft→published transition commit together or not at
//! all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use wd_core::types::WorkspaceId;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BlueprintRecord {
    pub id: Uuid,
    pub workspace_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub role_type: String,
    pub status: String,
    pub latest_version: i64,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<i64>
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VersionRecord {
    pub blueprint_id: Uuid,
    pub version: i64,
    pub allowed_models: serde_json::Value,
    pub allowed_tools: serde_json::Value,
    pub default_risk_profile: serde_json::Value,
    pub hierarchy_defaults: Option<serde_json::Value>,
    pub memory_strategy: Option<serde_json::Value>,
    pub escalation_rules: Option<serde_json::Value>,
    pub llm_defaults: serde_json::Value,
    pub identity_defaults: serde_json::Value,
    pub override_policy: Option<serde_json::Value>,
    pub changelog: Option<String>,
    pub published_at: DateTime<Utc>,
    pub published_by: Option<i64>
}

impl VersionRecord {
    #[must_use]
    pub fn allowed_tools_vec(&self) -> Vec<String> {
        serde_json::from_value(self.allowed_tools.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn allowed_models_vec(&self) -> Vec<String> {
        serde_json::from_value(self.allowed_models.clone()).unwrap_or_default()
    }
}

/// Version payload supplied at publish time.
#[derive(Debug, Clone, Default)]
pub struct NewVersion {
    pub allowed_models: Vec<String>,
    pub allowed_tools: Vec<String>,
    pub default_risk_profile: serde_json::Value,
    pub hierarchy_defaults: Option<serde_json::Value>,
    pub memory_strategy: Option<serde_json::Value>,
    pub escalation_rules: Option<serde_json::Value>,
    pub llm_defaults: serde_json::Value,
    pub identity_defaults: serde_json::Value,
    pub override_policy: Option<serde_json::Value>,
    pub changelog: Option<String>
}

pub struct BlueprintStore {
    pool: PgPool
}

impl BlueprintStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        id: Uuid,
        workspace_id: WorkspaceId,
        name: &str,
        description: Option<&str>,
        role_type: &str,
        status: &str,
        created_by: Option<i64>
    ) -> Result<BlueprintRecord, sqlx::Error> {
        sqlx::query_as(
            "INSERT INTO blueprints (id, workspace_id, name, description, role_type, status, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING *"
        )
        .bind(id)
        .bind(workspace_id.as_i64())
        .bind(name)
        .bind(description)
        .bind(role_type)
        .bind(status)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get(
        &self,
        workspace_id: WorkspaceId,
        blueprint_id: Uuid
    ) -> Result<Option<BlueprintRecord>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM blueprints WHERE id = $1 AND workspace_id = $2")
            .bind(blueprint_id)
            .bind(workspace_id.as_i64())
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list(
        &self,
        workspace_id: WorkspaceId,
        status: Option<&str>,
        role_type: Option<&str>,
        limit: i64,
        offset: i64
    ) -> Result<Vec<BlueprintRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM blueprints
             WHERE workspace_id = $1
               AND ($2::TEXT IS NULL OR status = $2)
               AND ($3::TEXT IS NULL OR role_type = $3)
             ORDER BY created_at DESC
             LIMIT $4 OFFSET $5"
        )
        .bind(workspace_id.as_i64())
        .bind(status)
        .bind(role_type)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn count(&self, workspace_id: WorkspaceId) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM blueprints WHERE workspace_id = $1")
            .bind(workspace_id.as_i64())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Update draft metadata. Caller has verified the draft status; the
    /// WHERE clause re-checks it so a racing publish can't be overwritten.
    pub async fn update_draft_fields(
        &self,
        workspace_id: WorkspaceId,
        blueprint_id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
        role_type: Option<&str>
    ) -> Result<Option<BlueprintRecord>, sqlx::Error> {
        sqlx::query_as(
            "UPDATE blueprints SET
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                role_type = COALESCE($5, role_type)
             WHERE id = $1 AND workspace_id = $2 AND status = 'draft'
             RETURNING *"
        )
        .bind(blueprint_id)
        .bind(workspace_id.as_i64())
        .bind(name)
        .bind(description)
        .bind(role_type)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn set_status(
        &self,
        workspace_id: WorkspaceId,
        blueprint_id: Uuid,
        status: &str
    ) -> Result<Option<BlueprintRecord>, sqlx::Error> {
        sqlx::query_as(
            "UPDATE blueprints SET status = $3 WHERE id = $1 AND workspace_id = $2 RETURNING *"
        )
        .bind(blueprint_id)
        .bind(workspace_id.as_i64())
        .bind(status)
        .fetch_optional(&self.pool)
        .await
    }

    /// Write a new immutable version plus its capability attachments in
    /// one transaction, bump `latest_version`, and transition a draft
    /// blueprint to published. Capability ids must already be validated
    /// against the workspace.
    pub async fn publish_version(
        &self,
        blueprint_id: Uuid,
        version: i64,
        fields: &NewVersion,
        capability_ids: &[i64],
        published_by: Option<i64>
    ) -> Result<VersionRecord, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let record: VersionRecord = sqlx::query_as(
            "INSERT INTO blueprint_versions (
                blueprint_id, version, allowed_models, allowed_tools,
                default_risk_profile, hierarchy_defaults, memory_strategy,
                escalation_rules, llm_defaults, identity_defaults,
                override_policy, changelog, published_by
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *"
        )
        .bind(blueprint_id)
        .bind(version)
        .bind(serde_json::json!(fields.allowed_models))
        .bind(serde_json::json!(fields.allowed_tools))
        .bind(&fields.default_risk_profile)
        .bind(&fields.hierarchy_defaults)
        .bind(&fields.memory_strategy)
        .bind(&fields.escalation_rules)
        .bind(&fields.llm_defaults)
        .bind(&fields.identity_defaults)
        .bind(&fields.override_policy)
        .bind(&fields.changelog)
        .bind(published_by)
        .fetch_one(&mut *tx)
        .await?;

        for capability_id in capability_ids {
            sqlx::query(
                "INSERT INTO blueprint_capabilities (blueprint_id, version, capability_id)
                 VALUES ($1, $2, $3)"
            )
            .bind(blueprint_id)
            .bind(version)
            .bind(capability_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "UPDATE blueprints SET
                latest_version = $2,
                status = CASE WHEN status = 'draft' THEN 'published' ELSE status END
             WHERE id = $1"
        )
        .bind(blueprint_id)
        .bind(version)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    pub async fn get_version(
        &self,
        blueprint_id: Uuid,
        version: i64
    ) -> Result<Option<VersionRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM blueprint_versions WHERE blueprint_id = $1 AND version = $2"
        )
        .bind(blueprint_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn list_versions(
        &self,
        blueprint_id: Uuid,
        limit: i64
    ) -> Result<Vec<VersionRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM blueprint_versions WHERE blueprint_id = $1
             ORDER BY version DESC LIMIT $2"
        )
        .bind(blueprint_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Capability ids attached to a version, ascending.
    pub async fn capability_ids_for_version(
        &self,
        blueprint_id: Uuid,
        version: i64
    ) -> Result<Vec<i64>, sqlx::Error> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT capability_id FROM blueprint_capabilities
             WHERE blueprint_id = $1 AND version = $2
             ORDER BY capability_id"
        )
        .bind(blueprint_id)
        .bind(version)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
