//! Capability bundles — named, workspace-scoped permission sets.
//!
//! System bundles (`is_system`) are seeded by the platform and refuse
//! updates. Names are unique per workspace; collisions are checked ahead
//! of the insert so the caller gets a conflict error, not a bare unique
//! violation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use wd_core::types::WorkspaceId;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BundleRecord {
    pub id: i64,
    pub workspace_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub tool_set: serde_json::Value,
    pub model_constraints: serde_json::Value,
    pub risk_constraints: serde_json::Value,
    pub is_system: bool,
    pub created_at: DateTime<Utc>
}

impl BundleRecord {
    /// The bundle's tool names as a vector (empty on malformed JSON).
    #[must_use]
    pub fn tools(&self) -> Vec<String> {
        serde_json::from_value(self.tool_set.clone()).unwrap_or_default()
    }

    /// `model_constraints.allowed_providers`, if present and non-empty.
    #[must_use]
    pub fn allowed_providers(&self) -> Option<Vec<String>> {
        let providers = self.model_constraints.get("allowed_providers")?;
        let parsed: Vec<String> = serde_json::from_value(providers.clone()).ok()?;
        if parsed.is_empty() { None } else { Some(parsed) }
    }
}

#[derive(Debug, Clone)]
pub struct CreateBundle {
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub description: Option<String>,
    pub tool_set: Vec<String>,
    pub model_constraints: serde_json::Value,
    pub risk_constraints: serde_json::Value,
    pub is_system: bool
}

#[derive(Debug, Clone, Default)]
pub struct UpdateBundle {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub tool_set: Option<Vec<String>>,
    pub model_constraints: Option<serde_json::Value>,
    pub risk_constraints: Option<serde_json::Value>
}

pub struct CapabilityStore {
    pool: PgPool
}

impl CapabilityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn name_exists(
        &self,
        workspace_id: WorkspaceId,
        name: &str
    ) -> Result<bool, sqlx::Error> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM capability_bundles WHERE workspace_id = $1 AND name = $2)"
        )
        .bind(workspace_id.as_i64())
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    pub async fn create(&self, bundle: &CreateBundle) -> Result<BundleRecord, sqlx::Error> {
        sqlx::query_as(
            "INSERT INTO capability_bundles (
                workspace_id, name, description, tool_set,
                model_constraints, risk_constraints, is_system
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *"
        )
        .bind(bundle.workspace_id.as_i64())
        .bind(&bundle.name)
        .bind(&bundle.description)
        .bind(serde_json::json!(bundle.tool_set))
        .bind(&bundle.model_constraints)
        .bind(&bundle.risk_constraints)
        .bind(bundle.is_system)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get(
        &self,
        workspace_id: WorkspaceId,
        bundle_id: i64
    ) -> Result<Option<BundleRecord>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM capability_bundles WHERE id = $1 AND workspace_id = $2")
            .bind(bundle_id)
            .bind(workspace_id.as_i64())
            .fetch_optional(&self.pool)
            .await
    }

    /// Fetch several bundles by id, workspace-scoped. A missing or
    /// foreign id is simply absent from the result; callers compare
    /// lengths to detect it.
    pub async fn get_many(
        &self,
        workspace_id: WorkspaceId,
        bundle_ids: &[i64]
    ) -> Result<Vec<BundleRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM capability_bundles
             WHERE workspace_id = $1 AND id = ANY($2)
             ORDER BY id"
        )
        .bind(workspace_id.as_i64())
        .bind(bundle_ids)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn list(&self, workspace_id: WorkspaceId) -> Result<Vec<BundleRecord>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM capability_bundles WHERE workspace_id = $1 ORDER BY name")
            .bind(workspace_id.as_i64())
            .fetch_all(&self.pool)
            .await
    }

    /// Apply a partial update. The caller has already rejected system
    /// bundles and name collisions.
    pub async fn update(
        &self,
        workspace_id: WorkspaceId,
        bundle_id: i64,
        update: &UpdateBundle
    ) -> Result<Option<BundleRecord>, sqlx::Error> {
        sqlx::query_as(
            "UPDATE capability_bundles SET
                name = COALESCE($3, name),
                description = CASE WHEN $4 THEN $5 ELSE description END,
                tool_set = COALESCE($6, tool_set),
                model_constraints = COALESCE($7, model_constraints),
                risk_constraints = COALESCE($8, risk_constraints)
             WHERE id = $1 AND workspace_id = $2
             RETURNING *"
        )
        .bind(bundle_id)
        .bind(workspace_id.as_i64())
        .bind(&update.name)
        .bind(update.description.is_some())
        .bind(update.description.clone().flatten())
        .bind(update.tool_set.as_ref().map(|t| serde_json::json!(t)))
        .bind(&update.model_constraints)
        .bind(&update.risk_constraints)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn delete(
        &self,
        workspace_id: WorkspaceId,
        bundle_id: i64
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM capability_bundles WHERE id = $1 AND workspace_id = $2")
                .bind(bundle_id)
                .bind(workspace_id.as_i64())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
