//! Blueprint catalog lifecycle.
//!
//! draft → published → archived. Draft metadata is mutable; every
//! publish appends an immutable version; archive is idempotent and
//! refuses drafts. Publishes are audited.

use std::str::FromStr;

use errors::IdentityError;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use wd_core::types::{BlueprintStatus, RoleType, WorkspaceId};

use crate::db_err;
use storage::blueprints::{BlueprintRecord, BlueprintStore, NewVersion, VersionRecord};
use storage::capabilities::{BundleRecord, CapabilityStore};
use storage::governance_audit::GovernanceAuditStore;

pub struct BlueprintCatalog {
    blueprints: BlueprintStore,
    capabilities: CapabilityStore,
    audit: GovernanceAuditStore
}

impl BlueprintCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            blueprints: BlueprintStore::new(pool.clone()),
            capabilities: CapabilityStore::new(pool.clone()),
            audit: GovernanceAuditStore::new(pool)
        }
    }

    pub async fn create_blueprint(
        &self,
        workspace_id: WorkspaceId,
        name: &str,
        role_type: &str,
        description: Option<&str>,
        created_by: Option<i64>
    ) -> Result<BlueprintRecord, IdentityError> {
        let role = RoleType::from_str(role_type)
            .map_err(|_| IdentityError::InvalidRoleType { role: role_type.to_string() })?;

        self.blueprints
            .insert(
                Uuid::new_v4(),
                workspace_id,
                name,
                description,
                &role.to_string(),
                &BlueprintStatus::Draft.to_string(),
                created_by
            )
            .await
            .map_err(db_err)
    }

    pub async fn get_blueprint(
        &self,
        workspace_id: WorkspaceId,
        blueprint_id: Uuid
    ) -> Result<Option<BlueprintRecord>, IdentityError> {
        self.blueprints.get(workspace_id, blueprint_id).await.map_err(db_err)
    }

    pub async fn list_blueprints(
        &self,
        workspace_id: WorkspaceId,
        status: Option<&str>,
        role_type: Option<&str>,
        limit: i64,
        offset: i64
    ) -> Result<Vec<BlueprintRecord>, IdentityError> {
        self.blueprints
            .list(workspace_id, status, role_type, limit, offset)
            .await
            .map_err(db_err)
    }

    pub async fn count_blueprints(
        &self,
        workspace_id: WorkspaceId
    ) -> Result<i64, IdentityError> {
        self.blueprints.count(workspace_id).await.map_err(db_err)
    }

    /// Update a draft's metadata (name, description, role_type only).
    pub async fn update_draft_blueprint(
        &self,
        workspace_id: WorkspaceId,
        blueprint_id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
        role_type: Option<&str>
    ) -> Result<BlueprintRecord, IdentityError> {
        if let Some(role) = role_type {
            RoleType::from_str(role)
                .map_err(|_| IdentityError::InvalidRoleType { role: role.to_string() })?;
        }

        let blueprint = self
            .require_blueprint(workspace_id, blueprint_id)
            .await?;
        if blueprint.status != BlueprintStatus::Draft.to_string() {
            return Err(IdentityError::NotDraft { status: blueprint.status });
        }

        self.blueprints
            .update_draft_fields(workspace_id, blueprint_id, name, description, role_type)
            .await
            .map_err(db_err)?
            .ok_or(IdentityError::NotDraft { status: "unknown".to_string() })
    }

    /// Publish a new immutable version. A draft transitions to
    /// published; an archived blueprint refuses. Capability references
    /// must all belong to the workspace or the publish aborts whole.
    pub async fn publish_blueprint(
        &self,
        workspace_id: WorkspaceId,
        blueprint_id: Uuid,
        fields: NewVersion,
        capability_ids: &[i64],
        published_by: Option<i64>
    ) -> Result<VersionRecord, IdentityError> {
        let blueprint = self.require_blueprint(workspace_id, blueprint_id).await?;
        if blueprint.status == BlueprintStatus::Archived.to_string() {
            return Err(IdentityError::PublishArchived);
        }

        // Validate capability attachments up front; the entire publish
        // aborts on the first foreign or missing id.
        let bundles = self
            .capabilities
            .get_many(workspace_id, capability_ids)
            .await
            .map_err(db_err)?;
        if bundles.len() != capability_ids.len() {
            let found: Vec<i64> = bundles.iter().map(|b| b.id).collect();
            let missing = capability_ids
                .iter()
                .find(|id| !found.contains(id))
                .copied()
                .unwrap_or_default();
            return Err(IdentityError::NotFound {
                resource: "CapabilityBundle",
                id: missing.to_string(),
                workspace_id: workspace_id.as_i64()
            });
        }

        let next_version = blueprint.latest_version + 1;
        let version = self
            .blueprints
            .publish_version(blueprint_id, next_version, &fields, capability_ids, published_by)
            .await
            .map_err(db_err)?;

        // Audit is best-effort; a failed write never blocks the publish.
        let details = json!({
            "blueprint_id": blueprint_id,
            "blueprint_name": blueprint.name,
            "version": next_version,
            "role_type": blueprint.role_type,
            "has_risk_profile": !version.default_risk_profile.as_object().map_or(true, |m| m.is_empty()),
            "capability_count": capability_ids.len(),
        });
        if let Err(e) = self
            .audit
            .log(workspace_id, "blueprint_published", details, None, published_by)
            .await
        {
            tracing::warn!("governance audit write failed for publish: {e}");
        }

        Ok(version)
    }

    /// Archive a published blueprint. Idempotent on already-archived;
    /// refuses drafts.
    pub async fn archive_blueprint(
        &self,
        workspace_id: WorkspaceId,
        blueprint_id: Uuid
    ) -> Result<BlueprintRecord, IdentityError> {
        let blueprint = self.require_blueprint(workspace_id, blueprint_id).await?;

        match blueprint.status.as_str() {
            "draft" => Err(IdentityError::ArchiveDraft),
            "archived" => Ok(blueprint),
            _ => self
                .blueprints
                .set_status(workspace_id, blueprint_id, "archived")
                .await
                .map_err(db_err)?
                .ok_or(IdentityError::NotFound {
                    resource: "Blueprint",
                    id: blueprint_id.to_string(),
                    workspace_id: workspace_id.as_i64()
                })
        }
    }

    /// Clone a blueprint version into a fresh draft. The returned draft
    /// has no versions; the caller publishes it with the source
    /// version's configuration.
    pub async fn clone_blueprint(
        &self,
        workspace_id: WorkspaceId,
        source_blueprint_id: Uuid,
        source_version: i64,
        name: Option<&str>,
        created_by: Option<i64>
    ) -> Result<(BlueprintRecord, VersionRecord), IdentityError> {
        let source = self.require_blueprint(workspace_id, source_blueprint_id).await?;
        let version = self
            .require_version(workspace_id, source_blueprint_id, source_version)
            .await?;

        let clone_name = match name {
            Some(n) => n.to_string(),
            None => format!("{} (Clone)", source.name)
        };

        let draft = self
            .blueprints
            .insert(
                Uuid::new_v4(),
                workspace_id,
                &clone_name,
                source.description.as_deref(),
                &source.role_type,
                "draft",
                created_by
            )
            .await
            .map_err(db_err)?;

        Ok((draft, version))
    }

    pub async fn get_blueprint_version(
        &self,
        workspace_id: WorkspaceId,
        blueprint_id: Uuid,
        version: i64
    ) -> Result<Option<VersionRecord>, IdentityError> {
        if self.blueprints.get(workspace_id, blueprint_id).await.map_err(db_err)?.is_none() {
            return Ok(None);
        }
        self.blueprints.get_version(blueprint_id, version).await.map_err(db_err)
    }

    pub async fn list_blueprint_versions(
        &self,
        workspace_id: WorkspaceId,
        blueprint_id: Uuid,
        limit: i64
    ) -> Result<Vec<VersionRecord>, IdentityError> {
        self.require_blueprint(workspace_id, blueprint_id).await?;
        self.blueprints.list_versions(blueprint_id, limit).await.map_err(db_err)
    }

    /// Bundles attached to a version, loaded for resolution.
    pub async fn bundles_for_version(
        &self,
        workspace_id: WorkspaceId,
        blueprint_id: Uuid,
        version: i64
    ) -> Result<Vec<BundleRecord>, IdentityError> {
        let ids = self
            .blueprints
            .capability_ids_for_version(blueprint_id, version)
            .await
            .map_err(db_err)?;
        self.capabilities.get_many(workspace_id, &ids).await.map_err(db_err)
    }

    async fn require_blueprint(
        &self,
        workspace_id: WorkspaceId,
        blueprint_id: Uuid
    ) -> Result<BlueprintRecord, IdentityError> {
        self.blueprints
            .get(workspace_id, blueprint_id)
            .await
            .map_err(db_err)?
            .ok_or(IdentityError::NotFound {
                resource: "Blueprint",
                id: blueprint_id.to_string(),
                workspace_id: workspace_id.as_i64()
            })
    }

    async fn require_version(
        &self,
        workspace_id: WorkspaceId,
        blueprint_id: Uuid,
        version: i64
    ) -> Result<VersionRecord, IdentityError> {
        self.get_blueprint_version(workspace_id, blueprint_id, version)
            .await?
            .ok_or(IdentityError::NotFound {
                resource: "BlueprintVersion",
                id: format!("{blueprint_id} v{version}"),
                workspace_id: workspace_id.as_i64()
            })
    }
}
