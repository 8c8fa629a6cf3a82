//! Capability bundle CRUD rules.
//!
//! Names are unique per workspace; system bundles refuse every update.

use errors::IdentityError;
use sqlx::PgPool;
use wd_core::types::WorkspaceId;

use crate::db_err;
use storage::capabilities::{BundleRecord, CapabilityStore, CreateBundle, UpdateBundle};

pub struct CapabilityService {
    store: CapabilityStore
}

impl CapabilityService {
    pub fn new(pool: PgPool) -> Self {
        Self { store: CapabilityStore::new(pool) }
    }

    pub async fn create_bundle(&self, bundle: CreateBundle) -> Result<BundleRecord, IdentityError> {
        if self
            .store
            .name_exists(bundle.workspace_id, &bundle.name)
            .await
            .map_err(db_err)?
        {
            return Err(IdentityError::BundleNameConflict {
                name: bundle.name.clone(),
                workspace_id: bundle.workspace_id.as_i64()
            });
        }
        self.store.create(&bundle).await.map_err(db_err)
    }

    pub async fn get_bundle(
        &self,
        workspace_id: WorkspaceId,
        bundle_id: i64
    ) -> Result<Option<BundleRecord>, IdentityError> {
        self.store.get(workspace_id, bundle_id).await.map_err(db_err)
    }

    pub async fn list_bundles(
        &self,
        workspace_id: WorkspaceId
    ) -> Result<Vec<BundleRecord>, IdentityError> {
        self.store.list(workspace_id).await.map_err(db_err)
    }

    /// Partial update. Refuses system bundles and renames onto an
    /// existing name.
    pub async fn update_bundle(
        &self,
        workspace_id: WorkspaceId,
        bundle_id: i64,
        update: UpdateBundle
    ) -> Result<BundleRecord, IdentityError> {
        let existing = self
            .store
            .get(workspace_id, bundle_id)
            .await
            .map_err(db_err)?
            .ok_or(IdentityError::NotFound {
                resource: "CapabilityBundle",
                id: bundle_id.to_string(),
                workspace_id: workspace_id.as_i64()
            })?;

        if existing.is_system {
            return Err(IdentityError::SystemBundleImmutable);
        }

        if let Some(new_name) = &update.name {
            if *new_name != existing.name
                && self
                    .store
                    .name_exists(workspace_id, new_name)
                    .await
                    .map_err(db_err)?
            {
                return Err(IdentityError::BundleNameConflict {
                    name: new_name.clone(),
                    workspace_id: workspace_id.as_i64()
                });
            }
        }

        self.store
            .update(workspace_id, bundle_id, &update)
            .await
            .map_err(db_err)?
            .ok_or(IdentityError::NotFound {
                resource: "CapabilityBundle",
                id: bundle_id.to_string(),
                workspace_id: workspace_id.as_i64()
            })
    }

    pub async fn delete_bundle(
        &self,
        workspace_id: WorkspaceId,
        bundle_id: i64
    ) -> Result<bool, IdentityError> {
        let existing = self.store.get(workspace_id, bundle_id).await.map_err(db_err)?;
        match existing {
            Some(bundle) if bundle.is_system => Err(IdentityError::SystemBundleImmutable),
            Some(_) => self.store.delete(workspace_id, bundle_id).await.map_err(db_err),
            None => Ok(false)
        }
    }
}
