//! The agent instance binder.
//!
//! Binding an agent to a blueprint version validates ownership and
//! lifecycle state, freezes the resolved capability snapshot, and seeds
//! runtime artefacts: risk policies from the version's risk profile and
//! a collaboration role from its hierarchy defaults. Removal deletes the
//! binding only — seeded policies and roles are stateful and stay.

use std::str::FromStr;

use errors::IdentityError;
use serde_json::{Value, json};
use sqlx::PgPool;
use uuid::Uuid;
use wd_core::types::{AgentId, CollabRole, PolicyAction, PolicyType, RoleType, WorkspaceId};

use crate::capabilities::{resolve_capabilities, validate_overrides, value_as_decimal};
use crate::db_err;
use storage::agents::AgentStore;
use storage::blueprints::{BlueprintStore, VersionRecord};
use storage::capabilities::CapabilityStore;
use storage::governance_audit::GovernanceAuditStore;
use storage::instances::{InstanceRecord, InstanceStore};
use storage::risk::RiskStore;
use storage::roles::RoleStore;

const DEFAULT_COOLDOWN_MINUTES: i64 = 360;

pub struct InstanceBinder {
    agents: AgentStore,
    blueprints: BlueprintStore,
    capabilities: CapabilityStore,
    instances: InstanceStore,
    risk: RiskStore,
    roles: RoleStore,
    audit: GovernanceAuditStore
}

impl InstanceBinder {
    pub fn new(pool: PgPool) -> Self {
        Self {
            agents: AgentStore::new(pool.clone()),
            blueprints: BlueprintStore::new(pool.clone()),
            capabilities: CapabilityStore::new(pool.clone()),
            instances: InstanceStore::new(pool.clone()),
            risk: RiskStore::new(pool.clone()),
            roles: RoleStore::new(pool.clone()),
            audit: GovernanceAuditStore::new(pool)
        }
    }

    /// Bind an agent to a published blueprint version.
    pub async fn instantiate_agent(
        &self,
        workspace_id: WorkspaceId,
        agent_id: AgentId,
        blueprint_id: Uuid,
        version: i64,
        overrides: Option<Value>,
        instantiated_by: Option<i64>
    ) -> Result<InstanceRecord, IdentityError> {
        // 1. The agent must belong to the workspace.
        self.agents
            .get(workspace_id, agent_id)
            .await
            .map_err(db_err)?
            .ok_or(IdentityError::NotFound {
                resource: "Agent",
                id: agent_id.to_string(),
                workspace_id: workspace_id.as_i64()
            })?;

        // 2. At most one binding per agent.
        if let Some(existing) = self.instances.get(agent_id).await.map_err(db_err)? {
            return Err(IdentityError::AlreadyInstantiated {
                agent_id: agent_id.as_i64(),
                blueprint_id: existing.blueprint_id.to_string(),
                version: existing.blueprint_version
            });
        }

        // 3. The blueprint must be published.
        let blueprint = self
            .blueprints
            .get(workspace_id, blueprint_id)
            .await
            .map_err(db_err)?
            .ok_or(IdentityError::NotFound {
                resource: "Blueprint",
                id: blueprint_id.to_string(),
                workspace_id: workspace_id.as_i64()
            })?;
        if blueprint.status != "published" {
            return Err(IdentityError::NotPublished {
                blueprint_id: blueprint_id.to_string(),
                status: blueprint.status
            });
        }

        // 4. The version must exist.
        let version_record = self.require_version(workspace_id, blueprint_id, version).await?;

        // 5. Overrides must pass the version's override policy.
        if let Some(ov) = &overrides {
            let (valid, error) =
                validate_overrides(Some(ov), version_record.override_policy.as_ref());
            if !valid {
                return Err(IdentityError::OverrideDenied {
                    reason: error.unwrap_or_default()
                });
            }
        }

        // 6. Freeze the resolved capability set.
        let snapshot = self.resolve_snapshot(workspace_id, &version_record).await?;
        let snapshot_json =
            serde_json::to_value(&snapshot).map_err(|e| IdentityError::Database {
                reason: e.to_string()
            })?;

        let instance = self
            .instances
            .insert(
                agent_id,
                workspace_id,
                blueprint_id,
                version,
                overrides.clone(),
                snapshot_json,
                instantiated_by
            )
            .await
            .map_err(db_err)?;

        // 7-8. Seed risk policies and the collaboration role.
        self.seed_risk_policies(workspace_id, agent_id, &version_record.default_risk_profile)
            .await?;
        self.seed_agent_role(
            workspace_id,
            agent_id,
            version_record.hierarchy_defaults.as_ref(),
            &blueprint.role_type
        )
        .await?;

        // 9. Governance audit trail, best-effort.
        self.log_instance_event(
            workspace_id,
            agent_id,
            "instance_created",
            json!({
                "blueprint_id": blueprint_id,
                "blueprint_version": version,
                "has_overrides": overrides.is_some(),
            }),
            instantiated_by
        )
        .await;

        Ok(instance)
    }

    /// The binding for an agent, or `None` for legacy agents.
    pub async fn get_agent_instance(
        &self,
        agent_id: AgentId
    ) -> Result<Option<InstanceRecord>, IdentityError> {
        self.instances.get(agent_id).await.map_err(db_err)
    }

    /// Re-resolve and refresh an instance's snapshot, optionally moving
    /// to a new version and/or replacing overrides. Risk policies and
    /// the role are re-seeded from the target version.
    pub async fn refresh_instance_policy(
        &self,
        workspace_id: WorkspaceId,
        agent_id: AgentId,
        new_version: Option<i64>,
        new_overrides: Option<Value>
    ) -> Result<InstanceRecord, IdentityError> {
        let instance = self
            .instances
            .get_scoped(workspace_id, agent_id)
            .await
            .map_err(db_err)?
            .ok_or(IdentityError::NotFound {
                resource: "AgentInstance",
                id: agent_id.to_string(),
                workspace_id: workspace_id.as_i64()
            })?;

        let target_version = new_version.unwrap_or(instance.blueprint_version);
        let version_record = self
            .require_version(workspace_id, instance.blueprint_id, target_version)
            .await?;

        let overrides = match new_overrides {
            Some(ov) => Some(ov),
            None => instance.overrides.clone()
        };
        if let Some(ov) = &overrides {
            let (valid, error) =
                validate_overrides(Some(ov), version_record.override_policy.as_ref());
            if !valid {
                return Err(IdentityError::OverrideDenied {
                    reason: error.unwrap_or_default()
                });
            }
        }

        let snapshot = self.resolve_snapshot(workspace_id, &version_record).await?;
        let snapshot_json =
            serde_json::to_value(&snapshot).map_err(|e| IdentityError::Database {
                reason: e.to_string()
            })?;

        let updated = self
            .instances
            .refresh(agent_id, target_version, overrides, snapshot_json)
            .await
            .map_err(db_err)?
            .ok_or(IdentityError::NotFound {
                resource: "AgentInstance",
                id: agent_id.to_string(),
                workspace_id: workspace_id.as_i64()
            })?;

        self.seed_risk_policies(workspace_id, agent_id, &version_record.default_risk_profile)
            .await?;
        if let Some(blueprint) = self
            .blueprints
            .get(workspace_id, instance.blueprint_id)
            .await
            .map_err(db_err)?
        {
            self.seed_agent_role(
                workspace_id,
                agent_id,
                version_record.hierarchy_defaults.as_ref(),
                &blueprint.role_type
            )
            .await?;
        }

        self.log_instance_event(
            workspace_id,
            agent_id,
            "instance_refreshed",
            json!({
                "blueprint_id": instance.blueprint_id,
                "blueprint_version": target_version,
            }),
            None
        )
        .await;

        Ok(updated)
    }

    /// Delete the binding. Seeded risk policies and roles are not rolled
    /// back.
    pub async fn remove_agent_instance(
        &self,
        workspace_id: WorkspaceId,
        agent_id: AgentId
    ) -> Result<bool, IdentityError> {
        let Some(_instance) = self
            .instances
            .get_scoped(workspace_id, agent_id)
            .await
            .map_err(db_err)?
        else {
            return Ok(false);
        };

        let removed = self.instances.delete(agent_id).await.map_err(db_err)?;
        if removed {
            self.log_instance_event(
                workspace_id,
                agent_id,
                "instance_removed",
                json!({}),
                None
            )
            .await;
        }
        Ok(removed)
    }

    // -- internals --------------------------------------------------------

    async fn require_version(
        &self,
        workspace_id: WorkspaceId,
        blueprint_id: Uuid,
        version: i64
    ) -> Result<VersionRecord, IdentityError> {
        self.blueprints
            .get_version(blueprint_id, version)
            .await
            .map_err(db_err)?
            .ok_or(IdentityError::NotFound {
                resource: "BlueprintVersion",
                id: format!("{blueprint_id} v{version}"),
                workspace_id: workspace_id.as_i64()
            })
    }

    async fn resolve_snapshot(
        &self,
        workspace_id: WorkspaceId,
        version: &VersionRecord
    ) -> Result<wd_core::types::PolicySnapshot, IdentityError> {
        let ids = self
            .blueprints
            .capability_ids_for_version(version.blueprint_id, version.version)
            .await
            .map_err(db_err)?;
        let bundles = self.capabilities.get_many(workspace_id, &ids).await.map_err(db_err)?;
        Ok(resolve_capabilities(version, &bundles))
    }

    /// Upsert risk policies from a risk profile. Only the three known
    /// policy types seed; an invalid action falls back to alert_only.
    async fn seed_risk_policies(
        &self,
        workspace_id: WorkspaceId,
        agent_id: AgentId,
        risk_profile: &Value
    ) -> Result<(), IdentityError> {
        let Some(profile) = risk_profile.as_object() else {
            return Ok(());
        };
        if profile.is_empty() {
            return Ok(());
        }

        let action = profile
            .get("action_type")
            .and_then(|v| v.as_str())
            .and_then(|s| PolicyAction::from_str(s).ok())
            .unwrap_or(PolicyAction::AlertOnly);
        let cooldown = profile
            .get("cooldown_minutes")
            .and_then(|v| v.as_i64())
            .unwrap_or(DEFAULT_COOLDOWN_MINUTES);

        for policy_type in PolicyType::all() {
            let Some(raw) = profile.get(&policy_type.to_string()) else {
                continue;
            };
            let Some(threshold) = value_as_decimal(raw) else {
                continue;
            };

            self.risk
                .upsert_policy(
                    workspace_id,
                    Some(agent_id),
                    &policy_type.to_string(),
                    threshold,
                    &action.to_string(),
                    cooldown,
                    true
                )
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    /// Upsert the collaboration role from hierarchy defaults, falling
    /// back to the blueprint role_type mapping.
    async fn seed_agent_role(
        &self,
        workspace_id: WorkspaceId,
        agent_id: AgentId,
        hierarchy_defaults: Option<&Value>,
        blueprint_role_type: &str
    ) -> Result<(), IdentityError> {
        let defaults = hierarchy_defaults.and_then(|v| v.as_object());

        let explicit_role = defaults
            .and_then(|d| d.get("role"))
            .and_then(|v| v.as_str())
            .and_then(|s| CollabRole::from_str(s).ok());
        let can_assign = defaults
            .and_then(|d| d.get("can_assign_to_peers"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let can_escalate = defaults
            .and_then(|d| d.get("can_escalate_to_supervisor"))
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        let role = explicit_role.unwrap_or_else(|| {
            RoleType::from_str(blueprint_role_type)
                .map(RoleType::default_collab_role)
                .unwrap_or(CollabRole::Worker)
        });

        self.roles
            .upsert_role(workspace_id, agent_id, &role.to_string(), can_assign, can_escalate)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn log_instance_event(
        &self,
        workspace_id: WorkspaceId,
        agent_id: AgentId,
        event_type: &str,
        details: Value,
        actor_id: Option<i64>
    ) {
        if let Err(e) = self
            .audit
            .log(workspace_id, event_type, details, Some(agent_id), actor_id)
            .await
        {
            tracing::warn!("governance audit write failed for {event_type}: {e}");
        }
    }
}
