//! Implicit blueprints for legacy agents.
//!
//! A legacy agent (no instance binding) runs unrestricted. Opting it into
//! management wraps it in a published wildcard blueprint that preserves
//! its current behavior exactly: wildcard tools and models, fully open
//! override policy, empty risk profile, hierarchy defaults mirroring any
//! existing role. Existing RiskPolicy and AgentRole rows are never
//! touched. Migration is always explicit, never automatic.

use std::str::FromStr;

use errors::IdentityError;
use serde::Serialize;
use serde_json::{Value, json};
use sqlx::PgPool;
use uuid::Uuid;
use wd_core::types::{AgentId, RoleType, WorkspaceId};

use crate::capabilities::resolve_capabilities;
use crate::db_err;
use storage::agents::{AgentRecord, AgentStore};
use storage::blueprints::{BlueprintRecord, BlueprintStore, NewVersion, VersionRecord};
use storage::governance_audit::GovernanceAuditStore;
use storage::instances::{InstanceRecord, InstanceStore};
use storage::roles::RoleStore;

#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    pub agent_id: i64,
    pub agent_name: String,
    pub blueprint_id: Option<Uuid>,
    pub status: String,
    pub reason: Option<String>
}

pub struct LegacyConverter {
    agents: AgentStore,
    blueprints: BlueprintStore,
    instances: InstanceStore,
    roles: RoleStore,
    audit: GovernanceAuditStore
}

impl LegacyConverter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            agents: AgentStore::new(pool.clone()),
            blueprints: BlueprintStore::new(pool.clone()),
            instances: InstanceStore::new(pool.clone()),
            roles: RoleStore::new(pool.clone()),
            audit: GovernanceAuditStore::new(pool)
        }
    }

    /// Wrap one legacy agent in an implicit published blueprint and bind
    /// it. Fails if the agent already has a binding.
    pub async fn generate_implicit_blueprint(
        &self,
        workspace_id: WorkspaceId,
        agent_id: AgentId,
        created_by: Option<i64>
    ) -> Result<(BlueprintRecord, VersionRecord, InstanceRecord), IdentityError> {
        let agent = self
            .agents
            .get(workspace_id, agent_id)
            .await
            .map_err(db_err)?
            .ok_or(IdentityError::NotFound {
                resource: "Agent",
                id: agent_id.to_string(),
                workspace_id: workspace_id.as_i64()
            })?;

        if let Some(existing) = self.instances.get(agent_id).await.map_err(db_err)? {
            return Err(IdentityError::AlreadyInstantiated {
                agent_id: agent_id.as_i64(),
                blueprint_id: existing.blueprint_id.to_string(),
                version: existing.blueprint_version
            });
        }

        let role_type = self.infer_role_type(&agent).await?;
        let hierarchy = self.capture_hierarchy_defaults(workspace_id, agent_id).await?;

        // Published directly; the implicit blueprint never passes through
        // draft.
        let blueprint = self
            .blueprints
            .insert(
                Uuid::new_v4(),
                workspace_id,
                &format!("{} (Auto)", agent.name),
                Some(&format!(
                    "Auto-generated blueprint for legacy agent \"{}\"",
                    agent.name
                )),
                &role_type.to_string(),
                "published",
                created_by
            )
            .await
            .map_err(db_err)?;

        let fields = NewVersion {
            allowed_models: vec!["*".to_string()],
            allowed_tools: vec!["*".to_string()],
            default_risk_profile: json!({}),
            hierarchy_defaults: hierarchy,
            memory_strategy: None,
            escalation_rules: None,
            llm_defaults: agent.llm_config.clone(),
            identity_defaults: agent.identity_config.clone(),
            override_policy: Some(json!({"allowed_overrides": ["*"]})),
            changelog: Some("Auto-generated from legacy agent configuration".to_string())
        };
        let version = self
            .blueprints
            .publish_version(blueprint.id, 1, &fields, &[], created_by)
            .await
            .map_err(db_err)?;

        // Wildcards resolve to wildcards; no bundles are attached.
        let snapshot = resolve_capabilities(&version, &[]);
        let snapshot_json =
            serde_json::to_value(&snapshot).map_err(|e| IdentityError::Database {
                reason: e.to_string()
            })?;

        // Bound directly, bypassing the binder's seeding so existing
        // risk policies and roles stay untouched.
        let instance = self
            .instances
            .insert(agent_id, workspace_id, blueprint.id, 1, None, snapshot_json, created_by)
            .await
            .map_err(db_err)?;

        if let Err(e) = self
            .audit
            .log(
                workspace_id,
                "instance_created",
                json!({
                    "blueprint_id": blueprint.id,
                    "blueprint_version": 1,
                    "implicit": true,
                    "agent_name": agent.name,
                }),
                Some(agent_id),
                created_by
            )
            .await
        {
            tracing::warn!("governance audit write failed for implicit blueprint: {e}");
        }

        Ok((blueprint, version, instance))
    }

    /// Convert every legacy agent in a workspace. Already-managed agents
    /// are skipped; one agent failing does not stop the rest.
    pub async fn migrate_workspace_agents(
        &self,
        workspace_id: WorkspaceId,
        created_by: Option<i64>
    ) -> Result<Vec<MigrationResult>, IdentityError> {
        let agents = self.agents.list_for_workspace(workspace_id).await.map_err(db_err)?;

        let mut results = Vec::new();
        for agent in agents {
            let agent_id = AgentId::new(agent.id);

            if self.instances.get(agent_id).await.map_err(db_err)?.is_some() {
                results.push(MigrationResult {
                    agent_id: agent.id,
                    agent_name: agent.name.clone(),
                    blueprint_id: None,
                    status: "skipped".to_string(),
                    reason: Some("already blueprint-managed".to_string())
                });
                continue;
            }

            match self
                .generate_implicit_blueprint(workspace_id, agent_id, created_by)
                .await
            {
                Ok((blueprint, _, _)) => results.push(MigrationResult {
                    agent_id: agent.id,
                    agent_name: agent.name.clone(),
                    blueprint_id: Some(blueprint.id),
                    status: "converted".to_string(),
                    reason: None
                }),
                Err(e) => results.push(MigrationResult {
                    agent_id: agent.id,
                    agent_name: agent.name.clone(),
                    blueprint_id: None,
                    status: "error".to_string(),
                    reason: Some(e.to_string())
                })
            }
        }
        Ok(results)
    }

    /// Infer a blueprint role_type for a legacy agent: existing
    /// collaboration role first, then identity_config.role, else worker.
    async fn infer_role_type(&self, agent: &AgentRecord) -> Result<RoleType, IdentityError> {
        let existing = self
            .roles
            .get_role(WorkspaceId::new(agent.workspace_id), AgentId::new(agent.id))
            .await
            .map_err(db_err)?;

        if let Some(role) = existing {
            let mapped = match role.role.as_str() {
                "supervisor" => Some(RoleType::Supervisor),
                "specialist" => Some(RoleType::Researcher),
                "worker" => Some(RoleType::Worker),
                _ => None
            };
            if let Some(role_type) = mapped {
                return Ok(role_type);
            }
        }

        let config_role = agent
            .identity_config
            .get("role")
            .and_then(|v| v.as_str())
            .and_then(|s| RoleType::from_str(s).ok());

        Ok(config_role.unwrap_or(RoleType::Worker))
    }

    /// Mirror an existing AgentRole into hierarchy_defaults, or `None`
    /// when the agent has no role row (so nothing gets overwritten on a
    /// later refresh).
    async fn capture_hierarchy_defaults(
        &self,
        workspace_id: WorkspaceId,
        agent_id: AgentId
    ) -> Result<Option<Value>, IdentityError> {
        let existing = self.roles.get_role(workspace_id, agent_id).await.map_err(db_err)?;
        Ok(existing.map(|role| {
            json!({
                "role": role.role,
                "can_assign_to_peers": role.can_assign_to_peers,
                "can_escalate_to_supervisor": role.can_escalate_to_supervisor,
            })
        }))
    }
}
