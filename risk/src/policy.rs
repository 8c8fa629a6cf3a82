//! Risk policy CRUD helpers. Evaluation and enforcement live elsewhere.

use std::str::FromStr;

use errors::RiskError;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;
use wd_core::types::{AgentId, PolicyAction, PolicyType, WorkspaceId};

use storage::risk::{PolicyRecord, RiskStore};

fn db_err(e: sqlx::Error) -> RiskError {
    RiskError::Database { reason: e.to_string() }
}

pub struct PolicyService {
    store: RiskStore
}

impl PolicyService {
    pub fn new(pool: PgPool) -> Self {
        Self { store: RiskStore::new(pool) }
    }

    /// Create or update the policy on a (workspace, agent, type) scope.
    /// `agent_id = None` means workspace-wide aggregation.
    pub async fn upsert_policy(
        &self,
        workspace_id: WorkspaceId,
        agent_id: Option<AgentId>,
        policy_type: &str,
        threshold_value: Decimal,
        action_type: &str,
        cooldown_minutes: i64,
        is_enabled: bool
    ) -> Result<PolicyRecord, RiskError> {
        let policy_type = PolicyType::from_str(policy_type)
            .map_err(|e| RiskError::InvalidPolicy { reason: e })?;
        let action = PolicyAction::from_str(action_type)
            .map_err(|e| RiskError::InvalidPolicy { reason: e })?;
        if threshold_value < Decimal::ZERO {
            return Err(RiskError::InvalidPolicy {
                reason: format!("threshold must be non-negative, got {threshold_value}")
            });
        }

        self.store
            .upsert_policy(
                workspace_id,
                agent_id,
                &policy_type.to_string(),
                threshold_value,
                &action.to_string(),
                cooldown_minutes,
                is_enabled
            )
            .await
            .map_err(db_err)
    }

    pub async fn get_policy(
        &self,
        workspace_id: WorkspaceId,
        policy_id: Uuid
    ) -> Result<Option<PolicyRecord>, RiskError> {
        self.store.get_policy(policy_id, Some(workspace_id)).await.map_err(db_err)
    }

    pub async fn enabled_policies(
        &self,
        workspace_id: Option<WorkspaceId>
    ) -> Result<Vec<PolicyRecord>, RiskError> {
        self.store.enabled_policies(workspace_id).await.map_err(db_err)
    }

    pub async fn policies_for_agent(
        &self,
        workspace_id: WorkspaceId,
        agent_id: AgentId
    ) -> Result<Vec<PolicyRecord>, RiskError> {
        self.store.policies_for_agent(workspace_id, agent_id).await.map_err(db_err)
    }

    pub async fn set_enabled(
        &self,
        workspace_id: WorkspaceId,
        policy_id: Uuid,
        is_enabled: bool
    ) -> Result<(), RiskError> {
        let updated = self
            .store
            .set_policy_enabled(workspace_id, policy_id, is_enabled)
            .await
            .map_err(db_err)?;
        if !updated {
            return Err(RiskError::PolicyNotFound {
                policy_id: policy_id.to_string(),
                workspace_id: workspace_id.as_i64()
            });
        }
        Ok(())
    }
}
