//! Workspace tier enforcement.
//!
//! Tier rows are read through a process-local cache with a 60-second TTL,
//! so limit checks stay off the hot database path. Any mutation of a tier
//! row must call [`TierEnforcement::invalidate`]; across processes the
//! TTL is the staleness bound.
//!
//! Limit predicates return `(allowed, message)` pairs; limits deny at or
//! above the configured threshold, so creating the item that would land
//! on the limit fails.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use dashmap::DashMap;
use sqlx::PgPool;
use wd_core::traits::GovernanceHooks;
use wd_core::types::{AgentId, GateDecision, WorkspaceId};

use storage::alerts::AlertStore;
use storage::api_keys::ApiKeyStore;
use storage::events::EventStore;
use storage::tiers::{TierRecord, TierStore};

/// Maximum cache staleness in seconds.
pub const TIER_CACHE_TTL_SECS: u64 = 60;

/// `(allowed, human_message)` — the message is set on denial.
pub type LimitCheck = (bool, Option<String>);

pub struct TierEnforcement {
    tier_store: TierStore,
    event_store: EventStore,
    alert_store: AlertStore,
    api_key_store: ApiKeyStore,
    cache: DashMap<i64, (TierRecord, Instant)>,
    ttl: Duration
}

impl TierEnforcement {
    pub fn new(pool: PgPool) -> Self {
        Self {
            tier_store: TierStore::new(pool.clone()),
            event_store: EventStore::new(pool.clone()),
            alert_store: AlertStore::new(pool.clone()),
            api_key_store: ApiKeyStore::new(pool),
            cache: DashMap::new(),
            ttl: Duration::from_secs(TIER_CACHE_TTL_SECS)
        }
    }

    /// The effective tier record for a workspace: the persisted row, or
    /// the free template when none exists. Cached with a 60 s TTL.
    pub async fn get_workspace_tier(
        &self,
        workspace_id: WorkspaceId
    ) -> Result<TierRecord, sqlx::Error> {
        if let Some(entry) = self.cache.get(&workspace_id.as_i64()) {
            let (record, cached_at) = entry.value();
            if cached_at.elapsed() < self.ttl {
                return Ok(record.clone());
            }
        }

        let record = match self.tier_store.get(workspace_id).await? {
            Some(row) => row,
            None => TierRecord::template("free", workspace_id)
        };

        self.cache
            .insert(workspace_id.as_i64(), (record.clone(), Instant::now()));
        Ok(record)
    }

    /// Drop the cached entry for one workspace, or the whole cache.
    pub fn invalidate(&self, workspace_id: Option<WorkspaceId>) {
        match workspace_id {
            Some(ws) => {
                self.cache.remove(&ws.as_i64());
            }
            None => self.cache.clear()
        }
    }

    // -- limit predicates -------------------------------------------------

    /// Can this workspace monitor another agent? Counts distinct agents
    /// with any event.
    pub async fn check_agent_limit(
        &self,
        workspace_id: WorkspaceId
    ) -> Result<LimitCheck, sqlx::Error> {
        let tier = self.get_workspace_tier(workspace_id).await?;
        let count = self.event_store.distinct_agent_count(workspace_id).await?;

        if count >= tier.agent_limit {
            return Ok((
                false,
                Some(format!(
                    "Agent monitoring limit reached ({}). Current tier: {}. Upgrade to monitor more agents.",
                    tier.agent_limit, tier.tier_name
                ))
            ));
        }
        Ok((true, None))
    }

    /// Is this specific agent allowed? An agent with any prior event is
    /// grandfathered; a new agent is subject to the agent limit.
    pub async fn check_agent_allowed(
        &self,
        workspace_id: WorkspaceId,
        agent_id: AgentId
    ) -> Result<LimitCheck, sqlx::Error> {
        if self.event_store.agent_has_events(workspace_id, agent_id).await? {
            return Ok((true, None));
        }
        self.check_agent_limit(workspace_id).await
    }

    pub async fn check_alert_rule_limit(
        &self,
        workspace_id: WorkspaceId
    ) -> Result<LimitCheck, sqlx::Error> {
        let tier = self.get_workspace_tier(workspace_id).await?;
        let count = self.alert_store.count_rules(workspace_id).await?;

        if count >= tier.alert_rule_limit {
            let msg = if tier.alert_rule_limit == 0 {
                format!(
                    "Alert rules are not available on the {} tier. Upgrade to create alert rules.",
                    tier.tier_name
                )
            } else {
                format!(
                    "Alert rule limit reached ({}). Current tier: {}. Upgrade for more alert rules.",
                    tier.alert_rule_limit, tier.tier_name
                )
            };
            return Ok((false, Some(msg)));
        }
        Ok((true, None))
    }

    pub async fn check_api_key_limit(
        &self,
        workspace_id: WorkspaceId
    ) -> Result<LimitCheck, sqlx::Error> {
        let tier = self.get_workspace_tier(workspace_id).await?;
        let count = self.api_key_store.count_active(workspace_id).await?;

        if count >= tier.max_api_keys {
            return Ok((
                false,
                Some(format!(
                    "API key limit reached ({}). Current tier: {}. Upgrade for more API keys.",
                    tier.max_api_keys, tier.tier_name
                ))
            ));
        }
        Ok((true, None))
    }

    pub async fn check_anomaly_detection(
        &self,
        workspace_id: WorkspaceId
    ) -> Result<bool, sqlx::Error> {
        Ok(self.get_workspace_tier(workspace_id).await?.anomaly_detection_enabled)
    }

    pub async fn check_slack_notifications(
        &self,
        workspace_id: WorkspaceId
    ) -> Result<bool, sqlx::Error> {
        Ok(self.get_workspace_tier(workspace_id).await?.slack_notifications_enabled)
    }

    pub async fn get_max_batch_size(&self, workspace_id: WorkspaceId) -> Result<i64, sqlx::Error> {
        Ok(self.get_workspace_tier(workspace_id).await?.max_batch_size)
    }

    /// Earliest timestamp still inside the retention window.
    pub async fn get_retention_cutoff(
        &self,
        workspace_id: WorkspaceId
    ) -> Result<DateTime<Utc>, sqlx::Error> {
        let tier = self.get_workspace_tier(workspace_id).await?;
        Ok(Utc::now() - ChronoDuration::days(tier.retention_days))
    }

    /// Clamp a query date range to the retention window. An open start
    /// snaps to the cutoff, an open end to today.
    pub async fn clamp_date_range(
        &self,
        workspace_id: WorkspaceId,
        from_date: Option<NaiveDate>,
        to_date: Option<NaiveDate>
    ) -> Result<(NaiveDate, NaiveDate), sqlx::Error> {
        let tier = self.get_workspace_tier(workspace_id).await?;
        let cutoff = (Utc::now() - ChronoDuration::days(tier.retention_days)).date_naive();

        let from = match from_date {
            Some(d) if d >= cutoff => d,
            _ => cutoff
        };
        let to = to_date.unwrap_or_else(|| Utc::now().date_naive());
        Ok((from, to))
    }

    /// Earliest date for health-score history. Zero days means today only.
    pub async fn get_health_history_cutoff(
        &self,
        workspace_id: WorkspaceId
    ) -> Result<NaiveDate, sqlx::Error> {
        let tier = self.get_workspace_tier(workspace_id).await?;
        Ok((Utc::now() - ChronoDuration::days(tier.health_history_days)).date_naive())
    }

    /// Run one named check, or every agent-independent check. Unknown
    /// check names pass.
    pub async fn verify_workspace_limits(
        &self,
        workspace_id: WorkspaceId,
        check: &str
    ) -> Result<LimitCheck, sqlx::Error> {
        match check {
            "agent" => self.check_agent_limit(workspace_id).await,
            "alert_rule" => self.check_alert_rule_limit(workspace_id).await,
            "api_key" => self.check_api_key_limit(workspace_id).await,
            "all" => {
                let (ok, msg) = self.check_agent_limit(workspace_id).await?;
                if !ok {
                    return Ok((false, msg));
                }
                let (ok, msg) = self.check_alert_rule_limit(workspace_id).await?;
                if !ok {
                    return Ok((false, msg));
                }
                let (ok, msg) = self.check_api_key_limit(workspace_id).await?;
                if !ok {
                    return Ok((false, msg));
                }
                Ok((true, None))
            }
            _ => Ok((true, None))
        }
    }
}

/// Governance gate over tier enforcement. Infrastructure failures map to
/// `Unavailable`, leaving the fail-open/fail-closed choice to callers.
#[async_trait]
impl GovernanceHooks for TierEnforcement {
    async fn check_agent_limit(&self, workspace_id: WorkspaceId) -> GateDecision {
        match TierEnforcement::check_agent_limit(self, workspace_id).await {
            Ok((true, _)) => GateDecision::Allowed,
            Ok((false, msg)) => GateDecision::Denied(msg.unwrap_or_default()),
            Err(e) => GateDecision::Unavailable(e.to_string())
        }
    }

    async fn check_agent_allowed(
        &self,
        workspace_id: WorkspaceId,
        agent_id: AgentId
    ) -> GateDecision {
        match TierEnforcement::check_agent_allowed(self, workspace_id, agent_id).await {
            Ok((true, _)) => GateDecision::Allowed,
            Ok((false, msg)) => GateDecision::Denied(msg.unwrap_or_default()),
            Err(e) => GateDecision::Unavailable(e.to_string())
        }
    }
}
