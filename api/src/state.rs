use std::sync::Arc;

use sqlx::PgPool;

use adapters::LogNotifier;
use approvals::{ApprovalQueue, HandlerRegistry};
use identity::{BlueprintCatalog, CapabilityService, InstanceBinder, LegacyConverter};
use observability::{
    AlertEvaluator, DailyAggregator, ObservabilityService, RetentionSweeper, TierEnforcement
};
use risk::{EnforcementWorker, PolicyService};
use storage::alerts::AlertStore;
use storage::api_keys::ApiKeyStore;
use storage::tiers::TierStore;

use crate::config::Config;

/// Shared application state. Everything is constructed once over a
/// single pool; handlers clone the `Arc`.
pub struct AppState {
    pub config: Config,
    pub pool: PgPool,
    pub tiers: Arc<TierEnforcement>,
    pub tier_store: TierStore,
    pub observability: Arc<ObservabilityService>,
    pub aggregator: DailyAggregator,
    pub alert_evaluator: AlertEvaluator,
    pub retention: RetentionSweeper,
    pub catalog: BlueprintCatalog,
    pub bundles: CapabilityService,
    pub binder: InstanceBinder,
    pub converter: LegacyConverter,
    pub policies: PolicyService,
    pub enforcement: EnforcementWorker,
    pub approvals: ApprovalQueue,
    pub alert_store: AlertStore,
    pub api_keys: ApiKeyStore
}

impl AppState {
    /// Wire the full service graph. The handler registry is passed in so
    /// the embedding deployment decides which service adapters exist.
    pub fn build(config: Config, pool: PgPool, handlers: Arc<HandlerRegistry>) -> Arc<Self> {
        let notifier = Arc::new(LogNotifier);

        Arc::new(Self {
            tiers: Arc::new(TierEnforcement::new(pool.clone())),
            tier_store: TierStore::new(pool.clone()),
            observability: Arc::new(ObservabilityService::new(pool.clone())),
            aggregator: DailyAggregator::new(pool.clone()),
            alert_evaluator: AlertEvaluator::new(pool.clone(), notifier.clone()),
            retention: RetentionSweeper::new(pool.clone()),
            catalog: BlueprintCatalog::new(pool.clone()),
            bundles: CapabilityService::new(pool.clone()),
            binder: InstanceBinder::new(pool.clone()),
            converter: LegacyConverter::new(pool.clone()),
            policies: PolicyService::new(pool.clone()),
            enforcement: EnforcementWorker::new(pool.clone(), notifier),
            approvals: ApprovalQueue::new(pool.clone(), handlers),
            alert_store: AlertStore::new(pool.clone()),
            api_keys: ApiKeyStore::new(pool.clone()),
            config,
            pool
        })
    }
}
