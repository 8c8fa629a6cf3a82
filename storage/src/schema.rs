//! Idempotent schema bootstrap.
//!
//! `users` and `agents` normally pre-exist (owned by the auth layer); they
//! are created here as well so integration tests and local deployments
//! run against an empty database.

use sqlx::PgPool;

/// Create every table and index the runtime needs. Safe to call on every
/// startup.
pub async fn initialize_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(*statement).execute(pool).await?;
    }
    Ok(())
}

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS agents (
        id BIGSERIAL PRIMARY KEY,
        workspace_id BIGINT NOT NULL REFERENCES users(id),
        name TEXT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        llm_config JSONB NOT NULL DEFAULT '{}',
        identity_config JSONB NOT NULL DEFAULT '{}',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE INDEX IF NOT EXISTS idx_agents_workspace ON agents(workspace_id)",
    // -- observability ----------------------------------------------------
    "CREATE TABLE IF NOT EXISTS obs_events (
        id BIGSERIAL PRIMARY KEY,
        uid UUID NOT NULL UNIQUE,
        workspace_id BIGINT NOT NULL,
        agent_id BIGINT,
        run_id UUID,
        event_type TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'info',
        model TEXT,
        tokens_in BIGINT,
        tokens_out BIGINT,
        cost_usd NUMERIC(14,8),
        latency_ms BIGINT,
        payload JSONB NOT NULL DEFAULT '{}',
        dedupe_key TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE INDEX IF NOT EXISTS idx_obs_events_ws_created
        ON obs_events(workspace_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_obs_events_ws_agent
        ON obs_events(workspace_id, agent_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_obs_events_dedupe
        ON obs_events(dedupe_key) WHERE dedupe_key IS NOT NULL",
    "CREATE TABLE IF NOT EXISTS obs_runs (
        run_id UUID PRIMARY KEY,
        workspace_id BIGINT NOT NULL,
        agent_id BIGINT,
        model TEXT,
        status TEXT NOT NULL DEFAULT 'running',
        error_message TEXT,
        total_tokens_in BIGINT NOT NULL DEFAULT 0,
        total_tokens_out BIGINT NOT NULL DEFAULT 0,
        total_cost_usd NUMERIC(14,8) NOT NULL DEFAULT 0,
        total_latency_ms BIGINT NOT NULL DEFAULT 0,
        tool_calls_count BIGINT NOT NULL DEFAULT 0,
        metadata JSONB NOT NULL DEFAULT '{}',
        started_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        finished_at TIMESTAMPTZ
    )",
    "CREATE INDEX IF NOT EXISTS idx_obs_runs_ws_started
        ON obs_runs(workspace_id, started_at)",
    "CREATE TABLE IF NOT EXISTS obs_daily_metrics (
        workspace_id BIGINT NOT NULL,
        agent_id BIGINT NOT NULL DEFAULT 0,
        date DATE NOT NULL,
        total_runs BIGINT NOT NULL DEFAULT 0,
        successful_runs BIGINT NOT NULL DEFAULT 0,
        failed_runs BIGINT NOT NULL DEFAULT 0,
        total_events BIGINT NOT NULL DEFAULT 0,
        total_tokens_in BIGINT NOT NULL DEFAULT 0,
        total_tokens_out BIGINT NOT NULL DEFAULT 0,
        total_cost_usd NUMERIC(14,8) NOT NULL DEFAULT 0,
        total_tool_calls BIGINT NOT NULL DEFAULT 0,
        tool_errors BIGINT NOT NULL DEFAULT 0,
        latency_p50_ms BIGINT,
        latency_p95_ms BIGINT,
        latency_avg_ms BIGINT,
        models_used JSONB NOT NULL DEFAULT '{}',
        last_heartbeat_at TIMESTAMPTZ,
        PRIMARY KEY (workspace_id, agent_id, date)
    )",
    "CREATE TABLE IF NOT EXISTS obs_llm_pricing (
        id BIGSERIAL PRIMARY KEY,
        provider TEXT NOT NULL,
        model TEXT NOT NULL,
        input_cost_per_mtok NUMERIC(12,4) NOT NULL,
        output_cost_per_mtok NUMERIC(12,4) NOT NULL,
        effective_from DATE NOT NULL,
        effective_to DATE
    )",
    "CREATE TABLE IF NOT EXISTS obs_alert_rules (
        id BIGSERIAL PRIMARY KEY,
        workspace_id BIGINT NOT NULL,
        agent_id BIGINT,
        rule_type TEXT NOT NULL,
        threshold NUMERIC(12,4) NOT NULL,
        window_minutes BIGINT NOT NULL DEFAULT 60,
        cooldown_minutes BIGINT NOT NULL DEFAULT 60,
        is_enabled BOOLEAN NOT NULL DEFAULT TRUE,
        last_triggered_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE INDEX IF NOT EXISTS idx_obs_alert_rules_ws ON obs_alert_rules(workspace_id)",
    "CREATE TABLE IF NOT EXISTS obs_alert_events (
        id BIGSERIAL PRIMARY KEY,
        rule_id BIGINT NOT NULL REFERENCES obs_alert_rules(id),
        workspace_id BIGINT NOT NULL,
        agent_id BIGINT,
        rule_type TEXT NOT NULL,
        metric_value NUMERIC(12,4) NOT NULL,
        threshold_value NUMERIC(12,4) NOT NULL,
        message TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS obs_api_keys (
        id BIGSERIAL PRIMARY KEY,
        workspace_id BIGINT NOT NULL,
        name TEXT NOT NULL,
        key_prefix TEXT NOT NULL,
        key_hash TEXT NOT NULL UNIQUE,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        last_used_at TIMESTAMPTZ
    )",
    // -- tiers ------------------------------------------------------------
    "CREATE TABLE IF NOT EXISTS workspace_tiers (
        workspace_id BIGINT PRIMARY KEY,
        tier_name TEXT NOT NULL DEFAULT 'free',
        agent_limit BIGINT NOT NULL DEFAULT 2,
        retention_days BIGINT NOT NULL DEFAULT 7,
        alert_rule_limit BIGINT NOT NULL DEFAULT 0,
        health_history_days BIGINT NOT NULL DEFAULT 0,
        anomaly_detection_enabled BOOLEAN NOT NULL DEFAULT FALSE,
        slack_notifications_enabled BOOLEAN NOT NULL DEFAULT FALSE,
        multi_workspace_enabled BOOLEAN NOT NULL DEFAULT FALSE,
        priority_processing BOOLEAN NOT NULL DEFAULT FALSE,
        max_api_keys BIGINT NOT NULL DEFAULT 1,
        max_batch_size BIGINT NOT NULL DEFAULT 100,
        updated_at TIMESTAMPTZ
    )",
    // -- identity ---------------------------------------------------------
    "CREATE TABLE IF NOT EXISTS capability_bundles (
        id BIGSERIAL PRIMARY KEY,
        workspace_id BIGINT NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        tool_set JSONB NOT NULL DEFAULT '[]',
        model_constraints JSONB NOT NULL DEFAULT '{}',
        risk_constraints JSONB NOT NULL DEFAULT '{}',
        is_system BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (workspace_id, name)
    )",
    "CREATE TABLE IF NOT EXISTS blueprints (
        id UUID PRIMARY KEY,
        workspace_id BIGINT NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        role_type TEXT NOT NULL DEFAULT 'worker',
        status TEXT NOT NULL DEFAULT 'draft',
        latest_version BIGINT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        created_by BIGINT
    )",
    "CREATE INDEX IF NOT EXISTS idx_blueprints_ws ON blueprints(workspace_id)",
    "CREATE TABLE IF NOT EXISTS blueprint_versions (
        blueprint_id UUID NOT NULL REFERENCES blueprints(id),
        version BIGINT NOT NULL,
        allowed_models JSONB NOT NULL DEFAULT '[]',
        allowed_tools JSONB NOT NULL DEFAULT '[]',
        default_risk_profile JSONB NOT NULL DEFAULT '{}',
        hierarchy_defaults JSONB,
        memory_strategy JSONB,
        escalation_rules JSONB,
        llm_defaults JSONB NOT NULL DEFAULT '{}',
        identity_defaults JSONB NOT NULL DEFAULT '{}',
        override_policy JSONB,
        changelog TEXT,
        published_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        published_by BIGINT,
        PRIMARY KEY (blueprint_id, version)
    )",
    "CREATE TABLE IF NOT EXISTS blueprint_capabilities (
        blueprint_id UUID NOT NULL,
        version BIGINT NOT NULL,
        capability_id BIGINT NOT NULL REFERENCES capability_bundles(id),
        PRIMARY KEY (blueprint_id, version, capability_id),
        FOREIGN KEY (blueprint_id, version)
            REFERENCES blueprint_versions(blueprint_id, version)
    )",
    "CREATE TABLE IF NOT EXISTS agent_instances (
        agent_id BIGINT PRIMARY KEY REFERENCES agents(id),
        workspace_id BIGINT NOT NULL,
        blueprint_id UUID NOT NULL REFERENCES blueprints(id),
        blueprint_version BIGINT NOT NULL,
        overrides JSONB,
        policy_snapshot JSONB NOT NULL DEFAULT '{}',
        instantiated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        instantiated_by BIGINT,
        last_policy_refresh TIMESTAMPTZ
    )",
    // -- risk engine ------------------------------------------------------
    "CREATE TABLE IF NOT EXISTS risk_policies (
        id UUID PRIMARY KEY,
        workspace_id BIGINT NOT NULL,
        agent_id BIGINT,
        policy_type TEXT NOT NULL,
        threshold_value NUMERIC(12,4) NOT NULL,
        action_type TEXT NOT NULL DEFAULT 'alert_only',
        cooldown_minutes BIGINT NOT NULL DEFAULT 360,
        is_enabled BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_risk_policies_scope
        ON risk_policies(workspace_id, COALESCE(agent_id, -1), policy_type)",
    "CREATE TABLE IF NOT EXISTS risk_events (
        id UUID PRIMARY KEY,
        policy_id UUID NOT NULL REFERENCES risk_policies(id),
        workspace_id BIGINT NOT NULL,
        agent_id BIGINT,
        policy_type TEXT NOT NULL,
        breach_value NUMERIC(12,4) NOT NULL,
        threshold_value NUMERIC(12,4) NOT NULL,
        action_type TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        dedupe_key TEXT NOT NULL UNIQUE,
        evaluated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        executed_at TIMESTAMPTZ,
        execution_result JSONB
    )",
    "CREATE INDEX IF NOT EXISTS idx_risk_events_status
        ON risk_events(status, evaluated_at)",
    "CREATE TABLE IF NOT EXISTS risk_audit_log (
        id BIGSERIAL PRIMARY KEY,
        event_id UUID NOT NULL REFERENCES risk_events(id),
        workspace_id BIGINT NOT NULL,
        agent_id BIGINT,
        action_type TEXT NOT NULL,
        previous_state JSONB NOT NULL DEFAULT '{}',
        new_state JSONB NOT NULL DEFAULT '{}',
        result TEXT NOT NULL,
        error_message TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    // -- approvals --------------------------------------------------------
    "CREATE TABLE IF NOT EXISTS agent_actions (
        id BIGSERIAL PRIMARY KEY,
        workspace_id BIGINT NOT NULL,
        agent_id BIGINT,
        action_type TEXT NOT NULL,
        service_type TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        action_data JSONB NOT NULL DEFAULT '{}',
        ai_reasoning TEXT,
        ai_confidence DOUBLE PRECISION,
        result_data JSONB,
        error_message TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        approved_at TIMESTAMPTZ,
        executed_at TIMESTAMPTZ
    )",
    "CREATE INDEX IF NOT EXISTS idx_agent_actions_status ON agent_actions(status)",
    "CREATE INDEX IF NOT EXISTS idx_agent_actions_ws ON agent_actions(workspace_id)",
    "CREATE TABLE IF NOT EXISTS service_usage (
        workspace_id BIGINT NOT NULL,
        service_type TEXT NOT NULL,
        usage_count BIGINT NOT NULL DEFAULT 0,
        last_used TIMESTAMPTZ,
        PRIMARY KEY (workspace_id, service_type)
    )",
    // -- collaboration ----------------------------------------------------
    "CREATE TABLE IF NOT EXISTS agent_roles (
        id BIGSERIAL PRIMARY KEY,
        workspace_id BIGINT NOT NULL,
        agent_id BIGINT NOT NULL,
        role TEXT NOT NULL DEFAULT 'worker',
        can_assign_to_peers BOOLEAN NOT NULL DEFAULT FALSE,
        can_escalate_to_supervisor BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (workspace_id, agent_id)
    )",
    "CREATE TABLE IF NOT EXISTS team_rules (
        workspace_id BIGINT PRIMARY KEY,
        allow_peer_assignment BOOLEAN NOT NULL DEFAULT FALSE,
        require_supervisor_for_tasks BOOLEAN NOT NULL DEFAULT FALSE,
        default_supervisor_agent_id BIGINT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    // -- governance audit -------------------------------------------------
    "CREATE TABLE IF NOT EXISTS governance_audit_log (
        id BIGSERIAL PRIMARY KEY,
        workspace_id BIGINT NOT NULL,
        event_type TEXT NOT NULL,
        agent_id BIGINT,
        actor_id BIGINT,
        details JSONB NOT NULL DEFAULT '{}',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE INDEX IF NOT EXISTS idx_governance_audit_ws
        ON governance_audit_log(workspace_id, created_at)",
];
