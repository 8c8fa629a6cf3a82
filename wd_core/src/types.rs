use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Workspace identifier (tenant-level isolation boundary)
///
/// The workspace is the hard isolation boundary: every entity in the
/// system is scoped to exactly one workspace, and nothing crosses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct WorkspaceId(i64);

impl WorkspaceId {
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the inner integer value
    #[must_use]
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for WorkspaceId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Agent identifier within a workspace
///
/// Agents belong to exactly one workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct AgentId(i64);

impl AgentId {
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the inner integer value
    #[must_use]
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AgentId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Blueprint role archetype — what kind of agent a blueprint describes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    Supervisor,
    Researcher,
    Executor,
    Worker,
    Autonomous
}

impl RoleType {
    pub fn all() -> &'static [RoleType] {
        &[
            RoleType::Supervisor,
            RoleType::Researcher,
            RoleType::Executor,
            RoleType::Worker,
            RoleType::Autonomous,
        ]
    }

    /// The collaboration role seeded for instances of this archetype.
    #[must_use]
    pub fn default_collab_role(self) -> CollabRole {
        match self {
            RoleType::Supervisor => CollabRole::Supervisor,
            RoleType::Researcher => CollabRole::Specialist,
            RoleType::Executor | RoleType::Worker | RoleType::Autonomous => CollabRole::Worker
        }
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleType::Supervisor => write!(f, "supervisor"),
            RoleType::Researcher => write!(f, "researcher"),
            RoleType::Executor => write!(f, "executor"),
            RoleType::Worker => write!(f, "worker"),
            RoleType::Autonomous => write!(f, "autonomous")
        }
    }
}

impl FromStr for RoleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "supervisor" => Ok(RoleType::Supervisor),
            "researcher" => Ok(RoleType::Researcher),
            "executor" => Ok(RoleType::Executor),
            "worker" => Ok(RoleType::Worker),
            "autonomous" => Ok(RoleType::Autonomous),
            _ => Err(format!(
                "Invalid role_type: {s}. Use: supervisor, researcher, executor, worker, autonomous"
            ))
        }
    }
}

/// Blueprint lifecycle status. Drafts are mutable; published and archived
/// blueprints only gain new versions or nothing at all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlueprintStatus {
    Draft,
    Published,
    Archived
}

impl fmt::Display for BlueprintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlueprintStatus::Draft => write!(f, "draft"),
            BlueprintStatus::Published => write!(f, "published"),
            BlueprintStatus::Archived => write!(f, "archived")
        }
    }
}

impl FromStr for BlueprintStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(BlueprintStatus::Draft),
            "published" => Ok(BlueprintStatus::Published),
            "archived" => Ok(BlueprintStatus::Archived),
            _ => Err(format!("Invalid blueprint status: {s}"))
        }
    }
}

/// Collaboration role an agent holds inside its workspace hierarchy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollabRole {
    Supervisor,
    Worker,
    Specialist
}

impl fmt::Display for CollabRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollabRole::Supervisor => write!(f, "supervisor"),
            CollabRole::Worker => write!(f, "worker"),
            CollabRole::Specialist => write!(f, "specialist")
        }
    }
}

impl FromStr for CollabRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "supervisor" => Ok(CollabRole::Supervisor),
            "worker" => Ok(CollabRole::Worker),
            "specialist" => Ok(CollabRole::Specialist),
            _ => Err(format!("Invalid collaboration role: {s}"))
        }
    }
}

/// Risk policy metric type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    DailySpendCap,
    ErrorRateCap,
    TokenRateCap
}

impl PolicyType {
    pub fn all() -> &'static [PolicyType] {
        &[
            PolicyType::DailySpendCap,
            PolicyType::ErrorRateCap,
            PolicyType::TokenRateCap,
        ]
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyType::DailySpendCap => write!(f, "daily_spend_cap"),
            PolicyType::ErrorRateCap => write!(f, "error_rate_cap"),
            PolicyType::TokenRateCap => write!(f, "token_rate_cap")
        }
    }
}

impl FromStr for PolicyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily_spend_cap" => Ok(PolicyType::DailySpendCap),
            "error_rate_cap" => Ok(PolicyType::ErrorRateCap),
            "token_rate_cap" => Ok(PolicyType::TokenRateCap),
            _ => Err(format!("Invalid policy_type: {s}"))
        }
    }
}

/// Intervention applied when a risk policy breaches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    AlertOnly,
    Throttle,
    ModelDowngrade,
    PauseAgent
}

impl fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyAction::AlertOnly => write!(f, "alert_only"),
            PolicyAction::Throttle => write!(f, "throttle"),
            PolicyAction::ModelDowngrade => write!(f, "model_downgrade"),
            PolicyAction::PauseAgent => write!(f, "pause_agent")
        }
    }
}

impl FromStr for PolicyAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alert_only" => Ok(PolicyAction::AlertOnly),
            "throttle" => Ok(PolicyAction::Throttle),
            "model_downgrade" => Ok(PolicyAction::ModelDowngrade),
            "pause_agent" => Ok(PolicyAction::PauseAgent),
            _ => Err(format!("Invalid action_type: {s}"))
        }
    }
}

/// Risk event lifecycle. Status is monotone:
/// pending -> executed | skipped | failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskEventStatus {
    Pending,
    Executed,
    Skipped,
    Failed
}

impl fmt::Display for RiskEventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskEventStatus::Pending => write!(f, "pending"),
            RiskEventStatus::Executed => write!(f, "executed"),
            RiskEventStatus::Skipped => write!(f, "skipped"),
            RiskEventStatus::Failed => write!(f, "failed")
        }
    }
}

impl FromStr for RiskEventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RiskEventStatus::Pending),
            "executed" => Ok(RiskEventStatus::Executed),
            "skipped" => Ok(RiskEventStatus::Skipped),
            "failed" => Ok(RiskEventStatus::Failed),
            _ => Err(format!("Invalid risk event status: {s}"))
        }
    }
}

/// Approval action lifecycle. Transitions:
/// pending -> approved -> executed | failed, or pending -> rejected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
    Failed
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "pending"),
            ApprovalStatus::Approved => write!(f, "approved"),
            ApprovalStatus::Rejected => write!(f, "rejected"),
            ApprovalStatus::Executed => write!(f, "executed"),
            ApprovalStatus::Failed => write!(f, "failed")
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            "executed" => Ok(ApprovalStatus::Executed),
            "failed" => Ok(ApprovalStatus::Failed),
            _ => Err(format!("Invalid approval status: {s}"))
        }
    }
}

/// Observability event type (stable ingestion contract).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStarted,
    RunFinished,
    ActionStarted,
    ActionFinished,
    ToolCall,
    ToolResult,
    LlmCall,
    Error,
    Metric,
    Heartbeat
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::RunStarted => write!(f, "run_started"),
            EventType::RunFinished => write!(f, "run_finished"),
            EventType::ActionStarted => write!(f, "action_started"),
            EventType::ActionFinished => write!(f, "action_finished"),
            EventType::ToolCall => write!(f, "tool_call"),
            EventType::ToolResult => write!(f, "tool_result"),
            EventType::LlmCall => write!(f, "llm_call"),
            EventType::Error => write!(f, "error"),
            EventType::Metric => write!(f, "metric"),
            EventType::Heartbeat => write!(f, "heartbeat")
        }
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "run_started" => Ok(EventType::RunStarted),
            "run_finished" => Ok(EventType::RunFinished),
            "action_started" => Ok(EventType::ActionStarted),
            "action_finished" => Ok(EventType::ActionFinished),
            "tool_call" => Ok(EventType::ToolCall),
            "tool_result" => Ok(EventType::ToolResult),
            "llm_call" => Ok(EventType::LlmCall),
            "error" => Ok(EventType::Error),
            "metric" => Ok(EventType::Metric),
            "heartbeat" => Ok(EventType::Heartbeat),
            _ => Err(format!("invalid event_type: {s}"))
        }
    }
}

/// Observability event status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Success,
    Error,
    #[default]
    Info
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventStatus::Success => write!(f, "success"),
            EventStatus::Error => write!(f, "error"),
            EventStatus::Info => write!(f, "info")
        }
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(EventStatus::Success),
            "error" => Ok(EventStatus::Error),
            "info" => Ok(EventStatus::Info),
            _ => Err(format!("invalid event status: {s}"))
        }
    }
}

/// Run lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Running,
    Success,
    Error
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Success => write!(f, "success"),
            RunStatus::Error => write!(f, "error")
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "error" => Ok(RunStatus::Error),
            _ => Err(format!("invalid run status: {s}"))
        }
    }
}

/// A single observability event, as submitted to the event sink.
///
/// `cost_usd` is fixed-point: money never travels as a float.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub workspace_id: WorkspaceId,
    pub agent_id: Option<AgentId>,
    pub run_id: Option<Uuid>,
    pub event_type: EventType,
    pub status: EventStatus,
    pub model: Option<String>,
    pub tokens_in: Option<i64>,
    pub tokens_out: Option<i64>,
    pub cost_usd: Option<Decimal>,
    pub latency_ms: Option<i64>,
    pub payload: serde_json::Value,
    pub dedupe_key: Option<String>
}

impl EventRecord {
    /// A minimal event with everything optional left empty.
    #[must_use]
    pub fn new(workspace_id: WorkspaceId, event_type: EventType, status: EventStatus) -> Self {
        Self {
            workspace_id,
            agent_id: None,
            run_id: None,
            event_type,
            status,
            model: None,
            tokens_in: None,
            tokens_out: None,
            cost_usd: None,
            latency_ms: None,
            payload: serde_json::json!({}),
            dedupe_key: None
        }
    }
}

/// Additive totals applied when a run finishes.
#[derive(Debug, Clone, Default)]
pub struct RunTotals {
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost_usd: Decimal,
    pub latency_ms: i64,
    pub tool_calls: i64
}

/// Outcome of a governance gate check.
///
/// `Unavailable` signals an infrastructure failure in the governance
/// subsystem; read-only callers fail open on it, state-changing callers
/// fail closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    Denied(String),
    Unavailable(String)
}

impl GateDecision {
    #[must_use]
    pub fn is_denied(&self) -> bool {
        matches!(self, GateDecision::Denied(_))
    }
}

/// The resolved, denormalized capability/risk/LLM/identity tuple pinned
/// by an agent instance. This is the authoritative runtime reference:
/// the gateway consults it on every tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub allowed_tools: Vec<String>,
    pub allowed_models: Vec<String>,
    pub risk_profile: serde_json::Value,
    pub llm_defaults: serde_json::Value,
    pub identity_defaults: serde_json::Value
}

impl PolicySnapshot {
    /// The effective tool allowlist, or `None` when unrestricted
    /// (wildcard or empty snapshot).
    #[must_use]
    pub fn tool_allowlist(&self) -> Option<HashSet<String>> {
        if self.allowed_tools.iter().any(|t| t == "*") {
            return None;
        }
        Some(self.allowed_tools.iter().cloned().collect())
    }

    /// The effective model allowlist, or `None` when unrestricted.
    #[must_use]
    pub fn model_allowlist(&self) -> Option<HashSet<String>> {
        if self.allowed_models.iter().any(|m| m == "*") {
            return None;
        }
        Some(self.allowed_models.iter().cloned().collect())
    }
}

/// A tool schema as exposed by the workspace tool registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: serde_json::Value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_string_roundtrips() {
        assert_eq!(RoleType::Researcher.to_string(), "researcher");
        assert_eq!("autonomous".parse::<RoleType>().unwrap(), RoleType::Autonomous);
        assert!("admin".parse::<RoleType>().is_err());

        assert_eq!(PolicyType::DailySpendCap.to_string(), "daily_spend_cap");
        assert_eq!(
            "model_downgrade".parse::<PolicyAction>().unwrap(),
            PolicyAction::ModelDowngrade
        );

        assert_eq!(EventType::ToolResult.to_string(), "tool_result");
        assert_eq!("heartbeat".parse::<EventType>().unwrap(), EventType::Heartbeat);
        assert!("unknown".parse::<EventType>().is_err());
    }

    #[test]
    fn test_role_type_collab_mapping() {
        assert_eq!(RoleType::Supervisor.default_collab_role(), CollabRole::Supervisor);
        assert_eq!(RoleType::Researcher.default_collab_role(), CollabRole::Specialist);
        assert_eq!(RoleType::Executor.default_collab_role(), CollabRole::Worker);
        assert_eq!(RoleType::Worker.default_collab_role(), CollabRole::Worker);
        assert_eq!(RoleType::Autonomous.default_collab_role(), CollabRole::Worker);
    }

    #[test]
    fn test_policy_snapshot_wildcards() {
        let snapshot = PolicySnapshot {
            allowed_tools: vec!["*".to_string()],
            allowed_models: vec!["openai".to_string()],
            risk_profile: serde_json::json!({}),
            llm_defaults: serde_json::json!({}),
            identity_defaults: serde_json::json!({})
        };
        assert!(snapshot.tool_allowlist().is_none());
        let models = snapshot.model_allowlist().unwrap();
        assert!(models.contains("openai"));
    }
}
