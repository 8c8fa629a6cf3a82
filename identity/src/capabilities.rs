//! Capability resolution and override validation.
//!
//! Both are pure functions over already-loaded rows, so the exact merge
//! semantics are unit-testable without a database.
//!
//! Resolution rules:
//! - tool_set: union across bundles, capped by the blueprint-level list
//!   when it is non-empty and non-wildcard. With no bundles at all, the
//!   blueprint list stands in (`["*"]` when it too is empty). An empty
//!   intersection with bundles present stays empty.
//! - allowed_providers: intersection across the bundles that specify
//!   providers, then the blueprint ceiling. No providers specified
//!   anywhere falls back to the blueprint list or `["*"]`.
//! - risk constraints: per-key minimum of the numeric values; a
//!   non-numeric bundle entry never overwrites a blueprint value.
//! - llm/identity defaults pass through from the version unchanged.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;
use wd_core::types::PolicySnapshot;

use storage::blueprints::VersionRecord;
use storage::capabilities::BundleRecord;

/// Resolve the effective capability set for a blueprint version with its
/// attached bundles. Deterministic: the same inputs always produce the
/// same snapshot.
#[must_use]
pub fn resolve_capabilities(version: &VersionRecord, bundles: &[BundleRecord]) -> PolicySnapshot {
    let bp_tools = version.allowed_tools_vec();
    let bp_models = version.allowed_models_vec();
    let bp_risk = version.default_risk_profile.clone();

    if bundles.is_empty() {
        return PolicySnapshot {
            allowed_tools: if bp_tools.is_empty() { wildcard() } else { bp_tools },
            allowed_models: if bp_models.is_empty() { wildcard() } else { bp_models },
            risk_profile: bp_risk,
            llm_defaults: version.llm_defaults.clone(),
            identity_defaults: version.identity_defaults.clone()
        };
    }

    // Tools: union across bundles, then the blueprint ceiling.
    let mut resolved_tools: HashSet<String> = HashSet::new();
    for bundle in bundles {
        resolved_tools.extend(bundle.tools());
    }
    if !bp_tools.is_empty() && !bp_tools.iter().any(|t| t == "*") {
        let ceiling: HashSet<String> = bp_tools.iter().cloned().collect();
        resolved_tools.retain(|t| ceiling.contains(t));
    }
    let mut allowed_tools: Vec<String> = resolved_tools.into_iter().collect();
    allowed_tools.sort();

    // Models: intersect the providers of every bundle that names any.
    let mut resolved_providers: Option<HashSet<String>> = None;
    for bundle in bundles {
        if let Some(providers) = bundle.allowed_providers() {
            let provider_set: HashSet<String> = providers.into_iter().collect();
            resolved_providers = Some(match resolved_providers {
                Some(current) => current.intersection(&provider_set).cloned().collect(),
                None => provider_set
            });
        }
    }
    let allowed_models = match resolved_providers {
        Some(providers) => {
            let capped: Vec<String> =
                if !bp_models.is_empty() && !bp_models.iter().any(|m| m == "*") {
                    let ceiling: HashSet<String> = bp_models.iter().cloned().collect();
                    let mut v: Vec<String> =
                        providers.into_iter().filter(|p| ceiling.contains(p)).collect();
                    v.sort();
                    v
                } else {
                    let mut v: Vec<String> = providers.into_iter().collect();
                    v.sort();
                    v
                };
            if capped.is_empty() { wildcard() } else { capped }
        }
        None => {
            if bp_models.is_empty() {
                wildcard()
            } else {
                bp_models
            }
        }
    };

    // Risk constraints: minimum numeric value wins.
    let mut merged_risk: BTreeMap<String, Value> = match bp_risk {
        Value::Object(map) => map.into_iter().collect(),
        _ => BTreeMap::new()
    };
    for bundle in bundles {
        let Value::Object(constraints) = &bundle.risk_constraints else {
            continue;
        };
        for (key, value) in constraints {
            match merged_risk.get(key) {
                Some(existing) => {
                    if let (Some(current), Some(candidate)) =
                        (value_as_decimal(existing), value_as_decimal(value))
                    {
                        if candidate < current {
                            merged_risk.insert(key.clone(), decimal_to_value(candidate));
                        }
                    }
                    // Non-numeric bundle entries keep the blueprint value.
                }
                None => {
                    merged_risk.insert(key.clone(), value.clone());
                }
            }
        }
    }

    PolicySnapshot {
        allowed_tools,
        allowed_models,
        risk_profile: Value::Object(merged_risk.into_iter().collect()),
        llm_defaults: version.llm_defaults.clone(),
        identity_defaults: version.identity_defaults.clone()
    }
}

/// Validate proposed overrides against a version's override policy.
///
/// Absent policy means no overrides are permitted. A `"*"` entry in
/// allowed_overrides allows everything that is not explicitly denied.
#[must_use]
pub fn validate_overrides(
    overrides: Option<&Value>,
    override_policy: Option<&Value>
) -> (bool, Option<String>) {
    let Some(Value::Object(overrides)) = overrides else {
        return (true, None);
    };
    if overrides.is_empty() {
        return (true, None);
    }

    let Some(Value::Object(policy)) = override_policy else {
        return (
            false,
            Some("No override policy defined - overrides are not permitted".to_string())
        );
    };

    let allowed: HashSet<&str> = string_set(policy.get("allowed_overrides"));
    let denied: HashSet<&str> = string_set(policy.get("denied_overrides"));

    if allowed.contains("*") {
        for key in overrides.keys() {
            if denied.contains(key.as_str()) {
                return (false, Some(format!("Override for {key:?} is explicitly denied")));
            }
        }
        return (true, None);
    }

    for key in overrides.keys() {
        if denied.contains(key.as_str()) {
            return (false, Some(format!("Override for {key:?} is explicitly denied")));
        }
        if !allowed.contains(key.as_str()) {
            let mut allowed_sorted: Vec<&str> = allowed.iter().copied().collect();
            allowed_sorted.sort_unstable();
            return (
                false,
                Some(format!(
                    "Override for {key:?} is not in allowed_overrides. Allowed: {allowed_sorted:?}"
                ))
            );
        }
    }

    (true, None)
}

fn wildcard() -> Vec<String> {
    vec!["*".to_string()]
}

fn string_set(value: Option<&Value>) -> HashSet<&str> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_str()).collect(),
        _ => HashSet::new()
    }
}

/// Numeric JSON values (numbers or numeric strings) as fixed-point.
pub(crate) fn value_as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s).ok(),
        _ => None
    }
}

fn decimal_to_value(decimal: Decimal) -> Value {
    if decimal.fract().is_zero() {
        if let Some(int) = decimal.to_i64() {
            return Value::from(int);
        }
    }
    decimal
        .to_f64()
        .and_then(serde_json::Number::from_f64)
        .map_or_else(|| Value::String(decimal.to_string()), Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn version(allowed_tools: Value, allowed_models: Value, risk: Value) -> VersionRecord {
        VersionRecord {
            blueprint_id: Uuid::new_v4(),
            version: 1,
            allowed_models,
            allowed_tools,
            default_risk_profile: risk,
            hierarchy_defaults: None,
            memory_strategy: None,
            escalation_rules: None,
            llm_defaults: json!({"provider": "openai"}),
            identity_defaults: json!({"persona": "terse"}),
            override_policy: None,
            changelog: None,
            published_at: Utc::now(),
            published_by: None
        }
    }

    fn bundle(tools: Value, model_constraints: Value, risk: Value) -> BundleRecord {
        BundleRecord {
            id: 1,
            workspace_id: 1,
            name: "b".to_string(),
            description: None,
            tool_set: tools,
            model_constraints,
            risk_constraints: risk,
            is_system: false,
            created_at: Utc::now()
        }
    }

    #[test]
    fn test_no_bundles_uses_blueprint_lists() {
        let v = version(json!(["read"]), json!([]), json!({}));
        let snapshot = resolve_capabilities(&v, &[]);
        assert_eq!(snapshot.allowed_tools, vec!["read"]);
        assert_eq!(snapshot.allowed_models, vec!["*"]);
    }

    #[test]
    fn test_union_intersection_and_min() {
        // Wildcard blueprint ceiling; two overlapping bundles.
        let v = version(json!(["*"]), json!([]), json!({}));
        let bundle_a = bundle(
            json!(["read", "write"]),
            json!({"allowed_providers": ["openai", "anthropic"]}),
            json!({"daily_spend_cap": 5})
        );
        let bundle_b = bundle(
            json!(["read", "delete"]),
            json!({"allowed_providers": ["openai"]}),
            json!({"daily_spend_cap": 10})
        );

        let snapshot = resolve_capabilities(&v, &[bundle_a, bundle_b]);
        assert_eq!(snapshot.allowed_tools, vec!["delete", "read", "write"]);
        assert_eq!(snapshot.allowed_models, vec!["openai"]);
        assert_eq!(snapshot.risk_profile["daily_spend_cap"], json!(5));
        assert_eq!(snapshot.llm_defaults, json!({"provider": "openai"}));
        assert_eq!(snapshot.identity_defaults, json!({"persona": "terse"}));
    }

    #[test]
    fn test_blueprint_ceiling_caps_tool_union() {
        let v = version(json!(["read", "write"]), json!([]), json!({}));
        let b = bundle(json!(["read", "delete"]), json!({}), json!({}));
        let snapshot = resolve_capabilities(&v, &[b]);
        assert_eq!(snapshot.allowed_tools, vec!["read"]);
    }

    #[test]
    fn test_empty_intersection_with_bundles_stays_empty() {
        let v = version(json!(["write"]), json!([]), json!({}));
        let b = bundle(json!(["read"]), json!({}), json!({}));
        let snapshot = resolve_capabilities(&v, &[b]);
        assert!(snapshot.allowed_tools.is_empty());
        // An empty list is a real restriction; only the wildcard form is
        // unrestricted.
        assert!(snapshot.tool_allowlist().is_some());
    }

    #[test]
    fn test_non_numeric_bundle_risk_keeps_blueprint_value() {
        let v = version(json!(["*"]), json!([]), json!({"daily_spend_cap": 3}));
        let b = bundle(json!(["read"]), json!({}), json!({"daily_spend_cap": "lots"}));
        let snapshot = resolve_capabilities(&v, &[b]);
        assert_eq!(snapshot.risk_profile["daily_spend_cap"], json!(3));
    }

    #[test]
    fn test_bundle_risk_key_not_in_blueprint_is_added() {
        let v = version(json!(["*"]), json!([]), json!({}));
        let b = bundle(json!(["read"]), json!({}), json!({"token_rate_cap": 1000}));
        let snapshot = resolve_capabilities(&v, &[b]);
        assert_eq!(snapshot.risk_profile["token_rate_cap"], json!(1000));
    }

    #[test]
    fn test_validate_overrides_no_policy() {
        let overrides = json!({"llm_defaults": {"model": "gpt-4o"}});
        let (valid, msg) = validate_overrides(Some(&overrides), None);
        assert!(!valid);
        assert!(msg.unwrap().contains("not permitted"));
    }

    #[test]
    fn test_validate_overrides_wildcard_with_denied() {
        let policy = json!({"allowed_overrides": ["*"], "denied_overrides": ["risk_profile"]});
        let ok = json!({"llm_defaults": {}});
        assert!(validate_overrides(Some(&ok), Some(&policy)).0);

        let bad = json!({"risk_profile": {}});
        let (valid, msg) = validate_overrides(Some(&bad), Some(&policy));
        assert!(!valid);
        assert!(msg.unwrap().contains("explicitly denied"));
    }

    #[test]
    fn test_validate_overrides_explicit_list() {
        let policy = json!({"allowed_overrides": ["llm_defaults"]});
        assert!(validate_overrides(Some(&json!({"llm_defaults": {}})), Some(&policy)).0);

        let (valid, msg) =
            validate_overrides(Some(&json!({"identity_defaults": {}})), Some(&policy));
        assert!(!valid);
        assert!(msg.unwrap().contains("not in allowed_overrides"));
    }

    #[test]
    fn test_validate_overrides_empty_is_fine() {
        assert!(validate_overrides(None, None).0);
        assert!(validate_overrides(Some(&json!({})), None).0);
    }
}
