//! Local feature flag evaluation.
//!
//! Evaluation is deterministic: the same flag definition, distinct id and
//! properties always produce the same [`FlagValue`]. A definition that needs
//! information the caller did not supply yields [`Inconclusive`] so the caller
//! can ask the backend instead.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::definition::{ConditionGroup, FlagDefinition, FlagValue, PropertyCondition};
use crate::types::Properties;

/// Largest value of 15 hex digits; the rollout hash is scaled by it into `[0, 1]`.
const LONG_SCALE: u64 = 0xFFF_FFFF_FFFF_FFFF;

/// Salt separating variant assignment from rollout assignment.
const VARIANT_SALT: &str = "variant";

/// Local evaluation could not reach a decision.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("inconclusive flag evaluation: {0}")]
pub struct Inconclusive(pub String);

/// Maps `"{key}.{distinct_id}{salt}"` to a stable number in `[0, 1]`.
pub fn rollout_hash(key: &str, distinct_id: &str, salt: &str) -> f64 {
    let digest = Sha256::digest(format!("{}.{}{}", key, distinct_id, salt).as_bytes());
    let hex = hex::encode(digest);
    let value = u64::from_str_radix(&hex[..15], 16).unwrap_or(0);
    value as f64 / LONG_SCALE as f64
}

/// Evaluates `flag` for `distinct_id` using the supplied person properties.
pub fn evaluate(
    flag: &FlagDefinition,
    distinct_id: &str,
    properties: &Properties,
) -> Result<FlagValue, Inconclusive> {
    if !flag.active {
        return Ok(FlagValue::Disabled);
    }
    if flag.filters.aggregation_group_type_index.is_some() {
        return Err(Inconclusive(format!("flag '{}' is evaluated per group", flag.key)));
    }

    let mut inconclusive = None;
    for group in &flag.filters.groups {
        match condition_matches(flag, group, distinct_id, properties) {
            Ok(true) => return Ok(matched_value(flag, group, distinct_id)),
            Ok(false) => {},
            Err(e) => inconclusive = Some(e),
        }
    }

    match inconclusive {
        Some(e) => Err(e),
        None => Ok(FlagValue::Disabled),
    }
}

fn condition_matches(
    flag: &FlagDefinition,
    group: &ConditionGroup,
    distinct_id: &str,
    properties: &Properties,
) -> Result<bool, Inconclusive> {
    for filter in &group.properties {
        if !match_property(filter, properties)? {
            return Ok(false);
        }
    }

    let rollout = group.rollout_percentage.unwrap_or(100.0);
    if rollout >= 100.0 {
        return Ok(true);
    }
    Ok(rollout_hash(&flag.key, distinct_id, "") < rollout / 100.0)
}

fn matched_value(flag: &FlagDefinition, group: &ConditionGroup, distinct_id: &str) -> FlagValue {
    let variants = flag.filters.multivariate.as_ref().map(|m| m.variants.as_slice()).unwrap_or(&[]);

    if let Some(forced) = group.variant.as_ref().filter(|f| variants.iter().any(|v| &v.key == *f)) {
        return FlagValue::Variant(forced.clone());
    }

    if variants.is_empty() {
        return FlagValue::Enabled;
    }

    let hash = rollout_hash(&flag.key, distinct_id, VARIANT_SALT);
    let mut lower = 0.0;
    for variant in variants {
        let upper = lower + variant.rollout_percentage / 100.0;
        if hash >= lower && hash < upper {
            return FlagValue::Variant(variant.key.clone());
        }
        lower = upper;
    }
    FlagValue::Enabled
}

/// Matches a single property filter against the supplied properties.
pub fn match_property(
    filter: &PropertyCondition,
    properties: &Properties,
) -> Result<bool, Inconclusive> {
    if filter.kind.as_deref() == Some("cohort") {
        return Err(Inconclusive(format!("cohort filter on '{}'", filter.key)));
    }

    let operator = filter.operator.as_deref().unwrap_or("exact");
    let Some(actual) = properties.get(&filter.key) else {
        return Err(Inconclusive(format!("missing property '{}'", filter.key)));
    };

    let expected = &filter.value;
    let matched = match operator {
        "exact" => exact(expected, actual),
        "is_not" => !exact(expected, actual),
        "is_set" => true,
        "is_not_set" => false,
        "icontains" => contains_ci(actual, expected),
        "not_icontains" => !contains_ci(actual, expected),
        "regex" => compile(expected).is_some_and(|re| re.is_match(&stringify(actual))),
        "not_regex" => compile(expected).is_some_and(|re| !re.is_match(&stringify(actual))),
        "gt" => compare(actual, expected) == Some(Ordering::Greater),
        "gte" => matches!(compare(actual, expected), Some(Ordering::Greater | Ordering::Equal)),
        "lt" => compare(actual, expected) == Some(Ordering::Less),
        "lte" => matches!(compare(actual, expected), Some(Ordering::Less | Ordering::Equal)),
        other => return Err(Inconclusive(format!("unknown operator '{}'", other))),
    };
    Ok(matched)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn exact(expected: &Value, actual: &Value) -> bool {
    let actual = stringify(actual).to_lowercase();
    match expected {
        Value::Array(options) => options.iter().any(|o| stringify(o).to_lowercase() == actual),
        single => stringify(single).to_lowercase() == actual,
    }
}

fn contains_ci(haystack: &Value, needle: &Value) -> bool {
    stringify(haystack).to_lowercase().contains(&stringify(needle).to_lowercase())
}

fn compile(pattern: &Value) -> Option<Regex> {
    Regex::new(&stringify(pattern)).ok()
}

fn compare(actual: &Value, expected: &Value) -> Option<Ordering> {
    let (a, e) = (stringify(actual), stringify(expected));
    match (a.parse::<f64>(), e.parse::<f64>()) {
        (Ok(a), Ok(e)) => a.partial_cmp(&e),
        _ => Some(a.cmp(&e)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;
    use test_case::test_case;

    use super::*;
    use crate::flags::definition::{FlagFilters, Multivariate, Variant};

    fn props(value: Value) -> Properties {
        value.as_object().cloned().unwrap()
    }

    fn filter(key: &str, operator: &str, value: Value) -> PropertyCondition {
        PropertyCondition {
            key: key.into(),
            value,
            operator: Some(operator.into()),
            kind: Some("person".into()),
        }
    }

    fn flag(groups: Vec<ConditionGroup>) -> FlagDefinition {
        FlagDefinition {
            key: "new-dashboard-feature".into(),
            active: true,
            filters: FlagFilters { groups, ..Default::default() },
        }
    }

    fn rollout(percentage: f64) -> ConditionGroup {
        ConditionGroup { rollout_percentage: Some(percentage), ..Default::default() }
    }

    #[test]
    fn test_hash_in_unit_range_and_stable() {
        let a = rollout_hash("flag", "user-1", "");
        assert!((0.0..=1.0).contains(&a));
        assert_eq!(a, rollout_hash("flag", "user-1", ""));
        assert_ne!(a, rollout_hash("flag", "user-1", VARIANT_SALT));
    }

    #[test_case("exact", json!("ALICE@example.com"), true ; "exact case insensitive")]
    #[test_case("exact", json!(["bob@example.com", "alice@example.com"]), true ; "exact list")]
    #[test_case("exact", json!("bob@example.com"), false ; "exact mismatch")]
    #[test_case("is_not", json!("bob@example.com"), true ; "is not")]
    #[test_case("icontains", json!("EXAMPLE"), true ; "icontains")]
    #[test_case("not_icontains", json!("example"), false ; "not icontains")]
    #[test_case("regex", json!(r"^alice@.*\.com$"), true ; "regex")]
    #[test_case("regex", json!("(unclosed"), false ; "invalid regex never matches")]
    #[test_case("not_regex", json!("^bob"), true ; "not regex")]
    #[test_case("not_regex", json!("(unclosed"), false ; "invalid not regex never matches")]
    #[test_case("is_set", json!("is_set"), true ; "is set")]
    fn test_string_operators(operator: &str, value: Value, expected: bool) {
        let p = props(json!({"email": "alice@example.com"}));
        assert_eq!(match_property(&filter("email", operator, value), &p), Ok(expected));
    }

    #[test_case("gt", json!(10), true ; "gt")]
    #[test_case("gte", json!("42"), true ; "gte numeric string")]
    #[test_case("lt", json!(42), false ; "lt equal")]
    #[test_case("lte", json!(42), true ; "lte")]
    #[test_case("gt", json!(100), false ; "gt false")]
    fn test_numeric_operators(operator: &str, value: Value, expected: bool) {
        let p = props(json!({"age": 42}));
        assert_eq!(match_property(&filter("age", operator, value), &p), Ok(expected));
    }

    #[test]
    fn test_string_comparison_fallback() {
        let p = props(json!({"plan": "pro"}));
        assert_eq!(match_property(&filter("plan", "gt", json!("enterprise")), &p), Ok(true));
    }

    #[test]
    fn test_missing_property_is_inconclusive() {
        let p = props(json!({}));
        assert!(match_property(&filter("email", "exact", json!("a")), &p).is_err());
        assert!(match_property(&filter("email", "is_not_set", json!("")), &p).is_err());
    }

    #[test]
    fn test_cohort_filter_is_inconclusive() {
        let mut f = filter("id", "in", json!(3));
        f.kind = Some("cohort".into());
        assert!(match_property(&f, &props(json!({"id": 3}))).is_err());
    }

    #[test]
    fn test_inactive_flag_disabled() {
        let mut f = flag(vec![rollout(100.0)]);
        f.active = false;
        assert_eq!(evaluate(&f, "u1", &Properties::new()), Ok(FlagValue::Disabled));
    }

    #[test]
    fn test_full_and_zero_rollout() {
        let empty = Properties::new();
        assert_eq!(evaluate(&flag(vec![rollout(100.0)]), "u1", &empty), Ok(FlagValue::Enabled));
        assert_eq!(evaluate(&flag(vec![rollout(0.0)]), "u1", &empty), Ok(FlagValue::Disabled));
        assert_eq!(evaluate(&flag(vec![]), "u1", &empty), Ok(FlagValue::Disabled));
    }

    #[test]
    fn test_partial_rollout_distribution() {
        let f = flag(vec![rollout(30.0)]);
        let empty = Properties::new();
        let enabled = (0..2000)
            .filter(|i| evaluate(&f, &format!("user-{}", i), &empty).unwrap().is_enabled())
            .count();
        assert!((450..750).contains(&enabled), "enabled = {}", enabled);
    }

    #[test]
    fn test_staff_condition() {
        let group = ConditionGroup {
            properties: vec![filter("is_staff", "exact", json!(["true"]))],
            rollout_percentage: Some(100.0),
            variant: None,
        };
        let f = flag(vec![group]);
        assert_eq!(evaluate(&f, "u1", &props(json!({"is_staff": true}))), Ok(FlagValue::Enabled));
        assert_eq!(evaluate(&f, "u1", &props(json!({"is_staff": false}))), Ok(FlagValue::Disabled));
        assert!(evaluate(&f, "u1", &Properties::new()).is_err());
    }

    #[test]
    fn test_later_group_match_beats_inconclusive() {
        let first = ConditionGroup {
            properties: vec![filter("email", "icontains", json!("@corp.com"))],
            ..Default::default()
        };
        let f = flag(vec![first, rollout(100.0)]);
        assert_eq!(evaluate(&f, "u1", &Properties::new()), Ok(FlagValue::Enabled));
    }

    #[test]
    fn test_group_aggregated_flag_is_inconclusive() {
        let mut f = flag(vec![rollout(100.0)]);
        f.filters.aggregation_group_type_index = Some(0);
        assert!(evaluate(&f, "u1", &Properties::new()).is_err());
    }

    fn multivariate(groups: Vec<ConditionGroup>) -> FlagDefinition {
        let mut f = flag(groups);
        f.filters.multivariate = Some(Multivariate {
            variants: vec![
                Variant { key: "control".into(), rollout_percentage: 50.0 },
                Variant { key: "test".into(), rollout_percentage: 50.0 },
            ],
        });
        f
    }

    #[test]
    fn test_variants_cover_all_users() {
        let f = multivariate(vec![rollout(100.0)]);
        let empty = Properties::new();
        let mut seen = std::collections::HashSet::new();
        for i in 0..200 {
            match evaluate(&f, &format!("user-{}", i), &empty).unwrap() {
                FlagValue::Variant(v) => {
                    seen.insert(v);
                },
                other => panic!("expected variant, got {:?}", other),
            }
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_forced_variant_override() {
        let group = ConditionGroup {
            rollout_percentage: Some(100.0),
            variant: Some("test".into()),
            ..Default::default()
        };
        let f = multivariate(vec![group]);
        for i in 0..20 {
            assert_eq!(
                evaluate(&f, &format!("user-{}", i), &Properties::new()),
                Ok(FlagValue::Variant("test".into()))
            );
        }
    }

    proptest! {
        #[test]
        fn prop_evaluation_is_deterministic(id in "[a-z0-9@._-]{1,40}", pct in 0.0f64..100.0) {
            let f = multivariate(vec![rollout(pct)]);
            let empty = Properties::new();
            prop_assert_eq!(evaluate(&f, &id, &empty), evaluate(&f, &id, &empty));
        }

        #[test]
        fn prop_rollout_is_monotonic(id in "[a-z0-9]{1,24}", lo in 0.0f64..100.0, extra in 0.0f64..100.0) {
            let hi = (lo + extra).min(100.0);
            let empty = Properties::new();
            let low = evaluate(&flag(vec![rollout(lo)]), &id, &empty).unwrap();
            let high = evaluate(&flag(vec![rollout(hi)]), &id, &empty).unwrap();
            prop_assert!(!low.is_enabled() || high.is_enabled());
        }
    }
}
