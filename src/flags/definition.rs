//! Wire types for feature flag definitions and remote decisions.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Properties;

/// The value a feature flag resolves to for one principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum FlagValue {
    /// The flag is off, unknown, or could not be evaluated.
    #[default]
    Disabled,
    /// A boolean flag that is on.
    Enabled,
    /// A multivariate flag resolved to the named variant.
    Variant(String),
}

impl FlagValue {
    /// Returns `true` for [`FlagValue::Enabled`] and any variant.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, FlagValue::Disabled)
    }

    /// Returns the variant key, if this is a multivariate value.
    pub fn variant(&self) -> Option<&str> {
        match self {
            FlagValue::Variant(v) => Some(v),
            _ => None,
        }
    }

    /// Key under which this value's payload is stored.
    pub(crate) fn payload_key(&self) -> Option<&str> {
        match self {
            FlagValue::Disabled => None,
            FlagValue::Enabled => Some("true"),
            FlagValue::Variant(v) => Some(v),
        }
    }

    /// Converts a decide response value (`true`, `false` or a variant string).
    pub(crate) fn from_json(value: &Value) -> Self {
        match value {
            Value::Bool(true) => FlagValue::Enabled,
            Value::String(s) if !s.is_empty() => FlagValue::Variant(s.clone()),
            _ => FlagValue::Disabled,
        }
    }

    /// JSON form used in `$feature_flag_called` events.
    pub(crate) fn to_json(&self) -> Value {
        match self {
            FlagValue::Disabled => Value::Bool(false),
            FlagValue::Enabled => Value::Bool(true),
            FlagValue::Variant(v) => Value::String(v.clone()),
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Disabled => f.write_str("false"),
            FlagValue::Enabled => f.write_str("true"),
            FlagValue::Variant(v) => f.write_str(v),
        }
    }
}

/// Response of the local evaluation endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlagDefinitions {
    /// Every flag of the project.
    #[serde(default)]
    pub flags: Vec<FlagDefinition>,

    /// Group type index to group type name, e.g. `"0" -> "company"`.
    #[serde(default)]
    pub group_type_mapping: HashMap<String, String>,
}

/// A feature flag definition as served for local evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagDefinition {
    /// Flag key used by application code.
    pub key: String,

    /// Inactive flags always evaluate to disabled.
    #[serde(default = "default_true")]
    pub active: bool,

    /// Release conditions and variant configuration.
    #[serde(default)]
    pub filters: FlagFilters,
}

fn default_true() -> bool {
    true
}

/// Release conditions of a flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagFilters {
    /// Condition groups, OR-ed together in order.
    #[serde(default)]
    pub groups: Vec<ConditionGroup>,

    /// Variants of a multivariate flag.
    #[serde(default)]
    pub multivariate: Option<Multivariate>,

    /// Payloads by variant key, or `"true"` for boolean flags.
    ///
    /// The backend sends payloads as JSON-encoded strings.
    #[serde(default)]
    pub payloads: HashMap<String, Value>,

    /// Set when the flag is evaluated per group instead of per person.
    #[serde(default)]
    pub aggregation_group_type_index: Option<u32>,
}

/// One OR-branch of a flag's release conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    /// Property filters, AND-ed together.
    #[serde(default)]
    pub properties: Vec<PropertyCondition>,

    /// Share of matching principals that get the flag. `None` means 100%.
    #[serde(default)]
    pub rollout_percentage: Option<f64>,

    /// Forces this variant for principals matching the group.
    #[serde(default)]
    pub variant: Option<String>,
}

/// A single property condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyCondition {
    /// Property name.
    pub key: String,

    /// Value to compare against.
    #[serde(default)]
    pub value: Value,

    /// Comparison operator. Defaults to `exact`.
    #[serde(default)]
    pub operator: Option<String>,

    /// Filter kind: `person`, `group` or `cohort`.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// Variant configuration of a multivariate flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Multivariate {
    /// Variants in rollout order.
    #[serde(default)]
    pub variants: Vec<Variant>,
}

/// A multivariate flag variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Variant key returned to application code.
    pub key: String,

    /// Share of enabled principals that receive this variant.
    #[serde(default)]
    pub rollout_percentage: f64,
}

impl FlagDefinition {
    /// Returns the decoded payload stored under `payload_key`.
    pub fn payload(&self, payload_key: &str) -> Option<Value> {
        self.filters.payloads.get(payload_key).map(decode_payload)
    }
}

/// Request body of the remote decide endpoint, without the api key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecideRequest {
    /// Principal to evaluate flags for.
    pub distinct_id: String,

    /// Person properties known to the caller.
    #[serde(skip_serializing_if = "Properties::is_empty")]
    pub person_properties: Properties,

    /// Group memberships, group type to group key.
    #[serde(skip_serializing_if = "Properties::is_empty")]
    pub groups: Properties,
}

/// Response of the remote decide endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecideResponse {
    /// Flag key to `true`, `false` or variant key.
    #[serde(default)]
    pub feature_flags: HashMap<String, Value>,

    /// Flag key to JSON-encoded payload.
    #[serde(default)]
    pub feature_flag_payloads: HashMap<String, Value>,

    /// Set when the backend could not compute some flags.
    #[serde(default)]
    pub errors_while_computing_flags: bool,
}

impl DecideResponse {
    /// Value of `key`, disabled when absent.
    pub fn value(&self, key: &str) -> FlagValue {
        self.feature_flags.get(key).map(FlagValue::from_json).unwrap_or_default()
    }

    /// Decoded payload of `key`.
    pub fn payload(&self, key: &str) -> Option<Value> {
        self.feature_flag_payloads.get(key).filter(|v| !v.is_null()).map(decode_payload)
    }
}

/// Payloads arrive as JSON strings; anything that does not parse is kept as a string.
pub(crate) fn decode_payload(raw: &Value) -> Value {
    match raw {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| raw.clone()),
        other => other.clone(),
    }
}
