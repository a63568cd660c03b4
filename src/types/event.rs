//! Captured event record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::Properties;

/// Property holding the group memberships of an event.
pub const GROUPS_PROPERTY: &str = "$groups";

/// A single analytics event.
///
/// Events are assembled by the capture façades and owned by the delivery
/// queue once captured. Processors in the [`Pipeline`](crate::pipeline::Pipeline)
/// may rewrite properties before the event is enqueued.
///
/// A `None` distinct id marks an anonymous event. The wire encoding replaces
/// it with a per-process anonymous id and disables person profile processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    uuid: Uuid,
    event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    distinct_id: Option<String>,
    #[serde(default)]
    properties: Properties,
    timestamp: DateTime<Utc>,
}

impl Event {
    /// Creates an anonymous event named `event`, stamped now.
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            event: event.into(),
            distinct_id: None,
            properties: Properties::new(),
            timestamp: Utc::now(),
        }
    }

    /// Sets the distinct id.
    #[must_use]
    pub fn with_distinct_id(mut self, distinct_id: Option<String>) -> Self {
        self.distinct_id = distinct_id;
        self
    }

    /// Replaces all properties.
    #[must_use]
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Sets the event timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Unique id of this event, used by the backend for deduplication.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Event name, e.g. `"burrito_considered"` or `"$exception"`.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Distinct id of the principal, or `None` for anonymous events.
    pub fn distinct_id(&self) -> Option<&str> {
        self.distinct_id.as_deref()
    }

    /// Returns `true` if the event carries no identity.
    pub fn is_anonymous(&self) -> bool {
        self.distinct_id.is_none()
    }

    /// All event properties.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Returns a single property.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Capture time in UTC.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Group memberships as `(group_type, group_key)` pairs.
    pub fn groups(&self) -> Vec<(&str, &str)> {
        match self.properties.get(GROUPS_PROPERTY) {
            Some(Value::Object(map)) => {
                map.iter().filter_map(|(k, v)| v.as_str().map(|v| (k.as_str(), v))).collect()
            },
            _ => Vec::new(),
        }
    }

    /// Sets or replaces a property.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Sets a property only if it is not already present.
    pub fn set_property_if_absent(&mut self, key: &str, value: impl Into<Value>) {
        if !self.properties.contains_key(key) {
            self.properties.insert(key.to_string(), value.into());
        }
    }

    /// Removes a property, returning its previous value.
    pub fn remove_property(&mut self, key: &str) -> Option<Value> {
        self.properties.remove(key)
    }
}
