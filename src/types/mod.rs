//! Core types for the ambit client.
//!
//! - [`Event`]: A captured analytics event
//! - [`Properties`]: JSON property map attached to events and people
//! - [`ErrorId`]: Correlation id returned by exception capture

mod event;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use event::{Event, GROUPS_PROPERTY};

/// A JSON object of event or person properties.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Correlation id of a captured exception.
///
/// Show it to end users ("Reference ID: ...") so support staff can find the
/// matching `$exception` event. Each capture yields a fresh id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorId(String);

impl ErrorId {
    /// Generates a new random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ErrorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ErrorId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<ErrorId> for String {
    fn from(id: ErrorId) -> Self {
        id.0
    }
}
