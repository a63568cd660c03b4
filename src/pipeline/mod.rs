//! Event processors applied before events are queued.
//!
//! Processors see every captured event in insertion order and may rewrite it
//! or drop it by returning `None`. Typical uses are stripping PII, adding
//! deployment metadata, or sampling noisy events.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ capture / capture_exception / identify / flag reads      │
//! └───────────────────────────┬──────────────────────────────┘
//!                             ▼
//!              ┌─────────────────────────────┐
//!              │ library properties          │  $lib, $lib_version
//!              └──────────────┬──────────────┘
//!                             ▼
//!              ┌─────────────────────────────┐
//!              │ Processor 1 .. N            │  None drops the event
//!              └──────────────┬──────────────┘
//!                             ▼
//!              ┌─────────────────────────────┐
//!              │ Delivery queue              │
//!              └─────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use ambit::pipeline::{Pipeline, PropertyFilter, StaticProperties};
//! use ambit::Event;
//!
//! let pipeline = Pipeline::new()
//!     .with(PropertyFilter::new(["email", "phone"]))
//!     .with(StaticProperties::new().with("environment", "production"))
//!     .with(|event: Event| (event.event() != "healthcheck").then_some(event));
//!
//! assert_eq!(pipeline.len(), 3);
//! ```

use std::collections::HashSet;
use std::fmt;

use serde_json::Value;

use crate::types::{Event, Properties};
use crate::user_agent;

/// Library name stamped on every event as `$lib`.
pub const LIB_NAME: &str = "ambit-rust";

/// Rewrites or drops events before they are queued.
///
/// Any `Fn(Event) -> Option<Event>` closure is a processor.
///
/// ## Example
///
/// ```rust
/// use ambit::pipeline::EventProcessor;
/// use ambit::Event;
///
/// struct DropBots;
///
/// impl EventProcessor for DropBots {
///     fn process(&self, event: Event) -> Option<Event> {
///         let is_bot = event
///             .property("$user_agent")
///             .and_then(|v| v.as_str())
///             .is_some_and(|ua| ua.contains("bot"));
///         (!is_bot).then_some(event)
///     }
/// }
/// ```
pub trait EventProcessor: Send + Sync + 'static {
    /// Returns the event to keep, or `None` to drop it.
    fn process(&self, event: Event) -> Option<Event>;

    /// Name used in debug logs when this processor drops an event.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> EventProcessor for F
where
    F: Fn(Event) -> Option<Event> + Send + Sync + 'static,
{
    fn process(&self, event: Event) -> Option<Event> {
        self(event)
    }

    fn name(&self) -> &str {
        "closure"
    }
}

/// An ordered list of processors.
pub struct Pipeline {
    processors: Vec<Box<dyn EventProcessor>>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self { processors: Vec::new() }
    }

    /// Appends a processor. Processors run in the order added.
    pub fn push(&mut self, processor: impl EventProcessor) {
        self.processors.push(Box::new(processor));
    }

    /// Appends a processor (builder pattern).
    #[must_use]
    pub fn with(mut self, processor: impl EventProcessor) -> Self {
        self.push(processor);
        self
    }

    /// Returns `true` if no processors are registered.
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Number of registered processors.
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Stamps library properties and runs every processor.
    pub fn run(&self, mut event: Event) -> Option<Event> {
        event.set_property("$lib", LIB_NAME);
        event.set_property("$lib_version", user_agent::VERSION);

        for processor in &self.processors {
            let name = event.event().to_string();
            match processor.process(event) {
                Some(next) => event = next,
                None => {
                    tracing::debug!(event = %name, processor = processor.name(), "event dropped by processor");
                    return None;
                },
            }
        }
        Some(event)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline").field("len", &self.processors.len()).finish()
    }
}

/// Removes named properties from every event.
#[derive(Debug, Clone, Default)]
pub struct PropertyFilter {
    keys: HashSet<String>,
}

impl PropertyFilter {
    /// Creates a filter that strips `keys`.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { keys: keys.into_iter().map(Into::into).collect() }
    }
}

impl EventProcessor for PropertyFilter {
    fn process(&self, mut event: Event) -> Option<Event> {
        for key in &self.keys {
            event.remove_property(key);
        }
        Some(event)
    }

    fn name(&self) -> &str {
        "PropertyFilter"
    }
}

/// Adds fixed properties to every event without overriding captured ones.
#[derive(Debug, Clone, Default)]
pub struct StaticProperties {
    properties: Properties,
}

impl StaticProperties {
    /// Creates an empty set of static properties.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a property (builder pattern).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl EventProcessor for StaticProperties {
    fn process(&self, mut event: Event) -> Option<Event> {
        for (key, value) in &self.properties {
            event.set_property_if_absent(key, value.clone());
        }
        Some(event)
    }

    fn name(&self) -> &str {
        "StaticProperties"
    }
}
