//! Event assembly for the capture and exception façades.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::Client;
use crate::context::AnalyticsContext;
use crate::error::ErrorKind;
use crate::types::{ErrorId, Event, GROUPS_PROPERTY, Properties};

/// Event name used for captured exceptions.
pub const EXCEPTION_EVENT: &str = "$exception";

/// Builds one event. Nothing is recorded until [`send`](Self::send).
///
/// Properties are layered: context tags first, then the properties set on
/// the builder, so a builder property overrides a tag of the same name. An
/// explicit [`distinct_id`](Self::distinct_id) overrides the context identity.
#[must_use = "events are only captured when `send()` is called"]
pub struct CaptureBuilder<'a> {
    client: &'a Client,
    context: Option<&'a AnalyticsContext>,
    event: String,
    properties: Properties,
    groups: Properties,
    distinct_id: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

impl<'a> CaptureBuilder<'a> {
    pub(crate) fn new(
        client: &'a Client,
        context: Option<&'a AnalyticsContext>,
        event: String,
    ) -> Self {
        Self {
            client,
            context,
            event,
            properties: Properties::new(),
            groups: Properties::new(),
            distinct_id: None,
            timestamp: None,
        }
    }

    /// Sets one property.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Merges a map of properties.
    pub fn properties(mut self, properties: Properties) -> Self {
        self.properties.extend(properties);
        self
    }

    /// Associates the event with a group, e.g. `("company", "acme")`.
    pub fn group(mut self, group_type: impl Into<String>, group_key: impl Into<String>) -> Self {
        self.groups.insert(group_type.into(), Value::String(group_key.into()));
        self
    }

    /// Sets the distinct id, overriding any context identity.
    pub fn distinct_id(mut self, distinct_id: impl Into<String>) -> Self {
        self.distinct_id = Some(distinct_id.into());
        self
    }

    /// Sets the event time. Defaults to now.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Enqueues the event without waiting for delivery.
    ///
    /// Returns the event uuid, or `None` when the client is disabled, a
    /// processor dropped the event, or the queue was full or shut down.
    pub fn send(self) -> Option<Uuid> {
        let (identity, mut properties) = match self.context {
            Some(ctx) => ctx.snapshot(),
            None => (None, Properties::new()),
        };
        properties.extend(self.properties);
        if !self.groups.is_empty() {
            properties.insert(GROUPS_PROPERTY.to_string(), Value::Object(self.groups));
        }

        let mut event = Event::new(self.event)
            .with_distinct_id(self.distinct_id.or(identity))
            .with_properties(properties);
        if let Some(timestamp) = self.timestamp {
            event = event.with_timestamp(timestamp);
        }

        self.client.inner().enqueue(event)
    }
}

impl std::fmt::Debug for CaptureBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureBuilder")
            .field("event", &self.event)
            .field("distinct_id", &self.distinct_id)
            .field("properties", &self.properties.len())
            .finish_non_exhaustive()
    }
}

/// Builds the `$exception` event for `error`.
pub(crate) fn exception_event<E>(
    error: &E,
    error_id: &ErrorId,
    distinct_id: Option<String>,
    mut properties: Properties,
) -> Event
where
    E: std::error::Error + 'static,
{
    let chain: Vec<Value> =
        std::iter::successors(error.source(), |e| e.source()).map(|e| e.to_string().into()).collect();

    properties.insert("$exception_type".into(), short_type_name::<E>().into());
    if let Some(kind) = error_kind(error) {
        properties.insert("$exception_kind".into(), format!("{kind:?}").into());
    }
    properties.insert("$exception_message".into(), error.to_string().into());
    properties.insert("$exception_source_chain".into(), Value::Array(chain));
    properties.insert("$exception_id".into(), error_id.as_str().into());
    properties.insert("$exception_level".into(), "error".into());

    Event::new(EXCEPTION_EVENT).with_distinct_id(distinct_id).with_properties(properties)
}

/// Kind of the first [`crate::Error`] in `error`'s source chain, itself included.
fn error_kind(error: &(dyn std::error::Error + 'static)) -> Option<ErrorKind> {
    std::iter::successors(Some(error), |e| e.source())
        .find_map(|e| e.downcast_ref::<crate::Error>())
        .map(crate::Error::kind)
}

/// `my_app::errors::CheckoutError<T>` becomes `CheckoutError`.
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    let base = base.trim_start_matches('&').trim_start_matches("dyn ");
    let base = base.split(" + ").next().unwrap_or(base);
    base.rsplit("::").next().unwrap_or(base)
}
