//! The analytics client.
//!
//! [`Client`] is the entry point. It owns the delivery queue and the flag
//! cache and exposes the façades:
//!
//! - [`Client::capture`] / [`Client::capture_exception`]: record events
//! - [`Client::flag_enabled`] / [`Client::flag_value`] / [`Client::flag_payload`]:
//!   feature flags
//! - [`Client::identify`] / [`Client::group_identify`] / [`Client::alias`]:
//!   person and group updates
//! - [`Client::new_context`]: request-scoped identity and tags
//!
//! None of the façades return transport errors. Delivery happens on a
//! background task; call [`Client::shutdown`] once at process exit so queued
//! events are not lost.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ambit::prelude::*;
//!
//! # async fn example() -> ambit::Result<()> {
//! let client = Client::builder().api_key("phc_project_key").build().await?;
//!
//! client.capture("server_started").property("version", "1.4.0").send();
//!
//! if client.flag_enabled("new-billing", "user-42", &Properties::new()).await {
//!     // ...
//! }
//!
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod builder;
mod capture;
mod inner;

pub use builder::{ClientBuilder, HasApiKey, NoApiKey};
pub use capture::{CaptureBuilder, EXCEPTION_EVENT};

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use crate::config::Settings;
use crate::error::Error;
use crate::flags::FlagValue;
use crate::queue::QueueStats;
use crate::transport::{Transport, TransportStats};
use crate::types::{ErrorId, Event, Properties};

/// Event name recorded the first time a flag value is read for a user.
pub const FLAG_CALLED_EVENT: &str = "$feature_flag_called";

/// The analytics client.
///
/// ## Thread Safety
///
/// `Client` is `Clone` and thread-safe. Clones share the same queue and flag
/// cache, so create one client at startup and hand clones to tasks.
#[derive(Clone)]
pub struct Client {
    inner: Arc<inner::ClientInner>,
}

impl Client {
    /// Creates a new client builder.
    ///
    /// The builder uses the typestate pattern: `build()` is only available
    /// after `api_key()` has been called.
    pub fn builder() -> ClientBuilder<NoApiKey> {
        ClientBuilder::new()
    }

    /// Builds a client from [`Settings`], e.g. loaded from the environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the settings do not produce a valid
    /// client (see [`ClientBuilder::build`]).
    pub async fn from_settings(settings: &Settings) -> Result<Self, Error> {
        settings.client_builder().build().await
    }

    /// Starts an event with no context.
    ///
    /// Without a [`distinct_id`](CaptureBuilder::distinct_id) the event is
    /// anonymous.
    pub fn capture(&self, event: impl Into<String>) -> CaptureBuilder<'_> {
        CaptureBuilder::new(self, None, event.into())
    }

    /// Captures `error` as an `$exception` event and returns its correlation id.
    ///
    /// A fresh id is returned on every call, even when the client is disabled.
    pub fn capture_exception<E>(&self, error: &E, distinct_id: Option<&str>) -> ErrorId
    where
        E: std::error::Error + 'static,
    {
        self.exception(error, distinct_id.map(str::to_string), Properties::new())
    }

    pub(crate) fn exception<E>(
        &self,
        error: &E,
        distinct_id: Option<String>,
        properties: Properties,
    ) -> ErrorId
    where
        E: std::error::Error + 'static,
    {
        let error_id = ErrorId::generate();
        let event = capture::exception_event(error, &error_id, distinct_id, properties);
        self.inner.enqueue(event);
        error_id
    }

    /// Sets person properties for `distinct_id` (`$identify` with `$set`).
    pub fn identify(&self, distinct_id: impl Into<String>, properties: Properties) -> Option<Uuid> {
        let mut props = Properties::new();
        props.insert("$set".into(), Value::Object(properties));
        let event = Event::new("$identify")
            .with_distinct_id(Some(distinct_id.into()))
            .with_properties(props);
        self.inner.enqueue(event)
    }

    /// Sets properties on a group (`$groupidentify`).
    pub fn group_identify(
        &self,
        group_type: impl Into<String>,
        group_key: impl Into<String>,
        properties: Properties,
    ) -> Option<Uuid> {
        let group_type = group_type.into();
        let group_key = group_key.into();

        let mut props = Properties::new();
        props.insert("$group_type".into(), group_type.clone().into());
        props.insert("$group_key".into(), group_key.clone().into());
        props.insert("$group_set".into(), Value::Object(properties));

        let event = Event::new("$groupidentify")
            .with_distinct_id(Some(format!("$group_{group_type}_{group_key}")))
            .with_properties(props);
        self.inner.enqueue(event)
    }

    /// Links `previous_id` to `distinct_id` (`$create_alias`).
    pub fn alias(&self, previous_id: impl Into<String>, distinct_id: impl Into<String>) -> Option<Uuid> {
        let distinct_id = distinct_id.into();

        let mut props = Properties::new();
        props.insert("distinct_id".into(), distinct_id.clone().into());
        props.insert("alias".into(), previous_id.into().into());

        let event = Event::new("$create_alias")
            .with_distinct_id(Some(distinct_id))
            .with_properties(props);
        self.inner.enqueue(event)
    }

    /// Returns `true` if `key` is enabled for `distinct_id`.
    pub async fn flag_enabled(
        &self,
        key: &str,
        distinct_id: &str,
        person_properties: &Properties,
    ) -> bool {
        self.flag_value(key, distinct_id, person_properties).await.is_enabled()
    }

    /// Resolves `key` for `distinct_id`, including the variant of
    /// multivariate flags.
    pub async fn flag_value(
        &self,
        key: &str,
        distinct_id: &str,
        person_properties: &Properties,
    ) -> FlagValue {
        self.flag_value_with_groups(key, distinct_id, person_properties, &Properties::new()).await
    }

    /// Like [`flag_value`](Self::flag_value) with group keys
    /// (`{"company": "acme"}`) for group-aggregated flags.
    pub async fn flag_value_with_groups(
        &self,
        key: &str,
        distinct_id: &str,
        person_properties: &Properties,
        groups: &Properties,
    ) -> FlagValue {
        let resolved = self.inner.flags.resolve(key, distinct_id, person_properties, groups).await;
        self.report_flag_called(key, distinct_id, &resolved.value);
        resolved.value
    }

    /// Returns the payload attached to the value `key` resolves to for
    /// `distinct_id`, if any.
    pub async fn flag_payload(&self, key: &str, distinct_id: &str) -> Option<Value> {
        self.flag_payload_with(key, distinct_id, &Properties::new()).await
    }

    /// Payload lookup with person properties for local evaluation.
    pub(crate) async fn flag_payload_with(
        &self,
        key: &str,
        distinct_id: &str,
        person_properties: &Properties,
    ) -> Option<Value> {
        self.inner.flags.resolve(key, distinct_id, person_properties, &Properties::new()).await.payload
    }

    /// Reloads flag definitions now instead of waiting for the cache to expire.
    pub async fn reload_feature_flags(&self) {
        self.inner.flags.reload().await;
    }

    /// Number of flags available for local evaluation.
    pub fn local_flag_count(&self) -> usize {
        self.inner.flags.local_flag_count()
    }

    /// Delivers every queued event and waits for the backend to answer.
    pub async fn flush(&self) {
        if let Some(ref queue) = self.inner.queue {
            queue.flush().await;
        }
    }

    /// Flushes and stops the delivery worker. Later captures are dropped.
    ///
    /// Call once at process exit.
    pub async fn shutdown(&self) {
        if let Some(ref queue) = self.inner.queue {
            queue.shutdown().await;
        }
    }

    /// Like [`shutdown`](Self::shutdown) but gives up after `timeout`.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn shutdown_timeout(&self, timeout: Duration) -> bool {
        match self.inner.queue {
            Some(ref queue) => queue.shutdown_timeout(timeout).await,
            None => true,
        }
    }

    /// Returns `true` if the client was built disabled.
    pub fn is_disabled(&self) -> bool {
        self.inner.disabled
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has started.
    pub fn is_shut_down(&self) -> bool {
        self.inner.queue.as_ref().is_some_and(|queue| queue.is_closed())
    }

    /// The configured backend host.
    pub fn host(&self) -> &str {
        &self.inner.host
    }

    /// Delivery counters.
    pub fn stats(&self) -> QueueStats {
        self.inner.queue.as_ref().map(|queue| queue.stats()).unwrap_or_default()
    }

    /// Transport counters, if a transport is configured.
    pub fn transport_stats(&self) -> Option<TransportStats> {
        self.inner.transport.as_ref().map(|transport| transport.stats())
    }

    /// The active transport kind, or `None` when disabled.
    pub fn transport_type(&self) -> Option<Transport> {
        self.inner.transport.as_ref().map(|transport| transport.transport_type())
    }

    pub(crate) fn from_inner(inner: inner::ClientInner) -> Self {
        Self { inner: Arc::new(inner) }
    }

    pub(crate) fn inner(&self) -> &inner::ClientInner {
        &self.inner
    }

    fn report_flag_called(&self, key: &str, distinct_id: &str, value: &FlagValue) {
        if !self.inner.flags.config().send_flag_called_events {
            return;
        }
        if !self.inner.flags.first_call(key, distinct_id, value) {
            return;
        }

        let mut props = Properties::new();
        props.insert("$feature_flag".into(), key.into());
        props.insert("$feature_flag_response".into(), value.to_json());
        props.insert(format!("$feature/{key}"), value.to_json());

        let event = Event::new(FLAG_CALLED_EVENT)
            .with_distinct_id(Some(distinct_id.to_string()))
            .with_properties(props);
        self.inner.enqueue(event);
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.inner.host)
            .field("disabled", &self.inner.disabled)
            .finish_non_exhaustive()
    }
}
