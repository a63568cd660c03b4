//! Request-scoped analytics context.
//!
//! An [`AnalyticsContext`] carries the acting principal's identity and a set
//! of tags for one logical request. Events and exceptions captured through it
//! inherit both. The context is opened with [`Client::new_context`] and
//! released when the returned [`ContextGuard`] is dropped, which happens on
//! every exit path: normal return, early return, `?`, panic unwinding, and
//! future cancellation.
//!
//! Contexts are plain values passed through function parameters or request
//! extensions. Clones of an [`AnalyticsContext`] share state, so sub-tasks of
//! one request see the same identity; separate requests never share a context.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ambit::{Client, MockTransport};
//!
//! # tokio_test::block_on(async {
//! let transport = Arc::new(MockTransport::new());
//! let client = Client::builder()
//!     .api_key("phc_test")
//!     .transport(transport.clone())
//!     .build()
//!     .await
//!     .unwrap();
//!
//! {
//!     let ctx = client.new_context();
//!     ctx.identify("user-42");
//!     ctx.tag("plan", "pro");
//!     ctx.capture("report_exported").property("format", "csv").send();
//! } // released here
//!
//! client.flush().await;
//! let event = &transport.events_named("report_exported")[0];
//! assert_eq!(event.distinct_id(), Some("user-42"));
//! assert_eq!(event.property("plan"), Some(&serde_json::json!("pro")));
//! # });
//! ```

use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::Client;
use crate::client::CaptureBuilder;
use crate::flags::FlagValue;
use crate::types::{ErrorId, Properties};

#[derive(Debug, Default, Clone)]
struct ContextState {
    identity: Option<String>,
    tags: Properties,
    active: bool,
}

/// Identity and tags for one logical request.
///
/// Obtained by dereferencing a [`ContextGuard`]. Cloning is cheap and the
/// clones share state.
#[derive(Clone)]
pub struct AnalyticsContext {
    state: Arc<RwLock<ContextState>>,
    client: Client,
}

impl AnalyticsContext {
    fn open(client: Client, state: ContextState) -> ContextGuard {
        let context = Self {
            state: Arc::new(RwLock::new(ContextState { active: true, ..state })),
            client,
        };
        ContextGuard { context }
    }

    pub(crate) fn fresh(client: Client) -> ContextGuard {
        Self::open(client, ContextState::default())
    }

    /// Opens a nested context.
    ///
    /// The child starts with a copy of this context's identity and tags.
    /// Writes on the child never reach the parent.
    pub fn child(&self) -> ContextGuard {
        let state = self.state.read().clone();
        Self::open(self.client.clone(), state)
    }

    /// Sets the acting principal. The last call wins.
    pub fn identify(&self, distinct_id: impl Into<String>) {
        let mut state = self.state.write();
        if !state.active {
            tracing::debug!("identify on a released analytics context ignored");
            return;
        }
        state.identity = Some(distinct_id.into());
    }

    /// Sets one tag. The last write for a key wins.
    pub fn tag(&self, key: impl Into<String>, value: impl Into<Value>) {
        let mut state = self.state.write();
        if !state.active {
            tracing::debug!("tag on a released analytics context ignored");
            return;
        }
        state.tags.insert(key.into(), value.into());
    }

    /// Returns `false` once the context has been released.
    pub fn is_active(&self) -> bool {
        self.state.read().active
    }

    /// The current identity, if any.
    pub fn distinct_id(&self) -> Option<String> {
        self.state.read().identity.clone()
    }

    /// A copy of the current tags.
    pub fn tags(&self) -> Properties {
        self.state.read().tags.clone()
    }

    /// The client this context captures through.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Starts an event carrying this context's identity and tags.
    pub fn capture(&self, event: impl Into<String>) -> CaptureBuilder<'_> {
        CaptureBuilder::new(&self.client, Some(self), event.into())
    }

    /// Captures `error` as an `$exception` event with this context's identity
    /// and tags. Always returns a fresh correlation id.
    pub fn capture_exception<E>(&self, error: &E) -> ErrorId
    where
        E: std::error::Error + 'static,
    {
        let (identity, tags) = self.snapshot();
        self.client.exception(error, identity, tags)
    }

    /// Like [`capture_exception`](Self::capture_exception) with an explicit
    /// distinct id that wins over the context identity.
    pub fn capture_exception_as<E>(&self, error: &E, distinct_id: &str) -> ErrorId
    where
        E: std::error::Error + 'static,
    {
        let (_, tags) = self.snapshot();
        self.client.exception(error, Some(distinct_id.to_string()), tags)
    }

    /// Evaluates a boolean flag for this context's identity, using the tags as
    /// person properties. Anonymous contexts always read `false`.
    pub async fn flag_enabled(&self, key: &str) -> bool {
        self.flag_value(key).await.is_enabled()
    }

    /// Evaluates a flag for this context's identity.
    pub async fn flag_value(&self, key: &str) -> FlagValue {
        let (identity, tags) = self.snapshot();
        match identity {
            Some(distinct_id) => self.client.flag_value(key, &distinct_id, &tags).await,
            None => {
                tracing::debug!(flag = key, "anonymous context, flag reads as disabled");
                FlagValue::Disabled
            },
        }
    }

    /// Fetches the payload of a flag for this context's identity.
    pub async fn flag_payload(&self, key: &str) -> Option<Value> {
        let (identity, tags) = self.snapshot();
        let distinct_id = identity?;
        self.client.flag_payload_with(key, &distinct_id, &tags).await
    }

    /// Identity and tags as of now.
    pub(crate) fn snapshot(&self) -> (Option<String>, Properties) {
        let state = self.state.read();
        (state.identity.clone(), state.tags.clone())
    }

    /// Clears the state and marks the context inactive. Idempotent.
    fn release(&self) {
        let mut state = self.state.write();
        if !state.active {
            return;
        }
        state.active = false;
        state.identity = None;
        state.tags.clear();
    }
}

impl fmt::Debug for AnalyticsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("AnalyticsContext")
            .field("identity", &state.identity)
            .field("tags", &state.tags.len())
            .field("active", &state.active)
            .finish()
    }
}

/// Owns an open [`AnalyticsContext`] and releases it on drop.
#[must_use = "the context is released as soon as the guard is dropped"]
pub struct ContextGuard {
    context: AnalyticsContext,
}

impl ContextGuard {
    /// A shared handle to the context, e.g. for request extensions.
    ///
    /// The handle stays usable after the guard is dropped, but the context
    /// is released: identity and tags are gone and writes are ignored.
    pub fn context(&self) -> AnalyticsContext {
        self.context.clone()
    }
}

impl Deref for ContextGuard {
    type Target = AnalyticsContext;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.context.release();
    }
}

impl fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.context.fmt(f)
    }
}

impl Client {
    /// Opens a fresh analytics context.
    pub fn new_context(&self) -> ContextGuard {
        AnalyticsContext::fresh(self.clone())
    }

    /// Runs `f` inside a fresh context and returns its output.
    ///
    /// The context is released when `f`'s future completes or is dropped.
    pub async fn scoped<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce(AnalyticsContext) -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = self.new_context();
        f(guard.context()).await
    }
}
