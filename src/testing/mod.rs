//! Testing utilities for applications that use ambit.
//!
//! [`TestClient`] pairs a real [`Client`] with a recording
//! [`MockTransport`], so application code runs unchanged while tests inspect
//! exactly what would have been delivered.
//!
//! ## Quick Start
//!
//! ```rust
//! use ambit::testing::TestClient;
//!
//! # tokio_test::block_on(async {
//! let test = TestClient::new().await.unwrap();
//!
//! // Application code under test
//! let ctx = test.client().new_context();
//! ctx.identify("user-1");
//! ctx.capture("checkout_started").property("items", 3).send();
//!
//! let event = test.assert_captured("checkout_started").await;
//! assert_eq!(event.distinct_id(), Some("user-1"));
//! test.assert_not_captured("checkout_failed").await;
//! # });
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::client::{ClientBuilder, HasApiKey};
use crate::config::BatchConfig;
use crate::flags::{DecideResponse, FlagDefinitions};
use crate::transport::MockTransport;
use crate::types::Event;
use crate::{Client, Error};

/// API key used by test clients.
pub const TEST_API_KEY: &str = "phc_test";

/// A client wired to an in-memory transport.
///
/// `TestClient` is `Clone`; clones share the client and the recorded events.
#[derive(Clone, Debug)]
pub struct TestClient {
    client: Client,
    transport: Arc<MockTransport>,
}

impl TestClient {
    /// Creates a test client. Events are only delivered on flush, which the
    /// inspection methods do for you.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built.
    pub async fn new() -> Result<Self, Error> {
        Self::with_builder(|builder| builder).await
    }

    /// Creates a test client after applying `configure` to the builder, e.g.
    /// to register processors or flag settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured client cannot be built.
    pub async fn with_builder<F>(configure: F) -> Result<Self, Error>
    where
        F: FnOnce(ClientBuilder<HasApiKey>) -> ClientBuilder<HasApiKey>,
    {
        let transport = Arc::new(MockTransport::new());
        let builder = Client::builder()
            .api_key(TEST_API_KEY)
            .batch_config(
                BatchConfig::builder()
                    .flush_at(100_000)
                    .flush_interval(Duration::from_secs(24 * 60 * 60))
                    .build(),
            )
            .transport(transport.clone());
        let client = configure(builder).build().await?;
        Ok(Self { client, transport })
    }

    /// The client under test.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The recording transport.
    pub fn transport(&self) -> &Arc<MockTransport> {
        &self.transport
    }

    /// Flushes and returns every delivered event.
    pub async fn captured(&self) -> Vec<Event> {
        self.client.flush().await;
        self.transport.events()
    }

    /// Flushes and returns delivered events named `name`.
    pub async fn captured_named(&self, name: &str) -> Vec<Event> {
        self.client.flush().await;
        self.transport.events_named(name)
    }

    /// Flushes and returns the last event named `name`.
    ///
    /// # Panics
    ///
    /// Panics if no such event was captured.
    pub async fn assert_captured(&self, name: &str) -> Event {
        let events = self.captured().await;
        let found = events.iter().rev().find(|e| e.event() == name).cloned();
        assert!(
            found.is_some(),
            "expected event '{}' to be captured, got {:?}",
            name,
            events.iter().map(Event::event).collect::<Vec<_>>()
        );
        found.unwrap_or_else(|| Event::new(name))
    }

    /// Flushes and checks that no event named `name` was captured.
    ///
    /// # Panics
    ///
    /// Panics if such an event was captured.
    pub async fn assert_not_captured(&self, name: &str) {
        let count = self.captured_named(name).await.len();
        assert!(count == 0, "expected no '{}' events, got {}", name, count);
    }

    /// Serves `definitions` for local flag evaluation and reloads them.
    pub async fn set_flag_definitions(&self, definitions: FlagDefinitions) {
        self.transport.set_flag_definitions(definitions);
        self.client.reload_feature_flags().await;
    }

    /// Answers remote flag requests for `distinct_id` with `response`.
    pub fn set_decide_response(&self, distinct_id: &str, response: DecideResponse) {
        self.transport.set_decide_response(distinct_id, response);
    }

    /// Forgets every recorded event and request.
    pub fn reset(&self) {
        self.transport.reset();
    }
}
