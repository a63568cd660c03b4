//! Mock transport implementation for testing.
//!
//! This transport operates entirely in-memory: it records delivered batches
//! and answers flag requests from configured responses, so applications can
//! test their analytics without network access.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::traits::{Transport, TransportClient, TransportStats};
use crate::Error;
use crate::flags::{DecideRequest, DecideResponse, FlagDefinitions};
use crate::types::Event;

/// In-memory transport that records everything it is asked to send.
///
/// ## Example
///
/// ```rust
/// use std::sync::Arc;
/// use ambit::MockTransport;
///
/// # tokio_test::block_on(async {
/// let transport = Arc::new(MockTransport::new());
/// let client = ambit::Client::builder()
///     .api_key("phc_test")
///     .transport(transport.clone())
///     .build()
///     .await
///     .unwrap();
///
/// client.capture("signed_up").distinct_id("user-1").send();
/// client.flush().await;
///
/// assert_eq!(transport.events_named("signed_up").len(), 1);
/// # });
/// ```
pub struct MockTransport {
    /// Delivered batches, in order.
    batches: RwLock<Vec<Vec<Event>>>,
    /// Definitions returned by `load_flag_definitions`.
    definitions: RwLock<Option<FlagDefinitions>>,
    /// Decide responses by distinct id.
    decide_responses: RwLock<HashMap<String, DecideResponse>>,
    /// Decide response for distinct ids without a specific entry.
    default_decide: RwLock<DecideResponse>,
    /// Decide requests received.
    decide_requests: RwLock<Vec<DecideRequest>>,
    /// Failure returned by the next request.
    simulate_failure: RwLock<Option<Error>>,
    /// Fail every request while set.
    fail_all: RwLock<Option<crate::ErrorKind>>,
    request_count: AtomicU64,
    failed_count: AtomicU64,
    definition_loads: AtomicU64,
}

impl MockTransport {
    /// Creates a new mock transport with no flags configured.
    pub fn new() -> Self {
        Self {
            batches: RwLock::new(Vec::new()),
            definitions: RwLock::new(None),
            decide_responses: RwLock::new(HashMap::new()),
            default_decide: RwLock::new(DecideResponse::default()),
            decide_requests: RwLock::new(Vec::new()),
            simulate_failure: RwLock::new(None),
            fail_all: RwLock::new(None),
            request_count: AtomicU64::new(0),
            failed_count: AtomicU64::new(0),
            definition_loads: AtomicU64::new(0),
        }
    }

    /// Sets a failure to return from the next request.
    pub fn set_failure(&self, error: Error) {
        *self.simulate_failure.write() = Some(error);
    }

    /// Makes every request fail with `kind` until [`clear_failure`](Self::clear_failure).
    pub fn fail_all(&self, kind: crate::ErrorKind) {
        *self.fail_all.write() = Some(kind);
    }

    /// Clears any simulated failure.
    pub fn clear_failure(&self) {
        *self.simulate_failure.write() = None;
        *self.fail_all.write() = None;
    }

    /// Serves `definitions` for local evaluation.
    pub fn set_flag_definitions(&self, definitions: FlagDefinitions) {
        *self.definitions.write() = Some(definitions);
    }

    /// Sets the decide response for one distinct id.
    pub fn set_decide_response(&self, distinct_id: impl Into<String>, response: DecideResponse) {
        self.decide_responses.write().insert(distinct_id.into(), response);
    }

    /// Sets the decide response for every distinct id without a specific entry.
    pub fn set_default_decide_response(&self, response: DecideResponse) {
        *self.default_decide.write() = response;
    }

    /// Returns every delivered event, in delivery order.
    pub fn events(&self) -> Vec<Event> {
        self.batches.read().iter().flatten().cloned().collect()
    }

    /// Returns delivered events with the given name.
    pub fn events_named(&self, name: &str) -> Vec<Event> {
        self.batches.read().iter().flatten().filter(|e| e.event() == name).cloned().collect()
    }

    /// Returns delivered batch sizes, in order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.read().iter().map(Vec::len).collect()
    }

    /// Returns the decide requests received.
    pub fn decide_requests(&self) -> Vec<DecideRequest> {
        self.decide_requests.read().clone()
    }

    /// Returns how many times flag definitions were loaded.
    pub fn definition_loads(&self) -> u64 {
        self.definition_loads.load(Ordering::Relaxed)
    }

    /// Returns the number of requests made.
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Forgets every recorded batch and decide request.
    pub fn reset(&self) {
        self.batches.write().clear();
        self.decide_requests.write().clear();
    }

    /// Counts the request and returns the configured failure, if any.
    fn begin_request(&self) -> Result<(), Error> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        let failure = self.simulate_failure.write().take();
        let failure = failure.or_else(|| self.fail_all.read().map(Error::from_kind));
        if let Some(error) = failure {
            self.failed_count.fetch_add(1, Ordering::Relaxed);
            return Err(error);
        }
        Ok(())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("batches", &self.batches.read().len())
            .field("requests", &self.request_count())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl TransportClient for MockTransport {
    async fn send_batch(&self, events: Vec<Event>) -> Result<(), Error> {
        self.begin_request()?;
        self.batches.write().push(events);
        Ok(())
    }

    async fn load_flag_definitions(&self) -> Result<Option<FlagDefinitions>, Error> {
        self.begin_request()?;
        self.definition_loads.fetch_add(1, Ordering::Relaxed);
        Ok(self.definitions.read().clone())
    }

    async fn decide(&self, request: DecideRequest) -> Result<DecideResponse, Error> {
        self.begin_request()?;
        let response = self
            .decide_responses
            .read()
            .get(&request.distinct_id)
            .cloned()
            .unwrap_or_else(|| self.default_decide.read().clone());
        self.decide_requests.write().push(request);
        Ok(response)
    }

    fn transport_type(&self) -> Transport {
        Transport::Mock
    }

    fn stats(&self) -> TransportStats {
        TransportStats {
            transport: Transport::Mock,
            requests_sent: self.request_count(),
            requests_failed: self.failed_count.load(Ordering::Relaxed),
            retries: 0,
            events_sent: self.batches.read().iter().map(|b| b.len() as u64).sum(),
        }
    }
}
