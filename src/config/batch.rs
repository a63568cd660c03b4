//! Batching configuration for the background delivery queue.

use std::time::Duration;

/// Configuration for how captured events are buffered and delivered.
///
/// Events are pushed onto a bounded channel and drained by a background
/// worker. The worker sends a batch when `flush_at` events are buffered or
/// `flush_interval` elapses, whichever comes first.
///
/// ## Example
///
/// ```rust
/// use ambit::BatchConfig;
/// use std::time::Duration;
///
/// let config = BatchConfig::builder()
///     .flush_at(20)
///     .flush_interval(Duration::from_secs(1))
///     .build();
/// assert_eq!(config.flush_at, 20);
/// ```
#[derive(Debug, Clone, bon::Builder)]
pub struct BatchConfig {
    /// Number of buffered events that triggers an immediate send.
    #[builder(default = 100)]
    pub flush_at: usize,

    /// Maximum time an event waits in the buffer before it is sent.
    #[builder(default = Duration::from_millis(500))]
    pub flush_interval: Duration,

    /// Capacity of the capture channel. Captures beyond this are dropped.
    #[builder(default = 10_000)]
    pub max_queue_size: usize,

    /// Maximum number of events in a single `/batch/` request.
    #[builder(default = 100)]
    pub max_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BatchConfig {
    /// A configuration that sends every event as soon as it is captured.
    ///
    /// Useful for short-lived processes such as CLIs and serverless handlers.
    pub fn immediate() -> Self {
        Self::builder().flush_at(1).build()
    }

    /// Values normalized so the worker never sees zero-sized batches.
    pub(crate) fn normalized(&self) -> Self {
        Self {
            flush_at: self.flush_at.max(1),
            flush_interval: self.flush_interval.max(Duration::from_millis(1)),
            max_queue_size: self.max_queue_size.max(1),
            max_batch_size: self.max_batch_size.max(1),
        }
    }
}
