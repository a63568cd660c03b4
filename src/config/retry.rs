//! Retry configuration for batch delivery and flag loading.

use std::time::Duration;

use crate::{Error, ErrorKind};

/// Configuration for retrying failed requests to the analytics backend.
///
/// Delivery uses exponential backoff with jitter. A `429` response that carries
/// a `Retry-After` header overrides the computed delay.
///
/// ## Default Values
///
/// - `max_retries`: 3
/// - `initial_delay`: 200ms
/// - `max_delay`: 10s
/// - `multiplier`: 2.0
/// - `jitter`: 0.1 (10%)
///
/// ## Example
///
/// ```rust
/// use ambit::RetryConfig;
/// use std::time::Duration;
///
/// let config = RetryConfig::new()
///     .with_max_retries(5)
///     .with_initial_delay(Duration::from_millis(50))
///     .with_max_delay(Duration::from_secs(30));
/// assert!(config.is_enabled());
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first request.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Upper bound for any single delay, including `Retry-After` hints.
    pub max_delay: Duration,

    /// Multiplier for exponential backoff.
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,

    /// Whether to retry when the backend answers `429 Too Many Requests`.
    pub retry_on_rate_limit: bool,

    /// Whether to retry on client-side timeouts.
    pub retry_on_timeout: bool,

    /// Whether to retry on connection errors.
    pub retry_on_connection_error: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.1,
            retry_on_rate_limit: true,
            retry_on_timeout: true,
            retry_on_connection_error: true,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration that never retries.
    pub fn disabled() -> Self {
        Self { max_retries: 0, ..Default::default() }
    }

    /// Sets the maximum number of retry attempts.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay between retries.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the exponential backoff multiplier.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the jitter factor, clamped to `0.0..=1.0`.
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Sets whether `429` responses are retried.
    #[must_use]
    pub fn with_retry_on_rate_limit(mut self, retry: bool) -> Self {
        self.retry_on_rate_limit = retry;
        self
    }

    /// Sets whether timeouts are retried.
    #[must_use]
    pub fn with_retry_on_timeout(mut self, retry: bool) -> Self {
        self.retry_on_timeout = retry;
        self
    }

    /// Sets whether connection errors are retried.
    #[must_use]
    pub fn with_retry_on_connection_error(mut self, retry: bool) -> Self {
        self.retry_on_connection_error = retry;
        self
    }

    /// Returns `true` if retries are enabled.
    pub fn is_enabled(&self) -> bool {
        self.max_retries > 0
    }

    /// Decides whether `error` should be retried after `attempt` retries so far.
    pub fn should_retry(&self, error: &Error, attempt: u32) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        match error.kind() {
            ErrorKind::RateLimited => self.retry_on_rate_limit,
            ErrorKind::Timeout => self.retry_on_timeout,
            ErrorKind::Connection => self.retry_on_connection_error,
            ErrorKind::Unavailable | ErrorKind::Internal => true,
            _ => false,
        }
    }

    /// Calculates the backoff delay for a retry attempt (1-based).
    ///
    /// `initial_delay * multiplier^(attempt - 1)`, capped at `max_delay`, with jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32 - 1);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jittered = if self.jitter > 0.0 {
            let range = capped * self.jitter;
            (capped + (fastrand::f64() - 0.5) * 2.0 * range).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered)
    }

    /// Delay to wait before retrying `error`.
    ///
    /// A server-provided `Retry-After` wins over backoff, bounded by `max_delay`.
    pub fn delay_for_error(&self, error: &Error, attempt: u32) -> Duration {
        match error.retry_after() {
            Some(hint) => hint.min(self.max_delay),
            None => self.delay_for_attempt(attempt),
        }
    }
}
