//! Feature flag evaluation configuration.

use std::time::Duration;

/// Configuration for feature flag evaluation and caching.
///
/// With a personal API key configured, flag definitions are fetched and
/// evaluated locally; they are refreshed once `definitions_ttl` has elapsed.
/// Flags that cannot be decided locally fall back to the remote decide
/// endpoint, whose answers are cached per distinct id, person properties and
/// groups for `decide_ttl`.
///
/// ## Example
///
/// ```rust
/// use ambit::FlagConfig;
/// use std::time::Duration;
///
/// let config = FlagConfig::builder()
///     .definitions_ttl(Duration::from_secs(60))
///     .send_flag_called_events(false)
///     .build();
/// assert!(config.local_evaluation);
/// ```
#[derive(Debug, Clone, bon::Builder)]
pub struct FlagConfig {
    /// Evaluate flags locally when definitions are available.
    #[builder(default = true)]
    pub local_evaluation: bool,

    /// How long loaded flag definitions stay fresh.
    #[builder(default = Duration::from_secs(30))]
    pub definitions_ttl: Duration,

    /// How long a remote decide response is reused for the same distinct id.
    #[builder(default = Duration::from_secs(60))]
    pub decide_ttl: Duration,

    /// Upper bound on cached decide responses. Oldest entries are evicted first.
    #[builder(default = 10_000)]
    pub max_cached_identities: usize,

    /// Emit a `$feature_flag_called` event the first time a given
    /// (flag, distinct id, value) combination is read.
    #[builder(default = true)]
    pub send_flag_called_events: bool,
}

impl Default for FlagConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl FlagConfig {
    /// A configuration that always asks the backend and never caches.
    pub fn remote_only() -> Self {
        Self::builder()
            .local_evaluation(false)
            .decide_ttl(Duration::ZERO)
            .build()
    }
}
