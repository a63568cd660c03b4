//! Client builder with typestate pattern.

use std::{marker::PhantomData, sync::Arc, time::Duration};

use super::inner::ClientInner;
use crate::{
    Client, Error,
    config::{BatchConfig, DEFAULT_HOST, FlagConfig, RetryConfig},
    flags::FlagStore,
    pipeline::{EventProcessor, Pipeline},
    queue::EventQueue,
    transport::{RestTransport, TransportClient},
};

/// Request timeout used when none is configured.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Marker type: API key not yet provided.
pub struct NoApiKey;

/// Marker type: API key has been provided.
pub struct HasApiKey;

/// Builder for creating [`Client`] instances.
///
/// Uses the typestate pattern so `build()` is only available once the
/// project API key has been provided.
///
/// ## Required Configuration
///
/// - `api_key()`: The project API key events are sent under
///
/// ## Optional Configuration
///
/// - `host()`: Backend host (defaults to [`DEFAULT_HOST`])
/// - `personal_api_key()`: Enables local flag evaluation
/// - `batch_config()`: Batching and queue limits
/// - `flag_config()`: Flag caching behavior
/// - `retry_config()`: Retry behavior for transient failures
/// - `processor()`: Before-send event processors
/// - `disabled()`: Capture nothing (tests, local development)
///
/// ## Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use ambit::{BatchConfig, Client, RetryConfig};
///
/// # async fn example() -> ambit::Result<()> {
/// let client = Client::builder()
///     .api_key("phc_project_key")
///     .host("https://eu.i.posthog.com")
///     .batch_config(BatchConfig::builder().flush_at(50).build())
///     .retry_config(RetryConfig::new().with_max_retries(5))
///     .timeout(Duration::from_secs(5))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder<ApiKeyState> {
    api_key: Option<String>,
    host: String,
    personal_api_key: Option<String>,
    retry_config: RetryConfig,
    batch_config: BatchConfig,
    flag_config: FlagConfig,
    timeout: Option<Duration>,
    disabled: bool,
    debug: bool,
    pipeline: Pipeline,
    transport: Option<Arc<dyn TransportClient>>,
    _api_key_state: PhantomData<ApiKeyState>,
}

impl ClientBuilder<NoApiKey> {
    /// Creates a new client builder.
    pub fn new() -> Self {
        Self {
            api_key: None,
            host: DEFAULT_HOST.to_string(),
            personal_api_key: None,
            retry_config: RetryConfig::default(),
            batch_config: BatchConfig::default(),
            flag_config: FlagConfig::default(),
            timeout: None,
            disabled: false,
            debug: false,
            pipeline: Pipeline::new(),
            transport: None,
            _api_key_state: PhantomData,
        }
    }

    /// Sets the project API key.
    pub fn api_key(self, api_key: impl Into<String>) -> ClientBuilder<HasApiKey> {
        ClientBuilder {
            api_key: Some(api_key.into()),
            host: self.host,
            personal_api_key: self.personal_api_key,
            retry_config: self.retry_config,
            batch_config: self.batch_config,
            flag_config: self.flag_config,
            timeout: self.timeout,
            disabled: self.disabled,
            debug: self.debug,
            pipeline: self.pipeline,
            transport: self.transport,
            _api_key_state: PhantomData,
        }
    }
}

impl Default for ClientBuilder<NoApiKey> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> ClientBuilder<K> {
    /// Sets the backend host, e.g. `https://eu.i.posthog.com`.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the personal API key used to download flag definitions for
    /// local evaluation. Without it every flag read goes to remote decide.
    #[must_use]
    pub fn personal_api_key(mut self, key: impl Into<String>) -> Self {
        self.personal_api_key = Some(key.into());
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Sets the batching configuration.
    #[must_use]
    pub fn batch_config(mut self, config: BatchConfig) -> Self {
        self.batch_config = config;
        self
    }

    /// Sets the feature flag configuration.
    #[must_use]
    pub fn flag_config(mut self, config: FlagConfig) -> Self {
        self.flag_config = config;
        self
    }

    /// Sets the per-request timeout.
    ///
    /// This timeout applies to individual API requests, not including retries.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disables delivery. Captures return `None`, exceptions still get ids,
    /// and flags read as disabled.
    #[must_use]
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Logs every accepted event at `debug`.
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Appends a before-send processor.
    #[must_use]
    pub fn processor(mut self, processor: impl EventProcessor) -> Self {
        self.pipeline.push(processor);
        self
    }

    /// Replaces the whole processor pipeline.
    #[must_use]
    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Uses a custom transport instead of the REST transport.
    ///
    /// Mostly useful with [`MockTransport`](crate::MockTransport) in tests.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn TransportClient>) -> Self {
        self.transport = Some(transport);
        self
    }
}

impl ClientBuilder<HasApiKey> {
    /// Builds the client and starts its delivery worker.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if:
    /// - The API key is empty (unless disabled)
    /// - The host is not a valid `http`/`https` URL
    /// - The HTTP client cannot be created
    pub async fn build(self) -> Result<Client, Error> {
        let api_key = self.api_key.unwrap_or_default();

        if self.disabled {
            tracing::info!("analytics disabled, events will not be delivered");
            let inner = ClientInner {
                host: self.host,
                disabled: true,
                debug: self.debug,
                pipeline: self.pipeline,
                queue: None,
                flags: FlagStore::new(None, self.flag_config),
                transport: None,
            };
            return Ok(Client::from_inner(inner));
        }

        if api_key.trim().is_empty() {
            return Err(Error::configuration("API key is required"));
        }

        let parsed_host = url::Url::parse(&self.host)?;
        if !matches!(parsed_host.scheme(), "http" | "https") {
            return Err(Error::configuration(format!(
                "unsupported host scheme '{}', expected http or https",
                parsed_host.scheme()
            )));
        }

        let transport: Arc<dyn TransportClient> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                RestTransport::builder()
                    .base_url(&self.host)?
                    .api_key(api_key)
                    .personal_api_key(self.personal_api_key)
                    .retry_config(self.retry_config)
                    .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
                    .build()?,
            ),
        };

        tracing::debug!(
            host = %self.host,
            transport = %transport.transport_type(),
            "analytics client ready"
        );

        let inner = ClientInner {
            host: self.host,
            disabled: false,
            debug: self.debug,
            pipeline: self.pipeline,
            queue: Some(EventQueue::start(Arc::clone(&transport), self.batch_config)),
            flags: FlagStore::new(Some(Arc::clone(&transport)), self.flag_config),
            transport: Some(transport),
        };

        Ok(Client::from_inner(inner))
    }
}
