//! REST transport implementation using reqwest.
//!
//! Talks to the PostHog-compatible ingestion API:
//!
//! - `POST {host}/batch/` delivers events
//! - `POST {host}/decide/?v=3` evaluates flags remotely
//! - `GET {host}/api/feature_flag/local_evaluation/` loads flag definitions

use std::borrow::Cow;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use serde::Serialize;
use url::Url;
use uuid::Uuid;

use crate::Error;
use crate::config::RetryConfig;
use crate::error::ErrorKind;
use crate::flags::{DecideRequest, DecideResponse, FlagDefinitions};
use crate::transport::traits::{Transport, TransportClient, TransportStats};
use crate::types::{Event, Properties};
use crate::user_agent;

// ============================================================================
// REST Transport
// ============================================================================

/// REST transport using reqwest.
#[derive(Clone)]
pub struct RestTransport {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    personal_api_key: Option<String>,
    retry_config: RetryConfig,
    stats: Arc<RwLock<TransportStats>>,
}

impl std::fmt::Debug for RestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestTransport")
            .field("base_url", &self.base_url.as_str())
            .field("local_evaluation", &self.personal_api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl RestTransport {
    /// Creates a new REST transport builder.
    pub fn builder() -> RestTransportBuilder {
        RestTransportBuilder::new()
    }

    /// Creates a new REST transport with the given configuration.
    pub fn new(
        base_url: Url,
        api_key: String,
        personal_api_key: Option<String>,
        retry_config: RetryConfig,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent::user_agent())
            .build()
            .map_err(|e| {
                Error::new(ErrorKind::Configuration, format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            personal_api_key,
            retry_config,
            stats: Arc::new(RwLock::new(TransportStats {
                transport: Transport::Http,
                ..Default::default()
            })),
        })
    }

    /// Returns the base URL requests are sent to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        self.base_url.join(path).map_err(|e| {
            Error::new(ErrorKind::Configuration, format!("Invalid URL path: {}", e))
        })
    }

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    /// Executes a request, retrying transient failures per the retry config.
    ///
    /// Returns the first successful response, or the last error.
    async fn execute_with_retry<F>(&self, make_request: F) -> Result<reqwest::Response, Error>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;

        loop {
            self.stats.write().requests_sent += 1;

            let error = match make_request().send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    let error = map_status_error(status, &body);
                    match retry_after {
                        Some(delay) => error.with_retry_after(delay),
                        None => error,
                    }
                },
                Err(e) => map_reqwest_error(e),
            };

            if !self.retry_config.should_retry(&error, attempt) {
                self.stats.write().requests_failed += 1;
                return Err(error);
            }

            attempt += 1;
            let delay = self.retry_config.delay_for_error(&error, attempt);
            tracing::debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying analytics request"
            );
            self.stats.write().retries += 1;
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait::async_trait]
impl TransportClient for RestTransport {
    async fn send_batch(&self, events: Vec<Event>) -> Result<(), Error> {
        if events.is_empty() {
            return Ok(());
        }

        let url = self.url("batch/")?;
        let body = BatchRequest {
            api_key: &self.api_key,
            batch: events.iter().map(WireEvent::from).collect(),
        };

        self.execute_with_retry(|| {
            self.client.post(url.clone()).headers(Self::json_headers()).json(&body)
        })
        .await?;

        self.stats.write().events_sent += events.len() as u64;
        Ok(())
    }

    async fn load_flag_definitions(&self) -> Result<Option<FlagDefinitions>, Error> {
        let Some(ref personal_key) = self.personal_api_key else {
            return Ok(None);
        };

        let mut url = self.url("api/feature_flag/local_evaluation/")?;
        url.query_pairs_mut().append_pair("token", &self.api_key);

        let mut headers = Self::json_headers();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", personal_key)).map_err(|_| {
                Error::new(ErrorKind::Configuration, "Invalid personal API key format")
            })?,
        );

        let response = self
            .execute_with_retry(|| self.client.get(url.clone()).headers(headers.clone()))
            .await?;

        let definitions = response.json::<FlagDefinitions>().await.map_err(|e| {
            Error::new(ErrorKind::InvalidResponse, format!("Failed to parse flag definitions: {}", e))
        })?;
        Ok(Some(definitions))
    }

    async fn decide(&self, request: DecideRequest) -> Result<DecideResponse, Error> {
        let mut url = self.url("decide/")?;
        url.query_pairs_mut().append_pair("v", "3");

        let body = DecideBody { api_key: &self.api_key, request: &request };
        let response = self
            .execute_with_retry(|| {
                self.client.post(url.clone()).headers(Self::json_headers()).json(&body)
            })
            .await?;

        response.json::<DecideResponse>().await.map_err(|e| {
            Error::new(ErrorKind::InvalidResponse, format!("Failed to parse decide response: {}", e))
        })
    }

    fn transport_type(&self) -> Transport {
        Transport::Http
    }

    fn stats(&self) -> TransportStats {
        self.stats.read().clone()
    }
}

// ============================================================================
// REST Transport Builder
// ============================================================================

/// Builder for REST transport.
pub struct RestTransportBuilder {
    base_url: Option<Url>,
    api_key: Option<String>,
    personal_api_key: Option<String>,
    retry_config: RetryConfig,
    timeout: Duration,
}

impl RestTransportBuilder {
    fn new() -> Self {
        Self {
            base_url: None,
            api_key: None,
            personal_api_key: None,
            retry_config: RetryConfig::default(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Sets the ingestion host, e.g. `https://us.i.posthog.com`.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self, Error> {
        let normalized = format!("{}/", url.as_ref().trim_end_matches('/'));
        let parsed = Url::parse(&normalized).map_err(|e| {
            Error::new(ErrorKind::Configuration, format!("Invalid base URL: {}", e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::configuration(format!(
                "unsupported URL scheme '{}'",
                parsed.scheme()
            )));
        }
        self.base_url = Some(parsed);
        Ok(self)
    }

    /// Sets the project API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the personal API key used to load flag definitions.
    pub fn personal_api_key(mut self, key: Option<String>) -> Self {
        self.personal_api_key = key;
        self
    }

    /// Sets the retry configuration.
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the REST transport.
    pub fn build(self) -> Result<RestTransport, Error> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::new(ErrorKind::Configuration, "Base URL is required"))?;
        let api_key = self
            .api_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::new(ErrorKind::Configuration, "API key is required"))?;

        RestTransport::new(base_url, api_key, self.personal_api_key, self.retry_config, self.timeout)
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Serialize)]
struct BatchRequest<'a> {
    api_key: &'a str,
    batch: Vec<WireEvent<'a>>,
}

#[derive(Serialize)]
struct DecideBody<'a> {
    api_key: &'a str,
    #[serde(flatten)]
    request: &'a DecideRequest,
}

/// Event as sent to `/batch/`.
///
/// Anonymous events get the process anonymous id and opt out of person
/// profile processing.
#[derive(Debug, Serialize)]
pub(crate) struct WireEvent<'a> {
    uuid: Uuid,
    event: &'a str,
    distinct_id: &'a str,
    properties: Cow<'a, Properties>,
    timestamp: DateTime<Utc>,
}

impl<'a> From<&'a Event> for WireEvent<'a> {
    fn from(event: &'a Event) -> Self {
        let (distinct_id, properties) = match event.distinct_id() {
            Some(id) => (id, Cow::Borrowed(event.properties())),
            None => {
                let mut properties = event.properties().clone();
                properties.insert("$process_person_profile".into(), serde_json::Value::Bool(false));
                (anonymous_id(), Cow::Owned(properties))
            },
        };

        Self {
            uuid: event.uuid(),
            event: event.event(),
            distinct_id,
            properties,
            timestamp: event.timestamp(),
        }
    }
}

/// Distinct id used for every anonymous event sent by this process.
pub(crate) fn anonymous_id() -> &'static str {
    static ANONYMOUS_ID: OnceLock<String> = OnceLock::new();
    ANONYMOUS_ID.get_or_init(|| Uuid::new_v4().to_string())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Maps reqwest errors to client errors.
fn map_reqwest_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::new(ErrorKind::Timeout, format!("Request timed out: {}", e)).with_source(e)
    } else if e.is_connect() {
        Error::new(ErrorKind::Connection, format!("Connection failed: {}", e)).with_source(e)
    } else if e.is_builder() || e.is_request() {
        Error::new(ErrorKind::InvalidArgument, format!("Invalid request: {}", e)).with_source(e)
    } else {
        Error::new(ErrorKind::Transport, format!("HTTP error: {}", e)).with_source(e)
    }
}

/// Maps HTTP status codes to client errors.
fn map_status_error(status: u16, body: &str) -> Error {
    let message = if body.is_empty() {
        format!("HTTP {}", status)
    } else if let Ok(error) = serde_json::from_str::<serde_json::Value>(body) {
        error
            .get("detail")
            .or_else(|| error.get("error"))
            .and_then(|e| e.as_str())
            .unwrap_or(body)
            .to_string()
    } else {
        body.to_string()
    };

    Error::new(ErrorKind::from_http_status(status), message)
}

// ============================================================================
// Tests
// ============================================================================
