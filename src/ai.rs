//! LLM analytics.
//!
//! A [`Generation`] describes one call to a language model. Capturing it
//! emits an `$ai_generation` event through the normal pipeline, so it gets
//! the same batching, processors and context identity as any other event.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ambit::ai::Generation;
//! use ambit::{Client, MockTransport};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let transport = Arc::new(MockTransport::new());
//! let client = Client::builder()
//!     .api_key("phc_test")
//!     .transport(transport.clone())
//!     .build()
//!     .await
//!     .unwrap();
//! let ctx = client.new_context();
//! ctx.identify("user-1");
//!
//! let (reply, latency) = Generation::time(async { "Paris" }).await;
//!
//! Generation::new("openai", "gpt-4o-mini")
//!     .input(json!([{"role": "user", "content": "Capital of France?"}]))
//!     .output_choices(json!([{"role": "assistant", "content": reply}]))
//!     .input_tokens(12)
//!     .output_tokens(3)
//!     .latency(latency)
//!     .capture(&ctx);
//!
//! client.flush().await;
//! assert_eq!(transport.events_named("$ai_generation").len(), 1);
//! # });
//! ```

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

use crate::Client;
use crate::client::CaptureBuilder;
use crate::context::{AnalyticsContext, ContextGuard};
use crate::types::Properties;

/// Event name for LLM generations.
pub const GENERATION_EVENT: &str = "$ai_generation";

/// Anything events can be captured through: a client or a context.
pub trait CaptureTarget {
    /// Starts an event on this target.
    fn start_capture(&self, event: &str) -> CaptureBuilder<'_>;
}

impl CaptureTarget for Client {
    fn start_capture(&self, event: &str) -> CaptureBuilder<'_> {
        self.capture(event)
    }
}

impl CaptureTarget for AnalyticsContext {
    fn start_capture(&self, event: &str) -> CaptureBuilder<'_> {
        self.capture(event)
    }
}

impl CaptureTarget for ContextGuard {
    fn start_capture(&self, event: &str) -> CaptureBuilder<'_> {
        self.capture(event)
    }
}

/// One LLM call.
#[derive(Debug, Clone)]
pub struct Generation {
    provider: String,
    model: String,
    trace_id: Option<String>,
    distinct_id: Option<String>,
    input: Option<Value>,
    output_choices: Option<Value>,
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
    latency: Option<Duration>,
    http_status: u16,
    base_url: Option<String>,
    properties: Properties,
}

impl Generation {
    /// Starts a generation record for `model` served by `provider`.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            trace_id: None,
            distinct_id: None,
            input: None,
            output_choices: None,
            input_tokens: None,
            output_tokens: None,
            latency: None,
            http_status: 200,
            base_url: None,
            properties: Properties::new(),
        }
    }

    /// Groups related generations. A random id is used when unset.
    #[must_use]
    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Overrides the distinct id (otherwise the context identity is used).
    #[must_use]
    pub fn distinct_id(mut self, distinct_id: impl Into<String>) -> Self {
        self.distinct_id = Some(distinct_id.into());
        self
    }

    /// The prompt, usually a list of `{role, content}` messages.
    #[must_use]
    pub fn input(mut self, input: impl Into<Value>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// The returned choices.
    #[must_use]
    pub fn output_choices(mut self, output: impl Into<Value>) -> Self {
        self.output_choices = Some(output.into());
        self
    }

    /// Prompt token count.
    #[must_use]
    pub fn input_tokens(mut self, tokens: u64) -> Self {
        self.input_tokens = Some(tokens);
        self
    }

    /// Completion token count.
    #[must_use]
    pub fn output_tokens(mut self, tokens: u64) -> Self {
        self.output_tokens = Some(tokens);
        self
    }

    /// Wall-clock duration of the call.
    #[must_use]
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// HTTP status returned by the provider. Defaults to 200.
    #[must_use]
    pub fn http_status(mut self, status: u16) -> Self {
        self.http_status = status;
        self
    }

    /// Provider endpoint the call went to.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Extra properties, merged after the `$ai_*` ones.
    #[must_use]
    pub fn properties(mut self, properties: Properties) -> Self {
        self.properties.extend(properties);
        self
    }

    /// Awaits `future` and returns its output with the elapsed time.
    pub async fn time<F: Future>(future: F) -> (F::Output, Duration) {
        let start = Instant::now();
        let output = future.await;
        (output, start.elapsed())
    }

    /// Emits the `$ai_generation` event through `target`.
    pub fn capture<T: CaptureTarget + ?Sized>(self, target: &T) -> Option<Uuid> {
        let distinct_id = self.distinct_id.clone();
        let mut builder = target.start_capture(GENERATION_EVENT).properties(self.into_properties());
        if let Some(distinct_id) = distinct_id {
            builder = builder.distinct_id(distinct_id);
        }
        builder.send()
    }

    fn into_properties(self) -> Properties {
        let mut props = Properties::new();
        props.insert("$ai_provider".into(), self.provider.into());
        props.insert("$ai_model".into(), self.model.into());
        props.insert(
            "$ai_trace_id".into(),
            self.trace_id.unwrap_or_else(|| Uuid::new_v4().to_string()).into(),
        );
        props.insert("$ai_http_status".into(), self.http_status.into());
        props.insert("$ai_is_error".into(), (self.http_status >= 400).into());

        if let Some(input) = self.input {
            props.insert("$ai_input".into(), input);
        }
        if let Some(output) = self.output_choices {
            props.insert("$ai_output_choices".into(), output);
        }
        if let Some(tokens) = self.input_tokens {
            props.insert("$ai_input_tokens".into(), tokens.into());
        }
        if let Some(tokens) = self.output_tokens {
            props.insert("$ai_output_tokens".into(), tokens.into());
        }
        if let Some(latency) = self.latency {
            props.insert("$ai_latency".into(), latency.as_secs_f64().into());
        }
        if let Some(base_url) = self.base_url {
            props.insert("$ai_base_url".into(), base_url.into());
        }

        props.extend(self.properties);
        props
    }
}
