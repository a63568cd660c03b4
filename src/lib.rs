//! # ambit
//!
//! Request-scoped product analytics for Rust services: events, exceptions
//! with correlation ids, and feature flags, delivered to a PostHog-compatible
//! backend.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ambit::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder()
//!         .api_key("phc_project_key")
//!         .build()
//!         .await?;
//!
//!     // One context per request
//!     {
//!         let ctx = client.new_context();
//!         ctx.identify("user-42");
//!         ctx.tag("plan", "pro");
//!
//!         ctx.capture("report_exported").property("format", "csv").send();
//!
//!         if ctx.flag_enabled("new-dashboard").await {
//!             // ...
//!         }
//!     } // context released
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Key Concepts
//!
//! - **Contexts are explicit**: [`Client::new_context`] returns a guard that
//!   releases the context on drop. Pass it (or a clone of the
//!   [`AnalyticsContext`] it derefs to) to the code handling the request.
//! - **Capture never fails**: façades enqueue and return; transport failures
//!   are logged and counted, never returned.
//! - **Exceptions get ids**: [`Client::capture_exception`] returns an
//!   [`ErrorId`] to show to the user. [`triage`] keeps client mistakes out of
//!   exception tracking.
//! - **Flags are local first**: with a personal API key, flags evaluate
//!   against cached definitions and fall back to the backend only when needed.
//!
//! ## Features
//!
//! - `rustls` (default): Use rustls for TLS
//! - `native-tls`: Use native TLS (OpenSSL on Linux, Secure Transport on macOS)

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

// Core modules
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod types;

// Event processing and delivery
pub mod pipeline;
pub mod queue;
pub mod transport;

// Feature flags
pub mod flags;

// Exception triage
pub mod triage;

// LLM analytics
pub mod ai;

// Testing utilities
pub mod testing;

pub mod user_agent;

// Prelude for convenient imports
pub mod prelude;

// Re-export main types at crate root for convenience
pub use client::{CaptureBuilder, Client, ClientBuilder};
pub use context::{AnalyticsContext, ContextGuard};
pub use error::{Error, ErrorKind, Result};
pub use flags::FlagValue;
pub use queue::QueueStats;
pub use types::{ErrorId, Event, Properties};

// Re-export config types
pub use config::{BatchConfig, FlagConfig, RetryConfig, Settings};

// Re-export transport types
pub use transport::{MockTransport, RestTransport, Transport, TransportClient};
