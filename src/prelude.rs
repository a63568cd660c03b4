//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types for easy importing:
//!
//! ```rust
//! use ambit::prelude::*;
//! ```
//!
//! This provides access to:
//! - Client and context types
//! - Error and triage types
//! - Flag values
//! - Configuration

pub use crate::{
    client::{CaptureBuilder, Client, ClientBuilder},
    config::{BatchConfig, FlagConfig, RetryConfig, Settings},
    context::{AnalyticsContext, ContextGuard},
    error::{Error, ErrorKind, Result},
    flags::FlagValue,
    triage::{ErrorBoundary, Fault, Triage, capture_if_server_fault},
    types::{ErrorId, Event, Properties},
};
