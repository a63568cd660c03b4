//! Transport trait definitions and common types.
//!
//! This module defines the core transport abstraction used by the delivery
//! queue and the flag store to talk to the analytics backend.

use crate::Error;
use crate::flags::{DecideRequest, DecideResponse, FlagDefinitions};
use crate::types::Event;

// ============================================================================
// Transport Enum
// ============================================================================

/// Available transport implementations.
///
/// ## Example
///
/// ```rust
/// use ambit::Transport;
///
/// let transport = Transport::Http;
/// assert!(transport.is_http());
/// assert_eq!(transport.to_string(), "HTTP/REST");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// JSON over HTTP to the ingestion API (default).
    #[default]
    Http,
    /// In-memory recorder for testing without network.
    Mock,
}

impl Transport {
    /// Returns `true` if this is HTTP/REST transport.
    pub fn is_http(&self) -> bool {
        matches!(self, Transport::Http)
    }

    /// Returns `true` if this is mock transport.
    pub fn is_mock(&self) -> bool {
        matches!(self, Transport::Mock)
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Http => write!(f, "HTTP/REST"),
            Transport::Mock => write!(f, "Mock"),
        }
    }
}

// ============================================================================
// Transport Stats
// ============================================================================

/// Transport layer statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Transport that produced these stats.
    pub transport: Transport,
    /// HTTP requests sent, including retries.
    pub requests_sent: u64,
    /// Requests that ultimately failed.
    pub requests_failed: u64,
    /// Retries performed.
    pub retries: u64,
    /// Events accepted by the backend.
    pub events_sent: u64,
}

// ============================================================================
// Transport Client Trait
// ============================================================================

/// Backend operations the client depends on.
///
/// Implementations must be cheap to share behind an `Arc` and safe to call
/// concurrently from the delivery worker and request handlers.
#[async_trait::async_trait]
pub trait TransportClient: Send + Sync {
    /// Delivers a batch of events.
    async fn send_batch(&self, events: Vec<Event>) -> Result<(), Error>;

    /// Loads flag definitions for local evaluation.
    ///
    /// Returns `Ok(None)` when the transport has no way to load definitions,
    /// e.g. no personal API key is configured.
    async fn load_flag_definitions(&self) -> Result<Option<FlagDefinitions>, Error>;

    /// Asks the backend to evaluate every flag for one principal.
    async fn decide(&self, request: DecideRequest) -> Result<DecideResponse, Error>;

    /// Returns the transport type.
    fn transport_type(&self) -> Transport;

    /// Returns transport statistics.
    fn stats(&self) -> TransportStats;
}
