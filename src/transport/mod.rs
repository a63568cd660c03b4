//! Transport layer for talking to the analytics backend.
//!
//! - REST transport (via reqwest) - JSON over HTTP, the default
//! - Mock transport - in-memory recorder for tests
//!
//! Both implement [`TransportClient`], which is what the delivery queue and
//! the flag store depend on. Custom transports can be plugged in through
//! [`ClientBuilder::transport`](crate::ClientBuilder::transport).
//!
//! ```rust
//! use ambit::Transport;
//!
//! let http = Transport::Http;
//! let mock = Transport::Mock;
//! assert_ne!(http, mock);
//! ```

pub(crate) mod mock;
pub(crate) mod rest;
pub(crate) mod traits;

pub use mock::MockTransport;
pub use rest::{RestTransport, RestTransportBuilder};
pub use traits::{Transport, TransportClient, TransportStats};
