//! Error types for the ambit client.
//!
//! Only configuration-time operations return [`Error`]: building a client,
//! loading [`Settings`](crate::Settings), constructing a transport. The capture,
//! exception and flag façades never return errors; transport failures are
//! logged and counted instead, so a monitoring outage cannot take down the
//! host application.
//!
//! ```rust,ignore
//! // build() can fail: bad host URL, missing API key
//! let client = Client::builder().api_key("phc_...").build().await?;
//!
//! // capture() cannot fail, even when the backend is unreachable
//! client.capture("signup").property("plan", "pro").send();
//! ```

mod core;
mod kind;

pub use core::Error;
pub use kind::ErrorKind;

/// A specialized `Result` type for ambit operations.
pub type Result<T> = std::result::Result<T, Error>;
