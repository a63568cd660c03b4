//! Client-fault / server-fault classification.
//!
//! Errors caused by the caller (bad input, missing resources, permission
//! problems) are not bugs and should not be recorded as exceptions. Types that
//! implement [`Triage`] say which side is at fault, and
//! [`capture_if_server_fault`] only reports the server-side ones.
//!
//! ## Example
//!
//! ```rust
//! use ambit::triage::{Fault, Triage};
//!
//! #[derive(Debug, thiserror::Error)]
//! enum CheckoutError {
//!     #[error("cart is empty")]
//!     EmptyCart,
//!     #[error("payment provider unavailable")]
//!     PaymentDown,
//! }
//!
//! impl Triage for CheckoutError {
//!     fn fault(&self) -> Fault {
//!         match self {
//!             CheckoutError::EmptyCart => Fault::Client,
//!             CheckoutError::PaymentDown => Fault::Server,
//!         }
//!     }
//! }
//!
//! assert!(CheckoutError::EmptyCart.fault().is_client());
//! ```

use std::fmt;

use crate::context::AnalyticsContext;
use crate::error::{Error, ErrorKind};
use crate::types::ErrorId;

/// Which side caused an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// The caller did something wrong (4xx territory).
    Client,
    /// The service failed (5xx territory).
    Server,
}

impl Fault {
    /// Classifies an HTTP status code: 4xx is a client fault, anything else
    /// is a server fault.
    pub fn from_status(status: u16) -> Self {
        if (400..500).contains(&status) { Fault::Client } else { Fault::Server }
    }

    /// Returns `true` for [`Fault::Client`].
    pub fn is_client(self) -> bool {
        matches!(self, Fault::Client)
    }

    /// Returns `true` for [`Fault::Server`].
    pub fn is_server(self) -> bool {
        matches!(self, Fault::Server)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Client => write!(f, "client"),
            Fault::Server => write!(f, "server"),
        }
    }
}

/// Errors that know whether they are the caller's fault.
pub trait Triage {
    /// Returns which side caused this error.
    fn fault(&self) -> Fault;
}

impl Triage for Fault {
    fn fault(&self) -> Fault {
        *self
    }
}

impl Triage for ErrorKind {
    fn fault(&self) -> Fault {
        ErrorKind::fault(self)
    }
}

impl Triage for Error {
    fn fault(&self) -> Fault {
        self.kind().fault()
    }
}

impl Triage for reqwest::StatusCode {
    fn fault(&self) -> Fault {
        Fault::from_status(self.as_u16())
    }
}

/// Captures `error` on `ctx` when it is a server fault.
///
/// Returns the correlation id of the captured exception, or `None` when the
/// error was the caller's fault and nothing was recorded.
pub fn capture_if_server_fault<E>(ctx: &AnalyticsContext, error: &E) -> Option<ErrorId>
where
    E: std::error::Error + Triage + 'static,
{
    match error.fault() {
        Fault::Server => Some(ctx.capture_exception(error)),
        Fault::Client => {
            tracing::debug!(error = %error, "client fault, not capturing exception");
            None
        },
    }
}

/// An error that went through an [`ErrorBoundary`].
#[derive(Debug)]
pub struct Reported<E> {
    /// The original error.
    pub error: E,
    /// Correlation id when the error was captured.
    pub error_id: Option<ErrorId>,
}

impl<E: fmt::Display> fmt::Display for Reported<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error_id {
            Some(ref id) => write!(f, "{} (reference {})", self.error, id),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Reports server-fault errors from a unit of work to one context.
///
/// ```rust
/// use ambit::triage::ErrorBoundary;
/// use ambit::{Error, MockTransport};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let client = ambit::Client::builder()
///     .api_key("phc_test")
///     .transport(Arc::new(MockTransport::new()))
///     .build()
///     .await
///     .unwrap();
/// let ctx = client.new_context();
/// let boundary = ErrorBoundary::new(&ctx);
///
/// let result: Result<(), Error> = Err(Error::invalid_argument("bad page number"));
/// let reported = boundary.check(result).unwrap_err();
/// assert!(reported.error_id.is_none());
/// # });
/// ```
#[derive(Clone, Copy)]
pub struct ErrorBoundary<'a> {
    ctx: &'a AnalyticsContext,
}

impl<'a> ErrorBoundary<'a> {
    /// Creates a boundary reporting to `ctx`.
    pub fn new(ctx: &'a AnalyticsContext) -> Self {
        Self { ctx }
    }

    /// Captures `error` if it is a server fault.
    pub fn report<E>(&self, error: &E) -> Option<ErrorId>
    where
        E: std::error::Error + Triage + 'static,
    {
        capture_if_server_fault(self.ctx, error)
    }

    /// Passes `Ok` through and reports an `Err`.
    pub fn check<T, E>(&self, result: Result<T, E>) -> Result<T, Reported<E>>
    where
        E: std::error::Error + Triage + 'static,
    {
        result.map_err(|error| {
            let error_id = self.report(&error);
            Reported { error, error_id }
        })
    }

    /// Awaits `future` and reports its error, if any.
    pub async fn run<F, T, E>(&self, future: F) -> Result<T, Reported<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: std::error::Error + Triage + 'static,
    {
        self.check(future.await)
    }
}

impl fmt::Debug for ErrorBoundary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorBoundary").finish_non_exhaustive()
    }
}
