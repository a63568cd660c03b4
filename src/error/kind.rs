//! Error kind enumeration for categorizing client errors.

use crate::triage::Fault;

/// Categorization of client errors.
///
/// This enum provides a stable interface for matching on error types, enabling
/// different handling strategies for different failure modes.
///
/// ## Retriable vs Non-Retriable
///
/// | ErrorKind         | Retriable | Fault  | Action                     |
/// |-------------------|-----------|--------|----------------------------|
/// | `Unavailable`     | Yes       | Server | Retry with backoff         |
/// | `Timeout`         | Yes       | Server | Retry with backoff         |
/// | `RateLimited`     | Yes       | Server | Use `retry_after()` delay  |
/// | `Connection`      | Yes       | Server | Retry with backoff         |
/// | `Unauthorized`    | No        | Client | Fix the project API key    |
/// | `Forbidden`       | No        | Client | Fix key permissions        |
/// | `NotFound`        | No        | Client | Endpoint doesn't exist     |
/// | `InvalidArgument` | No        | Client | Fix the payload            |
/// | `Configuration`   | No        | Client | Fix client configuration   |
/// | `Shutdown`        | No        | Server | Client was shut down       |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The project API key or personal API key was rejected.
    ///
    /// HTTP: 401 Unauthorized
    ///
    /// **Not retriable.** Fix credentials and retry.
    #[error("unauthorized")]
    Unauthorized,

    /// Valid credentials but insufficient permissions (e.g. a personal API key
    /// without feature flag read access).
    ///
    /// HTTP: 403 Forbidden
    #[error("forbidden")]
    Forbidden,

    /// Requested endpoint was not found.
    ///
    /// HTTP: 404 Not Found
    #[error("not found")]
    NotFound,

    /// Invalid request argument or payload.
    ///
    /// HTTP: 400 Bad Request, 413 Payload Too Large
    ///
    /// **Not retriable.** Fix the input and retry.
    #[error("invalid argument")]
    InvalidArgument,

    /// Rate limit exceeded.
    ///
    /// HTTP: 429 Too Many Requests
    ///
    /// **Retriable.** Use `Error::retry_after()` for the recommended delay.
    #[error("rate limited")]
    RateLimited,

    /// Service temporarily unavailable.
    ///
    /// HTTP: 502, 503
    ///
    /// **Retriable.** Retry with exponential backoff.
    #[error("service unavailable")]
    Unavailable,

    /// Request timed out.
    ///
    /// HTTP: 504 Gateway Timeout or client-side timeout
    ///
    /// **Retriable.** Retry with exponential backoff.
    #[error("timeout")]
    Timeout,

    /// Internal server error.
    ///
    /// HTTP: 500 Internal Server Error
    #[error("internal error")]
    Internal,

    /// Connection error (DNS, TLS handshake, network unreachable).
    ///
    /// **Retriable.** May indicate transient network issues.
    #[error("connection error")]
    Connection,

    /// Protocol error (malformed response, unexpected status).
    #[error("protocol error")]
    Protocol,

    /// Configuration error (invalid host URL, missing API key).
    ///
    /// **Not retriable.** Fix the configuration.
    #[error("configuration error")]
    Configuration,

    /// Transport layer error that doesn't fit a more specific category.
    #[error("transport error")]
    Transport,

    /// Response could not be parsed or was malformed.
    #[error("invalid response")]
    InvalidResponse,

    /// The client has been shut down and no longer accepts work.
    #[error("client shut down")]
    Shutdown,

    /// Unknown or unexpected error.
    #[error("unknown error")]
    Unknown,
}

impl ErrorKind {
    /// Returns `true` if this error kind is generally safe to retry.
    ///
    /// # Example
    ///
    /// ```rust
    /// use ambit::ErrorKind;
    ///
    /// assert!(ErrorKind::Timeout.is_retriable());
    /// assert!(!ErrorKind::Unauthorized.is_retriable());
    /// ```
    #[inline]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Unavailable
                | ErrorKind::Timeout
                | ErrorKind::RateLimited
                | ErrorKind::Connection
        )
    }

    /// Classifies this kind as a client (caller) fault or a server (system) fault.
    ///
    /// Used by [`Triage`](crate::triage::Triage) to decide whether an error
    /// reaching an error boundary should be captured as an exception.
    #[inline]
    pub fn fault(&self) -> Fault {
        match self {
            ErrorKind::Unauthorized
            | ErrorKind::Forbidden
            | ErrorKind::NotFound
            | ErrorKind::InvalidArgument
            | ErrorKind::Configuration => Fault::Client,
            _ => Fault::Server,
        }
    }

    /// Creates an `ErrorKind` from an HTTP status code.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 | 413 => ErrorKind::InvalidArgument,
            401 => ErrorKind::Unauthorized,
            403 => ErrorKind::Forbidden,
            404 => ErrorKind::NotFound,
            429 => ErrorKind::RateLimited,
            500 => ErrorKind::Internal,
            502 | 503 => ErrorKind::Unavailable,
            504 => ErrorKind::Timeout,
            _ if (400..500).contains(&status) => ErrorKind::InvalidArgument,
            _ if status >= 500 => ErrorKind::Internal,
            _ => ErrorKind::Unknown,
        }
    }
}
