//! Error types for the notification engine.
//!
//! Delivery failures never reach producers: they are retried locally and end
//! in a ban. Validation, not-found and storage failures propagate to the
//! admin surface. `BusClosed` propagates to the producer that called
//! `notify` after shutdown.

use std::fmt;

use spvwallet_core::{CoreError, EnvelopeError};
use thiserror::Error;

/// Result type alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;

/// Error conditions raised by the bus, notifiers and manager.
#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    /// Network-level connectivity failure.
    #[error("network connection failed: {message}")]
    NetworkError {
        /// Error message describing the network failure
        message: String,
    },

    /// HTTP request timeout exceeded.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// Number of seconds before the request timed out
        timeout_seconds: u64,
    },

    /// Subscriber answered with a 4xx status.
    #[error("client error: HTTP {status_code}")]
    ClientError {
        /// HTTP status code (4xx)
        status_code: u16,
        /// Response body content
        body: String,
    },

    /// Subscriber answered with a 5xx or other non-2xx status.
    #[error("server error: HTTP {status_code}")]
    ServerError {
        /// HTTP status code
        status_code: u16,
        /// Response body content
        body: String,
    },

    /// All delivery attempts for a batch failed.
    #[error("delivery failed after {attempts} attempts")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
    },

    /// The event bus no longer accepts events.
    #[error("event bus is closed")]
    BusClosed,

    /// The ingress queue was full and the event was dropped.
    #[error("event bus ingress queue is full")]
    BusFull,

    /// Cancellation interrupted the operation.
    #[error("shutdown requested")]
    ShutdownRequested,

    /// Notifier tasks did not finish within the shutdown timeout.
    #[error("shutdown timed out after {timeout_seconds}s")]
    ShutdownTimeout {
        /// Configured shutdown timeout
        timeout_seconds: u64,
    },

    /// Subscription URL is missing or empty.
    #[error("webhook url is required")]
    UrlRequired,

    /// Subscription URL does not parse as an absolute http(s) URL.
    #[error("invalid webhook url {url:?}: {reason}")]
    InvalidUrl {
        /// URL as supplied
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Token header name is missing or empty.
    #[error("webhook token header is required")]
    TokenHeaderRequired,

    /// Token value is missing or empty.
    #[error("webhook token value is required")]
    TokenValueRequired,

    /// Token header is not a valid HTTP header name.
    #[error("invalid webhook token header {header:?}: {reason}")]
    InvalidTokenHeader {
        /// Header name as supplied
        header: String,
        /// Why it was rejected
        reason: String,
    },

    /// Token value contains bytes not allowed in an HTTP header.
    #[error("invalid webhook token value: {reason}")]
    InvalidTokenValue {
        /// Why it was rejected
        reason: String,
    },

    /// No subscription exists for the URL.
    #[error("webhook subscription not found: {url}")]
    SubscriptionNotFound {
        /// URL that was looked up
        url: String,
    },

    /// Registry operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Storage error message
        message: String,
    },

    /// Event could not be wrapped into an envelope.
    #[error("envelope error: {message}")]
    Envelope {
        /// Envelope error message
        message: String,
    },

    /// Invalid engine configuration.
    #[error("invalid notification configuration: {message}")]
    Configuration {
        /// Configuration error message
        message: String,
    },
}

impl NotifyError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates a client error from HTTP response.
    pub fn client_error(status_code: u16, body: impl Into<String>) -> Self {
        Self::ClientError { status_code, body: body.into() }
    }

    /// Creates a server error from HTTP response.
    pub fn server_error(status_code: u16, body: impl Into<String>) -> Self {
        Self::ServerError { status_code, body: body.into() }
    }

    /// Creates a retries exhausted error.
    pub fn retries_exhausted(attempts: u32) -> Self {
        Self::RetriesExhausted { attempts }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into(), reason: reason.into() }
    }

    /// Creates a not-found error for `url`.
    pub fn not_found(url: impl Into<String>) -> Self {
        Self::SubscriptionNotFound { url: url.into() }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage { message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Returns true for failures of a single delivery attempt.
    ///
    /// Any non-2xx answer counts, 4xx included: a subscriber returning 408
    /// or 429 is expected to accept the same batch a second later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkError { .. }
            | Self::Timeout { .. }
            | Self::ClientError { .. }
            | Self::ServerError { .. } => true,

            Self::RetriesExhausted { .. }
            | Self::BusClosed
            | Self::BusFull
            | Self::ShutdownRequested
            | Self::ShutdownTimeout { .. }
            | Self::UrlRequired
            | Self::InvalidUrl { .. }
            | Self::TokenHeaderRequired
            | Self::TokenValueRequired
            | Self::InvalidTokenHeader { .. }
            | Self::InvalidTokenValue { .. }
            | Self::SubscriptionNotFound { .. }
            | Self::Storage { .. }
            | Self::Envelope { .. }
            | Self::Configuration { .. } => false,
        }
    }

    /// Returns true for input validation failures.
    pub fn is_validation(&self) -> bool {
        ErrorCategory::from(self) == ErrorCategory::Validation
    }
}

impl From<CoreError> for NotifyError {
    fn from(err: CoreError) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<EnvelopeError> for NotifyError {
    fn from(err: EnvelopeError) -> Self {
        Self::Envelope { message: err.to_string() }
    }
}

/// Category of notification error for logs and HTTP mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network connectivity issues.
    Network,
    /// Subscriber returned 4xx.
    Client,
    /// Subscriber returned 5xx.
    Server,
    /// Delivery gave up on a batch.
    Exhausted,
    /// Bus closed or full.
    Bus,
    /// Bad input from the admin surface.
    Validation,
    /// Unknown subscription.
    NotFound,
    /// Registry failures.
    Storage,
    /// Configuration problems.
    Configuration,
    /// Shutdown and encoding failures.
    Internal,
}

impl From<&NotifyError> for ErrorCategory {
    fn from(error: &NotifyError) -> Self {
        match error {
            NotifyError::NetworkError { .. } | NotifyError::Timeout { .. } => Self::Network,
            NotifyError::ClientError { .. } => Self::Client,
            NotifyError::ServerError { .. } => Self::Server,
            NotifyError::RetriesExhausted { .. } => Self::Exhausted,
            NotifyError::BusClosed | NotifyError::BusFull => Self::Bus,
            NotifyError::UrlRequired
            | NotifyError::InvalidUrl { .. }
            | NotifyError::TokenHeaderRequired
            | NotifyError::TokenValueRequired
            | NotifyError::InvalidTokenHeader { .. }
            | NotifyError::InvalidTokenValue { .. } => Self::Validation,
            NotifyError::SubscriptionNotFound { .. } => Self::NotFound,
            NotifyError::Storage { .. } => Self::Storage,
            NotifyError::Configuration { .. } => Self::Configuration,
            NotifyError::ShutdownRequested
            | NotifyError::ShutdownTimeout { .. }
            | NotifyError::Envelope { .. } => Self::Internal,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Client => write!(f, "client"),
            Self::Server => write!(f, "server"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Bus => write!(f, "bus"),
            Self::Validation => write!(f, "validation"),
            Self::NotFound => write!(f, "not_found"),
            Self::Storage => write!(f, "storage"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
