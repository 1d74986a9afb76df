//! Error types for forwarding and grouping operations.
//!
//! Covers sink failures (network, timeout, HTTP status), configuration
//! problems and group store failures surfaced through the engine. None of
//! these are fatal: callers log them and keep serving webhooks.

use std::fmt;

use grouprelay_core::CoreError;
use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Error conditions raised while grouping or forwarding events.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
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

    /// Sink responded with a client error (4xx).
    #[error("client error: HTTP {status_code}")]
    ClientError {
        /// HTTP status code (4xx)
        status_code: u16,
        /// Response body content
        body: String,
    },

    /// Sink responded with a server error (5xx) or another non-success code.
    #[error("server error: HTTP {status_code}")]
    ServerError {
        /// HTTP status code
        status_code: u16,
        /// Response body content
        body: String,
    },

    /// Payload could not be encoded.
    #[error("serialization failed: {message}")]
    SerializationError {
        /// Encoder error message
        message: String,
    },

    /// Group store operation failed.
    #[error("group store error: {message}")]
    StoreError {
        /// Store error message
        message: String,
    },

    /// Invalid sink configuration.
    #[error("invalid sink configuration: {message}")]
    ConfigurationError {
        /// Configuration error message
        message: String,
    },

    /// Engine is shutting down and no longer accepts events.
    #[error("engine shutdown requested")]
    ShutdownRequested,

    /// In-flight checks did not finish within the shutdown timeout.
    #[error("shutdown timed out with {pending} tasks still running")]
    ShutdownTimeout {
        /// Tasks still running when the timeout elapsed
        pending: usize,
    },
}

impl DeliveryError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates an error from a non-success HTTP response.
    pub fn from_status(status_code: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        if (400..500).contains(&status_code) {
            Self::ClientError { status_code, body }
        } else {
            Self::ServerError { status_code, body }
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError { message: message.into() }
    }

    /// Creates a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::StoreError { message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    /// Returns the HTTP status reported by the sink, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ClientError { status_code, .. } | Self::ServerError { status_code, .. } => {
                Some(*status_code)
            },
            _ => None,
        }
    }
}

impl From<CoreError> for DeliveryError {
    fn from(err: CoreError) -> Self {
        Self::store(err.to_string())
    }
}

/// Category of error for structured log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network connectivity issues.
    Network,
    /// HTTP client errors (4xx).
    Client,
    /// HTTP server errors (5xx).
    Server,
    /// Group store failures.
    Store,
    /// Configuration problems.
    Configuration,
    /// Internal failures.
    Internal,
}

impl From<&DeliveryError> for ErrorCategory {
    fn from(error: &DeliveryError) -> Self {
        match error {
            DeliveryError::NetworkError { .. } | DeliveryError::Timeout { .. } => Self::Network,
            DeliveryError::ClientError { .. } => Self::Client,
            DeliveryError::ServerError { .. } => Self::Server,
            DeliveryError::StoreError { .. } => Self::Store,
            DeliveryError::ConfigurationError { .. } => Self::Configuration,
            DeliveryError::SerializationError { .. }
            | DeliveryError::ShutdownRequested
            | DeliveryError::ShutdownTimeout { .. } => Self::Internal,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Client => write!(f, "client"),
            Self::Server => write!(f, "server"),
            Self::Store => write!(f, "store"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
