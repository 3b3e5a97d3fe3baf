//! Error types for the client runtime.
//!
//! Every error is `Clone`: a terminal future hands the same outcome to all of
//! its waiters, so the error stored on it must be shareable.

use std::time::Duration;

use thiserror::Error;

/// Coarse classification of a failed network round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// The request timed out.
    Timeout,
    /// The connection could not be established.
    Connect,
    /// The connection was reset or closed mid-request.
    Reset,
    /// Anything else (request construction, body decoding).
    Other,
}

/// Errors that can occur in client operations.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Problem or parameters rejected locally before queueing.
    #[error("Invalid problem: {0}")]
    Validation(String),

    /// Transport failure before a response was received.
    #[error("Network error ({kind:?}): {message}")]
    Network {
        /// What kind of failure.
        kind: NetworkErrorKind,
        /// Human-readable detail.
        message: String,
    },

    /// Non-success HTTP status returned by the service.
    #[error("Service error {status}: {message}")]
    Service {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
        /// Server-provided `Retry-After` hint.
        retry_after: Option<Duration>,
    },

    /// The service reported that one specific problem failed.
    #[error("Solver failure: {message}")]
    RemoteJob {
        /// Remote id, when the problem was accepted before failing.
        job_id: Option<String>,
        /// Error code for immediate rejections.
        code: Option<u16>,
        /// Failure reason reported by the service.
        message: String,
    },

    /// The computation was cancelled locally or remotely.
    #[error("Problem cancelled")]
    Cancelled,

    /// A wait or the total problem deadline elapsed.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The service replied with something the client cannot interpret.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The requested solver does not exist.
    #[error("Solver not found: {0}")]
    SolverNotFound(String),

    /// Invalid client or connection configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The client has been closed and accepts no new work.
    #[error("Client is closed")]
    Closed,
}

impl ClientError {
    /// Build a network error.
    pub fn network(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self::Network {
            kind,
            message: message.into(),
        }
    }

    /// Build a service error without a retry hint.
    pub fn service(status: u16, message: impl Into<String>) -> Self {
        Self::Service {
            status,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Build a remote failure for an accepted problem.
    pub fn remote_job(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteJob {
            job_id: Some(job_id.into()),
            code: None,
            message: message.into(),
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Network timeouts, connection failures, resets, 5xx responses and
    /// rate-limit responses are retryable. Everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network { kind, .. } => !matches!(kind, NetworkErrorKind::Other),
            ClientError::Service { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Whether this is a rate-limit response.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ClientError::Service { status: 429, .. })
    }

    /// Server-provided delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ClientError::Service { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
