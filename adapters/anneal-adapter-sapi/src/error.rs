//! Error types for the SAPI adapter.

use std::time::Duration;

use anneal_client::{ClientError, NetworkErrorKind};
use thiserror::Error;

/// Result type for SAPI operations.
pub type SapiResult<T> = Result<T, SapiError>;

/// Errors that can occur when talking to a SAPI endpoint.
#[derive(Debug, Error)]
pub enum SapiError {
    /// No API token in the connection descriptor.
    #[error("SAPI token not found. Set ANNEAL_API_TOKEN or pass a token in the connection config.")]
    MissingToken,

    /// Token cannot be sent as an HTTP header.
    #[error("Invalid SAPI token")]
    InvalidToken,

    /// Endpoint or proxy URL is unusable.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// API returned a non-success status.
    #[error("SAPI error {status}: {message}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
        /// Parsed `Retry-After` header.
        retry_after: Option<Duration>,
    },

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Well-formed JSON that does not match the expected shape.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<SapiError> for ClientError {
    fn from(e: SapiError) -> Self {
        match e {
            SapiError::MissingToken | SapiError::InvalidToken | SapiError::InvalidUrl(_) => {
                ClientError::Configuration(e.to_string())
            }
            SapiError::HttpError(err) => {
                let kind = if err.is_timeout() {
                    NetworkErrorKind::Timeout
                } else if err.is_connect() {
                    NetworkErrorKind::Connect
                } else if err.is_decode() {
                    return ClientError::InvalidResponse(err.to_string());
                } else if err.is_request() || err.is_body() {
                    NetworkErrorKind::Reset
                } else {
                    NetworkErrorKind::Other
                };
                ClientError::network(kind, err.to_string())
            }
            SapiError::ApiError {
                status,
                message,
                retry_after,
            } => ClientError::Service {
                status,
                message,
                retry_after,
            },
            SapiError::JsonError(err) => ClientError::InvalidResponse(err.to_string()),
            SapiError::UnexpectedResponse(msg) => ClientError::InvalidResponse(msg),
        }
    }
}
