//! Error types shared across the core crate.
//!
//! The markup codec's [`MarkupError`](crate::markup::MarkupError) lives next
//! to the codec; this module holds the gateway-facing API errors.

use thiserror::Error;

/// Error type for gateway API calls.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The gateway connection is not established.
    #[error("gateway is not connected")]
    NotConnected,

    /// The API call timed out.
    #[error("API call timed out")]
    Timeout,

    /// The gateway answered with a non-zero return code.
    #[error("gateway error ({retcode}): {message}")]
    Gateway { retcode: i64, message: String },

    /// Failed to serialize parameters or deserialize the response.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for gateway API calls.
pub type ApiResult<T> = Result<T, ApiError>;
