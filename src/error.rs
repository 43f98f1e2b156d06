//! Error types for the catalog feed core
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Failures inside the disk cache.
///
/// These never reach callers of `ExpiringCache`: every variant is logged and
/// treated as a miss (on read) or a dropped write.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Reading or writing the backing file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The escaped key does not fit in a file name
    #[error("Key too long: {0} bytes")]
    KeyTooLong(usize),

    /// The record on disk belongs to another key
    #[error("Key mismatch: expected {expected}, found {found}")]
    KeyMismatch { expected: String, found: String },

    /// The blocking I/O task did not complete
    #[error("Background task failed: {0}")]
    Task(String),
}

// == Fetch Error Enum ==
/// Failure of an upstream page fetch.
///
/// Cloneable so it can be carried inside the observable fetch state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The upstream did not answer in time
    #[error("Request timed out")]
    Timeout,

    /// The upstream answered with a non-success status
    #[error("Upstream returned status {0}")]
    Status(u16),

    /// Connecting or talking to the upstream failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// The upstream body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

// == Api Error Enum ==
/// Unified error type for the HTTP surface.
#[derive(Error, Debug)]
pub enum ApiError {
    /// No feed stream registered under this name
    #[error("Stream not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The upstream fetch failed
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Fetch(FetchError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Fetch(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the HTTP surface.
pub type Result<T> = std::result::Result<T, ApiError>;
