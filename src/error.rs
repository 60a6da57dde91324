//! Error handling for the watch-list camserver

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Duplicate add (same class, overlapping box already on the watch-list)
    #[error("Already tracked: {0}")]
    AlreadyTracked(String),

    /// Interval outside 1..=60
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Acknowledge without a raised alarm
    #[error("Not active: {0}")]
    NotActive(String),

    /// Detector or camera temporarily unable to deliver a batch
    #[error("Detection source unavailable: {0}")]
    DetectionSourceUnavailable(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict (state does not allow the request)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Status code and stable error code for the HTTP surface
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            Error::AlreadyTracked(_) => (StatusCode::CONFLICT, "ALREADY_TRACKED"),
            Error::OutOfRange(_) => (StatusCode::BAD_REQUEST, "OUT_OF_RANGE"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::NotActive(_) => (StatusCode::CONFLICT, "NOT_ACTIVE"),
            Error::DetectionSourceUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "DETECTION_SOURCE_UNAVAILABLE",
            ),
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Error::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Error::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION_ERROR"),
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "HTTP_ERROR"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Human-readable message without the variant prefix
    pub fn message(&self) -> String {
        match self {
            Error::AlreadyTracked(msg)
            | Error::OutOfRange(msg)
            | Error::NotFound(msg)
            | Error::NotActive(msg)
            | Error::DetectionSourceUnavailable(msg)
            | Error::Validation(msg)
            | Error::Conflict(msg)
            | Error::Internal(msg) => msg.clone(),
            Error::Serialization(e) => e.to_string(),
            Error::Http(e) => e.to_string(),
            Error::Io(e) => e.to_string(),
        }
    }

    /// Stable machine-readable code (e.g. `ALREADY_TRACKED`)
    pub fn error_code(&self) -> &'static str {
        self.classify().1
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code) = self.classify();
        let message = self.message();

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error_code = %error_code,
                message = %message,
                "Request error"
            );
        } else {
            tracing::warn!(
                status = %status,
                error_code = %error_code,
                message = %message,
                "Request rejected"
            );
        }

        let body = Json(json!({
            "success": false,
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
