//! Error handling for the fusion service

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
    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Malformed detection or descriptor input
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Camera / detection source failure
    #[error("Source error on {camera}: {message}")]
    Source { camera: String, message: String },

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Risk scoring failure for one identity
    #[error("Scoring error for {identity_id}: {message}")]
    Scoring { identity_id: String, message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            Error::MalformedInput(msg) => (StatusCode::BAD_REQUEST, "MALFORMED_INPUT", msg.clone()),
            Error::Source { camera, message } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SOURCE_ERROR",
                format!("Camera {}: {}", camera, message),
            ),
            Error::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                msg.clone(),
            ),
            Error::Scoring { identity_id, message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SCORING_ERROR",
                format!("Identity {}: {}", identity_id, message),
            ),
            Error::Serialization(e) => (
                StatusCode::BAD_REQUEST,
                "SERIALIZATION_ERROR",
                e.to_string(),
            ),
            Error::Io(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                e.to_string(),
            ),
            Error::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
