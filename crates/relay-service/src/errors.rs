//! Relay service error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. Messages
//! returned to clients are generic where the cause could leak host details
//! (engine spawn failures); the actual cause is logged server-side.
//!
//! An unknown room is not an error anywhere in the service: state queries
//! return an empty default instead.

use crate::engine::EnginePurpose;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Relay service error type.
///
/// Maps to HTTP status codes:
/// - AuthFailure: 401 Unauthorized
/// - PublisherConflict: 409 Conflict
/// - BadRequest: 400 Bad Request
/// - SpawnFailure, StreamFailure, Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum RelayError {
    /// The ingest credential did not match the shared secret.
    #[error("Authentication failed")]
    AuthFailure,

    /// The publisher id is already streaming in this room.
    #[error("Publisher already active: {0}")]
    PublisherConflict(String),

    /// The media engine process could not be started.
    #[error("Failed to start {purpose} engine: {reason}")]
    SpawnFailure {
        purpose: EnginePurpose,
        reason: String,
    },

    /// Connection or engine-input I/O failed during streaming.
    #[error("Stream failure: {0}")]
    StreamFailure(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::AuthFailure => 401,
            RelayError::PublisherConflict(_) => 409,
            RelayError::BadRequest(_) => 400,
            RelayError::SpawnFailure { .. }
            | RelayError::StreamFailure(_)
            | RelayError::Internal(_) => 500,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            RelayError::AuthFailure => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Invalid or missing ingest credential".to_string(),
            ),
            RelayError::PublisherConflict(publisher) => (
                StatusCode::CONFLICT,
                "CONFLICT",
                format!("Publisher {publisher} is already streaming"),
            ),
            RelayError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone())
            }
            RelayError::SpawnFailure { purpose, reason } => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "relay.engine", purpose = %purpose, error = %reason, "Engine spawn failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SPAWN_FAILED",
                    "The media engine could not be started".to_string(),
                )
            }
            RelayError::StreamFailure(reason) => {
                tracing::warn!(target: "relay.ingest", error = %reason, "Stream failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STREAM_FAILURE",
                    "The media stream failed".to_string(),
                )
            }
            RelayError::Internal(reason) => {
                tracing::error!(target: "relay.internal", error = %reason, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}
