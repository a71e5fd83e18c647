//! HTTP error mapping.

use aegis_core::AegisError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Errors returned by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request policy was invalid.
    #[error("{0}")]
    BadRequest(String),

    /// The failure gate fired, or the vault failed during reveal. The
    /// body never explains which.
    #[error("sanitization failed, traffic blocked")]
    Blocked,

    /// The engine is not operational.
    #[error("service unavailable")]
    Unavailable,
}

impl ApiError {
    /// The HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Blocked => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<AegisError> for ApiError {
    fn from(err: AegisError) -> Self {
        match err {
            AegisError::Policy(policy_error) => Self::BadRequest(policy_error.to_string()),
            AegisError::SanitizationBlocked { .. }
            | AegisError::RevealFailed { .. }
            | AegisError::Setup { .. } => Self::Blocked,
        }
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
