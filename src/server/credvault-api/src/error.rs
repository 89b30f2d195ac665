//! API error type and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use credvault_credentials::{CredentialError, SetupError};

/// Error body: `{"error": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human readable message.
    pub error: String,
}

/// Errors returned by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or incomplete request.
    #[error("{0}")]
    BadRequest(String),

    /// Credential does not exist.
    #[error("Credential '{0}' not found")]
    CredentialNotFound(String),

    /// Store failure.
    #[error(transparent)]
    Store(#[from] CredentialError),

    /// Agent credential resolution failure.
    #[error(transparent)]
    Setup(#[from] SetupError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) | Self::Store(CredentialError::InvalidId(_)) => {
                StatusCode::BAD_REQUEST
            },
            Self::CredentialNotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(e) => {
                tracing::error!(error = %e, "Credential store error");
                StatusCode::INTERNAL_SERVER_ERROR
            },
            Self::Setup(e) => {
                tracing::error!(error = %e, "Error checking agent credentials");
                StatusCode::INTERNAL_SERVER_ERROR
            },
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

/// Result alias for handlers.
pub type ApiResult<T> = Result<T, ApiError>;
