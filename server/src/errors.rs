//! Consistent JSON error responses.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use wallet_common::WalletError;

/// Errors surfaced by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error("Unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("Conflict: {0}")]
    Conflict(&'static str),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Wallet(err) => match err {
                WalletError::Validation { .. } | WalletError::InsufficientFunds { .. } => {
                    StatusCode::BAD_REQUEST
                }
                WalletError::RateUnavailable {
                    retryable: false, ..
                } => StatusCode::UNPROCESSABLE_ENTITY,
                err if err.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Wallet(err) => err.error_code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Datastore details stay in the logs.
            ApiError::Wallet(WalletError::Infrastructure { .. }) => {
                tracing::error!(error = %self, "Request failed");
                "Internal error".to_string()
            }
            ApiError::Unauthorized(reason) | ApiError::Conflict(reason) => reason.to_string(),
            other => other.to_string(),
        };
        json_error(status, self.code(), message)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Wallet(WalletError::validation(rejection.body_text(), "body"))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Wallet(WalletError::validation(rejection.body_text(), "query"))
    }
}

/// Render `{"error": code, "message": message}` with a status.
pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
