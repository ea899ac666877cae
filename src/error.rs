//! Error handling module
//!
//! Centralized application error type and HTTP response conversion.
//! Ledger failures keep their stable error codes all the way out.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::{Currency, LedgerError};
use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Unauthorized transfer: request user does not own the sender account")]
    UnauthorizedTransfer,

    #[error("Account already exists for currency {0}")]
    AccountExists(Currency),

    #[error("Transfer not found: {0}")]
    TransferNotFound(String),

    /// The recipient does not hold an account here; the external OBP
    /// path is a different service
    #[error("Recipient {0} is not an internal account")]
    ExternalRecipient(String),

    // Ledger errors carry their own taxonomy
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    // Server errors (5xx)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::MissingHeader(header) => (
                StatusCode::BAD_REQUEST,
                "missing_header",
                Some(header.clone()),
            ),

            // 401 Unauthorized
            AppError::InvalidApiKey => (StatusCode::UNAUTHORIZED, "invalid_api_key", None),

            // 403 Forbidden
            AppError::UnauthorizedTransfer => {
                (StatusCode::FORBIDDEN, "unauthorized_transfer", None)
            }

            // 404 Not Found
            AppError::TransferNotFound(reference) => (
                StatusCode::NOT_FOUND,
                "transfer_not_found",
                Some(reference.clone()),
            ),

            // 409 Conflict
            AppError::AccountExists(currency) => (
                StatusCode::CONFLICT,
                "account_exists",
                Some(currency.to_string()),
            ),

            // 422 Unprocessable: valid request, wrong path
            AppError::ExternalRecipient(routing) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "external_recipient",
                Some(routing.clone()),
            ),

            // Ledger taxonomy: stable codes, mapped to HTTP status
            AppError::Ledger(ref err) => {
                let status = match err {
                    LedgerError::InvalidAmount(_)
                    | LedgerError::AccountInactive(_)
                    | LedgerError::InsufficientBalance { .. }
                    | LedgerError::AmountExceedsLimit { .. } => StatusCode::BAD_REQUEST,
                    LedgerError::AccountNotFound(_) => StatusCode::NOT_FOUND,
                    LedgerError::DuplicateReference(_) | LedgerError::Contended => {
                        StatusCode::CONFLICT
                    }
                    LedgerError::RateUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    LedgerError::TransferFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    tracing::error!("Ledger error: {}", err);
                }
                (status, err.code(), Some(err.to_string()))
            }

            // 500 Internal Server Error
            AppError::Store(e) => {
                tracing::error!("Store error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
