//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::api::ApiResponse;
use crate::domain::DomainError;
use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Unauthorized: missing or invalid principal")]
    Unauthorized,

    #[error("Access denied to account {0}")]
    AccessDenied(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    // Transfer validation errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Mutation-phase failure
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    // Server errors (5xx)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl AppError {
    /// Stable machine-readable code
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::AccessDenied(_) => "ACCESS_DENIED",
            AppError::InvalidRequest(_) => "VALIDATION_ERROR",
            AppError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            AppError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            AppError::Domain(err) => err.error_code(),
            AppError::TransferFailed(_) => "TRANSFER_FAILED",
            AppError::Store(_) | AppError::Internal(_) | AppError::Config(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::AccessDenied(_) => StatusCode::FORBIDDEN,
            AppError::AccountNotFound(_) | AppError::TransactionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AppError::InvalidRequest(_) | AppError::Domain(_) | AppError::TransferFailed(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Store(_) | AppError::Internal(_) | AppError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to the account holder.
    ///
    /// Never contains store or dependency error text.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Unauthorized => "Unauthorized".to_string(),
            AppError::AccessDenied(_) => "Access denied to this account".to_string(),
            AppError::InvalidRequest(msg) => msg.clone(),
            AppError::AccountNotFound(_) => "Account not found".to_string(),
            AppError::TransactionNotFound(_) => "Transaction not found".to_string(),
            AppError::Domain(err) => match err {
                DomainError::InvalidAmount(msg) => format!("Invalid amount: {msg}"),
                DomainError::SameAccount => "Cannot transfer to the same account".to_string(),
                DomainError::InsufficientFunds { .. } => "Insufficient funds".to_string(),
                DomainError::DestinationNotFound(_) => "Destination account not found".to_string(),
            },
            AppError::TransferFailed(_) => "Transfer could not be completed".to_string(),
            AppError::Store(_) | AppError::Internal(_) | AppError::Config(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            AppError::Store(e) => tracing::error!("Store error: {:?}", e),
            AppError::Internal(msg) => tracing::error!("Internal error: {}", msg),
            AppError::Config(e) => tracing::error!("Config error: {:?}", e),
            AppError::TransferFailed(reason) => tracing::warn!("Transfer failed: {}", reason),
            _ => {}
        }

        let body = ApiResponse::<()>::failure(self.public_message(), self.error_code());

        (status, Json(body)).into_response()
    }
}
