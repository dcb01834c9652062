//! Application error types.

use crate::api::types::ErrorResponse;
use crate::provider::ProviderError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use credit_ledger::LedgerError;
use thiserror::Error;
use tracing::error;

/// Main application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Gate error: {0}")]
    Gate(#[from] access_gate::GateError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Result type alias for application errors.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Ledger errors surface the same way whether they came straight
        // from the ledger or through the gate.
        let ledger_err = match &self {
            AppError::Ledger(e) => Some(e),
            AppError::Gate(access_gate::GateError::Ledger(e)) => Some(e),
            _ => None,
        };

        let (status, code) = if let Some(e) = ledger_err {
            match e {
                LedgerError::AccountNotFound(_) => (StatusCode::NOT_FOUND, "ACCOUNT_NOT_FOUND"),
                LedgerError::AccountExists(_) => (StatusCode::CONFLICT, "ACCOUNT_EXISTS"),
                // Expected user-facing outcome, never a system error.
                LedgerError::InsufficientCredits { .. } => {
                    (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_CREDITS")
                }
                LedgerError::UnknownFeature(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_FEATURE"),
                LedgerError::RefundRequestNotFound(_) => {
                    (StatusCode::NOT_FOUND, "REFUND_NOT_FOUND")
                }
                // Retries already ran out; the request fails closed.
                LedgerError::Storage(_) | LedgerError::Serialization(_) => {
                    error!("Ledger storage failure: {}", self);
                    (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_ERROR")
                }
            }
        } else {
            match &self {
                AppError::Provider(ProviderError::RateLimit) => {
                    (StatusCode::TOO_MANY_REQUESTS, "PROVIDER_RATE_LIMITED")
                }
                AppError::Provider(_) => {
                    error!("Provider failure: {}", self);
                    (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR")
                }
                AppError::Gate(_) => {
                    error!("Gate failure: {}", self);
                    (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_ERROR")
                }
                _ => {
                    error!("Internal error: {}", self);
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            }
        };

        (status, Json(ErrorResponse::new(self.to_string(), code))).into_response()
    }
}
