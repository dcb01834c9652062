//! Ledger error types.

use crate::types::Credits;
use thiserror::Error;

/// Errors that can occur in the credit ledger.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Balance does not cover the requested debit. Expected and
    /// recoverable; callers present it to the user rather than logging it
    /// as a system error.
    #[error("Insufficient credits: required {required}, available {available}")]
    InsufficientCredits {
        required: Credits,
        available: Credits,
    },

    /// Account does not exist. Fatal to the calling request.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Signup attempted for an id that already has an account.
    #[error("Account already exists: {0}")]
    AccountExists(String),

    /// Refund request id does not exist.
    #[error("Refund request not found: {0}")]
    RefundRequestNotFound(String),

    /// Feature name not known to the cost model.
    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    /// Storage I/O failure after retries were exhausted.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Snapshot serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<std::io::Error> for LedgerError {
    fn from(e: std::io::Error) -> Self {
        LedgerError::Storage(e.to_string())
    }
}
