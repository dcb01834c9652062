//! Gate error types.
//!
//! Risk blocks and bans are decisions, not errors; they travel in
//! [`crate::gate::Authorization`]. Errors here are the genuinely
//! exceptional paths: a missing account, exhausted storage retries, or a
//! signal source that could not be read.

use thiserror::Error;

/// Errors that can occur while authorizing a request.
#[derive(Error, Debug)]
pub enum GateError {
    /// Ledger failure (missing account, storage, insufficient credits on
    /// paths that do not absorb it).
    #[error(transparent)]
    Ledger(#[from] credit_ledger::LedgerError),

    /// The risk signal source could not be read.
    #[error("Risk signals unavailable: {0}")]
    SignalsUnavailable(String),
}
