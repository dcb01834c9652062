//! Credit ledger for the jumpstudy platform.
//!
//! The authoritative record of account balances. Every paid action debits
//! credits here; purchases and refunds credit them back. The transaction log
//! is append-only and the balance is a cached projection of it.
//!
//! # Modules
//!
//! - [`config`] - Ledger configuration
//! - [`pricing`] - Word-count cost model and flat feature prices
//! - [`store`] - The ledger itself (atomic debit/credit, history, bans)
//!
//! # Concurrency
//!
//! All balance mutation runs under a single write lock, so a pair of
//! concurrent debits on one account can never both succeed against a
//! balance that covers only one of them.

pub mod config;
pub mod error;
pub mod pricing;
pub mod store;
pub mod types;

pub use config::LedgerConfig;
pub use error::LedgerError;
pub use pricing::{
    actual_chat_cost, count_words, estimate_chat_cost, text_credits, ChatEstimate, ChatUsage,
    Feature, WORDS_PER_CREDIT,
};
pub use store::{Ledger, LedgerData};
pub use types::{
    current_period, Account, AccountId, BanStatus, ClampedDebit, CreditReceipt, Credits,
    DebitReceipt, PlanTier, RefundRequest, RefundStatus, Transaction, TransactionKind,
    UsagePeriod,
};
