//! Authorization gate for paid jumpstudy features.
//!
//! The single place where a feature request becomes a decision: admin
//! override first, then ban state, then risk scoring, then affordability,
//! then the charge itself. Variable-cost features reconcile the estimate
//! against the measured cost afterwards.
//!
//! # Modules
//!
//! - [`admin`] - Configured admin allow-list and the unlimited sentinel
//! - [`signals`] - Risk signal gathering from the ledger and activity log
//! - [`gate`] - The authorize/reconcile state machine
//! - [`config`] - Admin list, ban duration, tier period limits

pub mod admin;
pub mod config;
pub mod error;
pub mod gate;
pub mod signals;

pub use admin::{AdminRegistry, UNLIMITED_BALANCE};
pub use config::{AdminConfig, GateConfig, PeriodLimitsConfig};
pub use error::GateError;
pub use gate::{
    AccessGate, Authorization, BalanceView, Decision, Reconciliation, RefundDecision,
    SignupOutcome,
};
pub use signals::{SignalCollector, SignalSource};
