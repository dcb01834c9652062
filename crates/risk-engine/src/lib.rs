//! Behavioral risk scoring for jumpstudy accounts.
//!
//! Turns recent account behavior into an actionable decision before a paid
//! request is allowed to consume resources. The scorer itself is a pure
//! function of gathered signals; the activity tracker supplies the
//! sliding-window counts those signals need.
//!
//! # Modules
//!
//! - [`scorer`] - Additive rule evaluation and score thresholds
//! - [`activity`] - In-memory sliding-window action tracking
//! - [`config`] - Disposable-email list and fail-open policy

pub mod activity;
pub mod config;
pub mod scorer;
pub mod types;

pub use activity::ActivityTracker;
pub use config::RiskConfig;
pub use scorer::{
    evaluate, from_score, BAN_THRESHOLD, BLOCK_THRESHOLD, GENERATION_MAX, GENERATION_WINDOW,
    MAX_SCORE, RATE_LIMIT_MAX, RATE_LIMIT_WINDOW, WARN_THRESHOLD,
};
pub use types::{ActionKind, RiskAction, RiskAssessment, RiskLevel, RiskSignals};
