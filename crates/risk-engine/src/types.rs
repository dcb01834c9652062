//! Risk assessment types.

use serde::{Deserialize, Serialize};

/// Kind of action being risk-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Chat message.
    Message,
    /// Image generation.
    Image,
    /// Refund request.
    Refund,
    /// Account signup.
    Signup,
    Quiz,
    Note,
    Slideshow,
}

impl ActionKind {
    /// Content-generation actions share an hourly rate window.
    pub fn is_generation(self) -> bool {
        matches!(self, ActionKind::Quiz | ActionKind::Note | ActionKind::Slideshow)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionKind::Message => "message",
            ActionKind::Image => "image",
            ActionKind::Refund => "refund",
            ActionKind::Signup => "signup",
            ActionKind::Quiz => "quiz",
            ActionKind::Note => "note",
            ActionKind::Slideshow => "slideshow",
        };
        f.write_str(s)
    }
}

/// Risk level derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Recommended action derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskAction {
    Allow,
    /// Proceed, but flag the request for review.
    Warn,
    Block,
    Ban,
}

/// Behavioral signals for one account, gathered by the caller.
///
/// Derived on demand from the account record, recent transactions and the
/// activity tracker; never persisted as its own entity. Slightly stale
/// values are acceptable: this feeds a heuristic, not a security boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiskSignals {
    /// Whole days since the account was created.
    pub account_age_days: i64,
    pub free_tier: bool,
    /// Total refund requests on record.
    pub refund_count: u32,
    /// Days since the most recent refund request, if any.
    pub days_since_last_refund: Option<i64>,
    /// Refund requests that were approved.
    pub approved_refund_count: u32,
    /// Requests of the same action kind in the trailing minute.
    pub recent_action_count: u32,
    /// Generation requests (quiz/note/slideshow) in the trailing hour.
    pub recent_generation_count: u32,
    /// Period-over-period usage increase, percent.
    pub usage_spike_percent: Option<f64>,
    /// Consecutive recent periods at or over the tier's request limit.
    pub limit_saturation_streak: u32,
    /// Email matches a known disposable-mail domain.
    pub disposable_email: bool,
}

/// Result of a risk evaluation.
///
/// Created fresh per evaluation and never persisted as account status;
/// callers log it when the decision is anything but a clean allow.
#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    /// 0-100, higher is more suspicious.
    pub score: u32,
    pub level: RiskLevel,
    pub action: RiskAction,
    /// One human-readable reason per triggered rule, in rule order.
    pub reasons: Vec<String>,
}

impl RiskAssessment {
    /// Whether the behavior crosses the abuse line (block or ban).
    pub fn is_abusive(&self) -> bool {
        self.score >= crate::scorer::BLOCK_THRESHOLD
    }

    /// Fallback assessment used when signals cannot be gathered.
    ///
    /// Availability wins over strict enforcement here; callers must log
    /// the degradation for audit.
    pub fn detection_unavailable() -> Self {
        Self {
            score: 0,
            level: RiskLevel::Low,
            action: RiskAction::Allow,
            reasons: vec!["detection unavailable".to_string()],
        }
    }
}
