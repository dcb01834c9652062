//! Additive heuristic risk scorer.
//!
//! Pure function of the gathered signals: each triggered rule adds a fixed
//! point value and one reason string. Rules are independent and all are
//! evaluated, so simultaneous concerns compound.

use crate::types::{ActionKind, RiskAction, RiskAssessment, RiskLevel, RiskSignals};
use std::time::Duration;

/// Score ceiling.
pub const MAX_SCORE: u32 = 100;

/// Score at or above which the account is banned.
pub const BAN_THRESHOLD: u32 = 80;

/// Score at or above which the request is blocked.
pub const BLOCK_THRESHOLD: u32 = 60;

/// Score at or above which the request proceeds flagged.
pub const WARN_THRESHOLD: u32 = 35;

/// Window for the same-kind request rate rule.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Same-kind requests allowed inside [`RATE_LIMIT_WINDOW`].
pub const RATE_LIMIT_MAX: u32 = 20;

/// Window for the content-generation rate rule.
pub const GENERATION_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Generation requests allowed inside [`GENERATION_WINDOW`].
pub const GENERATION_MAX: u32 = 10;

/// Evaluate an action against the gathered signals.
pub fn evaluate(action: ActionKind, signals: &RiskSignals) -> RiskAssessment {
    let mut score: u32 = 0;
    let mut reasons = Vec::new();

    // Brand-new accounts doing paid actions.
    if signals.account_age_days < 1 {
        score += 20;
        reasons.push("Very new account (< 1 day old)".to_string());

        if signals.free_tier {
            score += 10;
            reasons.push("Free tier with immediate heavy usage".to_string());
        }
    }

    // Refund-pattern rules only apply to refund requests.
    if action == ActionKind::Refund {
        if signals.refund_count >= 3 {
            score += 50;
            reasons.push(format!(
                "Multiple refund requests ({} total)",
                signals.refund_count
            ));
        } else if signals.refund_count == 2 {
            score += 30;
            reasons.push("Second refund request".to_string());
        }

        if let Some(days) = signals.days_since_last_refund {
            if days < 7 {
                score += 40;
                reasons.push(format!("Recent refund request ({} days ago)", days));
            }
        }

        if signals.approved_refund_count >= 2 {
            score += 35;
            reasons.push(format!(
                "Pattern of approved refunds ({})",
                signals.approved_refund_count
            ));
        }
    }

    if signals.limit_saturation_streak >= 3 {
        score += 15;
        reasons.push("Consistently hitting usage limits".to_string());
    }

    if let Some(spike) = signals.usage_spike_percent {
        if spike > 500.0 && signals.account_age_days < 30 {
            score += 25;
            reasons.push(format!("Sudden usage spike ({:.0}% increase)", spike));
        }
    }

    if signals.recent_action_count > RATE_LIMIT_MAX {
        score += 30;
        reasons.push(format!(
            "Excessive requests ({} in last minute)",
            signals.recent_action_count
        ));
    }

    if action.is_generation() && signals.recent_generation_count > GENERATION_MAX {
        score += 25;
        reasons.push(format!(
            "Excessive {} generation ({} in last hour)",
            action, signals.recent_generation_count
        ));
    }

    if action == ActionKind::Signup && signals.disposable_email {
        score += 40;
        reasons.push("Disposable email address detected".to_string());
    }

    from_score(score.min(MAX_SCORE), reasons)
}

/// Build an assessment from a raw score.
///
/// Thresholds are checked from the highest down; the first match wins.
pub fn from_score(score: u32, reasons: Vec<String>) -> RiskAssessment {
    let (level, action) = if score >= BAN_THRESHOLD {
        (RiskLevel::Critical, RiskAction::Ban)
    } else if score >= BLOCK_THRESHOLD {
        (RiskLevel::High, RiskAction::Block)
    } else if score >= WARN_THRESHOLD {
        (RiskLevel::Medium, RiskAction::Warn)
    } else {
        (RiskLevel::Low, RiskAction::Allow)
    };

    RiskAssessment {
        score,
        level,
        action,
        reasons,
    }
}
