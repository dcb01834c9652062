//! Risk signal gathering.
//!
//! Builds the [`RiskSignals`] the scorer consumes from the account record,
//! the ledger's refund/usage history and the activity tracker. Reads are
//! not linearizable with concurrent ledger writes; slightly stale counts
//! are acceptable for a heuristic.

use crate::config::PeriodLimitsConfig;
use crate::error::GateError;
use async_trait::async_trait;
use chrono::Utc;
use credit_ledger::{Account, Ledger, RefundStatus};
use risk_engine::{
    ActionKind, ActivityTracker, RiskConfig, RiskSignals, GENERATION_WINDOW, RATE_LIMIT_WINDOW,
};
use std::sync::Arc;

/// Source of risk signals for an account/action pair.
///
/// A seam for testing the gate's degradation path; production uses
/// [`SignalCollector`].
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn collect(
        &self,
        account: &Account,
        action: ActionKind,
    ) -> Result<RiskSignals, GateError>;
}

/// Gathers signals from the ledger and activity tracker.
pub struct SignalCollector {
    ledger: Arc<Ledger>,
    activity: ActivityTracker,
    risk: RiskConfig,
    limits: PeriodLimitsConfig,
}

impl SignalCollector {
    pub fn new(
        ledger: Arc<Ledger>,
        activity: ActivityTracker,
        risk: RiskConfig,
        limits: PeriodLimitsConfig,
    ) -> Self {
        Self {
            ledger,
            activity,
            risk,
            limits,
        }
    }
}

#[async_trait]
impl SignalSource for SignalCollector {
    async fn collect(
        &self,
        account: &Account,
        action: ActionKind,
    ) -> Result<RiskSignals, GateError> {
        let mut signals = RiskSignals {
            account_age_days: account.age_days(),
            free_tier: account.tier.is_free(),
            ..Default::default()
        };

        signals.recent_action_count = self
            .activity
            .count_recent(&account.id, action, RATE_LIMIT_WINDOW)
            .await;

        if action.is_generation() {
            signals.recent_generation_count = self
                .activity
                .count_generation_recent(&account.id, GENERATION_WINDOW)
                .await;
        }

        if action == ActionKind::Refund {
            let refunds = self.ledger.refund_requests(&account.id).await?;
            signals.refund_count = refunds.len() as u32;
            signals.days_since_last_refund = refunds
                .first()
                .map(|r| (Utc::now() - r.created_at).num_days());
            signals.approved_refund_count = refunds
                .iter()
                .filter(|r| r.status == RefundStatus::Approved)
                .count() as u32;
        }

        if action == ActionKind::Signup {
            // No ledger history exists yet at signup.
            if let Some(email) = &account.email {
                signals.disposable_email = self.risk.is_disposable_email(email);
            }
            return Ok(signals);
        }

        let periods = self.ledger.recent_usage_periods(&account.id, 3).await?;
        if let Some(limit) = self.limits.limit_for(account.tier) {
            signals.limit_saturation_streak = periods
                .iter()
                .take_while(|p| p.requests >= limit)
                .count() as u32;
        }
        if periods.len() >= 2 {
            let current = periods[0].requests as f64;
            let previous = periods[1].requests.max(1) as f64;
            signals.usage_spike_percent = Some((current - previous) / previous * 100.0);
        }

        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credit_ledger::{Credits, LedgerConfig, PlanTier};
    use std::time::Duration;

    async fn setup() -> (Arc<Ledger>, ActivityTracker, SignalCollector) {
        let ledger = Ledger::in_memory(LedgerConfig::default());
        let activity = ActivityTracker::new(Duration::from_secs(3600));
        let collector = SignalCollector::new(
            ledger.clone(),
            activity.clone(),
            RiskConfig::default(),
            PeriodLimitsConfig::default(),
        );
        (ledger, activity, collector)
    }

    #[tokio::test]
    async fn collects_refund_signals() {
        let (ledger, _activity, collector) = setup().await;
        let account = ledger
            .create_account("acct-1", None, PlanTier::Starter)
            .await
            .unwrap();

        let first = ledger
            .record_refund_request("acct-1", Credits::from_whole(10), "Accidental purchase")
            .await
            .unwrap();
        ledger
            .record_refund_request("acct-1", Credits::from_whole(5), "Changed my mind")
            .await
            .unwrap();
        ledger.resolve_refund_request(&first.id, true).await.unwrap();

        let signals = collector
            .collect(&account, ActionKind::Refund)
            .await
            .unwrap();

        assert_eq!(signals.refund_count, 2);
        assert_eq!(signals.approved_refund_count, 1);
        assert_eq!(signals.days_since_last_refund, Some(0));
    }

    #[tokio::test]
    async fn refund_signals_skipped_for_other_actions() {
        let (ledger, _activity, collector) = setup().await;
        let account = ledger
            .create_account("acct-1", None, PlanTier::Starter)
            .await
            .unwrap();
        ledger
            .record_refund_request("acct-1", Credits::from_whole(10), "Accidental purchase")
            .await
            .unwrap();

        let signals = collector
            .collect(&account, ActionKind::Message)
            .await
            .unwrap();

        assert_eq!(signals.refund_count, 0);
        assert_eq!(signals.days_since_last_refund, None);
    }

    #[tokio::test]
    async fn collects_rate_window_counts() {
        let (ledger, activity, collector) = setup().await;
        let account = ledger
            .create_account("acct-1", None, PlanTier::Free)
            .await
            .unwrap();

        for _ in 0..4 {
            activity.record("acct-1", ActionKind::Quiz).await;
        }

        let signals = collector.collect(&account, ActionKind::Quiz).await.unwrap();
        assert_eq!(signals.recent_action_count, 4);
        assert_eq!(signals.recent_generation_count, 4);

        // Non-generation actions skip the hourly generation count.
        let signals = collector
            .collect(&account, ActionKind::Message)
            .await
            .unwrap();
        assert_eq!(signals.recent_generation_count, 0);
    }

    #[tokio::test]
    async fn computes_saturation_and_spike() {
        let (ledger, _activity, collector) = setup().await;
        let account = ledger
            .create_account("acct-1", None, PlanTier::Free)
            .await
            .unwrap();

        // Three saturated months for the free tier (limit 10), with the
        // newest period a big jump over the previous one.
        for _ in 0..10 {
            ledger.record_period_usage("acct-1", "2000-01").await.unwrap();
        }
        for _ in 0..10 {
            ledger.record_period_usage("acct-1", "2000-02").await.unwrap();
        }
        for _ in 0..70 {
            ledger.record_period_usage("acct-1", "2000-03").await.unwrap();
        }

        let signals = collector
            .collect(&account, ActionKind::Message)
            .await
            .unwrap();

        assert_eq!(signals.limit_saturation_streak, 3);
        // (70 - 10) / 10 = 600%
        assert_eq!(signals.usage_spike_percent, Some(600.0));
    }

    #[tokio::test]
    async fn signup_screens_email_without_history() {
        let (_ledger, _activity, collector) = setup().await;

        // Transient account, not yet in the ledger.
        let account = Account::new(
            "acct-new",
            Some("abuser@tempmail.com".into()),
            PlanTier::Free,
        );

        let signals = collector
            .collect(&account, ActionKind::Signup)
            .await
            .unwrap();

        assert!(signals.disposable_email);
        assert_eq!(signals.account_age_days, 0);
    }
}
