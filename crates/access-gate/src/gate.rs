//! The access gate.
//!
//! Single entry point a feature handler calls before consuming a paid
//! action. Composes the admin registry, the risk scorer and the ledger
//! into one decision, and owns the estimate-vs-actual reconciliation for
//! variable-cost features. No other component bans or charges on its own,
//! which keeps the authorization policy auditable in one place.

use crate::admin::{AdminRegistry, UNLIMITED_BALANCE};
use crate::config::GateConfig;
use crate::error::GateError;
use crate::signals::{SignalCollector, SignalSource};
use chrono::Utc;
use credit_ledger::{
    current_period, Account, BanStatus, Credits, DebitReceipt, Feature, Ledger, LedgerError,
    PlanTier, RefundRequest, TransactionKind,
};
use risk_engine::{ActionKind, ActivityTracker, RiskAction, RiskAssessment};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Final decision for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    /// Allowed and charged, but flagged for review.
    Warn,
    Block,
    Ban,
}

/// Balance as reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceView {
    Credits(Credits),
    /// Admin sentinel; display only.
    Unlimited,
}

impl BalanceView {
    /// Displayable credit amount ([`UNLIMITED_BALANCE`] for admins).
    pub fn display_credits(self) -> Credits {
        match self {
            BalanceView::Credits(c) => c,
            BalanceView::Unlimited => UNLIMITED_BALANCE,
        }
    }
}

impl std::fmt::Display for BalanceView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BalanceView::Credits(c) => write!(f, "{}", c),
            BalanceView::Unlimited => write!(f, "unlimited"),
        }
    }
}

/// Outcome of [`AccessGate::authorize`].
#[derive(Debug, Clone)]
pub struct Authorization {
    pub decision: Decision,
    pub reason: Option<String>,
    pub balance: BalanceView,
    /// Present on charged decisions; feeds reconciliation.
    pub receipt: Option<DebitReceipt>,
    /// Absent for admin bypass and pre-risk short-circuits.
    pub assessment: Option<RiskAssessment>,
}

impl Authorization {
    /// Whether the caller may proceed with the request.
    pub fn is_allowed(&self) -> bool {
        matches!(self.decision, Decision::Allow | Decision::Warn)
    }
}

/// Outcome of [`AccessGate::reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Actual cost matched the estimate.
    Settled,
    /// Actual exceeded the estimate; the difference was debited, clamped
    /// at the available balance.
    Charged { amount: Credits, shortfall: Credits },
    /// Actual came in under the estimate; the difference was refunded.
    Refunded { amount: Credits },
}

/// Outcome of [`AccessGate::request_refund`].
#[derive(Debug, Clone)]
pub struct RefundDecision {
    pub decision: Decision,
    pub reason: Option<String>,
    /// The recorded request, when the refund path was not blocked.
    pub request: Option<RefundRequest>,
    pub assessment: Option<RiskAssessment>,
}

impl RefundDecision {
    /// Whether the request was recorded for review.
    pub fn is_allowed(&self) -> bool {
        matches!(self.decision, Decision::Allow | Decision::Warn)
    }
}

/// Outcome of [`AccessGate::signup`].
#[derive(Debug, Clone)]
pub struct SignupOutcome {
    pub decision: Decision,
    pub reason: Option<String>,
    /// The created account, when signup was not blocked.
    pub account: Option<Account>,
    pub assessment: Option<RiskAssessment>,
}

/// Authorization gate over the ledger, risk engine and admin registry.
pub struct AccessGate {
    ledger: Arc<Ledger>,
    activity: ActivityTracker,
    admin: AdminRegistry,
    signals: Arc<dyn SignalSource>,
    config: GateConfig,
}

impl AccessGate {
    pub fn new(ledger: Arc<Ledger>, activity: ActivityTracker, config: GateConfig) -> Self {
        let signals = Arc::new(SignalCollector::new(
            ledger.clone(),
            activity.clone(),
            config.risk.clone(),
            config.period_limits.clone(),
        ));
        Self::with_signal_source(ledger, activity, config, signals)
    }

    /// Construct with an injected signal source (used by tests to exercise
    /// the degradation path).
    pub fn with_signal_source(
        ledger: Arc<Ledger>,
        activity: ActivityTracker,
        config: GateConfig,
        signals: Arc<dyn SignalSource>,
    ) -> Self {
        let admin = AdminRegistry::new(&config.admin);
        Self {
            ledger,
            activity,
            admin,
            signals,
            config,
        }
    }

    /// The risk action kind a feature counts as.
    fn action_for(feature: Feature) -> ActionKind {
        match feature {
            Feature::Chat => ActionKind::Message,
            Feature::ImageGeneration => ActionKind::Image,
            Feature::QuizGeneration => ActionKind::Quiz,
            Feature::NoteGeneration | Feature::NoteEnhancement => ActionKind::Note,
            Feature::SlideshowGeneration => ActionKind::Slideshow,
        }
    }

    /// Ledger description for a feature charge.
    fn charge_description(feature: Feature) -> &'static str {
        match feature {
            Feature::Chat => "Chat message",
            Feature::ImageGeneration => "Image generation",
            Feature::QuizGeneration => "Quiz generation",
            Feature::NoteGeneration => "Note generation",
            Feature::SlideshowGeneration => "Slideshow generation",
            Feature::NoteEnhancement => "Note enhancement",
        }
    }

    /// Authorize a paid feature request and, when allowed, charge the
    /// estimated cost.
    #[instrument(skip(self), fields(feature = %feature, estimated = %estimated))]
    pub async fn authorize(
        &self,
        account_id: &str,
        feature: Feature,
        estimated: Credits,
    ) -> Result<Authorization, GateError> {
        let account = self.ledger.account(account_id).await?;

        // Admins never pay and are never scored.
        if self.admin.is_admin(account_id, account.email.as_deref()) {
            debug!("Admin override for {}", account_id);
            return Ok(Authorization {
                decision: Decision::Allow,
                reason: None,
                balance: BalanceView::Unlimited,
                receipt: None,
                assessment: None,
            });
        }

        // An unexpired ban short-circuits before any scoring or charging.
        if let BanStatus::Banned { reason, expires_at } =
            self.ledger.ban_status(account_id).await?
        {
            warn!(
                "Rejected banned account {} (reason {:?}, expires {:?})",
                account_id, reason, expires_at
            );
            return Ok(Authorization {
                decision: Decision::Ban,
                reason: reason.or_else(|| Some("account banned".into())),
                balance: BalanceView::Credits(account.balance),
                receipt: None,
                assessment: None,
            });
        }

        let action = Self::action_for(feature);

        // The request counts toward rate windows whatever the outcome.
        self.activity.record(account_id, action).await;
        self.ledger
            .record_period_usage(account_id, &current_period())
            .await?;

        let assessment = match self.evaluate(&account, action).await {
            Ok(assessment) => assessment,
            Err(authorization) => return Ok(*authorization),
        };

        match assessment.action {
            RiskAction::Ban => {
                let reason = assessment.reasons.join("; ");
                let expires = Utc::now()
                    + chrono::Duration::from_std(self.config.ban_duration)
                        .unwrap_or_else(|_| chrono::Duration::days(30));
                self.ledger
                    .set_ban(account_id, &reason, Some(expires))
                    .await?;
                warn!(
                    "Risk ban for {} (score {}): {:?}",
                    account_id, assessment.score, assessment.reasons
                );
                return Ok(Authorization {
                    decision: Decision::Ban,
                    reason: Some(reason),
                    balance: BalanceView::Credits(account.balance),
                    receipt: None,
                    assessment: Some(assessment),
                });
            }
            RiskAction::Block => {
                warn!(
                    "Risk block for {} (score {}): {:?}",
                    account_id, assessment.score, assessment.reasons
                );
                return Ok(Authorization {
                    decision: Decision::Block,
                    reason: Some(assessment.reasons.join("; ")),
                    balance: BalanceView::Credits(account.balance),
                    receipt: None,
                    assessment: Some(assessment),
                });
            }
            RiskAction::Warn => {
                warn!(
                    "Risk warn for {} (score {}): {:?}",
                    account_id, assessment.score, assessment.reasons
                );
            }
            RiskAction::Allow => {}
        }

        // Optimistic pre-check for a clean rejection message; the
        // authoritative check is the debit itself.
        if !self.ledger.can_afford(account_id, estimated).await? {
            let balance = self.ledger.balance(account_id).await?;
            info!(
                "Insufficient credits for {} ({} needed, {} available)",
                account_id, estimated, balance
            );
            return Ok(Authorization {
                decision: Decision::Block,
                reason: Some("insufficient credits".into()),
                balance: BalanceView::Credits(balance),
                receipt: None,
                assessment: Some(assessment),
            });
        }

        let receipt = match self
            .ledger
            .debit(
                account_id,
                estimated,
                Self::charge_description(feature),
                serde_json::json!({ "feature": feature.as_str() }),
            )
            .await
        {
            Ok(receipt) => receipt,
            // Lost the race against a concurrent debit; same outcome as
            // the pre-check.
            Err(LedgerError::InsufficientCredits { available, .. }) => {
                info!(
                    "Insufficient credits for {} ({} needed, {} available)",
                    account_id, estimated, available
                );
                return Ok(Authorization {
                    decision: Decision::Block,
                    reason: Some("insufficient credits".into()),
                    balance: BalanceView::Credits(available),
                    receipt: None,
                    assessment: Some(assessment),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let decision = if assessment.action == RiskAction::Warn {
            Decision::Warn
        } else {
            Decision::Allow
        };

        Ok(Authorization {
            decision,
            reason: None,
            balance: BalanceView::Credits(receipt.new_balance),
            receipt: Some(receipt),
            assessment: Some(assessment),
        })
    }

    /// Adjust a prior estimated charge to the measured actual cost.
    ///
    /// Only the difference moves: an overrun is debited (clamped at the
    /// available balance, shortfall absorbed), an underrun is refunded.
    /// Never re-debits the full actual amount.
    #[instrument(skip(self, receipt), fields(actual = %actual))]
    pub async fn reconcile(
        &self,
        account_id: &str,
        receipt: &DebitReceipt,
        actual: Credits,
    ) -> Result<Reconciliation, GateError> {
        if actual > receipt.charged {
            let difference = actual.saturating_sub(receipt.charged);
            let outcome = self
                .ledger
                .debit_clamped(
                    account_id,
                    difference,
                    "Usage reconciliation",
                    serde_json::json!({ "estimate_transaction": receipt.transaction_id }),
                )
                .await?;
            debug!(
                "Reconciled {}: charged {} more (shortfall {})",
                account_id, outcome.charged, outcome.shortfall
            );
            Ok(Reconciliation::Charged {
                amount: outcome.charged,
                shortfall: outcome.shortfall,
            })
        } else if actual < receipt.charged {
            let difference = receipt.charged.saturating_sub(actual);
            self.ledger
                .credit(
                    account_id,
                    difference,
                    TransactionKind::Refund,
                    "Usage reconciliation refund",
                    None,
                )
                .await?;
            debug!("Reconciled {}: refunded {}", account_id, difference);
            Ok(Reconciliation::Refunded { amount: difference })
        } else {
            Ok(Reconciliation::Settled)
        }
    }

    /// Run the refund-pattern risk path and record the request when it is
    /// not blocked. The request is decided out of band; approval feeds a
    /// `refund`-kind credit separately.
    #[instrument(skip(self, reason))]
    pub async fn request_refund(
        &self,
        account_id: &str,
        amount: Credits,
        reason: &str,
    ) -> Result<RefundDecision, GateError> {
        let account = self.ledger.account(account_id).await?;

        if let BanStatus::Banned { reason, .. } = self.ledger.ban_status(account_id).await? {
            return Ok(RefundDecision {
                decision: Decision::Ban,
                reason: reason.or_else(|| Some("account banned".into())),
                request: None,
                assessment: None,
            });
        }

        self.activity.record(account_id, ActionKind::Refund).await;

        let assessment = match self.evaluate(&account, ActionKind::Refund).await {
            Ok(assessment) => assessment,
            Err(authorization) => {
                return Ok(RefundDecision {
                    decision: authorization.decision,
                    reason: authorization.reason,
                    request: None,
                    assessment: None,
                })
            }
        };

        match assessment.action {
            RiskAction::Ban => {
                let ban_reason = assessment.reasons.join("; ");
                let expires = Utc::now()
                    + chrono::Duration::from_std(self.config.ban_duration)
                        .unwrap_or_else(|_| chrono::Duration::days(30));
                self.ledger
                    .set_ban(account_id, &ban_reason, Some(expires))
                    .await?;
                warn!(
                    "Refund abuse ban for {} (score {}): {:?}",
                    account_id, assessment.score, assessment.reasons
                );
                Ok(RefundDecision {
                    decision: Decision::Ban,
                    reason: Some(ban_reason),
                    request: None,
                    assessment: Some(assessment),
                })
            }
            RiskAction::Block => {
                warn!(
                    "Refund blocked for {} (score {}): {:?}",
                    account_id, assessment.score, assessment.reasons
                );
                Ok(RefundDecision {
                    decision: Decision::Block,
                    reason: Some(assessment.reasons.join("; ")),
                    request: None,
                    assessment: Some(assessment),
                })
            }
            risk_action => {
                if risk_action == RiskAction::Warn {
                    warn!(
                        "Refund flagged for {} (score {}): {:?}",
                        account_id, assessment.score, assessment.reasons
                    );
                }
                let request = self
                    .ledger
                    .record_refund_request(account_id, amount, reason)
                    .await?;
                Ok(RefundDecision {
                    decision: if risk_action == RiskAction::Warn {
                        Decision::Warn
                    } else {
                        Decision::Allow
                    },
                    reason: None,
                    request: Some(request),
                    assessment: Some(assessment),
                })
            }
        }
    }

    /// Screen a signup and create the account when it passes.
    #[instrument(skip(self, email))]
    pub async fn signup(
        &self,
        account_id: &str,
        email: Option<String>,
        tier: PlanTier,
    ) -> Result<SignupOutcome, GateError> {
        // Transient record for screening; nothing is persisted unless the
        // signup passes.
        let candidate = Account::new(account_id, email.clone(), tier);

        let assessment = match self.evaluate(&candidate, ActionKind::Signup).await {
            Ok(assessment) => assessment,
            Err(authorization) => {
                return Ok(SignupOutcome {
                    decision: authorization.decision,
                    reason: authorization.reason,
                    account: None,
                    assessment: None,
                })
            }
        };

        if matches!(assessment.action, RiskAction::Block | RiskAction::Ban) {
            warn!(
                "Signup rejected for {} (score {}): {:?}",
                account_id, assessment.score, assessment.reasons
            );
            return Ok(SignupOutcome {
                decision: Decision::Block,
                reason: Some(assessment.reasons.join("; ")),
                account: None,
                assessment: Some(assessment),
            });
        }

        let account = self.ledger.create_account(account_id, email, tier).await?;

        Ok(SignupOutcome {
            decision: if assessment.action == RiskAction::Warn {
                Decision::Warn
            } else {
                Decision::Allow
            },
            reason: None,
            account: Some(account),
            assessment: Some(assessment),
        })
    }

    /// Balance as the caller should display it (admin sentinel included).
    pub async fn balance(&self, account_id: &str) -> Result<BalanceView, GateError> {
        let account = self.ledger.account(account_id).await?;
        if self.admin.is_admin(account_id, account.email.as_deref()) {
            Ok(BalanceView::Unlimited)
        } else {
            Ok(BalanceView::Credits(account.balance))
        }
    }

    /// Gather signals and score them, degrading per the configured
    /// fail-open policy when the source cannot be read.
    async fn evaluate(
        &self,
        account: &Account,
        action: ActionKind,
    ) -> Result<RiskAssessment, Box<Authorization>> {
        match self.signals.collect(account, action).await {
            Ok(signals) => Ok(risk_engine::evaluate(action, &signals)),
            Err(e) if self.config.risk.fail_open => {
                // Availability over strictness; the degradation is logged
                // for audit, never silent.
                warn!(
                    "Risk signals unavailable for {} ({}); failing open",
                    account.id, e
                );
                Ok(RiskAssessment::detection_unavailable())
            }
            Err(e) => {
                warn!(
                    "Risk signals unavailable for {} ({}); failing closed",
                    account.id, e
                );
                Err(Box::new(Authorization {
                    decision: Decision::Block,
                    reason: Some("risk check unavailable".into()),
                    balance: BalanceView::Credits(account.balance),
                    receipt: None,
                    assessment: None,
                }))
            }
        }
    }
}
