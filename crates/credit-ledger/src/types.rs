//! Core types for the credit ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for an account (opaque string from the auth layer).
pub type AccountId = String;

/// A credit amount, stored as tenths of a credit.
///
/// The cost model rounds charges up to one decimal place, so tenths are the
/// smallest unit that ever appears on the ledger. Integer tenths keep
/// balance comparisons exact; a balance can never go below zero.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Credits(u64);

impl Credits {
    pub const ZERO: Credits = Credits(0);

    /// Construct from tenths of a credit.
    pub const fn from_tenths(tenths: u64) -> Self {
        Self(tenths)
    }

    /// Construct from a whole number of credits.
    pub const fn from_whole(credits: u64) -> Self {
        Self(credits * 10)
    }

    /// Raw tenths-of-a-credit count.
    pub const fn tenths(self) -> u64 {
        self.0
    }

    /// Tenths as a signed amount, for transaction records.
    pub const fn signed_tenths(self) -> i64 {
        self.0 as i64
    }

    /// Convert to a float (for display only, never for arithmetic).
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 10.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_sub(self, other: Credits) -> Option<Credits> {
        self.0.checked_sub(other.0).map(Credits)
    }

    pub fn saturating_sub(self, other: Credits) -> Credits {
        Credits(self.0.saturating_sub(other.0))
    }

    pub fn saturating_add(self, other: Credits) -> Credits {
        Credits(self.0.saturating_add(other.0))
    }

    pub fn min(self, other: Credits) -> Credits {
        Credits(self.0.min(other.0))
    }
}

impl std::fmt::Display for Credits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

/// Subscription tier for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Starter,
    Premium,
    Unlimited,
}

impl PlanTier {
    pub fn is_free(self) -> bool {
        matches!(self, PlanTier::Free)
    }
}

impl Default for PlanTier {
    fn default() -> Self {
        PlanTier::Free
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanTier::Free => write!(f, "free"),
            PlanTier::Starter => write!(f, "starter"),
            PlanTier::Premium => write!(f, "premium"),
            PlanTier::Unlimited => write!(f, "unlimited"),
        }
    }
}

/// Credit account for a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Email, when known. Used for admin matching and signup screening.
    pub email: Option<String>,
    pub tier: PlanTier,
    /// Current balance. Never negative.
    pub balance: Credits,
    /// Lifetime purchased credits. Only increases.
    pub total_purchased: Credits,
    /// Lifetime consumed credits. Only increases.
    pub total_used: Credits,
    pub created_at: DateTime<Utc>,
    pub banned: bool,
    pub ban_reason: Option<String>,
    /// When set, the ban lifts automatically after this time.
    pub ban_expires_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Create a new account with a zero balance.
    pub fn new(id: impl Into<AccountId>, email: Option<String>, tier: PlanTier) -> Self {
        Self {
            id: id.into(),
            email,
            tier,
            balance: Credits::ZERO,
            total_purchased: Credits::ZERO,
            total_used: Credits::ZERO,
            created_at: Utc::now(),
            banned: false,
            ban_reason: None,
            ban_expires_at: None,
        }
    }

    /// Check if the balance covers the given amount.
    pub fn can_afford(&self, amount: Credits) -> bool {
        self.balance >= amount
    }

    /// Whole days since the account was created.
    pub fn age_days(&self) -> i64 {
        (Utc::now() - self.created_at).num_days()
    }
}

/// Ban state reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BanStatus {
    NotBanned,
    Banned {
        reason: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    },
}

impl BanStatus {
    pub fn is_banned(&self) -> bool {
        matches!(self, BanStatus::Banned { .. })
    }
}

/// Type of ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// User purchased credits.
    Purchase,
    /// Credits deducted for usage.
    Usage,
    /// Refund issued back to the balance.
    Refund,
    /// Promotional or signup credits.
    Bonus,
}

impl TransactionKind {
    /// Whether this kind adds credits to the balance.
    pub const fn is_credit(self) -> bool {
        matches!(self, Self::Purchase | Self::Refund | Self::Bonus)
    }

    pub const fn is_debit(self) -> bool {
        matches!(self, Self::Usage)
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Purchase => write!(f, "purchase"),
            TransactionKind::Usage => write!(f, "usage"),
            TransactionKind::Refund => write!(f, "refund"),
            TransactionKind::Bonus => write!(f, "bonus"),
        }
    }
}

/// An immutable ledger entry.
///
/// Transactions are append-only: replaying `amount_tenths` in creation order
/// reproduces every recorded `balance_after`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub account_id: AccountId,
    pub kind: TransactionKind,
    /// Signed amount in tenths of a credit. Negative only for usage.
    pub amount_tenths: i64,
    /// Balance snapshot immediately after this transaction.
    pub balance_after: Credits,
    pub description: String,
    /// Opaque context (word counts, prompt topic, etc).
    pub metadata: serde_json::Value,
    /// Payment-processor reference, for purchases.
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a usage (debit) transaction. The amount is recorded negative.
    pub fn usage(
        account_id: AccountId,
        amount: Credits,
        balance_after: Credits,
        description: String,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id,
            kind: TransactionKind::Usage,
            amount_tenths: -amount.signed_tenths(),
            balance_after,
            description,
            metadata,
            external_ref: None,
            created_at: Utc::now(),
        }
    }

    /// Create a credit-side transaction (purchase, bonus or refund).
    pub fn credit(
        account_id: AccountId,
        kind: TransactionKind,
        amount: Credits,
        balance_after: Credits,
        description: String,
        external_ref: Option<String>,
    ) -> Self {
        debug_assert!(kind.is_credit());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id,
            kind,
            amount_tenths: amount.signed_tenths(),
            balance_after,
            description,
            metadata: serde_json::Value::Null,
            external_ref,
            created_at: Utc::now(),
        }
    }
}

/// Outcome of a successful debit.
#[derive(Debug, Clone)]
pub struct DebitReceipt {
    /// Id of the usage transaction, for later reconciliation.
    pub transaction_id: String,
    /// Amount actually charged.
    pub charged: Credits,
    pub new_balance: Credits,
}

/// Outcome of a successful credit.
#[derive(Debug, Clone)]
pub struct CreditReceipt {
    pub transaction_id: String,
    pub new_balance: Credits,
}

/// Outcome of a clamped debit (reconciliation only).
///
/// `charged + shortfall` equals the requested amount; the balance floors at
/// exactly zero rather than failing.
#[derive(Debug, Clone)]
pub struct ClampedDebit {
    pub charged: Credits,
    pub shortfall: Credits,
    pub new_balance: Credits,
}

/// Status of a refund request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    Pending,
    Approved,
    Denied,
}

/// A request to refund purchased credits.
///
/// Requests are decided out of band; an approval feeds a `refund`-kind
/// credit back onto the ledger. The request history drives the
/// refund-pattern risk signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub id: String,
    pub account_id: AccountId,
    pub amount: Credits,
    pub reason: String,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl RefundRequest {
    pub fn new(account_id: AccountId, amount: Credits, reason: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id,
            amount,
            reason,
            status: RefundStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }
}

/// Per-period request counter for one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsagePeriod {
    /// Period key, `YYYY-MM`.
    pub period: String,
    pub requests: u32,
}

/// Period key for the current month.
pub fn current_period() -> String {
    Utc::now().format("%Y-%m").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credits_display_one_decimal() {
        assert_eq!(Credits::from_tenths(1).to_string(), "0.1");
        assert_eq!(Credits::from_whole(150).to_string(), "150.0");
        assert_eq!(Credits::from_tenths(1234).to_string(), "123.4");
    }

    #[test]
    fn credits_checked_sub_refuses_negative() {
        let five = Credits::from_whole(5);
        let ten = Credits::from_whole(10);
        assert_eq!(ten.checked_sub(five), Some(five));
        assert_eq!(five.checked_sub(ten), None);
    }

    #[test]
    fn usage_transaction_amount_is_negative() {
        let tx = Transaction::usage(
            "acct-1".into(),
            Credits::from_tenths(25),
            Credits::from_whole(10),
            "Chat message".into(),
            serde_json::Value::Null,
        );
        assert_eq!(tx.amount_tenths, -25);
        assert_eq!(tx.kind, TransactionKind::Usage);
    }

    #[test]
    fn transaction_kind_credit_debit() {
        assert!(TransactionKind::Purchase.is_credit());
        assert!(TransactionKind::Refund.is_credit());
        assert!(TransactionKind::Bonus.is_credit());
        assert!(!TransactionKind::Usage.is_credit());
        assert!(TransactionKind::Usage.is_debit());
    }

    #[test]
    fn ban_status() {
        assert!(!BanStatus::NotBanned.is_banned());
        assert!(BanStatus::Banned {
            reason: None,
            expires_at: None
        }
        .is_banned());
    }
}
