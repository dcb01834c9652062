//! Persistent credit ledger store.
//!
//! The single source of truth for account balances. Every read-check-write
//! runs under one write lock, which serializes concurrent debits on the same
//! account: two debits that together exceed the balance produce exactly one
//! success and one `InsufficientCredits`. Mutations are snapshotted to disk
//! with bounded retry; the snapshot write is atomic (tmp + rename).

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::types::{
    Account, AccountId, BanStatus, ClampedDebit, CreditReceipt, Credits, DebitReceipt, PlanTier,
    RefundRequest, RefundStatus, Transaction, TransactionKind, UsagePeriod,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Data version for schema migrations.
const DATA_VERSION: u32 = 1;

/// Cap on the doubling storage-retry backoff.
const MAX_PERSIST_BACKOFF: Duration = Duration::from_secs(5);

/// Persistent data structure for the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerData {
    /// Schema version for migrations.
    pub version: u32,
    /// Account state, keyed by account id.
    pub accounts: HashMap<AccountId, Account>,
    /// Append-only transaction log, in creation order.
    pub transactions: Vec<Transaction>,
    /// Refund request history.
    pub refund_requests: Vec<RefundRequest>,
    /// Per-period request counters, newest last.
    pub usage_periods: HashMap<AccountId, Vec<UsagePeriod>>,
}

impl Default for LedgerData {
    fn default() -> Self {
        Self {
            version: DATA_VERSION,
            accounts: HashMap::new(),
            transactions: Vec::new(),
            refund_requests: Vec::new(),
            usage_periods: HashMap::new(),
        }
    }
}

/// The credit ledger.
pub struct Ledger {
    data: RwLock<LedgerData>,
    /// Snapshot path; `None` keeps the ledger memory-only.
    storage_path: Option<PathBuf>,
    persist_retries: u32,
    persist_backoff: Duration,
    signup_grant: Credits,
}

impl Ledger {
    /// Open a ledger backed by the configured snapshot file, loading
    /// existing state if present.
    pub async fn open(config: LedgerConfig) -> Result<Arc<Self>, LedgerError> {
        let ledger = Arc::new(Self {
            data: RwLock::new(LedgerData::default()),
            storage_path: Some(config.storage_path.clone()),
            persist_retries: config.persist_retries,
            persist_backoff: config.persist_backoff,
            signup_grant: config.signup_grant,
        });

        ledger.load().await?;

        Ok(ledger)
    }

    /// Create a memory-only ledger (no snapshot file).
    pub fn in_memory(config: LedgerConfig) -> Arc<Self> {
        Arc::new(Self {
            data: RwLock::new(LedgerData::default()),
            storage_path: None,
            persist_retries: config.persist_retries,
            persist_backoff: config.persist_backoff,
            signup_grant: config.signup_grant,
        })
    }

    /// Load state from the snapshot file.
    async fn load(&self) -> Result<(), LedgerError> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };

        if !path.exists() {
            info!("Ledger snapshot not found at {:?}, starting fresh", path);
            return Ok(());
        }

        let bytes = fs::read(path).await?;
        let data: LedgerData = serde_json::from_slice(&bytes)?;

        info!(
            "Loaded ledger: {} accounts, {} transactions",
            data.accounts.len(),
            data.transactions.len()
        );

        *self.data.write().await = data;

        Ok(())
    }

    /// Save state to the snapshot file, retrying transient I/O failures
    /// with doubling backoff before surfacing a storage error.
    async fn persist(&self) -> Result<(), LedgerError> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };

        let snapshot = {
            let data = self.data.read().await;
            serde_json::to_vec_pretty(&*data)?
        };

        let mut backoff = self.persist_backoff;
        let mut last_err = None;

        for attempt in 0..=self.persist_retries {
            if attempt > 0 {
                debug!("Retrying ledger persist (attempt {}) after {:?}", attempt, backoff);
                sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_PERSIST_BACKOFF);
            }

            match write_snapshot(path, &snapshot).await {
                Ok(()) => {
                    debug!("Saved ledger snapshot ({} bytes) to {:?}", snapshot.len(), path);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Ledger persist failed (attempt {}): {}", attempt + 1, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| LedgerError::Storage("persist retries exhausted".into())))
    }

    /// Create an account and apply the signup grant.
    #[instrument(skip(self, email))]
    pub async fn create_account(
        &self,
        account_id: &str,
        email: Option<String>,
        tier: PlanTier,
    ) -> Result<Account, LedgerError> {
        let account = {
            let mut data = self.data.write().await;

            if data.accounts.contains_key(account_id) {
                return Err(LedgerError::AccountExists(account_id.to_string()));
            }

            let mut account = Account::new(account_id, email, tier);
            if !self.signup_grant.is_zero() {
                account.balance = self.signup_grant;
                data.transactions.push(Transaction::credit(
                    account.id.clone(),
                    TransactionKind::Bonus,
                    self.signup_grant,
                    account.balance,
                    "Welcome bonus".into(),
                    None,
                ));
            }
            data.accounts.insert(account.id.clone(), account.clone());
            account
        };

        self.persist().await?;

        info!(
            "Created account {} (tier {}, starting balance {})",
            account.id, account.tier, account.balance
        );

        Ok(account)
    }

    /// Snapshot of an account.
    pub async fn account(&self, account_id: &str) -> Result<Account, LedgerError> {
        let data = self.data.read().await;
        data.accounts
            .get(account_id)
            .cloned()
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    /// Current balance.
    pub async fn balance(&self, account_id: &str) -> Result<Credits, LedgerError> {
        Ok(self.account(account_id).await?.balance)
    }

    /// Optimistic affordability pre-check. Not atomic with a following
    /// `debit`; the authoritative check happens inside `debit` itself.
    pub async fn can_afford(
        &self,
        account_id: &str,
        needed: Credits,
    ) -> Result<bool, LedgerError> {
        Ok(self.account(account_id).await?.can_afford(needed))
    }

    /// Atomically debit an account.
    ///
    /// Re-reads the balance under the write lock; fails with
    /// `InsufficientCredits` when the balance does not cover the amount (no
    /// partial debit, no transaction appended).
    #[instrument(skip(self, metadata), fields(amount = %amount))]
    pub async fn debit(
        &self,
        account_id: &str,
        amount: Credits,
        description: &str,
        metadata: serde_json::Value,
    ) -> Result<DebitReceipt, LedgerError> {
        let receipt = {
            let mut data = self.data.write().await;

            let account = data
                .accounts
                .get_mut(account_id)
                .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

            let new_balance = account.balance.checked_sub(amount).ok_or(
                LedgerError::InsufficientCredits {
                    required: amount,
                    available: account.balance,
                },
            )?;

            account.balance = new_balance;
            account.total_used = account.total_used.saturating_add(amount);

            let tx = Transaction::usage(
                account.id.clone(),
                amount,
                new_balance,
                description.to_string(),
                metadata,
            );
            let receipt = DebitReceipt {
                transaction_id: tx.id.clone(),
                charged: amount,
                new_balance,
            };
            data.transactions.push(tx);
            receipt
        };

        self.persist().await?;

        debug!(
            "Debited {} from {} (balance {})",
            amount, account_id, receipt.new_balance
        );

        Ok(receipt)
    }

    /// Debit up to the available balance, flooring at exactly zero.
    ///
    /// Used only by reconciliation: when the actual cost of a completed
    /// request exceeds the remaining balance, the shortfall is absorbed
    /// rather than failing an already-delivered response.
    #[instrument(skip(self, metadata), fields(amount = %amount))]
    pub async fn debit_clamped(
        &self,
        account_id: &str,
        amount: Credits,
        description: &str,
        metadata: serde_json::Value,
    ) -> Result<ClampedDebit, LedgerError> {
        let outcome = {
            let mut data = self.data.write().await;

            let account = data
                .accounts
                .get_mut(account_id)
                .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

            let charged = amount.min(account.balance);
            let shortfall = amount.saturating_sub(charged);
            let new_balance = account.balance.saturating_sub(charged);

            account.balance = new_balance;
            account.total_used = account.total_used.saturating_add(charged);

            if !charged.is_zero() {
                data.transactions.push(Transaction::usage(
                    account_id.to_string(),
                    charged,
                    new_balance,
                    description.to_string(),
                    metadata,
                ));
            }

            ClampedDebit {
                charged,
                shortfall,
                new_balance,
            }
        };

        self.persist().await?;

        if !outcome.shortfall.is_zero() {
            warn!(
                "Clamped debit on {}: absorbed {} shortfall (charged {})",
                account_id, outcome.shortfall, outcome.charged
            );
        }

        Ok(outcome)
    }

    /// Atomically credit an account. No upper bound.
    #[instrument(skip(self), fields(amount = %amount))]
    pub async fn credit(
        &self,
        account_id: &str,
        amount: Credits,
        kind: TransactionKind,
        description: &str,
        external_ref: Option<String>,
    ) -> Result<CreditReceipt, LedgerError> {
        debug_assert!(kind.is_credit(), "credit() called with a debit kind");

        let receipt = {
            let mut data = self.data.write().await;

            let account = data
                .accounts
                .get_mut(account_id)
                .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

            account.balance = account.balance.saturating_add(amount);
            if kind == TransactionKind::Purchase {
                account.total_purchased = account.total_purchased.saturating_add(amount);
            }

            let tx = Transaction::credit(
                account.id.clone(),
                kind,
                amount,
                account.balance,
                description.to_string(),
                external_ref,
            );
            let receipt = CreditReceipt {
                transaction_id: tx.id.clone(),
                new_balance: account.balance,
            };
            data.transactions.push(tx);
            receipt
        };

        self.persist().await?;

        info!(
            "Credited {} to {} (balance {})",
            amount, account_id, receipt.new_balance
        );

        Ok(receipt)
    }

    /// Most recent transactions for an account, newest first.
    pub async fn history(
        &self,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let data = self.data.read().await;
        if !data.accounts.contains_key(account_id) {
            return Err(LedgerError::AccountNotFound(account_id.to_string()));
        }
        Ok(data
            .transactions
            .iter()
            .rev()
            .filter(|tx| tx.account_id == account_id)
            .take(limit)
            .cloned()
            .collect())
    }

    /// Current ban state. An expired ban is cleared as a side effect of
    /// the check, so a past `ban_expires_at` reads as not banned.
    pub async fn ban_status(&self, account_id: &str) -> Result<BanStatus, LedgerError> {
        let (status, cleared) = {
            let mut data = self.data.write().await;

            let account = data
                .accounts
                .get_mut(account_id)
                .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

            if !account.banned {
                (BanStatus::NotBanned, false)
            } else if account
                .ban_expires_at
                .is_some_and(|expires| Utc::now() >= expires)
            {
                account.banned = false;
                account.ban_reason = None;
                account.ban_expires_at = None;
                (BanStatus::NotBanned, true)
            } else {
                (
                    BanStatus::Banned {
                        reason: account.ban_reason.clone(),
                        expires_at: account.ban_expires_at,
                    },
                    false,
                )
            }
        };

        if cleared {
            info!("Ban expired for {}, lifted", account_id);
            self.persist().await?;
        }

        Ok(status)
    }

    /// Ban an account, optionally until a given time.
    pub async fn set_ban(
        &self,
        account_id: &str,
        reason: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), LedgerError> {
        {
            let mut data = self.data.write().await;

            let account = data
                .accounts
                .get_mut(account_id)
                .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

            account.banned = true;
            account.ban_reason = Some(reason.to_string());
            account.ban_expires_at = expires_at;
        }

        self.persist().await?;

        warn!("Banned {} ({}), expires {:?}", account_id, reason, expires_at);

        Ok(())
    }

    /// Lift a ban manually.
    pub async fn lift_ban(&self, account_id: &str) -> Result<(), LedgerError> {
        {
            let mut data = self.data.write().await;

            let account = data
                .accounts
                .get_mut(account_id)
                .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

            account.banned = false;
            account.ban_reason = None;
            account.ban_expires_at = None;
        }

        self.persist().await?;

        info!("Lifted ban for {}", account_id);

        Ok(())
    }

    /// Record a new pending refund request.
    pub async fn record_refund_request(
        &self,
        account_id: &str,
        amount: Credits,
        reason: &str,
    ) -> Result<RefundRequest, LedgerError> {
        let request = {
            let mut data = self.data.write().await;

            if !data.accounts.contains_key(account_id) {
                return Err(LedgerError::AccountNotFound(account_id.to_string()));
            }

            let request =
                RefundRequest::new(account_id.to_string(), amount, reason.to_string());
            data.refund_requests.push(request.clone());
            request
        };

        self.persist().await?;

        info!(
            "Recorded refund request {} for {} ({})",
            request.id, account_id, amount
        );

        Ok(request)
    }

    /// Resolve a pending refund request. Approval only updates the request
    /// status; the actual balance adjustment is a separate
    /// `credit(kind = refund)` decided by the payments layer.
    pub async fn resolve_refund_request(
        &self,
        request_id: &str,
        approved: bool,
    ) -> Result<RefundRequest, LedgerError> {
        let request = {
            let mut data = self.data.write().await;

            let request = data
                .refund_requests
                .iter_mut()
                .find(|r| r.id == request_id)
                .ok_or_else(|| LedgerError::RefundRequestNotFound(request_id.to_string()))?;

            request.status = if approved {
                RefundStatus::Approved
            } else {
                RefundStatus::Denied
            };
            request.resolved_at = Some(Utc::now());
            request.clone()
        };

        self.persist().await?;

        Ok(request)
    }

    /// Refund requests for an account, newest first.
    pub async fn refund_requests(
        &self,
        account_id: &str,
    ) -> Result<Vec<RefundRequest>, LedgerError> {
        let data = self.data.read().await;
        if !data.accounts.contains_key(account_id) {
            return Err(LedgerError::AccountNotFound(account_id.to_string()));
        }
        Ok(data
            .refund_requests
            .iter()
            .rev()
            .filter(|r| r.account_id == account_id)
            .cloned()
            .collect())
    }

    /// Bump the request counter for the given period key (`YYYY-MM`).
    pub async fn record_period_usage(
        &self,
        account_id: &str,
        period: &str,
    ) -> Result<(), LedgerError> {
        {
            let mut data = self.data.write().await;

            if !data.accounts.contains_key(account_id) {
                return Err(LedgerError::AccountNotFound(account_id.to_string()));
            }

            let periods = data.usage_periods.entry(account_id.to_string()).or_default();
            match periods.last_mut() {
                Some(current) if current.period == period => current.requests += 1,
                _ => periods.push(UsagePeriod {
                    period: period.to_string(),
                    requests: 1,
                }),
            }
        }

        self.persist().await?;

        Ok(())
    }

    /// Number of accounts on the ledger.
    pub async fn account_count(&self) -> usize {
        self.data.read().await.accounts.len()
    }

    /// Up to `n` most recent usage periods, newest first.
    pub async fn recent_usage_periods(
        &self,
        account_id: &str,
        n: usize,
    ) -> Result<Vec<UsagePeriod>, LedgerError> {
        let data = self.data.read().await;
        if !data.accounts.contains_key(account_id) {
            return Err(LedgerError::AccountNotFound(account_id.to_string()));
        }
        Ok(data
            .usage_periods
            .get(account_id)
            .map(|periods| periods.iter().rev().take(n).cloned().collect())
            .unwrap_or_default())
    }
}

/// Atomic snapshot write: tmp file then rename.
async fn write_snapshot(path: &PathBuf, bytes: &[u8]) -> Result<(), LedgerError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, bytes).await?;
    fs::rename(&temp_path, path).await?;

    Ok(())
}
