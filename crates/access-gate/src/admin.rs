//! Admin override registry.
//!
//! A fixed allow-list loaded from configuration. Admin accounts bypass
//! risk scoring entirely and are never charged; their balance reports a
//! display-only sentinel.

use crate::config::AdminConfig;
use credit_ledger::Credits;
use std::collections::HashSet;

/// Display-only balance sentinel for admin accounts. Never used for
/// arithmetic.
pub const UNLIMITED_BALANCE: Credits = Credits::from_whole(999_999);

/// Membership test for the configured admin allow-list.
#[derive(Debug, Clone)]
pub struct AdminRegistry {
    emails: HashSet<String>,
    account_ids: HashSet<String>,
}

impl AdminRegistry {
    pub fn new(config: &AdminConfig) -> Self {
        Self {
            emails: config
                .emails
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
            account_ids: config.account_ids.iter().cloned().collect(),
        }
    }

    /// Check whether an account id or email is on the admin list.
    pub fn is_admin(&self, account_id: &str, email: Option<&str>) -> bool {
        if self.account_ids.contains(account_id) {
            return true;
        }
        email.is_some_and(|e| self.emails.contains(&e.to_lowercase()))
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty() && self.account_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AdminRegistry {
        AdminRegistry::new(&AdminConfig {
            emails: vec!["Admin@JumpStudy.ai".into()],
            account_ids: vec!["acct-owner".into()],
        })
    }

    #[test]
    fn matches_by_id() {
        assert!(registry().is_admin("acct-owner", None));
        assert!(!registry().is_admin("acct-other", None));
    }

    #[test]
    fn matches_email_case_insensitively() {
        let registry = registry();
        assert!(registry.is_admin("acct-1", Some("admin@jumpstudy.ai")));
        assert!(registry.is_admin("acct-1", Some("ADMIN@jumpstudy.AI")));
        assert!(!registry.is_admin("acct-1", Some("student@jumpstudy.ai")));
    }

    #[test]
    fn empty_registry_matches_nobody() {
        let registry = AdminRegistry::new(&AdminConfig::default());
        assert!(registry.is_empty());
        assert!(!registry.is_admin("acct-owner", Some("admin@jumpstudy.ai")));
    }
}
