//! Gate configuration.

use credit_ledger::PlanTier;
use risk_engine::RiskConfig;
use serde::Deserialize;
use std::time::Duration;

/// Admin allow-list. Injected configuration rather than a code constant so
/// it can be tested and rotated without recompilation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub emails: Vec<String>,

    #[serde(default)]
    pub account_ids: Vec<String>,
}

/// Per-tier request limits for one observation period (a calendar month).
/// `None` means unlimited.
#[derive(Debug, Clone, Deserialize)]
pub struct PeriodLimitsConfig {
    #[serde(default = "default_free_limit")]
    pub free: Option<u32>,

    #[serde(default = "default_starter_limit")]
    pub starter: Option<u32>,

    #[serde(default = "default_premium_limit")]
    pub premium: Option<u32>,

    #[serde(default)]
    pub unlimited: Option<u32>,
}

fn default_free_limit() -> Option<u32> {
    Some(10)
}

fn default_starter_limit() -> Option<u32> {
    Some(100)
}

fn default_premium_limit() -> Option<u32> {
    Some(500)
}

impl Default for PeriodLimitsConfig {
    fn default() -> Self {
        Self {
            free: default_free_limit(),
            starter: default_starter_limit(),
            premium: default_premium_limit(),
            unlimited: None,
        }
    }
}

impl PeriodLimitsConfig {
    pub fn limit_for(&self, tier: PlanTier) -> Option<u32> {
        match tier {
            PlanTier::Free => self.free,
            PlanTier::Starter => self.starter,
            PlanTier::Premium => self.premium,
            PlanTier::Unlimited => self.unlimited,
        }
    }
}

/// Access gate configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub risk: RiskConfig,

    /// How long a risk-triggered ban lasts.
    #[serde(default = "default_ban_duration", with = "humantime_serde")]
    pub ban_duration: Duration,

    #[serde(default)]
    pub period_limits: PeriodLimitsConfig,
}

fn default_ban_duration() -> Duration {
    Duration::from_secs(30 * 24 * 60 * 60) // 30 days
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            admin: AdminConfig::default(),
            risk: RiskConfig::default(),
            ban_duration: default_ban_duration(),
            period_limits: PeriodLimitsConfig::default(),
        }
    }
}
