//! Ledger configuration.

use crate::types::Credits;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Ledger configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Snapshot path for the persisted ledger state.
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,

    /// Credits granted to every new account at signup.
    #[serde(default = "default_signup_grant")]
    pub signup_grant: Credits,

    /// Retry attempts for storage I/O beyond the first try.
    #[serde(default = "default_persist_retries")]
    pub persist_retries: u32,

    /// Initial backoff between storage retries (doubles per attempt).
    #[serde(default = "default_persist_backoff", with = "humantime_serde")]
    pub persist_backoff: Duration,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("/data/ledger.json")
}

fn default_signup_grant() -> Credits {
    Credits::from_whole(100)
}

fn default_persist_retries() -> u32 {
    3
}

fn default_persist_backoff() -> Duration {
    Duration::from_millis(100)
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            signup_grant: default_signup_grant(),
            persist_retries: default_persist_retries(),
            persist_backoff: default_persist_backoff(),
        }
    }
}
