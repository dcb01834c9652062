//! Application configuration loaded from environment variables.

use access_gate::GateConfig;
use anyhow::{Context, Result};
use credit_ledger::LedgerConfig;
use serde::Deserialize;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Ledger configuration.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Access gate configuration (admin list, risk policy).
    #[serde(default)]
    pub gate: GateConfig,

    /// Upstream model provider configuration.
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Port for the gateway API.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level filter.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Provider API key.
    pub api_key: String,

    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Completion model.
    #[serde(default = "default_model")]
    pub model: String,

    /// Image generation model.
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Request timeout.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Retry attempts beyond the first try.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".into()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_image_model() -> String {
    "dall-e-3".into()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_retries() -> u32 {
    3
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    // Keep strings as strings; account ids and emails must
                    // not be parsed as numbers.
                    .try_parsing(false),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
