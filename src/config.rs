//! Gateway configuration
//!
//! Loaded from a TOML file with `TRADEGATE_*` environment overrides.
//! Every section has serde defaults so a minimal config still boots.

use crate::error::{GatewayError, Result};
use crate::types::{Credentials, Venue};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub venues: VenuesConfig,
}

impl Config {
    /// Load configuration from a TOML file plus environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let path = shellexpand::tilde(path).to_string();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix("TRADEGATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| GatewayError::Config(e.to_string()))
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// HTTP API server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_backoff_base_ms() -> u64 {
    250
}

fn default_backoff_cap_ms() -> u64 {
    5_000
}

fn default_ledger_window_secs() -> i64 {
    15 * 60
}

fn default_pending_poll_secs() -> u64 {
    20
}

fn default_poll_interval_ms() -> u64 {
    500
}

/// Trade router tuning: retry budget, timeouts, idempotency window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Total adapter call attempts for a transient failure (first + retries)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Timeout applied to each individual adapter call
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// How long executed outcomes stay replayable in the idempotency ledger
    #[serde(default = "default_ledger_window_secs")]
    pub ledger_window_secs: i64,
    /// How long the caller's wait polls a pending result before Timeout
    #[serde(default = "default_pending_poll_secs")]
    pub pending_poll_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            call_timeout_secs: default_call_timeout_secs(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            ledger_window_secs: default_ledger_window_secs(),
            pending_poll_secs: default_pending_poll_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// AI provider endpoints and keys, one section per provider family.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: Option<ProviderEndpoint>,
    #[serde(default)]
    pub anthropic: Option<ProviderEndpoint>,
}

fn default_provider_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

/// Stored venue credential sections; venues present here are registered
/// automatically at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VenuesConfig {
    #[serde(default)]
    pub dex: Option<Credentials>,
    #[serde(default, rename = "prediction-market")]
    pub prediction_market: Option<Credentials>,
    #[serde(default, rename = "event-contract")]
    pub event_contract: Option<Credentials>,
}

impl VenuesConfig {
    pub fn get(&self, venue: Venue) -> Option<&Credentials> {
        match venue {
            Venue::Dex => self.dex.as_ref(),
            Venue::PredictionMarket => self.prediction_market.as_ref(),
            Venue::EventContract => self.event_contract.as_ref(),
        }
    }

    /// Venues with stored credentials, in registration order.
    pub fn configured(&self) -> Vec<Venue> {
        Venue::all()
            .into_iter()
            .filter(|v| self.get(*v).is_some())
            .collect()
    }
}
