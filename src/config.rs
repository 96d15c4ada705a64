// src/config.rs
//
// Configuration file parsing. All collaborator settings (API base URL,
// timeouts, cache paths) live here and are passed in at construction time;
// nothing reads globals at import time.

use crate::models::PricingMode;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.delta.exchange";
pub const DEFAULT_REFRESH_SECS: u64 = 30;
pub const DEFAULT_QUOTE_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// Configuration Types
// =============================================================================

/// Root configuration structure.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub chain: ChainConfig,
}

/// Global settings.
#[derive(Debug, Default, Deserialize)]
pub struct GlobalConfig {
    /// Dashboard port (None = no dashboard)
    pub dashboard_port: Option<u16>,
    /// Log level passed to env_logger when RUST_LOG is unset
    pub log_level: Option<String>,
    /// Chain refresh interval in seconds
    pub refresh_secs: Option<u64>,
}

/// Exchange collaborator settings.
#[derive(Debug, Default, Deserialize)]
pub struct ExchangeConfig {
    /// API base URL
    pub base_url: Option<String>,
    /// Per-quote request timeout in seconds
    pub quote_timeout_secs: Option<u64>,
    /// Catalog cache file path
    pub catalog_cache_path: Option<String>,
    /// Catalog staleness threshold in seconds
    pub catalog_stale_secs: Option<u64>,
}

/// Chain builder settings.
#[derive(Debug, Default, Deserialize)]
pub struct ChainConfig {
    /// Underlyings to build chains for (e.g., ["BTC", "ETH"])
    pub underlyings: Option<Vec<String>>,
    /// "mid" or "mark"
    pub pricing_mode: Option<PricingMode>,
}

// =============================================================================
// Configuration Loading
// =============================================================================

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(s: &str) -> Result<Self, String> {
        toml::from_str(s).map_err(|e| format!("Failed to parse config: {}", e))
    }

    pub fn base_url(&self) -> &str {
        self.exchange.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn quote_timeout(&self) -> Duration {
        Duration::from_secs(
            self.exchange
                .quote_timeout_secs
                .unwrap_or(DEFAULT_QUOTE_TIMEOUT_SECS),
        )
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.global.refresh_secs.unwrap_or(DEFAULT_REFRESH_SECS))
    }

    pub fn underlyings(&self) -> Vec<String> {
        self.chain
            .underlyings
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| vec!["BTC".to_string()])
    }

    pub fn pricing_mode(&self) -> PricingMode {
        self.chain.pricing_mode.unwrap_or(PricingMode::Mid)
    }
}

// =============================================================================
// Default Configuration
// =============================================================================

/// Returns a default configuration string for documentation.
pub fn default_config_template() -> &'static str {
    r#"# chainboard configuration
#
# Fetches the option catalog and per-symbol quotes from Delta Exchange and
# serves the nearest-expiry options chain as a web dashboard.

[global]
# Web dashboard port (optional; snapshot mode needs none)
dashboard_port = 8080

# Chain refresh interval in seconds
refresh_secs = 30

# Log level when RUST_LOG is unset: error, warn, info, debug, trace
log_level = "info"

[exchange]
base_url = "https://api.delta.exchange"

# Per-quote request timeout; a timed-out quote renders as missing data
quote_timeout_secs = 5

# Product catalog cache
catalog_cache_path = "delta_products.jsonl"
catalog_stale_secs = 3600

[chain]
# Chains to build, one per underlying
underlyings = ["BTC", "ETH"]

# "mid" = (best_bid + best_ask) / 2, "mark" = exchange mark price
pricing_mode = "mid"
"#
}

// =============================================================================
// Tests
// =============================================================================
