//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching
//! config.toml structure. Every section defaults so a missing file or
//! section yields a usable paper-mode configuration.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub filters: FiltersSection,
    #[serde(default)]
    pub pricing: PricingSection,
    #[serde(default)]
    pub endpoints: EndpointsSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Mempool monitor section
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    /// Reload interval for the protected-target watch list, seconds
    pub registry_refresh_seconds: u64,
    /// Attempts to fetch a parsed transaction before giving up
    pub max_fetch_attempts: u32,
    /// Base delay between fetch attempts, milliseconds
    pub fetch_retry_delay_ms: u64,
    /// Concurrent transaction fetches off the detection loop
    pub max_concurrent_fetches: usize,
    /// Bound on the seen-signature dedup set
    pub seen_signature_capacity: usize,
    /// Detection latency samples kept for the rolling percentiles
    pub latency_window: usize,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            registry_refresh_seconds: 30,
            max_fetch_attempts: 3,
            fetch_retry_delay_ms: 50,
            max_concurrent_fetches: 8,
            seen_signature_capacity: 10_000,
            latency_window: 500,
        }
    }
}

/// Frontrunner execution section
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionSection {
    /// Base priority fee, micro-lamports per compute unit
    pub base_priority_fee_micro_lamports: u64,
    /// Hard cap on the computed priority fee
    pub max_priority_fee_micro_lamports: u64,
    /// Send attempts per threat before reporting failure
    pub max_send_attempts: u32,
    /// Delay between send attempts, milliseconds
    pub retry_delay_ms: u64,
    /// Interval between sweeps that re-drive queued threats, milliseconds
    pub queue_drain_interval_ms: u64,
    /// Outcomes considered by the circuit breaker
    pub breaker_window: usize,
    /// Failures in the window beyond which the breaker trips
    pub breaker_failure_tolerance: usize,
    /// Breaker cooldown before a half-open probe, milliseconds
    pub breaker_cooldown_ms: u64,
    /// Concurrent protective executions
    pub max_concurrent_executions: usize,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            base_priority_fee_micro_lamports: 10_000,
            max_priority_fee_micro_lamports: 1_000_000,
            max_send_attempts: 3,
            retry_delay_ms: 100,
            queue_drain_interval_ms: 250,
            breaker_window: 10,
            breaker_failure_tolerance: 5,
            breaker_cooldown_ms: 30_000,
            max_concurrent_executions: 4,
        }
    }
}

/// Probabilistic watch filter section
#[derive(Debug, Clone, Deserialize)]
pub struct FiltersSection {
    /// Expected items per bloom filter
    pub expected_items: usize,
    /// Target false-positive rate
    pub fp_rate: f64,
}

impl Default for FiltersSection {
    fn default() -> Self {
        Self {
            expected_items: 10_000,
            fp_rate: 0.01,
        }
    }
}

/// Pricing constants for liquidity estimation and sell-size thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct PricingSection {
    /// SOL/USD constant used where no oracle is wired
    pub sol_price_usd: f64,
    /// Swap outflow in lamports above which a sell is "large"
    pub large_sell_lamports: u64,
}

impl Default for PricingSection {
    fn default() -> Self {
        Self {
            sol_price_usd: 150.0,
            large_sell_lamports: 10_000_000_000,
        }
    }
}

/// RPC and websocket endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointsSection {
    pub rpc_url: String,
    pub ws_url: String,
    /// Commitment level: "processed", "confirmed", "finalized"
    pub commitment: String,
}

impl Default for EndpointsSection {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            ws_url: "wss://api.mainnet-beta.solana.com".to_string(),
            commitment: "processed".to_string(),
        }
    }
}

impl EndpointsSection {
    /// Websocket URL with environment variable override
    pub fn get_ws_url(&self) -> String {
        std::env::var("SENTINEL_WS_URL").unwrap_or_else(|_| self.ws_url.clone())
    }

    /// RPC URL with environment variable override
    pub fn get_rpc_url(&self) -> String {
        std::env::var("SENTINEL_RPC_URL").unwrap_or_else(|_| self.rpc_url.clone())
    }
}

/// File-backed store section
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    /// Protected-target JSON file
    pub targets_path: String,
    /// Alert history JSON-lines file
    pub alerts_path: String,
    /// Pre-signed transaction cache directory
    pub tx_cache_dir: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            targets_path: "data/targets.json".to_string(),
            alerts_path: "data/alerts.jsonl".to_string(),
            tx_cache_dir: "data/tx_cache".to_string(),
        }
    }
}

/// Logging section
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.filters.fp_rate <= 0.0 || self.filters.fp_rate >= 1.0 {
            return Err(ConfigError::ValidationError(format!(
                "fp_rate must be in (0, 1), got {}",
                self.filters.fp_rate
            )));
        }

        if self.filters.expected_items == 0 {
            return Err(ConfigError::ValidationError(
                "expected_items must be > 0".to_string(),
            ));
        }

        if self.execution.max_send_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "max_send_attempts must be > 0".to_string(),
            ));
        }

        if self.execution.base_priority_fee_micro_lamports
            > self.execution.max_priority_fee_micro_lamports
        {
            return Err(ConfigError::ValidationError(format!(
                "base_priority_fee ({}) exceeds max_priority_fee ({})",
                self.execution.base_priority_fee_micro_lamports,
                self.execution.max_priority_fee_micro_lamports
            )));
        }

        if self.execution.breaker_window == 0 {
            return Err(ConfigError::ValidationError(
                "breaker_window must be > 0".to_string(),
            ));
        }

        if self.execution.breaker_failure_tolerance >= self.execution.breaker_window {
            return Err(ConfigError::ValidationError(format!(
                "breaker_failure_tolerance ({}) must be below breaker_window ({})",
                self.execution.breaker_failure_tolerance, self.execution.breaker_window
            )));
        }

        if self.execution.max_concurrent_executions == 0 {
            return Err(ConfigError::ValidationError(
                "max_concurrent_executions must be > 0".to_string(),
            ));
        }

        if self.pricing.sol_price_usd <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "sol_price_usd must be > 0, got {}",
                self.pricing.sol_price_usd
            )));
        }

        if self.monitor.max_fetch_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "max_fetch_attempts must be > 0".to_string(),
            ));
        }

        if self.monitor.max_concurrent_fetches == 0 {
            return Err(ConfigError::ValidationError(
                "max_concurrent_fetches must be > 0".to_string(),
            ));
        }

        if self.endpoints.ws_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "ws_url cannot be empty".to_string(),
            ));
        }

        if self.endpoints.rpc_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "rpc_url cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
