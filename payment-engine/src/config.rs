//! Configuration for the payment engine

use security::RateLimiterConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Payment engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Reconciliation sweep configuration
    pub reconciliation: ReconciliationConfig,

    /// Admission control limits
    pub rate_limiter: RateLimiterConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "payment-engine".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            reconciliation: ReconciliationConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Reconciliation sweep configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Run the background sweep
    pub enabled: bool,

    /// Seconds between sweeps (default: 30)
    pub interval_secs: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
        }
    }
}

impl ReconciliationConfig {
    /// Sweep period
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply `PAYMENTS_*` environment overrides on top of `self`
    pub fn with_env_overrides(mut self) -> crate::Result<Self> {
        if let Ok(name) = std::env::var("PAYMENTS_SERVICE_NAME") {
            self.service_name = name;
        }

        if let Ok(secs) = std::env::var("PAYMENTS_SWEEP_INTERVAL_SECS") {
            self.reconciliation.interval_secs = secs.parse().map_err(|_| {
                crate::Error::Config(format!("PAYMENTS_SWEEP_INTERVAL_SECS: not a number: {}", secs))
            })?;
        }

        if let Ok(enabled) = std::env::var("PAYMENTS_SWEEP_ENABLED") {
            self.reconciliation.enabled = parse_bool("PAYMENTS_SWEEP_ENABLED", &enabled)?;
        }

        if let Ok(filter) = std::env::var("PAYMENTS_LOG_FILTER") {
            self.logging.filter = filter;
        }

        if let Ok(json) = std::env::var("PAYMENTS_LOG_JSON") {
            self.logging.json = parse_bool("PAYMENTS_LOG_JSON", &json)?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.reconciliation.interval_secs == 0 {
            return Err(crate::Error::Config(
                "reconciliation.interval_secs must be positive".to_string(),
            ));
        }
        self.rate_limiter
            .validate()
            .map_err(|e| crate::Error::Config(e.to_string()))
    }
}

fn parse_bool(var: &str, value: &str) -> crate::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(crate::Error::Config(format!("{}: not a boolean: {}", var, other))),
    }
}
