//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable overrides for deployment-specific values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::book::ReconcilePolicy;
use crate::error::ConfigError;
use crate::{Money, Symbol};

/// Upper bound on `ceil(max_position_size / lot_size)`
pub const MAX_LADDER_ENTRIES: usize = 10_000;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bot: BotConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
}

impl Config {
    /// Load configuration from JSON file
    ///
    /// `GRID_SYMBOL` and `GRID_TICK_INTERVAL_SECS` override the file when set.
    /// The bot section is validated before returning.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        if let Ok(symbol) = std::env::var("GRID_SYMBOL") {
            config.bot.symbol = Symbol::new(symbol);
        }
        if let Ok(interval) = std::env::var("GRID_TICK_INTERVAL_SECS") {
            config.runner.tick_interval_secs = interval
                .parse()
                .context("GRID_TICK_INTERVAL_SECS must be a whole number of seconds")?;
        }

        config.bot.validate()?;
        Ok(config)
    }
}

/// Grid parameters, fixed for the lifetime of a controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    /// Instrument identifier passed to every gateway call
    pub symbol: Symbol,
    /// Anchor for direction detection. Never re-anchored.
    pub reference_price: Money,
    /// Grid spacing and stop distance
    pub delta: Money,
    /// Profit-lock offset applied when a stop is tightened
    pub mini_delta: Money,
    /// Nominal per-entry unit; only determines how many entries a ladder has
    pub lot_size: Money,
    /// Hard cap on accumulated position size
    pub max_position_size: Money,
}

impl BotConfig {
    /// Build and validate a config
    pub fn new(
        symbol: impl AsRef<str>,
        reference_price: Money,
        delta: Money,
        mini_delta: Money,
        lot_size: Money,
        max_position_size: Money,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            symbol: Symbol::new(symbol),
            reference_price,
            delta,
            mini_delta,
            lot_size,
            max_position_size,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.as_str().trim().is_empty() {
            return Err(ConfigError::invalid("symbol", "must not be empty"));
        }
        if !self.reference_price.is_positive() {
            return Err(ConfigError::invalid(
                "reference_price",
                format!("must be positive, got {}", self.reference_price),
            ));
        }
        if !self.delta.is_positive() {
            return Err(ConfigError::invalid(
                "delta",
                format!("must be positive, got {}", self.delta),
            ));
        }
        if !self.mini_delta.is_positive() {
            return Err(ConfigError::invalid(
                "mini_delta",
                format!("must be positive, got {}", self.mini_delta),
            ));
        }
        if self.mini_delta >= self.delta {
            return Err(ConfigError::invalid(
                "mini_delta",
                format!(
                    "must be less than delta ({}), got {}",
                    self.delta, self.mini_delta
                ),
            ));
        }
        if !self.lot_size.is_positive() {
            return Err(ConfigError::invalid(
                "lot_size",
                format!("must be positive, got {}", self.lot_size),
            ));
        }
        if !self.max_position_size.is_positive() {
            return Err(ConfigError::invalid(
                "max_position_size",
                format!("must be positive, got {}", self.max_position_size),
            ));
        }
        let entries = (self.max_position_size / self.lot_size).ceil();
        if entries > Money::from_usize(MAX_LADDER_ENTRIES) {
            return Err(ConfigError::invalid(
                "lot_size",
                format!(
                    "too small: a full ladder would need {} entries (limit {})",
                    entries, MAX_LADDER_ENTRIES
                ),
            ));
        }
        Ok(())
    }
}

/// Tick loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Stop the loop after this many consecutive skipped ticks. `None` retries forever.
    #[serde(default)]
    pub max_consecutive_failures: Option<u32>,
    #[serde(default)]
    pub reconcile_policy: ReconcilePolicy,
}

fn default_tick_interval_secs() -> u64 {
    5
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            tick_interval_secs: default_tick_interval_secs(),
            max_consecutive_failures: None,
            reconcile_policy: ReconcilePolicy::default(),
        }
    }
}

impl RunnerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sol_config() -> BotConfig {
        BotConfig {
            symbol: Symbol::new("SOLUSDT"),
            reference_price: Money::new(dec!(147)),
            delta: Money::new(dec!(3)),
            mini_delta: Money::new(dec!(1)),
            lot_size: Money::new(dec!(0.1)),
            max_position_size: Money::new(dec!(1)),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(sol_config().validate().is_ok());
    }

    #[test]
    fn test_mini_delta_must_be_below_delta() {
        let mut config = sol_config();
        config.mini_delta = Money::new(dec!(3));
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidConfiguration { field: "mini_delta", .. }
        ));
    }

    #[test]
    fn test_non_positive_delta_rejected() {
        let mut config = sol_config();
        config.delta = Money::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_positive_lot_rejected() {
        let mut config = sol_config();
        config.lot_size = Money::new(dec!(-0.1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_ladder_rejected() {
        let mut config = sol_config();
        config.lot_size = Money::new(dec!(0.00001));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("lot_size"));
    }

    #[test]
    fn test_parse_json_with_runner_defaults() {
        let json = r#"{
            "bot": {
                "symbol": "SOL/USDT:USDT",
                "reference_price": 147,
                "delta": 3,
                "mini_delta": 1,
                "lot_size": 0.1,
                "max_position_size": 1
            }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.bot, BotConfig { symbol: Symbol::new("SOL/USDT:USDT"), ..sol_config() });
        assert_eq!(config.runner, RunnerConfig::default());
        assert_eq!(config.runner.tick_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_runner_section() {
        let json = r#"{
            "bot": {
                "symbol": "SOLUSDT",
                "reference_price": "147",
                "delta": "3",
                "mini_delta": "1",
                "lot_size": "0.1",
                "max_position_size": "1"
            },
            "runner": {
                "tick_interval_secs": 1,
                "max_consecutive_failures": 10,
                "reconcile_policy": "drop_on_flat"
            }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.runner.tick_interval_secs, 1);
        assert_eq!(config.runner.max_consecutive_failures, Some(10));
        assert_eq!(config.runner.reconcile_policy, ReconcilePolicy::DropOnFlat);
    }
}
