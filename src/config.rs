//! Bot configuration loaded from a JSON file and environment variables.
//!
//! - `CROSSOVER_CONFIG`: path to a JSON config file (defaults when unset)
//! - `CROSSOVER_LOG`: overrides the configured `log_level`
//!
//! Every field has a default, so `{}` is a valid configuration file.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::CrossoverError;
use crate::exchange::SimulationConfig;
use crate::risk::RiskParameters;
use crate::strategy::StrategyParams;

/// Environment variable holding the config file path.
pub const CONFIG_PATH_VAR: &str = "CROSSOVER_CONFIG";

/// Environment variable overriding the log level.
pub const LOG_LEVEL_VAR: &str = "CROSSOVER_LOG";

/// Largest `candle_limit` accepted, matching common exchange kline limits.
pub const MAX_CANDLE_LIMIT: usize = 1000;

/// Candle period used for market data and the default cycle interval.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[default]
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl Timeframe {
    /// Length of one candle in seconds.
    #[must_use]
    pub fn as_secs(&self) -> u64 {
        match self {
            Timeframe::OneMinute => 60,
            Timeframe::FiveMinutes => 300,
            Timeframe::FifteenMinutes => 900,
            Timeframe::OneHour => 3_600,
            Timeframe::FourHours => 14_400,
            Timeframe::OneDay => 86_400,
        }
    }

    /// Exchange-style label (`"15m"`, `"1h"`, ...).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::OneMinute => "1m",
            Timeframe::FiveMinutes => "5m",
            Timeframe::FifteenMinutes => "15m",
            Timeframe::OneHour => "1h",
            Timeframe::FourHours => "4h",
            Timeframe::OneDay => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level bot configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Trading pairs in `BASE/QUOTE` form.
    pub pairs: Vec<String>,
    /// Currency whose free balance funds new positions.
    pub quote_currency: String,
    pub timeframe: Timeframe,
    /// Overrides the timeframe period as the cycle interval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
    /// Candles requested per pair per cycle.
    pub candle_limit: usize,
    /// Trade against the simulated exchange.
    pub dry_run: bool,
    /// Upper bound on pairs processed concurrently.
    pub max_workers: usize,
    /// Timeout applied to each exchange call.
    pub request_timeout_secs: u64,
    pub notifications_enabled: bool,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,
    pub risk: RiskParameters,
    pub strategy: StrategyParams,
    pub simulation: SimulationConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            pairs: vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()],
            quote_currency: "USDT".to_string(),
            timeframe: Timeframe::default(),
            interval_secs: None,
            candle_limit: 100,
            dry_run: true,
            max_workers: 8,
            request_timeout_secs: 30,
            notifications_enabled: true,
            log_level: "info".to_string(),
            risk: RiskParameters::default(),
            strategy: StrategyParams::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl BotConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid JSON.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CrossoverError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Checks the configuration before any trading starts.
    ///
    /// # Errors
    ///
    /// Returns [`CrossoverError::Config`] describing the first problem found.
    pub fn validate(&self) -> crate::Result<()> {
        if self.pairs.is_empty() {
            return Err(config_err("at least one trading pair is required"));
        }
        let mut seen = HashSet::new();
        for pair in &self.pairs {
            if pair.trim().is_empty() {
                return Err(config_err("trading pair names must not be empty"));
            }
            if !seen.insert(pair.as_str()) {
                return Err(config_err(format!("duplicate trading pair {pair}")));
            }
        }

        self.risk
            .validate()
            .map_err(|e| config_err(format!("invalid risk parameters: {e}")))?;

        let s = &self.strategy;
        if s.ema_fast == 0 || s.ema_slow == 0 || s.rsi_period == 0 {
            return Err(config_err("indicator windows must be positive"));
        }
        if s.ema_fast >= s.ema_slow {
            return Err(config_err(format!(
                "ema_fast ({}) must be shorter than ema_slow ({})",
                s.ema_fast, s.ema_slow
            )));
        }
        let hundred = Decimal::ONE_HUNDRED;
        for (name, value) in [
            ("rsi_oversold", s.rsi_oversold),
            ("rsi_overbought", s.rsi_overbought),
        ] {
            if value < Decimal::ZERO || value > hundred {
                return Err(config_err(format!(
                    "{name} must be within [0, 100], got {value}"
                )));
            }
        }
        if s.rsi_oversold >= s.rsi_overbought {
            return Err(config_err(format!(
                "rsi_oversold ({}) must be below rsi_overbought ({})",
                s.rsi_oversold, s.rsi_overbought
            )));
        }

        let required = s.required_candles();
        if self.candle_limit < required {
            return Err(config_err(format!(
                "candle_limit ({}) is below the {required} candles the indicators need",
                self.candle_limit
            )));
        }
        if self.candle_limit > MAX_CANDLE_LIMIT {
            return Err(config_err(format!(
                "candle_limit ({}) exceeds the maximum of {MAX_CANDLE_LIMIT}",
                self.candle_limit
            )));
        }
        if self.max_workers == 0 {
            return Err(config_err("max_workers must be at least 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(config_err("request_timeout_secs must be at least 1"));
        }
        if self.interval_secs == Some(0) {
            return Err(config_err("interval_secs must be at least 1"));
        }
        if !self.dry_run {
            return Err(config_err(
                "live trading is not supported; set dry_run to true",
            ));
        }
        Ok(())
    }

    /// Pause between cycles.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.unwrap_or_else(|| self.timeframe.as_secs()))
    }

    /// Timeout applied to each exchange request.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Number of pairs processed concurrently.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.max_workers.min(self.pairs.len()).max(1)
    }
}

/// Loads the bot configuration using environment variables.
///
/// Reads the file named by `CROSSOVER_CONFIG` when set, otherwise starts
/// from defaults. `CROSSOVER_LOG` replaces the configured log level.
/// The result is not validated; call [`BotConfig::validate`].
///
/// # Errors
///
/// Returns an error if the named file cannot be read or parsed.
pub fn fetch_config() -> crate::Result<BotConfig> {
    let mut config = match non_empty_var(CONFIG_PATH_VAR) {
        Some(path) => BotConfig::load(Path::new(&path))?,
        None => BotConfig::default(),
    };

    if let Some(level) = non_empty_var(LOG_LEVEL_VAR) {
        config.log_level = level;
    }

    Ok(config)
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn config_err(msg: impl Into<String>) -> CrossoverError {
    CrossoverError::Config(msg.into())
}
