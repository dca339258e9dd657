//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files. The strategy
//! section is kept as raw JSON and parsed by the strategy registry, so each
//! strategy owns its parameter schema.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::Symbol;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub trading: TradingConfig,
    pub strategy: serde_json::Value,
    #[serde(default)]
    pub backtest: BacktestConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        Ok(config)
    }

    /// Get strategy name from the strategy section
    pub fn strategy_name(&self) -> Result<&str> {
        self.strategy
            .get("name")
            .and_then(|v| v.as_str())
            .context(
                "'name' is required in the 'strategy' section of config. \
                 Example: \"strategy\": { \"name\": \"adaptive_breakout\", ... }",
            )
    }
}

/// Trading configuration
///
/// All calculations are currency-agnostic: `initial_capital` must simply be
/// denominated in the same currency as the price data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Tracked instrument (single-instrument strategy)
    pub symbol: String,
    /// Initial trading capital in the same currency as your price data
    pub initial_capital: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            symbol: "SPY".to_string(),
            initial_capital: 100_000.0,
        }
    }
}

impl TradingConfig {
    pub fn symbol(&self) -> Symbol {
        Symbol::new(&self.symbol)
    }
}

/// Backtest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub data_dir: String,
    pub results_dir: String,
    /// Per-leg commission as a fraction of traded value
    pub commission: f64,
    /// Entry slippage as a fraction of fill price
    #[serde(default)]
    pub assumed_slippage: f64,
    /// Inclusive start date (YYYY-MM-DD), None = from the first bar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    /// Inclusive end date (YYYY-MM-DD), None = to the last bar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            data_dir: "data".to_string(),
            results_dir: "results".to_string(),
            commission: 0.001,
            assumed_slippage: 0.0,
            start_date: None,
            end_date: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let json = r#"{
            "trading": { "symbol": "SPY", "initial_capital": 100000.0 },
            "strategy": { "name": "adaptive_breakout" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.strategy_name().unwrap(), "adaptive_breakout");
        assert_eq!(config.trading.symbol, "SPY");
        assert_eq!(config.backtest.data_dir, "data");
    }

    #[test]
    fn test_missing_strategy_name_is_error() {
        let json = r#"{ "strategy": {} }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.strategy_name().is_err());
    }
}
