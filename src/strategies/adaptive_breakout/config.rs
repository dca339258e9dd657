//! Adaptive Breakout Configuration

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveBreakoutConfig {
    /// Starting lookback window in sessions (default: 20)
    #[serde(default = "default_initial_lookback")]
    pub initial_lookback: usize,

    /// Smallest allowed lookback window (default: 10)
    #[serde(default = "default_lookback_floor")]
    pub lookback_floor: usize,

    /// Largest allowed lookback window (default: 30)
    #[serde(default = "default_lookback_ceiling")]
    pub lookback_ceiling: usize,

    /// Sessions in each volatility window; the lookback update needs
    /// `volatility_window + 1` closes (default: 30)
    #[serde(default = "default_volatility_window")]
    pub volatility_window: usize,

    /// Initial protective stop as a fraction of the breakout level;
    /// 0.98 allows a 2% loss before triggering (default: 0.98)
    #[serde(default = "default_initial_stop_ratio")]
    pub initial_stop_ratio: f64,

    /// Trailing stop as a fraction of the latest close; 0.90 trails
    /// 10% behind new highs (default: 0.90)
    #[serde(default = "default_trailing_stop_ratio")]
    pub trailing_stop_ratio: f64,

    /// Fraction of portfolio value targeted at entry (default: 1.0)
    #[serde(default = "default_allocation")]
    pub allocation: f64,
}

fn default_initial_lookback() -> usize {
    20
}
fn default_lookback_floor() -> usize {
    10
}
fn default_lookback_ceiling() -> usize {
    30
}
fn default_volatility_window() -> usize {
    30
}
fn default_initial_stop_ratio() -> f64 {
    0.98
}
fn default_trailing_stop_ratio() -> f64 {
    0.90
}
fn default_allocation() -> f64 {
    1.0
}

impl Default for AdaptiveBreakoutConfig {
    fn default() -> Self {
        Self {
            initial_lookback: 20,
            lookback_floor: 10,
            lookback_ceiling: 30,
            volatility_window: 30,
            initial_stop_ratio: 0.98,
            trailing_stop_ratio: 0.90,
            allocation: 1.0,
        }
    }
}

impl AdaptiveBreakoutConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lookback_floor < 2 {
            anyhow::bail!("lookback_floor must be >= 2 (breakout needs prior highs)");
        }
        if self.lookback_floor > self.lookback_ceiling {
            anyhow::bail!(
                "lookback_floor ({}) must be <= lookback_ceiling ({})",
                self.lookback_floor,
                self.lookback_ceiling
            );
        }
        if self.initial_lookback < self.lookback_floor
            || self.initial_lookback > self.lookback_ceiling
        {
            anyhow::bail!(
                "initial_lookback ({}) must be within [{}, {}]",
                self.initial_lookback,
                self.lookback_floor,
                self.lookback_ceiling
            );
        }
        if self.volatility_window < 2 {
            anyhow::bail!("volatility_window must be >= 2");
        }
        if !(0.0..=1.0).contains(&self.initial_stop_ratio)
            || !(0.0..=1.0).contains(&self.trailing_stop_ratio)
        {
            anyhow::bail!("stop ratios must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.allocation) {
            anyhow::bail!("allocation must be in [0, 1]");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AdaptiveBreakoutConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.initial_lookback, 20);
        assert_eq!(config.lookback_floor, 10);
        assert_eq!(config.lookback_ceiling, 30);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AdaptiveBreakoutConfig =
            serde_json::from_str(r#"{ "initial_lookback": 15 }"#).unwrap();
        assert_eq!(config.initial_lookback, 15);
        assert_eq!(config.trailing_stop_ratio, 0.90);
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let config = AdaptiveBreakoutConfig {
            lookback_floor: 40,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
