//! Adaptive Breakout Strategy
//!
//! Long entry on breakout of an adaptive N-day high, protected by a
//! volatility-trailing stop order.

mod config;
mod strategy;

pub use config::AdaptiveBreakoutConfig;
pub use strategy::AdaptiveBreakoutStrategy;

use crate::{Config, Strategy};
use anyhow::Result;

/// Create strategy from config (called by registry)
pub fn create(config: &Config) -> Result<Box<dyn Strategy>> {
    let strategy_config: AdaptiveBreakoutConfig = serde_json::from_value(config.strategy.clone())
        .map_err(|e| anyhow::anyhow!("Failed to parse adaptive_breakout config: {}", e))?;
    strategy_config.validate()?;
    Ok(Box::new(AdaptiveBreakoutStrategy::new(
        config.trading.symbol(),
        strategy_config,
    )))
}
