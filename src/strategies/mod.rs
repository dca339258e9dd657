//! Trading Strategies Module
//!
//! Contains the available strategies and the common session-driven
//! abstraction they implement.

pub mod adaptive_breakout;

use crate::platform::{Platform, PlatformError};
use crate::Config;
use anyhow::Result;

/// Session-driven trading strategy.
///
/// A strategy is invoked once per trading session and performs its work
/// through the injected [`Platform`]: reading history and position state,
/// entering positions, and maintaining protective orders. A failed session
/// is non-fatal; the caller logs it and invokes the strategy again next
/// session with state carried forward.
pub trait Strategy: Send {
    /// Short identifier used in logs and the registry
    fn name(&self) -> &'static str;

    /// Run one session of the decision procedure
    fn on_session(&mut self, platform: &mut dyn Platform) -> Result<(), PlatformError>;

    /// Reset per-run state before a fresh backtest
    fn init(&mut self) {}
}

/// Create a strategy from config (name-based registry)
pub fn create_strategy(config: &Config) -> Result<Box<dyn Strategy>> {
    match config.strategy_name()? {
        "adaptive_breakout" => adaptive_breakout::create(config),
        other => anyhow::bail!(
            "Unknown strategy: {}. Available strategies: adaptive_breakout",
            other
        ),
    }
}
