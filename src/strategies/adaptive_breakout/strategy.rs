//! Adaptive Breakout Strategy - volatility-adaptive lookback with trailing stop
//!
//! Entry: close breaks above the highest high of the last N sessions, where N
//! adapts to the day-over-day change in 30-session volatility.
//! Exit: a single protective stop order, placed at 98% of the breakout level
//! and raised to 90% of the close on new highs while the guard condition holds.
//!
//! The guard compares against the ORIGINAL stop floor rather than the current
//! trigger, so a new high whose trailing level does not clear that floor
//! leaves the trigger where it is. This ratchet-then-plateau behavior is
//! intentional and pinned by a regression test; do not "fix" it here.

use tracing::{debug, info, warn};

use crate::indicators;
use crate::platform::{OrderId, Platform, PlatformError};
use crate::strategies::Strategy;
use crate::Symbol;

use super::config::AdaptiveBreakoutConfig;

/// The active protective stop order: handle plus the trigger it currently
/// rests at. Present if and only if a position is open.
#[derive(Debug, Clone, Copy)]
struct ProtectiveStop {
    order_id: OrderId,
    trigger: f64,
}

pub struct AdaptiveBreakoutStrategy {
    symbol: Symbol,
    config: AdaptiveBreakoutConfig,
    /// Adaptive window length, clamped to [floor, ceiling] after every update
    lookback_days: usize,
    /// Rolling high that triggered the last entry
    breakout_level: Option<f64>,
    /// Highest close observed since entry; reset only by a fresh entry
    highest_price: Option<f64>,
    active_stop: Option<ProtectiveStop>,
}

impl AdaptiveBreakoutStrategy {
    pub fn new(symbol: Symbol, config: AdaptiveBreakoutConfig) -> Self {
        let lookback_days = config.initial_lookback;
        Self {
            symbol,
            config,
            lookback_days,
            breakout_level: None,
            highest_price: None,
            active_stop: None,
        }
    }

    /// Current lookback window in sessions
    pub fn lookback_days(&self) -> usize {
        self.lookback_days
    }

    /// Rolling high recorded at the last entry
    pub fn breakout_level(&self) -> Option<f64> {
        self.breakout_level
    }

    /// Highest close since entry
    pub fn highest_price(&self) -> Option<f64> {
        self.highest_price
    }

    /// Trigger price of the active protective stop, if one exists
    pub fn active_stop_trigger(&self) -> Option<f64> {
        self.active_stop.map(|s| s.trigger)
    }

    /// Recompute the lookback window from the volatility delta of two
    /// overlapping windows of closes (needs `volatility_window + 1` values,
    /// oldest to newest).
    fn update_lookback(&mut self, closes: &[f64]) {
        let window = self.config.volatility_window;
        let len = closes.len();
        debug_assert!(len >= window + 1);

        let today_vol = indicators::population_std_dev(&closes[len - window..]);
        let yesterday_vol =
            indicators::population_std_dev(&closes[len - window - 1..len - 1]);

        // A dead-flat window gives today_vol == 0; treat that as "no change"
        // instead of dividing by zero.
        let delta_vol = if today_vol == 0.0 {
            0.0
        } else {
            (today_vol - yesterday_vol) / today_vol
        };

        let scaled = (self.lookback_days as f64 * (1.0 + delta_vol)).round();
        self.lookback_days = (scaled as i64).clamp(
            self.config.lookback_floor as i64,
            self.config.lookback_ceiling as i64,
        ) as usize;
    }
}

impl Strategy for AdaptiveBreakoutStrategy {
    fn name(&self) -> &'static str {
        "adaptive_breakout"
    }

    fn on_session(&mut self, platform: &mut dyn Platform) -> Result<(), PlatformError> {
        // --- Adaptive lookback update ---
        let closes_needed = self.config.volatility_window + 1;
        let bars = platform.recent_bars(&self.symbol, closes_needed)?;
        if bars.len() < closes_needed {
            debug!(
                "Insufficient history for {} ({} of {} bars), skipping session",
                self.symbol,
                bars.len(),
                closes_needed
            );
            return Ok(());
        }
        let closes: Vec<f64> = bars.iter().map(|c| c.close).collect();
        self.update_lookback(&closes);

        // --- Breakout entry check ---
        // The lookback can outgrow the available history; a short breakout
        // window skips only the entry check, stop management still runs.
        let today_close = closes[closes.len() - 1];
        let bars = platform.recent_bars(&self.symbol, self.lookback_days)?;
        if bars.len() >= self.lookback_days {
            let highs: Vec<f64> = bars.iter().map(|c| c.high).collect();
            // The current session's own high never counts toward the threshold
            if let Some(threshold) = indicators::highest(&highs[..highs.len() - 1]) {
                let position = platform.position(&self.symbol)?;
                if !position.is_invested() && today_close >= threshold {
                    info!(
                        "Breakout entry for {}: close {:.4} >= {}-day high {:.4}",
                        self.symbol, today_close, self.lookback_days, threshold
                    );
                    platform.set_target_allocation(&self.symbol, self.config.allocation)?;
                    self.breakout_level = Some(threshold);
                    self.highest_price = Some(threshold);
                }
            }
        } else {
            debug!(
                "Insufficient history for {}-day breakout window, skipping entry check",
                self.lookback_days
            );
        }

        // --- Trailing stop management ---
        // Re-read the position: an entry requested above is visited here in
        // the same session.
        let position = platform.position(&self.symbol)?;
        if !position.is_invested() {
            // Exits are platform-driven (the stop filled); the handle is no
            // longer ours to manage.
            if self.active_stop.take().is_some() {
                debug!("Position in {} is flat, protective stop released", self.symbol);
            }
            return Ok(());
        }

        let breakout_level = match self.breakout_level {
            Some(level) => level,
            None => {
                warn!(
                    "Invested in {} without a recorded breakout level, skipping stop management",
                    self.symbol
                );
                return Ok(());
            }
        };
        let initial_floor = self.config.initial_stop_ratio * breakout_level;

        if !platform.has_open_orders(&self.symbol)? {
            let order_id =
                platform.place_stop_order(&self.symbol, -position.quantity, initial_floor)?;
            self.active_stop = Some(ProtectiveStop {
                order_id,
                trigger: initial_floor,
            });
            info!(
                "Placed protective stop for {} x{:.4} at {:.4}",
                self.symbol, -position.quantity, initial_floor
            );
        }

        // Raise the trigger on new highs while the trailing level clears the
        // ORIGINAL floor, never the current trigger (see module docs).
        let made_new_high = self.highest_price.map_or(false, |h| today_close > h);
        if made_new_high && initial_floor < today_close * self.config.trailing_stop_ratio {
            if let Some(stop) = self.active_stop.as_mut() {
                let new_trigger = today_close * self.config.trailing_stop_ratio;
                platform.update_stop_order(stop.order_id, new_trigger)?;
                stop.trigger = new_trigger;
                self.highest_price = Some(today_close);
                debug!(
                    "Raised trailing stop for {} to {:.4}",
                    self.symbol, new_trigger
                );
            }
        }

        if let Some(stop) = &self.active_stop {
            platform.emit_observation("stop_price", stop.trigger);
        }

        Ok(())
    }

    fn init(&mut self) {
        self.lookback_days = self.config.initial_lookback;
        self.breakout_level = None;
        self.highest_price = None;
        self.active_stop = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> AdaptiveBreakoutStrategy {
        AdaptiveBreakoutStrategy::new(Symbol::new("SPY"), AdaptiveBreakoutConfig::default())
    }

    /// 31 closes whose trailing 30-value window is more volatile than the
    /// window one day earlier
    fn rising_vol_closes() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..30).map(|i| 100.0 + (i % 2) as f64 * 0.1).collect();
        closes.push(150.0); // today's close blows out the deviation
        closes
    }

    #[test]
    fn test_lookback_grows_with_rising_volatility() {
        let mut s = strategy();
        let before = s.lookback_days();
        s.update_lookback(&rising_vol_closes());
        assert!(s.lookback_days() >= before);
    }

    /// 31 closes where the oldest value is an outlier: the earlier window
    /// sees it, the most recent window does not, so volatility falls
    fn falling_vol_closes() -> Vec<f64> {
        let mut closes = vec![200.0, 130.0];
        closes.extend((0..29).map(|i| 100.0 + (i % 2) as f64 * 0.2));
        closes
    }

    #[test]
    fn test_lookback_shrinks_with_falling_volatility() {
        let mut s = strategy();
        let before = s.lookback_days();
        s.update_lookback(&falling_vol_closes());
        assert!(s.lookback_days() < before);
    }

    #[test]
    fn test_lookback_respects_bounds() {
        let mut s = strategy();
        for _ in 0..10 {
            s.update_lookback(&rising_vol_closes());
            assert!(s.lookback_days() <= 30);
        }
        for _ in 0..10 {
            s.update_lookback(&falling_vol_closes());
            assert!(s.lookback_days() >= 10);
        }
    }

    #[test]
    fn test_zero_volatility_leaves_lookback_unchanged() {
        let mut s = strategy();
        let closes = vec![100.0; 31];
        let before = s.lookback_days();
        s.update_lookback(&closes);
        assert_eq!(s.lookback_days(), before);
    }

    #[test]
    fn test_init_resets_state() {
        let mut s = strategy();
        s.update_lookback(&rising_vol_closes());
        s.breakout_level = Some(105.0);
        s.highest_price = Some(110.0);
        s.init();
        assert_eq!(s.lookback_days(), 20);
        assert!(s.breakout_level().is_none());
        assert!(s.highest_price().is_none());
        assert!(s.active_stop_trigger().is_none());
    }
}
