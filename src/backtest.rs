//! Backtesting engine
//!
//! Plays the role of the external execution platform over a daily candle
//! series: portfolio accounting, market fills, a resting stop-order book
//! with gap-aware triggering, and observation series collection. The
//! [`Backtester`] drives one strategy session per completed bar.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::platform::{next_order_id, OrderId, Platform, PlatformError, PositionSnapshot};
use crate::{
    Candle, Config, ExitReason, Money, PerformanceMetrics, Side, Strategy, Symbol, Trade,
};

/// A resting stop order in the simulated book
#[derive(Debug, Clone, Copy)]
struct StopOrder {
    /// Signed quantity; negative sells to close a long
    quantity: f64,
    trigger: f64,
}

/// Entry-side bookkeeping for the open position
#[derive(Debug, Clone, Copy)]
struct OpenLot {
    entry_price: Money,
    entry_time: DateTime<Utc>,
    entry_commission: Money,
}

/// In-memory execution platform over a fixed candle series.
///
/// `cursor` marks the current session bar; history visible to the strategy
/// is everything up to and including it.
pub struct SimPlatform {
    symbol: Symbol,
    candles: Vec<Candle>,
    cursor: usize,
    cash: Money,
    quantity: Money,
    commission_rate: Money,
    slippage: f64,
    stop_orders: HashMap<OrderId, StopOrder>,
    open_lot: Option<OpenLot>,
    trades: Vec<Trade>,
    observations: HashMap<String, Vec<(DateTime<Utc>, f64)>>,
    total_commission: Money,
}

impl SimPlatform {
    /// # Panics
    ///
    /// Panics if `candles` is empty; the platform always has a current bar.
    pub fn new(
        symbol: Symbol,
        candles: Vec<Candle>,
        initial_capital: f64,
        commission_rate: f64,
        slippage: f64,
    ) -> Self {
        assert!(!candles.is_empty(), "requires at least one candle");
        Self {
            symbol,
            candles,
            cursor: 0,
            cash: Money::from_f64(initial_capital),
            quantity: Money::ZERO,
            commission_rate: Money::from_f64(commission_rate),
            slippage,
            stop_orders: HashMap::new(),
            open_lot: None,
            trades: Vec::new(),
            observations: HashMap::new(),
            total_commission: Money::ZERO,
        }
    }

    pub fn num_sessions(&self) -> usize {
        self.candles.len()
    }

    fn current_bar(&self) -> &Candle {
        &self.candles[self.cursor]
    }

    /// Total portfolio value marked at the current session close
    pub fn equity(&self) -> Money {
        self.cash + self.quantity * Money::from_f64(self.current_bar().close)
    }

    /// Timestamp of the current session bar
    pub fn current_time(&self) -> DateTime<Utc> {
        self.current_bar().datetime
    }

    fn check_symbol(&self, symbol: &Symbol) -> Result<(), PlatformError> {
        if symbol == &self.symbol {
            Ok(())
        } else {
            Err(PlatformError::UnknownSymbol(symbol.clone()))
        }
    }

    /// Advance to session `idx` and fill any stop orders triggered by its bar.
    /// Stops are evaluated before the session callback, matching an exchange
    /// that works resting orders intraday while the strategy only wakes once
    /// per session.
    pub fn begin_session(&mut self, idx: usize) {
        self.cursor = idx;
        let bar = self.candles[idx].clone();

        let triggered: Vec<OrderId> = self
            .stop_orders
            .iter()
            .filter(|(_, order)| bar.low <= order.trigger)
            .map(|(&id, _)| id)
            .collect();

        for id in triggered {
            if let Some(order) = self.stop_orders.remove(&id) {
                // Gap through the trigger fills at the open
                let fill_price = if bar.open <= order.trigger {
                    bar.open
                } else {
                    order.trigger
                };
                self.fill_close(order.quantity, fill_price, bar.datetime, ExitReason::StopTriggered);
                debug!(
                    "Stop order {} filled at {:.4} on {}",
                    id,
                    fill_price,
                    bar.datetime.date_naive()
                );
            }
        }
    }

    /// Apply a closing fill for `quantity` (negative = sell) at `price`
    fn fill_close(
        &mut self,
        quantity: f64,
        price: f64,
        time: DateTime<Utc>,
        exit_reason: ExitReason,
    ) {
        let qty_closed = Money::from_f64(-quantity);
        let price = Money::from_f64(price);
        let proceeds = qty_closed * price;
        let commission = proceeds * self.commission_rate;

        self.cash += proceeds - commission;
        self.quantity += Money::from_f64(quantity);
        self.total_commission += commission;

        if let Some(lot) = self.open_lot.take() {
            let pnl = (price - lot.entry_price) * qty_closed;
            let total_commission = lot.entry_commission + commission;
            self.trades.push(Trade {
                symbol: self.symbol.clone(),
                side: Side::Buy,
                entry_price: lot.entry_price,
                exit_price: price,
                quantity: qty_closed,
                entry_time: lot.entry_time,
                exit_time: time,
                pnl,
                commission: total_commission,
                net_pnl: pnl - total_commission,
                exit_reason,
            });
        }
    }

    /// Force-close any open position at the final bar (end of backtest)
    pub fn liquidate(&mut self) {
        if self.quantity.is_positive() {
            let bar = self.candles[self.cursor].clone();
            let quantity = -self.quantity.to_f64();
            self.fill_close(quantity, bar.close, bar.datetime, ExitReason::EndOfData);
            self.stop_orders.clear();
        }
    }

    pub fn into_results(
        self,
    ) -> (Vec<Trade>, HashMap<String, Vec<(DateTime<Utc>, f64)>>, Money) {
        (self.trades, self.observations, self.total_commission)
    }
}

impl Platform for SimPlatform {
    fn recent_bars(&self, symbol: &Symbol, count: usize) -> Result<Vec<Candle>, PlatformError> {
        self.check_symbol(symbol)?;
        let visible = &self.candles[..=self.cursor];
        let start = visible.len().saturating_sub(count);
        Ok(visible[start..].to_vec())
    }

    fn position(&self, symbol: &Symbol) -> Result<PositionSnapshot, PlatformError> {
        self.check_symbol(symbol)?;
        Ok(PositionSnapshot {
            quantity: self.quantity.to_f64(),
        })
    }

    fn has_open_orders(&self, symbol: &Symbol) -> Result<bool, PlatformError> {
        self.check_symbol(symbol)?;
        Ok(!self.stop_orders.is_empty())
    }

    fn set_target_allocation(
        &mut self,
        symbol: &Symbol,
        fraction: f64,
    ) -> Result<(), PlatformError> {
        self.check_symbol(symbol)?;
        if !(0.0..=1.0).contains(&fraction) {
            return Err(PlatformError::OrderRejected(format!(
                "allocation fraction {} outside [0, 1]",
                fraction
            )));
        }

        let bar = self.current_bar();
        let fill_price = Money::from_f64(bar.close * (1.0 + self.slippage));
        let entry_time = bar.datetime;

        let target_value = self.equity() * Money::from_f64(fraction);
        let current_value = self.quantity * fill_price;
        let delta_value = target_value - current_value;
        if delta_value.is_negative() || delta_value.is_zero() {
            return Err(PlatformError::OrderRejected(
                "only allocation increases are supported (long-only platform)".to_string(),
            ));
        }

        // Size down so cost + commission never exceeds cash
        let mut qty = delta_value / fill_price;
        let affordable = self.cash / (fill_price * (Money::ONE + self.commission_rate));
        qty = qty.min(affordable);
        if !qty.is_positive() {
            return Err(PlatformError::OrderRejected(
                "insufficient cash for market order".to_string(),
            ));
        }

        let cost = qty * fill_price;
        let commission = cost * self.commission_rate;
        self.cash -= cost + commission;
        self.quantity += qty;
        self.total_commission += commission;
        self.open_lot = Some(OpenLot {
            entry_price: fill_price,
            entry_time,
            entry_commission: commission,
        });

        debug!(
            "Market fill {} x{} at {} on {}",
            self.symbol,
            qty,
            fill_price,
            entry_time.date_naive()
        );
        Ok(())
    }

    fn place_stop_order(
        &mut self,
        symbol: &Symbol,
        quantity: f64,
        trigger_price: f64,
    ) -> Result<OrderId, PlatformError> {
        self.check_symbol(symbol)?;
        if trigger_price <= 0.0 || !trigger_price.is_finite() {
            return Err(PlatformError::OrderRejected(format!(
                "invalid stop trigger price {}",
                trigger_price
            )));
        }
        let id = next_order_id();
        self.stop_orders.insert(
            id,
            StopOrder {
                quantity,
                trigger: trigger_price,
            },
        );
        Ok(id)
    }

    fn update_stop_order(
        &mut self,
        order_id: OrderId,
        trigger_price: f64,
    ) -> Result<(), PlatformError> {
        if trigger_price <= 0.0 || !trigger_price.is_finite() {
            return Err(PlatformError::OrderRejected(format!(
                "invalid stop trigger price {}",
                trigger_price
            )));
        }
        match self.stop_orders.get_mut(&order_id) {
            Some(order) => {
                order.trigger = trigger_price;
                Ok(())
            }
            None => Err(PlatformError::UnknownOrder(order_id)),
        }
    }

    fn emit_observation(&mut self, series: &str, value: f64) {
        let timestamp = self.current_bar().datetime;
        self.observations
            .entry(series.to_string())
            .or_default()
            .push((timestamp, value));
    }
}

/// Backtest output
#[derive(Debug, Default, Serialize)]
pub struct BacktestResult {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<(DateTime<Utc>, f64)>,
    pub observations: HashMap<String, Vec<(DateTime<Utc>, f64)>>,
    pub metrics: PerformanceMetrics,
}

/// Backtest engine: one strategy session per completed daily bar
pub struct Backtester {
    config: Config,
    strategy: Box<dyn Strategy>,
}

impl Backtester {
    pub fn new(config: Config, strategy: Box<dyn Strategy>) -> Self {
        Backtester { config, strategy }
    }

    pub fn run(&mut self, candles: Vec<Candle>) -> BacktestResult {
        if candles.is_empty() {
            warn!("No candles supplied, nothing to backtest");
            return BacktestResult::default();
        }

        let symbol = self.config.trading.symbol();
        let initial_capital = self.config.trading.initial_capital;
        let mut platform = SimPlatform::new(
            symbol,
            candles,
            initial_capital,
            self.config.backtest.commission,
            self.config.backtest.assumed_slippage,
        );

        self.strategy.init();
        let mut equity_curve = Vec::with_capacity(platform.num_sessions());

        for i in 0..platform.num_sessions() {
            platform.begin_session(i);

            // A failed session is non-fatal: log it and try again tomorrow
            // with state carried forward.
            if let Err(e) = self.strategy.on_session(&mut platform) {
                warn!("Strategy session {} failed: {}", i, e);
            }

            equity_curve.push((platform.current_time(), platform.equity().to_f64()));
        }

        platform.liquidate();
        let (trades, observations, _total_commission) = platform.into_results();
        let metrics = self.calculate_metrics(&trades, &equity_curve);

        BacktestResult {
            trades,
            equity_curve,
            observations,
            metrics,
        }
    }

    fn calculate_metrics(
        &self,
        trades: &[Trade],
        equity_curve: &[(DateTime<Utc>, f64)],
    ) -> PerformanceMetrics {
        if trades.is_empty() || equity_curve.is_empty() {
            return PerformanceMetrics::default();
        }

        let initial_capital = self.config.trading.initial_capital;
        let final_capital = equity_curve[equity_curve.len() - 1].1;
        let total_return = ((final_capital - initial_capital) / initial_capital) * 100.0;

        let winning: Vec<&Trade> = trades
            .iter()
            .filter(|t| t.net_pnl.is_positive())
            .collect();
        let losing: Vec<&Trade> = trades
            .iter()
            .filter(|t| !t.net_pnl.is_positive())
            .collect();

        let win_rate = (winning.len() as f64 / trades.len() as f64) * 100.0;

        let gross_profits: f64 = winning.iter().map(|t| t.net_pnl.to_f64()).sum();
        let gross_losses: f64 = losing.iter().map(|t| t.net_pnl.to_f64().abs()).sum();

        let profit_factor = if gross_losses > 0.0 {
            gross_profits / gross_losses
        } else if gross_profits > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_win = if winning.is_empty() {
            0.0
        } else {
            gross_profits / winning.len() as f64
        };
        let avg_loss = if losing.is_empty() {
            0.0
        } else {
            gross_losses / losing.len() as f64
        };

        let largest_win = winning
            .iter()
            .map(|t| t.net_pnl.to_f64())
            .fold(0.0, f64::max);
        let largest_loss = losing
            .iter()
            .map(|t| t.net_pnl.to_f64())
            .fold(0.0, f64::min);

        // Max drawdown over the equity curve
        let mut peak = initial_capital;
        let mut max_dd = 0.0;
        for (_, equity) in equity_curve {
            if *equity > peak {
                peak = *equity;
            }
            let dd = (peak - equity) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }

        // Annualized Sharpe assuming daily bars (252 trading days)
        let returns: Vec<f64> = equity_curve
            .windows(2)
            .map(|w| (w[1].1 - w[0].1) / w[0].1)
            .collect();
        let sharpe_ratio = if returns.is_empty() {
            0.0
        } else {
            let mean = returns.iter().sum::<f64>() / returns.len() as f64;
            let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
                / returns.len() as f64;
            let std_dev = variance.sqrt();
            if std_dev > 0.0 {
                mean / std_dev * (252.0_f64).sqrt()
            } else {
                0.0
            }
        };

        let total_commission: f64 = trades.iter().map(|t| t.commission.to_f64()).sum();

        PerformanceMetrics {
            total_return,
            sharpe_ratio,
            max_drawdown: max_dd * 100.0,
            win_rate,
            profit_factor,
            total_trades: trades.len(),
            winning_trades: winning.len(),
            losing_trades: losing.len(),
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            total_commission,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn flat_candles(count: usize, price: f64) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| Candle {
                datetime: start + Duration::days(i as i64),
                open: price,
                high: price + 0.5,
                low: price - 0.5,
                close: price,
                volume: 1000.0,
            })
            .collect()
    }

    fn platform(candles: Vec<Candle>) -> SimPlatform {
        SimPlatform::new(Symbol::new("SPY"), candles, 100_000.0, 0.0, 0.0)
    }

    #[test]
    fn test_recent_bars_short_history() {
        let mut p = platform(flat_candles(5, 100.0));
        p.begin_session(2);
        let bars = p.recent_bars(&Symbol::new("SPY"), 31).unwrap();
        assert_eq!(bars.len(), 3);
    }

    #[test]
    #[should_panic(expected = "at least one candle")]
    fn test_empty_candle_series_rejected() {
        platform(Vec::new());
    }

    #[test]
    fn test_unknown_symbol_rejected() {
        let p = platform(flat_candles(5, 100.0));
        assert!(matches!(
            p.recent_bars(&Symbol::new("QQQ"), 1),
            Err(PlatformError::UnknownSymbol(_))
        ));
    }

    #[test]
    fn test_full_allocation_market_fill() {
        let mut p = platform(flat_candles(5, 100.0));
        p.begin_session(0);
        let symbol = Symbol::new("SPY");
        p.set_target_allocation(&symbol, 1.0).unwrap();
        let pos = p.position(&symbol).unwrap();
        assert!(pos.is_invested());
        assert_eq!(pos.quantity, 1000.0);
        // Equity is conserved with zero commission
        assert_eq!(p.equity().to_f64(), 100_000.0);
    }

    #[test]
    fn test_stop_fill_flattens_position_and_books_trade() {
        let mut candles = flat_candles(5, 100.0);
        // Session 3 trades down through the stop
        candles[3].low = 90.0;
        candles[3].close = 92.0;
        let mut p = platform(candles);
        let symbol = Symbol::new("SPY");

        p.begin_session(1);
        p.set_target_allocation(&symbol, 1.0).unwrap();
        let qty = p.position(&symbol).unwrap().quantity;
        p.place_stop_order(&symbol, -qty, 95.0).unwrap();

        p.begin_session(2);
        assert!(p.position(&symbol).unwrap().is_invested());

        p.begin_session(3);
        assert!(!p.position(&symbol).unwrap().is_invested());
        assert!(!p.has_open_orders(&symbol).unwrap());

        let (trades, _, _) = p.into_results();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].exit_reason, ExitReason::StopTriggered);
        assert_eq!(trades[0].exit_price.to_f64(), 95.0);
    }

    #[test]
    fn test_stop_gap_fills_at_open() {
        let mut candles = flat_candles(4, 100.0);
        candles[2].open = 88.0;
        candles[2].low = 85.0;
        candles[2].close = 87.0;
        let mut p = platform(candles);
        let symbol = Symbol::new("SPY");

        p.begin_session(0);
        p.set_target_allocation(&symbol, 1.0).unwrap();
        let qty = p.position(&symbol).unwrap().quantity;
        p.place_stop_order(&symbol, -qty, 95.0).unwrap();

        p.begin_session(2);
        let (trades, _, _) = p.into_results();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].exit_price.to_f64(), 88.0);
    }

    #[test]
    fn test_update_unknown_order_is_error() {
        let mut p = platform(flat_candles(3, 100.0));
        assert!(matches!(
            p.update_stop_order(999_999, 95.0),
            Err(PlatformError::UnknownOrder(999_999))
        ));
    }

    #[test]
    fn test_observations_are_recorded_per_series() {
        let mut p = platform(flat_candles(3, 100.0));
        p.begin_session(0);
        p.emit_observation("stop_price", 98.0);
        p.begin_session(1);
        p.emit_observation("stop_price", 99.0);
        let (_, observations, _) = p.into_results();
        assert_eq!(observations["stop_price"].len(), 2);
        assert_eq!(observations["stop_price"][1].1, 99.0);
    }
}
