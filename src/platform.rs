//! Execution platform interface
//!
//! The strategy never talks to an exchange or data store directly. Price
//! history, portfolio state, and order placement are all injected through
//! the [`Platform`] trait, so the decision logic can be driven by the
//! backtest engine or by a scripted fake in tests.

use crate::{Candle, Symbol};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Order ID type - u64 for performance
pub type OrderId = u64;

/// Atomic counter for fast order ID generation
static ORDER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate next order ID (thread-safe, lock-free)
pub fn next_order_id() -> OrderId {
    ORDER_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Errors surfaced by platform operations
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("unknown symbol: {0}")]
    UnknownSymbol(Symbol),

    #[error("unknown order id: {0}")]
    UnknownOrder(OrderId),

    #[error("order rejected: {0}")]
    OrderRejected(String),
}

/// Snapshot of the current position in one instrument
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSnapshot {
    /// Signed quantity held (positive = long)
    pub quantity: f64,
}

impl PositionSnapshot {
    pub fn flat() -> Self {
        Self { quantity: 0.0 }
    }

    pub fn is_invested(&self) -> bool {
        self.quantity != 0.0
    }
}

/// Capability set the strategy consumes from the execution platform.
///
/// Latency and reliability of these operations belong to the platform;
/// from the strategy's viewpoint they are synchronous and either succeed
/// or fail for the current session.
pub trait Platform {
    /// Most recent `count` daily bars for `symbol`, oldest to newest.
    ///
    /// Near the start of history fewer than `count` bars may be returned;
    /// callers decide whether a short window is usable.
    fn recent_bars(&self, symbol: &Symbol, count: usize) -> Result<Vec<Candle>, PlatformError>;

    /// Current position in `symbol`.
    fn position(&self, symbol: &Symbol) -> Result<PositionSnapshot, PlatformError>;

    /// Whether any open orders exist for `symbol`.
    fn has_open_orders(&self, symbol: &Symbol) -> Result<bool, PlatformError>;

    /// Place a market order sized to bring the holding in `symbol` to
    /// `fraction` of total portfolio value (1.0 = fully allocated).
    fn set_target_allocation(&mut self, symbol: &Symbol, fraction: f64)
        -> Result<(), PlatformError>;

    /// Place a stop order for `quantity` (negative quantity sells) triggered
    /// at `trigger_price`. Returns a handle for later updates.
    fn place_stop_order(
        &mut self,
        symbol: &Symbol,
        quantity: f64,
        trigger_price: f64,
    ) -> Result<OrderId, PlatformError>;

    /// Move an existing stop order's trigger price.
    fn update_stop_order(
        &mut self,
        order_id: OrderId,
        trigger_price: f64,
    ) -> Result<(), PlatformError>;

    /// Record a named telemetry series value (charting; not load-bearing).
    fn emit_observation(&mut self, series: &str, value: f64);
}
