//! Adaptive Breakout Strategy
//!
//! A single-instrument breakout trading strategy with a volatility-adaptive
//! lookback window and a trailing protective stop, plus the daily backtest
//! harness that stands in for the execution platform.

pub mod backtest;
pub mod config;
pub mod data;
pub mod indicators;
pub mod platform;
pub mod strategies;
pub mod types;

pub use config::Config;
pub use strategies::Strategy;
pub use types::*;
