//! Intra-channel trading: Donchian/RSI breakout signals with a fixed-lot
//! evaluator and a TPE parameter search.
//!
//! The pipeline is load bars -> generate signals -> evaluate. The optimizer
//! wraps the whole pipeline and searches the strategy parameter space.

pub mod backtest;
pub mod config;
pub mod data;
pub mod error;
pub mod indicators;
pub mod optimizer;
pub mod signal;
pub mod types;

pub use config::{BacktestConfig, Config, SearchConfig, StrategyParams};
pub use error::{Error, Result};
pub use types::{Bar, Signal, SignalSeries, Stats};
