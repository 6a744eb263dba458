//! Core data types used across the signal engine, evaluator, and search loop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// OHLC price bar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    /// Construct a bar, rejecting non-finite or non-positive prices.
    pub fn new(datetime: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Result<Self> {
        for (name, value) in [("open", open), ("high", high), ("low", low), ("close", close)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Data(format!(
                    "invalid {} price {} at {}",
                    name, value, datetime
                )));
            }
        }
        Ok(Bar {
            datetime,
            open,
            high,
            low,
            close,
        })
    }
}

/// Per-bar trading signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Long,
    Short,
    Flat,
}

impl Signal {
    /// Integer wire code: LONG = +1, SHORT = -1, FLAT = 0.
    pub fn value(self) -> i8 {
        match self {
            Signal::Long => 1,
            Signal::Short => -1,
            Signal::Flat => 0,
        }
    }
}

/// Signal series aligned index-for-index with the input bars.
///
/// `None` marks the indicator warm-up window; those bars carry no decision.
/// The evaluator acts on *changes* between consecutive values, not on the
/// raw values themselves.
pub type SignalSeries = Vec<Option<Signal>>;

/// True iff the signal differs from the immediately preceding bar's signal.
pub fn is_changed_signal(prev: Signal, current: Signal) -> bool {
    prev != current
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

/// Open position state inside the evaluator
#[derive(Debug, Clone)]
pub struct Position {
    pub side: Side,
    pub entry_price: f64,
    pub quantity: f64,
    pub entry_time: DateTime<Utc>,
}

impl Position {
    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        match self.side {
            Side::Buy => (current_price - self.entry_price) * self.quantity,
            Side::Sell => (self.entry_price - current_price) * self.quantity,
        }
    }
}

/// Completed trade record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub pnl: f64,
    pub commission: f64,
    pub net_pnl: f64,
}

impl Trade {
    /// Signed return in percent relative to the entry price.
    pub fn return_pct(&self) -> f64 {
        let raw = (self.exit_price - self.entry_price) / self.entry_price * 100.0;
        match self.side {
            Side::Buy => raw,
            Side::Sell => -raw,
        }
    }
}

/// Summary statistics produced by the evaluator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub return_pct: f64,
    pub sharpe_ratio: f64,
    pub win_rate_pct: f64,
    pub profit_factor: f64,
    pub expectancy_pct: f64,
    pub max_drawdown_pct: f64,
    pub equity_final: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub total_commission: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bar_rejects_non_finite_prices() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(Bar::new(dt, f64::NAN, 1.0, 1.0, 1.0).is_err());
        assert!(Bar::new(dt, 1.0, f64::INFINITY, 1.0, 1.0).is_err());
        assert!(Bar::new(dt, 1.0, 1.0, -1.0, 1.0).is_err());
        assert!(Bar::new(dt, 1.0, 1.0, 1.0, 0.0).is_err());
        assert!(Bar::new(dt, 1.0, 1.1, 0.9, 1.0).is_ok());
    }

    #[test]
    fn test_signal_codes() {
        assert_eq!(Signal::Long.value(), 1);
        assert_eq!(Signal::Short.value(), -1);
        assert_eq!(Signal::Flat.value(), 0);
    }

    #[test]
    fn test_short_trade_return_is_signed() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let trade = Trade {
            side: Side::Sell,
            entry_price: 100.0,
            exit_price: 90.0,
            quantity: 1.0,
            entry_time: dt,
            exit_time: dt,
            pnl: 10.0,
            commission: 0.0,
            net_pnl: 10.0,
        };
        assert!((trade.return_pct() - 10.0).abs() < 1e-12);
    }
}
