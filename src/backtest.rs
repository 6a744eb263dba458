//! Signal-driven backtest evaluator
//!
//! Fixed-lot execution model: the account reacts only to *changes* in the
//! signal series, and every change fills at the next bar's open (T+1). A
//! position still open after the last bar is closed at the final close so
//! the statistics always cover a flat account.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::{BacktestConfig, StrategyParams};
use crate::error::{Error, Result};
use crate::signal::generate_signals;
use crate::types::{is_changed_signal, Bar, Position, Side, Signal, SignalSeries, Stats, Trade};

struct Account {
    cash: f64,
    position: Option<Position>,
    trades: Vec<Trade>,
}

impl Account {
    fn new(initial_capital: f64) -> Self {
        Account {
            cash: initial_capital,
            position: None,
            trades: Vec::new(),
        }
    }

    /// Close any open position at `price`, then open a new one when the
    /// target signal is not flat.
    fn transition(
        &mut self,
        target: Signal,
        price: f64,
        time: DateTime<Utc>,
        cfg: &BacktestConfig,
    ) {
        if let Some(pos) = self.position.take() {
            let pnl = pos.unrealized_pnl(price);
            let commission = cfg.commission * pos.quantity * (pos.entry_price + price);
            self.cash += pnl - commission;
            self.trades.push(Trade {
                side: pos.side,
                entry_price: pos.entry_price,
                exit_price: price,
                quantity: pos.quantity,
                entry_time: pos.entry_time,
                exit_time: time,
                pnl,
                commission,
                net_pnl: pnl - commission,
            });
        }

        let side = match target {
            Signal::Long => Side::Buy,
            Signal::Short => Side::Sell,
            Signal::Flat => return,
        };
        self.position = Some(Position {
            side,
            entry_price: price,
            quantity: cfg.lot_size,
            entry_time: time,
        });
    }

    fn marked_equity(&self, price: f64) -> f64 {
        let unrealized = self
            .position
            .as_ref()
            .map(|p| p.unrealized_pnl(price))
            .unwrap_or(0.0);
        self.cash + unrealized
    }
}

/// Run the evaluator over a precomputed signal series.
pub fn evaluate(bars: &[Bar], signals: &SignalSeries, cfg: &BacktestConfig) -> Result<Stats> {
    if bars.len() != signals.len() {
        return Err(Error::Evaluation(format!(
            "bar/signal length mismatch: {} vs {}",
            bars.len(),
            signals.len()
        )));
    }
    if bars.is_empty() {
        return Err(Error::Evaluation("no bars to evaluate".into()));
    }

    let mut account = Account::new(cfg.initial_capital);
    let mut equity_curve = Vec::with_capacity(bars.len());
    let mut prev = Signal::Flat;
    let mut pending: Option<Signal> = None;

    for (bar, slot) in bars.iter().zip(signals.iter()) {
        if let Some(target) = pending.take() {
            account.transition(target, bar.open, bar.datetime, cfg);
        }
        equity_curve.push(account.marked_equity(bar.close));

        if let Some(sig) = *slot {
            if is_changed_signal(prev, sig) {
                pending = Some(sig);
            }
            prev = sig;
        }
    }

    // Flatten at the final close so every trade is realized.
    if account.position.is_some() {
        let last = &bars[bars.len() - 1];
        account.transition(Signal::Flat, last.close, last.datetime, cfg);
        if let Some(eq) = equity_curve.last_mut() {
            *eq = account.cash;
        }
    }

    debug!(
        trades = account.trades.len(),
        equity_final = account.cash,
        "evaluation complete"
    );

    calculate_stats(&account.trades, &equity_curve, cfg)
}

/// Generate signals for `params` and evaluate them in one step.
pub fn evaluate_params(
    bars: &[Bar],
    params: &StrategyParams,
    cfg: &BacktestConfig,
) -> Result<Stats> {
    let signals = generate_signals(bars, params)?;
    evaluate(bars, &signals, cfg)
}

fn calculate_stats(trades: &[Trade], equity_curve: &[f64], cfg: &BacktestConfig) -> Result<Stats> {
    if trades.is_empty() {
        return Err(Error::Evaluation("no trades executed".into()));
    }

    let equity_final = *equity_curve
        .last()
        .ok_or_else(|| Error::Evaluation("empty equity curve".into()))?;
    let return_pct = (equity_final - cfg.initial_capital) / cfg.initial_capital * 100.0;

    let winners: Vec<&Trade> = trades.iter().filter(|t| t.net_pnl > 0.0).collect();
    let losers: Vec<&Trade> = trades.iter().filter(|t| t.net_pnl <= 0.0).collect();

    let gross_profit: f64 = winners.iter().map(|t| t.net_pnl).sum();
    let gross_loss: f64 = losers.iter().map(|t| -t.net_pnl).sum();
    if gross_loss <= 0.0 {
        return Err(Error::Evaluation(
            "zero gross loss, profit factor undefined".into(),
        ));
    }
    let profit_factor = gross_profit / gross_loss;

    let win_rate_pct = winners.len() as f64 / trades.len() as f64 * 100.0;
    let expectancy_pct =
        trades.iter().map(|t| t.return_pct()).sum::<f64>() / trades.len() as f64;

    let avg_win = if winners.is_empty() {
        0.0
    } else {
        gross_profit / winners.len() as f64
    };
    let avg_loss = if losers.is_empty() {
        0.0
    } else {
        gross_loss / losers.len() as f64
    };

    // Sharpe over bars where the account actually moved.
    let mut active_returns = Vec::new();
    for pair in equity_curve.windows(2) {
        if pair[0] > 0.0 {
            let r = (pair[1] - pair[0]) / pair[0];
            if r != 0.0 {
                active_returns.push(r);
            }
        }
    }
    let sharpe_ratio = if active_returns.len() < 2 {
        0.0
    } else {
        let n = active_returns.len() as f64;
        let mean = active_returns.iter().sum::<f64>() / n;
        let var = active_returns
            .iter()
            .map(|r| (r - mean).powi(2))
            .sum::<f64>()
            / (n - 1.0);
        let std = var.sqrt();
        if std > 0.0 {
            mean / std * cfg.bars_per_year.sqrt()
        } else {
            0.0
        }
    };

    let mut peak = f64::MIN;
    let mut max_drawdown_pct: f64 = 0.0;
    for &eq in equity_curve {
        peak = peak.max(eq);
        if peak > 0.0 {
            max_drawdown_pct = max_drawdown_pct.max((peak - eq) / peak * 100.0);
        }
    }

    Ok(Stats {
        return_pct,
        sharpe_ratio,
        win_rate_pct,
        profit_factor,
        expectancy_pct,
        max_drawdown_pct,
        equity_final,
        total_trades: trades.len(),
        winning_trades: winners.len(),
        losing_trades: losers.len(),
        avg_win,
        avg_loss,
        total_commission: trades.iter().map(|t| t.commission).sum(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn make_bars(prices: &[(f64, f64)]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &(open, close))| Bar {
                datetime: start + Duration::hours(i as i64),
                open,
                high: open.max(close),
                low: open.min(close),
                close,
            })
            .collect()
    }

    fn cfg() -> BacktestConfig {
        BacktestConfig {
            initial_capital: 1_000.0,
            lot_size: 1.0,
            commission: 0.0,
            bars_per_year: 8_760.0,
        }
    }

    #[test]
    fn test_fills_at_next_bar_open() {
        let bars = make_bars(&[
            (100.0, 100.0),
            (100.0, 110.0),
            (110.0, 105.0),
            (105.0, 100.0),
            (100.0, 95.0),
        ]);
        let signals: SignalSeries = vec![
            None,
            Some(Signal::Short),
            Some(Signal::Short),
            Some(Signal::Long),
            Some(Signal::Long),
        ];

        let stats = evaluate(&bars, &signals, &cfg()).unwrap();

        // Short filled at bar 2's open (110), reversed to long at bar 4's
        // open (100), force-closed at the final close (95).
        assert_eq!(stats.total_trades, 2);
        assert_relative_eq!(stats.equity_final, 1_005.0);
        assert_relative_eq!(stats.return_pct, 0.5);
        assert_relative_eq!(stats.win_rate_pct, 50.0);
        assert_relative_eq!(stats.profit_factor, 2.0);
        // Trade returns: +10/110 % and -5/100 %.
        assert_relative_eq!(
            stats.expectancy_pct,
            (10.0 / 110.0 * 100.0 - 5.0) / 2.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_drawdown_from_equity_peak() {
        let bars = make_bars(&[
            (100.0, 100.0),
            (100.0, 110.0),
            (110.0, 105.0),
            (105.0, 100.0),
            (100.0, 95.0),
        ]);
        let signals: SignalSeries = vec![
            None,
            Some(Signal::Short),
            Some(Signal::Short),
            Some(Signal::Long),
            Some(Signal::Long),
        ];

        let stats = evaluate(&bars, &signals, &cfg()).unwrap();
        // Peak equity 1010 at bar 3, trough 1005 at the end.
        assert_relative_eq!(
            stats.max_drawdown_pct,
            5.0 / 1_010.0 * 100.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_commission_reduces_pnl() {
        let bars = make_bars(&[(100.0, 100.0), (100.0, 100.0), (100.0, 90.0), (90.0, 85.0)]);
        let signals: SignalSeries = vec![
            Some(Signal::Short),
            Some(Signal::Short),
            Some(Signal::Long),
            Some(Signal::Long),
        ];

        // Short change at bar 0 fills at bar 1's open; reversal at bar 2
        // fills at bar 3's open; the long closes at the final close.
        let with_fees = BacktestConfig {
            commission: 0.001,
            ..cfg()
        };
        let stats = evaluate(&bars, &signals, &with_fees).unwrap();
        assert!(stats.total_commission > 0.0);

        let no_fees = evaluate(&bars, &signals, &cfg()).unwrap();
        assert!(stats.equity_final < no_fees.equity_final);
    }

    #[test]
    fn test_no_trades_is_an_error() {
        let bars = make_bars(&[(1.0, 1.0), (1.0, 1.0), (1.0, 1.0)]);
        let signals: SignalSeries = vec![None, Some(Signal::Flat), Some(Signal::Flat)];
        assert!(matches!(
            evaluate(&bars, &signals, &cfg()),
            Err(Error::Evaluation(_))
        ));
    }

    #[test]
    fn test_zero_gross_loss_is_an_error() {
        let bars = make_bars(&[(100.0, 100.0), (100.0, 100.0), (100.0, 90.0)]);
        let signals: SignalSeries =
            vec![Some(Signal::Short), Some(Signal::Short), Some(Signal::Short)];
        // The single short wins; profit factor is undefined.
        assert!(matches!(
            evaluate(&bars, &signals, &cfg()),
            Err(Error::Evaluation(_))
        ));
    }

    #[test]
    fn test_length_mismatch_is_an_error() {
        let bars = make_bars(&[(1.0, 1.0)]);
        let signals: SignalSeries = vec![None, None];
        assert!(evaluate(&bars, &signals, &cfg()).is_err());
    }

    #[test]
    fn test_evaluate_params_end_to_end() {
        // Breakout short at t=2 fills at t=3's open and rides the drop.
        let closes = [1.0, 2.0, 3.0, 1.0, 1.5, 2.5];
        let bars: Vec<Bar> = make_bars(
            &closes
                .iter()
                .map(|&c| (c, c))
                .collect::<Vec<_>>(),
        );
        let params = StrategyParams {
            donchian_window: 2,
            rsi_period: 2,
            rsi_exit: 30.0,
            cooldown_bars: 1,
            ..Default::default()
        };
        let stats = evaluate_params(&bars, &params, &cfg()).unwrap();
        assert!(stats.total_trades >= 1);
    }
}
