//! Signal generation engine
//!
//! Single-pass state machine over the lagged Donchian/RSI/ATR indicators.
//! Emits one signal per bar: SHORT on an upper-band breakout, LONG when the
//! short exits (lower band touch or RSI exhaustion), and otherwise repeats
//! the previous emitted value. Session overlays (end-of-day flattening,
//! midnight park/reopen, trading-hours suppression) run as separate passes
//! over the emitted series.

use chrono::{Datelike, Timelike};
use tracing::debug;

use crate::config::{StrategyParams, TradingHours};
use crate::error::{Error, Result};
use crate::indicators::{atr, donchian_channel, rsi};
use crate::types::{Bar, Signal, SignalSeries};

/// Generate the per-bar signal series for `bars` under `params`.
///
/// The output is aligned index-for-index with the input; entries before the
/// longest indicator warm-up are `None`. Decisions at bar `t` use only data
/// up to bar `t-1` (the indicators carry the one-bar lag) plus the close of
/// bar `t` itself.
pub fn generate_signals(bars: &[Bar], params: &StrategyParams) -> Result<SignalSeries> {
    params.validate()?;

    if bars.is_empty() {
        return Err(Error::Data("no bars to generate signals for".into()));
    }
    for pair in bars.windows(2) {
        if pair[1].datetime <= pair[0].datetime {
            return Err(Error::Data(format!(
                "timestamps not strictly increasing at {}",
                pair[1].datetime
            )));
        }
    }
    // Bar fields are public, so loader-side validation can be bypassed.
    for bar in bars {
        for (name, value) in [
            ("open", bar.open),
            ("high", bar.high),
            ("low", bar.low),
            ("close", bar.close),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Data(format!(
                    "invalid {} price {} at {}",
                    name, value, bar.datetime
                )));
            }
        }
    }

    let high: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let low: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let close: Vec<f64> = bars.iter().map(|b| b.close).collect();

    let (upper, lower) = donchian_channel(&high, &low, params.donchian_window);
    let rsi_series = rsi(&close, params.rsi_period);
    let atr_series = if params.atr_enabled {
        Some(atr(&high, &low, &close, params.atr_period))
    } else {
        None
    };

    let n = bars.len();
    let start = params.warmup_bars();
    let mut signals: SignalSeries = vec![None; n];

    if start >= n {
        debug!(
            bars = n,
            warmup = start,
            "not enough bars to clear the indicator warm-up"
        );
        return Ok(signals);
    }

    let mut in_short = false;
    // Allows an entry on the very first tradable bar.
    let mut last_entry = start as i64 - params.cooldown_bars;
    let mut prev = Signal::Long;

    for t in start..n {
        let close_t = close[t];

        // Low-volatility gate: below the ATR floor the bar is suspended
        // outright and emits flat; entry and exit logic never runs.
        if let Some(ref atr_vals) = atr_series {
            if let Some(a) = atr_vals[t] {
                let suspended = if let Some(threshold) = params.atr_threshold {
                    a < threshold
                } else if let Some(pct) = params.atr_pct_threshold {
                    a / close_t < pct
                } else {
                    false
                };
                if suspended {
                    signals[t] = Some(Signal::Flat);
                    prev = Signal::Flat;
                    continue;
                }
            }
        }

        let (up, lo, r) = match (upper[t], lower[t], rsi_series[t]) {
            (Some(u), Some(l), Some(r)) => (u, l, r),
            _ => continue,
        };

        let emitted = if !in_short
            && close_t > up
            && (t as i64 - last_entry) >= params.cooldown_bars
        {
            in_short = true;
            last_entry = t as i64;
            Signal::Short
        } else if in_short && (close_t < lo || r < params.rsi_exit) {
            in_short = false;
            Signal::Long
        } else {
            prev
        };

        signals[t] = Some(emitted);
        prev = emitted;
    }

    if params.eod_exit {
        if params.eod_reopen_on_opposite {
            apply_eod_reopen(bars, &mut signals, params.eod_exit_hour);
        } else {
            apply_eod_flatten(bars, &mut signals, params.eod_exit_hour);
        }
    }

    if !params.trading_hours.is_unrestricted() {
        apply_trading_hours(bars, &mut signals, &params.trading_hours);
    }

    Ok(signals)
}

/// Force flat from `eod_exit_hour` to the end of each day.
fn apply_eod_flatten(bars: &[Bar], signals: &mut SignalSeries, eod_exit_hour: u32) {
    for (bar, slot) in bars.iter().zip(signals.iter_mut()) {
        if slot.is_some() && bar.datetime.hour() >= eod_exit_hour {
            *slot = Some(Signal::Flat);
        }
    }
}

/// Park a live signal at the first bar of the day and hold flat until the
/// base series flips to the opposite non-flat side. The unpark check runs
/// before any end-of-day zeroing, so a reopen always wins.
fn apply_eod_reopen(bars: &[Bar], signals: &mut SignalSeries, eod_exit_hour: u32) {
    let mut parked: Option<Signal> = None;

    for (bar, slot) in bars.iter().zip(signals.iter_mut()) {
        let base = match *slot {
            Some(s) => s,
            None => continue,
        };
        let hour = bar.datetime.hour();

        if let Some(held) = parked {
            if base != Signal::Flat && base != held {
                parked = None;
                *slot = Some(base);
            } else {
                *slot = Some(Signal::Flat);
            }
            continue;
        }

        let mut out = base;
        if hour >= eod_exit_hour {
            out = Signal::Flat;
        }
        if hour == 0 && bar.datetime.minute() == 0 && base != Signal::Flat {
            parked = Some(base);
            out = Signal::Flat;
        }
        *slot = Some(out);
    }
}

/// Outside the allowed session only a change to flat may pass; any other
/// change is suppressed by carrying the previous emitted value forward.
fn apply_trading_hours(bars: &[Bar], signals: &mut SignalSeries, hours: &TradingHours) {
    let mut prev = Signal::Flat;

    for (bar, slot) in bars.iter().zip(signals.iter_mut()) {
        let base = match *slot {
            Some(s) => s,
            None => continue,
        };
        let weekday = bar.datetime.weekday().num_days_from_monday();
        let allowed = hours.hour_allowed(bar.datetime.hour()) && hours.day_allowed(weekday);

        let out = if allowed || base == Signal::Flat {
            base
        } else {
            prev
        };
        *slot = Some(out);
        prev = out;
    }
}
