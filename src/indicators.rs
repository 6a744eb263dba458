//! Technical indicators for the channel-breakout strategy
//!
//! All functions return a series the same length as the input with a one-bar
//! forward shift built in: the value at index `t` is computed from bars
//! strictly before `t`, so the signal engine can never look ahead. The first
//! `period` entries are `None` (warm-up plus the shift).

/// Rolling Donchian channel: max of highs and min of lows over `window` bars,
/// shifted forward by one bar.
pub fn donchian_channel(
    high: &[f64],
    low: &[f64],
    window: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    if high.is_empty() || window == 0 || high.len() != low.len() {
        return (vec![], vec![]);
    }

    let n = high.len();
    let mut upper = Vec::with_capacity(n);
    let mut lower = Vec::with_capacity(n);

    for t in 0..n {
        if t < window {
            upper.push(None);
            lower.push(None);
        } else {
            let hi = high[t - window..t]
                .iter()
                .fold(f64::MIN, |a, &b| a.max(b));
            let lo = low[t - window..t].iter().fold(f64::MAX, |a, &b| a.min(b));
            upper.push(Some(hi));
            lower.push(Some(lo));
        }
    }

    (upper, lower)
}

/// Cutler-style RSI over close-to-close deltas inside a `period`-bar window,
/// shifted forward by one bar.
///
/// A window of `period` bars contains `period - 1` deltas; the averaging
/// divisor cancels in the gain/loss ratio, so plain sums are used. A zero
/// loss sum saturates the oscillator at 100 instead of propagating NaN.
pub fn rsi(close: &[f64], period: usize) -> Vec<Option<f64>> {
    if close.is_empty() || period == 0 {
        return vec![];
    }

    let n = close.len();
    let mut result = Vec::with_capacity(n);

    for t in 0..n {
        if t < period {
            result.push(None);
            continue;
        }

        let mut gain_sum = 0.0;
        let mut loss_sum = 0.0;
        for j in (t - period + 1)..t {
            let delta = close[j] - close[j - 1];
            if delta > 0.0 {
                gain_sum += delta;
            } else {
                loss_sum += -delta;
            }
        }

        let value = if loss_sum == 0.0 {
            100.0
        } else {
            let rs = gain_sum / loss_sum;
            100.0 - 100.0 / (1.0 + rs)
        };
        result.push(Some(value));
    }

    result
}

/// True range: max of (high-low, |high - prev close|, |low - prev close|).
/// The first bar has no previous close, so its TR is high-low.
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(high.len());

    for i in 0..high.len() {
        let tr_value = if i == 0 {
            high[i] - low[i]
        } else {
            let hl = high[i] - low[i];
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            hl.max(hc).max(lc)
        };
        tr.push(tr_value);
    }

    tr
}

/// ATR as the rolling mean of true range over `period` bars, shifted forward
/// by one bar.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    if high.is_empty() || period == 0 || high.len() != low.len() || high.len() != close.len() {
        return vec![];
    }

    let tr = true_range(high, low, close);
    let n = tr.len();
    let mut result = Vec::with_capacity(n);

    for t in 0..n {
        if t < period {
            result.push(None);
        } else {
            let sum: f64 = tr[t - period..t].iter().sum();
            result.push(Some(sum / period as f64));
        }
    }

    result
}
