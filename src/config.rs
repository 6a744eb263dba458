//! Configuration management
//!
//! Loads JSON configuration files with sections for data, strategy
//! parameters, backtest settings, and the parameter search.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::Error;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub data: DataConfig,
    pub strategy: StrategyParams,
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        Ok(config)
    }
}

/// Input data location and date range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Path to the OHLC bar CSV file
    pub csv_path: String,
    /// Inclusive start date (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS)
    #[serde(default)]
    pub start_date: Option<String>,
    /// Inclusive end date
    #[serde(default)]
    pub end_date: Option<String>,
}

/// Allowed trading session hours and weekdays.
///
/// Hours are half-open `[start, end)` intervals in the bar timestamps' local
/// hours; weekdays use Monday = 0 .. Sunday = 6. The default permits
/// everything, which disables the session overlay entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingHours {
    pub allowed: Vec<(u32, u32)>,
    pub allowed_days: Vec<u32>,
}

impl Default for TradingHours {
    fn default() -> Self {
        TradingHours {
            allowed: vec![(0, 24)],
            allowed_days: vec![0, 1, 2, 3, 4, 5, 6],
        }
    }
}

impl TradingHours {
    pub fn hour_allowed(&self, hour: u32) -> bool {
        self.allowed.iter().any(|&(start, end)| start <= hour && hour < end)
    }

    pub fn day_allowed(&self, weekday: u32) -> bool {
        self.allowed_days.contains(&weekday)
    }

    /// True when no hour or weekday restriction applies.
    pub fn is_unrestricted(&self) -> bool {
        (0..24).all(|h| self.hour_allowed(h)) && (0..7).all(|d| self.day_allowed(d))
    }
}

/// Strategy parameters for one signal-generation run.
///
/// Immutable per run; the search loop builds a fresh instance per trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyParams {
    /// Donchian channel lookback window
    pub donchian_window: usize,
    /// RSI lookback period
    pub rsi_period: usize,
    /// Short positions exit when RSI drops below this level (0-100)
    pub rsi_exit: f64,
    /// Minimum bars between successive short entries
    pub cooldown_bars: i64,

    /// Enable the ATR low-volatility gate
    #[serde(default)]
    pub atr_enabled: bool,
    /// ATR lookback period
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    /// Absolute ATR threshold; bars below it are suspended
    #[serde(default)]
    pub atr_threshold: Option<f64>,
    /// ATR/close percentage threshold, used only when the absolute
    /// threshold is not set
    #[serde(default)]
    pub atr_pct_threshold: Option<f64>,

    /// Flatten signals at the end of the trading day
    #[serde(default)]
    pub eod_exit: bool,
    /// Local hour (0-23) at which end-of-day flattening starts
    #[serde(default = "default_eod_exit_hour")]
    pub eod_exit_hour: u32,
    /// Park the position at midnight and reopen only on an opposite signal
    #[serde(default)]
    pub eod_reopen_on_opposite: bool,

    #[serde(default)]
    pub trading_hours: TradingHours,
}

fn default_atr_period() -> usize {
    14
}

fn default_eod_exit_hour() -> u32 {
    21
}

impl Default for StrategyParams {
    fn default() -> Self {
        StrategyParams {
            donchian_window: 20,
            rsi_period: 14,
            rsi_exit: 30.0,
            cooldown_bars: 10,
            atr_enabled: false,
            atr_period: 14,
            atr_threshold: None,
            atr_pct_threshold: None,
            eod_exit: false,
            eod_exit_hour: 21,
            eod_reopen_on_opposite: false,
            trading_hours: TradingHours::default(),
        }
    }
}

impl StrategyParams {
    /// Validate parameter bounds before a signal-generation run.
    pub fn validate(&self) -> std::result::Result<(), Error> {
        if self.donchian_window == 0 {
            return Err(Error::Configuration("donchian_window must be > 0".into()));
        }
        if self.rsi_period == 0 {
            return Err(Error::Configuration("rsi_period must be > 0".into()));
        }
        if self.cooldown_bars < 0 {
            return Err(Error::Configuration(format!(
                "cooldown_bars must be >= 0, got {}",
                self.cooldown_bars
            )));
        }
        if !(0.0..=100.0).contains(&self.rsi_exit) {
            return Err(Error::Configuration(format!(
                "rsi_exit must be within [0, 100], got {}",
                self.rsi_exit
            )));
        }
        if self.atr_enabled {
            if self.atr_period == 0 {
                return Err(Error::Configuration("atr_period must be > 0".into()));
            }
            if self.atr_threshold.is_none() && self.atr_pct_threshold.is_none() {
                return Err(Error::Configuration(
                    "atr_enabled requires atr_threshold or atr_pct_threshold".into(),
                ));
            }
        }
        if self.eod_exit_hour >= 24 {
            return Err(Error::Configuration(format!(
                "eod_exit_hour must be within [0, 24), got {}",
                self.eod_exit_hour
            )));
        }
        for &(start, end) in &self.trading_hours.allowed {
            if start >= end || end > 24 {
                return Err(Error::Configuration(format!(
                    "invalid trading hours interval [{}, {})",
                    start, end
                )));
            }
        }
        for &day in &self.trading_hours.allowed_days {
            if day > 6 {
                return Err(Error::Configuration(format!(
                    "invalid weekday {} (expected 0-6, Monday = 0)",
                    day
                )));
            }
        }
        Ok(())
    }

    /// Longest lookback among the enabled indicators. Bars before this index
    /// have at least one undefined indicator and carry no signal.
    pub fn warmup_bars(&self) -> usize {
        let mut warmup = self.donchian_window.max(self.rsi_period);
        if self.atr_enabled {
            warmup = warmup.max(self.atr_period);
        }
        warmup
    }
}

/// Evaluator settings (fixed-lot signal-driven backtest)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// Fixed position size in units of the instrument
    pub lot_size: f64,
    /// Commission rate per fill (fraction of notional)
    pub commission: f64,
    /// Bars per year, used to annualize the Sharpe ratio
    pub bars_per_year: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 100_000.0,
            lot_size: 100_000.0,
            commission: 0.0,
            bars_per_year: 8_760.0, // hourly bars
        }
    }
}

/// Inclusive bounds for one integer search dimension
pub type IntBounds = (i64, i64);
/// Inclusive bounds for one float search dimension
pub type FloatBounds = (f64, f64);

/// Parameter search space. Bounds follow the documented defaults; all are
/// overridable from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSpace {
    pub donchian_window: IntBounds,
    pub rsi_period: IntBounds,
    pub rsi_exit: IntBounds,
    pub cooldown_bars: IntBounds,
    pub atr_period: IntBounds,
    pub atr_threshold: FloatBounds,
}

impl Default for SearchSpace {
    fn default() -> Self {
        SearchSpace {
            donchian_window: (10, 50),
            rsi_period: (5, 30),
            rsi_exit: (10, 50),
            cooldown_bars: (5, 50),
            atr_period: (5, 30),
            atr_threshold: (0.0001, 0.0015),
        }
    }
}

/// Search loop settings. Every field has a default so a partial `search`
/// section parses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Fixed trial budget
    #[serde(default = "default_n_trials")]
    pub n_trials: usize,
    /// Seed for the sampler RNG; runs with the same seed are reproducible
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Trials evaluated in parallel per sampler update (1 = fully sequential)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Random trials before the Parzen model kicks in
    #[serde(default = "default_n_startup_trials")]
    pub n_startup_trials: usize,
    /// Fraction of trials considered "good" when splitting the history
    #[serde(default = "default_gamma")]
    pub gamma: f64,
    /// Candidates scored per suggestion
    #[serde(default = "default_n_candidates")]
    pub n_candidates: usize,
    #[serde(default)]
    pub space: SearchSpace,
}

fn default_n_trials() -> usize {
    100
}

fn default_seed() -> u64 {
    42
}

fn default_batch_size() -> usize {
    1
}

fn default_n_startup_trials() -> usize {
    10
}

fn default_gamma() -> f64 {
    0.25
}

fn default_n_candidates() -> usize {
    24
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            n_trials: default_n_trials(),
            seed: default_seed(),
            batch_size: default_batch_size(),
            n_startup_trials: default_n_startup_trials(),
            gamma: default_gamma(),
            n_candidates: default_n_candidates(),
            space: SearchSpace::default(),
        }
    }
}
