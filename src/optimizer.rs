//! Parameter search over the strategy space
//!
//! Tree-structured Parzen estimator with a fixed trial budget. The sampler
//! draws uniformly for the first `n_startup_trials`, then splits the finished
//! trials into good/bad sets at the `gamma` quantile, fits a Gaussian kernel
//! density to each, and picks the candidate maximizing the density ratio
//! l(x)/g(x). Failed trials (invalid parameters, degenerate trade sets) are
//! recorded with a negative-infinity score so the loop never aborts.

use std::cmp::Ordering;

use indicatif::ProgressBar;
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use statrs::distribution::{Continuous, Normal};
use tracing::debug;

use crate::backtest::evaluate_params;
use crate::config::{BacktestConfig, SearchConfig, SearchSpace, StrategyParams};
use crate::types::{Bar, Stats};

/// One search dimension: integer dimensions are sampled continuously and
/// rounded, float dimensions pass through.
#[derive(Debug, Clone)]
pub enum ParamRange {
    Int(i64, i64),
    Float(f64, f64),
}

#[derive(Debug, Clone)]
pub struct ParamDim {
    pub name: String,
    pub range: ParamRange,
}

impl ParamDim {
    fn int(name: &str, bounds: (i64, i64)) -> Self {
        ParamDim {
            name: name.to_string(),
            range: ParamRange::Int(bounds.0, bounds.1),
        }
    }

    fn float(name: &str, bounds: (f64, f64)) -> Self {
        ParamDim {
            name: name.to_string(),
            range: ParamRange::Float(bounds.0, bounds.1),
        }
    }

    fn bounds(&self) -> (f64, f64) {
        match self.range {
            ParamRange::Int(lo, hi) => (lo as f64, hi as f64),
            ParamRange::Float(lo, hi) => (lo, hi),
        }
    }

    /// Snap a continuous sample back onto the dimension's domain.
    fn quantize(&self, value: f64) -> f64 {
        let (lo, hi) = self.bounds();
        match self.range {
            ParamRange::Int(_, _) => value.round().clamp(lo, hi),
            ParamRange::Float(_, _) => value.clamp(lo, hi),
        }
    }
}

/// One evaluated parameter vector. `values` aligns with the study's
/// dimensions; a `None` stats field marks a failed trial.
#[derive(Debug, Clone)]
pub struct Trial {
    pub number: usize,
    pub values: Vec<f64>,
    pub score: f64,
    pub stats: Option<Stats>,
}

/// Finished search: all trials plus the dimensions they were sampled over.
#[derive(Debug)]
pub struct Study {
    pub dims: Vec<ParamDim>,
    pub trials: Vec<Trial>,
}

impl Study {
    /// Highest-scoring successful trial; earliest wins on a tie.
    pub fn best(&self) -> Option<&Trial> {
        let mut best: Option<&Trial> = None;
        for trial in &self.trials {
            if trial.score.is_finite() && best.map_or(true, |b| trial.score > b.score) {
                best = Some(trial);
            }
        }
        best
    }

    /// Successful trials sorted by score, best first.
    pub fn ranked(&self) -> Vec<&Trial> {
        let mut ranked: Vec<&Trial> = self
            .trials
            .iter()
            .filter(|t| t.score.is_finite())
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.number.cmp(&b.number))
        });
        ranked
    }

    /// Strategy parameters of the best trial applied over `base`.
    pub fn best_params(&self, base: &StrategyParams) -> Option<StrategyParams> {
        self.best()
            .map(|t| apply_params(base, &self.dims, &t.values))
    }
}

/// Dimensions searched for `base`. ATR dimensions join the space only when
/// the gate is enabled in the base configuration.
pub fn search_dimensions(base: &StrategyParams, space: &SearchSpace) -> Vec<ParamDim> {
    let mut dims = vec![
        ParamDim::int("donchian_window", space.donchian_window),
        ParamDim::int("rsi_period", space.rsi_period),
        ParamDim::int("rsi_exit", space.rsi_exit),
        ParamDim::int("cooldown_bars", space.cooldown_bars),
    ];
    if base.atr_enabled {
        dims.push(ParamDim::int("atr_period", space.atr_period));
        dims.push(ParamDim::float("atr_threshold", space.atr_threshold));
    }
    dims
}

/// Overlay sampled values on top of the base parameters.
pub fn apply_params(base: &StrategyParams, dims: &[ParamDim], values: &[f64]) -> StrategyParams {
    let mut params = base.clone();
    for (dim, &value) in dims.iter().zip(values) {
        match dim.name.as_str() {
            "donchian_window" => params.donchian_window = value as usize,
            "rsi_period" => params.rsi_period = value as usize,
            "rsi_exit" => params.rsi_exit = value,
            "cooldown_bars" => params.cooldown_bars = value as i64,
            "atr_period" => params.atr_period = value as usize,
            "atr_threshold" => params.atr_threshold = Some(value),
            _ => {}
        }
    }
    params
}

/// Composite objective: reward return, risk-adjusted return, hit rate and
/// expectancy; penalize drawdown.
pub fn composite_score(stats: &Stats) -> f64 {
    0.4 * stats.return_pct
        + 0.2 * stats.sharpe_ratio
        + 0.2 * stats.win_rate_pct
        + 0.2 * stats.profit_factor
        + 0.1 * stats.expectancy_pct
        - 0.5 * stats.max_drawdown_pct
}

/// Seeded TPE sampler. Suggestions for a fixed seed and trial history are
/// fully deterministic.
pub struct TpeSampler {
    rng: StdRng,
    n_startup_trials: usize,
    gamma: f64,
    n_candidates: usize,
}

impl TpeSampler {
    pub fn new(search: &SearchConfig) -> Self {
        TpeSampler {
            rng: StdRng::seed_from_u64(search.seed),
            n_startup_trials: search.n_startup_trials.max(1),
            gamma: search.gamma,
            n_candidates: search.n_candidates.max(1),
        }
    }

    /// Propose a value per dimension given the finished trials.
    pub fn suggest(&mut self, dims: &[ParamDim], history: &[Trial]) -> Vec<f64> {
        let observed: Vec<&Trial> = history.iter().filter(|t| t.score.is_finite()).collect();
        let startup = observed.len() < self.n_startup_trials;

        (0..dims.len())
            .map(|i| {
                let dim = &dims[i];
                let raw = if startup {
                    self.sample_uniform(dim)
                } else {
                    self.sample_parzen(dim, i, &observed)
                };
                dim.quantize(raw)
            })
            .collect()
    }

    fn sample_uniform(&mut self, dim: &ParamDim) -> f64 {
        match dim.range {
            ParamRange::Int(lo, hi) => self.rng.gen_range(lo..=hi) as f64,
            ParamRange::Float(lo, hi) => self.rng.gen_range(lo..=hi),
        }
    }

    fn sample_parzen(&mut self, dim: &ParamDim, idx: usize, observed: &[&Trial]) -> f64 {
        let mut sorted: Vec<&Trial> = observed.to_vec();
        sorted.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.number.cmp(&b.number))
        });

        let n_good = ((sorted.len() as f64 * self.gamma).ceil() as usize)
            .max(1)
            .min(sorted.len());
        let good: Vec<f64> = sorted[..n_good].iter().map(|t| t.values[idx]).collect();
        let bad: Vec<f64> = sorted[n_good..].iter().map(|t| t.values[idx]).collect();
        if bad.is_empty() {
            return self.sample_uniform(dim);
        }

        let (lo, hi) = dim.bounds();
        let sigma = ((hi - lo) * 0.1).max(1e-9);

        let mut best_x = good[0];
        let mut best_ratio = f64::NEG_INFINITY;
        for _ in 0..self.n_candidates {
            let center = good[self.rng.gen_range(0..good.len())];
            let x = match Normal::new(center, sigma) {
                Ok(kernel) => kernel.sample(&mut self.rng).clamp(lo, hi),
                Err(_) => center,
            };
            let l = kde_density(&good, x, sigma);
            let g = kde_density(&bad, x, sigma).max(1e-12);
            let ratio = l / g;
            if ratio > best_ratio {
                best_ratio = ratio;
                best_x = x;
            }
        }
        best_x
    }
}

fn kde_density(points: &[f64], x: f64, sigma: f64) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let total: f64 = points
        .iter()
        .map(|&mean| {
            Normal::new(mean, sigma)
                .map(|kernel| kernel.pdf(x))
                .unwrap_or(0.0)
        })
        .sum();
    total / points.len() as f64
}

/// Search driver: samples in batches, evaluates batches in parallel, and
/// feeds results back into the sampler between batches.
pub struct Optimizer<'a> {
    bars: &'a [Bar],
    base: &'a StrategyParams,
    backtest: &'a BacktestConfig,
    search: &'a SearchConfig,
}

impl<'a> Optimizer<'a> {
    pub fn new(
        bars: &'a [Bar],
        base: &'a StrategyParams,
        backtest: &'a BacktestConfig,
        search: &'a SearchConfig,
    ) -> Self {
        Optimizer {
            bars,
            base,
            backtest,
            search,
        }
    }

    pub fn run(&self, progress: Option<&ProgressBar>) -> Study {
        let dims = search_dimensions(self.base, &self.search.space);
        let mut sampler = TpeSampler::new(self.search);
        let mut trials: Vec<Trial> = Vec::with_capacity(self.search.n_trials);
        let batch_size = self.search.batch_size.max(1);

        while trials.len() < self.search.n_trials {
            let take = batch_size.min(self.search.n_trials - trials.len());
            let suggestions: Vec<Vec<f64>> =
                (0..take).map(|_| sampler.suggest(&dims, &trials)).collect();

            let results: Vec<(f64, Option<Stats>)> = suggestions
                .par_iter()
                .map(|values| {
                    let params = apply_params(self.base, &dims, values);
                    match evaluate_params(self.bars, &params, self.backtest) {
                        Ok(stats) => (composite_score(&stats), Some(stats)),
                        Err(err) => {
                            debug!(error = %err, "trial failed");
                            (f64::NEG_INFINITY, None)
                        }
                    }
                })
                .collect();

            for (values, (score, stats)) in suggestions.into_iter().zip(results) {
                let number = trials.len();
                debug!(trial = number, score, ?values, "trial finished");
                trials.push(Trial {
                    number,
                    values,
                    score,
                    stats,
                });
                if let Some(pb) = progress {
                    pb.inc(1);
                }
            }
        }

        Study { dims, trials }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn synthetic_bars(n: usize) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut bars = Vec::with_capacity(n);
        let mut prev_close = 100.0;
        for i in 0..n {
            let close = 100.0 + 8.0 * ((i as f64) / 7.0).sin() + 0.01 * i as f64;
            let open = prev_close;
            bars.push(Bar {
                datetime: start + Duration::hours(i as i64),
                open,
                high: open.max(close) + 0.5,
                low: open.min(close) - 0.5,
                close,
            });
            prev_close = close;
        }
        bars
    }

    fn small_search() -> SearchConfig {
        SearchConfig {
            n_trials: 15,
            seed: 42,
            batch_size: 1,
            n_startup_trials: 5,
            gamma: 0.25,
            n_candidates: 8,
            space: SearchSpace {
                donchian_window: (3, 10),
                rsi_period: (3, 10),
                rsi_exit: (10, 50),
                cooldown_bars: (1, 5),
                atr_period: (3, 10),
                atr_threshold: (0.0001, 0.0015),
            },
        }
    }

    #[test]
    fn test_suggestions_respect_bounds_and_integrality() {
        let bars = synthetic_bars(120);
        let base = StrategyParams::default();
        let search = small_search();
        let study = Optimizer::new(&bars, &base, &BacktestConfig::default(), &search).run(None);

        assert_eq!(study.trials.len(), 15);
        for trial in &study.trials {
            for (dim, &v) in study.dims.iter().zip(&trial.values) {
                let (lo, hi) = dim.bounds();
                assert!(v >= lo && v <= hi, "{} = {} out of [{}, {}]", dim.name, v, lo, hi);
                if let ParamRange::Int(_, _) = dim.range {
                    assert_eq!(v, v.round());
                }
            }
        }
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let bars = synthetic_bars(120);
        let base = StrategyParams::default();
        let search = small_search();
        let cfg = BacktestConfig::default();

        let a = Optimizer::new(&bars, &base, &cfg, &search).run(None);
        let b = Optimizer::new(&bars, &base, &cfg, &search).run(None);

        for (ta, tb) in a.trials.iter().zip(&b.trials) {
            assert_eq!(ta.values, tb.values);
            assert_eq!(ta.score.to_bits(), tb.score.to_bits());
        }
    }

    #[test]
    fn test_invalid_space_yields_sentinel_scores() {
        let bars = synthetic_bars(60);
        let base = StrategyParams::default();
        let search = SearchConfig {
            n_trials: 5,
            space: SearchSpace {
                rsi_period: (0, 0),
                ..small_search().space
            },
            ..small_search()
        };
        let study = Optimizer::new(&bars, &base, &BacktestConfig::default(), &search).run(None);

        assert_eq!(study.trials.len(), 5);
        assert!(study.trials.iter().all(|t| t.score == f64::NEG_INFINITY));
        assert!(study.best().is_none());
        assert!(study.best_params(&base).is_none());
    }

    #[test]
    fn test_atr_dimensions_join_only_when_enabled() {
        let space = SearchSpace::default();
        let off = search_dimensions(&StrategyParams::default(), &space);
        assert_eq!(off.len(), 4);

        let base = StrategyParams {
            atr_enabled: true,
            atr_threshold: Some(0.001),
            ..Default::default()
        };
        let on = search_dimensions(&base, &space);
        assert_eq!(on.len(), 6);
        assert!(on.iter().any(|d| d.name == "atr_threshold"));
    }

    #[test]
    fn test_apply_params_overlays_values() {
        let base = StrategyParams::default();
        let dims = search_dimensions(&base, &SearchSpace::default());
        let params = apply_params(&base, &dims, &[15.0, 7.0, 25.0, 12.0]);
        assert_eq!(params.donchian_window, 15);
        assert_eq!(params.rsi_period, 7);
        assert_eq!(params.rsi_exit, 25.0);
        assert_eq!(params.cooldown_bars, 12);
    }

    #[test]
    fn test_composite_score_weights() {
        let stats = Stats {
            return_pct: 10.0,
            sharpe_ratio: 2.0,
            win_rate_pct: 60.0,
            profit_factor: 1.5,
            expectancy_pct: 0.5,
            max_drawdown_pct: 4.0,
            ..Default::default()
        };
        let expected = 0.4 * 10.0 + 0.2 * 2.0 + 0.2 * 60.0 + 0.2 * 1.5 + 0.1 * 0.5 - 0.5 * 4.0;
        assert!((composite_score(&stats) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_best_prefers_earliest_on_tie() {
        let study = Study {
            dims: vec![],
            trials: vec![
                Trial {
                    number: 0,
                    values: vec![],
                    score: 1.0,
                    stats: None,
                },
                Trial {
                    number: 1,
                    values: vec![],
                    score: 1.0,
                    stats: None,
                },
            ],
        };
        assert_eq!(study.best().map(|t| t.number), Some(0));
    }
}
