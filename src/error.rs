//! Error types shared across the crate

use thiserror::Error;

/// Errors raised by the signal engine, the evaluator, and config validation.
///
/// `Configuration` and `Data` are fatal for a single run. The search loop
/// catches all three variants and records the trial with a sentinel score
/// instead of aborting.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid parameter values (bad periods, thresholds out of bounds).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed input bars (out-of-order timestamps, non-finite prices).
    #[error("data error: {0}")]
    Data(String),

    /// Evaluator-side failure, e.g. a degenerate trade set with undefined ratios.
    #[error("evaluation failed: {0}")]
    Evaluation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
