//! Optimize command: TPE parameter search with progress tracking

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use intra_channel::optimizer::{Optimizer, Study};
use intra_channel::{data, Config};
use std::fs;
use std::path::Path;
use tracing::info;

#[allow(clippy::too_many_arguments)]
pub fn run(
    config_path: String,
    trials: Option<usize>,
    seed: Option<u64>,
    batch_size: Option<usize>,
    top: usize,
    output_dir: String,
) -> Result<()> {
    info!("Starting optimization");

    let mut config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if let Some(n) = trials {
        config.search.n_trials = n;
    }
    if let Some(s) = seed {
        config.search.seed = s;
    }
    if let Some(b) = batch_size {
        config.search.batch_size = b;
    }

    let bars = data::load_from_config(&config.data)?;
    info!("Loaded {} bars from {}", bars.len(), config.data.csv_path);
    info!(
        "Trials: {}, seed: {}, batch size: {}",
        config.search.n_trials, config.search.seed, config.search.batch_size
    );

    println!("\n{}", "=".repeat(70));
    println!("OPTIMIZATION SUMMARY");
    println!("{}", "=".repeat(70));
    println!("  Bars:       {}", bars.len());
    println!("  Trials:     {}", config.search.n_trials);
    println!("  Seed:       {}", config.search.seed);
    println!("  Batch size: {}", config.search.batch_size);
    println!("{}\n", "=".repeat(70));

    let pb = ProgressBar::new(config.search.n_trials as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("⚡ {percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}, {per_sec}]")
            .context("invalid progress template")?
            .progress_chars("█░ "),
    );
    pb.tick();

    let optimizer = Optimizer::new(&bars, &config.strategy, &config.backtest, &config.search);
    let study = optimizer.run(Some(&pb));
    pb.finish();
    println!();

    let successful = study.trials.iter().filter(|t| t.score.is_finite()).count();
    info!(
        "Search finished: {} trials, {} successful",
        study.trials.len(),
        successful
    );

    print_top_trials(&study, top);

    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir))?;
    write_trials_csv(Path::new(&output_dir).join("trials.csv"), &study)?;

    if let Some(best_params) = study.best_params(&config.strategy) {
        let mut optimized = config.clone();
        optimized.strategy = best_params;
        let path = Path::new(&output_dir).join("optimized_config.json");
        fs::write(&path, serde_json::to_string_pretty(&optimized)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Best configuration written to: {}", path.display());
    } else {
        info!("No successful trials; optimized config not written");
    }

    info!("Optimization completed successfully");
    Ok(())
}

fn print_top_trials(study: &Study, top: usize) {
    let ranked = study.ranked();
    if ranked.is_empty() {
        println!("No successful trials.");
        return;
    }
    let count = top.min(ranked.len());

    println!("\n{}", "=".repeat(110));
    println!("TOP {} TRIALS (by composite score)", count);
    println!("{}", "=".repeat(110));
    println!(
        "{:<5} {:>6} {:>9} {:>8} {:>8} {:>8} {:>8} {:>7} | Parameters",
        "Rank", "Trial", "Score", "Return%", "Sharpe", "WinR%", "PF", "MaxDD%"
    );
    println!("{}", "-".repeat(110));

    for (rank, trial) in ranked.iter().take(count).enumerate() {
        let params = study
            .dims
            .iter()
            .zip(&trial.values)
            .map(|(d, v)| format!("{}={}", d.name, v))
            .join(" ");
        let stats = trial.stats.as_ref();
        println!(
            "{:<5} {:>6} {:>9.3} {:>8.2} {:>8.2} {:>8.2} {:>8.2} {:>7.2} | {}",
            rank + 1,
            trial.number,
            trial.score,
            stats.map_or(0.0, |s| s.return_pct),
            stats.map_or(0.0, |s| s.sharpe_ratio),
            stats.map_or(0.0, |s| s.win_rate_pct),
            stats.map_or(0.0, |s| s.profit_factor),
            stats.map_or(0.0, |s| s.max_drawdown_pct),
            params
        );
    }
    println!("{}", "=".repeat(110));
}

fn write_trials_csv(path: impl AsRef<Path>, study: &Study) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let mut header = vec!["trial".to_string(), "score".to_string()];
    header.extend(study.dims.iter().map(|d| d.name.clone()));
    header.extend(
        [
            "return_pct",
            "sharpe_ratio",
            "win_rate_pct",
            "profit_factor",
            "expectancy_pct",
            "max_drawdown_pct",
            "total_trades",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    writer.write_record(&header)?;

    for trial in &study.trials {
        let mut row = vec![trial.number.to_string()];
        row.push(if trial.score.is_finite() {
            trial.score.to_string()
        } else {
            String::new()
        });
        row.extend(trial.values.iter().map(|v| v.to_string()));
        match &trial.stats {
            Some(s) => {
                row.push(s.return_pct.to_string());
                row.push(s.sharpe_ratio.to_string());
                row.push(s.win_rate_pct.to_string());
                row.push(s.profit_factor.to_string());
                row.push(s.expectancy_pct.to_string());
                row.push(s.max_drawdown_pct.to_string());
                row.push(s.total_trades.to_string());
            }
            None => row.extend(std::iter::repeat(String::new()).take(7)),
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;

    info!("Trial history written to: {}", path.display());
    Ok(())
}
