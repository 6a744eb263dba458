//! Backtest command: one signal-generation run plus evaluation

use anyhow::{Context, Result};
use intra_channel::{backtest, data, signal, Bar, Config, Signal};
use std::path::Path;
use tracing::info;

pub fn run(
    config_path: String,
    start: Option<String>,
    end: Option<String>,
    signals_out: Option<String>,
) -> Result<()> {
    info!("Starting backtest");

    let mut config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if start.is_some() {
        config.data.start_date = start;
    }
    if end.is_some() {
        config.data.end_date = end;
    }

    let bars = data::load_from_config(&config.data)?;
    info!(
        "Loaded {} bars from {}",
        bars.len(),
        config.data.csv_path
    );

    let signals = signal::generate_signals(&bars, &config.strategy)?;
    let stats = backtest::evaluate(&bars, &signals, &config.backtest)?;

    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS");
    println!("{}", "=".repeat(60));
    println!("  Bars:            {}", bars.len());
    println!("  Trades:          {}", stats.total_trades);
    println!(
        "  Wins / Losses:   {} / {}",
        stats.winning_trades, stats.losing_trades
    );
    println!("  Return:          {:>10.2} %", stats.return_pct);
    println!("  Sharpe:          {:>10.2}", stats.sharpe_ratio);
    println!("  Win rate:        {:>10.2} %", stats.win_rate_pct);
    println!("  Profit factor:   {:>10.2}", stats.profit_factor);
    println!("  Expectancy:      {:>10.4} %", stats.expectancy_pct);
    println!("  Max drawdown:    {:>10.2} %", stats.max_drawdown_pct);
    println!("  Final equity:    {:>10.2}", stats.equity_final);
    println!("  Commission paid: {:>10.2}", stats.total_commission);
    println!("{}", "=".repeat(60));

    if let Some(path) = signals_out {
        write_signals_csv(&path, &bars, &signals)?;
        info!("Signals written to: {}", path);
    }

    info!("Backtest completed successfully");
    Ok(())
}

fn write_signals_csv(
    path: impl AsRef<Path>,
    bars: &[Bar],
    signals: &[Option<Signal>],
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())
        .with_context(|| format!("Failed to create {}", path.as_ref().display()))?;
    writer.write_record(["datetime", "close", "signal"])?;

    for (bar, slot) in bars.iter().zip(signals) {
        let signal = slot
            .map(|s| s.value().to_string())
            .unwrap_or_default();
        writer.write_record([
            bar.datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
            bar.close.to_string(),
            signal,
        ])?;
    }
    writer.flush()?;
    Ok(())
}
