//! Intra-channel trading signals - main entry point
//!
//! This binary provides two subcommands:
//! - backtest: Generate signals and evaluate them over historical bars
//! - optimize: Search the strategy parameter space with TPE

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "intra-channel")]
#[command(about = "Donchian/RSI channel breakout signals with backtesting and parameter search", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a signal-generation backtest
    Backtest {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/eurusd_1h.json")]
        config: String,

        /// Start date (YYYY-MM-DD), overrides config file
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD), overrides config file
        #[arg(long)]
        end: Option<String>,

        /// Write the per-bar signal series to this CSV file
        #[arg(long)]
        signals: Option<String>,
    },

    /// Optimize strategy parameters (TPE search)
    Optimize {
        /// Path to configuration file with a search section
        #[arg(short, long, default_value = "configs/eurusd_1h.json")]
        config: String,

        /// Trial budget, overrides config file
        #[arg(short = 'n', long)]
        trials: Option<usize>,

        /// Sampler seed, overrides config file
        #[arg(long)]
        seed: Option<u64>,

        /// Trials evaluated in parallel per sampler update
        #[arg(long)]
        batch_size: Option<usize>,

        /// Number of top results to show
        #[arg(short, long, default_value = "10")]
        top: usize,

        /// Directory for trials.csv and optimized_config.json
        #[arg(short, long, default_value = "results")]
        output: String,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    if file_only {
        // For the optimizer: log to file only, keep the console clean for
        // the progress bar.
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("Logging initialized");
        info!("Log file: {}", log_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Backtest { .. } => ("backtest", false),
        Commands::Optimize { .. } => ("optimize", true), // File-only for clean progress bar
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Backtest {
            config,
            start,
            end,
            signals,
        } => commands::backtest::run(config, start, end, signals),

        Commands::Optimize {
            config,
            trials,
            seed,
            batch_size,
            top,
            output,
        } => commands::optimize::run(config, trials, seed, batch_size, top, output),
    }
}
