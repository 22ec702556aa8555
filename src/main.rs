//! Grid bot - main entry point
//!
//! This binary provides two subcommands:
//! - run: Paper-trade the grid against a replayed price series
//! - plan: Print the ladder and stop levels for a given price and position

use anyhow::Result;
use clap::{Parser, Subcommand};
use grid_bot::Direction;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "grid-bot")]
#[command(about = "Directional grid-trading controller with one-shot trailing stops", long_about = None)]
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
    /// Paper-trade against a CSV price series
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/sol_usdt.json")]
        config: String,

        /// CSV file with `timestamp,price` rows, replayed one row per tick
        #[arg(short, long, default_value = "data/sol_usdt_sample.csv")]
        prices: String,

        /// Tick interval in seconds (overrides config)
        #[arg(long)]
        interval: Option<u64>,

        /// Stop after this many ticks (default: one per price row)
        #[arg(long)]
        max_ticks: Option<u64>,

        /// Do not sleep between ticks
        #[arg(long)]
        fast: bool,
    },

    /// Show the ladder that would be built for a price and position
    Plan {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/sol_usdt.json")]
        config: String,

        /// Current price
        #[arg(long)]
        price: String,

        /// Current position size
        #[arg(long, default_value = "0")]
        position: String,

        /// Trend direction (up or down); derived from the reference price if omitted
        #[arg(long)]
        direction: Option<Direction>,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // Log file naming pattern: {command}_{date}.log
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

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    // Same format without ANSI colors
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

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenv::dotenv().ok();

    let command_name = match &cli.command {
        Commands::Run { .. } => "run",
        Commands::Plan { .. } => "plan",
    };
    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Run {
            config,
            prices,
            interval,
            max_ticks,
            fast,
        } => commands::run::run(config, prices, interval, max_ticks, fast),

        Commands::Plan {
            config,
            price,
            position,
            direction,
        } => commands::plan::run(config, price, position, direction),
    }
}
