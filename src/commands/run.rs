//! Run command: paper-trade the grid against a replayed price series
//!
//! The controller and gateway are synchronous, so the tick loop runs on a
//! tokio blocking thread while the async side waits for Ctrl+C.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use grid_bot::paper::{PaperGateway, PriceFeed};
use grid_bot::scheduler::{
    ManualClock, RunSummary, Scheduler, SchedulerConfig, StopReason, SystemClock,
};
use grid_bot::{Config, GridController};

pub fn run(
    config_path: String,
    prices_path: String,
    interval: Option<u64>,
    max_ticks: Option<u64>,
    fast: bool,
) -> Result<()> {
    let mut config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;
    if let Some(secs) = interval {
        info!("Overriding tick interval to: {}s", secs);
        config.runner.tick_interval_secs = secs;
    }

    let feed = PriceFeed::from_csv(&prices_path)
        .with_context(|| format!("Failed to load prices from {}", prices_path))?;
    if feed.is_empty() {
        anyhow::bail!("Price file {} has no rows", prices_path);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run_async(config, feed, max_ticks, fast))
}

async fn run_async(
    config: Config,
    feed: PriceFeed,
    max_ticks: Option<u64>,
    fast: bool,
) -> Result<()> {
    let bot = &config.bot;
    info!("{}", "=".repeat(60));
    info!("GRID BOT - PAPER MODE");
    info!("Symbol:            {}", bot.symbol);
    info!("Reference price:   {}", bot.reference_price);
    info!("Delta / mini:      {} / {}", bot.delta, bot.mini_delta);
    info!("Lot / max:         {} / {}", bot.lot_size, bot.max_position_size);
    info!("Tick interval:     {}s{}", config.runner.tick_interval_secs, if fast { " (simulated)" } else { "" });
    info!("Reconcile policy:  {:?}", config.runner.reconcile_policy);
    info!("Prices:            {}", feed.len());
    info!("{}", "=".repeat(60));

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, stopping after the current tick...");
                shutdown_signal.store(true, Ordering::SeqCst);
            }
            Err(e) => error!("Error setting up signal handler: {}", e),
        }
    });

    let scheduler_config = SchedulerConfig {
        interval: Duration::from_secs(config.runner.tick_interval_secs),
        // An exhausted feed only produces skipped ticks, so stop with it by default
        max_ticks: Some(max_ticks.unwrap_or(feed.len() as u64)),
        max_consecutive_failures: config.runner.max_consecutive_failures,
    };

    let summary = tokio::task::spawn_blocking(move || -> Result<RunSummary> {
        let mut gateway = PaperGateway::new(config.bot.symbol.clone(), feed);
        let mut controller = GridController::new(config.bot, config.runner.reconcile_policy)?;
        controller
            .bootstrap(&mut gateway)
            .context("Failed to read startup state from gateway")?;

        let summary = if fast {
            Scheduler::new(ManualClock::new(), scheduler_config).run(
                &mut controller,
                &mut gateway,
                &shutdown,
            )
        } else {
            Scheduler::new(SystemClock, scheduler_config).run(
                &mut controller,
                &mut gateway,
                &shutdown,
            )
        };

        let state = controller.state();
        for position in state.positions().iter() {
            info!(
                id = %position.id,
                side = %position.side,
                entry = %position.entry_price,
                size = %position.size,
                stop = ?position.stop_price.map(|p| p.to_string()),
                tightened = position.stop_loss_moved(),
                "Open position record"
            );
        }
        info!(
            position = %state.current_position_size(),
            direction = %state.direction(),
            pending_entries = state.ladder().len(),
            gateway_stop_outs = gateway.stop_outs(),
            "Final state"
        );

        Ok(summary)
    })
    .await
    .context("Tick loop thread panicked")??;

    println!("\n{}", "=".repeat(60));
    println!("RUN SUMMARY");
    println!("{}", "=".repeat(60));
    println!("Ticks:              {}", summary.ticks);
    println!("Completed:          {}", summary.completed);
    println!("Skipped:            {}", summary.skipped);
    println!("Fills:              {}", summary.fills);
    println!("Stops Tightened:    {}", summary.stops_moved);
    println!("Failures:           {}", summary.failures);
    println!("Stopped By:         {:?}", summary.stop_reason);
    println!("{}", "=".repeat(60));

    match summary.stop_reason {
        StopReason::TooManyFailures { consecutive, last } => {
            anyhow::bail!("Stopped after {} consecutive failed ticks: {}", consecutive, last)
        }
        StopReason::Shutdown => {
            warn!("Run interrupted; open positions are left as they are");
            Ok(())
        }
        StopReason::MaxTicks => Ok(()),
    }
}
