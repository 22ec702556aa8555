//! Plan command: print the ladder and stop levels for a hypothetical state

use anyhow::{Context, Result};
use grid_bot::direction::DirectionTracker;
use grid_bot::ladder;
use grid_bot::stop_loss::StopLossManager;
use grid_bot::{Config, Direction, Money, PositionSide};
use tracing::info;

pub fn run(
    config_path: String,
    price: String,
    position: String,
    direction: Option<Direction>,
) -> Result<()> {
    let config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;
    let bot = config.bot;

    let price: Money = price
        .parse()
        .with_context(|| format!("Invalid price '{}'", price))?;
    let position: Money = position
        .parse()
        .with_context(|| format!("Invalid position size '{}'", position))?;

    // Without an explicit direction, classify the price as a first observation would
    let direction = direction.unwrap_or_else(|| {
        DirectionTracker::new(bot.reference_price, bot.delta)
            .update(price)
            .current
    });
    info!(price = %price, position = %position, direction = %direction, "Planning ladder");

    let plan = ladder::rebuild(price, position, direction, &bot);
    let stops = StopLossManager::new(bot.delta, bot.mini_delta);
    let side = match direction {
        Direction::Down => PositionSide::Short,
        _ => PositionSide::Long,
    };

    println!("\n{}", "=".repeat(60));
    println!("LADDER PLAN  {}", bot.symbol);
    println!("{}", "=".repeat(60));
    println!("Reference Price:    {}", bot.reference_price);
    println!("Current Price:      {}", price);
    println!("Direction:          {}", direction);
    println!("Position:           {} / {}", position, bot.max_position_size);
    println!("Entries:            {}", plan.len());
    println!("{}", "-".repeat(60));

    if plan.is_empty() {
        println!("No entries: capacity exhausted or direction undetermined");
    } else {
        println!(
            "{:>4}  {:>14}  {:>14}  {:>10}  {:>10}",
            "#", "trigger", "size", "stop", "tightened"
        );
        for (i, entry) in plan.entries().iter().enumerate() {
            let initial = stops.initial_stop(side, entry.trigger_price);
            let one_step = match side {
                PositionSide::Long => entry.trigger_price + bot.delta,
                PositionSide::Short => entry.trigger_price - bot.delta,
            };
            let tightened = stops
                .trailing_stop(side, entry.trigger_price, false, one_step)
                .unwrap_or(initial);
            println!(
                "{:>4}  {:>14}  {:>14}  {:>10}  {:>10}",
                i + 1,
                entry.trigger_price.to_string(),
                entry.size.round_dp(8).to_string(),
                initial.to_string(),
                tightened.to_string()
            );
        }
        println!("{}", "-".repeat(60));
        println!("Total Size:         {}", plan.total_size().round_dp(8));
    }
    println!("{}", "=".repeat(60));

    Ok(())
}
