//! Directional grid-trading controller
//!
//! Tracks the trend against a fixed reference price, lays out a ladder of
//! entries that accumulate a position as price moves in that direction, and
//! tightens each filled entry's stop exactly once after a full grid step in
//! favour. Exchange access is abstracted behind [`gateway::MarketGateway`].

pub mod book;
pub mod config;
pub mod controller;
pub mod direction;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod ladder;
pub mod paper;
pub mod scheduler;
pub mod stop_loss;
pub mod types;

pub use config::{BotConfig, Config, RunnerConfig};
pub use controller::{BotState, GridController, TickOutcome, TickReport};
pub use error::{ConfigError, GatewayError, GatewayResult};
pub use types::*;
