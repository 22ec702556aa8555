//! Grid controller: one tick of the trading loop
//!
//! A tick performs, strictly in order:
//! 1. price fetch (failure skips the tick)
//! 2. direction update
//! 3. aggregate position fetch and [`PositionBook::sync`] (failure skips reconciliation only)
//! 4. ladder rebuild, when needed
//! 5. trigger evaluation and fills
//! 6. stop-loss scan
//!
//! The ladder persists between ticks so that consumed entries stay consumed
//! and rejected entries are retried. It is rebuilt from the current price when
//! it has never been built, when the direction changes, or when the aggregate
//! position changed outside the controller.

use tracing::{debug, info, warn};

use crate::book::{PositionBook, PositionId, ReconcilePolicy};
use crate::config::BotConfig;
use crate::direction::DirectionTracker;
use crate::dispatch::{DispatchReport, ExecutionDispatcher};
use crate::error::{ConfigError, GatewayError, GatewayResult};
use crate::gateway::{AggregatePosition, MarketGateway, OpenOrder};
use crate::ladder::{self, Ladder};
use crate::stop_loss::{StopLossManager, StopScanReport};
use crate::{Direction, Money};

/// Mutable controller state. Single owner; see [`GridController::tick`].
#[derive(Debug, Clone)]
pub struct BotState {
    tracker: DirectionTracker,
    ladder: Ladder,
    ladder_built: bool,
    positions: PositionBook,
    last_price: Option<Money>,
}

impl BotState {
    fn new(config: &BotConfig, policy: ReconcilePolicy) -> Self {
        Self {
            tracker: DirectionTracker::new(config.reference_price, config.delta),
            ladder: Ladder::default(),
            ladder_built: false,
            positions: PositionBook::new(policy),
            last_price: None,
        }
    }

    pub fn direction(&self) -> Direction {
        self.tracker.direction()
    }

    /// Net size the controller believes it holds
    pub fn current_position_size(&self) -> Money {
        self.positions.tracked_size()
    }

    pub fn ladder(&self) -> &Ladder {
        &self.ladder
    }

    pub fn positions(&self) -> &PositionBook {
        &self.positions
    }

    pub fn last_price(&self) -> Option<Money> {
        self.last_price
    }
}

/// What the controller saw on the exchange before the first tick
#[derive(Debug, Clone, PartialEq)]
pub struct StartupSnapshot {
    pub position: AggregatePosition,
    pub open_orders: Vec<OpenOrder>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub price: Money,
    pub direction: Direction,
    pub direction_changed: bool,
    /// `None` when the position fetch failed and reconciliation was skipped
    pub position_changed: Option<bool>,
    pub position_error: Option<GatewayError>,
    pub ladder_rebuilt: bool,
    pub ladder_len: usize,
    pub dispatch: DispatchReport,
    pub stops: StopScanReport,
    pub position_size: Money,
}

impl TickReport {
    pub fn failure_count(&self) -> usize {
        self.dispatch.failed_orders.len()
            + self.dispatch.failed_stops.len()
            + self.stops.failed.len()
            + usize::from(self.position_error.is_some())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Completed(Box<TickReport>),
    /// Nothing could be evaluated, typically because no price was available
    Skipped { tick: u64, reason: GatewayError },
}

impl TickOutcome {
    pub fn tick(&self) -> u64 {
        match self {
            TickOutcome::Completed(report) => report.tick,
            TickOutcome::Skipped { tick, .. } => *tick,
        }
    }

    pub fn report(&self) -> Option<&TickReport> {
        match self {
            TickOutcome::Completed(report) => Some(&**report),
            TickOutcome::Skipped { .. } => None,
        }
    }
}

pub struct GridController {
    config: BotConfig,
    state: BotState,
    dispatcher: ExecutionDispatcher,
    stops: StopLossManager,
    ticks: u64,
}

impl GridController {
    pub fn new(config: BotConfig, policy: ReconcilePolicy) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = BotState::new(&config, policy);
        Ok(Self {
            dispatcher: ExecutionDispatcher::new(config.symbol.clone()),
            stops: StopLossManager::new(config.delta, config.mini_delta),
            config,
            state,
            ticks: 0,
        })
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn state(&self) -> &BotState {
        &self.state
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Seed the tracked aggregate from the gateway and log resting orders
    pub fn bootstrap<G: MarketGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
    ) -> GatewayResult<StartupSnapshot> {
        let symbol = &self.config.symbol;
        let position = gateway.fetch_aggregate_position(symbol)?;
        let open_orders = gateway.fetch_open_orders(symbol)?;

        self.state.positions.sync(position.size, position.side);

        info!(
            symbol = %symbol,
            size = %position.size,
            side = ?position.side,
            open_orders = open_orders.len(),
            "Startup snapshot"
        );
        for order in &open_orders {
            debug!(id = %order.id, side = %order.side, size = %order.size, price = ?order.price.map(|p| p.to_string()), "Resting order");
        }

        Ok(StartupSnapshot {
            position,
            open_orders,
        })
    }

    /// Run one tick against `gateway`.
    ///
    /// Takes `&mut self`: ladder rebuild, trigger evaluation and the stop scan
    /// must never interleave on the same state. Callers sharing a controller
    /// between threads need their own lock around it.
    pub fn tick<G: MarketGateway + ?Sized>(&mut self, gateway: &mut G) -> TickOutcome {
        self.ticks += 1;
        let tick = self.ticks;
        let symbol = self.config.symbol.clone();

        let price = match gateway.fetch_price(&symbol) {
            Ok(price) => price,
            Err(e) => {
                warn!(tick, symbol = %symbol, error = %e, "Price fetch failed, skipping tick");
                return TickOutcome::Skipped { tick, reason: e };
            }
        };
        self.state.last_price = Some(price);

        let change = self.state.tracker.update(price);
        if change.flipped() {
            info!(tick, from = %change.previous, to = %change.current, price = %price, "Direction flipped");
        } else if change.changed() {
            info!(tick, direction = %change.current, price = %price, "Direction established");
        }

        let (position_changed, position_error) = match gateway.fetch_aggregate_position(&symbol) {
            Ok(agg) => (Some(self.state.positions.sync(agg.size, agg.side)), None),
            Err(e) => {
                warn!(tick, error = %e, "Position fetch failed, keeping last known aggregate");
                (None, Some(e))
            }
        };

        let ladder_rebuilt =
            !self.state.ladder_built || change.changed() || position_changed == Some(true);
        if ladder_rebuilt {
            self.state.ladder = ladder::rebuild(
                price,
                self.state.positions.tracked_size(),
                change.current,
                &self.config,
            );
            self.state.ladder_built = true;
            info!(
                tick,
                anchor = %price,
                direction = %change.current,
                entries = self.state.ladder.len(),
                total = %self.state.ladder.total_size(),
                next = ?self.state.ladder.next_trigger().map(|p| p.to_string()),
                "Ladder rebuilt"
            );
        }

        let dispatch = self.dispatcher.evaluate(
            gateway,
            price,
            change.current,
            &mut self.state.ladder,
            &mut self.state.positions,
            &self.stops,
        );

        let stops = self
            .stops
            .scan(gateway, &symbol, price, &mut self.state.positions);

        let report = TickReport {
            tick,
            price,
            direction: change.current,
            direction_changed: change.changed(),
            position_changed,
            position_error,
            ladder_rebuilt,
            ladder_len: self.state.ladder.len(),
            dispatch,
            stops,
            position_size: self.state.positions.tracked_size(),
        };

        info!(
            tick,
            price = %price,
            direction = %report.direction,
            position = %report.position_size,
            ladder = report.ladder_len,
            fills = report.dispatch.fills.len(),
            stops_moved = report.stops.moved.len(),
            failures = report.failure_count(),
            "Tick complete"
        );

        TickOutcome::Completed(Box::new(report))
    }

    /// Ids of positions still waiting for their one-shot stop tightening
    pub fn pending_tightening(&self) -> Vec<PositionId> {
        self.state
            .positions
            .iter()
            .filter(|p| !p.stop_loss_moved())
            .map(|p| p.id.clone())
            .collect()
    }
}
