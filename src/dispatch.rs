//! Trigger evaluation and fills
//!
//! Walks the ladder once per tick. Every triggered entry becomes a market
//! order in the trend direction; accepted orders are recorded in the
//! [`PositionBook`], get an initial stop, and leave the ladder. Rejected
//! orders stay in the ladder and are tried again on the next tick.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::book::{Position, PositionBook, PositionId};
use crate::error::GatewayError;
use crate::gateway::MarketGateway;
use crate::ladder::{Ladder, LadderEntry};
use crate::stop_loss::StopLossManager;
use crate::{Direction, Money, PositionSide, Side, Symbol};

/// Accepted ladder fill
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fill {
    pub position_id: PositionId,
    pub side: Side,
    pub trigger_price: Money,
    pub size: Money,
    /// Execution price reported by the gateway, if any
    pub fill_price: Option<Money>,
    /// Initial stop, `None` if placing it failed
    pub initial_stop: Option<Money>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    pub fills: Vec<Fill>,
    /// Entries whose order failed; still in the ladder
    pub failed_orders: Vec<(LadderEntry, GatewayError)>,
    /// Positions opened without a confirmed initial stop
    pub failed_stops: Vec<(PositionId, GatewayError)>,
}

/// Whether `entry` fires at `current_price` in `direction`
pub fn is_triggered(current_price: Money, direction: Direction, entry: &LadderEntry) -> bool {
    match direction {
        Direction::Up => current_price >= entry.trigger_price,
        Direction::Down => current_price <= entry.trigger_price,
        Direction::Undetermined => false,
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionDispatcher {
    symbol: Symbol,
}

impl ExecutionDispatcher {
    pub fn new(symbol: Symbol) -> Self {
        Self { symbol }
    }

    pub fn evaluate<G: MarketGateway + ?Sized>(
        &self,
        gateway: &mut G,
        current_price: Money,
        direction: Direction,
        ladder: &mut Ladder,
        book: &mut PositionBook,
        stops: &StopLossManager,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        let Some(side) = direction.entry_side() else {
            return report;
        };

        let mut index = 0;
        while index < ladder.len() {
            let entry = ladder.entries()[index];
            if !is_triggered(current_price, direction, &entry) {
                index += 1;
                continue;
            }

            debug!(
                trigger = %entry.trigger_price,
                size = %entry.size,
                price = %current_price,
                "Ladder entry triggered"
            );

            let order = match gateway.place_market_order(&self.symbol, side, entry.size) {
                Ok(order) => order,
                Err(e) => {
                    error!(
                        symbol = %self.symbol,
                        side = %side,
                        size = %entry.size,
                        trigger = %entry.trigger_price,
                        error = %e,
                        "Market order failed, entry kept for next tick"
                    );
                    report.failed_orders.push((entry, e));
                    index += 1;
                    continue;
                }
            };

            let id = PositionId::new(order.id.clone());
            let position = Position::new(id.clone(), entry.trigger_price, PositionSide::from(side), entry.size);
            if let Some(previous) = book.add(position) {
                warn!(position = %id, previous_size = %previous.size, "Gateway reused an order id; record replaced");
            }
            ladder.remove(index);

            info!(
                position = %id,
                side = %side,
                size = %entry.size,
                trigger = %entry.trigger_price,
                fill_price = ?order.fill_price.map(|p| p.to_string()),
                "Ladder entry filled"
            );

            let initial_stop = match stops.place_initial(gateway, &self.symbol, book, &id) {
                Ok(stop) => Some(stop),
                Err(e) => {
                    error!(position = %id, error = %e, "Initial stop placement failed");
                    report.failed_stops.push((id.clone(), e));
                    None
                }
            };

            report.fills.push(Fill {
                position_id: id,
                side,
                trigger_price: entry.trigger_price,
                size: entry.size,
                fill_price: order.fill_price,
                initial_stop,
            });
        }

        report
    }
}
