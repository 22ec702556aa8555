//! Stop-loss placement and one-shot tightening
//!
//! Every new position gets a stop one `delta` behind its entry. Once price has
//! moved a full `delta` in favour, the stop is pulled up (long) or down (short)
//! to lock in a `mini_delta`-wide band and is never adjusted again.

use tracing::{info, warn};

use crate::book::{PositionBook, PositionId};
use crate::error::GatewayError;
use crate::gateway::MarketGateway;
use crate::{Money, PositionSide, Symbol};

/// Outcome of one trailing scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StopScanReport {
    /// Positions whose stop the gateway confirmed this scan
    pub moved: Vec<(PositionId, Money)>,
    /// Qualifying positions whose update failed; retried next scan
    pub failed: Vec<(PositionId, GatewayError)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopLossManager {
    delta: Money,
    mini_delta: Money,
}

impl StopLossManager {
    pub fn new(delta: Money, mini_delta: Money) -> Self {
        Self { delta, mini_delta }
    }

    pub fn initial_stop(&self, side: PositionSide, entry_price: Money) -> Money {
        match side {
            PositionSide::Long => entry_price - self.delta,
            PositionSide::Short => entry_price + self.delta,
        }
    }

    /// Tightened stop level if the position qualifies at `current_price`
    pub fn trailing_stop(
        &self,
        side: PositionSide,
        entry_price: Money,
        already_moved: bool,
        current_price: Money,
    ) -> Option<Money> {
        if already_moved {
            return None;
        }
        match side {
            PositionSide::Long if current_price >= entry_price + self.delta => {
                Some(entry_price - self.delta + self.mini_delta)
            }
            PositionSide::Short if current_price <= entry_price - self.delta => {
                Some(entry_price + self.delta - self.mini_delta)
            }
            _ => None,
        }
    }

    /// Place the initial stop for a freshly recorded position.
    ///
    /// The stop level is stored on the record only once the gateway confirms.
    pub fn place_initial<G: MarketGateway + ?Sized>(
        &self,
        gateway: &mut G,
        symbol: &Symbol,
        book: &mut PositionBook,
        id: &PositionId,
    ) -> Result<Money, GatewayError> {
        let position = book
            .get_mut(id)
            .ok_or_else(|| GatewayError::Rejected(format!("unknown position {}", id)))?;
        let stop = self.initial_stop(position.side, position.entry_price);

        gateway.set_stop_loss(symbol, position.side.entry_side(), stop)?;
        position.stop_price = Some(stop);
        info!(
            position = %id,
            side = %position.side,
            entry = %position.entry_price,
            stop = %stop,
            "Initial stop placed"
        );
        Ok(stop)
    }

    /// Tighten stops on every qualifying position.
    ///
    /// A position is only marked moved after the gateway accepts the new
    /// level; a rejected update leaves it eligible for the next scan.
    pub fn scan<G: MarketGateway + ?Sized>(
        &self,
        gateway: &mut G,
        symbol: &Symbol,
        current_price: Money,
        book: &mut PositionBook,
    ) -> StopScanReport {
        let mut report = StopScanReport::default();

        for id in book.ids() {
            let Some(position) = book.get_mut(&id) else {
                continue;
            };
            let Some(new_stop) = self.trailing_stop(
                position.side,
                position.entry_price,
                position.stop_loss_moved(),
                current_price,
            ) else {
                continue;
            };

            match gateway.set_stop_loss(symbol, position.side.entry_side(), new_stop) {
                Ok(_) => {
                    position.mark_stop_moved(new_stop);
                    info!(
                        position = %id,
                        side = %position.side,
                        entry = %position.entry_price,
                        price = %current_price,
                        stop = %new_stop,
                        "Stop loss tightened"
                    );
                    report.moved.push((id, new_stop));
                }
                Err(e) => {
                    warn!(position = %id, stop = %new_stop, error = %e, "Stop loss update failed");
                    report.failed.push((id, e));
                }
            }
        }

        report
    }
}
