//! Market gateway contract
//!
//! The controller never talks to an exchange directly. Everything it needs
//! (price, aggregate position, orders, stops) goes through [`MarketGateway`],
//! implemented by an exchange adapter or by [`crate::paper::PaperGateway`].
//!
//! All calls are synchronous and may block for as long as the adapter's own
//! timeout allows.

use serde::{Deserialize, Serialize};

use crate::error::GatewayResult;
use crate::{Money, PositionSide, Side, Symbol};

/// Net position for one symbol as reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatePosition {
    pub size: Money,
    /// `None` when flat
    pub side: Option<PositionSide>,
}

impl AggregatePosition {
    pub fn flat() -> Self {
        Self {
            size: Money::ZERO,
            side: None,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.side.is_none() || self.size.is_zero()
    }
}

/// Resting order on the exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub id: String,
    pub side: Side,
    pub price: Option<Money>,
    pub size: Money,
}

/// Exchange reference for an accepted market order
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderRef {
    pub id: String,
    /// Executed price when the gateway reports one
    pub fill_price: Option<Money>,
}

/// Confirmation of a stop-loss update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopAck {
    pub stop_price: Money,
}

/// External collaborator providing market data and order routing
pub trait MarketGateway {
    fn fetch_price(&mut self, symbol: &Symbol) -> GatewayResult<Money>;

    fn fetch_aggregate_position(&mut self, symbol: &Symbol) -> GatewayResult<AggregatePosition>;

    fn fetch_open_orders(&mut self, symbol: &Symbol) -> GatewayResult<Vec<OpenOrder>>;

    fn place_market_order(
        &mut self,
        symbol: &Symbol,
        side: Side,
        size: Money,
    ) -> GatewayResult<OrderRef>;

    /// Set the stop for the position opened by orders on `side`
    fn set_stop_loss(
        &mut self,
        symbol: &Symbol,
        side: Side,
        stop_price: Money,
    ) -> GatewayResult<StopAck>;
}

impl<G: MarketGateway + ?Sized> MarketGateway for Box<G> {
    fn fetch_price(&mut self, symbol: &Symbol) -> GatewayResult<Money> {
        (**self).fetch_price(symbol)
    }

    fn fetch_aggregate_position(&mut self, symbol: &Symbol) -> GatewayResult<AggregatePosition> {
        (**self).fetch_aggregate_position(symbol)
    }

    fn fetch_open_orders(&mut self, symbol: &Symbol) -> GatewayResult<Vec<OpenOrder>> {
        (**self).fetch_open_orders(symbol)
    }

    fn place_market_order(
        &mut self,
        symbol: &Symbol,
        side: Side,
        size: Money,
    ) -> GatewayResult<OrderRef> {
        (**self).place_market_order(symbol, side, size)
    }

    fn set_stop_loss(
        &mut self,
        symbol: &Symbol,
        side: Side,
        stop_price: Money,
    ) -> GatewayResult<StopAck> {
        (**self).set_stop_loss(symbol, side, stop_price)
    }
}
