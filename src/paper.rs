//! Paper trading gateway
//!
//! Simulates a single-symbol perpetual exchange in one-way position mode:
//! - prices come from a [`PriceFeed`] replayed one point per `fetch_price`
//! - market orders fill instantly at the last price and net into one position
//! - one position-level stop; crossing it flattens the position on the next price
//!
//! Failures can be injected per call type to exercise the controller's
//! recovery paths.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{AggregatePosition, MarketGateway, OpenOrder, OrderRef, StopAck};
use crate::{Money, PositionSide, Side, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricePoint {
    pub timestamp: Option<DateTime<Utc>>,
    pub price: Money,
}

#[derive(Debug, Deserialize)]
struct PriceRow {
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    price: String,
}

/// Finite sequence of prices consumed front to back
#[derive(Debug, Clone, Default)]
pub struct PriceFeed {
    points: VecDeque<PricePoint>,
}

impl PriceFeed {
    pub fn from_prices(prices: impl IntoIterator<Item = Money>) -> Self {
        Self {
            points: prices
                .into_iter()
                .map(|price| PricePoint {
                    timestamp: None,
                    price,
                })
                .collect(),
        }
    }

    /// Load a `timestamp,price` CSV. The timestamp column is optional (RFC 3339).
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open price file {}", path.display()))?;

        let mut points = VecDeque::new();
        for (line, row) in reader.deserialize::<PriceRow>().enumerate() {
            let row = row.with_context(|| format!("Bad price row {} in {}", line + 2, path.display()))?;
            let price: Money = row
                .price
                .parse()
                .with_context(|| format!("Bad price '{}' on row {}", row.price, line + 2))?;
            if !price.is_positive() {
                anyhow::bail!("Non-positive price {} on row {}", price, line + 2);
            }
            points.push_back(PricePoint {
                timestamp: row.timestamp,
                price,
            });
        }

        info!(path = %path.display(), points = points.len(), "Loaded price feed");
        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn next_point(&mut self) -> Option<PricePoint> {
        self.points.pop_front()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperFill {
    pub id: String,
    pub side: Side,
    pub size: Money,
    pub price: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PaperStop {
    /// Entry side of the position the stop protects
    side: Side,
    price: Money,
}

#[derive(Debug, Clone, Copy, Default)]
struct FailureBudget {
    prices: u32,
    positions: u32,
    orders: u32,
    stops: u32,
}

fn consume(budget: &mut u32) -> bool {
    if *budget > 0 {
        *budget -= 1;
        true
    } else {
        false
    }
}

pub struct PaperGateway {
    symbol: Symbol,
    feed: PriceFeed,
    last_price: Option<Money>,
    /// Long positive, short negative
    net: Money,
    stop: Option<PaperStop>,
    fills: Vec<PaperFill>,
    stop_history: Vec<Money>,
    stop_outs: u32,
    failures: FailureBudget,
}

impl PaperGateway {
    pub fn new(symbol: Symbol, feed: PriceFeed) -> Self {
        Self {
            symbol,
            feed,
            last_price: None,
            net: Money::ZERO,
            stop: None,
            fills: Vec::new(),
            stop_history: Vec::new(),
            stop_outs: 0,
            failures: FailureBudget::default(),
        }
    }

    /// Start with an existing position, e.g. one opened by hand
    pub fn with_position(mut self, side: PositionSide, size: Money) -> Self {
        self.net = match side {
            PositionSide::Long => size.abs(),
            PositionSide::Short => -size.abs(),
        };
        self
    }

    pub fn fail_next_prices(&mut self, n: u32) {
        self.failures.prices = n;
    }

    pub fn fail_next_positions(&mut self, n: u32) {
        self.failures.positions = n;
    }

    pub fn reject_next_orders(&mut self, n: u32) {
        self.failures.orders = n;
    }

    pub fn reject_next_stops(&mut self, n: u32) {
        self.failures.stops = n;
    }

    /// Change the position behind the controller's back
    pub fn adjust_position(&mut self, side: PositionSide, size: Money) {
        match side {
            PositionSide::Long => self.net += size,
            PositionSide::Short => self.net -= size,
        }
        if self.net.is_zero() {
            self.stop = None;
        }
    }

    pub fn remaining_prices(&self) -> usize {
        self.feed.len()
    }

    pub fn position(&self) -> AggregatePosition {
        AggregatePosition {
            size: self.net.abs(),
            side: self.side(),
        }
    }

    pub fn stop_price(&self) -> Option<Money> {
        self.stop.map(|s| s.price)
    }

    /// Every stop level the gateway accepted, in order
    pub fn stop_history(&self) -> &[Money] {
        &self.stop_history
    }

    pub fn fills(&self) -> &[PaperFill] {
        &self.fills
    }

    pub fn stop_outs(&self) -> u32 {
        self.stop_outs
    }

    fn side(&self) -> Option<PositionSide> {
        if self.net.is_positive() {
            Some(PositionSide::Long)
        } else if self.net.is_negative() {
            Some(PositionSide::Short)
        } else {
            None
        }
    }

    fn check_symbol(&self, symbol: &Symbol) -> GatewayResult<()> {
        if symbol == &self.symbol {
            Ok(())
        } else {
            Err(GatewayError::Rejected(format!("unknown symbol {}", symbol)))
        }
    }

    fn apply_stop(&mut self, price: Money) {
        let Some(stop) = self.stop else {
            return;
        };
        let hit = match self.side() {
            Some(PositionSide::Long) => price <= stop.price,
            Some(PositionSide::Short) => price >= stop.price,
            None => false,
        };
        if hit {
            info!(
                stop = %stop.price,
                price = %price,
                size = %self.net.abs(),
                "[PAPER] Stop loss hit, position closed"
            );
            self.net = Money::ZERO;
            self.stop = None;
            self.stop_outs += 1;
        }
    }
}

impl MarketGateway for PaperGateway {
    fn fetch_price(&mut self, symbol: &Symbol) -> GatewayResult<Money> {
        self.check_symbol(symbol)?;
        if consume(&mut self.failures.prices) {
            return Err(GatewayError::Unavailable("simulated ticker outage".to_string()));
        }
        let point = self
            .feed
            .next_point()
            .ok_or_else(|| GatewayError::Unavailable("price feed exhausted".to_string()))?;

        debug!(price = %point.price, timestamp = ?point.timestamp, "[PAPER] Price");
        self.last_price = Some(point.price);
        self.apply_stop(point.price);
        Ok(point.price)
    }

    fn fetch_aggregate_position(&mut self, symbol: &Symbol) -> GatewayResult<AggregatePosition> {
        self.check_symbol(symbol)?;
        if consume(&mut self.failures.positions) {
            return Err(GatewayError::Unavailable("simulated position outage".to_string()));
        }
        Ok(self.position())
    }

    fn fetch_open_orders(&mut self, symbol: &Symbol) -> GatewayResult<Vec<OpenOrder>> {
        self.check_symbol(symbol)?;
        Ok(self
            .stop
            .filter(|_| !self.net.is_zero())
            .map(|stop| OpenOrder {
                id: "paper-stop".to_string(),
                side: stop.side.opposite(),
                price: Some(stop.price),
                size: self.net.abs(),
            })
            .into_iter()
            .collect())
    }

    fn place_market_order(
        &mut self,
        symbol: &Symbol,
        side: Side,
        size: Money,
    ) -> GatewayResult<OrderRef> {
        self.check_symbol(symbol)?;
        if !size.is_positive() {
            return Err(GatewayError::Rejected(format!("invalid order size {}", size)));
        }
        if consume(&mut self.failures.orders) {
            return Err(GatewayError::Rejected("simulated order rejection".to_string()));
        }
        let price = self
            .last_price
            .ok_or_else(|| GatewayError::Unavailable("no market price yet".to_string()))?;

        let before = self.side();
        match side {
            Side::Buy => self.net += size,
            Side::Sell => self.net -= size,
        }
        if self.side() != before {
            // Reduced through zero or flattened: the old stop no longer applies
            self.stop = None;
        }

        let id = format!("paper-{}", self.fills.len() + 1);
        info!(id = %id, side = %side, size = %size, price = %price, "[PAPER] Market order filled");
        self.fills.push(PaperFill {
            id: id.clone(),
            side,
            size,
            price,
        });

        Ok(OrderRef {
            id,
            fill_price: Some(price),
        })
    }

    fn set_stop_loss(
        &mut self,
        symbol: &Symbol,
        side: Side,
        stop_price: Money,
    ) -> GatewayResult<StopAck> {
        self.check_symbol(symbol)?;
        if consume(&mut self.failures.stops) {
            return Err(GatewayError::Rejected("simulated stop rejection".to_string()));
        }
        match self.side() {
            Some(position_side) if position_side.entry_side() == side => {}
            Some(position_side) => {
                return Err(GatewayError::Rejected(format!(
                    "stop side {} does not match {} position",
                    side, position_side
                )))
            }
            None => return Err(GatewayError::Rejected("no open position".to_string())),
        }
        if !stop_price.is_positive() {
            return Err(GatewayError::Rejected(format!("invalid stop price {}", stop_price)));
        }

        self.stop = Some(PaperStop {
            side,
            price: stop_price,
        });
        self.stop_history.push(stop_price);
        debug!(side = %side, stop = %stop_price, "[PAPER] Stop set");
        Ok(StopAck { stop_price })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn gateway(prices: &[Money]) -> PaperGateway {
        PaperGateway::new(Symbol::new("SOLUSDT"), PriceFeed::from_prices(prices.iter().copied()))
    }

    #[test]
    fn test_feed_replays_then_exhausts() {
        let sym = Symbol::new("SOLUSDT");
        let mut gw = gateway(&[Money::from_i64(150), Money::from_i64(151)]);
        assert_eq!(gw.fetch_price(&sym).unwrap(), Money::from_i64(150));
        assert_eq!(gw.fetch_price(&sym).unwrap(), Money::from_i64(151));
        assert!(matches!(gw.fetch_price(&sym), Err(GatewayError::Unavailable(_))));
    }

    #[test]
    fn test_unknown_symbol_rejected() {
        let mut gw = gateway(&[Money::from_i64(150)]);
        let err = gw.fetch_price(&Symbol::new("BTCUSDT")).unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(_)));
    }

    #[test]
    fn test_orders_net_into_one_position() {
        let sym = Symbol::new("SOLUSDT");
        let mut gw = gateway(&[Money::from_i64(150)]);
        gw.fetch_price(&sym).unwrap();

        gw.place_market_order(&sym, Side::Buy, Money::new(dec!(0.3))).unwrap();
        gw.place_market_order(&sym, Side::Sell, Money::new(dec!(0.1))).unwrap();

        let pos = gw.fetch_aggregate_position(&sym).unwrap();
        assert_eq!(pos.size, Money::new(dec!(0.2)));
        assert_eq!(pos.side, Some(PositionSide::Long));
        assert_eq!(gw.fills().len(), 2);
    }

    #[test]
    fn test_order_before_first_price_unavailable() {
        let mut gw = gateway(&[]);
        let err = gw
            .place_market_order(&Symbol::new("SOLUSDT"), Side::Buy, Money::ONE)
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
    }

    #[test]
    fn test_stop_requires_matching_position() {
        let sym = Symbol::new("SOLUSDT");
        let mut gw = gateway(&[Money::from_i64(150)]);
        gw.fetch_price(&sym).unwrap();
        assert!(gw.set_stop_loss(&sym, Side::Buy, Money::from_i64(147)).is_err());

        gw.place_market_order(&sym, Side::Buy, Money::new(dec!(0.1))).unwrap();
        assert!(gw.set_stop_loss(&sym, Side::Sell, Money::from_i64(153)).is_err());
        assert!(gw.set_stop_loss(&sym, Side::Buy, Money::from_i64(147)).is_ok());
        assert_eq!(gw.fetch_open_orders(&sym).unwrap().len(), 1);
    }

    #[test]
    fn test_stop_hit_flattens_position() {
        let sym = Symbol::new("SOLUSDT");
        let mut gw = gateway(&[Money::from_i64(150), Money::from_i64(146)]);
        gw.fetch_price(&sym).unwrap();
        gw.place_market_order(&sym, Side::Buy, Money::new(dec!(0.1))).unwrap();
        gw.set_stop_loss(&sym, Side::Buy, Money::from_i64(147)).unwrap();

        gw.fetch_price(&sym).unwrap();
        assert!(gw.position().side.is_none());
        assert_eq!(gw.stop_outs(), 1);
        assert_eq!(gw.stop_price(), None);
        assert!(gw.fetch_open_orders(&sym).unwrap().is_empty());
    }

    #[test]
    fn test_injected_failures_are_consumed() {
        let sym = Symbol::new("SOLUSDT");
        let mut gw = gateway(&[Money::from_i64(150), Money::from_i64(151)]);
        gw.fail_next_prices(1);
        assert!(gw.fetch_price(&sym).is_err());
        assert_eq!(gw.fetch_price(&sym).unwrap(), Money::from_i64(150));

        gw.reject_next_orders(1);
        assert!(matches!(
            gw.place_market_order(&sym, Side::Buy, Money::ONE),
            Err(GatewayError::Rejected(_))
        ));
        assert!(gw.place_market_order(&sym, Side::Buy, Money::ONE).is_ok());
    }

    #[test]
    fn test_price_feed_from_csv() {
        let path = std::env::temp_dir().join(format!("grid_bot_feed_{}.csv", std::process::id()));
        std::fs::write(
            &path,
            "timestamp,price\n2024-11-01T00:00:00Z,147.5\n,148\n",
        )
        .unwrap();

        let feed = PriceFeed::from_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(feed.len(), 2);
        let mut gw = PaperGateway::new(Symbol::new("SOLUSDT"), feed);
        assert_eq!(gw.fetch_price(&Symbol::new("SOLUSDT")).unwrap(), Money::new(dec!(147.5)));
    }

    #[test]
    fn test_price_feed_rejects_bad_rows() {
        let path = std::env::temp_dir().join(format!("grid_bot_bad_{}.csv", std::process::id()));
        std::fs::write(&path, "timestamp,price\n,abc\n").unwrap();
        let result = PriceFeed::from_csv(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }
}
