//! Ladder of pending entries
//!
//! Remaining capacity (`max_position_size - current_position_size`) is split
//! into `ceil(remaining / lot_size)` equal slices, one per grid step away from
//! the anchor price in the trend direction. Equal slicing makes the ladder sum
//! to exactly `remaining` instead of leaving a partial lot at the tail.

use serde::{Deserialize, Serialize};

use crate::config::BotConfig;
use crate::{Direction, Money};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LadderEntry {
    pub trigger_price: Money,
    pub size: Money,
}

/// Pending entries, ordered away from `anchor_price` in `direction`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ladder {
    direction: Direction,
    anchor_price: Money,
    entries: Vec<LadderEntry>,
}

impl Ladder {
    pub fn empty(direction: Direction, anchor_price: Money) -> Self {
        Self {
            direction,
            anchor_price,
            entries: Vec::new(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn anchor_price(&self) -> Money {
        self.anchor_price
    }

    pub fn entries(&self) -> &[LadderEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_size(&self) -> Money {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Remove a consumed entry, preserving the order of the rest
    pub fn remove(&mut self, index: usize) -> Option<LadderEntry> {
        if index < self.entries.len() {
            Some(self.entries.remove(index))
        } else {
            None
        }
    }

    /// Nearest pending level, if any
    pub fn next_trigger(&self) -> Option<Money> {
        self.entries.first().map(|e| e.trigger_price)
    }
}

/// Compute the ladder for the given state. Pure and deterministic.
///
/// Returns an empty ladder when capacity is exhausted or no direction has been
/// established yet.
pub fn rebuild(
    current_price: Money,
    current_position_size: Money,
    direction: Direction,
    config: &BotConfig,
) -> Ladder {
    let remaining = config.max_position_size - current_position_size;

    let step = match direction {
        Direction::Up => config.delta,
        Direction::Down => -config.delta,
        Direction::Undetermined => return Ladder::empty(direction, current_price),
    };

    if !remaining.is_positive() {
        return Ladder::empty(direction, current_price);
    }

    let count = match (remaining / config.lot_size).ceil().to_usize() {
        Some(n) if n > 0 => n,
        _ => {
            tracing::warn!(
                remaining = %remaining,
                lot_size = %config.lot_size,
                "Cannot derive ladder entry count"
            );
            return Ladder::empty(direction, current_price);
        }
    };
    let entry_size = remaining / Money::from_usize(count);

    let entries = (1..=count)
        .map(|i| LadderEntry {
            trigger_price: current_price + step * Money::from_usize(i),
            size: entry_size,
        })
        .collect();

    Ladder {
        direction,
        anchor_price: current_price,
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rust_decimal_macros::dec;

    fn config(lot: Money, max: Money) -> BotConfig {
        BotConfig::new(
            "SOLUSDT",
            Money::new(dec!(147)),
            Money::new(dec!(3)),
            Money::new(dec!(1)),
            lot,
            max,
        )
        .unwrap()
    }

    #[test]
    fn test_full_capacity_ladder_up() {
        let cfg = config(Money::new(dec!(0.1)), Money::ONE);
        let ladder = rebuild(Money::new(dec!(150)), Money::ZERO, Direction::Up, &cfg);

        assert_eq!(ladder.len(), 10);
        assert!(ladder.entries().iter().all(|e| e.size == Money::new(dec!(0.1))));
        assert_eq!(ladder.entries()[0].trigger_price, Money::new(dec!(153)));
        assert_eq!(ladder.entries()[9].trigger_price, Money::new(dec!(180)));
        assert_eq!(ladder.total_size(), Money::ONE);
    }

    #[test]
    fn test_ladder_down_descends() {
        let cfg = config(Money::new(dec!(0.1)), Money::ONE);
        let ladder = rebuild(Money::new(dec!(140)), Money::ZERO, Direction::Down, &cfg);

        let prices: Vec<Money> = ladder.entries().iter().map(|e| e.trigger_price).collect();
        assert_eq!(prices[0], Money::new(dec!(137)));
        assert!(prices.windows(2).all(|w| w[1] < w[0]));
    }

    #[test]
    fn test_partial_lot_is_sliced_evenly() {
        let cfg = config(Money::new(dec!(0.1)), Money::ONE);
        let ladder = rebuild(Money::new(dec!(150)), Money::new(dec!(0.75)), Direction::Up, &cfg);

        assert_eq!(ladder.len(), 3);
        for entry in ladder.entries() {
            assert_abs_diff_eq!(entry.size.to_f64(), 0.083333, epsilon = 1e-5);
        }
        assert_abs_diff_eq!(ladder.total_size().to_f64(), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_exhausted_capacity_is_empty() {
        let cfg = config(Money::new(dec!(0.1)), Money::ONE);
        assert!(rebuild(Money::new(dec!(150)), Money::ONE, Direction::Up, &cfg).is_empty());
        assert!(rebuild(Money::new(dec!(150)), Money::new(dec!(1.2)), Direction::Down, &cfg).is_empty());
    }

    #[test]
    fn test_undetermined_direction_is_empty() {
        let cfg = config(Money::new(dec!(0.1)), Money::ONE);
        let ladder = rebuild(Money::new(dec!(150)), Money::ZERO, Direction::Undetermined, &cfg);
        assert!(ladder.is_empty());
        assert_eq!(ladder.next_trigger(), None);
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let cfg = config(Money::new(dec!(0.3)), Money::new(dec!(2)));
        let a = rebuild(Money::new(dec!(151.5)), Money::new(dec!(0.4)), Direction::Up, &cfg);
        let b = rebuild(Money::new(dec!(151.5)), Money::new(dec!(0.4)), Direction::Up, &cfg);
        assert_eq!(a, b);
    }

    #[test]
    fn test_remove_keeps_order() {
        let cfg = config(Money::new(dec!(0.5)), Money::new(dec!(1.5)));
        let mut ladder = rebuild(Money::new(dec!(150)), Money::ZERO, Direction::Up, &cfg);
        let removed = ladder.remove(0).unwrap();
        assert_eq!(removed.trigger_price, Money::new(dec!(153)));
        assert_eq!(ladder.next_trigger(), Some(Money::new(dec!(156))));
        assert!(ladder.remove(5).is_none());
    }
}
