//! Trend detection against a fixed reference price
//!
//! The first observed price decides the initial direction. After that the
//! direction only flips once price crosses `reference ± delta` against the
//! current trend, giving a hysteresis band of width `2 * delta` around the
//! reference. The reference is never moved.

use crate::{Direction, Money};

/// Result of a direction update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectionChange {
    pub previous: Direction,
    pub current: Direction,
}

impl DirectionChange {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }

    /// True for Up -> Down or Down -> Up, not for the initial classification
    pub fn flipped(&self) -> bool {
        self.changed() && self.previous != Direction::Undetermined
    }
}

#[derive(Debug, Clone)]
pub struct DirectionTracker {
    reference_price: Money,
    delta: Money,
    direction: Direction,
}

impl DirectionTracker {
    pub fn new(reference_price: Money, delta: Money) -> Self {
        Self {
            reference_price,
            delta,
            direction: Direction::Undetermined,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn reference_price(&self) -> Money {
        self.reference_price
    }

    pub fn update(&mut self, current_price: Money) -> DirectionChange {
        let previous = self.direction;
        self.direction = next_direction(previous, current_price, self.reference_price, self.delta);
        DirectionChange {
            previous,
            current: self.direction,
        }
    }
}

fn next_direction(current: Direction, price: Money, reference: Money, delta: Money) -> Direction {
    match current {
        Direction::Undetermined => {
            if price > reference {
                Direction::Up
            } else {
                Direction::Down
            }
        }
        Direction::Up if price < reference - delta => Direction::Down,
        Direction::Down if price > reference + delta => Direction::Up,
        unchanged => unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tracker() -> DirectionTracker {
        DirectionTracker::new(Money::new(dec!(147)), Money::new(dec!(3)))
    }

    #[test]
    fn test_initial_classification() {
        let mut up = tracker();
        let change = up.update(Money::new(dec!(150)));
        assert_eq!(change.current, Direction::Up);
        assert!(change.changed());
        assert!(!change.flipped());

        // Exactly at the reference counts as Down
        let mut down = tracker();
        assert_eq!(down.update(Money::new(dec!(147))).current, Direction::Down);
    }

    #[test]
    fn test_up_holds_inside_band() {
        let mut t = tracker();
        t.update(Money::new(dec!(150)));
        t.update(Money::new(dec!(151)));
        assert_eq!(t.direction(), Direction::Up);

        // 144 is exactly reference - delta, not below it
        let change = t.update(Money::new(dec!(144)));
        assert_eq!(change.current, Direction::Up);
        assert!(!change.changed());
    }

    #[test]
    fn test_up_flips_below_band() {
        let mut t = tracker();
        t.update(Money::new(dec!(150)));
        t.update(Money::new(dec!(151)));
        let change = t.update(Money::new(dec!(143)));
        assert_eq!(change.previous, Direction::Up);
        assert_eq!(change.current, Direction::Down);
        assert!(change.flipped());
    }

    #[test]
    fn test_down_flips_above_band() {
        let mut t = tracker();
        t.update(Money::new(dec!(140)));
        assert_eq!(t.update(Money::new(dec!(150))).current, Direction::Down);
        assert_eq!(t.update(Money::new(dec!(150.01))).current, Direction::Up);
    }

    #[test]
    fn test_reference_never_moves() {
        let mut t = tracker();
        for p in [dec!(150), dec!(200), dec!(300), dec!(145)] {
            t.update(Money::new(p));
        }
        assert_eq!(t.reference_price(), Money::new(dec!(147)));
        // 145 is above 144, so still Up despite the large pullback from 300
        assert_eq!(t.direction(), Direction::Up);
    }
}
