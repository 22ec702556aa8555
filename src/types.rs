//! Core data types used across the grid controller

use serde::{Deserialize, Serialize};

/// Trading pair symbol using Arc<str> for cheap cloning
///
/// Symbols are passed to every gateway call on every tick, so clones must stay O(1).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order side sent to the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Side of an open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Order side that opens (or adds to) a position on this side
    pub fn entry_side(self) -> Side {
        match self {
            PositionSide::Long => Side::Buy,
            PositionSide::Short => Side::Sell,
        }
    }
}

impl From<Side> for PositionSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => PositionSide::Long,
            Side::Sell => PositionSide::Short,
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Long => write!(f, "long"),
            PositionSide::Short => write!(f, "short"),
        }
    }
}

/// Trend classification relative to the reference price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// No price observed yet
    #[default]
    Undetermined,
    Up,
    Down,
}

impl Direction {
    /// Order side used for ladder entries in this direction
    pub fn entry_side(self) -> Option<Side> {
        match self {
            Direction::Up => Some(Side::Buy),
            Direction::Down => Some(Side::Sell),
            Direction::Undetermined => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Undetermined => write!(f, "undetermined"),
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(format!("unknown direction '{}', expected 'up' or 'down'", other)),
        }
    }
}

// ============================================================================
// Money Type - Precise Decimal Arithmetic for Prices and Sizes
// ============================================================================

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// Decimal value for prices, sizes and grid distances.
///
/// Ladder levels are sums of `delta` steps; in f64 `147 + 3 * 0.1` drifts and a
/// trigger comparison can miss by one ulp. Decimal keeps levels exact.
///
/// # Example
/// ```
/// use grid_bot::Money;
/// use rust_decimal_macros::dec;
/// let price = Money::new(dec!(147));
/// let delta = Money::new(dec!(3));
/// assert_eq!(price + delta * Money::from_i64(2), Money::new(dec!(153)));
/// ```
#[derive(Debug, Clone, Copy, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub const ONE: Money = Money(Decimal::ONE);

    pub const fn new(value: Decimal) -> Self {
        Money(value)
    }

    /// Create from f64
    /// Note: NaN and infinities collapse to zero
    pub fn from_f64(value: f64) -> Self {
        Money(Decimal::try_from(value).unwrap_or_else(|_| {
            if value.is_nan() || value.is_infinite() {
                Decimal::ZERO
            } else {
                Decimal::from_f64_retain(value).unwrap_or(Decimal::ZERO)
            }
        }))
    }

    pub fn to_f64(self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }

    pub fn from_i64(value: i64) -> Self {
        Money(Decimal::from(value))
    }

    pub fn from_usize(value: usize) -> Self {
        Money(Decimal::from(value))
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn max(self, other: Self) -> Self {
        Money(self.0.max(other.0))
    }

    pub fn min(self, other: Self) -> Self {
        Money(self.0.min(other.0))
    }

    /// Smallest integer greater than or equal to the value
    pub fn ceil(self) -> Self {
        Money(self.0.ceil())
    }

    /// Integer value as usize, None if negative or fractional part is non-zero
    pub fn to_usize(self) -> Option<usize> {
        if self.0.fract().is_zero() {
            self.0.to_usize()
        } else {
            None
        }
    }

    pub fn round_dp(self, dp: u32) -> Self {
        Money(self.0.round_dp(dp))
    }

    pub fn inner(self) -> Decimal {
        self.0
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.normalize(), f)
    }
}

impl std::str::FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str_exact(s.trim()).map(Money)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Money {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl std::hash::Hash for Money {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Mul for Money {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self::Output {
        Money(self.0 * rhs.0)
    }
}

impl Div for Money {
    type Output = Self;
    fn div(self, rhs: Self) -> Self::Output {
        if rhs.0.is_zero() {
            Money::ZERO
        } else {
            Money(self.0 / rhs.0)
        }
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money(value)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Money::from_i64(value)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + x)
    }
}

impl<'a> std::iter::Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + *x)
    }
}

#[cfg(test)]
mod money_tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_grid_steps_are_exact() {
        let anchor = Money::new(dec!(147.1));
        let delta = Money::new(dec!(0.1));
        let level = anchor + delta * Money::from_i64(3);
        assert_eq!(level, Money::new(dec!(147.4)));
    }

    #[test]
    fn test_money_ceil_and_to_usize() {
        let count = (Money::new(dec!(0.25)) / Money::new(dec!(0.1))).ceil();
        assert_eq!(count.to_usize(), Some(3));
        assert_eq!(Money::new(dec!(2.5)).to_usize(), None);
        assert_eq!(Money::new(dec!(-1)).to_usize(), None);
    }

    #[test]
    fn test_money_div_by_zero() {
        assert_eq!(Money::from_i64(100) / Money::ZERO, Money::ZERO);
    }

    #[test]
    fn test_money_sign_checks() {
        assert!(Money::ONE.is_positive());
        assert!(!Money::ZERO.is_positive());
        assert!(!Money::ZERO.is_negative());
        assert!((-Money::ONE).is_negative());
    }

    #[test]
    fn test_money_parse_and_display() {
        let m: Money = "148.000".parse().unwrap();
        assert_eq!(m, Money::from_i64(148));
        assert_eq!(m.to_string(), "148");
        assert!("abc".parse::<Money>().is_err());
    }

    #[test]
    fn test_money_serde_accepts_numbers_and_strings() {
        let from_num: Money = serde_json::from_str("0.1").unwrap();
        let from_str: Money = serde_json::from_str("\"0.1\"").unwrap();
        assert_eq!(from_num, from_str);
        assert_eq!(from_num, Money::new(dec!(0.1)));
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("UP".parse::<Direction>().unwrap(), Direction::Up);
        assert_eq!("down".parse::<Direction>().unwrap(), Direction::Down);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_side_conversions() {
        assert_eq!(PositionSide::from(Side::Buy), PositionSide::Long);
        assert_eq!(PositionSide::Short.entry_side(), Side::Sell);
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Direction::Up.entry_side(), Some(Side::Buy));
        assert_eq!(Direction::Undetermined.entry_side(), None);
    }
}
