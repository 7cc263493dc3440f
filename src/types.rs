// 1.0: all the primitives live here. nothing in the engine works without these types.
// IDs, direction, signed volume, timestamps. each is a newtype so the compiler catches type mixups.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradingConditionId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId(pub u32);

// Buy = profit when price goes up. Sell = profit when price goes down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Buy => dec!(1),
            Direction::Sell => dec!(-1),
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }
}

// 1.1: signed volume: positive = buy, negative = sell. the sign is the direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedVolume(Decimal);

impl SignedVolume {
    pub fn new(volume: Decimal) -> Self {
        Self(volume)
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn from_direction(direction: Direction, abs_volume: Decimal) -> Self {
        Self(direction.sign() * abs_volume.abs())
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn abs(&self) -> Decimal {
        self.0.abs()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_buy(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_sell(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn direction(&self) -> Option<Direction> {
        if self.is_buy() {
            Some(Direction::Buy)
        } else if self.is_sell() {
            Some(Direction::Sell)
        } else {
            None
        }
    }

    pub fn add(&self, delta: Decimal) -> Self {
        Self(self.0 + delta)
    }
}

impl fmt::Display for SignedVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Sum for SignedVolume {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, v| Self(acc.0 + v.0))
    }
}

// 1.2: millisecond timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn elapsed_seconds(&self, other: &Timestamp) -> Decimal {
        let diff_ms = (other.0 - self.0).abs();
        Decimal::new(diff_ms, 0) / dec!(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn signed_volume_direction() {
        let buy = SignedVolume::from_direction(Direction::Buy, dec!(10));
        assert!(buy.is_buy());
        assert_eq!(buy.abs(), dec!(10));
        assert_eq!(buy.direction(), Some(Direction::Buy));

        let sell = SignedVolume::from_direction(Direction::Sell, dec!(10));
        assert!(sell.is_sell());
        assert_eq!(sell.value(), dec!(-10));
        assert_eq!(sell.direction(), Some(Direction::Sell));

        assert_eq!(SignedVolume::zero().direction(), None);
    }

    #[test]
    fn direction_sign_and_opposite() {
        assert_eq!(Direction::Buy.sign(), dec!(1));
        assert_eq!(Direction::Sell.sign(), dec!(-1));
        assert_eq!(Direction::Buy.opposite(), Direction::Sell);
    }

    #[test]
    fn elapsed_seconds() {
        let open = Timestamp::from_millis(1_000);
        let now = Timestamp::from_millis(32_000);
        assert_eq!(open.elapsed_seconds(&now), dec!(31));
    }
}
