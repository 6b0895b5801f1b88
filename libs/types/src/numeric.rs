//! Validated price and quantity types
//!
//! Prices are exact decimals so they can key ordered price-level maps
//! without float comparison issues. On the wire they are plain JSON numbers.
//! Both types are non-negative by construction.

use std::fmt;
use std::ops::{Add, Sub};

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::ValidationError;

/// Non-negative price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Price(Decimal);

impl Price {
    pub const ZERO: Price = Price(Decimal::ZERO);

    /// Create a price, rejecting negative values
    pub fn try_new(value: Decimal) -> Result<Self, ValidationError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(ValidationError::NegativePrice(value));
        }
        Ok(Self(value.normalize()))
    }

    /// Whole-number price, mostly useful in tests and generators
    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    /// Parse a decimal string such as "180.25"
    pub fn from_str_exact(s: &str) -> Result<Self, ValidationError> {
        let value = s
            .trim()
            .parse::<Decimal>()
            .map_err(|_| ValidationError::MalformedNumber(s.to_string()))?;
        Self::try_new(value)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        rust_decimal::serde::float::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = rust_decimal::serde::float::deserialize(deserializer)?;
        Price::try_new(value).map_err(serde::de::Error::custom)
    }
}

/// Resident order size (always non-negative)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u64);

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);

    /// Largest size a single event may carry. Level totals are sums of
    /// resident sizes, and at this bound no realistic queue can push one
    /// past `u64::MAX`.
    pub const MAX: Quantity = Quantity(u32::MAX as u64);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Convert a raw wire size, rejecting negative or oversized values
    pub fn try_from_raw(value: i64) -> Result<Self, ValidationError> {
        let size = u64::try_from(value).map_err(|_| ValidationError::NegativeSize(value))?;
        if size > Self::MAX.0 {
            return Err(ValidationError::SizeTooLarge(value));
        }
        Ok(Self(size))
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn saturating_sub(self, other: Quantity) -> Quantity {
        Quantity(self.0.saturating_sub(other.0))
    }

    pub fn min(self, other: Quantity) -> Quantity {
        Quantity(self.0.min(other.0))
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Quantity {
    type Output = Quantity;

    fn sub(self, rhs: Quantity) -> Quantity {
        self.saturating_sub(rhs)
    }
}

impl std::iter::Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Quantity {
        iter.fold(Quantity::ZERO, |acc, q| acc + q)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_negative_price_rejected() {
        let err = Price::try_new(Decimal::new(-1, 0)).unwrap_err();
        assert_eq!(err, ValidationError::NegativePrice(Decimal::new(-1, 0)));
        assert!(Price::try_new(Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_price_equality_ignores_scale() {
        let a = Price::from_str_exact("100.50").unwrap();
        let b = Price::from_str_exact("100.5").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "100.5");
    }

    #[test]
    fn test_price_serializes_as_number() {
        let p = Price::from_str_exact("180.25").unwrap();
        assert_eq!(serde_json::to_string(&p).unwrap(), "180.25");
        let back: Price = serde_json::from_str("180.25").unwrap();
        assert_eq!(back, p);
        let whole: Price = serde_json::from_str("99").unwrap();
        assert_eq!(whole, Price::from_u64(99));
    }

    #[test]
    fn test_negative_price_rejected_on_deserialize() {
        assert!(serde_json::from_str::<Price>("-3.5").is_err());
    }

    #[test]
    fn test_quantity_from_raw() {
        assert_eq!(Quantity::try_from_raw(7).unwrap().get(), 7);
        assert_eq!(
            Quantity::try_from_raw(-2),
            Err(ValidationError::NegativeSize(-2))
        );
    }

    #[test]
    fn test_quantity_limit() {
        let max = Quantity::MAX.get() as i64;
        assert_eq!(Quantity::try_from_raw(max), Ok(Quantity::MAX));
        assert_eq!(
            Quantity::try_from_raw(max + 1),
            Err(ValidationError::SizeTooLarge(max + 1))
        );
        assert_eq!(
            Quantity::try_from_raw(i64::MAX),
            Err(ValidationError::SizeTooLarge(i64::MAX))
        );
    }

    #[test]
    fn test_quantity_sub_saturates() {
        assert_eq!(Quantity::new(3) - Quantity::new(10), Quantity::ZERO);
    }

    proptest! {
        #[test]
        fn prop_price_order_matches_decimal(a in 0u32..1_000_000, b in 0u32..1_000_000) {
            let pa = Price::try_new(Decimal::new(a as i64, 2)).unwrap();
            let pb = Price::try_new(Decimal::new(b as i64, 2)).unwrap();
            prop_assert_eq!(pa.cmp(&pb), a.cmp(&b));
        }
    }
}
