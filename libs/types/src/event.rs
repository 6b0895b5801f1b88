//! Feed events
//!
//! Two ingestion shapes share one union:
//! - `OrderEvent`: order-level (MBO) lifecycle event with order identity
//! - `LevelUpdate`: price-level (MBP) replace event without identity
//!
//! Wire events carry raw price/size so out-of-range values survive decoding
//! and are rejected by `validate()` before any book mutation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::ids::{OrderId, Symbol};
use crate::numeric::{Price, Quantity};
use crate::order::{EventKind, Side};

/// Order-level feed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    /// Upstream timestamp (opaque, typically epoch nanoseconds)
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub size: i64,
}

/// Validated view of an `OrderEvent`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckedOrder {
    pub price: Price,
    pub size: Quantity,
}

impl OrderEvent {
    pub fn new(
        timestamp: i64,
        kind: EventKind,
        order_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        price: Decimal,
        size: i64,
    ) -> Self {
        Self {
            timestamp,
            kind,
            order_id: OrderId::new(order_id),
            symbol: Symbol::new(symbol),
            side,
            price,
            size,
        }
    }

    /// Check ranges and identity; never mutates anything.
    ///
    /// A NEW must carry a positive size. CANCEL ignores price and size
    /// beyond the non-negative check.
    pub fn validate(&self) -> Result<CheckedOrder, ValidationError> {
        if self.symbol.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        if self.order_id.is_empty() {
            return Err(ValidationError::EmptyOrderId);
        }
        if self.order_id.is_synthetic() {
            return Err(ValidationError::ReservedOrderId(self.order_id.to_string()));
        }
        let price = Price::try_new(self.price)?;
        let size = Quantity::try_from_raw(self.size)?;
        if self.kind == EventKind::New && size.is_zero() {
            return Err(ValidationError::ZeroSize { kind: self.kind });
        }
        Ok(CheckedOrder { price, size })
    }
}

/// Price-level replace event. `size == 0` removes the level.
///
/// Unknown fields are refused so a malformed order event can never fall
/// through the untagged union and land as a level replace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LevelUpdate {
    pub symbol: Symbol,
    pub side: Side,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub size: i64,
}

impl LevelUpdate {
    pub fn new(symbol: impl Into<String>, side: Side, price: Decimal, size: i64) -> Self {
        Self {
            symbol: Symbol::new(symbol),
            side,
            price,
            size,
        }
    }

    pub fn validate(&self) -> Result<(Price, Quantity), ValidationError> {
        if self.symbol.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        Ok((Price::try_new(self.price)?, Quantity::try_from_raw(self.size)?))
    }
}

/// Any event the book accepts
///
/// Untagged: an object with `type`/`order_id` decodes as an order event,
/// otherwise as a level update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeedEvent {
    Order(OrderEvent),
    Level(LevelUpdate),
}

impl FeedEvent {
    pub fn symbol(&self) -> &Symbol {
        match self {
            FeedEvent::Order(e) => &e.symbol,
            FeedEvent::Level(e) => &e.symbol,
        }
    }

    pub fn side(&self) -> Side {
        match self {
            FeedEvent::Order(e) => e.side,
            FeedEvent::Level(e) => e.side,
        }
    }
}

impl From<OrderEvent> for FeedEvent {
    fn from(e: OrderEvent) -> Self {
        FeedEvent::Order(e)
    }
}

impl From<LevelUpdate> for FeedEvent {
    fn from(e: LevelUpdate) -> Self {
        FeedEvent::Level(e)
    }
}
