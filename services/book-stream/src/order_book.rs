//! Single-symbol order book
//!
//! Applies MBO events under price-time priority and keeps two structures in
//! lockstep: the per-side price level index (which owns every resident order)
//! and an order id lookup pointing at each order's (side, price) bucket.
//!
//! The book processes:
//! - NEW     → append to the tail of the (side, price) level
//! - CANCEL  → remove by id, delete the level if it empties
//! - MODIFY  → cancel then new (loses priority); unknown id degrades to NEW
//! - EXECUTE → reduce in place, fill capped at resident size
//! - Level updates → the level holds exactly one synthetic order
//!
//! Every event is validated in full before anything is mutated.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use types::errors::ValidationError;
use types::event::{FeedEvent, LevelUpdate, OrderEvent};
use types::ids::{OrderId, Symbol, SYNTHETIC_ID_PREFIX};
use types::numeric::{Price, Quantity};
use types::order::{EventKind, Side};

use crate::price_level::{BookSide, PriceLevel};

/// Why an event was rejected. No state changes when this is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApplyError {
    #[error("invalid event: {0}")]
    Validation(#[from] ValidationError),

    #[error("duplicate order id: {0}")]
    DuplicateOrderId(OrderId),

    #[error("unknown order id: {0}")]
    UnknownOrderId(OrderId),
}

/// MODIFY semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifyPolicy {
    /// Always cancel then re-insert at the tail of the level.
    #[default]
    CancelReplace,
    /// A size decrease at unchanged price and side is applied in place.
    KeepPriorityOnReduce,
}

impl FromStr for ModifyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "cancel_replace" => Ok(ModifyPolicy::CancelReplace),
            "keep_priority_on_reduce" => Ok(ModifyPolicy::KeepPriorityOnReduce),
            other => Err(format!("unknown modify policy: {}", other)),
        }
    }
}

/// Where a resident order lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Location {
    side: Side,
    price: Price,
}

/// Read-only view of a resident order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestingOrder {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub price: Price,
    pub size: Quantity,
}

/// Aggregated size at one price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelView {
    pub price: Price,
    pub size: Quantity,
}

/// Best bid and ask with the size resting at each best level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bba {
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    pub bid_depth: Quantity,
    pub ask_depth: Quantity,
}

/// Top-of-book depth, bids descending and asks ascending.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Depth {
    pub bids: Vec<LevelView>,
    pub asks: Vec<LevelView>,
}

/// Every level on both sides plus the resident order count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub symbol: Symbol,
    pub bids: Vec<LevelView>,
    pub asks: Vec<LevelView>,
    pub total_orders: usize,
}

impl BookSnapshot {
    pub fn empty(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: Vec::new(),
            asks: Vec::new(),
            total_orders: 0,
        }
    }
}

/// Result of a read-only audit of the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub symbol: Symbol,
    pub valid: bool,
    pub violations: Vec<String>,
}

/// Order book for a single symbol.
#[derive(Debug, Clone)]
pub struct SymbolBook {
    symbol: Symbol,
    bids: BookSide,
    asks: BookSide,
    /// order id → bucket. Sizes live only in the level queues.
    orders: HashMap<OrderId, Location>,
    modify_policy: ModifyPolicy,
    last_timestamp: Option<i64>,
}

impl SymbolBook {
    pub fn new(symbol: Symbol) -> Self {
        Self::with_policy(symbol, ModifyPolicy::default())
    }

    pub fn with_policy(symbol: Symbol, modify_policy: ModifyPolicy) -> Self {
        Self {
            symbol,
            bids: BookSide::new(Side::Bid),
            asks: BookSide::new(Side::Ask),
            orders: HashMap::new(),
            modify_policy,
            last_timestamp: None,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Apply any feed event.
    pub fn apply(&mut self, event: &FeedEvent) -> Result<(), ApplyError> {
        match event {
            FeedEvent::Order(e) => self.apply_order(e),
            FeedEvent::Level(u) => self.apply_level(u),
        }
    }

    /// Apply an order-level event.
    pub fn apply_order(&mut self, event: &OrderEvent) -> Result<(), ApplyError> {
        let checked = event.validate()?;
        let id = &event.order_id;

        match event.kind {
            EventKind::New => self.insert_new(id, event.side, checked.price, checked.size)?,
            EventKind::Cancel => {
                self.remove_order(id)
                    .ok_or_else(|| ApplyError::UnknownOrderId(id.clone()))?;
            }
            EventKind::Modify => self.modify(event, checked.price, checked.size)?,
            EventKind::Execute => self.execute(id, checked.size)?,
        }

        self.last_timestamp = Some(event.timestamp);
        debug!(
            symbol = %self.symbol,
            kind = %event.kind,
            order_id = %id,
            "Applied order event"
        );
        Ok(())
    }

    /// Apply a price-level replace event.
    pub fn apply_level(&mut self, update: &LevelUpdate) -> Result<(), ApplyError> {
        let (price, size) = update.validate()?;

        // Any prior resident at this price is replaced, synthetic or not.
        if let Some(level) = self.side_mut(update.side).remove_level(price) {
            self.forget_level(&level);
        }

        if !size.is_zero() {
            let id = synthetic_id(update.side, price);
            self.side_mut(update.side).push_back(price, id.clone(), size);
            self.orders.insert(
                id,
                Location {
                    side: update.side,
                    price,
                },
            );
        }
        Ok(())
    }

    fn insert_new(
        &mut self,
        id: &OrderId,
        side: Side,
        price: Price,
        size: Quantity,
    ) -> Result<(), ApplyError> {
        if self.orders.contains_key(id) {
            return Err(ApplyError::DuplicateOrderId(id.clone()));
        }
        self.side_mut(side).push_back(price, id.clone(), size);
        self.orders.insert(id.clone(), Location { side, price });
        Ok(())
    }

    /// Remove a resident order from both structures, returning its size.
    fn remove_order(&mut self, id: &OrderId) -> Option<Quantity> {
        let location = self.orders.remove(id)?;
        self.side_mut(location.side).remove(location.price, id)
    }

    fn modify(&mut self, event: &OrderEvent, price: Price, size: Quantity) -> Result<(), ApplyError> {
        let id = &event.order_id;
        let Some(current) = self.orders.get(id).copied() else {
            if size.is_zero() {
                return Err(ValidationError::ZeroSize { kind: EventKind::Modify }.into());
            }
            debug!(symbol = %self.symbol, order_id = %id, "MODIFY for unknown order, treating as NEW");
            return self.insert_new(id, event.side, price, size);
        };

        // A zero price means the feed did not carry a new price.
        let target = Location {
            side: event.side,
            price: if price.is_zero() { current.price } else { price },
        };

        if size.is_zero() {
            self.remove_order(id);
            return Ok(());
        }

        if self.modify_policy == ModifyPolicy::KeepPriorityOnReduce && target == current {
            let resident = self
                .side(current.side)
                .level(current.price)
                .and_then(|level| level.size_of(id));
            if resident.is_some_and(|resident| size <= resident) {
                self.side_mut(current.side).set_size(current.price, id, size);
                return Ok(());
            }
        }

        self.remove_order(id);
        self.side_mut(target.side).push_back(target.price, id.clone(), size);
        self.orders.insert(id.clone(), target);
        Ok(())
    }

    fn execute(&mut self, id: &OrderId, exec_size: Quantity) -> Result<(), ApplyError> {
        let location = self
            .orders
            .get(id)
            .copied()
            .ok_or_else(|| ApplyError::UnknownOrderId(id.clone()))?;
        let resident = self
            .side(location.side)
            .level(location.price)
            .and_then(|level| level.size_of(id))
            .ok_or_else(|| ApplyError::UnknownOrderId(id.clone()))?;

        if exec_size > resident {
            warn!(
                symbol = %self.symbol,
                order_id = %id,
                exec_size = exec_size.get(),
                resident = resident.get(),
                "Execute size exceeds resident size, capping fill"
            );
        }

        let remaining = resident - exec_size.min(resident);
        if remaining.is_zero() {
            self.remove_order(id);
        } else {
            self.side_mut(location.side)
                .set_size(location.price, id, remaining);
        }
        Ok(())
    }

    fn forget_level(&mut self, level: &PriceLevel) {
        for entry in level.entries() {
            self.orders.remove(&entry.order_id);
        }
    }

    fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    /// Best bid/ask with the size at the best level only.
    pub fn best_bid_ask(&self) -> Bba {
        let bid = self.bids.best();
        let ask = self.asks.best();
        Bba {
            best_bid: bid.map(|(p, _)| p),
            best_ask: ask.map(|(p, _)| p),
            bid_depth: bid.map(|(_, l)| l.total()).unwrap_or_default(),
            ask_depth: ask.map(|(_, l)| l.total()).unwrap_or_default(),
        }
    }

    /// Up to `n` aggregated levels per side, best first.
    pub fn top(&self, n: usize) -> Depth {
        Depth {
            bids: collect_levels(&self.bids, n),
            asks: collect_levels(&self.asks, n),
        }
    }

    pub fn full_snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            symbol: self.symbol.clone(),
            bids: self.bid_levels(),
            asks: self.ask_levels(),
            total_orders: self.orders.len(),
        }
    }

    /// All bid levels, descending.
    pub fn bid_levels(&self) -> Vec<LevelView> {
        collect_levels(&self.bids, usize::MAX)
    }

    /// All ask levels, ascending.
    pub fn ask_levels(&self) -> Vec<LevelView> {
        collect_levels(&self.asks, usize::MAX)
    }

    pub fn order(&self, id: &OrderId) -> Option<RestingOrder> {
        let location = self.orders.get(id)?;
        let size = self
            .side(location.side)
            .level(location.price)?
            .size_of(id)?;
        Some(RestingOrder {
            order_id: id.clone(),
            symbol: self.symbol.clone(),
            side: location.side,
            price: location.price,
            size,
        })
    }

    /// Order ids at one price in time priority.
    pub fn level_queue(&self, side: Side, price: Price) -> Vec<OrderId> {
        self.side(side)
            .level(price)
            .map(PriceLevel::order_ids)
            .unwrap_or_default()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn level_count(&self) -> usize {
        self.bids.level_count() + self.asks.level_count()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.last_timestamp
    }

    /// Audit the book without changing it.
    ///
    /// Crossing is reported, never corrected: interleaved bid/ask events can
    /// cross the book transiently.
    pub fn verify(&self) -> VerifyReport {
        let mut violations = Vec::new();

        let bba = self.best_bid_ask();
        if let (Some(bid), Some(ask)) = (bba.best_bid, bba.best_ask) {
            if bid >= ask {
                violations.push(format!("crossed book: best bid {} >= best ask {}", bid, ask));
            }
        }

        let mut resident = 0usize;
        for book_side in [&self.bids, &self.asks] {
            let side = book_side.side();
            for (price, level) in book_side.iter_best_first() {
                if price.as_decimal().is_sign_negative() && !price.is_zero() {
                    violations.push(format!("{} level has negative price {}", side, price));
                }
                if level.is_empty() || level.total().is_zero() {
                    violations.push(format!("{} level {} has no resident size", side, price));
                }
                let mut sum = Quantity::ZERO;
                for entry in level.entries() {
                    resident += 1;
                    sum = sum + entry.size;
                    if entry.size.is_zero() {
                        violations.push(format!(
                            "order {} at {} {} has zero size",
                            entry.order_id, side, price
                        ));
                    }
                    match self.orders.get(&entry.order_id) {
                        Some(loc) if loc.side == side && loc.price == price => {}
                        _ => violations.push(format!(
                            "order {} at {} {} is missing from the lookup",
                            entry.order_id, side, price
                        )),
                    }
                }
                if sum != level.total() {
                    violations.push(format!(
                        "{} level {} total {} does not match resident sum {}",
                        side,
                        price,
                        level.total(),
                        sum
                    ));
                }
            }
        }

        if resident != self.orders.len() {
            violations.push(format!(
                "lookup holds {} orders but levels hold {}",
                self.orders.len(),
                resident
            ));
        }

        VerifyReport {
            symbol: self.symbol.clone(),
            valid: violations.is_empty(),
            violations,
        }
    }
}

/// Reserved id for the single resident of a level-update price.
///
/// Feed order events using the prefix are rejected at validation, so these
/// ids never collide with upstream ones.
pub fn synthetic_id(side: Side, price: Price) -> OrderId {
    OrderId::new(format!("{}{}:{}", SYNTHETIC_ID_PREFIX, side, price))
}

fn collect_levels(side: &BookSide, n: usize) -> Vec<LevelView> {
    side.iter_best_first()
        .take(n)
        .map(|(price, level)| LevelView {
            price,
            size: level.total(),
        })
        .collect()
}
