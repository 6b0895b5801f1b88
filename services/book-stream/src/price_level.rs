//! Price level index with FIFO queues
//!
//! A price level holds every resident order at one price, in arrival order.
//! Appending at the tail is what encodes time priority; removal is by order
//! id, never by value. Levels that become empty are deleted from the index.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, VecDeque};

use types::ids::OrderId;
use types::numeric::{Price, Quantity};
use types::order::Side;

/// Entry in a price level queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderEntry {
    pub order_id: OrderId,
    pub size: Quantity,
}

/// All resident orders at a single price, oldest first
#[derive(Debug, Clone, Default)]
pub struct PriceLevel {
    /// Queue of orders at this price level (FIFO order)
    orders: VecDeque<OrderEntry>,
    /// Cached sum of resident sizes
    total: Quantity,
}

impl PriceLevel {
    /// Insert an order at the back of the queue
    pub fn push_back(&mut self, order_id: OrderId, size: Quantity) {
        self.total = self.total + size;
        self.orders.push_back(OrderEntry { order_id, size });
    }

    /// Remove an order by id, returning its resident size
    pub fn remove(&mut self, order_id: &OrderId) -> Option<Quantity> {
        let position = self.orders.iter().position(|e| &e.order_id == order_id)?;
        let entry = self.orders.remove(position)?;
        self.total = self.total - entry.size;
        Some(entry.size)
    }

    /// Overwrite an order's size without moving it in the queue.
    ///
    /// Returns the previous size, or None if the order is not here.
    pub fn set_size(&mut self, order_id: &OrderId, size: Quantity) -> Option<Quantity> {
        let entry = self.orders.iter_mut().find(|e| &e.order_id == order_id)?;
        let old = entry.size;
        entry.size = size;
        self.total = self.total - old + size;
        Some(old)
    }

    pub fn size_of(&self, order_id: &OrderId) -> Option<Quantity> {
        self.orders
            .iter()
            .find(|e| &e.order_id == order_id)
            .map(|e| e.size)
    }

    /// Aggregate resident size
    pub fn total(&self) -> Quantity {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Orders in time priority
    pub fn entries(&self) -> impl Iterator<Item = &OrderEntry> {
        self.orders.iter()
    }

    /// Order ids in time priority
    pub fn order_ids(&self) -> Vec<OrderId> {
        self.orders.iter().map(|e| e.order_id.clone()).collect()
    }
}

/// One side of a symbol's book: price → level
///
/// `BTreeMap` keeps prices sorted ascending; bids are read from the back,
/// asks from the front.
#[derive(Debug, Clone)]
pub struct BookSide {
    side: Side,
    levels: BTreeMap<Price, PriceLevel>,
}

impl BookSide {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Append an order to the tail of its level, creating the level if absent
    pub fn push_back(&mut self, price: Price, order_id: OrderId, size: Quantity) {
        self.levels
            .entry(price)
            .or_default()
            .push_back(order_id, size);
    }

    /// Remove an order from its level, deleting the level if it empties
    pub fn remove(&mut self, price: Price, order_id: &OrderId) -> Option<Quantity> {
        match self.levels.entry(price) {
            Entry::Occupied(mut level) => {
                let removed = level.get_mut().remove(order_id);
                if level.get().is_empty() {
                    level.remove();
                }
                removed
            }
            Entry::Vacant(_) => None,
        }
    }

    pub fn set_size(&mut self, price: Price, order_id: &OrderId, size: Quantity) -> Option<Quantity> {
        self.levels.get_mut(&price)?.set_size(order_id, size)
    }

    /// Drop a whole level, returning it
    pub fn remove_level(&mut self, price: Price) -> Option<PriceLevel> {
        self.levels.remove(&price)
    }

    pub fn level(&self, price: Price) -> Option<&PriceLevel> {
        self.levels.get(&price)
    }

    /// Best level: highest bid or lowest ask
    pub fn best(&self) -> Option<(Price, &PriceLevel)> {
        let best = match self.side {
            Side::Bid => self.levels.iter().next_back(),
            Side::Ask => self.levels.iter().next(),
        };
        best.map(|(price, level)| (*price, level))
    }

    /// Levels best first
    pub fn iter_best_first(&self) -> Box<dyn Iterator<Item = (Price, &PriceLevel)> + '_> {
        let iter = self.levels.iter().map(|(price, level)| (*price, level));
        match self.side {
            Side::Bid => Box::new(iter.rev()),
            Side::Ask => Box::new(iter),
        }
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
