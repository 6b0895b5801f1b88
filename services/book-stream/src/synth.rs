//! Seeded synthetic MBO feeds
//!
//! Same seed, same sequence. The realistic generator opens with a run of
//! NEW orders to build a book, then mixes NEW/CANCEL/MODIFY/EXECUTE against
//! the orders it is tracking as active.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use types::event::{FeedEvent, OrderEvent};
use types::order::{EventKind, Side};

/// Symbol universe with base prices in cents.
pub const SYMBOLS: [(&str, i64); 5] = [
    ("AAPL", 18_000),
    ("MSFT", 38_000),
    ("GOOGL", 14_000),
    ("TSLA", 25_000),
    ("AMZN", 17_000),
];

const WARMUP: usize = 200;
/// Weights for NEW, CANCEL, MODIFY, EXECUTE after warmup.
const MIX: [(EventKind, u32); 4] = [
    (EventKind::New, 50),
    (EventKind::Cancel, 20),
    (EventKind::Modify, 15),
    (EventKind::Execute, 15),
];

#[derive(Debug, Clone)]
struct Active {
    order_id: String,
    symbol: &'static str,
    side: Side,
    price: Decimal,
    size: i64,
}

/// Deterministic MBO flow generator.
pub struct FeedGenerator {
    rng: ChaCha8Rng,
    next_id: u64,
    /// Kept in a Vec so random picks are reproducible.
    active: Vec<Active>,
}

impl FeedGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_id: 0,
            active: Vec::new(),
        }
    }

    /// Generate `count` events with timestamps `0..count`.
    pub fn generate(&mut self, count: usize) -> Vec<OrderEvent> {
        (0..count)
            .map(|i| {
                let ts = i as i64;
                if i < WARMUP {
                    return self.new_order(ts);
                }
                match self.pick_kind() {
                    EventKind::New => self.new_order(ts),
                    EventKind::Cancel => self.cancel(ts),
                    EventKind::Modify => self.modify(ts),
                    EventKind::Execute => self.execute(ts),
                }
            })
            .collect()
    }

    pub fn active_orders(&self) -> usize {
        self.active.len()
    }

    fn pick_kind(&mut self) -> EventKind {
        let total: u32 = MIX.iter().map(|(_, w)| w).sum();
        let mut roll = self.rng.gen_range(0..total);
        for (kind, weight) in MIX {
            if roll < weight {
                return kind;
            }
            roll -= weight;
        }
        EventKind::New
    }

    fn next_order_id(&mut self) -> String {
        self.next_id += 1;
        format!("ORD{:010}", self.next_id)
    }

    fn new_order(&mut self, ts: i64) -> OrderEvent {
        let order_id = self.next_order_id();
        let (symbol, base) = SYMBOLS[self.rng.gen_range(0..SYMBOLS.len())];
        let side = if self.rng.gen_bool(0.5) { Side::Bid } else { Side::Ask };
        let offset = self.rng.gen_range(0..=200);
        let cents = match side {
            Side::Bid => base - offset,
            Side::Ask => base + offset,
        };
        let price = Decimal::new(cents, 2);
        let size = if self.rng.gen_bool(0.7) {
            self.rng.gen_range(1..=100)
        } else {
            self.rng.gen_range(100..=1000)
        };

        self.active.push(Active {
            order_id: order_id.clone(),
            symbol,
            side,
            price,
            size,
        });
        OrderEvent::new(ts, EventKind::New, order_id, symbol, side, price, size)
    }

    fn pick_active(&mut self) -> Option<usize> {
        if self.active.is_empty() {
            None
        } else {
            Some(self.rng.gen_range(0..self.active.len()))
        }
    }

    fn cancel(&mut self, ts: i64) -> OrderEvent {
        let Some(i) = self.pick_active() else {
            return self.new_order(ts);
        };
        let order = self.active.swap_remove(i);
        OrderEvent::new(ts, EventKind::Cancel, order.order_id, order.symbol, order.side, Decimal::ZERO, 0)
    }

    fn modify(&mut self, ts: i64) -> OrderEvent {
        let Some(i) = self.pick_active() else {
            return self.new_order(ts);
        };
        let delta = self.rng.gen_range(-50..=50);
        let order = &mut self.active[i];
        order.size = (order.size + delta).max(1);
        OrderEvent::new(
            ts,
            EventKind::Modify,
            order.order_id.clone(),
            order.symbol,
            order.side,
            order.price,
            order.size,
        )
    }

    fn execute(&mut self, ts: i64) -> OrderEvent {
        let Some(i) = self.pick_active() else {
            return self.new_order(ts);
        };
        let fill = self.rng.gen_range(1..=self.active[i].size);
        self.active[i].size -= fill;
        let order = if self.active[i].size == 0 {
            self.active.swap_remove(i)
        } else {
            self.active[i].clone()
        };
        OrderEvent::new(ts, EventKind::Execute, order.order_id, order.symbol, order.side, order.price, fill)
    }
}

/// `n` NEW events alternating bid/ask at distinct prices on one symbol.
///
/// Bids step down from 1000.00 and asks step up from 1000.01, so the book
/// never crosses.
pub fn alternating_new_orders(symbol: &str, n: usize) -> Vec<FeedEvent> {
    (0..n)
        .map(|i| {
            let step = (i / 2) as i64;
            let (side, cents) = if i % 2 == 0 {
                (Side::Bid, 100_000 - step)
            } else {
                (Side::Ask, 100_001 + step)
            };
            OrderEvent::new(
                i as i64,
                EventKind::New,
                format!("ORD{:010}", i + 1),
                symbol,
                side,
                Decimal::new(cents, 2),
                1 + (i % 100) as i64,
            )
            .into()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_feed() {
        let a = FeedGenerator::new(42).generate(2_000);
        let b = FeedGenerator::new(42).generate(2_000);
        let c = FeedGenerator::new(7).generate(2_000);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_warmup_is_all_new() {
        let feed = FeedGenerator::new(1).generate(300);
        assert!(feed[..WARMUP].iter().all(|e| e.kind == EventKind::New));
        assert!(feed.iter().all(|e| e.validate().is_ok()));
    }

    #[test]
    fn test_mix_contains_every_kind() {
        let feed = FeedGenerator::new(3).generate(5_000);
        for kind in EventKind::ALL {
            assert!(feed.iter().any(|e| e.kind == kind), "missing {}", kind);
        }
    }

    #[test]
    fn test_alternating_feed_is_uncrossed() {
        let feed = alternating_new_orders("SYN", 1_000);
        assert_eq!(feed.len(), 1_000);
        assert_eq!(feed[0].side(), Side::Bid);
        assert_eq!(feed[1].side(), Side::Ask);
    }
}
