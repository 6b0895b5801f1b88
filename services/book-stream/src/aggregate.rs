//! Multi-symbol order book aggregate
//!
//! Routes each event to its symbol's book, creating the book on first
//! sight, and fans queries out. Every apply is timed and recorded in the
//! injected `MetricsRecorder`; a rejected event is counted, logged and
//! returned, never allowed to abort the stream.
//!
//! Single writer: the replay path owns the aggregate. Other readers go
//! through a lock held by the entry point.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;
use types::errors::ValidationError;
use types::event::FeedEvent;
use types::ids::Symbol;

use crate::metrics::{MetricsRecorder, MetricsSnapshot};
use crate::order_book::{
    ApplyError, Bba, BookSnapshot, Depth, ModifyPolicy, SymbolBook, VerifyReport,
};

/// Engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BookConfig {
    pub modify_policy: ModifyPolicy,
}

/// `symbol → SymbolBook`, grown lazily and never pruned.
pub struct OrderBookAggregate {
    books: HashMap<Symbol, SymbolBook>,
    config: BookConfig,
    recorder: Arc<MetricsRecorder>,
}

impl OrderBookAggregate {
    pub fn new(config: BookConfig, recorder: Arc<MetricsRecorder>) -> Self {
        Self {
            books: HashMap::new(),
            config,
            recorder,
        }
    }

    pub fn recorder(&self) -> &Arc<MetricsRecorder> {
        &self.recorder
    }

    /// Apply one event to its symbol's book.
    pub fn apply(&mut self, event: &FeedEvent) -> Result<(), ApplyError> {
        let start = Instant::now();
        let result = self.route(event);
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        self.recorder.record_apply(latency_ms, result.is_err());
        if let Err(ref e) = result {
            warn!(symbol = %event.symbol(), error = %e, "Event rejected");
        }
        result
    }

    fn route(&mut self, event: &FeedEvent) -> Result<(), ApplyError> {
        let symbol = event.symbol();
        if symbol.is_empty() {
            return Err(ValidationError::EmptySymbol.into());
        }
        let policy = self.config.modify_policy;
        self.books
            .entry(symbol.clone())
            .or_insert_with(|| SymbolBook::with_policy(symbol.clone(), policy))
            .apply(event)
    }

    /// Lookup is case-insensitive; keys are stored normalised.
    pub fn book(&self, symbol: &str) -> Option<&SymbolBook> {
        self.books.get(&Symbol::new(symbol))
    }

    /// Every known symbol, sorted.
    pub fn list_symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self.books.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn symbol_count(&self) -> usize {
        self.books.len()
    }

    pub fn best_bid_ask(&self, symbol: &str) -> Bba {
        self.book(symbol)
            .map(SymbolBook::best_bid_ask)
            .unwrap_or_default()
    }

    pub fn top(&self, symbol: &str, n: usize) -> Depth {
        self.book(symbol).map(|b| b.top(n)).unwrap_or_default()
    }

    pub fn full_snapshot(&self, symbol: &str) -> BookSnapshot {
        self.book(symbol)
            .map(SymbolBook::full_snapshot)
            .unwrap_or_else(|| BookSnapshot::empty(Symbol::new(symbol)))
    }

    /// Full snapshots of every symbol, sorted by symbol.
    pub fn full_snapshot_all(&self) -> Vec<BookSnapshot> {
        self.list_symbols()
            .iter()
            .filter_map(|s| self.books.get(s))
            .map(SymbolBook::full_snapshot)
            .collect()
    }

    /// Unknown symbols verify as valid with no violations.
    pub fn verify(&self, symbol: &str) -> VerifyReport {
        self.book(symbol).map(SymbolBook::verify).unwrap_or_else(|| VerifyReport {
            symbol: Symbol::new(symbol),
            valid: true,
            violations: Vec::new(),
        })
    }

    pub fn verify_all(&self) -> Vec<VerifyReport> {
        self.list_symbols()
            .iter()
            .map(|s| self.verify(s.as_str()))
            .collect()
    }

    pub fn total_orders(&self) -> usize {
        self.books.values().map(SymbolBook::order_count).sum()
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.recorder.snapshot()
    }

    /// SHA-256 over every symbol's sorted levels.
    ///
    /// Equal for two aggregates that saw the same events in the same order.
    pub fn state_checksum(&self) -> String {
        let mut hasher = Sha256::new();

        for snapshot in self.full_snapshot_all() {
            hasher.update(snapshot.symbol.as_str().as_bytes());
            hasher.update(b"|");

            for level in &snapshot.bids {
                hasher.update(level.price.to_string().as_bytes());
                hasher.update(b":");
                hasher.update(level.size.to_string().as_bytes());
                hasher.update(b",");
            }
            hasher.update(b"---");

            for level in &snapshot.asks {
                hasher.update(level.price.to_string().as_bytes());
                hasher.update(b":");
                hasher.update(level.size.to_string().as_bytes());
                hasher.update(b",");
            }
            hasher.update(b"===");
        }

        format!("{:x}", hasher.finalize())
    }
}
