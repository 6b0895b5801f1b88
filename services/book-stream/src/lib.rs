//! MBO Book Stream Service
//!
//! Replays a recorded market-by-order feed and produces:
//! - Per-symbol order books with FIFO price levels and O(log L) updates
//! - Best bid/ask, top-N depth and full snapshots
//! - A rate-controlled TCP stream of length-prefixed JSON frames
//! - A read-only HTTP inspection surface
//! - A JSON book export with a deterministic state checksum
//!
//! # Architecture
//!
//! ```text
//!   CSV / NDJSON file
//!          │
//!     ┌────▼────┐
//!     │ reader  │  ← parses, counts and skips bad rows
//!     └────┬────┘
//!          │ Vec<FeedEvent>
//!   ┌──────▼──────┐   callback    ┌───────────┐
//!   │ distributor ├──────────────►│ aggregate │◄── http (read lock)
//!   └──────┬──────┘  (in order)   └─────┬─────┘
//!          │ broadcast frames           │
//!   ┌──────▼──────┐               ┌─────▼─────┐
//!   │ subscribers │               │  export   │
//!   └─────────────┘               └───────────┘
//! ```

pub mod aggregate;
pub mod client;
pub mod config;
pub mod distributor;
pub mod export;
pub mod http;
pub mod metrics;
pub mod order_book;
pub mod price_level;
pub mod reader;
pub mod subscriber;
pub mod synth;
pub mod wire;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
