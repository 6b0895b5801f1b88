//! Types library for the MBO book-stream service
//!
//! This library provides the feed event model shared by the book engine,
//! the streaming distributor and the file reader.
//!
//! # Modules
//! - `ids`: Identifiers (OrderId, Symbol)
//! - `numeric`: Exact decimal price and integer quantity
//! - `order`: Side and event kind enums
//! - `event`: Order events, level updates and the `FeedEvent` union
//! - `errors`: Validation errors

pub mod errors;
pub mod event;
pub mod ids;
pub mod numeric;
pub mod order;

pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::errors::*;
    pub use crate::event::*;
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::order::*;
}
