//! Identifier types for feed entities
//!
//! Order ids come from the upstream feed and are opaque strings. They are
//! unique per resident order while it is active; a reused id after a cancel
//! or full fill names a fresh order.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ValidationError;

/// Prefix of the ids a price-level update assigns to its resident entry.
/// Feed order ids may not start with it.
pub const SYNTHETIC_ID_PREFIX: &str = "mbp:";

/// Upstream order identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Create an OrderId without validation
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create an OrderId, rejecting empty or whitespace-only ids
    pub fn try_new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyOrderId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// True for ids in the namespace owned by price-level updates
    pub fn is_synthetic(&self) -> bool {
        self.0.starts_with(SYNTHETIC_ID_PREFIX)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Instrument symbol (e.g. "AAPL")
///
/// Stored trimmed and upper-cased whatever the source, so "aapl" from a
/// feed line and "AAPL" from a query name the same book.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Create a normalised Symbol without validation
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into().trim().to_ascii_uppercase())
    }

    /// Create a Symbol, rejecting empty or whitespace-only names
    pub fn try_new(symbol: impl Into<String>) -> Result<Self, ValidationError> {
        let symbol = Self::new(symbol);
        if symbol.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        Ok(symbol)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl std::borrow::Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_id_serialization() {
        let id = OrderId::new("ORD0000000001");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ORD0000000001\"");
        let deserialized: OrderId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn test_empty_ids_rejected() {
        assert_eq!(OrderId::try_new("  "), Err(ValidationError::EmptyOrderId));
        assert_eq!(Symbol::try_new(""), Err(ValidationError::EmptySymbol));
        assert!(Symbol::try_new("AAPL").is_ok());
    }

    #[test]
    fn test_symbol_borrow_lookup() {
        let mut map = std::collections::HashMap::new();
        map.insert(Symbol::new("MSFT"), 1);
        assert_eq!(map.get("MSFT"), Some(&1));
    }

    #[test]
    fn test_symbol_normalised_from_every_source() {
        assert_eq!(Symbol::new(" aapl ").as_str(), "AAPL");
        assert_eq!(Symbol::try_new("msft").unwrap(), Symbol::new("MSFT"));

        let decoded: Symbol = serde_json::from_str("\"tsla\"").unwrap();
        assert_eq!(decoded.as_str(), "TSLA");
        assert_eq!(serde_json::to_string(&decoded).unwrap(), "\"TSLA\"");
    }

    #[test]
    fn test_synthetic_prefix_detected() {
        assert!(OrderId::new("mbp:bid:100").is_synthetic());
        assert!(!OrderId::new("ORD1").is_synthetic());
        assert!(!OrderId::new("xmbp:bid:100").is_synthetic());
    }
}
