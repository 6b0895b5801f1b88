//! Book side and event kind enums
//!
//! Both parse case-insensitively from feed text. Side also accepts the
//! common buy/sell spellings used by upstream files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ValidationError;

/// Book side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy interest, iterated best (highest) first
    #[serde(alias = "buy", alias = "b", alias = "BID", alias = "BUY", alias = "B")]
    Bid,
    /// Sell interest, iterated best (lowest) first
    #[serde(alias = "sell", alias = "s", alias = "ASK", alias = "SELL", alias = "S")]
    Ask,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Bid => "bid",
            Side::Ask => "ask",
        }
    }
}

impl FromStr for Side {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bid" | "buy" | "b" => Ok(Side::Bid),
            "ask" | "sell" | "s" => Ok(Side::Ask),
            _ => Err(ValidationError::UnknownSide(s.to_string())),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// MBO event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    New,
    Cancel,
    Modify,
    Execute,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::New,
        EventKind::Cancel,
        EventKind::Modify,
        EventKind::Execute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::New => "NEW",
            EventKind::Cancel => "CANCEL",
            EventKind::Modify => "MODIFY",
            EventKind::Execute => "EXECUTE",
        }
    }
}

impl FromStr for EventKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(EventKind::New),
            "CANCEL" => Ok(EventKind::Cancel),
            "MODIFY" => Ok(EventKind::Modify),
            "EXECUTE" => Ok(EventKind::Execute),
            _ => Err(ValidationError::UnknownKind(s.to_string())),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
