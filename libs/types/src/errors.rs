//! Validation errors for feed events
//!
//! Raised before any book mutation; an event that fails validation leaves
//! state untouched.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::order::EventKind;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("negative price: {0}")]
    NegativePrice(Decimal),

    #[error("negative size: {0}")]
    NegativeSize(i64),

    #[error("size {0} exceeds the per-order limit")]
    SizeTooLarge(i64),

    #[error("{kind} requires a positive size")]
    ZeroSize { kind: EventKind },

    #[error("unknown side: {0:?}")]
    UnknownSide(String),

    #[error("unknown event type: {0:?}")]
    UnknownKind(String),

    #[error("malformed number: {0:?}")]
    MalformedNumber(String),

    #[error("empty symbol")]
    EmptySymbol,

    #[error("empty order id")]
    EmptyOrderId,

    #[error("order id {0:?} uses the reserved mbp: prefix")]
    ReservedOrderId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ValidationError::ZeroSize {
            kind: EventKind::New,
        };
        assert_eq!(err.to_string(), "NEW requires a positive size");

        let err = ValidationError::NegativePrice(Decimal::new(-150, 2));
        assert_eq!(err.to_string(), "negative price: -1.50");

        let err = ValidationError::ReservedOrderId("mbp:bid:100".to_string());
        assert_eq!(err.to_string(), "order id \"mbp:bid:100\" uses the reserved mbp: prefix");
    }
}
