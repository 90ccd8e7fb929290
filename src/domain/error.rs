//! Domain validation errors.
//!
//! Returned by `try_new` constructors and the depth-curve queries when a
//! book or a requested fill violates a domain rule.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised when domain invariants are violated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Symbol is not in canonical `BASE-QUOTE` form.
    #[error("symbol {raw:?} is not in BASE-QUOTE form")]
    InvalidSymbol { raw: String },

    /// A book level carried a zero or negative size.
    #[error("level at price {price} has non-positive size {size}")]
    BadLevelSize { price: Decimal, size: Decimal },

    /// A book level carried a zero or negative price.
    #[error("level has non-positive price {price}")]
    BadLevelPrice { price: Decimal },

    /// A book side is not strictly sorted (duplicates included).
    #[error("{side} side is not strictly sorted by price")]
    UnsortedSide { side: &'static str },

    /// Best bid crossed the best ask.
    #[error("crossed book: best bid {bid} >= best ask {ask}")]
    CrossedBook { bid: Decimal, ask: Decimal },

    /// Venue-supplied update id moved backwards.
    #[error("update id regressed: last {last}, got {got}")]
    StaleUpdateId { last: u64, got: u64 },

    /// A depth query was made against an empty side.
    #[error("depth curve is empty")]
    EmptyCurve,

    /// A depth query asked for a non-positive amount.
    #[error("requested amount must be positive, got {amount}")]
    NonPositiveAmount { amount: Decimal },
}
