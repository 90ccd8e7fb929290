//! Order-book snapshot types and validation.
//!
//! A [`BookSnapshot`] is an immutable, validated view of one venue's book
//! at a point in time. Construction rejects zero-size levels, unsorted or
//! duplicated prices, and crossed books, so downstream code can rely on
//! the invariants instead of re-checking them.

use chrono::{DateTime, Utc};

use super::error::DomainError;
use super::money::{Amount, Price};
use super::symbol::Symbol;

/// The two venues this engine trades across.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Venue {
    Mexc,
    Bingx,
}

impl Venue {
    /// Lowercase name for logs and records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mexc => "mexc",
            Self::Bingx => "bingx",
        }
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single price level: size in base units resting at a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLevel {
    price: Price,
    size: Amount,
}

impl PriceLevel {
    #[must_use]
    pub const fn new(price: Price, size: Amount) -> Self {
        Self { price, size }
    }

    #[must_use]
    pub const fn price(&self) -> Price {
        self.price
    }

    #[must_use]
    pub const fn size(&self) -> Amount {
        self.size
    }
}

/// Validated order-book snapshot for one venue.
#[derive(Debug, Clone)]
pub struct BookSnapshot {
    venue: Venue,
    symbol: Symbol,
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,
    update_id: u64,
    venue_ts_ms: i64,
    captured_at: DateTime<Utc>,
}

impl BookSnapshot {
    /// Build a snapshot, enforcing the book invariants.
    ///
    /// `bids` must be strictly descending by price, `asks` strictly
    /// ascending; every level must have positive price and size; the best
    /// bid must be below the best ask.
    ///
    /// # Errors
    ///
    /// Returns the first violated [`DomainError`].
    pub fn try_new(
        venue: Venue,
        symbol: Symbol,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        update_id: u64,
        venue_ts_ms: i64,
    ) -> Result<Self, DomainError> {
        validate_side(&bids, "bid", Ordering::Descending)?;
        validate_side(&asks, "ask", Ordering::Ascending)?;

        if let (Some(bid), Some(ask)) = (bids.first(), asks.first()) {
            if bid.price() >= ask.price() {
                return Err(DomainError::CrossedBook {
                    bid: bid.price(),
                    ask: ask.price(),
                });
            }
        }

        Ok(Self {
            venue,
            symbol,
            bids,
            asks,
            update_id,
            venue_ts_ms,
            captured_at: Utc::now(),
        })
    }

    #[must_use]
    pub const fn venue(&self) -> Venue {
        self.venue
    }

    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    #[must_use]
    pub fn bids(&self) -> &[PriceLevel] {
        &self.bids
    }

    #[must_use]
    pub fn asks(&self) -> &[PriceLevel] {
        &self.asks
    }

    /// Highest resting buy price.
    #[must_use]
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    /// Lowest resting sell price.
    #[must_use]
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Difference between best ask and best bid, when both sides exist.
    #[must_use]
    pub fn spread(&self) -> Option<Price> {
        Some(self.best_ask()?.price() - self.best_bid()?.price())
    }

    /// Venue-supplied monotonic sequence tag.
    #[must_use]
    pub const fn update_id(&self) -> u64 {
        self.update_id
    }

    /// Venue-supplied timestamp, milliseconds since epoch.
    #[must_use]
    pub const fn venue_ts_ms(&self) -> i64 {
        self.venue_ts_ms
    }

    /// Local wall-clock time the snapshot was decoded.
    #[must_use]
    pub const fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

enum Ordering {
    Ascending,
    Descending,
}

fn validate_side(
    levels: &[PriceLevel],
    side: &'static str,
    ordering: Ordering,
) -> Result<(), DomainError> {
    for level in levels {
        if level.price() <= Price::ZERO {
            return Err(DomainError::BadLevelPrice {
                price: level.price(),
            });
        }
        if level.size() <= Amount::ZERO {
            return Err(DomainError::BadLevelSize {
                price: level.price(),
                size: level.size(),
            });
        }
    }

    let sorted = levels.windows(2).all(|w| match ordering {
        Ordering::Ascending => w[0].price() < w[1].price(),
        Ordering::Descending => w[0].price() > w[1].price(),
    });
    if !sorted {
        return Err(DomainError::UnsortedSide { side });
    }

    Ok(())
}
