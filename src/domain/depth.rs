//! Cumulative depth curves over one book side.
//!
//! A [`DepthCurve`] precomputes `(cum_base, cum_quote)` prefix sums over a
//! sorted side and answers "what does a market order of size `x` achieve"
//! queries. Built from bids it yields sale proceeds; built from asks it
//! yields purchase cost. The walk consumes levels best-to-worst and fills
//! the last touched level partially, which is exactly what a taker order
//! of that size would do.
//!
//! All arithmetic is exact decimal; identical inputs always produce
//! identical results.

use super::book::PriceLevel;
use super::error::DomainError;
use super::money::{Amount, Price};

#[derive(Debug, Clone, Copy)]
struct CurvePoint {
    price: Price,
    cum_base: Amount,
    cum_quote: Amount,
}

/// Prefix-summed view of one side of a book.
#[derive(Debug, Clone)]
pub struct DepthCurve {
    points: Vec<CurvePoint>,
}

/// Result of sweeping a curve for a requested base amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fill {
    /// Base actually consumable (equals the request unless depth-limited).
    pub base: Amount,
    /// Quote paid (asks) or received (bids) for `base`.
    pub quote: Amount,
    /// Price of the worst level touched.
    pub worst_price: Price,
    /// Number of levels touched, counting the partially-consumed one.
    pub levels_used: usize,
    /// True when the side ran out before the request was satisfied.
    pub depth_limited: bool,
}

impl Fill {
    /// Volume-weighted average price of the fill.
    #[must_use]
    pub fn vwap(&self) -> Price {
        self.quote / self.base
    }
}

impl DepthCurve {
    /// Build a curve from a side already sorted best-to-worst.
    #[must_use]
    pub fn from_side(levels: &[PriceLevel]) -> Self {
        let mut points = Vec::with_capacity(levels.len());
        let mut cum_base = Amount::ZERO;
        let mut cum_quote = Amount::ZERO;
        for level in levels {
            cum_base += level.size();
            cum_quote += level.size() * level.price();
            points.push(CurvePoint {
                price: level.price(),
                cum_base,
                cum_quote,
            });
        }
        Self { points }
    }

    /// Total base resting on this side.
    #[must_use]
    pub fn available_base(&self) -> Amount {
        self.points.last().map_or(Amount::ZERO, |p| p.cum_base)
    }

    /// Sweep the curve for `x` base units.
    ///
    /// If `x` exceeds the available depth the returned [`Fill`] carries
    /// the whole side and is flagged `depth_limited`.
    ///
    /// # Errors
    ///
    /// [`DomainError::EmptyCurve`] on an empty side,
    /// [`DomainError::NonPositiveAmount`] when `x <= 0`.
    pub fn fill_for_base(&self, x: Amount) -> Result<Fill, DomainError> {
        if self.points.is_empty() {
            return Err(DomainError::EmptyCurve);
        }
        if x <= Amount::ZERO {
            return Err(DomainError::NonPositiveAmount { amount: x });
        }

        let last = self.points[self.points.len() - 1];
        if x >= last.cum_base {
            return Ok(Fill {
                base: last.cum_base,
                quote: last.cum_quote,
                worst_price: last.price,
                levels_used: self.points.len(),
                depth_limited: x > last.cum_base,
            });
        }

        // First k with cum_base[k] >= x; the level k is partially consumed.
        let k = self
            .points
            .partition_point(|p| p.cum_base < x);
        let (prev_base, prev_quote) = if k == 0 {
            (Amount::ZERO, Amount::ZERO)
        } else {
            (self.points[k - 1].cum_base, self.points[k - 1].cum_quote)
        };
        let level = self.points[k];
        let delta = x - prev_base;

        Ok(Fill {
            base: x,
            quote: prev_quote + delta * level.price,
            worst_price: level.price,
            levels_used: k + 1,
            depth_limited: false,
        })
    }
}
