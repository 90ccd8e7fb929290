//! Exchange adapters and the capability contract they implement.

pub mod bingx;
pub mod mexc;
mod sign;
mod traits;

pub use traits::{
    BookStream, Credentials, ExchangeAdapter, ExchangeError, OrderId, OrderState, OrderStatus,
    Side,
};

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::domain::PriceLevel;

/// Parse venue `[price, size]` string pairs and sort them best-first.
///
/// Venues do not guarantee ordering on the wire; the book invariants are
/// enforced afterwards by `BookSnapshot::try_new`.
pub(crate) fn parse_levels(
    raw: &[(String, String)],
    is_bid: bool,
) -> Result<Vec<PriceLevel>, ExchangeError> {
    let mut levels = Vec::with_capacity(raw.len());
    for (price, size) in raw {
        let price = Decimal::from_str(price)
            .map_err(|e| ExchangeError::Transport(format!("bad level price: {e}")))?;
        let size = Decimal::from_str(size)
            .map_err(|e| ExchangeError::Transport(format!("bad level size: {e}")))?;
        levels.push(PriceLevel::new(price, size));
    }
    if is_bid {
        levels.sort_by(|a, b| b.price().cmp(&a.price()));
    } else {
        levels.sort_by(|a, b| a.price().cmp(&b.price()));
    }
    Ok(levels)
}
