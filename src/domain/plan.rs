//! Candidate trade plans emitted by the evaluator.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::money::{Amount, Price};

/// A fully-costed candidate arbitrage cycle.
///
/// Produced from a pair of book snapshots; lives only from evaluation to
/// execution of a single cycle. `source_update_ids` tags the exact books
/// the numbers were derived from as `(buy venue, sell venue)`.
#[derive(Debug, Clone, Serialize)]
pub struct TradePlan {
    pub symbol: String,
    /// Base amount to buy and then sell.
    pub base_amount: Amount,
    /// Limit price of the buy leg: the buy venue's best ask.
    pub buy_limit_price: Price,
    /// Expected VWAP of the market sell into the sell venue's bids.
    pub expected_sell_vwap: Price,
    /// Quote spent buying `base_amount` at `buy_limit_price`.
    pub quote_cost: Amount,
    /// Quote received selling `base_amount` into the bid curve.
    pub quote_proceeds: Amount,
    pub expected_profit: Amount,
    pub profit_bps: Decimal,
    pub slippage_bps: Decimal,
    pub source_update_ids: (u64, u64),
    pub computed_at: DateTime<Utc>,
}
