//! Opportunity evaluator.
//!
//! Pure function over a pair of book snapshots: costs a limit buy at the
//! buy venue's best ask against the volume-weighted proceeds of a market
//! sell into the sell venue's bids, and emits a [`TradePlan`] only when
//! every profitability and slippage gate passes.

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

use crate::domain::money::{BPS_SCALE, HUNDRED};
use crate::domain::{Amount, BookSnapshot, DepthCurve, TradePlan};

/// Venue fee rates. Accepted for forward compatibility; the engine
/// currently computes with the zero-fee schedule the BTC/USDC pair has on
/// both venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    pub maker: Decimal,
    pub taker: Decimal,
}

impl FeeSchedule {
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            maker: Decimal::ZERO,
            taker: Decimal::ZERO,
        }
    }
}

/// Evaluation thresholds, taken from configuration.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Absolute minimum expected profit in quote units.
    pub min_profit_quote: Amount,
    /// Minimum expected profit as percent of quote cost.
    pub min_profit_pct: Decimal,
    /// Cap on base size per cycle.
    pub max_base_per_trade: Amount,
    /// Reject plans whose implied slippage exceeds this.
    pub max_slippage_bps: Decimal,
    pub fees: FeeSchedule,
}

/// Why no plan was emitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Reject {
    #[error("buy book has no asks")]
    MissingAsk,

    #[error("sell book has no bids")]
    MissingBids,

    #[error("candidate size rounds to zero")]
    ZeroCandidate,

    #[error("expected profit {profit} ({profit_bps} bps) below thresholds")]
    BelowMinProfit { profit: Amount, profit_bps: Decimal },

    #[error("sell vwap below buy price ({slippage_bps} bps)")]
    NegativeEdge { slippage_bps: Decimal },

    #[error("slippage {slippage_bps} bps exceeds cap {max_bps} bps")]
    SlippageExceeded {
        slippage_bps: Decimal,
        max_bps: Decimal,
    },
}

pub struct Evaluator {
    config: EvaluatorConfig,
    /// Base-size step of the buy venue; candidate sizes round down to it.
    base_increment: Amount,
}

impl Evaluator {
    #[must_use]
    pub fn new(config: EvaluatorConfig, base_increment: Amount) -> Self {
        Self {
            config,
            base_increment,
        }
    }

    /// Evaluate one buy-book / sell-book pair against a quote balance.
    ///
    /// # Errors
    ///
    /// A [`Reject`] naming the first gate that failed.
    pub fn evaluate(
        &self,
        buy_book: &BookSnapshot,
        sell_book: &BookSnapshot,
        quote_balance: Amount,
    ) -> Result<TradePlan, Reject> {
        let best_ask = buy_book.best_ask().ok_or(Reject::MissingAsk)?;
        let ask_price = best_ask.price();

        let bid_curve = DepthCurve::from_side(sell_book.bids());
        let available = bid_curve.available_base();
        if available <= Amount::ZERO {
            return Err(Reject::MissingBids);
        }

        // Candidate size: bounded by balance, per-trade cap, and sell-side
        // depth, then rounded down to the venue's base increment. Ties on
        // a flat bid region resolve to the smallest size by construction.
        let affordable = quote_balance / ask_price;
        let candidate = affordable
            .min(self.config.max_base_per_trade)
            .min(available);
        let base_amount = self.round_down(candidate);
        if base_amount <= Amount::ZERO {
            return Err(Reject::ZeroCandidate);
        }

        // The buy leg is a limit order at the best ask, so its cost is the
        // single-price product; the ask ladder is never walked.
        let quote_cost = base_amount * ask_price;

        let fill = bid_curve
            .fill_for_base(base_amount)
            .map_err(|_| Reject::MissingBids)?;
        let quote_proceeds = fill.quote;
        let sell_vwap = fill.vwap();

        let expected_profit = quote_proceeds - quote_cost;
        let profit_bps = expected_profit / quote_cost * BPS_SCALE;
        if expected_profit < self.config.min_profit_quote
            || profit_bps < self.config.min_profit_pct * HUNDRED
        {
            return Err(Reject::BelowMinProfit {
                profit: expected_profit,
                profit_bps,
            });
        }

        let slippage_bps = (sell_vwap - ask_price) / ask_price * BPS_SCALE;
        if slippage_bps < Decimal::ZERO {
            return Err(Reject::NegativeEdge { slippage_bps });
        }
        if slippage_bps > self.config.max_slippage_bps {
            return Err(Reject::SlippageExceeded {
                slippage_bps,
                max_bps: self.config.max_slippage_bps,
            });
        }

        debug!(
            base = %base_amount,
            ask = %ask_price,
            vwap = %sell_vwap,
            profit = %expected_profit,
            profit_bps = %profit_bps,
            "plan candidate accepted"
        );

        Ok(TradePlan {
            symbol: buy_book.symbol().canonical(),
            base_amount,
            buy_limit_price: ask_price,
            expected_sell_vwap: sell_vwap,
            quote_cost,
            quote_proceeds,
            expected_profit,
            profit_bps,
            slippage_bps,
            source_update_ids: (buy_book.update_id(), sell_book.update_id()),
            computed_at: Utc::now(),
        })
    }

    fn round_down(&self, amount: Amount) -> Amount {
        if self.base_increment <= Amount::ZERO {
            return amount;
        }
        (amount / self.base_increment).floor() * self.base_increment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{bingx_book, mexc_book};
    use rust_decimal_macros::dec;

    fn evaluator(min_profit_quote: Amount, min_profit_pct: Decimal) -> Evaluator {
        Evaluator::new(
            EvaluatorConfig {
                min_profit_quote,
                min_profit_pct,
                max_base_per_trade: dec!(10),
                max_slippage_bps: dec!(100),
                fees: FeeSchedule::zero(),
            },
            dec!(0.0001),
        )
    }

    #[test]
    fn clean_profit_plan() {
        // Buy 1 BTC at 40,000; sell 0.5 @ 40,100 + 0.5 @ 40,050.
        let buy = mexc_book(&[], &[("40000", "1")], 1);
        let sell = bingx_book(&[("40100", "0.5"), ("40050", "0.5")], &[], 1);

        let plan = evaluator(dec!(10), dec!(0))
            .evaluate(&buy, &sell, dec!(40000))
            .unwrap();

        assert_eq!(plan.base_amount, dec!(1.0000));
        assert_eq!(plan.quote_cost, dec!(40000.0000));
        assert_eq!(plan.quote_proceeds, dec!(40075.00000));
        assert_eq!(plan.expected_profit, dec!(75.00000));
        assert_eq!(plan.profit_bps, dec!(18.75));
        assert_eq!(plan.source_update_ids, (1, 1));
    }

    #[test]
    fn depth_limited_plan_shrinks_to_available() {
        let buy = mexc_book(&[], &[("40000", "1")], 3);
        let sell = bingx_book(&[("40100", "0.3")], &[], 4);

        let plan = evaluator(dec!(10), dec!(0))
            .evaluate(&buy, &sell, dec!(1000000))
            .unwrap();

        assert_eq!(plan.base_amount, dec!(0.3000));
        assert_eq!(plan.quote_cost, dec!(12000.0000));
        assert_eq!(plan.quote_proceeds, dec!(12030.00000));
        assert_eq!(plan.expected_profit, dec!(30.00000));
    }

    #[test]
    fn unprofitable_spread_is_rejected() {
        let buy = mexc_book(&[], &[("40100", "1")], 1);
        let sell = bingx_book(&[("40050", "1")], &[], 1);

        let err = evaluator(dec!(10), dec!(0))
            .evaluate(&buy, &sell, dec!(40100))
            .unwrap_err();
        assert!(matches!(err, Reject::BelowMinProfit { .. }));
    }

    #[test]
    fn profit_threshold_binds_in_quote_units() {
        let buy = mexc_book(&[], &[("40000", "1")], 1);
        let sell = bingx_book(&[("40100", "0.5"), ("40050", "0.5")], &[], 1);

        // Expected profit is 75; a 100-quote floor rejects it.
        let err = evaluator(dec!(100), dec!(0))
            .evaluate(&buy, &sell, dec!(40000))
            .unwrap_err();
        assert!(matches!(err, Reject::BelowMinProfit { .. }));
    }

    #[test]
    fn profit_threshold_binds_in_percent() {
        let buy = mexc_book(&[], &[("40000", "1")], 1);
        let sell = bingx_book(&[("40100", "0.5"), ("40050", "0.5")], &[], 1);

        // 18.75 bps = 0.1875%; a 0.5% floor rejects it.
        let err = evaluator(dec!(10), dec!(0.5))
            .evaluate(&buy, &sell, dec!(40000))
            .unwrap_err();
        assert!(matches!(err, Reject::BelowMinProfit { .. }));
    }

    #[test]
    fn slippage_cap_rejects_thin_books() {
        let buy = mexc_book(&[], &[("40000", "1")], 1);
        // VWAP of 1 BTC over these bids is far above the cap's reach:
        // 0.1 @ 42,000 then 0.9 @ 41,000 -> vwap 41,100 (275 bps).
        let sell = bingx_book(&[("42000", "0.1"), ("41000", "0.9")], &[], 1);

        let tight = Evaluator::new(
            EvaluatorConfig {
                min_profit_quote: dec!(1),
                min_profit_pct: dec!(0),
                max_base_per_trade: dec!(10),
                max_slippage_bps: dec!(200),
                fees: FeeSchedule::zero(),
            },
            dec!(0.0001),
        );
        let err = tight.evaluate(&buy, &sell, dec!(40000)).unwrap_err();
        assert!(matches!(err, Reject::SlippageExceeded { .. }));
    }

    #[test]
    fn balance_bound_rounds_down_to_increment() {
        let buy = mexc_book(&[], &[("40000", "1")], 1);
        let sell = bingx_book(&[("40100", "1")], &[], 1);

        // 10,011 / 40,000 = 0.250275; the 0.0001 increment floors it.
        let plan = evaluator(dec!(1), dec!(0))
            .evaluate(&buy, &sell, dec!(10011))
            .unwrap();
        assert_eq!(plan.base_amount, dec!(0.2502));
    }

    #[test]
    fn empty_books_are_rejected() {
        let no_asks = mexc_book(&[("39000", "1")], &[], 1);
        let sell = bingx_book(&[("40100", "1")], &[], 1);
        assert_eq!(
            evaluator(dec!(1), dec!(0))
                .evaluate(&no_asks, &sell, dec!(1000))
                .unwrap_err(),
            Reject::MissingAsk
        );

        let buy = mexc_book(&[], &[("40000", "1")], 1);
        let no_bids = bingx_book(&[], &[("40200", "1")], 1);
        assert_eq!(
            evaluator(dec!(1), dec!(0))
                .evaluate(&buy, &no_bids, dec!(1000))
                .unwrap_err(),
            Reject::MissingBids
        );
    }

    #[test]
    fn tiny_balance_rounds_to_zero_candidate() {
        let buy = mexc_book(&[], &[("40000", "1")], 1);
        let sell = bingx_book(&[("40100", "1")], &[], 1);

        let err = evaluator(dec!(0), dec!(0))
            .evaluate(&buy, &sell, dec!(1))
            .unwrap_err();
        assert_eq!(err, Reject::ZeroCandidate);
    }

    #[test]
    fn emitted_plans_always_clear_thresholds() {
        let buy = mexc_book(&[], &[("40000", "2")], 1);
        let sell = bingx_book(&[("40100", "0.5"), ("40050", "0.5"), ("40020", "1")], &[], 1);
        let min_profit = dec!(25);
        let min_pct = dec!(0.01);

        for balance in [dec!(5000), dec!(20000), dec!(40000), dec!(100000)] {
            if let Ok(plan) = evaluator(min_profit, min_pct).evaluate(&buy, &sell, balance) {
                assert!(plan.expected_profit >= min_profit);
                assert!(plan.profit_bps >= min_pct * dec!(100));
                assert!(plan.expected_sell_vwap >= dec!(40020));
                assert!(plan.expected_sell_vwap <= dec!(40100));
            }
        }
    }
}
