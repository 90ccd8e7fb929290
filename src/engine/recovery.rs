//! Recovery planner.
//!
//! Restores the one invariant that matters after a desync: every cycle
//! ends holding only quote currency on both venues. The planner never
//! opens exposure; it re-queries ambiguous legs and unwinds base
//! inventory, discounting the price until the venue accepts or the
//! position is declared stuck.

use std::time::Duration;

use rust_decimal::Decimal;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::domain::money::HUNDRED;
use crate::domain::{Amount, BookSnapshot, LegState, RecoveryAction, Symbol};
use crate::engine::leg::{LegDriver, LegOutcome};
use crate::exchange::{ExchangeAdapter, OrderId, Side};

#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Market-sell attempts before the emergency path.
    pub max_sell_retries: u32,
    /// Fraction (percent) below best bid for the emergency limit sell.
    pub emergency_discount_pct: Decimal,
    /// Attempts to resolve an `Unknown` leg by re-querying.
    pub requery_attempts: u32,
    /// Pause between re-query attempts.
    pub requery_backoff: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_sell_retries: 2,
            emergency_discount_pct: Decimal::ONE,
            requery_attempts: 5,
            requery_backoff: Duration::from_secs(1),
        }
    }
}

/// Result of an unwind attempt.
#[derive(Debug, Clone)]
pub struct UnwindResult {
    pub sold_base: Amount,
    pub sold_quote: Amount,
    pub sell_order_id: Option<OrderId>,
    /// Residual base the planner could not move.
    pub residual_base: Amount,
    pub actions: Vec<RecoveryAction>,
}

impl UnwindResult {
    #[must_use]
    pub fn is_stuck(&self) -> bool {
        self.residual_base > Amount::ZERO
    }

    fn absorb(&mut self, order_id: &OrderId, outcome: &LegOutcome) {
        self.sell_order_id = Some(order_id.clone());
        self.sold_base += outcome.filled_base;
        self.sold_quote += outcome.filled_quote;
        self.residual_base -= outcome.filled_base;
        if self.residual_base < Amount::ZERO {
            self.residual_base = Amount::ZERO;
        }
    }
}

pub struct RecoveryPlanner {
    config: RecoveryConfig,
}

impl RecoveryPlanner {
    #[must_use]
    pub fn new(config: RecoveryConfig) -> Self {
        Self { config }
    }

    /// Re-query an `Unknown` leg until the venue gives a conclusive
    /// answer. Returns the resolved fill, or `None` while still ambiguous
    /// after the attempt budget.
    pub async fn resolve_unknown(
        &self,
        adapter: &dyn ExchangeAdapter,
        symbol: &Symbol,
        order_id: &OrderId,
        actions: &mut Vec<RecoveryAction>,
    ) -> Option<LegOutcome> {
        for attempt in 1..=self.config.requery_attempts {
            sleep(self.config.requery_backoff).await;

            match adapter.query(symbol, order_id).await {
                Ok(status) => {
                    info!(
                        venue = %adapter.venue(),
                        %order_id,
                        attempt,
                        filled = %status.filled_base,
                        "ambiguous leg resolved"
                    );
                    actions.push(RecoveryAction::RequeriedLeg {
                        attempts: attempt,
                        filled_base: status.filled_base,
                    });
                    let state = if status.state.is_terminal() {
                        match status.state {
                            crate::exchange::OrderState::Filled => LegState::Filled,
                            crate::exchange::OrderState::Cancelled => LegState::Cancelled,
                            _ => LegState::Rejected,
                        }
                    } else if status.filled_base > Amount::ZERO {
                        LegState::PartiallyFilled
                    } else {
                        LegState::Submitted
                    };
                    return Some(LegOutcome {
                        state,
                        filled_base: status.filled_base,
                        filled_quote: status.filled_quote,
                        avg_price: status.avg_price,
                    });
                }
                Err(error) => {
                    warn!(
                        venue = %adapter.venue(),
                        %order_id,
                        attempt,
                        %error,
                        "re-query of ambiguous leg failed"
                    );
                }
            }
        }
        None
    }

    /// Sell `base_amount` on the sell venue, escalating from market
    /// retries to a discounted limit order. The caller marks the position
    /// stuck when residual base remains.
    pub async fn unwind_base(
        &self,
        adapter: &dyn ExchangeAdapter,
        legs: &LegDriver,
        symbol: &Symbol,
        base_amount: Amount,
        sell_book: Option<&BookSnapshot>,
    ) -> UnwindResult {
        let mut result = UnwindResult {
            sold_base: Amount::ZERO,
            sold_quote: Amount::ZERO,
            sell_order_id: None,
            residual_base: base_amount,
            actions: Vec::new(),
        };

        for attempt in 1..=self.config.max_sell_retries {
            result
                .actions
                .push(RecoveryAction::RetriedMarketSell { attempt });

            match adapter.place_market(symbol, Side::Sell, result.residual_base).await {
                Ok(order_id) => {
                    let outcome = legs
                        .drive(adapter, symbol, &order_id, result.residual_base)
                        .await;
                    result.absorb(&order_id, &outcome);
                    if result.residual_base <= Amount::ZERO {
                        return result;
                    }
                    if outcome.state == LegState::Unknown {
                        // Selling again while this order is ambiguous
                        // could sell more than we hold. Stop here.
                        warn!(
                            venue = %adapter.venue(),
                            %order_id,
                            "unwind sell ambiguous, halting automated recovery"
                        );
                        result.actions.push(RecoveryAction::MarkedStuck {
                            reason: "unwind sell left ambiguous state".into(),
                        });
                        return result;
                    }
                    warn!(
                        venue = %adapter.venue(),
                        attempt,
                        residual = %result.residual_base,
                        "market sell left residual base"
                    );
                }
                Err(error) => {
                    warn!(
                        venue = %adapter.venue(),
                        attempt,
                        %error,
                        "market sell retry failed"
                    );
                }
            }
        }

        // Emergency path: price through the book at a discount to the
        // best bid so the limit order takes immediately.
        if let Some(bid) = sell_book.and_then(|b| b.best_bid()) {
            let discount = self.config.emergency_discount_pct / HUNDRED;
            let limit_price = bid.price() * (Decimal::ONE - discount);
            result.actions.push(RecoveryAction::EmergencySell { limit_price });
            info!(
                venue = %adapter.venue(),
                %limit_price,
                residual = %result.residual_base,
                "placing emergency sell"
            );

            match adapter
                .place_limit(symbol, Side::Sell, result.residual_base, limit_price)
                .await
            {
                Ok(order_id) => {
                    let outcome = legs
                        .drive(adapter, symbol, &order_id, result.residual_base)
                        .await;
                    result.absorb(&order_id, &outcome);
                }
                Err(error) => {
                    warn!(venue = %adapter.venue(), %error, "emergency sell failed");
                }
            }
        } else {
            warn!(venue = %adapter.venue(), "no bid available for emergency sell");
        }

        if result.is_stuck() {
            result.actions.push(RecoveryAction::MarkedStuck {
                reason: format!(
                    "unable to unwind {} base after {} market retries and emergency sell",
                    result.residual_base, self.config.max_sell_retries
                ),
            });
        }
        result
    }
}
