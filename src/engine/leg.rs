//! One-leg order state machine.
//!
//! Drives a submitted order to a terminal state by polling the venue:
//! filled size only ever grows, a timeout triggers a cancel and the leg
//! settles at whatever was filled by cancel-ack, and repeated query
//! transport failures escalate to `Unknown` - the recovery planner's
//! entry point.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::domain::{Amount, LegState, Price, Symbol};
use crate::exchange::{ExchangeAdapter, ExchangeError, OrderId, OrderState, OrderStatus};

/// Polling knobs for one leg.
#[derive(Debug, Clone)]
pub struct LegConfig {
    /// Status poll cadence after submit.
    pub poll_interval: Duration,
    /// Time allowed before the leg is cancelled.
    pub timeout: Duration,
    /// Consecutive query transport failures before `Unknown`.
    pub max_query_failures: u32,
}

impl Default for LegConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
            max_query_failures: 3,
        }
    }
}

/// Terminal result of driving one leg.
#[derive(Debug, Clone)]
pub struct LegOutcome {
    pub state: LegState,
    pub filled_base: Amount,
    pub filled_quote: Amount,
    pub avg_price: Option<Price>,
}

impl LegOutcome {
    fn unknown(filled_base: Amount, filled_quote: Amount, avg_price: Option<Price>) -> Self {
        Self {
            state: LegState::Unknown,
            filled_base,
            filled_quote,
            avg_price,
        }
    }
}

pub struct LegDriver {
    config: LegConfig,
}

impl LegDriver {
    #[must_use]
    pub fn new(config: LegConfig) -> Self {
        Self { config }
    }

    /// Poll `order_id` until terminal, cancelling on timeout.
    ///
    /// Returns `Unknown` only when the venue could not be reconciled;
    /// every other outcome carries the venue's final word on the fill.
    pub async fn drive(
        &self,
        adapter: &dyn ExchangeAdapter,
        symbol: &Symbol,
        order_id: &OrderId,
        requested_base: Amount,
    ) -> LegOutcome {
        let venue = adapter.venue();
        let deadline = Instant::now() + self.config.timeout;
        let mut state = LegState::Submitted;
        let mut filled_base = Amount::ZERO;
        let mut filled_quote = Amount::ZERO;
        let mut avg_price = None;
        let mut consecutive_failures: u32 = 0;

        loop {
            sleep(self.config.poll_interval).await;

            match self.query_once_retried(adapter, symbol, order_id).await {
                Ok(status) => {
                    consecutive_failures = 0;

                    // Filled size is monotonic; a shrinking report is a
                    // venue inconsistency we refuse to propagate.
                    if status.filled_base < filled_base {
                        warn!(
                            %venue, %order_id,
                            reported = %status.filled_base,
                            known = %filled_base,
                            "venue reported shrinking fill, keeping known value"
                        );
                    } else {
                        filled_base = status.filled_base;
                        filled_quote = status.filled_quote;
                        avg_price = status.avg_price;
                    }

                    let next = map_state(&status, requested_base);
                    if next != state {
                        debug!(%venue, %order_id, from = %state, to = %next, filled = %filled_base, "leg transition");
                        state = next;
                    }

                    if state.is_terminal() {
                        return LegOutcome {
                            state,
                            filled_base,
                            filled_quote,
                            avg_price,
                        };
                    }
                }
                Err(error) => {
                    consecutive_failures += 1;
                    warn!(
                        %venue, %order_id, %error,
                        failures = consecutive_failures,
                        "order query failed"
                    );
                    if consecutive_failures >= self.config.max_query_failures {
                        return LegOutcome::unknown(filled_base, filled_quote, avg_price);
                    }
                }
            }

            if Instant::now() >= deadline {
                warn!(%venue, %order_id, filled = %filled_base, "leg timed out, cancelling");
                return self
                    .cancel_and_settle(adapter, symbol, order_id, filled_base, filled_quote, avg_price)
                    .await;
            }
        }
    }

    /// One query with a single immediate retry on transport error.
    async fn query_once_retried(
        &self,
        adapter: &dyn ExchangeAdapter,
        symbol: &Symbol,
        order_id: &OrderId,
    ) -> Result<OrderStatus, ExchangeError> {
        match adapter.query(symbol, order_id).await {
            Ok(status) => Ok(status),
            Err(error) if error.is_transport() => {
                debug!(%order_id, %error, "query transport error, retrying once");
                adapter.query(symbol, order_id).await
            }
            Err(error) => Err(error),
        }
    }

    /// Cancel on timeout, then settle at whatever filled by cancel-ack.
    async fn cancel_and_settle(
        &self,
        adapter: &dyn ExchangeAdapter,
        symbol: &Symbol,
        order_id: &OrderId,
        filled_base: Amount,
        filled_quote: Amount,
        avg_price: Option<Price>,
    ) -> LegOutcome {
        match adapter.cancel(symbol, order_id).await {
            Ok(()) | Err(ExchangeError::AlreadyTerminal) => {}
            Err(error) if error.is_transport() => {
                // Retry once; a cancel lost in transit leaves the leg live.
                if let Err(error) = adapter.cancel(symbol, order_id).await {
                    if !matches!(error, ExchangeError::AlreadyTerminal) {
                        warn!(%order_id, %error, "cancel failed after retry");
                        return LegOutcome::unknown(filled_base, filled_quote, avg_price);
                    }
                }
            }
            Err(ExchangeError::NotFound) => {
                warn!(%order_id, "cancel target not found");
                return LegOutcome::unknown(filled_base, filled_quote, avg_price);
            }
            Err(error) => {
                warn!(%order_id, %error, "cancel failed");
                return LegOutcome::unknown(filled_base, filled_quote, avg_price);
            }
        }

        // The cancel ack races the last fills; one final query settles the
        // realized quantity.
        match self.query_once_retried(adapter, symbol, order_id).await {
            Ok(status) => {
                let filled_base = status.filled_base.max(filled_base);
                let state = match status.state {
                    OrderState::Filled => LegState::Filled,
                    _ => LegState::Cancelled,
                };
                LegOutcome {
                    state,
                    filled_base,
                    filled_quote: status.filled_quote.max(filled_quote),
                    avg_price: status.avg_price.or(avg_price),
                }
            }
            Err(error) => {
                warn!(%order_id, %error, "post-cancel query failed");
                LegOutcome::unknown(filled_base, filled_quote, avg_price)
            }
        }
    }
}

fn map_state(status: &OrderStatus, requested_base: Amount) -> LegState {
    match status.state {
        OrderState::New => LegState::Submitted,
        OrderState::PartiallyFilled => LegState::PartiallyFilled,
        OrderState::Filled => LegState::Filled,
        OrderState::Cancelled => LegState::Cancelled,
        OrderState::Rejected => LegState::Rejected,
    }
    .refine(status.filled_base, requested_base)
}

trait Refine {
    fn refine(self, filled: Amount, requested: Amount) -> LegState;
}

impl Refine for LegState {
    /// Some venues report `NEW` while fills are already accruing; treat a
    /// non-zero fill below the request as a partial fill.
    fn refine(self, filled: Amount, requested: Amount) -> LegState {
        match self {
            Self::Submitted if filled > Amount::ZERO && filled < requested => Self::PartiallyFilled,
            Self::Submitted | Self::PartiallyFilled if filled >= requested && filled > Amount::ZERO => {
                Self::Filled
            }
            other => other,
        }
    }
}
