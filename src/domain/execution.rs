//! Leg states, recovery actions, and terminal cycle records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money::{Amount, Price};

/// State of one order leg.
///
/// Transitions are monotonic except `PartiallyFilled -> PartiallyFilled`
/// (filled size only grows) and `* -> Unknown` on query failure. `Unknown`
/// is the sole entry point into recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegState {
    Idle,
    Submitted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Unknown,
}

impl LegState {
    /// Terminal states end the polling loop.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Unknown
        )
    }
}

impl std::fmt::Display for LegState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Submitted => "submitted",
            Self::PartiallyFilled => "partially_filled",
            Self::Filled => "filled",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One action taken by the recovery planner, recorded for the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Re-queried an `Unknown` leg until it resolved.
    RequeriedLeg { attempts: u32, filled_base: Amount },
    /// Re-placed the market sell after a rejection.
    RetriedMarketSell { attempt: u32 },
    /// Placed a discounted limit sell as a last automated resort.
    EmergencySell { limit_price: Price },
    /// Gave up and marked the position stuck.
    MarkedStuck { reason: String },
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Both legs done, inventory back to quote-only.
    Completed,
    /// Buy leg terminal with nothing filled; no position was held.
    ZeroFill,
    /// Sell side needed the recovery planner but inventory was unwound.
    Recovered,
    /// Automated unwind failed; operator intervention required.
    Stuck,
    /// Dry-run cycle; no orders reached a venue.
    Simulated,
}

/// Append-only record of one terminal cycle. Never mutated after emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub cycle_id: u64,
    pub symbol: String,
    pub outcome: CycleOutcome,
    pub dry_run: bool,

    pub planned_base: Amount,
    pub buy_limit_price: Price,
    pub expected_profit: Amount,

    pub buy_order_id: Option<String>,
    pub sell_order_id: Option<String>,
    pub bought_base: Amount,
    pub buy_quote_spent: Amount,
    pub sold_base: Amount,
    pub sell_quote_received: Amount,
    pub realized_profit: Amount,

    pub recovery_actions: Vec<RecoveryAction>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Persistent marker for a position the bot could not unwind.
///
/// Survives restarts; the process refuses to trade while one exists, and
/// the operator clears it explicitly after manual reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StuckMarker {
    pub cycle_id: u64,
    pub venue: String,
    pub symbol: String,
    pub base_amount: Decimal,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(LegState::Filled.is_terminal());
        assert!(LegState::Cancelled.is_terminal());
        assert!(LegState::Rejected.is_terminal());
        assert!(LegState::Unknown.is_terminal());
        assert!(!LegState::Idle.is_terminal());
        assert!(!LegState::Submitted.is_terminal());
        assert!(!LegState::PartiallyFilled.is_terminal());
    }

    #[test]
    fn recovery_actions_serialize_with_tag() {
        let json = serde_json::to_string(&RecoveryAction::RetriedMarketSell { attempt: 2 }).unwrap();
        assert!(json.contains("\"action\":\"retried_market_sell\""));
    }
}
