//! Paired-execution coordinator.
//!
//! Ticks at a fixed cadence: evaluate, re-validate through the
//! pre-execution gate, then drive the buy leg and only after its terminal
//! fill the sell leg, sized by what actually filled. Desyncs route
//! through the recovery planner; every terminal cycle lands in the
//! append-only ledger. A stuck position halts trading until the operator
//! clears the marker.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::domain::money::HUNDRED;
use crate::domain::{
    Amount, BookSnapshot, CycleOutcome, ExecutionRecord, LegState, RecoveryAction, StuckMarker,
    Symbol, TradePlan,
};
use crate::engine::evaluator::{Evaluator, Reject};
use crate::engine::ledger::ExecutionLedger;
use crate::engine::leg::{LegDriver, LegOutcome};
use crate::engine::recovery::RecoveryPlanner;
use crate::engine::stats::SessionStats;
use crate::error::{Error, Result};
use crate::exchange::{ExchangeAdapter, Side};
use crate::market::BookStore;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Main-loop tick period.
    pub recheck_interval: Duration,
    /// Max best-ask drift (percent) tolerated between plan and gate.
    pub pre_exec_price_tolerance_pct: Decimal,
    /// Depth requested on gate-time REST fetches.
    pub order_book_depth: usize,
    /// Evaluate and gate but never place orders.
    pub dry_run: bool,
    /// Quote balance assumed in dry-run mode.
    pub paper_quote_balance: Amount,
}

/// What one tick did, for logs and tests.
#[derive(Debug)]
pub enum TickReport {
    /// One or both books missing; nothing to evaluate.
    NoData,
    NoOpportunity(Reject),
    /// Plan failed re-validation; no orders were placed.
    GateAbandoned,
    Executed(Box<ExecutionRecord>),
    /// Trading halted; marker persisted.
    Stuck,
}

pub struct Coordinator {
    symbol: Symbol,
    buy_adapter: Arc<dyn ExchangeAdapter>,
    sell_adapter: Arc<dyn ExchangeAdapter>,
    store: Arc<BookStore>,
    evaluator: Evaluator,
    legs: LegDriver,
    recovery: RecoveryPlanner,
    ledger: ExecutionLedger,
    config: CoordinatorConfig,
    stats: SessionStats,
    cycle_id: u64,
}

impl Coordinator {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        symbol: Symbol,
        buy_adapter: Arc<dyn ExchangeAdapter>,
        sell_adapter: Arc<dyn ExchangeAdapter>,
        store: Arc<BookStore>,
        evaluator: Evaluator,
        legs: LegDriver,
        recovery: RecoveryPlanner,
        ledger: ExecutionLedger,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            symbol,
            buy_adapter,
            sell_adapter,
            store,
            evaluator,
            legs,
            recovery,
            ledger,
            config,
            stats: SessionStats::default(),
            cycle_id: 0,
        }
    }

    #[must_use]
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Main loop. Returns when the stop flag flips, or with an error when
    /// a position gets stuck. In-flight legs always reach a terminal
    /// state before this returns.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> Result<()> {
        if let Some(marker) = self.ledger.stuck_marker()? {
            return Err(Error::StuckPosition {
                venue: marker.venue,
                reason: format!(
                    "unresolved stuck position from cycle {} ({} {} held): {}",
                    marker.cycle_id, marker.base_amount, marker.symbol, marker.reason
                ),
            });
        }

        info!(
            symbol = %self.symbol,
            dry_run = self.config.dry_run,
            tick_ms = self.config.recheck_interval.as_millis() as u64,
            "coordinator started"
        );

        let mut ticker = interval(self.config.recheck_interval);
        loop {
            tokio::select! {
                _ = stop.changed() => {
                    if *stop.borrow() {
                        info!("stop signal received");
                        self.stats.log_summary();
                        return Ok(());
                    }
                }
                _ = ticker.tick() => {
                    match self.tick().await {
                        TickReport::Stuck => {
                            self.stats.log_summary();
                            let marker = self.ledger.stuck_marker()?;
                            let (venue, reason) = marker
                                .map(|m| (m.venue, m.reason))
                                .unwrap_or_else(|| ("unknown".into(), "stuck".into()));
                            return Err(Error::StuckPosition { venue, reason });
                        }
                        report => debug!(?report, "tick complete"),
                    }
                }
            }
        }
    }

    /// One evaluation-to-execution cycle.
    pub async fn tick(&mut self) -> TickReport {
        self.stats.ticks += 1;

        let (Some(buy_book), Some(sell_book)) = self.store.latest_pair() else {
            return TickReport::NoData;
        };

        let Some(balance) = self.quote_balance().await else {
            return TickReport::NoData;
        };

        let plan = match self.evaluator.evaluate(&buy_book, &sell_book, balance) {
            Ok(plan) => plan,
            Err(reject) => {
                debug!(%reject, "no opportunity");
                return TickReport::NoOpportunity(reject);
            }
        };
        self.stats.plans_emitted += 1;
        info!(
            base = %plan.base_amount,
            buy = %plan.buy_limit_price,
            sell_vwap = %plan.expected_sell_vwap,
            profit = %plan.expected_profit,
            profit_bps = %plan.profit_bps,
            "opportunity detected"
        );

        if !self.gate(&plan, balance).await {
            self.stats.gates_failed += 1;
            return TickReport::GateAbandoned;
        }

        let record = self.execute(plan).await;
        if let Err(error) = self.ledger.append(&record) {
            error!(%error, cycle = record.cycle_id, "failed to append execution record");
        }
        self.stats.cycles_executed += 1;
        self.stats.total_realized_profit += record.realized_profit;
        match record.outcome {
            CycleOutcome::ZeroFill => self.stats.zero_fills += 1,
            CycleOutcome::Recovered => self.stats.recoveries += 1,
            CycleOutcome::Stuck => return TickReport::Stuck,
            _ => {}
        }
        TickReport::Executed(Box::new(record))
    }

    async fn quote_balance(&self) -> Option<Amount> {
        if self.config.dry_run {
            return Some(self.config.paper_quote_balance);
        }
        match self.buy_adapter.fetch_balance(self.symbol.quote()).await {
            Ok(balance) => Some(balance),
            Err(error) => {
                warn!(%error, "balance fetch failed, skipping tick");
                None
            }
        }
    }

    /// Pre-execution gate: re-fetch the freshest books and re-validate.
    ///
    /// Passes only if a fresh evaluation still yields a plan and the buy
    /// venue's best ask stayed within the configured tolerance of the
    /// original plan's limit price.
    async fn gate(&self, plan: &TradePlan, balance: Amount) -> bool {
        let fresh_buy = self.freshest_book(&self.buy_adapter).await;
        let fresh_sell = self.freshest_book(&self.sell_adapter).await;
        let (Some(fresh_buy), Some(fresh_sell)) = (fresh_buy, fresh_sell) else {
            warn!("gate: no fresh books available, abandoning plan");
            return false;
        };

        let fresh_plan = match self.evaluator.evaluate(&fresh_buy, &fresh_sell, balance) {
            Ok(fresh_plan) => fresh_plan,
            Err(reject) => {
                info!(%reject, "gate: opportunity gone on fresh books");
                return false;
            }
        };

        let drift_pct = (fresh_plan.buy_limit_price - plan.buy_limit_price).abs()
            / plan.buy_limit_price
            * HUNDRED;
        if drift_pct > self.config.pre_exec_price_tolerance_pct {
            info!(
                planned = %plan.buy_limit_price,
                fresh = %fresh_plan.buy_limit_price,
                drift_pct = %drift_pct,
                "gate: buy price drifted beyond tolerance"
            );
            return false;
        }
        true
    }

    /// Freshest view of one venue's book: REST when it answers, the live
    /// store otherwise.
    async fn freshest_book(&self, adapter: &Arc<dyn ExchangeAdapter>) -> Option<BookSnapshot> {
        match adapter
            .fetch_orderbook(&self.symbol, self.config.order_book_depth)
            .await
        {
            Ok(book) => Some(book),
            Err(error) => {
                debug!(venue = %adapter.venue(), %error, "gate fetch failed, using live view");
                self.store.latest(adapter.venue()).map(|b| (*b).clone())
            }
        }
    }

    async fn execute(&mut self, plan: TradePlan) -> ExecutionRecord {
        self.cycle_id += 1;
        let mut record = ExecutionRecord {
            cycle_id: self.cycle_id,
            symbol: plan.symbol.clone(),
            outcome: CycleOutcome::ZeroFill,
            dry_run: self.config.dry_run,
            planned_base: plan.base_amount,
            buy_limit_price: plan.buy_limit_price,
            expected_profit: plan.expected_profit,
            buy_order_id: None,
            sell_order_id: None,
            bought_base: Amount::ZERO,
            buy_quote_spent: Amount::ZERO,
            sold_base: Amount::ZERO,
            sell_quote_received: Amount::ZERO,
            realized_profit: Amount::ZERO,
            recovery_actions: Vec::new(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };

        if self.config.dry_run {
            info!(
                cycle = record.cycle_id,
                base = %plan.base_amount,
                profit = %plan.expected_profit,
                "dry-run: simulating execution"
            );
            record.outcome = CycleOutcome::Simulated;
            record.bought_base = plan.base_amount;
            record.buy_quote_spent = plan.quote_cost;
            record.sold_base = plan.base_amount;
            record.sell_quote_received = plan.quote_proceeds;
            record.realized_profit = plan.expected_profit;
            record.finished_at = Utc::now();
            return record;
        }

        // Buy leg.
        let buy_outcome = self.drive_buy(&plan, &mut record).await;
        let Some(buy_outcome) = buy_outcome else {
            record.finished_at = Utc::now();
            return record;
        };
        record.bought_base = buy_outcome.filled_base;
        record.buy_quote_spent = buy_outcome.filled_quote;

        if buy_outcome.filled_base <= Amount::ZERO {
            info!(cycle = record.cycle_id, "buy leg ended with zero fill");
            record.outcome = CycleOutcome::ZeroFill;
            record.finished_at = Utc::now();
            return record;
        }

        // Sell leg, sized by the realized buy fill - never the plan.
        self.drive_sell(buy_outcome.filled_base, &mut record).await;
        record.realized_profit = record.sell_quote_received - record.buy_quote_spent;
        record.finished_at = Utc::now();

        if record.outcome == CycleOutcome::Stuck {
            let marker = StuckMarker {
                cycle_id: record.cycle_id,
                venue: self.sell_adapter.venue().to_string(),
                symbol: self.symbol.canonical(),
                base_amount: record.bought_base - record.sold_base,
                reason: "automated unwind exhausted".into(),
                recorded_at: Utc::now(),
            };
            if let Err(error) = self.ledger.set_stuck(&marker) {
                error!(%error, "failed to persist stuck marker");
            }
        }
        record
    }

    /// Drive the buy leg to a terminal state with a known fill, routing
    /// `Unknown` through the recovery planner. `None` aborts the cycle
    /// with whatever is already in the record.
    async fn drive_buy(
        &self,
        plan: &TradePlan,
        record: &mut ExecutionRecord,
    ) -> Option<LegOutcome> {
        let order_id = match self
            .buy_adapter
            .place_limit(
                &self.symbol,
                Side::Buy,
                plan.base_amount,
                plan.buy_limit_price,
            )
            .await
        {
            Ok(id) => id,
            Err(error) => {
                warn!(cycle = record.cycle_id, %error, "buy placement failed, cycle aborted");
                return None;
            }
        };
        record.buy_order_id = Some(order_id.to_string());
        info!(cycle = record.cycle_id, %order_id, "buy leg submitted");

        let outcome = self
            .legs
            .drive(
                self.buy_adapter.as_ref(),
                &self.symbol,
                &order_id,
                plan.base_amount,
            )
            .await;

        if outcome.state != LegState::Unknown {
            return Some(outcome);
        }

        // Ambiguous buy: re-query until the venue answers.
        warn!(cycle = record.cycle_id, %order_id, "buy leg unknown, invoking recovery");
        let resolved = self
            .recovery
            .resolve_unknown(
                self.buy_adapter.as_ref(),
                &self.symbol,
                &order_id,
                &mut record.recovery_actions,
            )
            .await;

        match resolved {
            Some(outcome) if outcome.state.is_terminal() => Some(outcome),
            Some(_) => {
                // The order is alive after all; drive it to terminal.
                Some(
                    self.legs
                        .drive(
                            self.buy_adapter.as_ref(),
                            &self.symbol,
                            &order_id,
                            plan.base_amount,
                        )
                        .await,
                )
            }
            None => {
                error!(cycle = record.cycle_id, %order_id, "buy leg unresolvable, marking stuck");
                record.recovery_actions.push(RecoveryAction::MarkedStuck {
                    reason: "buy leg state unresolvable".into(),
                });
                record.outcome = CycleOutcome::Stuck;
                let marker = StuckMarker {
                    cycle_id: record.cycle_id,
                    venue: self.buy_adapter.venue().to_string(),
                    symbol: self.symbol.canonical(),
                    base_amount: plan.base_amount,
                    reason: "buy leg state unresolvable".into(),
                    recorded_at: Utc::now(),
                };
                if let Err(error) = self.ledger.set_stuck(&marker) {
                    error!(%error, "failed to persist stuck marker");
                }
                None
            }
        }
    }

    /// Drive the sell leg; on any shortfall hand the residual to the
    /// recovery planner.
    async fn drive_sell(&self, base_amount: Amount, record: &mut ExecutionRecord) {
        let dust = self.sell_adapter.base_increment();
        // A clean buy-side requery does not make the cycle "recovered";
        // only sell-side planner work does.
        let actions_before = record.recovery_actions.len();

        match self
            .sell_adapter
            .place_market(&self.symbol, Side::Sell, base_amount)
            .await
        {
            Ok(order_id) => {
                record.sell_order_id = Some(order_id.to_string());
                info!(cycle = record.cycle_id, %order_id, base = %base_amount, "sell leg submitted");

                let mut outcome = self
                    .legs
                    .drive(
                        self.sell_adapter.as_ref(),
                        &self.symbol,
                        &order_id,
                        base_amount,
                    )
                    .await;

                if outcome.state == LegState::Unknown {
                    warn!(cycle = record.cycle_id, %order_id, "sell leg unknown, invoking recovery");
                    match self
                        .recovery
                        .resolve_unknown(
                            self.sell_adapter.as_ref(),
                            &self.symbol,
                            &order_id,
                            &mut record.recovery_actions,
                        )
                        .await
                    {
                        Some(resolved) if resolved.state.is_terminal() => outcome = resolved,
                        Some(_) => {
                            // The order is alive after all; drive it out.
                            outcome = self
                                .legs
                                .drive(
                                    self.sell_adapter.as_ref(),
                                    &self.symbol,
                                    &order_id,
                                    base_amount,
                                )
                                .await;
                        }
                        None => {
                            record.recovery_actions.push(RecoveryAction::MarkedStuck {
                                reason: "sell leg state unresolvable".into(),
                            });
                            record.outcome = CycleOutcome::Stuck;
                            return;
                        }
                    }
                }

                if outcome.state == LegState::Unknown {
                    // Still ambiguous after recovery: selling more could
                    // double-sell, so stop here.
                    record.sold_base = outcome.filled_base;
                    record.sell_quote_received = outcome.filled_quote;
                    record.recovery_actions.push(RecoveryAction::MarkedStuck {
                        reason: "sell leg still ambiguous after recovery".into(),
                    });
                    record.outcome = CycleOutcome::Stuck;
                    return;
                }

                record.sold_base = outcome.filled_base;
                record.sell_quote_received = outcome.filled_quote;

                let residual = base_amount - outcome.filled_base;
                if residual <= Amount::ZERO || residual < dust {
                    record.outcome = if record.recovery_actions.len() == actions_before {
                        CycleOutcome::Completed
                    } else {
                        CycleOutcome::Recovered
                    };
                    return;
                }

                warn!(
                    cycle = record.cycle_id,
                    residual = %residual,
                    "sell leg left residual base, unwinding"
                );
                self.unwind(residual, record).await;
            }
            Err(error) => {
                warn!(cycle = record.cycle_id, %error, "sell placement failed, unwinding");
                self.unwind(base_amount, record).await;
            }
        }
    }

    async fn unwind(&self, residual: Amount, record: &mut ExecutionRecord) {
        let sell_book = self.store.latest(self.sell_adapter.venue());
        let unwind = self
            .recovery
            .unwind_base(
                self.sell_adapter.as_ref(),
                &self.legs,
                &self.symbol,
                residual,
                sell_book.as_deref(),
            )
            .await;

        record.sold_base += unwind.sold_base;
        record.sell_quote_received += unwind.sold_quote;
        if let Some(id) = &unwind.sell_order_id {
            record.sell_order_id = Some(id.to_string());
        }
        record.recovery_actions.extend(unwind.actions.clone());

        record.outcome = if unwind.is_stuck() {
            CycleOutcome::Stuck
        } else {
            CycleOutcome::Recovered
        };
    }
}
