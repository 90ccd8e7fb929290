//! Opportunity evaluation and paired-order execution.

mod coordinator;
mod evaluator;
mod ledger;
mod leg;
mod recovery;
mod stats;

pub use coordinator::{Coordinator, CoordinatorConfig, TickReport};
pub use evaluator::{Evaluator, EvaluatorConfig, FeeSchedule, Reject};
pub use ledger::ExecutionLedger;
pub use leg::{LegConfig, LegDriver, LegOutcome};
pub use recovery::{RecoveryConfig, RecoveryPlanner, UnwindResult};
pub use stats::SessionStats;
