//! Session counters, logged at shutdown.

use rust_decimal::Decimal;
use tracing::info;

#[derive(Debug, Default)]
pub struct SessionStats {
    pub ticks: u64,
    pub plans_emitted: u64,
    pub gates_failed: u64,
    pub cycles_executed: u64,
    pub zero_fills: u64,
    pub recoveries: u64,
    pub total_realized_profit: Decimal,
}

impl SessionStats {
    pub fn log_summary(&self) {
        info!(
            ticks = self.ticks,
            plans = self.plans_emitted,
            gates_failed = self.gates_failed,
            executed = self.cycles_executed,
            zero_fills = self.zero_fills,
            recoveries = self.recoveries,
            realized_profit = %self.total_realized_profit,
            "session summary"
        );
    }
}
