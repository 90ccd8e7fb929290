//! Application configuration loading and validation.
//!
//! Configuration is loaded from a TOML file. Credentials never live in
//! the file; they come from `MEXC_API_KEY` / `MEXC_API_SECRET` /
//! `BINGX_API_KEY` / `BINGX_API_SECRET` environment variables at runtime.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use crate::domain::Symbol;
use crate::engine::{
    CoordinatorConfig, EvaluatorConfig, FeeSchedule, LegConfig, RecoveryConfig,
};
use crate::error::{Error, Result};
use crate::market::FallbackConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Canonical pair, `BASE-QUOTE` form.
    pub symbol: String,
    /// Evaluate and gate but never place orders.
    #[serde(default)]
    pub dry_run: bool,
    pub engine: EngineConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Absolute minimum expected profit in quote units. Required.
    pub min_profit_quote: Decimal,
    /// Minimum expected profit as percent of cost. Required.
    pub min_profit_pct: Decimal,
    /// Cap on base size per cycle. Required.
    pub max_base_per_trade: Decimal,
    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: Decimal,
    #[serde(default = "default_recheck_interval_ms")]
    pub recheck_interval_ms: u64,
    #[serde(default = "default_order_timeout_ms")]
    pub order_timeout_ms: u64,
    #[serde(default = "default_order_poll_ms")]
    pub order_poll_ms: u64,
    #[serde(default = "default_pre_exec_price_tolerance_pct")]
    pub pre_exec_price_tolerance_pct: Decimal,
    #[serde(default = "default_emergency_discount_pct")]
    pub emergency_discount_pct: Decimal,
    /// Quote balance assumed in dry-run mode.
    #[serde(default)]
    pub paper_quote_balance: Decimal,
}

fn default_max_slippage_bps() -> Decimal {
    dec!(10)
}

fn default_recheck_interval_ms() -> u64 {
    1000
}

fn default_order_timeout_ms() -> u64 {
    30_000
}

fn default_order_poll_ms() -> u64 {
    500
}

fn default_pre_exec_price_tolerance_pct() -> Decimal {
    dec!(2)
}

fn default_emergency_discount_pct() -> Decimal {
    dec!(1)
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    #[serde(default = "default_order_book_depth")]
    pub order_book_depth: usize,
    #[serde(default = "default_mexc_ping_interval_s")]
    pub mexc_ping_interval_s: u64,
    #[serde(default = "default_true")]
    pub mexc_rest_fallback: bool,
    #[serde(default = "default_mexc_stale_ms")]
    pub mexc_stale_ms: u64,
    #[serde(default = "default_mexc_rest_max_deviation_quote")]
    pub mexc_rest_max_deviation_quote: Decimal,
    #[serde(default = "default_order_book_depth")]
    pub bingx_depth: usize,
    #[serde(default = "default_mexc_base_increment")]
    pub mexc_base_increment: Decimal,
    #[serde(default = "default_bingx_base_increment")]
    pub bingx_base_increment: Decimal,
}

fn default_order_book_depth() -> usize {
    20
}

fn default_mexc_ping_interval_s() -> u64 {
    20
}

const fn default_true() -> bool {
    true
}

fn default_mexc_stale_ms() -> u64 {
    2000
}

fn default_mexc_rest_max_deviation_quote() -> Decimal {
    dec!(50)
}

fn default_mexc_base_increment() -> Decimal {
    dec!(0.000001)
}

fn default_bingx_base_increment() -> Decimal {
    dec!(0.0001)
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            order_book_depth: default_order_book_depth(),
            mexc_ping_interval_s: default_mexc_ping_interval_s(),
            mexc_rest_fallback: true,
            mexc_stale_ms: default_mexc_stale_ms(),
            mexc_rest_max_deviation_quote: default_mexc_rest_max_deviation_quote(),
            bingx_depth: default_order_book_depth(),
            mexc_base_increment: default_mexc_base_increment(),
            bingx_base_increment: default_bingx_base_increment(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_executions_path")]
    pub executions_path: PathBuf,
    #[serde(default = "default_stuck_marker_path")]
    pub stuck_marker_path: PathBuf,
}

fn default_executions_path() -> PathBuf {
    PathBuf::from("data/executions.jsonl")
}

fn default_stuck_marker_path() -> PathBuf {
    PathBuf::from("data/stuck.json")
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            executions_path: default_executions_path(),
            stuck_marker_path: default_stuck_marker_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!(
                "cannot read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let config: Self =
            toml::from_str(&content).map_err(|e| Error::Config(format!("parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        Symbol::parse(&self.symbol)
            .map_err(|e| Error::Config(format!("invalid symbol: {e}")))?;

        let positive = [
            ("min_profit_quote", self.engine.min_profit_quote),
            ("max_base_per_trade", self.engine.max_base_per_trade),
            ("max_slippage_bps", self.engine.max_slippage_bps),
        ];
        for (name, value) in positive {
            if value <= Decimal::ZERO {
                return Err(Error::Config(format!("{name} must be positive, got {value}")));
            }
        }
        if self.engine.min_profit_pct < Decimal::ZERO {
            return Err(Error::Config("min_profit_pct must not be negative".into()));
        }
        if self.engine.pre_exec_price_tolerance_pct <= Decimal::ZERO
            || self.engine.pre_exec_price_tolerance_pct > dec!(100)
        {
            return Err(Error::Config(
                "pre_exec_price_tolerance_pct must be in (0, 100]".into(),
            ));
        }
        if self.engine.emergency_discount_pct < Decimal::ZERO
            || self.engine.emergency_discount_pct >= dec!(100)
        {
            return Err(Error::Config(
                "emergency_discount_pct must be in [0, 100)".into(),
            ));
        }
        for (name, value) in [
            ("recheck_interval_ms", self.engine.recheck_interval_ms),
            ("order_timeout_ms", self.engine.order_timeout_ms),
            ("order_poll_ms", self.engine.order_poll_ms),
            ("mexc_stale_ms", self.market.mexc_stale_ms),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be positive")));
            }
        }
        if self.market.order_book_depth == 0 || self.market.bingx_depth == 0 {
            return Err(Error::Config("order book depth must be positive".into()));
        }
        if self.dry_run && self.engine.paper_quote_balance <= Decimal::ZERO {
            return Err(Error::Config(
                "dry_run requires a positive paper_quote_balance".into(),
            ));
        }
        Ok(())
    }

    /// Parsed canonical symbol. Call after [`Config::load`].
    pub fn parsed_symbol(&self) -> Result<Symbol> {
        Symbol::parse(&self.symbol).map_err(Error::from)
    }

    #[must_use]
    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            min_profit_quote: self.engine.min_profit_quote,
            min_profit_pct: self.engine.min_profit_pct,
            max_base_per_trade: self.engine.max_base_per_trade,
            max_slippage_bps: self.engine.max_slippage_bps,
            fees: FeeSchedule::zero(),
        }
    }

    #[must_use]
    pub fn leg_config(&self) -> LegConfig {
        LegConfig {
            poll_interval: Duration::from_millis(self.engine.order_poll_ms),
            timeout: Duration::from_millis(self.engine.order_timeout_ms),
            ..LegConfig::default()
        }
    }

    #[must_use]
    pub fn recovery_config(&self) -> RecoveryConfig {
        RecoveryConfig {
            emergency_discount_pct: self.engine.emergency_discount_pct,
            ..RecoveryConfig::default()
        }
    }

    #[must_use]
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            recheck_interval: Duration::from_millis(self.engine.recheck_interval_ms),
            pre_exec_price_tolerance_pct: self.engine.pre_exec_price_tolerance_pct,
            order_book_depth: self.market.order_book_depth,
            dry_run: self.dry_run,
            paper_quote_balance: self.engine.paper_quote_balance,
        }
    }

    #[must_use]
    pub fn mexc_fallback_config(&self) -> FallbackConfig {
        FallbackConfig {
            stale_after: Duration::from_millis(self.market.mexc_stale_ms),
            max_deviation: self.market.mexc_rest_max_deviation_quote,
            depth: self.market.order_book_depth,
        }
    }

    pub fn init_logging(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.logging.level));

        match self.logging.format.as_str() {
            "json" => {
                fmt().json().with_env_filter(filter).init();
            }
            _ => {
                fmt().with_env_filter(filter).init();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        symbol = "BTC-USDC"

        [engine]
        min_profit_quote = "10"
        min_profit_pct = "0.1"
        max_base_per_trade = "0.1"
    "#;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config =
            toml::from_str(toml_str).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config = parse(MINIMAL).unwrap();
        assert_eq!(config.engine.recheck_interval_ms, 1000);
        assert_eq!(config.engine.order_timeout_ms, 30_000);
        assert_eq!(config.engine.order_poll_ms, 500);
        assert_eq!(config.engine.pre_exec_price_tolerance_pct, dec!(2));
        assert_eq!(config.market.mexc_stale_ms, 2000);
        assert_eq!(config.market.mexc_ping_interval_s, 20);
        assert!(config.market.mexc_rest_fallback);
        assert!(!config.dry_run);
    }

    #[test]
    fn missing_required_key_fails() {
        let result = parse(
            r#"
            symbol = "BTC-USDC"

            [engine]
            min_profit_quote = "10"
            min_profit_pct = "0.1"
        "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn invalid_symbol_fails() {
        let bad = MINIMAL.replace("BTC-USDC", "BTCUSDC");
        assert!(parse(&bad).is_err());
    }

    #[test]
    fn out_of_range_tolerance_fails() {
        let bad = r#"
            symbol = "BTC-USDC"

            [engine]
            min_profit_quote = "10"
            min_profit_pct = "0.1"
            max_base_per_trade = "0.1"
            pre_exec_price_tolerance_pct = "0"
        "#;
        assert!(parse(bad).is_err());
    }

    #[test]
    fn dry_run_needs_paper_balance() {
        let bad = MINIMAL.replace("symbol = \"BTC-USDC\"", "symbol = \"BTC-USDC\"\ndry_run = true");
        assert!(parse(&bad).is_err());

        let good = bad.replace(
            "max_base_per_trade = \"0.1\"",
            "max_base_per_trade = \"0.1\"\npaper_quote_balance = \"1000\"",
        );
        assert!(parse(&good).is_ok());
    }

    #[test]
    fn config_maps_to_engine_settings() {
        let config = parse(MINIMAL).unwrap();
        let evaluator = config.evaluator_config();
        assert_eq!(evaluator.min_profit_quote, dec!(10));
        assert_eq!(evaluator.fees, FeeSchedule::zero());

        let legs = config.leg_config();
        assert_eq!(legs.poll_interval, Duration::from_millis(500));
        assert_eq!(legs.timeout, Duration::from_secs(30));
    }
}
