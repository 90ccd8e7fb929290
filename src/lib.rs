//! Spreadrunner - cross-venue BTC/USDC spot arbitrage engine.
//!
//! Buys at the best ask on MEXC with a limit order and unwinds the fill
//! into BingX bids with a market order, only when the volume-weighted
//! proceeds clear the configured profit thresholds.
//!
//! # Architecture
//!
//! ```text
//! src/
//! ├── domain/    # Venue-agnostic types: books, depth curves, plans, records
//! ├── exchange/  # Adapter trait + MEXC / BingX implementations
//! ├── market/    # Live book store, stream fan-in, REST staleness fallback
//! ├── engine/    # Evaluator, leg state machine, coordinator, recovery
//! └── testkit/   # Builders and a scriptable mock adapter for tests
//! ```

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod market;
pub mod testkit;
