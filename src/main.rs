use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use spreadrunner::config::Config;
use spreadrunner::engine::{
    Coordinator, Evaluator, ExecutionLedger, LegDriver, RecoveryPlanner,
};
use spreadrunner::error::{Error, Result};
use spreadrunner::exchange::bingx::{BingxAdapter, BingxBookStream};
use spreadrunner::exchange::mexc::{MexcAdapter, MexcBookStream};
use spreadrunner::exchange::{Credentials, ExchangeAdapter};
use spreadrunner::market::MarketDataService;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config {config_path}: {e}");
            std::process::exit(1);
        }
    };

    config.init_logging();
    info!(config = %config_path, "spreadrunner starting");

    if let Err(e) = run(config).await {
        match &e {
            Error::StuckPosition { venue, reason } => {
                error!(%venue, %reason, "STUCK POSITION - operator intervention required");
                error!("clear the stuck marker file after reconciling balances manually");
            }
            other => error!(error = %other, "fatal error"),
        }
        std::process::exit(1);
    }

    info!("spreadrunner stopped");
}

async fn run(config: Config) -> Result<()> {
    let symbol = config.parsed_symbol()?;
    let ledger = ExecutionLedger::open(
        config.ledger.executions_path.clone(),
        config.ledger.stuck_marker_path.clone(),
    )?;

    // Surface a persisted stuck marker before touching any venue.
    if let Some(marker) = ledger.stuck_marker()? {
        return Err(Error::StuckPosition {
            venue: marker.venue,
            reason: format!(
                "cycle {} left {} {} unreconciled: {}",
                marker.cycle_id, marker.base_amount, marker.symbol, marker.reason
            ),
        });
    }

    let mexc_credentials = Credentials::from_env("MEXC");
    let bingx_credentials = Credentials::from_env("BINGX");
    if !config.dry_run && (mexc_credentials.is_none() || bingx_credentials.is_none()) {
        return Err(Error::Config(
            "live trading requires MEXC_API_KEY/SECRET and BINGX_API_KEY/SECRET".into(),
        ));
    }

    let mexc = Arc::new(MexcAdapter::new(
        mexc_credentials,
        config.market.mexc_base_increment,
    )?);
    let bingx = Arc::new(BingxAdapter::new(
        bingx_credentials,
        config.market.bingx_base_increment,
    )?);

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut market = MarketDataService::new();

    market.spawn_stream(
        Box::new(MexcBookStream::new(
            symbol.clone(),
            config.market.order_book_depth,
            Duration::from_secs(config.market.mexc_ping_interval_s),
        )),
        stop_rx.clone(),
    );
    market.spawn_stream(
        Box::new(BingxBookStream::new(
            symbol.clone(),
            config.market.bingx_depth,
        )),
        stop_rx.clone(),
    );
    if config.market.mexc_rest_fallback {
        market.spawn_rest_fallback(
            Arc::clone(&mexc) as Arc<dyn ExchangeAdapter>,
            symbol.clone(),
            config.mexc_fallback_config(),
            stop_rx.clone(),
        );
    }

    let evaluator = Evaluator::new(config.evaluator_config(), mexc.base_increment());
    let coordinator = Coordinator::new(
        symbol,
        Arc::clone(&mexc) as Arc<dyn ExchangeAdapter>,
        Arc::clone(&bingx) as Arc<dyn ExchangeAdapter>,
        market.store(),
        evaluator,
        LegDriver::new(config.leg_config()),
        RecoveryPlanner::new(config.recovery_config()),
        ledger,
        config.coordinator_config(),
    );

    let mut coordinator_task = tokio::spawn(coordinator.run(stop_rx));

    let result = tokio::select! {
        joined = &mut coordinator_task => {
            joined.map_err(|e| Error::Execution(format!("coordinator task failed: {e}")))?
        }
        _ = signal::ctrl_c() => {
            info!("shutdown signal received, draining in-flight work");
            let _ = stop_tx.send(true);
            // The coordinator finishes its current cycle before exiting;
            // legs are never abandoned in flight.
            coordinator_task
                .await
                .map_err(|e| Error::Execution(format!("coordinator task failed: {e}")))?
        }
    };

    let _ = stop_tx.send(true);
    market.shutdown().await;

    if let Err(e) = &result {
        warn!(error = %e, "coordinator exited with error");
    }
    result
}
