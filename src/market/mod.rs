//! Market-data service: stream fan-in, listener notification, REST fallback.
//!
//! Owns one task per venue stream plus an optional staleness poller for
//! MEXC. Decoded snapshots land in the shared [`BookStore`]; listeners get
//! a venue tag over a broadcast channel and read whichever snapshot is
//! current when they evaluate. Per-venue notification order follows
//! publication order; nothing is promised across venues.

mod store;

pub use store::BookStore;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::domain::{BookSnapshot, Price, Symbol, Venue};
use crate::exchange::{BookStream, ExchangeAdapter};

/// Listener notification: which venue's book changed.
#[derive(Debug, Clone, Copy)]
pub struct BookUpdate {
    pub venue: Venue,
}

/// Settings for the MEXC REST staleness fallback.
#[derive(Debug, Clone)]
pub struct FallbackConfig {
    /// Age beyond which the streamed book counts as stale.
    pub stale_after: Duration,
    /// Max top-of-book deviation (quote units) a REST snapshot may show
    /// against the live book before it is discarded.
    pub max_deviation: Price,
    /// Depth to request on the fallback path.
    pub depth: usize,
}

pub struct MarketDataService {
    store: Arc<BookStore>,
    updates: broadcast::Sender<BookUpdate>,
    tasks: Vec<JoinHandle<()>>,
}

impl MarketDataService {
    #[must_use]
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(256);
        Self {
            store: Arc::new(BookStore::new()),
            updates,
            tasks: Vec::new(),
        }
    }

    #[must_use]
    pub fn store(&self) -> Arc<BookStore> {
        Arc::clone(&self.store)
    }

    /// Subscribe to book-change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BookUpdate> {
        self.updates.subscribe()
    }

    /// Spawn the consume loop for one venue stream.
    pub fn spawn_stream(&mut self, mut stream: Box<dyn BookStream>, mut stop: watch::Receiver<bool>) {
        let store = Arc::clone(&self.store);
        let updates = self.updates.clone();
        let venue = stream.venue();

        self.tasks.push(tokio::spawn(async move {
            info!(%venue, "book stream task started");
            loop {
                tokio::select! {
                    _ = stop.changed() => {
                        if *stop.borrow() {
                            info!(%venue, "book stream task stopping");
                            return;
                        }
                    }
                    snapshot = stream.next_snapshot() => {
                        let Some(snapshot) = snapshot else {
                            warn!(%venue, "book stream ended");
                            return;
                        };
                        publish(&store, &updates, snapshot);
                    }
                }
            }
        }));
    }

    /// Spawn the REST staleness poller for a venue.
    ///
    /// Checks at half the staleness threshold; when the streamed book goes
    /// stale it fetches over REST and applies the snapshot only if the
    /// top of book has not drifted more than `max_deviation` quote units
    /// from the last streamed view.
    pub fn spawn_rest_fallback(
        &mut self,
        adapter: Arc<dyn ExchangeAdapter>,
        symbol: Symbol,
        config: FallbackConfig,
        mut stop: watch::Receiver<bool>,
    ) {
        let store = Arc::clone(&self.store);
        let updates = self.updates.clone();
        let venue = adapter.venue();
        let poll_every = (config.stale_after / 2).max(Duration::from_millis(250));

        self.tasks.push(tokio::spawn(async move {
            info!(%venue, stale_ms = config.stale_after.as_millis() as u64, "rest fallback poller started");
            let mut ticker = interval(poll_every);
            loop {
                tokio::select! {
                    _ = stop.changed() => {
                        if *stop.borrow() {
                            info!(%venue, "rest fallback poller stopping");
                            return;
                        }
                    }
                    _ = ticker.tick() => {
                        let age = store.age(venue);
                        let is_stale = age.map_or(true, |a| a > config.stale_after);
                        if !is_stale {
                            continue;
                        }

                        match adapter.fetch_orderbook(&symbol, config.depth).await {
                            Ok(snapshot) => {
                                apply_fallback(&store, &updates, snapshot, config.max_deviation);
                            }
                            Err(error) => {
                                warn!(%venue, %error, "fallback fetch failed");
                            }
                        }
                    }
                }
            }
        }));
    }

    /// Wait for all owned tasks to finish (after signalling stop).
    pub async fn shutdown(self) {
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

impl Default for MarketDataService {
    fn default() -> Self {
        Self::new()
    }
}

fn publish(store: &BookStore, updates: &broadcast::Sender<BookUpdate>, snapshot: BookSnapshot) {
    let venue = snapshot.venue();
    match store.publish(snapshot) {
        Ok(()) => {
            // No receivers is fine; the coordinator polls the store.
            let _ = updates.send(BookUpdate { venue });
        }
        Err(error) => {
            warn!(%venue, %error, "snapshot discarded");
        }
    }
}

/// Apply a REST snapshot only when it agrees with the live view.
fn apply_fallback(
    store: &BookStore,
    updates: &broadcast::Sender<BookUpdate>,
    snapshot: BookSnapshot,
    max_deviation: Price,
) {
    let venue = snapshot.venue();
    if let Some(current) = store.latest(venue) {
        if top_of_book_deviation(&current, &snapshot) > max_deviation {
            warn!(
                %venue,
                max_deviation = %max_deviation,
                "fallback snapshot deviates from live book, discarded"
            );
            store.record_discard(venue);
            return;
        }
    }

    debug!(%venue, update_id = snapshot.update_id(), "fallback snapshot applied");
    publish(store, updates, snapshot);
}

/// Largest absolute best-bid / best-ask difference between two books.
fn top_of_book_deviation(a: &BookSnapshot, b: &BookSnapshot) -> Price {
    let side_dev = |x: Option<Price>, y: Option<Price>| match (x, y) {
        (Some(x), Some(y)) => (x - y).abs(),
        _ => Price::ZERO,
    };
    let bid_dev = side_dev(
        a.best_bid().map(|l| l.price()),
        b.best_bid().map(|l| l.price()),
    );
    let ask_dev = side_dev(
        a.best_ask().map(|l| l.price()),
        b.best_ask().map(|l| l.price()),
    );
    bid_dev.max(ask_dev)
}
