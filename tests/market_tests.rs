//! Market-data service behavior: fan-in, validation, staleness fallback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal_macros::dec;
use tokio::sync::watch;

use spreadrunner::domain::{BookSnapshot, DomainError, Venue};
use spreadrunner::exchange::BookStream;
use spreadrunner::market::{FallbackConfig, MarketDataService};
use spreadrunner::testkit::{bingx_book, book, mexc_book, symbol, MockAdapter};

/// Replays a fixed list of snapshots, then hangs (like a silent venue).
struct ScriptedStream {
    venue: Venue,
    snapshots: Vec<BookSnapshot>,
}

#[async_trait]
impl BookStream for ScriptedStream {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn next_snapshot(&mut self) -> Option<BookSnapshot> {
        if self.snapshots.is_empty() {
            // Stay silent forever; shutdown comes from the stop flag.
            std::future::pending::<()>().await;
        }
        Some(self.snapshots.remove(0))
    }
}

#[tokio::test]
async fn streamed_snapshots_reach_store_and_listeners_in_order() {
    let mut service = MarketDataService::new();
    let store = service.store();
    let mut updates = service.subscribe();
    let (stop_tx, stop_rx) = watch::channel(false);

    service.spawn_stream(
        Box::new(ScriptedStream {
            venue: Venue::Mexc,
            snapshots: vec![
                mexc_book(&[("40000", "1")], &[("40010", "1")], 1),
                mexc_book(&[("40001", "1")], &[("40011", "1")], 2),
            ],
        }),
        stop_rx,
    );

    for _ in 0..2 {
        let update = updates.recv().await.unwrap();
        assert_eq!(update.venue, Venue::Mexc);
    }
    assert_eq!(store.latest(Venue::Mexc).unwrap().update_id(), 2);

    let _ = stop_tx.send(true);
    service.shutdown().await;
}

#[tokio::test]
async fn regressed_update_ids_do_not_reach_readers() {
    let mut service = MarketDataService::new();
    let store = service.store();
    let mut updates = service.subscribe();
    let (stop_tx, stop_rx) = watch::channel(false);

    service.spawn_stream(
        Box::new(ScriptedStream {
            venue: Venue::Bingx,
            snapshots: vec![
                bingx_book(&[("40100", "1")], &[("40110", "1")], 10),
                // Out-of-order replay from the venue.
                bingx_book(&[("40105", "1")], &[("40115", "1")], 9),
                bingx_book(&[("40106", "1")], &[("40116", "1")], 11),
            ],
        }),
        stop_rx,
    );

    // Only the monotonic snapshots are announced.
    assert_eq!(updates.recv().await.unwrap().venue, Venue::Bingx);
    assert_eq!(updates.recv().await.unwrap().venue, Venue::Bingx);

    let latest = store.latest(Venue::Bingx).unwrap();
    assert_eq!(latest.update_id(), 11);
    assert_eq!(store.discarded_count(Venue::Bingx), 1);

    let _ = stop_tx.send(true);
    service.shutdown().await;
}

#[test]
fn crossed_books_cannot_be_constructed() {
    // Adapters drop crossed frames at the decode boundary; the type
    // system refuses to represent them at all.
    let err = BookSnapshot::try_new(
        Venue::Mexc,
        symbol(),
        vec![spreadrunner::domain::PriceLevel::new(dec!(40020), dec!(1))],
        vec![spreadrunner::domain::PriceLevel::new(dec!(40010), dec!(1))],
        1,
        0,
    )
    .unwrap_err();
    assert!(matches!(err, DomainError::CrossedBook { .. }));
}

#[tokio::test(start_paused = true)]
async fn stalled_stream_falls_back_to_rest() {
    let mut service = MarketDataService::new();
    let store = service.store();
    let (stop_tx, stop_rx) = watch::channel(false);

    // Nothing ever streams; the poller must bootstrap the view from REST.
    let adapter = Arc::new(MockAdapter::new(Venue::Mexc));
    adapter.push_book(Ok(mexc_book(&[("40000", "1")], &[("40010", "1")], 5)));

    service.spawn_rest_fallback(
        Arc::clone(&adapter) as Arc<dyn spreadrunner::exchange::ExchangeAdapter>,
        symbol(),
        FallbackConfig {
            stale_after: Duration::from_millis(500),
            max_deviation: dec!(50),
            depth: 20,
        },
        stop_rx,
    );

    // Give the poller a few ticks of virtual time.
    tokio::time::sleep(Duration::from_secs(2)).await;

    let latest = store.latest(Venue::Mexc).expect("fallback should apply");
    assert_eq!(latest.update_id(), 5);
    assert_eq!(latest.best_bid().unwrap().price(), dec!(40000));

    let _ = stop_tx.send(true);
    service.shutdown().await;
}

#[tokio::test]
async fn listeners_see_both_venues_without_cross_ordering_promise() {
    let mut service = MarketDataService::new();
    let mut updates = service.subscribe();
    let (stop_tx, stop_rx) = watch::channel(false);

    service.spawn_stream(
        Box::new(ScriptedStream {
            venue: Venue::Mexc,
            snapshots: vec![mexc_book(&[("40000", "1")], &[("40010", "1")], 1)],
        }),
        stop_rx.clone(),
    );
    service.spawn_stream(
        Box::new(ScriptedStream {
            venue: Venue::Bingx,
            snapshots: vec![book(Venue::Bingx, &[("40100", "1")], &[("40110", "1")], 1)],
        }),
        stop_rx,
    );

    let mut seen = Vec::new();
    for _ in 0..2 {
        seen.push(updates.recv().await.unwrap().venue);
    }
    seen.sort_by_key(|v| v.as_str());
    assert_eq!(seen, vec![Venue::Bingx, Venue::Mexc]);

    let _ = stop_tx.send(true);
    service.shutdown().await;
}
