//! Shared live-book store.
//!
//! Single writer per venue, many readers. The writer publishes a whole
//! immutable snapshot behind an `Arc` swap, so a reader either sees the
//! previous book or the new one, never a half-replaced view. No lock is
//! held across an await point.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::domain::{BookSnapshot, DomainError, Venue};

#[derive(Default)]
struct VenueBook {
    snapshot: RwLock<Option<Arc<BookSnapshot>>>,
    last_update: RwLock<Option<Instant>>,
    discarded: AtomicU64,
}

/// Latest validated book per venue.
#[derive(Default)]
pub struct BookStore {
    mexc: VenueBook,
    bingx: VenueBook,
}

impl BookStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn venue_book(&self, venue: Venue) -> &VenueBook {
        match venue {
            Venue::Mexc => &self.mexc,
            Venue::Bingx => &self.bingx,
        }
    }

    /// Publish a snapshot, enforcing per-venue `update_id` monotonicity.
    ///
    /// # Errors
    ///
    /// [`DomainError::StaleUpdateId`] when the snapshot's id regressed;
    /// the snapshot is discarded and the discard counter incremented.
    pub fn publish(&self, snapshot: BookSnapshot) -> Result<(), DomainError> {
        let book = self.venue_book(snapshot.venue());

        {
            let mut current = book.snapshot.write();
            if let Some(existing) = current.as_ref() {
                if snapshot.update_id() < existing.update_id() {
                    let last = existing.update_id();
                    drop(current);
                    book.discarded.fetch_add(1, Ordering::Relaxed);
                    return Err(DomainError::StaleUpdateId {
                        last,
                        got: snapshot.update_id(),
                    });
                }
            }
            *current = Some(Arc::new(snapshot));
        }
        *book.last_update.write() = Some(Instant::now());
        Ok(())
    }

    /// Count a snapshot that failed validation upstream.
    pub fn record_discard(&self, venue: Venue) {
        self.venue_book(venue).discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Latest book for a venue, if any has been published.
    #[must_use]
    pub fn latest(&self, venue: Venue) -> Option<Arc<BookSnapshot>> {
        self.venue_book(venue).snapshot.read().clone()
    }

    /// Both venues' latest books, read under a consistent order.
    #[must_use]
    pub fn latest_pair(&self) -> (Option<Arc<BookSnapshot>>, Option<Arc<BookSnapshot>>) {
        (self.latest(Venue::Mexc), self.latest(Venue::Bingx))
    }

    /// Time since the venue's book was last refreshed.
    #[must_use]
    pub fn age(&self, venue: Venue) -> Option<Duration> {
        self.venue_book(venue)
            .last_update
            .read()
            .map(|at| at.elapsed())
    }

    /// Snapshots discarded for this venue (invalid or stale-id).
    #[must_use]
    pub fn discarded_count(&self, venue: Venue) -> u64 {
        self.venue_book(venue).discarded.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PriceLevel, Symbol};
    use rust_decimal_macros::dec;

    fn snapshot(venue: Venue, update_id: u64) -> BookSnapshot {
        BookSnapshot::try_new(
            venue,
            Symbol::parse("BTC-USDC").unwrap(),
            vec![PriceLevel::new(dec!(40000), dec!(1))],
            vec![PriceLevel::new(dec!(40010), dec!(1))],
            update_id,
            0,
        )
        .unwrap()
    }

    #[test]
    fn publishes_and_reads_back() {
        let store = BookStore::new();
        assert!(store.latest(Venue::Mexc).is_none());

        store.publish(snapshot(Venue::Mexc, 1)).unwrap();
        let book = store.latest(Venue::Mexc).unwrap();
        assert_eq!(book.update_id(), 1);
        assert!(store.age(Venue::Mexc).is_some());
    }

    #[test]
    fn venues_are_independent() {
        let store = BookStore::new();
        store.publish(snapshot(Venue::Mexc, 5)).unwrap();
        assert!(store.latest(Venue::Bingx).is_none());

        store.publish(snapshot(Venue::Bingx, 1)).unwrap();
        let (mexc, bingx) = store.latest_pair();
        assert_eq!(mexc.unwrap().update_id(), 5);
        assert_eq!(bingx.unwrap().update_id(), 1);
    }

    #[test]
    fn regressed_update_id_is_discarded() {
        let store = BookStore::new();
        store.publish(snapshot(Venue::Mexc, 10)).unwrap();

        let err = store.publish(snapshot(Venue::Mexc, 9)).unwrap_err();
        assert_eq!(err, DomainError::StaleUpdateId { last: 10, got: 9 });
        assert_eq!(store.latest(Venue::Mexc).unwrap().update_id(), 10);
        assert_eq!(store.discarded_count(Venue::Mexc), 1);
    }

    #[test]
    fn equal_update_id_is_accepted() {
        let store = BookStore::new();
        store.publish(snapshot(Venue::Mexc, 10)).unwrap();
        store.publish(snapshot(Venue::Mexc, 10)).unwrap();
        assert_eq!(store.discarded_count(Venue::Mexc), 0);
    }
}
