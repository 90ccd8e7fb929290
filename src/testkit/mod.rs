//! Builders and fakes for tests.
//!
//! Provides concise book factories and a scriptable [`MockAdapter`] so
//! tests focus on assertions rather than construction boilerplate.

use std::collections::VecDeque;
use std::str::FromStr;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::domain::{Amount, BookSnapshot, Price, PriceLevel, Symbol, Venue};
use crate::exchange::{
    ExchangeAdapter, ExchangeError, OrderId, OrderState, OrderStatus, Side,
};

/// The pair every test trades.
#[must_use]
pub fn symbol() -> Symbol {
    Symbol::parse("BTC-USDC").expect("literal symbol")
}

fn levels(raw: &[(&str, &str)]) -> Vec<PriceLevel> {
    raw.iter()
        .map(|(price, size)| {
            PriceLevel::new(
                Decimal::from_str(price).expect("literal price"),
                Decimal::from_str(size).expect("literal size"),
            )
        })
        .collect()
}

/// Build a validated snapshot for any venue.
#[must_use]
pub fn book(
    venue: Venue,
    bids: &[(&str, &str)],
    asks: &[(&str, &str)],
    update_id: u64,
) -> BookSnapshot {
    BookSnapshot::try_new(venue, symbol(), levels(bids), levels(asks), update_id, 0)
        .expect("test book must satisfy invariants")
}

/// MEXC-side book.
#[must_use]
pub fn mexc_book(bids: &[(&str, &str)], asks: &[(&str, &str)], update_id: u64) -> BookSnapshot {
    book(Venue::Mexc, bids, asks, update_id)
}

/// BingX-side book.
#[must_use]
pub fn bingx_book(bids: &[(&str, &str)], asks: &[(&str, &str)], update_id: u64) -> BookSnapshot {
    book(Venue::Bingx, bids, asks, update_id)
}

/// A filled-order status.
#[must_use]
pub fn filled_status(filled_base: &str, avg_price: &str) -> OrderStatus {
    let filled_base = Decimal::from_str(filled_base).expect("literal base");
    let avg_price = Decimal::from_str(avg_price).expect("literal price");
    OrderStatus {
        state: OrderState::Filled,
        filled_base,
        filled_quote: filled_base * avg_price,
        avg_price: Some(avg_price),
    }
}

/// A partially-filled status.
#[must_use]
pub fn partial_status(filled_base: &str, avg_price: &str) -> OrderStatus {
    let filled_base = Decimal::from_str(filled_base).expect("literal base");
    let avg_price = Decimal::from_str(avg_price).expect("literal price");
    OrderStatus {
        state: OrderState::PartiallyFilled,
        filled_base,
        filled_quote: filled_base * avg_price,
        avg_price: Some(avg_price),
    }
}

/// A cancelled status carrying whatever filled before the cancel.
#[must_use]
pub fn cancelled_status(filled_base: &str, avg_price: &str) -> OrderStatus {
    let filled_base = Decimal::from_str(filled_base).expect("literal base");
    let avg_price = Decimal::from_str(avg_price).expect("literal price");
    let filled_quote = filled_base * avg_price;
    OrderStatus {
        state: OrderState::Cancelled,
        filled_base,
        filled_quote,
        avg_price: (filled_base > Amount::ZERO).then_some(avg_price),
    }
}

/// An unfilled `NEW` status.
#[must_use]
pub fn new_status() -> OrderStatus {
    OrderStatus {
        state: OrderState::New,
        filled_base: Amount::ZERO,
        filled_quote: Amount::ZERO,
        avg_price: None,
    }
}

/// One order placement observed by the mock.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub side: Side,
    pub base_amount: Amount,
    /// `None` for market orders.
    pub limit_price: Option<Price>,
}

/// Scriptable adapter: responses are queues popped call-by-call; the last
/// entry of the query queue is sticky so polling loops keep seeing the
/// final state.
pub struct MockAdapter {
    venue: Venue,
    base_increment: Amount,
    balance: Mutex<Amount>,
    books: Mutex<VecDeque<Result<BookSnapshot, ExchangeError>>>,
    place_results: Mutex<VecDeque<Result<OrderId, ExchangeError>>>,
    cancel_results: Mutex<VecDeque<Result<(), ExchangeError>>>,
    query_results: Mutex<VecDeque<Result<OrderStatus, ExchangeError>>>,
    pub placed: Mutex<Vec<PlacedOrder>>,
    pub cancelled: Mutex<Vec<OrderId>>,
}

impl MockAdapter {
    #[must_use]
    pub fn new(venue: Venue) -> Self {
        Self {
            venue,
            base_increment: Decimal::new(1, 4), // 0.0001
            balance: Mutex::new(Amount::ZERO),
            books: Mutex::new(VecDeque::new()),
            place_results: Mutex::new(VecDeque::new()),
            cancel_results: Mutex::new(VecDeque::new()),
            query_results: Mutex::new(VecDeque::new()),
            placed: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_balance(self, balance: Amount) -> Self {
        *self.balance.lock() = balance;
        self
    }

    pub fn push_book(&self, result: Result<BookSnapshot, ExchangeError>) {
        self.books.lock().push_back(result);
    }

    pub fn push_place(&self, result: Result<OrderId, ExchangeError>) {
        self.place_results.lock().push_back(result);
    }

    pub fn push_cancel(&self, result: Result<(), ExchangeError>) {
        self.cancel_results.lock().push_back(result);
    }

    pub fn push_query(&self, result: Result<OrderStatus, ExchangeError>) {
        self.query_results.lock().push_back(result);
    }

    /// Pop from the front; keep the final entry around for re-reads.
    fn pop_sticky<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
        let mut queue = queue.lock();
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl ExchangeAdapter for MockAdapter {
    fn venue(&self) -> Venue {
        self.venue
    }

    fn base_increment(&self) -> Amount {
        self.base_increment
    }

    async fn fetch_orderbook(
        &self,
        _symbol: &Symbol,
        _depth: usize,
    ) -> Result<BookSnapshot, ExchangeError> {
        self.books
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ExchangeError::Transport("no scripted book".into())))
    }

    async fn place_limit(
        &self,
        _symbol: &Symbol,
        side: Side,
        base_amount: Amount,
        limit_price: Price,
    ) -> Result<OrderId, ExchangeError> {
        self.placed.lock().push(PlacedOrder {
            side,
            base_amount,
            limit_price: Some(limit_price),
        });
        self.place_results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ExchangeError::Transport("no scripted placement".into())))
    }

    async fn place_market(
        &self,
        _symbol: &Symbol,
        side: Side,
        base_amount: Amount,
    ) -> Result<OrderId, ExchangeError> {
        self.placed.lock().push(PlacedOrder {
            side,
            base_amount,
            limit_price: None,
        });
        self.place_results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ExchangeError::Transport("no scripted placement".into())))
    }

    async fn cancel(&self, _symbol: &Symbol, order_id: &OrderId) -> Result<(), ExchangeError> {
        self.cancelled.lock().push(order_id.clone());
        self.cancel_results.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn query(
        &self,
        _symbol: &Symbol,
        _order_id: &OrderId,
    ) -> Result<OrderStatus, ExchangeError> {
        Self::pop_sticky(&self.query_results)
            .unwrap_or_else(|| Err(ExchangeError::Transport("no scripted status".into())))
    }

    async fn fetch_balance(&self, _asset: &str) -> Result<Amount, ExchangeError> {
        Ok(*self.balance.lock())
    }
}
