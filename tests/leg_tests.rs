//! Leg state-machine behavior against a scripted venue.

use std::time::Duration;

use rust_decimal_macros::dec;

use spreadrunner::domain::{LegState, Venue};
use spreadrunner::engine::{LegConfig, LegDriver};
use spreadrunner::exchange::{ExchangeError, OrderId, OrderState, OrderStatus};
use spreadrunner::testkit::{
    cancelled_status, filled_status, new_status, partial_status, symbol, MockAdapter,
};

fn driver() -> LegDriver {
    LegDriver::new(LegConfig {
        poll_interval: Duration::from_millis(5),
        timeout: Duration::from_millis(100),
        max_query_failures: 3,
    })
}

fn order() -> OrderId {
    OrderId::new("order-1")
}

#[tokio::test(start_paused = true)]
async fn fills_after_a_partial_report() {
    let adapter = MockAdapter::new(Venue::Mexc);
    adapter.push_query(Ok(new_status()));
    adapter.push_query(Ok(partial_status("0.4", "40000")));
    adapter.push_query(Ok(filled_status("1", "40000")));

    let outcome = driver().drive(&adapter, &symbol(), &order(), dec!(1)).await;

    assert_eq!(outcome.state, LegState::Filled);
    assert_eq!(outcome.filled_base, dec!(1));
    assert_eq!(outcome.filled_quote, dec!(40000));
    assert_eq!(outcome.avg_price, Some(dec!(40000)));
    assert!(adapter.cancelled.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn timeout_cancels_and_settles_at_partial_fill() {
    let adapter = MockAdapter::new(Venue::Mexc);
    // The venue reports a partial fill forever; the driver must cancel at
    // the deadline and settle at 0.6.
    adapter.push_query(Ok(partial_status("0.6", "40000")));

    let outcome = driver().drive(&adapter, &symbol(), &order(), dec!(1)).await;

    assert_eq!(outcome.state, LegState::Cancelled);
    assert_eq!(outcome.filled_base, dec!(0.6));
    assert_eq!(adapter.cancelled.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn fill_racing_the_cancel_is_captured() {
    let adapter = MockAdapter::new(Venue::Mexc);
    // Three polls see a 0.6 partial; fills keep landing while the cancel
    // is in flight and the post-cancel query reports the final 0.8.
    adapter.push_query(Ok(partial_status("0.6", "40000")));
    adapter.push_query(Ok(partial_status("0.6", "40000")));
    adapter.push_query(Ok(partial_status("0.6", "40000")));
    adapter.push_query(Ok(cancelled_status("0.8", "40000")));
    adapter.push_cancel(Ok(()));

    let tight = LegDriver::new(LegConfig {
        poll_interval: Duration::from_millis(5),
        timeout: Duration::from_millis(12),
        max_query_failures: 3,
    });
    let outcome = tight.drive(&adapter, &symbol(), &order(), dec!(1)).await;

    assert_eq!(outcome.state, LegState::Cancelled);
    assert_eq!(outcome.filled_base, dec!(0.8));
    assert_eq!(adapter.cancelled.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn consecutive_query_failures_escalate_to_unknown() {
    let adapter = MockAdapter::new(Venue::Mexc);
    adapter.push_query(Ok(partial_status("0.25", "40000")));
    adapter.push_query(Err(ExchangeError::Transport("timeout".into())));

    let outcome = driver().drive(&adapter, &symbol(), &order(), dec!(1)).await;

    // The sticky transport error exhausts the failure budget; the last
    // acknowledged fill is preserved for recovery.
    assert_eq!(outcome.state, LegState::Unknown);
    assert_eq!(outcome.filled_base, dec!(0.25));
}

#[tokio::test(start_paused = true)]
async fn venue_rejection_is_terminal() {
    let adapter = MockAdapter::new(Venue::Mexc);
    adapter.push_query(Ok(OrderStatus {
        state: OrderState::Rejected,
        filled_base: dec!(0),
        filled_quote: dec!(0),
        avg_price: None,
    }));

    let outcome = driver().drive(&adapter, &symbol(), &order(), dec!(1)).await;

    assert_eq!(outcome.state, LegState::Rejected);
    assert_eq!(outcome.filled_base, dec!(0));
}

#[tokio::test(start_paused = true)]
async fn shrinking_fill_reports_are_ignored() {
    let adapter = MockAdapter::new(Venue::Mexc);
    adapter.push_query(Ok(partial_status("0.5", "40000")));
    // An inconsistent venue momentarily reports less than before.
    adapter.push_query(Ok(partial_status("0.3", "40000")));
    adapter.push_query(Ok(filled_status("1", "40000")));

    let outcome = driver().drive(&adapter, &symbol(), &order(), dec!(1)).await;

    assert_eq!(outcome.state, LegState::Filled);
    assert_eq!(outcome.filled_base, dec!(1));
}

#[tokio::test(start_paused = true)]
async fn zero_fill_timeout_cancels_cleanly() {
    let adapter = MockAdapter::new(Venue::Mexc);
    // The order never fills; the sticky NEW status rides out the timeout.
    adapter.push_query(Ok(new_status()));
    adapter.push_cancel(Ok(()));

    let outcome = driver().drive(&adapter, &symbol(), &order(), dec!(1)).await;

    assert_eq!(outcome.state, LegState::Cancelled);
    assert_eq!(outcome.filled_base, dec!(0));
    assert_eq!(adapter.cancelled.lock().len(), 1);
}
