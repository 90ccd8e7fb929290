//! Capability contract every venue must provide.
//!
//! The engine is polymorphic over [`ExchangeAdapter`] for order flow and
//! [`BookStream`] for market data; the coordinator never special-cases a
//! venue. Adapters normalize symbol spelling on their boundary and map
//! venue error payloads onto [`ExchangeError`].

use async_trait::async_trait;

use crate::domain::{Amount, BookSnapshot, Price, Symbol, Venue};

/// Unique identifier for an order on a venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Venue-reported state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }
}

/// Result of querying an order.
#[derive(Debug, Clone, Copy)]
pub struct OrderStatus {
    pub state: OrderState,
    /// Base filled so far.
    pub filled_base: Amount,
    /// Quote exchanged for the filled base so far.
    pub filled_quote: Amount,
    /// Average fill price, when anything filled.
    pub avg_price: Option<Price>,
}

/// Failures surfaced by adapter operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExchangeError {
    /// Network-level failure: timeout, disconnect, undecodable response.
    /// Never terminal for the engine; retried per the error policy.
    #[error("transport: {0}")]
    Transport(String),

    /// The venue refused the order (balance, trading halted, ...).
    #[error("venue rejected order: {0}")]
    Rejected(String),

    /// The order violates a venue constraint (min size, tick size).
    #[error("order constraint violated: {0}")]
    InvariantViolation(String),

    /// Cancel arrived after the order reached a terminal state.
    #[error("order already terminal")]
    AlreadyTerminal,

    /// The venue does not know the order id.
    #[error("order not found")]
    NotFound,

    /// Credentials missing or refused.
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl ExchangeError {
    /// Transport errors are retryable; everything else is a venue verdict.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// API credentials, loaded from the environment by the caller.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    /// Read `<PREFIX>_API_KEY` / `<PREFIX>_API_SECRET` from the environment.
    #[must_use]
    pub fn from_env(prefix: &str) -> Option<Self> {
        let api_key = std::env::var(format!("{prefix}_API_KEY")).ok()?;
        let api_secret = std::env::var(format!("{prefix}_API_SECRET")).ok()?;
        Some(Self {
            api_key,
            api_secret,
        })
    }
}

/// Order-flow and one-shot market-data capabilities of one venue.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn venue(&self) -> Venue;

    /// Smallest base-size step accepted by the venue.
    fn base_increment(&self) -> Amount;

    /// One-shot book fetch over REST (the streaming fallback path).
    async fn fetch_orderbook(
        &self,
        symbol: &Symbol,
        depth: usize,
    ) -> Result<BookSnapshot, ExchangeError>;

    async fn place_limit(
        &self,
        symbol: &Symbol,
        side: Side,
        base_amount: Amount,
        limit_price: Price,
    ) -> Result<OrderId, ExchangeError>;

    async fn place_market(
        &self,
        symbol: &Symbol,
        side: Side,
        base_amount: Amount,
    ) -> Result<OrderId, ExchangeError>;

    async fn cancel(&self, symbol: &Symbol, order_id: &OrderId) -> Result<(), ExchangeError>;

    async fn query(&self, symbol: &Symbol, order_id: &OrderId)
        -> Result<OrderStatus, ExchangeError>;

    /// Free balance of one asset.
    async fn fetch_balance(&self, asset: &str) -> Result<Amount, ExchangeError>;
}

/// Infinite, self-reconnecting stream of decoded book snapshots.
#[async_trait]
pub trait BookStream: Send {
    fn venue(&self) -> Venue;

    /// Next decoded snapshot. Reconnects internally on transport errors;
    /// returns `None` only when the stream is shut down for good.
    async fn next_snapshot(&mut self) -> Option<BookSnapshot>;
}
