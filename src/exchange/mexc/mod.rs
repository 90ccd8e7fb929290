//! MEXC spot adapter.
//!
//! Symbol spelling is separator-free (`BTCUSDC`). Order flow goes over
//! signed REST; market data streams over WebSocket with a manual JSON
//! PING heartbeat and REST depth as the fallback path.

mod codec;
mod stream;

pub use codec::{decode_deals, CodecError, TradeTick};
pub use stream::MexcBookStream;

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::{Amount, BookSnapshot, Price, Symbol, Venue};
use crate::exchange::sign::hmac_sha256_hex;
use crate::exchange::{
    parse_levels, Credentials, ExchangeAdapter, ExchangeError, OrderId, OrderState, OrderStatus,
    Side,
};

const REST_URL: &str = "https://api.mexc.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket endpoints, rotated round-robin on reconnect.
pub const WS_ENDPOINTS: &[&str] = &["wss://wbs-api.mexc.com/ws", "wss://wbs.mexc.com/ws"];

pub struct MexcAdapter {
    http: reqwest::Client,
    rest_url: String,
    credentials: Option<Credentials>,
    base_increment: Amount,
}

impl MexcAdapter {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be constructed.
    pub fn new(
        credentials: Option<Credentials>,
        base_increment: Amount,
    ) -> Result<Self, ExchangeError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            rest_url: REST_URL.to_string(),
            credentials,
            base_increment,
        })
    }

    /// Point the adapter at a different REST host (tests).
    #[must_use]
    pub fn with_rest_url(mut self, url: impl Into<String>) -> Self {
        self.rest_url = url.into();
        self
    }

    fn credentials(&self) -> Result<&Credentials, ExchangeError> {
        self.credentials
            .as_ref()
            .ok_or_else(|| ExchangeError::Auth("MEXC credentials not configured".into()))
    }

    /// Append `timestamp` and `signature` to a query string.
    fn sign(&self, query: &str) -> Result<String, ExchangeError> {
        let creds = self.credentials()?;
        let timestamp = Utc::now().timestamp_millis();
        let with_ts = if query.is_empty() {
            format!("timestamp={timestamp}")
        } else {
            format!("{query}&timestamp={timestamp}")
        };
        let signature = hmac_sha256_hex(&creds.api_secret, &with_ts);
        Ok(format!("{with_ts}&signature={signature}"))
    }

    async fn signed_call(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &str,
    ) -> Result<serde_json::Value, ExchangeError> {
        let creds = self.credentials()?;
        let signed = self.sign(query)?;
        let url = format!("{}{}?{}", self.rest_url, path, signed);

        let response = self
            .http
            .request(method, &url)
            .header("X-MEXC-APIKEY", &creds.api_key)
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ExchangeError::Transport(format!("undecodable body: {e}")))?;

        if status.is_success() {
            return Ok(body);
        }
        Err(map_api_error(&body))
    }

    async fn place(&self, query: &str) -> Result<OrderId, ExchangeError> {
        let body = self
            .signed_call(reqwest::Method::POST, "/api/v3/order", query)
            .await?;
        let order_id = body
            .get("orderId")
            .map(value_to_id)
            .ok_or_else(|| ExchangeError::Transport("place response missing orderId".into()))?;
        Ok(OrderId::new(order_id))
    }
}

#[async_trait::async_trait]
impl ExchangeAdapter for MexcAdapter {
    fn venue(&self) -> Venue {
        Venue::Mexc
    }

    fn base_increment(&self) -> Amount {
        self.base_increment
    }

    async fn fetch_orderbook(
        &self,
        symbol: &Symbol,
        depth: usize,
    ) -> Result<BookSnapshot, ExchangeError> {
        let url = format!(
            "{}/api/v3/depth?symbol={}&limit={depth}",
            self.rest_url,
            symbol.compact()
        );
        let body: RestDepth = self.http.get(&url).send().await?.json().await?;

        let bids = parse_levels(&body.bids, true)?;
        let asks = parse_levels(&body.asks, false)?;
        BookSnapshot::try_new(
            Venue::Mexc,
            symbol.clone(),
            bids,
            asks,
            body.last_update_id,
            body.timestamp.unwrap_or_default(),
        )
        .map_err(|e| ExchangeError::Transport(format!("invalid depth payload: {e}")))
    }

    async fn place_limit(
        &self,
        symbol: &Symbol,
        side: Side,
        base_amount: Amount,
        limit_price: Price,
    ) -> Result<OrderId, ExchangeError> {
        let query = format!(
            "symbol={}&side={}&type=LIMIT&quantity={base_amount}&price={limit_price}",
            symbol.compact(),
            api_side(side),
        );
        self.place(&query).await
    }

    async fn place_market(
        &self,
        symbol: &Symbol,
        side: Side,
        base_amount: Amount,
    ) -> Result<OrderId, ExchangeError> {
        let query = format!(
            "symbol={}&side={}&type=MARKET&quantity={base_amount}",
            symbol.compact(),
            api_side(side),
        );
        self.place(&query).await
    }

    async fn cancel(&self, symbol: &Symbol, order_id: &OrderId) -> Result<(), ExchangeError> {
        let query = format!("symbol={}&orderId={order_id}", symbol.compact());
        self.signed_call(reqwest::Method::DELETE, "/api/v3/order", &query)
            .await
            .map(|_| ())
    }

    async fn query(
        &self,
        symbol: &Symbol,
        order_id: &OrderId,
    ) -> Result<OrderStatus, ExchangeError> {
        let query = format!("symbol={}&orderId={order_id}", symbol.compact());
        let body = self
            .signed_call(reqwest::Method::GET, "/api/v3/order", &query)
            .await?;

        let status = body
            .get("status")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ExchangeError::Transport("query response missing status".into()))?;
        let filled_base = decimal_field(&body, "executedQty")?;
        let filled_quote = decimal_field(&body, "cummulativeQuoteQty")?;

        Ok(order_status(status, filled_base, filled_quote)?)
    }

    async fn fetch_balance(&self, asset: &str) -> Result<Amount, ExchangeError> {
        let body = self
            .signed_call(reqwest::Method::GET, "/api/v3/account", "")
            .await?;
        let balances = body
            .get("balances")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ExchangeError::Transport("account response missing balances".into()))?;

        for entry in balances {
            if entry.get("asset").and_then(|v| v.as_str()) == Some(asset) {
                return decimal_field(entry, "free");
            }
        }
        Ok(Amount::ZERO)
    }
}

#[derive(Deserialize)]
struct RestDepth {
    #[serde(rename = "lastUpdateId")]
    last_update_id: u64,
    bids: Vec<(String, String)>,
    asks: Vec<(String, String)>,
    timestamp: Option<i64>,
}

fn api_side(side: Side) -> &'static str {
    match side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    }
}

fn value_to_id(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn decimal_field(body: &serde_json::Value, field: &str) -> Result<Decimal, ExchangeError> {
    let raw = body
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ExchangeError::Transport(format!("response missing {field}")))?;
    Decimal::from_str(raw)
        .map_err(|e| ExchangeError::Transport(format!("bad decimal in {field}: {e}")))
}

fn order_status(
    status: &str,
    filled_base: Amount,
    filled_quote: Amount,
) -> Result<OrderStatus, ExchangeError> {
    let state = match status {
        "NEW" => OrderState::New,
        "PARTIALLY_FILLED" => OrderState::PartiallyFilled,
        "FILLED" => OrderState::Filled,
        "CANCELED" | "PARTIALLY_CANCELED" | "EXPIRED" => OrderState::Cancelled,
        "REJECTED" => OrderState::Rejected,
        other => {
            return Err(ExchangeError::Transport(format!(
                "unknown order status {other:?}"
            )))
        }
    };
    let avg_price = (filled_base > Amount::ZERO).then(|| filled_quote / filled_base);
    Ok(OrderStatus {
        state,
        filled_base,
        filled_quote,
        avg_price,
    })
}

fn map_api_error(body: &serde_json::Value) -> ExchangeError {
    let code = body.get("code").and_then(|v| v.as_i64()).unwrap_or(0);
    let msg = body
        .get("msg")
        .and_then(|v| v.as_str())
        .unwrap_or("no message")
        .to_string();

    match code {
        -1013 | 30002 => ExchangeError::InvariantViolation(msg),
        -2011 => ExchangeError::AlreadyTerminal,
        -2013 => ExchangeError::NotFound,
        -1021 | -1022 | 700002 => ExchangeError::Auth(msg),
        _ => ExchangeError::Rejected(format!("code {code}: {msg}")),
    }
}
