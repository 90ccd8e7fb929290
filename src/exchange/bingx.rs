//! BingX spot adapter.
//!
//! Symbol spelling matches the canonical `BASE-QUOTE` form. Market-data
//! frames arrive gzip-compressed; the venue also sends a literal `Ping`
//! text payload which expects a literal `Pong` back, on top of the
//! transport's own keepalive.

use std::io::Read;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use flate2::read::GzDecoder;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::parse_levels;
use super::sign::hmac_sha256_hex;
use crate::domain::{Amount, BookSnapshot, Price, Symbol, Venue};
use crate::exchange::{
    Credentials, ExchangeAdapter, ExchangeError, OrderId, OrderState, OrderStatus, Side,
};

const REST_URL: &str = "https://open-api.bingx.com";
const WS_URL: &str = "wss://open-api-ws.bingx.com/market";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

type WsConn = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct BingxAdapter {
    http: reqwest::Client,
    rest_url: String,
    credentials: Option<Credentials>,
    base_increment: Amount,
}

impl BingxAdapter {
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
            .ok_or_else(|| ExchangeError::Auth("BingX credentials not configured".into()))
    }

    async fn signed_call(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &str,
    ) -> Result<serde_json::Value, ExchangeError> {
        let creds = self.credentials()?;
        let timestamp = Utc::now().timestamp_millis();
        let with_ts = if query.is_empty() {
            format!("timestamp={timestamp}")
        } else {
            format!("{query}&timestamp={timestamp}")
        };
        let signature = hmac_sha256_hex(&creds.api_secret, &with_ts);
        let url = format!("{}{}?{}&signature={}", self.rest_url, path, with_ts, signature);

        let response = self
            .http
            .request(method, &url)
            .header("X-BX-APIKEY", &creds.api_key)
            .send()
            .await?;
        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| ExchangeError::Transport(format!("undecodable body: {e}")))?;

        if envelope.code == 0 {
            return Ok(envelope.data.unwrap_or(serde_json::Value::Null));
        }
        Err(map_api_error(envelope.code, &envelope.msg))
    }

    async fn place(&self, query: &str) -> Result<OrderId, ExchangeError> {
        let data = self
            .signed_call(reqwest::Method::POST, "/openApi/spot/v1/trade/order", query)
            .await?;
        let order_id = data
            .get("orderId")
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .ok_or_else(|| ExchangeError::Transport("place response missing orderId".into()))?;
        Ok(OrderId::new(order_id))
    }
}

#[async_trait]
impl ExchangeAdapter for BingxAdapter {
    fn venue(&self) -> Venue {
        Venue::Bingx
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
            "{}/openApi/spot/v1/market/depth?symbol={}&limit={depth}",
            self.rest_url,
            symbol.canonical()
        );
        let envelope: Envelope = self.http.get(&url).send().await?.json().await?;
        if envelope.code != 0 {
            return Err(map_api_error(envelope.code, &envelope.msg));
        }
        let data = envelope
            .data
            .ok_or_else(|| ExchangeError::Transport("depth response missing data".into()))?;
        let depth_data: DepthData = serde_json::from_value(data)
            .map_err(|e| ExchangeError::Transport(format!("bad depth payload: {e}")))?;

        decode_book(symbol, &depth_data)
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
            symbol.canonical(),
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
            symbol.canonical(),
            api_side(side),
        );
        self.place(&query).await
    }

    async fn cancel(&self, symbol: &Symbol, order_id: &OrderId) -> Result<(), ExchangeError> {
        let query = format!("symbol={}&orderId={order_id}", symbol.canonical());
        self.signed_call(
            reqwest::Method::POST,
            "/openApi/spot/v1/trade/cancel",
            &query,
        )
        .await
        .map(|_| ())
    }

    async fn query(
        &self,
        symbol: &Symbol,
        order_id: &OrderId,
    ) -> Result<OrderStatus, ExchangeError> {
        let query = format!("symbol={}&orderId={order_id}", symbol.canonical());
        let data = self
            .signed_call(reqwest::Method::GET, "/openApi/spot/v1/trade/query", &query)
            .await?;

        let status = data
            .get("status")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ExchangeError::Transport("query response missing status".into()))?;
        let filled_base = decimal_field(&data, "executedQty")?;
        let filled_quote = decimal_field(&data, "cummulativeQuoteQty")?;

        order_status(status, filled_base, filled_quote)
    }

    async fn fetch_balance(&self, asset: &str) -> Result<Amount, ExchangeError> {
        let data = self
            .signed_call(
                reqwest::Method::GET,
                "/openApi/spot/v1/account/balance",
                "",
            )
            .await?;
        let balances = data
            .get("balances")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ExchangeError::Transport("balance response missing balances".into()))?;

        for entry in balances {
            if entry.get("asset").and_then(|v| v.as_str()) == Some(asset) {
                return decimal_field(entry, "free");
            }
        }
        Ok(Amount::ZERO)
    }
}

/// Self-reconnecting BingX book stream over gzip frames.
pub struct BingxBookStream {
    symbol: Symbol,
    depth: usize,
    ws_url: String,
    conn: Option<WsConn>,
}

impl BingxBookStream {
    #[must_use]
    pub fn new(symbol: Symbol, depth: usize) -> Self {
        Self {
            symbol,
            depth,
            ws_url: WS_URL.to_string(),
            conn: None,
        }
    }

    /// Override the WebSocket URL (tests).
    #[must_use]
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    fn data_type(&self) -> String {
        format!("{}@depth{}", self.symbol.canonical(), self.depth)
    }

    async fn connect(&mut self) -> bool {
        info!(venue = "bingx", url = %self.ws_url, "connecting book stream");
        let mut ws = match connect_async(self.ws_url.as_str()).await {
            Ok((ws, _)) => ws,
            Err(error) => {
                warn!(venue = "bingx", %error, "connect failed");
                return false;
            }
        };

        let req_id: u128 = rand::thread_rng().gen();
        let subscription = serde_json::json!({
            "id": format!("{req_id:032x}"),
            "reqType": "sub",
            "dataType": self.data_type(),
        });
        if let Err(error) = ws.send(Message::Text(subscription.to_string())).await {
            warn!(venue = "bingx", %error, "subscription send failed");
            return false;
        }

        info!(venue = "bingx", data_type = %self.data_type(), "book stream connected");
        self.conn = Some(ws);
        true
    }

    /// Decode one (possibly gzip-compressed) frame. `Ok(Some)` carries a
    /// snapshot, `Ok(None)` a control frame, `Err` the `Pong` reply owed.
    fn handle_payload(&self, text: &str) -> Result<Option<BookSnapshot>, &'static str> {
        if text.trim() == "Ping" {
            return Err("Pong");
        }

        let frame: PushFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(error) => {
                debug!(venue = "bingx", %error, "undecodable frame");
                return Ok(None);
            }
        };

        if frame.code != 0 {
            warn!(venue = "bingx", code = frame.code, msg = %frame.msg, "server error frame");
            return Ok(None);
        }
        let Some(data) = frame.data else {
            return Ok(None);
        };

        match decode_book(&self.symbol, &data) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(error) => {
                warn!(venue = "bingx", %error, "invalid depth snapshot discarded");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl super::BookStream for BingxBookStream {
    fn venue(&self) -> Venue {
        Venue::Bingx
    }

    async fn next_snapshot(&mut self) -> Option<BookSnapshot> {
        loop {
            if self.conn.is_none() && !self.connect().await {
                sleep(RECONNECT_DELAY).await;
                continue;
            }

            let msg = {
                let ws = self.conn.as_mut()?;
                ws.next().await
            };

            match msg {
                Some(Ok(Message::Binary(bytes))) => {
                    let text = match gunzip(&bytes) {
                        Ok(text) => text,
                        Err(error) => {
                            debug!(venue = "bingx", %error, "gzip decode failed, frame skipped");
                            continue;
                        }
                    };
                    match self.handle_payload(&text) {
                        Ok(Some(snapshot)) => return Some(snapshot),
                        Ok(None) => {}
                        Err(reply) => {
                            let ws = self.conn.as_mut()?;
                            let _ = ws.send(Message::Text(reply.to_string())).await;
                        }
                    }
                }
                Some(Ok(Message::Text(text))) => match self.handle_payload(&text) {
                    Ok(Some(snapshot)) => return Some(snapshot),
                    Ok(None) => {}
                    Err(reply) => {
                        let ws = self.conn.as_mut()?;
                        let _ = ws.send(Message::Text(reply.to_string())).await;
                    }
                },
                Some(Ok(Message::Ping(payload))) => {
                    let ws = self.conn.as_mut()?;
                    let _ = ws.send(Message::Pong(payload)).await;
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    warn!(venue = "bingx", %error, "stream error, reconnecting");
                    self.conn = None;
                    sleep(RECONNECT_DELAY).await;
                }
                None => {
                    warn!(venue = "bingx", "stream closed, reconnecting");
                    self.conn = None;
                    sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
}

fn gunzip(bytes: &[u8]) -> std::io::Result<String> {
    let mut decoder = GzDecoder::new(bytes);
    let mut text = String::new();
    decoder.read_to_string(&mut text)?;
    Ok(text)
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct PushFrame {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<DepthData>,
}

#[derive(Deserialize)]
struct DepthData {
    #[serde(default)]
    bids: Vec<(String, String)>,
    #[serde(default)]
    asks: Vec<(String, String)>,
    #[serde(rename = "lastUpdateId")]
    last_update_id: Option<u64>,
    ts: Option<u64>,
}

fn decode_book(symbol: &Symbol, data: &DepthData) -> Result<BookSnapshot, ExchangeError> {
    let bids = parse_levels(&data.bids, true)?;
    let asks = parse_levels(&data.asks, false)?;
    let update_id = data.last_update_id.or(data.ts).unwrap_or_default();
    BookSnapshot::try_new(
        Venue::Bingx,
        symbol.clone(),
        bids,
        asks,
        update_id,
        data.ts.unwrap_or_default() as i64,
    )
    .map_err(|e| ExchangeError::Transport(e.to_string()))
}

fn api_side(side: Side) -> &'static str {
    match side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    }
}

fn decimal_field(body: &serde_json::Value, field: &str) -> Result<Decimal, ExchangeError> {
    let value = body
        .get(field)
        .ok_or_else(|| ExchangeError::Transport(format!("response missing {field}")))?;
    let raw = match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return Err(ExchangeError::Transport(format!("bad type for {field}"))),
    };
    Decimal::from_str(&raw)
        .map_err(|e| ExchangeError::Transport(format!("bad decimal in {field}: {e}")))
}

fn order_status(
    status: &str,
    filled_base: Amount,
    filled_quote: Amount,
) -> Result<OrderStatus, ExchangeError> {
    let state = match status {
        "NEW" | "PENDING" => OrderState::New,
        "PARTIALLY_FILLED" => OrderState::PartiallyFilled,
        "FILLED" => OrderState::Filled,
        "CANCELED" | "CANCELLED" => OrderState::Cancelled,
        "FAILED" | "REJECTED" => OrderState::Rejected,
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

fn map_api_error(code: i64, msg: &str) -> ExchangeError {
    match code {
        100400 => ExchangeError::InvariantViolation(msg.to_string()),
        100404 => ExchangeError::NotFound,
        100413 | 100401 => ExchangeError::Auth(msg.to_string()),
        _ => ExchangeError::Rejected(format!("code {code}: {msg}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn stream() -> BingxBookStream {
        BingxBookStream::new(Symbol::parse("BTC-USDC").unwrap(), 20)
    }

    fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn round_trips_gzip() {
        let text = r#"{"code":0,"data":{"bids":[["1","1"]],"asks":[]}}"#;
        assert_eq!(gunzip(&gzip(text)).unwrap(), text);
    }

    #[test]
    fn decodes_depth_push() {
        let s = stream();
        let text = r#"{
            "code": 0,
            "data": {
                "bids": [["40100", "0.5"], ["40050", "0.5"]],
                "asks": [["40110", "1.0"]],
                "lastUpdateId": 99,
                "ts": 1700000000000
            }
        }"#;

        let snapshot = s.handle_payload(text).unwrap().unwrap();
        assert_eq!(snapshot.update_id(), 99);
        assert_eq!(snapshot.venue(), Venue::Bingx);
        assert_eq!(snapshot.best_bid().unwrap().price(), dec!(40100));
    }

    #[test]
    fn unsorted_venue_levels_are_normalized() {
        let s = stream();
        let text = r#"{
            "code": 0,
            "data": {
                "bids": [["40050", "0.5"], ["40100", "0.5"]],
                "asks": [["40120", "1.0"], ["40110", "1.0"]],
                "ts": 5
            }
        }"#;

        let snapshot = s.handle_payload(text).unwrap().unwrap();
        assert_eq!(snapshot.best_bid().unwrap().price(), dec!(40100));
        assert_eq!(snapshot.best_ask().unwrap().price(), dec!(40110));
    }

    #[test]
    fn ping_text_requests_pong() {
        let s = stream();
        assert!(matches!(s.handle_payload("Ping"), Err("Pong")));
    }

    #[test]
    fn error_frame_yields_nothing() {
        let s = stream();
        assert!(s
            .handle_payload(r#"{"code":1001,"msg":"bad dataType"}"#)
            .unwrap()
            .is_none());
    }

    #[test]
    fn status_maps_to_order_state() {
        let s = order_status("FILLED", dec!(1), dec!(40000)).unwrap();
        assert_eq!(s.state, OrderState::Filled);
        assert_eq!(s.avg_price, Some(dec!(40000)));

        assert!(matches!(
            order_status("FAILED", dec!(0), dec!(0)).unwrap().state,
            OrderState::Rejected
        ));
    }
}
