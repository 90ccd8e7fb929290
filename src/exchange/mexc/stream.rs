//! MEXC WebSocket book stream.
//!
//! Depth frames are JSON; aggregate-deals frames are length-prefixed
//! binary (see [`super::codec`]). The connection loop rotates endpoints
//! round-robin on failure, reconnects after a fixed backoff, and drives a
//! manual JSON `PING`/`PONG` heartbeat because the venue ignores
//! protocol-level pings.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::time::{interval, sleep, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::codec::{decode_deals, TradeTick};
use crate::domain::{BookSnapshot, Symbol, Venue};
use crate::exchange::{parse_levels, BookStream};

type WsConn = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

pub struct MexcBookStream {
    symbol: Symbol,
    depth: usize,
    endpoints: Vec<String>,
    endpoint_idx: usize,
    ping_interval: Duration,
    conn: Option<(WsConn, Interval)>,
    last_trade: Option<TradeTick>,
}

impl MexcBookStream {
    #[must_use]
    pub fn new(symbol: Symbol, depth: usize, ping_interval: Duration) -> Self {
        Self {
            symbol,
            depth,
            endpoints: super::WS_ENDPOINTS.iter().map(|s| (*s).to_string()).collect(),
            endpoint_idx: 0,
            ping_interval,
            conn: None,
            last_trade: None,
        }
    }

    /// Override the endpoint list (tests).
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Most recent decoded trade tick, for diagnostics.
    #[must_use]
    pub const fn last_trade(&self) -> Option<TradeTick> {
        self.last_trade
    }

    fn depth_channel(&self) -> String {
        format!(
            "spot@public.limit.depth.v3.api@{}@{}",
            self.symbol.compact(),
            self.depth
        )
    }

    fn deals_channel(&self) -> String {
        format!("spot@public.aggre.deals.v3.api.pb@100ms@{}", self.symbol.compact())
    }

    async fn connect(&mut self) -> bool {
        let endpoint = self.endpoints[self.endpoint_idx % self.endpoints.len()].clone();
        self.endpoint_idx = self.endpoint_idx.wrapping_add(1);

        info!(venue = "mexc", %endpoint, "connecting book stream");
        let mut ws = match connect_async(endpoint.as_str()).await {
            Ok((ws, _)) => ws,
            Err(error) => {
                warn!(venue = "mexc", %endpoint, %error, "connect failed");
                return false;
            }
        };

        let subscription = serde_json::json!({
            "method": "SUBSCRIPTION",
            "params": [self.depth_channel(), self.deals_channel()],
        });
        if let Err(error) = ws.send(Message::Text(subscription.to_string())).await {
            warn!(venue = "mexc", %error, "subscription send failed");
            return false;
        }

        let mut heartbeat = interval(self.ping_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; consume it so the heartbeat
        // starts one full interval after connect.
        heartbeat.reset();

        info!(venue = "mexc", %endpoint, "book stream connected");
        self.conn = Some((ws, heartbeat));
        true
    }

    fn handle_text(&mut self, text: &str) -> Option<BookSnapshot> {
        let frame: DepthFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(error) => {
                debug!(venue = "mexc", %error, "undecodable text frame");
                return None;
            }
        };

        if frame.method.as_deref() == Some("PONG") {
            debug!(venue = "mexc", "pong received");
            return None;
        }
        if let Some(code) = frame.code {
            if code != 0 {
                warn!(venue = "mexc", code, msg = ?frame.msg, "subscription error");
            } else if let Some(msg) = &frame.msg {
                debug!(venue = "mexc", %msg, "subscription ack");
            }
            return None;
        }

        let data = frame.data?;
        let bids = match parse_levels(&data.bids, true) {
            Ok(levels) => levels,
            Err(error) => {
                debug!(venue = "mexc", %error, "bad bid levels");
                return None;
            }
        };
        let asks = match parse_levels(&data.asks, false) {
            Ok(levels) => levels,
            Err(error) => {
                debug!(venue = "mexc", %error, "bad ask levels");
                return None;
            }
        };

        let update_id = data.update_time.or(frame.ts).unwrap_or_default();
        match BookSnapshot::try_new(
            Venue::Mexc,
            self.symbol.clone(),
            bids,
            asks,
            update_id,
            update_id as i64,
        ) {
            Ok(snapshot) => Some(snapshot),
            Err(error) => {
                warn!(venue = "mexc", %error, "invalid depth snapshot discarded");
                None
            }
        }
    }

    fn handle_binary(&mut self, bytes: &[u8]) -> Option<BookSnapshot> {
        // Venue occasionally wraps JSON acks in a binary frame.
        if bytes.first() == Some(&b'{') {
            let text = String::from_utf8_lossy(bytes).into_owned();
            return self.handle_text(&text);
        }

        match decode_deals(bytes) {
            Ok(ticks) => {
                if let Some(tick) = ticks.last() {
                    debug!(
                        venue = "mexc",
                        price = %tick.price,
                        quantity = %tick.quantity,
                        side = %tick.side,
                        "trade tick"
                    );
                    self.last_trade = Some(*tick);
                }
            }
            Err(error) => {
                debug!(venue = "mexc", %error, "undecodable deals frame skipped");
            }
        }
        None
    }
}

#[async_trait]
impl BookStream for MexcBookStream {
    fn venue(&self) -> Venue {
        Venue::Mexc
    }

    async fn next_snapshot(&mut self) -> Option<BookSnapshot> {
        loop {
            if self.conn.is_none() && !self.connect().await {
                sleep(RECONNECT_DELAY).await;
                continue;
            }

            let event = {
                let (ws, heartbeat) = self.conn.as_mut()?;
                tokio::select! {
                    _ = heartbeat.tick() => StreamEvent::Heartbeat,
                    msg = ws.next() => StreamEvent::Message(msg),
                }
            };

            match event {
                StreamEvent::Heartbeat => {
                    let ping = serde_json::json!({"method": "PING"}).to_string();
                    let (ws, _) = self.conn.as_mut()?;
                    if let Err(error) = ws.send(Message::Text(ping)).await {
                        warn!(venue = "mexc", %error, "ping failed, reconnecting");
                        self.conn = None;
                        sleep(RECONNECT_DELAY).await;
                    }
                }
                StreamEvent::Message(Some(Ok(Message::Text(text)))) => {
                    if let Some(snapshot) = self.handle_text(&text) {
                        return Some(snapshot);
                    }
                }
                StreamEvent::Message(Some(Ok(Message::Binary(bytes)))) => {
                    if let Some(snapshot) = self.handle_binary(&bytes) {
                        return Some(snapshot);
                    }
                }
                StreamEvent::Message(Some(Ok(Message::Ping(payload)))) => {
                    let (ws, _) = self.conn.as_mut()?;
                    let _ = ws.send(Message::Pong(payload)).await;
                }
                StreamEvent::Message(Some(Ok(_))) => {}
                StreamEvent::Message(Some(Err(error))) => {
                    warn!(venue = "mexc", %error, "stream error, reconnecting");
                    self.conn = None;
                    sleep(RECONNECT_DELAY).await;
                }
                StreamEvent::Message(None) => {
                    warn!(venue = "mexc", "stream closed, reconnecting");
                    self.conn = None;
                    sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
}

enum StreamEvent {
    Heartbeat,
    Message(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
}

#[derive(Deserialize)]
struct DepthFrame {
    data: Option<DepthData>,
    ts: Option<u64>,
    method: Option<String>,
    code: Option<i64>,
    msg: Option<String>,
}

#[derive(Deserialize)]
struct DepthData {
    #[serde(default)]
    bids: Vec<(String, String)>,
    #[serde(default)]
    asks: Vec<(String, String)>,
    #[serde(rename = "updateTime")]
    update_time: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn stream() -> MexcBookStream {
        MexcBookStream::new(
            Symbol::parse("BTC-USDC").unwrap(),
            20,
            Duration::from_secs(20),
        )
    }

    #[test]
    fn decodes_depth_frame() {
        let mut s = stream();
        let text = r#"{
            "c": "spot@public.limit.depth.v3.api@BTCUSDC@20",
            "data": {
                "bids": [["40000.1", "0.5"], ["40000.0", "1.0"]],
                "asks": [["40001.0", "0.7"]],
                "updateTime": 42
            },
            "ts": 41
        }"#;

        let snapshot = s.handle_text(text).unwrap();
        assert_eq!(snapshot.update_id(), 42);
        assert_eq!(snapshot.best_bid().unwrap().price(), dec!(40000.1));
        assert_eq!(snapshot.best_ask().unwrap().price(), dec!(40001.0));
    }

    #[test]
    fn pong_and_acks_yield_nothing() {
        let mut s = stream();
        assert!(s.handle_text(r#"{"method":"PONG"}"#).is_none());
        assert!(s.handle_text(r#"{"code":0,"msg":"subscribed"}"#).is_none());
        assert!(s.handle_text(r#"{"code":100,"msg":"bad channel"}"#).is_none());
        assert!(s.handle_text("not json").is_none());
    }

    #[test]
    fn crossed_depth_frame_is_discarded() {
        let mut s = stream();
        let text = r#"{
            "data": {
                "bids": [["40002", "1"]],
                "asks": [["40001", "1"]],
                "updateTime": 1
            }
        }"#;
        assert!(s.handle_text(text).is_none());
    }

    #[test]
    fn binary_deals_update_last_trade() {
        let mut s = stream();
        let mut payload = vec![1u8];
        payload.extend_from_slice(&1_700_000_000_000i64.to_be_bytes());
        payload.extend_from_slice(&7u16.to_be_bytes());
        payload.extend_from_slice(b"40123.5");
        payload.extend_from_slice(&5u16.to_be_bytes());
        payload.extend_from_slice(b"0.013");

        let mut frame = 1u16.to_be_bytes().to_vec();
        frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        frame.extend_from_slice(&payload);

        assert!(s.handle_binary(&frame).is_none());
        let tick = s.last_trade().unwrap();
        assert_eq!(tick.price, dec!(40123.5));
    }

    #[test]
    fn binary_json_ack_is_routed_to_text_path() {
        let mut s = stream();
        assert!(s.handle_binary(br#"{"method":"PONG"}"#).is_none());
    }

    #[test]
    fn channel_names() {
        let s = stream();
        assert_eq!(
            s.depth_channel(),
            "spot@public.limit.depth.v3.api@BTCUSDC@20"
        );
        assert_eq!(
            s.deals_channel(),
            "spot@public.aggre.deals.v3.api.pb@100ms@BTCUSDC"
        );
    }
}
