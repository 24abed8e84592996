// ===============================
// src/feed.rs
// ===============================
//
// Binance kline stream ingestion:
// - StreamIngestor::start : connect -> receive loop -> backoff -> reconnect, forever
// - parse_kline           : validates one frame into close/volume
// - Health                : cheap cloneable view on the connection state
//
// State machine:
//   Disconnected -> Connecting -> Connected -> BackingOff -> Connecting -> ...
//   (connect failure goes Connecting -> BackingOff)
//
// Ticks go out on a bounded mpsc; `send().await` blocks when the pipeline is
// behind. Ticks are never dropped here, a skipped tick would shift the SMA window.
//

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt; // for .next()
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{error, info, warn};
use url::Url;

use crate::domain::Tick;
use crate::error::{FeedError, MalformedMessage};
use crate::metrics::{WS_CONNECTED, WS_MALFORMED, WS_MESSAGES, WS_RECONNECTS};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Connected,
    BackingOff,
}

/// Read side of the connection state, handed to the HTTP health endpoint.
#[derive(Debug, Clone)]
pub struct Health(watch::Receiver<ConnState>);

impl Health {
    pub fn state(&self) -> ConnState { *self.0.borrow() }

    pub fn is_healthy(&self) -> bool { self.state() == ConnState::Connected }

    /// Resolves on the next state transition. `false` once the ingestor is gone.
    pub async fn changed(&mut self) -> bool { self.0.changed().await.is_ok() }
}

/// Exponential reconnect delay: initial, 2x per consecutive failure, capped.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max, current: initial.min(max) }
    }

    /// Delay to wait now; the following call returns double (up to `max`).
    pub fn next_delay(&mut self) -> Duration {
        let d = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        d
    }

    pub fn reset(&mut self) { self.current = self.initial.min(self.max); }

    pub fn current(&self) -> Duration { self.current }
}

impl Default for Backoff {
    fn default() -> Self { Self::new(Duration::from_secs(1), Duration::from_secs(60)) }
}

// ---- Wire model ----
// Contoh payload (dipangkas):
// {"e":"kline","E":1619999999999,"s":"BTCUSDT","k":{"t":1619999940000,"c":"51000.00","v":"10.5",...}}
#[derive(Debug, Deserialize)]
struct KlineEnvelope {
    #[serde(default)]
    k: Option<RawKline>,
}

#[derive(Debug, Deserialize)]
struct RawKline {
    #[serde(default)]
    c: Option<String>, // close price
    #[serde(default)]
    v: Option<String>, // base asset volume
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kline {
    pub close: Decimal,
    pub volume: Decimal,
}

fn decimal_field(field: &'static str, raw: Option<String>) -> Result<Decimal, MalformedMessage> {
    let raw = raw.ok_or(MalformedMessage::MissingField(field))?;
    Decimal::from_str(raw.trim()).map_err(|_| MalformedMessage::BadNumber { field, value: raw })
}

pub fn parse_kline(text: &str) -> Result<Kline, MalformedMessage> {
    let env: KlineEnvelope = serde_json::from_str(text)?;
    let k = env.k.ok_or(MalformedMessage::MissingKline)?;
    let close = decimal_field("c", k.c)?;
    let volume = decimal_field("v", k.v)?;
    if close <= Decimal::ZERO {
        return Err(MalformedMessage::NonPositivePrice(close.to_string()));
    }
    if volume < Decimal::ZERO {
        return Err(MalformedMessage::NegativeVolume(volume.to_string()));
    }
    Ok(Kline { close, volume })
}

pub struct StreamIngestor {
    symbol: String,
    url: Url,
    backoff: Backoff,
    state: watch::Sender<ConnState>,
}

impl StreamIngestor {
    pub fn new(symbol: impl Into<String>, url: Url, backoff: Backoff) -> Self {
        let (state, _) = watch::channel(ConnState::Disconnected);
        Self { symbol: symbol.into(), url, backoff, state }
    }

    pub fn health(&self) -> Health { Health(self.state.subscribe()) }

    pub fn is_healthy(&self) -> bool { *self.state.borrow() == ConnState::Connected }

    pub fn backoff(&self) -> &Backoff { &self.backoff }

    fn set_state(&self, s: ConnState) {
        self.state.send_replace(s);
        WS_CONNECTED.set(i64::from(s == ConnState::Connected));
    }

    /// One connection attempt. Resets the backoff on success.
    pub async fn connect(&mut self) -> Result<WsStream, FeedError> {
        self.set_state(ConnState::Connecting);
        info!(url = %self.url, "connecting binance kline stream");
        match connect_async(self.url.as_str()).await {
            Ok((ws, _resp)) => {
                self.set_state(ConnState::Connected);
                self.backoff.reset(); // reset backoff
                info!(symbol = %self.symbol, "connected to kline stream");
                Ok(ws)
            }
            Err(source) => {
                self.set_state(ConnState::Disconnected);
                Err(FeedError::Connect { url: self.url.to_string(), source })
            }
        }
    }

    /// Runs until the tick consumer goes away. Transport problems never end it.
    pub async fn start(mut self, tx: mpsc::Sender<Tick>) -> Result<(), FeedError> {
        loop {
            match self.run_session(&tx).await {
                Err(FeedError::ConsumerClosed) => {
                    self.set_state(ConnState::Disconnected);
                    info!("tick consumer closed, ingestion stopped");
                    return Err(FeedError::ConsumerClosed);
                }
                Err(FeedError::Connect { url, source }) => error!(%url, ?source, "connect failed"),
                Err(e) => warn!(error = %e, "kline stream ended"),
                Ok(()) => {}
            }

            self.set_state(ConnState::BackingOff);
            let delay = self.backoff.next_delay();
            WS_RECONNECTS.inc();
            info!(delay_ms = delay.as_millis() as u64, "reconnecting after backoff");
            sleep(delay).await;
        }
    }

    async fn run_session(&mut self, tx: &mpsc::Sender<Tick>) -> Result<(), FeedError> {
        let mut ws = self.connect().await?;

        while let Some(frame) = ws.next().await {
            match frame {
                Ok(Message::Text(txt)) => self.handle_text(&txt, tx).await?,
                Ok(Message::Close(reason)) => {
                    info!(?reason, "server closed kline stream");
                    return Err(FeedError::Closed);
                }
                Ok(_) => {
                    // ignore ping/pong/binary frames
                }
                Err(e) => return Err(FeedError::Transport(e)),
            }
        }
        Err(FeedError::Closed)
    }

    /// Parse one text frame; forward it or drop it. Only a gone consumer is an error.
    pub async fn handle_text(&self, text: &str, tx: &mpsc::Sender<Tick>) -> Result<(), FeedError> {
        WS_MESSAGES.inc();
        match parse_kline(text) {
            Ok(k) => {
                let tick = Tick {
                    received_at: Utc::now(),
                    symbol: self.symbol.clone(),
                    price: k.close,
                    volume: k.volume,
                };
                tx.send(tick).await.map_err(|_| FeedError::ConsumerClosed)
            }
            Err(e) => {
                WS_MALFORMED.inc();
                warn!(error = %e, "malformed kline message dropped");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const KLINE: &str = r#"{"e":"kline","E":1619999999999,"s":"BTCUSDT","k":{"t":1619999940000,"T":1619999999999,"s":"BTCUSDT","i":"1s","o":"50000.00","c":"51000.00","h":"51100.00","l":"49900.00","v":"10.5","x":false}}"#;

    fn ingestor() -> StreamIngestor {
        StreamIngestor::new("BTCUSDT", Url::parse("ws://127.0.0.1:1/ws").unwrap(), Backoff::default())
    }

    #[test]
    fn backoff_doubles_caps_and_resets() {
        let mut b = Backoff::default();
        let secs: Vec<u64> = (0..9).map(|_| b.next_delay().as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 32, 60, 60, 60]);
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_secs(1));
        assert_eq!(b.current(), Duration::from_secs(2));
    }

    #[test]
    fn parses_close_and_volume() {
        let k = parse_kline(KLINE).unwrap();
        assert_eq!(k.close, dec!(51000.00));
        assert_eq!(k.volume, dec!(10.5));
    }

    #[test]
    fn rejects_malformed_shapes() {
        assert!(matches!(parse_kline(r#"{"e":"kline"}"#), Err(MalformedMessage::MissingKline)));
        assert!(matches!(parse_kline(r#"{"k":{"v":"1"}}"#), Err(MalformedMessage::MissingField("c"))));
        assert!(matches!(parse_kline(r#"{"k":{"c":"1"}}"#), Err(MalformedMessage::MissingField("v"))));
        assert!(matches!(parse_kline(r#"{"k":{"c":"abc","v":"1"}}"#), Err(MalformedMessage::BadNumber { field: "c", .. })));
        assert!(matches!(parse_kline(r#"{"k":{"c":"0","v":"1"}}"#), Err(MalformedMessage::NonPositivePrice(_))));
        assert!(matches!(parse_kline(r#"{"k":{"c":"1","v":"-1"}}"#), Err(MalformedMessage::NegativeVolume(_))));
        assert!(matches!(parse_kline("[1,2]"), Err(MalformedMessage::Json(_))));
        assert!(matches!(parse_kline("not json"), Err(MalformedMessage::Json(_))));
    }

    #[tokio::test]
    async fn malformed_frame_emits_nothing_and_keeps_health() {
        let ing = ingestor();
        let health = ing.health();
        let (tx, mut rx) = mpsc::channel(4);
        ing.handle_text(r#"{"e":"kline","s":"BTCUSDT"}"#, &tx).await.unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(health.state(), ConnState::Disconnected);

        ing.handle_text(KLINE, &tx).await.unwrap();
        let tick = rx.try_recv().unwrap();
        assert_eq!(tick.price, dec!(51000));
        assert_eq!(tick.symbol, "BTCUSDT");
    }

    #[tokio::test]
    async fn dropped_consumer_is_reported() {
        let ing = ingestor();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert!(matches!(ing.handle_text(KLINE, &tx).await, Err(FeedError::ConsumerClosed)));
    }

    #[tokio::test]
    async fn refused_connect_is_an_error_and_unhealthy() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("ws://127.0.0.1:{port}/ws/btcusdt@kline_1s")).unwrap();
        let mut backoff = Backoff::default();
        backoff.next_delay();
        let mut ing = StreamIngestor::new("BTCUSDT", url, backoff);
        assert!(!ing.is_healthy());
        assert!(matches!(ing.connect().await, Err(FeedError::Connect { .. })));
        assert!(!ing.is_healthy());
        // gagal connect tidak mereset backoff
        assert_eq!(ing.backoff().current(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn successful_connect_resets_backoff_to_initial() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let _ = ws.next().await;
        });

        let mut backoff = Backoff::default();
        for _ in 0..4 {
            backoff.next_delay();
        }
        assert_eq!(backoff.current(), Duration::from_secs(16));

        let url = Url::parse(&format!("ws://{addr}/ws/btcusdt@kline_1s")).unwrap();
        let mut ing = StreamIngestor::new("BTCUSDT", url, backoff);
        let ws = ing.connect().await.unwrap();
        assert!(ing.is_healthy());
        assert_eq!(ing.backoff().current(), Duration::from_secs(1));

        drop(ws);
        server.await.unwrap();
    }
}
