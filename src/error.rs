// ===============================
// src/error.rs
// ===============================
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("connect to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("websocket closed by peer")]
    Closed,
    #[error("tick consumer dropped")]
    ConsumerClosed,
}

/// Reasons a frame is rejected at the ingestion boundary.
#[derive(Debug, Error)]
pub enum MalformedMessage {
    #[error("not a JSON object: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing kline object `k`")]
    MissingKline,
    #[error("kline missing field `{0}`")]
    MissingField(&'static str),
    #[error("kline field `{field}` is not a decimal: {value:?}")]
    BadNumber { field: &'static str, value: String },
    #[error("close price must be positive, got {0}")]
    NonPositivePrice(String),
    #[error("volume must be non-negative, got {0}")]
    NegativeVolume(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("store writer stopped")]
    WriterClosed,
    #[error("no open position for {0}")]
    NoOpenPosition(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be at least 1")]
    Zero(&'static str),
    #[error("short period ({short}) must be less than long period ({long})")]
    PeriodOrder { short: usize, long: usize },
    #[error("unit quantity must be positive, got {0}")]
    UnitQty(String),
    #[error("backoff initial ({initial}s) must be between 1 and max ({max}s)")]
    Backoff { initial: u64, max: u64 },
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("bad websocket url {url:?}: {reason}")]
    BadUrl { url: String, reason: String },
}
