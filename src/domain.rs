// ===============================
// src/domain.rs
// ===============================
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Normalized kline tick as it leaves the ingestion boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub received_at: DateTime<Utc>,
    pub symbol: String,
    pub price: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub price: Decimal,
    pub volume: Decimal,
}

impl From<Tick> for PriceSample {
    fn from(t: Tick) -> Self {
        Self { timestamp: t.received_at, symbol: t.symbol, price: t.price, volume: t.volume }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalKind { Buy, Sell }

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self { SignalKind::Buy => "BUY", SignalKind::Sell => "SELL" }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub kind: SignalKind,
    pub price: Decimal,
    pub short_sma: Decimal,
    pub long_sma: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus { Filled }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub side: SignalKind,
    pub quantity: Decimal,
    pub price: Decimal,
    pub status: OrderStatus,
    pub filled_quantity: Option<Decimal>,
    pub filled_price: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide { Long }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus { Open, Closed }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub timestamp: DateTime<Utc>,
    pub status: PositionStatus,
    pub pnl: Option<Decimal>,
}

impl Position {
    pub fn is_open(&self) -> bool { self.status == PositionStatus::Open }
}

/// Fields written onto the OPEN position of a symbol when it closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub status: PositionStatus,
    pub pnl: Option<Decimal>,
}

/// Aggregates served on `/metrics/trading`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradingSummary {
    pub total_signals: u64,
    pub total_positions: u64,
    pub closed_positions: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_pnl: Decimal,
}
