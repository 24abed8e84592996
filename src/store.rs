// ===============================
// src/store.rs
// ===============================
//
// Persistence seam. The core only hands records off; durability is the
// implementation's business (see recorder.rs for the JSONL backend).
//

use std::collections::VecDeque;

use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::domain::{Order, Position, PositionUpdate, PriceSample, Signal, TradingSummary};
use crate::error::StoreError;

#[async_trait]
pub trait Store: Send + Sync {
    async fn save_sample(&self, sample: &PriceSample) -> Result<(), StoreError>;
    async fn save_signal(&self, signal: &Signal) -> Result<(), StoreError>;
    async fn save_order(&self, order: &Order) -> Result<(), StoreError>;
    async fn save_position(&self, position: &Position) -> Result<(), StoreError>;
    /// Applies `update` to the OPEN position of `symbol`.
    async fn update_position(&self, symbol: &str, update: &PositionUpdate) -> Result<(), StoreError>;

    /// Last `limit` samples for `symbol`, oldest first.
    async fn recent_samples(&self, symbol: &str, limit: usize) -> Result<Vec<PriceSample>, StoreError>;
    async fn open_position(&self, symbol: &str) -> Result<Option<Position>, StoreError>;
    async fn summary(&self) -> Result<TradingSummary, StoreError>;

    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Samples kept per symbol when no explicit retention is given.
pub const DEFAULT_SAMPLE_RETENTION: usize = 1000;

#[derive(Debug, Default)]
struct Tables {
    samples: HashMap<String, VecDeque<PriceSample>>,
    signals: Vec<Signal>,
    orders: Vec<Order>,
    positions: Vec<Position>,
}

/// Process-local store. Also the query side of `JsonlStore`.
/// Only the newest `sample_retention` samples per symbol are kept.
#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    sample_retention: usize,
}

impl Default for MemoryStore {
    fn default() -> Self { Self::with_sample_retention(DEFAULT_SAMPLE_RETENTION) }
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_sample_retention(sample_retention: usize) -> Self {
        Self { tables: Mutex::new(Tables::default()), sample_retention: sample_retention.max(1) }
    }

    pub async fn signals(&self) -> Vec<Signal> { self.tables.lock().await.signals.clone() }
    pub async fn orders(&self) -> Vec<Order> { self.tables.lock().await.orders.clone() }
    pub async fn positions(&self) -> Vec<Position> { self.tables.lock().await.positions.clone() }
    pub async fn sample_count(&self, symbol: &str) -> usize {
        self.tables.lock().await.samples.get(symbol).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_sample(&self, sample: &PriceSample) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        let q = t.samples.entry(sample.symbol.clone()).or_default();
        while q.len() >= self.sample_retention {
            q.pop_front();
        }
        q.push_back(sample.clone());
        Ok(())
    }

    async fn save_signal(&self, signal: &Signal) -> Result<(), StoreError> {
        self.tables.lock().await.signals.push(signal.clone());
        Ok(())
    }

    async fn save_order(&self, order: &Order) -> Result<(), StoreError> {
        self.tables.lock().await.orders.push(order.clone());
        Ok(())
    }

    async fn save_position(&self, position: &Position) -> Result<(), StoreError> {
        self.tables.lock().await.positions.push(position.clone());
        Ok(())
    }

    async fn update_position(&self, symbol: &str, update: &PositionUpdate) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        let open = t
            .positions
            .iter_mut()
            .rev()
            .find(|p| p.symbol == symbol && p.is_open())
            .ok_or_else(|| StoreError::NoOpenPosition(symbol.to_string()))?;
        open.status = update.status;
        open.pnl = update.pnl;
        Ok(())
    }

    async fn recent_samples(&self, symbol: &str, limit: usize) -> Result<Vec<PriceSample>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.samples.get(symbol).map_or_else(Vec::new, |q| {
            q.iter().skip(q.len().saturating_sub(limit)).cloned().collect()
        }))
    }

    async fn open_position(&self, symbol: &str) -> Result<Option<Position>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.positions.iter().rev().find(|p| p.symbol == symbol && p.is_open()).cloned())
    }

    async fn summary(&self) -> Result<TradingSummary, StoreError> {
        let t = self.tables.lock().await;
        let closed = t.positions.iter().filter(|p| !p.is_open());
        let (closed_positions, total_pnl) = closed.fold((0u64, Decimal::ZERO), |(n, pnl), p| {
            (n + 1, pnl.saturating_add(p.pnl.unwrap_or_default()))
        });
        Ok(TradingSummary {
            total_signals: t.signals.len() as u64,
            total_positions: t.positions.len() as u64,
            closed_positions,
            total_pnl,
        })
    }
}
