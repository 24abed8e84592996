// ===============================
// src/pipeline.rs
// ===============================
//
// One pipeline per symbol, driven by exactly one task, so history and ledger
// need no locking. Per tick:
//   sample -> store, history.push, (warm?) evaluate, (signal?) store signal,
//   ledger.decide -> store order/position -> ledger.commit
// Store writes are independent; a failed write is logged and counted, the
// in-memory path still completes.
//

use std::sync::Arc;
use std::time::Instant;

use rust_decimal::prelude::ToPrimitive;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::StrategyParams;
use crate::domain::{PriceSample, Signal, Tick};
use crate::error::StoreError;
use crate::history::PriceHistory;
use crate::metrics::{LATENCY, ORDERS, PNL_REALIZED, POSITIONS_CLOSED, POSITIONS_OPENED, SIGNALS, STORE_ERRORS};
use crate::positions::{Execution, PositionChange, PositionLedger};
use crate::store::Store;
use crate::strategy::{CrossoverDetector, SmaPair};

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Fewer than `long_period` samples; detector not consulted.
    WarmingUp { have: usize, need: usize },
    /// Warm window whose averages are out of `Decimal` range; tick kept, no signal.
    Unevaluated,
    Quiet { current: SmaPair },
    Signalled { signal: Signal, execution: Execution },
}

impl TickOutcome {
    pub fn signal(&self) -> Option<&Signal> {
        match self {
            TickOutcome::Signalled { signal, .. } => Some(signal),
            _ => None,
        }
    }
}

pub struct SignalPipeline<S: Store + ?Sized> {
    symbol: String,
    history: PriceHistory,
    detector: CrossoverDetector,
    ledger: PositionLedger,
    store: Arc<S>,
}

fn report(op: &'static str, res: Result<(), StoreError>) {
    if let Err(e) = res {
        STORE_ERRORS.with_label_values(&[op]).inc();
        warn!(op, error = %e, "store write failed");
    }
}

impl<S: Store + ?Sized> SignalPipeline<S> {
    pub fn new(symbol: impl Into<String>, params: &StrategyParams, store: Arc<S>) -> Self {
        let symbol = symbol.into();
        Self {
            history: PriceHistory::new(symbol.clone(), params.long_period),
            detector: CrossoverDetector::new(params.short_period, params.long_period),
            ledger: PositionLedger::new(params.unit_qty),
            symbol,
            store,
        }
    }

    /// Fresh pipeline rehydrated from the store: the last `long_period`
    /// samples and the OPEN position, if any.
    pub async fn recover(
        symbol: impl Into<String>,
        params: &StrategyParams,
        store: Arc<S>,
    ) -> Result<Self, StoreError> {
        let mut p = Self::new(symbol, params, store);
        let samples = p.store.recent_samples(&p.symbol, params.long_period).await?;
        p.history.extend(samples.into_iter().map(|s| s.price));
        if let Some(pos) = p.store.open_position(&p.symbol).await? {
            p.ledger.restore(pos);
        }
        info!(symbol = %p.symbol, samples = p.history.len(), open = p.ledger.open_position(&p.symbol).is_some(), "pipeline recovered");
        Ok(p)
    }

    pub fn symbol(&self) -> &str { &self.symbol }
    pub fn history(&self) -> &PriceHistory { &self.history }
    pub fn ledger(&self) -> &PositionLedger { &self.ledger }

    pub async fn on_tick(&mut self, tick: Tick) -> TickOutcome {
        let started = Instant::now();
        let outcome = self.process(tick).await;
        LATENCY.observe(started.elapsed().as_secs_f64());
        outcome
    }

    async fn process(&mut self, tick: Tick) -> TickOutcome {
        let sample = PriceSample::from(tick);
        report("save_sample", self.store.save_sample(&sample).await);

        self.history.push(sample.price);
        let have = self.history.len();
        if !self.detector.is_warm(have) {
            return TickOutcome::WarmingUp { have, need: self.detector.long_period() };
        }

        let eval = match self.detector.evaluate(self.history.as_slice()) {
            Some(e) => e,
            None => {
                warn!(symbol = %self.symbol, price = %sample.price, "sma out of range, tick not evaluated");
                return TickOutcome::Unevaluated;
            }
        };
        let kind = match eval.kind {
            Some(k) => k,
            None => return TickOutcome::Quiet { current: eval.current },
        };

        let signal = Signal {
            timestamp: sample.timestamp,
            symbol: sample.symbol.clone(),
            kind,
            price: sample.price,
            short_sma: eval.current.short,
            long_sma: eval.current.long,
        };
        SIGNALS.with_label_values(&[kind.as_str()]).inc();
        info!(symbol = %signal.symbol, %kind, price = %signal.price, short = %signal.short_sma, long = %signal.long_sma, "crossover signal");
        report("save_signal", self.store.save_signal(&signal).await);

        let execution = self.ledger.decide(&signal);
        report("save_order", self.store.save_order(&execution.order).await);
        ORDERS.inc();

        // tulis dulu ke store, baru update referensi in-memory
        match &execution.change {
            Some(PositionChange::Opened(p)) => {
                report("save_position", self.store.save_position(p).await);
                POSITIONS_OPENED.inc();
                info!(symbol = %p.symbol, entry = %p.entry_price, qty = %p.quantity, "position opened");
            }
            Some(PositionChange::Closed { position, update }) => {
                report("update_position", self.store.update_position(&position.symbol, update).await);
                POSITIONS_CLOSED.inc();
                if let Some(pnl) = position.pnl {
                    PNL_REALIZED.add(pnl.to_f64().unwrap_or(0.0));
                }
                info!(symbol = %position.symbol, pnl = ?position.pnl, "position closed");
            }
            None => debug!(order_id = %execution.order.order_id, "order filled, position unchanged"),
        }
        self.ledger.commit(&execution);

        TickOutcome::Signalled { signal, execution }
    }

    /// Drain ticks in arrival order until the sender side closes.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Tick>) {
        while let Some(tick) = rx.recv().await {
            self.on_tick(tick).await;
        }
        info!(symbol = %self.symbol, "tick channel closed, pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PositionStatus, SignalKind};
    use crate::store::MemoryStore;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn tick(price: Decimal) -> Tick {
        Tick { received_at: Utc::now(), symbol: "BTCUSDT".into(), price, volume: dec!(1) }
    }

    fn pipeline(store: Arc<MemoryStore>) -> SignalPipeline<MemoryStore> {
        let params = StrategyParams::new(5, 10, dec!(1)).unwrap();
        SignalPipeline::new("BTCUSDT", &params, store)
    }

    #[tokio::test]
    async fn warm_up_never_signals_but_persists_samples() {
        let store = Arc::new(MemoryStore::new());
        let mut p = pipeline(store.clone());
        for i in 0..9 {
            let out = p.on_tick(tick(Decimal::from(100 - i * 10))).await;
            assert_eq!(out, TickOutcome::WarmingUp { have: i as usize + 1, need: 10 });
        }
        assert_eq!(store.sample_count("BTCUSDT").await, 9);
        assert!(store.signals().await.is_empty());
    }

    #[tokio::test]
    async fn jump_after_flat_buys_then_drop_sells_at_loss() {
        let store = Arc::new(MemoryStore::new());
        let mut p = pipeline(store.clone());
        for _ in 0..10 {
            assert!(p.on_tick(tick(dec!(100))).await.signal().is_none());
        }

        let out = p.on_tick(tick(dec!(110))).await;
        let buy = out.signal().cloned().unwrap();
        assert_eq!(buy.kind, SignalKind::Buy);
        assert_eq!(buy.short_sma, dec!(102));
        assert_eq!(buy.long_sma, dec!(101));

        // first drop only brings the averages level
        assert!(p.on_tick(tick(dec!(90))).await.signal().is_none());
        let out = p.on_tick(tick(dec!(90))).await;
        match out {
            TickOutcome::Signalled { signal, execution } => {
                assert_eq!(signal.kind, SignalKind::Sell);
                let closed = execution.position().unwrap();
                assert_eq!(closed.status, PositionStatus::Closed);
                assert_eq!(closed.pnl, Some(dec!(-20)));
            }
            other => panic!("expected SELL, got {other:?}"),
        }

        assert_eq!(store.orders().await.len(), 2);
        let positions = store.positions().await;
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].pnl, Some(dec!(-20)));
        assert!(p.ledger().open_position("BTCUSDT").is_none());
    }

    #[tokio::test]
    async fn recover_restores_window_and_open_position() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut p = pipeline(store.clone());
            for _ in 0..10 {
                p.on_tick(tick(dec!(100))).await;
            }
            p.on_tick(tick(dec!(110))).await;
        }

        let params = StrategyParams::new(5, 10, dec!(1)).unwrap();
        let p = SignalPipeline::recover("BTCUSDT", &params, store.clone()).await.unwrap();
        assert_eq!(p.history().len(), 10);
        assert_eq!(p.history().latest(), Some(dec!(110)));
        assert_eq!(p.ledger().open_position("BTCUSDT").unwrap().entry_price, dec!(110));
    }
}
