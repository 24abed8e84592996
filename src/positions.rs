// ===============================
// src/positions.rs (paper ledger: order + single LONG position per symbol)
// ===============================

use ahash::AHashMap as HashMap;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::domain::{
    Order, OrderStatus, Position, PositionSide, PositionStatus, PositionUpdate, Signal, SignalKind,
};

#[derive(Debug, Clone, PartialEq)]
pub enum PositionChange {
    Opened(Position),
    Closed { position: Position, update: PositionUpdate },
}

/// What one signal does to the ledger. The order is always present (paper fill).
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub order: Order,
    pub change: Option<PositionChange>,
}

impl Execution {
    pub fn position(&self) -> Option<&Position> {
        match &self.change {
            Some(PositionChange::Opened(p)) => Some(p),
            Some(PositionChange::Closed { position, .. }) => Some(position),
            None => None,
        }
    }
}

/// `(exit - entry) * qty`, `None` when it does not fit in a `Decimal`.
pub fn realized_pnl(entry: Decimal, exit: Decimal, qty: Decimal) -> Option<Decimal> {
    exit.checked_sub(entry)?.checked_mul(qty)
}

pub struct PositionLedger {
    unit_qty: Decimal,
    open: HashMap<String, Position>,
    seq: u64,
}

impl PositionLedger {
    pub fn new(unit_qty: Decimal) -> Self {
        Self { unit_qty, open: HashMap::new(), seq: 0 }
    }

    pub fn open_position(&self, symbol: &str) -> Option<&Position> { self.open.get(symbol) }

    /// Re-seed from the store's OPEN record after a restart.
    pub fn restore(&mut self, position: Position) {
        if position.is_open() {
            info!(symbol = %position.symbol, entry = %position.entry_price, "ledger: restored open position");
            self.open.insert(position.symbol.clone(), position);
        }
    }

    /// Build the fill and the position transition without touching ledger state.
    pub fn decide(&mut self, signal: &Signal) -> Execution {
        self.seq += 1;
        let now = Utc::now();
        let order = Order {
            order_id: format!("PAPER-{}-{}", now.timestamp_nanos_opt().unwrap_or(0), self.seq),
            timestamp: now,
            symbol: signal.symbol.clone(),
            side: signal.kind,
            quantity: self.unit_qty,
            price: signal.price,
            status: OrderStatus::Filled,
            filled_quantity: Some(self.unit_qty),
            filled_price: Some(signal.price),
        };

        let change = match (signal.kind, self.open.get(&signal.symbol)) {
            (SignalKind::Buy, None) => Some(PositionChange::Opened(Position {
                symbol: signal.symbol.clone(),
                side: PositionSide::Long,
                entry_price: signal.price,
                quantity: self.unit_qty,
                timestamp: now,
                status: PositionStatus::Open,
                pnl: None,
            })),
            (SignalKind::Sell, Some(open)) => {
                let pnl = realized_pnl(open.entry_price, signal.price, open.quantity);
                if pnl.is_none() {
                    warn!(symbol = %signal.symbol, entry = %open.entry_price, exit = %signal.price, "ledger: pnl out of range, closing without pnl");
                }
                let update = PositionUpdate { status: PositionStatus::Closed, pnl };
                let position = Position { status: PositionStatus::Closed, pnl, ..open.clone() };
                Some(PositionChange::Closed { position, update })
            }
            (kind, open) => {
                debug!(symbol = %signal.symbol, %kind, has_open = open.is_some(), "ledger: redundant signal, position unchanged");
                None
            }
        };

        Execution { order, change }
    }

    /// Apply a decided transition to the in-memory reference. Call after the write went out.
    pub fn commit(&mut self, exec: &Execution) {
        match &exec.change {
            Some(PositionChange::Opened(p)) => {
                self.open.insert(p.symbol.clone(), p.clone());
            }
            Some(PositionChange::Closed { position, .. }) => {
                self.open.remove(&position.symbol);
            }
            None => {}
        }
    }

    pub fn apply(&mut self, signal: &Signal) -> Execution {
        let exec = self.decide(signal);
        self.commit(&exec);
        exec
    }
}
