// ===============================
// src/history.rs
// ===============================
use std::collections::VecDeque;

use rust_decimal::Decimal;

/// Arrival-ordered closing prices for one symbol, capped at `capacity`.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    symbol: String,
    window: VecDeque<Decimal>,
    capacity: usize,
}

impl PriceHistory {
    pub fn new(symbol: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { symbol: symbol.into(), window: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn symbol(&self) -> &str { &self.symbol }
    pub fn len(&self) -> usize { self.window.len() }
    pub fn is_empty(&self) -> bool { self.window.is_empty() }
    pub fn capacity(&self) -> usize { self.capacity }

    pub fn push(&mut self, price: Decimal) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(price);
    }

    pub fn extend<I: IntoIterator<Item = Decimal>>(&mut self, prices: I) {
        for p in prices {
            self.push(p);
        }
    }

    /// Oldest first. Rotates the ring buffer in place when it has wrapped.
    pub fn as_slice(&mut self) -> &[Decimal] {
        self.window.make_contiguous()
    }

    pub fn latest(&self) -> Option<Decimal> { self.window.back().copied() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn keeps_only_most_recent_capacity_samples() {
        let mut h = PriceHistory::new("BTCUSDT", 3);
        h.extend([dec!(1), dec!(2), dec!(3), dec!(4), dec!(5)]);
        assert_eq!(h.len(), 3);
        assert_eq!(h.as_slice(), &[dec!(3), dec!(4), dec!(5)]);
        assert_eq!(h.latest(), Some(dec!(5)));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut h = PriceHistory::new("BTCUSDT", 0);
        h.push(dec!(10));
        h.push(dec!(11));
        assert_eq!(h.capacity(), 1);
        assert_eq!(h.as_slice(), &[dec!(11)]);
    }
}
