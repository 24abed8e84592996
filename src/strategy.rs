// ===============================
// src/strategy.rs
// ===============================
//
// Dual SMA crossover (trend-following):
//   short SMA menembus ke atas long SMA  -> BUY  (golden cross)
//   short SMA menembus ke bawah long SMA -> SELL (dead cross)
//
// Both windows are clamped to the samples available, so the "previous" pair
// (window minus the newest sample) is still defined right after warm-up.
//

use rust_decimal::Decimal;

use crate::domain::SignalKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmaPair {
    pub short: Decimal,
    pub long: Decimal,
}

/// Mean of the last `min(period, prices.len())` prices. `None` on an empty
/// slice or when the sum leaves the `Decimal` range.
pub fn sma(prices: &[Decimal], period: usize) -> Option<Decimal> {
    let n = period.min(prices.len());
    if n == 0 {
        return None;
    }
    let sum = prices[prices.len() - n..]
        .iter()
        .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(*p))?;
    sum.checked_div(Decimal::from(n))
}

impl SmaPair {
    pub fn compute(prices: &[Decimal], short_period: usize, long_period: usize) -> Option<Self> {
        Some(Self { short: sma(prices, short_period)?, long: sma(prices, long_period)? })
    }
}

/// Pure transition rule between two consecutive evaluations.
pub fn classify(current: SmaPair, previous: SmaPair) -> Option<SignalKind> {
    if previous.short <= previous.long && current.short > current.long {
        Some(SignalKind::Buy)
    } else if previous.short >= previous.long && current.short < current.long {
        Some(SignalKind::Sell)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub current: SmaPair,
    pub previous: SmaPair,
    pub kind: Option<SignalKind>,
}

#[derive(Debug, Clone)]
pub struct CrossoverDetector {
    short_period: usize,
    long_period: usize,
}

impl CrossoverDetector {
    pub fn new(short_period: usize, long_period: usize) -> Self {
        Self { short_period, long_period }
    }

    pub fn long_period(&self) -> usize { self.long_period }

    pub fn is_warm(&self, samples: usize) -> bool { samples >= self.long_period }

    /// `window` is oldest-first and must already hold `long_period` samples;
    /// anything shorter is warm-up and yields `None` without computing SMAs.
    /// A warm window whose averages overflow also yields `None`.
    pub fn evaluate(&self, window: &[Decimal]) -> Option<Evaluation> {
        if !self.is_warm(window.len()) || window.len() < 2 {
            return None;
        }
        let current = SmaPair::compute(window, self.short_period, self.long_period)?;
        let previous = SmaPair::compute(&window[..window.len() - 1], self.short_period, self.long_period)?;
        Some(Evaluation { current, previous, kind: classify(current, previous) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pair(short: Decimal, long: Decimal) -> SmaPair { SmaPair { short, long } }

    #[test]
    fn sma_clamps_window_to_available_samples() {
        let p = [dec!(1), dec!(2), dec!(3)];
        assert_eq!(sma(&p, 2), Some(dec!(2.5)));
        assert_eq!(sma(&p, 10), Some(dec!(2)));
        assert_eq!(sma(&[], 3), None);
    }

    #[test]
    fn sma_out_of_range_is_none_not_panic() {
        let p = [Decimal::MAX, Decimal::MAX, Decimal::MAX];
        assert_eq!(sma(&p, 3), None);
        assert_eq!(sma(&p, 1), Some(Decimal::MAX));

        let d = CrossoverDetector::new(2, 3);
        assert_eq!(d.evaluate(&p), None);
    }

    #[test]
    fn upward_cross_is_buy() {
        assert_eq!(classify(pair(dec!(11), dec!(10)), pair(dec!(9), dec!(10))), Some(SignalKind::Buy));
        // touching from below counts
        assert_eq!(classify(pair(dec!(11), dec!(10)), pair(dec!(10), dec!(10))), Some(SignalKind::Buy));
    }

    #[test]
    fn downward_cross_is_sell() {
        assert_eq!(classify(pair(dec!(9), dec!(10)), pair(dec!(11), dec!(10))), Some(SignalKind::Sell));
        assert_eq!(classify(pair(dec!(9), dec!(10)), pair(dec!(10), dec!(10))), Some(SignalKind::Sell));
    }

    #[test]
    fn no_cross_no_signal() {
        // tetap di atas
        assert_eq!(classify(pair(dec!(12), dec!(10)), pair(dec!(11), dec!(10))), None);
        // tetap di bawah
        assert_eq!(classify(pair(dec!(8), dec!(10)), pair(dec!(9), dec!(10))), None);
        // equality held across the transition
        assert_eq!(classify(pair(dec!(10), dec!(10)), pair(dec!(10), dec!(10))), None);
        // converging onto equality is not a cross
        assert_eq!(classify(pair(dec!(10), dec!(10)), pair(dec!(11), dec!(10))), None);
    }

    #[test]
    fn evaluate_suppressed_during_warm_up() {
        let d = CrossoverDetector::new(2, 4);
        assert_eq!(d.evaluate(&[dec!(1), dec!(2), dec!(3)]), None);
    }

    #[test]
    fn evaluate_compares_against_window_without_newest() {
        let d = CrossoverDetector::new(2, 4);
        let e = d.evaluate(&[dec!(10), dec!(10), dec!(10), dec!(14)]).unwrap();
        assert_eq!(e.previous, pair(dec!(10), dec!(10)));
        assert_eq!(e.current, pair(dec!(12), dec!(11)));
        assert_eq!(e.kind, Some(SignalKind::Buy));
    }
}
