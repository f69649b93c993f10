//! Liquidity pools: swing highs and lows that strictly dominate their
//! `lookback` neighbors on both sides.
//!
//! A swing high marks sell-side liquidity, a swing low buy-side liquidity.
//! Both can occur at the same index. Pools are informational: the
//! aggregator does not vote with them.

use super::event::{LiquidityPool, PatternEvent, PatternKind, PoolSide};
use super::PatternDetector;
use super::DetectorError;
use crate::domain::Candle;
use crate::indicators::{highest_high, lowest_low, IndicatorValues};

#[derive(Debug, Clone)]
pub struct LiquidityPoolDetector {
    pub lookback: usize,
}

impl LiquidityPoolDetector {
    pub fn new(lookback: usize) -> Self {
        assert!(lookback >= 1, "lookback must be >= 1");
        Self { lookback }
    }

    /// Scan for swing extremes, oldest first.
    ///
    /// Only indices with a full window on both sides are eligible:
    /// `lookback <= i < n - lookback`.
    pub fn find(&self, candles: &[Candle]) -> Vec<LiquidityPool> {
        let n = candles.len();
        let lb = self.lookback;
        let mut pools = Vec::new();

        if n < 2 * lb + 1 {
            return pools;
        }

        for i in lb..(n - lb) {
            let before = &candles[i - lb..i];
            let after = &candles[i + 1..=i + lb];
            let candle = &candles[i];

            if let (Some(hb), Some(ha)) = (highest_high(before), highest_high(after)) {
                if candle.high > hb && candle.high > ha {
                    pools.push(LiquidityPool {
                        side: PoolSide::SellSide,
                        index: i,
                        time: candle.time,
                        price: candle.high,
                        strength: candle.high / hb.max(ha),
                    });
                }
            }

            if let (Some(lb_before), Some(la)) = (lowest_low(before), lowest_low(after)) {
                if candle.low < lb_before && candle.low < la {
                    pools.push(LiquidityPool {
                        side: PoolSide::BuySide,
                        index: i,
                        time: candle.time,
                        price: candle.low,
                        strength: lb_before.min(la) / candle.low,
                    });
                }
            }
        }

        pools
    }
}

impl Default for LiquidityPoolDetector {
    fn default() -> Self {
        Self::new(10)
    }
}

impl PatternDetector for LiquidityPoolDetector {
    fn name(&self) -> &str {
        "liquidity_pool"
    }

    fn kind(&self) -> PatternKind {
        PatternKind::LiquidityPool
    }

    fn required_indicators(&self) -> Vec<String> {
        Vec::new()
    }

    fn detect(
        &self,
        candles: &[Candle],
        _indicators: &IndicatorValues,
    ) -> Result<Vec<PatternEvent>, DetectorError> {
        Ok(self
            .find(candles)
            .into_iter()
            .map(PatternEvent::LiquidityPool)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_ohlc_candles;

    /// Flat candles with one spike up at `high_at` and one spike down at `low_at`.
    fn series_with_spikes(n: usize, high_at: usize, low_at: usize) -> Vec<Candle> {
        let data: Vec<(f64, f64, f64, f64)> = (0..n)
            .map(|i| {
                let high = if i == high_at { 105.0 } else { 101.0 };
                let low = if i == low_at { 95.0 } else { 99.0 };
                (100.0, high, low, 100.0)
            })
            .collect();
        make_ohlc_candles(&data)
    }

    #[test]
    fn finds_swing_high_and_low() {
        let candles = series_with_spikes(30, 12, 20);
        let pools = LiquidityPoolDetector::new(5).find(&candles);
        assert_eq!(pools.len(), 2);
        assert_eq!(pools[0].side, PoolSide::SellSide);
        assert_eq!(pools[0].index, 12);
        assert_eq!(pools[0].price, 105.0);
        assert_eq!(pools[1].side, PoolSide::BuySide);
        assert_eq!(pools[1].index, 20);
        assert_eq!(pools[1].price, 95.0);
    }

    #[test]
    fn both_sides_at_same_index() {
        let candles = series_with_spikes(30, 15, 15);
        let pools = LiquidityPoolDetector::new(5).find(&candles);
        assert_eq!(pools.len(), 2);
        assert!(pools.iter().all(|p| p.index == 15));
    }

    #[test]
    fn equal_highs_are_not_swings() {
        let mut candles = series_with_spikes(30, 12, 100);
        candles[14].high = 105.0;
        let pools = LiquidityPoolDetector::new(5).find(&candles);
        assert!(pools.iter().all(|p| p.side != PoolSide::SellSide));
    }

    #[test]
    fn edges_are_not_eligible() {
        // Spike inside the first `lookback` candles never qualifies
        let candles = series_with_spikes(30, 3, 27);
        assert!(LiquidityPoolDetector::new(5).find(&candles).is_empty());
    }

    #[test]
    fn short_series_yields_nothing() {
        let candles = series_with_spikes(10, 5, 5);
        assert!(LiquidityPoolDetector::default().find(&candles).is_empty());
    }

    #[test]
    fn strength_is_ratio_to_neighbor_extreme() {
        let candles = series_with_spikes(30, 12, 100);
        let pools = LiquidityPoolDetector::new(5).find(&candles);
        assert!((pools[0].strength - 105.0 / 101.0).abs() < 1e-12);
    }
}
