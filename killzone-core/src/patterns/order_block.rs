//! Order blocks: the last opposing candle before a volume-confirmed reversal.
//!
//! For each index i in [1, n-2] with prev = i-1 and next = i+1:
//! - Bullish: prev bearish, current bullish and closing above prev's high,
//!   current volume > `volume_factor` × average volume, and next's low holds
//!   above current's low.
//! - Bearish: the mirror, checked only when the bullish test fails.
//!
//! The block is anchored on the prev candle. When fewer than
//! `volume_period` candles exist the average is taken as zero, which leaves
//! any positive volume through the gate.

use super::event::{Bias, OrderBlock, PatternEvent, PatternKind};
use super::{defined_at, require_series, DetectorError, PatternDetector};
use crate::domain::Candle;
use crate::indicators::{Atr, IndicatorValues, VolumeSma, ATR_PERIOD, VOLUME_PERIOD};

#[derive(Debug, Clone)]
pub struct OrderBlockDetector {
    pub volume_period: usize,
    /// Reversal volume must exceed this multiple of the average.
    pub volume_factor: f64,
    volume_key: String,
    atr_key: String,
}

impl OrderBlockDetector {
    pub fn new(volume_period: usize, volume_factor: f64) -> Self {
        Self {
            volume_period,
            volume_factor,
            volume_key: VolumeSma::key(volume_period),
            atr_key: Atr::key(ATR_PERIOD),
        }
    }

    /// Scan for order blocks. `atr` is carried onto events as context only.
    pub fn find(&self, candles: &[Candle], avg_volume: &[f64], atr: &[f64]) -> Vec<OrderBlock> {
        let n = candles.len();
        let mut blocks = Vec::new();
        if n < 3 {
            return blocks;
        }

        for i in 1..n - 1 {
            let prev = &candles[i - 1];
            let current = &candles[i];
            let next = &candles[i + 1];

            let avg = defined_at(avg_volume, i).unwrap_or(0.0);
            let volume_ok = current.volume > avg * self.volume_factor;
            let strength = if avg > 0.0 { current.volume / avg } else { 1.0 };

            let bias = if prev.is_bearish()
                && current.is_bullish()
                && current.close > prev.high
                && volume_ok
                && next.low > current.low
            {
                Some(Bias::Bullish)
            } else if prev.is_bullish()
                && current.is_bearish()
                && current.close < prev.low
                && volume_ok
                && next.high < current.high
            {
                Some(Bias::Bearish)
            } else {
                None
            };

            if let Some(bias) = bias {
                blocks.push(OrderBlock {
                    bias,
                    index: i - 1,
                    time: prev.time,
                    open: prev.open,
                    high: prev.high,
                    low: prev.low,
                    close: prev.close,
                    strength,
                    atr: defined_at(atr, i),
                });
            }
        }

        blocks
    }
}

impl Default for OrderBlockDetector {
    fn default() -> Self {
        Self::new(VOLUME_PERIOD, 1.5)
    }
}

impl PatternDetector for OrderBlockDetector {
    fn name(&self) -> &str {
        "order_block"
    }

    fn kind(&self) -> PatternKind {
        PatternKind::OrderBlock
    }

    fn required_indicators(&self) -> Vec<String> {
        vec![self.volume_key.clone(), self.atr_key.clone()]
    }

    fn detect(
        &self,
        candles: &[Candle],
        indicators: &IndicatorValues,
    ) -> Result<Vec<PatternEvent>, DetectorError> {
        let avg_volume = require_series(self.name(), indicators, &self.volume_key, candles.len())?;
        let atr = require_series(self.name(), indicators, &self.atr_key, candles.len())?;
        Ok(self
            .find(candles, avg_volume, atr)
            .into_iter()
            .map(PatternEvent::OrderBlock)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_ohlc_candles;

    fn bullish_setup() -> Vec<Candle> {
        let mut candles = make_ohlc_candles(&[
            (101.0, 101.5, 99.5, 100.0), // bearish block candle
            (100.0, 103.0, 99.8, 102.5), // bullish, closes above 101.5
            (102.5, 104.0, 100.5, 103.5), // low holds above 99.8
        ]);
        candles[1].volume = 4000.0;
        candles
    }

    #[test]
    fn bullish_block_anchors_on_prev_candle() {
        let candles = bullish_setup();
        let avg = vec![1000.0; 3];
        let blocks = OrderBlockDetector::default().find(&candles, &avg, &[f64::NAN; 3]);
        assert_eq!(blocks.len(), 1);
        let block = blocks[0];
        assert_eq!(block.bias, Bias::Bullish);
        assert_eq!(block.index, 0);
        assert_eq!(block.time, candles[0].time);
        assert_eq!(block.high, 101.5);
        assert_eq!(block.low, 99.5);
        assert_eq!(block.strength, 4.0);
        assert_eq!(block.atr, None);
    }

    #[test]
    fn bearish_block_is_mirror() {
        let pivot = 200.0;
        let candles: Vec<Candle> = bullish_setup().iter().map(|c| c.mirrored(pivot)).collect();
        let avg = vec![1000.0; 3];
        let blocks = OrderBlockDetector::default().find(&candles, &avg, &[1.0; 3]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].bias, Bias::Bearish);
        assert_eq!(blocks[0].atr, Some(1.0));
    }

    #[test]
    fn weak_volume_is_rejected() {
        let mut candles = bullish_setup();
        candles[1].volume = 1400.0;
        let avg = vec![1000.0; 3];
        assert!(OrderBlockDetector::default().find(&candles, &avg, &[1.0; 3]).is_empty());
    }

    #[test]
    fn failed_acceptance_is_rejected() {
        let mut candles = bullish_setup();
        candles[2].low = 99.7; // trades below the reversal candle's low
        let avg = vec![1000.0; 3];
        assert!(OrderBlockDetector::default().find(&candles, &avg, &[1.0; 3]).is_empty());
    }

    #[test]
    fn undefined_average_disables_volume_gate() {
        let candles = bullish_setup();
        let blocks = OrderBlockDetector::default().find(&candles, &[f64::NAN; 3], &[1.0; 3]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].strength, 1.0);
    }

    #[test]
    fn last_candle_is_never_a_reversal() {
        let candles = bullish_setup();
        let avg = vec![1000.0; 3];
        let blocks = OrderBlockDetector::default().find(&candles[..2], &avg[..2], &[1.0; 2]);
        assert!(blocks.is_empty());
    }
}
