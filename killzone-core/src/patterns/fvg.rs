//! Fair value gaps: three-candle imbalances gated by ATR.
//!
//! Bullish: candle i+2's low sits above candle i's high, the middle candle
//! trades strictly inside that gap, and the gap exceeds `min_atr_ratio × ATR[i]`.
//! Bearish is the mirror. The two cases need opposite orderings of the outer
//! candles, so one window never yields both.

use super::event::{Bias, FairValueGap, PatternEvent, PatternKind};
use super::{defined_at, require_series, DetectorError, PatternDetector};
use crate::domain::Candle;
use crate::indicators::{Atr, IndicatorValues, ATR_PERIOD};

#[derive(Debug, Clone)]
pub struct FairValueGapDetector {
    pub atr_period: usize,
    /// Minimum gap size in ATR units.
    pub min_atr_ratio: f64,
    atr_key: String,
}

impl FairValueGapDetector {
    pub fn new(atr_period: usize, min_atr_ratio: f64) -> Self {
        Self {
            atr_period,
            min_atr_ratio,
            atr_key: Atr::key(atr_period),
        }
    }

    /// Scan every three-candle window. Windows whose first candle has no ATR
    /// are skipped.
    pub fn find(&self, candles: &[Candle], atr: &[f64]) -> Vec<FairValueGap> {
        let mut gaps = Vec::new();
        if candles.len() < 3 {
            return gaps;
        }

        for i in 0..candles.len() - 2 {
            let Some(atr_i) = defined_at(atr, i) else {
                continue;
            };
            let threshold = self.min_atr_ratio * atr_i;
            let (c1, c2, c3) = (&candles[i], &candles[i + 1], &candles[i + 2]);

            let bull_gap = c3.low - c1.high;
            if c1.high < c3.low && c2.low > c1.high && c2.high < c3.low && bull_gap > threshold {
                gaps.push(FairValueGap {
                    bias: Bias::Bullish,
                    index: i,
                    start_time: c1.time,
                    end_time: c3.time,
                    low: c1.high,
                    high: c3.low,
                    gap_size: bull_gap,
                });
            }

            let bear_gap = c1.low - c3.high;
            if c1.low > c3.high && c2.high < c1.low && c2.low > c3.high && bear_gap > threshold {
                gaps.push(FairValueGap {
                    bias: Bias::Bearish,
                    index: i,
                    start_time: c1.time,
                    end_time: c3.time,
                    low: c3.high,
                    high: c1.low,
                    gap_size: bear_gap,
                });
            }
        }

        gaps
    }
}

impl Default for FairValueGapDetector {
    fn default() -> Self {
        Self::new(ATR_PERIOD, 0.5)
    }
}

impl PatternDetector for FairValueGapDetector {
    fn name(&self) -> &str {
        "fair_value_gap"
    }

    fn kind(&self) -> PatternKind {
        PatternKind::FairValueGap
    }

    fn required_indicators(&self) -> Vec<String> {
        vec![self.atr_key.clone()]
    }

    fn detect(
        &self,
        candles: &[Candle],
        indicators: &IndicatorValues,
    ) -> Result<Vec<PatternEvent>, DetectorError> {
        let atr = require_series(self.name(), indicators, &self.atr_key, candles.len())?;
        Ok(self
            .find(candles, atr)
            .into_iter()
            .map(PatternEvent::FairValueGap)
            .collect())
    }
}
