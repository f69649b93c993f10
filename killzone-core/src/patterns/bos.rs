//! Break of structure: a volume- and ATR-confirmed breach of the recent range.
//!
//! For i >= lookback the prior range is the max high / min low of the
//! `lookback` candles strictly before i. Bullish when the current high clears
//! the prior high by more than `min_atr_ratio × ATR[i]` on volume above
//! `volume_factor` × average; bearish is the mirror on lows. Both may fire on
//! the same candle. Indices without a defined ATR or average volume are skipped.

use super::event::{Bias, PatternEvent, PatternKind, StructureBreak};
use super::{defined_at, require_series, DetectorError, PatternDetector};
use crate::domain::Candle;
use crate::indicators::{
    highest_high, lowest_low, Atr, IndicatorValues, VolumeSma, ATR_PERIOD, VOLUME_PERIOD,
};

#[derive(Debug, Clone)]
pub struct BreakOfStructureDetector {
    pub lookback: usize,
    pub volume_factor: f64,
    pub min_atr_ratio: f64,
    atr_key: String,
    volume_key: String,
}

impl BreakOfStructureDetector {
    pub fn new(lookback: usize) -> Self {
        assert!(lookback >= 1, "lookback must be >= 1");
        Self {
            lookback,
            volume_factor: 1.2,
            min_atr_ratio: 0.5,
            atr_key: Atr::key(ATR_PERIOD),
            volume_key: VolumeSma::key(VOLUME_PERIOD),
        }
    }

    pub fn find(&self, candles: &[Candle], atr: &[f64], avg_volume: &[f64]) -> Vec<StructureBreak> {
        let mut breaks = Vec::new();

        for i in self.lookback..candles.len() {
            let (Some(atr_i), Some(avg)) = (defined_at(atr, i), defined_at(avg_volume, i)) else {
                continue;
            };
            let prior = &candles[i - self.lookback..i];
            let (Some(prior_high), Some(prior_low)) = (highest_high(prior), lowest_low(prior)) else {
                continue;
            };
            let current = &candles[i];
            let volume_ok = current.volume > avg * self.volume_factor;
            let threshold = self.min_atr_ratio * atr_i;

            let up = current.high - prior_high;
            if current.high > prior_high && volume_ok && up > threshold {
                breaks.push(StructureBreak {
                    bias: Bias::Bullish,
                    index: i,
                    time: current.time,
                    break_level: prior_high,
                    strength: up / atr_i,
                });
            }

            let down = prior_low - current.low;
            if current.low < prior_low && volume_ok && down > threshold {
                breaks.push(StructureBreak {
                    bias: Bias::Bearish,
                    index: i,
                    time: current.time,
                    break_level: prior_low,
                    strength: down / atr_i,
                });
            }
        }

        breaks
    }
}

impl Default for BreakOfStructureDetector {
    fn default() -> Self {
        Self::new(5)
    }
}

impl PatternDetector for BreakOfStructureDetector {
    fn name(&self) -> &str {
        "break_of_structure"
    }

    fn kind(&self) -> PatternKind {
        PatternKind::BreakOfStructure
    }

    fn required_indicators(&self) -> Vec<String> {
        vec![self.atr_key.clone(), self.volume_key.clone()]
    }

    fn detect(
        &self,
        candles: &[Candle],
        indicators: &IndicatorValues,
    ) -> Result<Vec<PatternEvent>, DetectorError> {
        let atr = require_series(self.name(), indicators, &self.atr_key, candles.len())?;
        let avg_volume = require_series(self.name(), indicators, &self.volume_key, candles.len())?;
        Ok(self
            .find(candles, atr, avg_volume)
            .into_iter()
            .map(PatternEvent::BreakOfStructure)
            .collect())
    }
}
