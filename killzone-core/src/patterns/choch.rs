//! Change of character: a two-window swing reversal.
//!
//! For i >= 2L, window one is `[i-2L, i-L)` and window two `[i-L, i)`.
//! Bullish when window two set a lower low than window one and the close of
//! candle i clears window two's high by more than `min_atr_ratio × ATR[i]`.
//! Bearish (higher high, close below window two's low) is only checked when
//! the bullish test fails.

use super::event::{Bias, PatternEvent, PatternKind, StructureBreak};
use super::{defined_at, require_series, DetectorError, PatternDetector};
use crate::domain::Candle;
use crate::indicators::{highest_high, lowest_low, Atr, IndicatorValues, ATR_PERIOD};

#[derive(Debug, Clone)]
pub struct ChangeOfCharacterDetector {
    pub lookback: usize,
    pub min_atr_ratio: f64,
    atr_key: String,
}

impl ChangeOfCharacterDetector {
    pub fn new(lookback: usize) -> Self {
        assert!(lookback >= 1, "lookback must be >= 1");
        Self {
            lookback,
            min_atr_ratio: 0.3,
            atr_key: Atr::key(ATR_PERIOD),
        }
    }

    pub fn find(&self, candles: &[Candle], atr: &[f64]) -> Vec<StructureBreak> {
        let lb = self.lookback;
        let mut breaks = Vec::new();

        for i in (2 * lb)..candles.len() {
            let Some(atr_i) = defined_at(atr, i) else {
                continue;
            };
            let w1 = &candles[i - 2 * lb..i - lb];
            let w2 = &candles[i - lb..i];
            let (Some(w1_high), Some(w1_low), Some(w2_high), Some(w2_low)) =
                (highest_high(w1), lowest_low(w1), highest_high(w2), lowest_low(w2))
            else {
                continue;
            };
            let close = candles[i].close;
            let threshold = self.min_atr_ratio * atr_i;

            let up = close - w2_high;
            let down = w2_low - close;
            let found = if w2_low < w1_low && close > w2_high && up > threshold {
                Some((Bias::Bullish, w2_high, up))
            } else if w2_high > w1_high && close < w2_low && down > threshold {
                Some((Bias::Bearish, w2_low, down))
            } else {
                None
            };

            if let Some((bias, break_level, magnitude)) = found {
                breaks.push(StructureBreak {
                    bias,
                    index: i,
                    time: candles[i].time,
                    break_level,
                    strength: magnitude / atr_i,
                });
            }
        }

        breaks
    }
}

impl Default for ChangeOfCharacterDetector {
    fn default() -> Self {
        Self::new(5)
    }
}

impl PatternDetector for ChangeOfCharacterDetector {
    fn name(&self) -> &str {
        "change_of_character"
    }

    fn kind(&self) -> PatternKind {
        PatternKind::ChangeOfCharacter
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
            .map(PatternEvent::ChangeOfCharacter)
            .collect())
    }
}
