//! Risk calculator: ATR-scaled stop-loss and take-profit levels.
//!
//! `stop = entry ∓ m×ATR`, `target = entry ± r×m×ATR` with a fixed
//! reward-to-risk ratio `r`. Position sizing is out of scope; `risk_pct` is a
//! display value capped at 1.0.

use crate::domain::Direction;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_ATR_MULTIPLE: f64 = 2.0;
pub const REWARD_RISK_RATIO: f64 = 1.5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    #[error("atr is undefined at the last candle")]
    AtrUndefined,

    #[error("atr {0} is not positive; refusing a zero-width stop")]
    NonPositiveAtr(f64),

    #[error("computed {level} is not finite")]
    NonFinite { level: &'static str },
}

/// Stop and target for one direction and entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskLevels {
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_pct: f64,
}

impl RiskLevels {
    /// Reward distance over risk distance.
    pub fn reward_risk(&self) -> f64 {
        (self.take_profit - self.entry).abs() / (self.entry - self.stop_loss).abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskCalculator {
    pub atr_multiple: f64,
    pub reward_ratio: f64,
}

impl RiskCalculator {
    pub fn new(atr_multiple: f64) -> Self {
        Self {
            atr_multiple,
            reward_ratio: REWARD_RISK_RATIO,
        }
    }

    pub fn levels(&self, direction: Direction, entry: f64, atr: f64) -> Result<RiskLevels, RiskError> {
        if atr.is_nan() {
            return Err(RiskError::AtrUndefined);
        }
        if atr <= 0.0 {
            return Err(RiskError::NonPositiveAtr(atr));
        }

        let risk = self.atr_multiple * atr;
        let reward = self.reward_ratio * risk;
        let (stop_loss, take_profit) = match direction {
            Direction::Buy => (entry - risk, entry + reward),
            Direction::Sell => (entry + risk, entry - reward),
        };

        finite("entry", entry)?;
        finite("stop_loss", stop_loss)?;
        finite("take_profit", take_profit)?;
        let risk_pct = finite("risk_pct", risk_pct(entry, stop_loss))?;

        Ok(RiskLevels {
            entry,
            stop_loss,
            take_profit,
            risk_pct,
        })
    }
}

impl Default for RiskCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_ATR_MULTIPLE)
    }
}

/// `min(1.0, |entry - stop| / entry × 100)`.
pub fn risk_pct(entry: f64, stop_loss: f64) -> f64 {
    ((entry - stop_loss).abs() / entry * 100.0).min(1.0)
}

fn finite(level: &'static str, value: f64) -> Result<f64, RiskError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(RiskError::NonFinite { level })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn buy_levels() {
        let levels = RiskCalculator::default()
            .levels(Direction::Buy, 100.0, 0.5)
            .unwrap();
        assert_approx(levels.stop_loss, 99.0, DEFAULT_EPSILON);
        assert_approx(levels.take_profit, 101.5, DEFAULT_EPSILON);
        assert_approx(levels.risk_pct, 1.0, DEFAULT_EPSILON);
        assert_approx(levels.reward_risk(), 1.5, DEFAULT_EPSILON);
    }

    #[test]
    fn sell_levels() {
        let levels = RiskCalculator::default()
            .levels(Direction::Sell, 100.0, 0.1)
            .unwrap();
        assert_approx(levels.stop_loss, 100.2, DEFAULT_EPSILON);
        assert_approx(levels.take_profit, 99.7, DEFAULT_EPSILON);
        assert_approx(levels.risk_pct, 0.2, DEFAULT_EPSILON);
    }

    #[test]
    fn risk_pct_is_capped() {
        assert_eq!(risk_pct(100.0, 90.0), 1.0);
        assert_approx(risk_pct(100.0, 99.5), 0.5, DEFAULT_EPSILON);
    }

    #[test]
    fn rejects_zero_atr() {
        assert_eq!(
            RiskCalculator::default().levels(Direction::Buy, 100.0, 0.0),
            Err(RiskError::NonPositiveAtr(0.0))
        );
    }

    #[test]
    fn rejects_undefined_atr() {
        assert_eq!(
            RiskCalculator::default().levels(Direction::Buy, 100.0, f64::NAN),
            Err(RiskError::AtrUndefined)
        );
    }

    #[test]
    fn rejects_non_finite_levels() {
        let err = RiskCalculator::default()
            .levels(Direction::Buy, 100.0, f64::INFINITY)
            .unwrap_err();
        assert_eq!(err, RiskError::NonFinite { level: "stop_loss" });
    }
}
