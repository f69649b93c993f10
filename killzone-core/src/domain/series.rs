//! CandleSeries: a validated, time-ordered candle sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::candle::Candle;

/// Problems with the shape or content of a candle sequence.
///
/// Callers treat these as "skip this asset this cycle", never as fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataQualityError {
    #[error("candle series is empty")]
    Empty,

    #[error("insufficient candles: got {got}, need {need}")]
    InsufficientCandles { got: usize, need: usize },

    #[error("missing OHLC value at index {index}")]
    MissingValue { index: usize },

    #[error("invalid OHLC relationship at index {index}")]
    InvalidOhlc { index: usize },

    #[error("non-positive price at index {index}")]
    NonPositivePrice { index: usize },

    #[error("negative volume at index {index}")]
    NegativeVolume { index: usize },

    #[error("timestamp at index {index} is not after its predecessor ({time})")]
    NotTimeOrdered { index: usize, time: DateTime<Utc> },
}

/// Check every candle-level and ordering invariant of a sequence.
///
/// Reports the first violation found, scanning from the oldest candle.
pub fn validate(candles: &[Candle]) -> Result<(), DataQualityError> {
    if candles.is_empty() {
        return Err(DataQualityError::Empty);
    }

    for (index, candle) in candles.iter().enumerate() {
        if candle.is_void() {
            return Err(DataQualityError::MissingValue { index });
        }
        if candle.open <= 0.0 || candle.high <= 0.0 || candle.low <= 0.0 || candle.close <= 0.0 {
            return Err(DataQualityError::NonPositivePrice { index });
        }
        if candle.volume.is_nan() || candle.volume < 0.0 {
            return Err(DataQualityError::NegativeVolume { index });
        }
        if !candle.is_sane() {
            return Err(DataQualityError::InvalidOhlc { index });
        }
        if index > 0 && candle.time <= candles[index - 1].time {
            return Err(DataQualityError::NotTimeOrdered {
                index,
                time: candle.time,
            });
        }
    }

    Ok(())
}

/// An owned candle sequence that satisfies every invariant checked by [`validate`].
///
/// Read-only once built; detectors borrow it as a slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Candle>", into = "Vec<Candle>")]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Result<Self, DataQualityError> {
        validate(&candles)?;
        Ok(Self { candles })
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    /// Always false: construction rejects empty input.
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn first(&self) -> &Candle {
        &self.candles[0]
    }

    pub fn last(&self) -> &Candle {
        &self.candles[self.candles.len() - 1]
    }

    pub fn into_inner(self) -> Vec<Candle> {
        self.candles
    }
}

impl TryFrom<Vec<Candle>> for CandleSeries {
    type Error = DataQualityError;

    fn try_from(candles: Vec<Candle>) -> Result<Self, Self::Error> {
        Self::new(candles)
    }
}

impl From<CandleSeries> for Vec<Candle> {
    fn from(series: CandleSeries) -> Self {
        series.candles
    }
}

impl AsRef<[Candle]> for CandleSeries {
    fn as_ref(&self) -> &[Candle] {
        &self.candles
    }
}
