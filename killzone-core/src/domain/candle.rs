//! Candle: the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV candle for one instrument over one interval.
///
/// `time` is the candle's open instant in UTC. Conversion into the session
/// reference zone happens at the session gate, never here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Returns true if any OHLC field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// OHLC sanity: high bounds every price, low is bounded by every price,
    /// all prices strictly positive, volume non-negative.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.low > 0.0
            && self.volume >= 0.0
    }

    /// Close above open.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Close below open.
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Same candle reflected through `pivot`: highs become lows and the body
    /// direction flips. Used to test detector symmetry.
    pub fn mirrored(&self, pivot: f64) -> Candle {
        Candle {
            time: self.time,
            open: 2.0 * pivot - self.open,
            high: 2.0 * pivot - self.low,
            low: 2.0 * pivot - self.high,
            close: 2.0 * pivot - self.close,
            volume: self.volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_candle() -> Candle {
        Candle {
            time: Utc.with_ymd_and_hms(2024, 1, 2, 14, 0, 0).unwrap(),
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            volume: 50_000.0,
        }
    }

    #[test]
    fn candle_is_sane() {
        assert!(sample_candle().is_sane());
        assert!(sample_candle().is_bullish());
    }

    #[test]
    fn candle_detects_void() {
        let mut candle = sample_candle();
        candle.open = f64::NAN;
        assert!(candle.is_void());
        assert!(!candle.is_sane());
    }

    #[test]
    fn candle_detects_insane_high_low() {
        let mut candle = sample_candle();
        candle.high = 97.0; // below low
        assert!(!candle.is_sane());
    }

    #[test]
    fn candle_rejects_non_positive_prices() {
        let mut candle = sample_candle();
        candle.low = 0.0;
        candle.open = 0.0;
        assert!(!candle.is_sane());
    }

    #[test]
    fn mirrored_swaps_extremes_and_direction() {
        let m = sample_candle().mirrored(200.0);
        assert_eq!(m.high, 302.0);
        assert_eq!(m.low, 295.0);
        assert!(m.is_bearish());
        assert!(m.is_sane());
    }

    #[test]
    fn candle_serialization_roundtrip() {
        let candle = sample_candle();
        let json = serde_json::to_string(&candle).unwrap();
        let deser: Candle = serde_json::from_str(&json).unwrap();
        assert_eq!(candle, deser);
    }
}
