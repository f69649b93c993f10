//! Indicator implementations.
//!
//! ATR and rolling volume implement the `Indicator` trait and are precomputed
//! once per evaluation into `IndicatorValues`. Window extremes are plain
//! helpers because each detector needs a differently aligned window.

pub mod atr;
pub mod indicator;
pub mod volume;
pub mod window;

pub use atr::{true_range, Atr, ATR_PERIOD};
pub use indicator::{Indicator, IndicatorValues};
pub use volume::{VolumeSma, VOLUME_PERIOD};
pub use window::{highest_high, lowest_low};

/// Build the indicator behind a series key such as `atr_14` or `volume_sma_20`.
pub fn from_key(key: &str) -> Option<Box<dyn Indicator>> {
    let period = |prefix: &str| {
        key.strip_prefix(prefix)
            .and_then(|p| p.parse::<usize>().ok())
            .filter(|&p| p >= 1)
    };
    if let Some(p) = period("atr_") {
        return Some(Box::new(Atr::new(p)));
    }
    if let Some(p) = period("volume_sma_") {
        return Some(Box::new(VolumeSma::new(p)));
    }
    None
}

/// Trailing mean over `period` samples ending at each index.
///
/// Indices before `period - 1` are NaN, and so is any window containing a NaN.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if period == 0 || n < period {
        return result;
    }

    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        result[i] = window.iter().sum::<f64>() / period as f64;
    }

    result
}

/// Create synthetic candles from close prices for testing.
///
/// open = prev_close (or close for the first candle),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000,
/// one candle every five minutes.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<crate::domain::Candle> {
    let data: Vec<(f64, f64, f64, f64)> = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            (open, open.max(close) + 1.0, open.min(close) - 1.0, close)
        })
        .collect();
    make_ohlc_candles(&data)
}

/// Create candles from (open, high, low, close) tuples, five minutes apart.
#[cfg(test)]
pub fn make_ohlc_candles(data: &[(f64, f64, f64, f64)]) -> Vec<crate::domain::Candle> {
    use chrono::TimeZone;
    let start = chrono::Utc.with_ymd_and_hms(2024, 3, 4, 13, 0, 0).unwrap();
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| crate::domain::Candle {
            time: start + chrono::Duration::minutes(5 * i as i64),
            open,
            high,
            low,
            close,
            volume: 1000.0,
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_mean_basic() {
        let result = rolling_mean(&[1.0, 2.0, 3.0, 4.0], 2);
        assert!(result[0].is_nan());
        assert_approx(result[1], 1.5, DEFAULT_EPSILON);
        assert_approx(result[3], 3.5, DEFAULT_EPSILON);
    }

    #[test]
    fn rolling_mean_nan_window() {
        let result = rolling_mean(&[1.0, f64::NAN, 3.0, 4.0], 2);
        assert!(result[1].is_nan());
        assert!(result[2].is_nan());
        assert_approx(result[3], 3.5, DEFAULT_EPSILON);
    }

    #[test]
    fn indicators_from_keys() {
        let atr = from_key("atr_14").unwrap();
        assert_eq!(atr.name(), "atr_14");
        assert_eq!(atr.lookback(), 13);
        assert_eq!(from_key("volume_sma_20").unwrap().lookback(), 19);
        assert!(from_key("atr_0").is_none());
        assert!(from_key("atr_x").is_none());
        assert!(from_key("rsi_14").is_none());
    }

    #[test]
    fn rolling_mean_too_short() {
        assert!(rolling_mean(&[1.0], 3).iter().all(|v| v.is_nan()));
    }
}
