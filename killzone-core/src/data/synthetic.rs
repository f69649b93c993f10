//! Deterministic synthetic candles for demos, benchmarks and tests.
//!
//! A seeded random walk with occasional volume spikes and trend bursts, so
//! the detectors have something to find. Same seed, same series.

use super::provider::{CandleProvider, DataError, RawCandle, Timeframe};
use crate::domain::Candle;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Generate `n` candles starting at `start`, one every `step`.
pub fn generate(seed: u64, n: usize, start: DateTime<Utc>, step: Duration) -> Vec<Candle> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut candles = Vec::with_capacity(n);
    let mut close = 100.0_f64;
    let mut drift = 0.0_f64;
    let mut time = start;

    for _ in 0..n {
        // Occasional trend bursts give the structure detectors breaks to find.
        if rng.gen_bool(0.05) {
            drift = rng.gen_range(-0.004..0.004);
        } else {
            drift *= 0.9;
        }
        let open = close;
        let ret = drift + rng.gen_range(-0.002..0.002);
        close = (open * (1.0 + ret)).max(1.0);

        let body_high = open.max(close);
        let body_low = open.min(close);
        let high = body_high * (1.0 + rng.gen_range(0.0..0.0015));
        let low = body_low * (1.0 - rng.gen_range(0.0..0.0015));

        let base_volume = rng.gen_range(800.0..1200.0);
        let volume = if rng.gen_bool(0.08) {
            base_volume * rng.gen_range(1.6..3.0)
        } else {
            base_volume
        };

        candles.push(Candle {
            time,
            open,
            high,
            low,
            close,
            volume,
        });
        time += step;
    }

    candles
}

/// Start instant of `n` candles spaced `step` apart and ending at `end`.
/// `None` when the span does not fit a `Duration`.
pub fn series_start(end: DateTime<Utc>, step: Duration, n: usize) -> Option<DateTime<Utc>> {
    let bars = i32::try_from(n.saturating_sub(1)).ok()?;
    end.checked_sub_signed(step.checked_mul(bars)?)
}

/// Per-ticker seed so every asset gets its own, stable series.
pub fn ticker_seed(seed: u64, ticker: &str) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(ticker.as_bytes());
    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// Provider that serves synthetic candles ending at a fixed instant.
#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    seed: u64,
    candles: usize,
    end: DateTime<Utc>,
}

impl SyntheticProvider {
    pub fn new(seed: u64, candles: usize, end: DateTime<Utc>) -> Self {
        Self { seed, candles, end }
    }
}

impl CandleProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(&self, ticker: &str, timeframe: Timeframe) -> Result<Vec<RawCandle>, DataError> {
        let step = timeframe.duration();
        let start = series_start(self.end, step, self.candles).ok_or_else(|| {
            DataError::Other(format!("{} candles of {timeframe} do not fit a time span", self.candles))
        })?;
        Ok(generate(ticker_seed(self.seed, ticker), self.candles, start, step)
            .into_iter()
            .map(|c| RawCandle {
                time: c.time,
                open: Some(c.open),
                high: Some(c.high),
                low: Some(c.low),
                close: Some(c.close),
                volume: Some(c.volume),
            })
            .collect())
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::validate;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 13, 0, 0).unwrap()
    }

    #[test]
    fn same_seed_same_series() {
        let a = generate(7, 200, start(), Duration::minutes(5));
        let b = generate(7, 200, start(), Duration::minutes(5));
        let c = generate(8, 200, start(), Duration::minutes(5));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn generated_series_is_valid() {
        let candles = generate(42, 500, start(), Duration::minutes(5));
        assert_eq!(candles.len(), 500);
        assert!(validate(&candles).is_ok());
    }

    #[test]
    fn tickers_get_distinct_seeds() {
        assert_ne!(ticker_seed(1, "EUR/USD"), ticker_seed(1, "GBP/USD"));
        assert_eq!(ticker_seed(1, "Gold"), ticker_seed(1, "Gold"));
    }

    #[test]
    fn provider_ends_at_fixed_instant() {
        let end = start() + Duration::hours(10);
        let rows = SyntheticProvider::new(3, 120, end)
            .fetch("Gold", Timeframe::M5)
            .unwrap();
        assert_eq!(rows.len(), 120);
        assert_eq!(rows[119].time, end);
    }

    #[test]
    fn series_start_rejects_spans_that_overflow() {
        let end = start();
        assert_eq!(series_start(end, Duration::minutes(5), 1), Some(end));
        assert_eq!(
            series_start(end, Duration::minutes(5), 13),
            Some(end - Duration::hours(1))
        );
        assert_eq!(series_start(end, Duration::minutes(5), usize::MAX), None);
        assert_eq!(series_start(end, Duration::days(365), 1_000_000), None);
    }
}
