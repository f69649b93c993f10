//! Rolling average volume.
//!
//! Trailing arithmetic mean of volume over `period` candles ending at t.
//! Lookback: period - 1.

use super::indicator::Indicator;
use super::rolling_mean;
use crate::domain::Candle;

/// Default averaging window for volume confirmation.
pub const VOLUME_PERIOD: usize = 20;

#[derive(Debug, Clone)]
pub struct VolumeSma {
    period: usize,
    name: String,
}

impl VolumeSma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "volume SMA period must be >= 1");
        Self {
            period,
            name: Self::key(period),
        }
    }

    pub fn key(period: usize) -> String {
        format!("volume_sma_{period}")
    }
}

impl Default for VolumeSma {
    fn default() -> Self {
        Self::new(VOLUME_PERIOD)
    }
}

impl Indicator for VolumeSma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
        rolling_mean(&volumes, self.period)
    }
}
