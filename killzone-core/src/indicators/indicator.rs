//! Indicator trait and precomputed indicator values container.
//!
//! Indicators are pure functions: candle history in, numeric series out.
//! They are computed once per evaluation and shared read-only by every
//! detector. No recomputation per index.

use crate::domain::Candle;
use std::collections::HashMap;

/// Trait for indicators.
///
/// Indicators take a full candle series and produce an output series of the
/// same length. Indices before the warmup completes hold `f64::NAN`.
///
/// No value at index t may depend on candles after t.
pub trait Indicator: Send + Sync {
    /// Series key (e.g. "atr_14", "volume_sma_20").
    fn name(&self) -> &str;

    /// Number of leading indices that are undefined.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire candle series.
    fn compute(&self, candles: &[Candle]) -> Vec<f64>;
}

/// Container for precomputed indicator values, keyed by indicator name.
#[derive(Debug, Clone, Default)]
pub struct IndicatorValues {
    series: HashMap<String, Vec<f64>>,
}

impl IndicatorValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute every indicator over `candles` and collect the results.
    pub fn precompute(candles: &[Candle], indicators: &[&dyn Indicator]) -> Self {
        let mut values = Self::new();
        for indicator in indicators {
            values.insert(indicator.name(), indicator.compute(candles));
        }
        values
    }

    /// Insert a named indicator series.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.series.insert(name.into(), values);
    }

    /// Raw value at an index; `None` only when the series or index is absent.
    pub fn get(&self, name: &str, index: usize) -> Option<f64> {
        self.series.get(name).and_then(|v| v.get(index).copied())
    }

    /// Defined value at an index: absent and NaN both map to `None`.
    pub fn defined(&self, name: &str, index: usize) -> Option<f64> {
        self.get(name, index).filter(|v| !v.is_nan())
    }

    /// Full series for a named indicator.
    pub fn get_series(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(|v| v.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.series.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}
