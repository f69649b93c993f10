//! Structure detectors: five independent scans over the same candle series.
//!
//! Every detector reads the candles and the shared precomputed indicators,
//! and returns its events in time order. Detectors hold no state between
//! calls and never see each other's output.

pub mod bos;
pub mod choch;
pub mod event;
pub mod fvg;
pub mod liquidity;
pub mod order_block;

pub use bos::BreakOfStructureDetector;
pub use choch::ChangeOfCharacterDetector;
pub use event::{
    Bias, FairValueGap, LiquidityPool, OrderBlock, PatternEvent, PatternKind, PoolSide,
    StructureBreak,
};
pub use fvg::FairValueGapDetector;
pub use liquidity::LiquidityPoolDetector;
pub use order_block::OrderBlockDetector;

use crate::domain::Candle;
use crate::indicators::{self, Indicator, IndicatorValues};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Internal failure of a detector.
///
/// The aggregator treats any detector failure as a failure of the whole
/// detector set for that evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectorError {
    #[error("{detector}: required indicator '{indicator}' was not precomputed")]
    MissingIndicator { detector: String, indicator: String },

    #[error("{detector}: indicator '{indicator}' has {got} values for {expected} candles")]
    LengthMismatch {
        detector: String,
        indicator: String,
        expected: usize,
        got: usize,
    },
}

/// Trait for structure detectors.
///
/// Detectors receive only the candle series and precomputed indicators.
/// Implementations must be pure: same input, same output.
pub trait PatternDetector: Send + Sync {
    /// Human-readable name (e.g., "fair_value_gap").
    fn name(&self) -> &str;

    /// Which event family this detector produces.
    fn kind(&self) -> PatternKind;

    /// Indicator keys this detector reads.
    fn required_indicators(&self) -> Vec<String>;

    /// Scan the whole series and return every event, oldest first.
    fn detect(
        &self,
        candles: &[Candle],
        indicators: &IndicatorValues,
    ) -> Result<Vec<PatternEvent>, DetectorError>;
}

/// Fetch an indicator series and check it lines up 1:1 with the candles.
pub(crate) fn require_series<'a>(
    detector: &str,
    indicators: &'a IndicatorValues,
    name: &str,
    expected: usize,
) -> Result<&'a [f64], DetectorError> {
    let series = indicators
        .get_series(name)
        .ok_or_else(|| DetectorError::MissingIndicator {
            detector: detector.to_string(),
            indicator: name.to_string(),
        })?;
    if series.len() != expected {
        return Err(DetectorError::LengthMismatch {
            detector: detector.to_string(),
            indicator: name.to_string(),
            expected,
            got: series.len(),
        });
    }
    Ok(series)
}

/// Value at `index` if defined (not NaN).
pub(crate) fn defined_at(series: &[f64], index: usize) -> Option<f64> {
    series.get(index).copied().filter(|v| !v.is_nan())
}

/// The five detectors with their default parameters, in evaluation order.
pub fn default_detectors() -> Vec<Box<dyn PatternDetector>> {
    vec![
        Box::new(LiquidityPoolDetector::default()),
        Box::new(FairValueGapDetector::default()),
        Box::new(OrderBlockDetector::default()),
        Box::new(BreakOfStructureDetector::default()),
        Box::new(ChangeOfCharacterDetector::default()),
    ]
}

/// One indicator per distinct key the detectors ask for, in key order.
///
/// Keys no indicator answers to are skipped; the detector that needs one
/// reports `MissingIndicator` when it runs.
pub fn required_indicators(detectors: &[Box<dyn PatternDetector>]) -> Vec<Box<dyn Indicator>> {
    let keys: BTreeSet<String> = detectors
        .iter()
        .flat_map(|d| d.required_indicators())
        .collect();
    keys.iter().filter_map(|key| indicators::from_key(key)).collect()
}

/// Precompute what `detectors` read over `candles`.
pub fn precompute_for(detectors: &[Box<dyn PatternDetector>], candles: &[Candle]) -> IndicatorValues {
    let set = required_indicators(detectors);
    let refs: Vec<&dyn Indicator> = set.iter().map(|i| i.as_ref()).collect();
    IndicatorValues::precompute(candles, &refs)
}

/// Indicators read by the default detectors: ATR(14) and 20-candle volume SMA.
pub fn default_indicators(candles: &[Candle]) -> IndicatorValues {
    precompute_for(&default_detectors(), candles)
}

/// Every event found in one pass of all detectors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternSet {
    pub events: Vec<PatternEvent>,
}

impl PatternSet {
    /// Events of one kind, in detection order.
    pub fn of_kind(&self, kind: PatternKind) -> impl Iterator<Item = &PatternEvent> {
        self.events.iter().filter(move |e| e.kind() == kind)
    }

    pub fn count(&self, kind: PatternKind) -> usize {
        self.of_kind(kind).count()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Run every detector over the series. The first detector error aborts the pass.
pub fn run_detectors(
    detectors: &[Box<dyn PatternDetector>],
    candles: &[Candle],
    indicators: &IndicatorValues,
) -> Result<PatternSet, DetectorError> {
    let mut events = Vec::new();
    for detector in detectors {
        events.extend(detector.detect(candles, indicators)?);
    }
    Ok(PatternSet { events })
}

/// Precompute the default indicators and run the default detectors.
pub fn analyze(candles: &[Candle]) -> Result<PatternSet, DetectorError> {
    let indicators = default_indicators(candles);
    run_detectors(&default_detectors(), candles, &indicators)
}
