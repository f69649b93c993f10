//! Confluence engine: session gate, detectors, tally, risk, signal.
//!
//! Control flow for one evaluation:
//! validate → gate → indicators → detectors → recency tally → risk → signal.

pub mod aggregator;
pub mod config;
pub mod confluence;

pub use aggregator::{ConfluenceEngine, Decision};
pub use config::EngineConfig;
pub use confluence::Tally;

use crate::domain::{Candle, DataQualityError, Signal};
use chrono::{DateTime, Utc};

/// Evaluate with the default engine (EST kill zones, default detectors).
pub fn evaluate(
    asset: &str,
    candles: &[Candle],
    evaluation_time: DateTime<Utc>,
) -> Result<Option<Signal>, DataQualityError> {
    ConfluenceEngine::default().evaluate(asset, candles, evaluation_time)
}
