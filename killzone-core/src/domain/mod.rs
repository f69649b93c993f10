//! Domain types for the kill-zone engine.

pub mod candle;
pub mod series;
pub mod signal;

pub use candle::Candle;
pub use series::{validate, CandleSeries, DataQualityError};
pub use signal::{Confidence, Direction, KillZone, Signal};
