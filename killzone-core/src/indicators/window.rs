//! Window extremes: highest high / lowest low over a candle slice.
//!
//! Detectors slice the exact window they need (trailing, leading, or split)
//! and reduce it here, so window alignment stays visible at the call site.

use crate::domain::Candle;

/// Highest high in the window, `None` for an empty window.
pub fn highest_high(window: &[Candle]) -> Option<f64> {
    window.iter().map(|c| c.high).reduce(f64::max)
}

/// Lowest low in the window, `None` for an empty window.
pub fn lowest_low(window: &[Candle]) -> Option<f64> {
    window.iter().map(|c| c.low).reduce(f64::min)
}
