//! Fixed engine thresholds.

use chrono::Duration;

/// Parameters of the confluence aggregator.
///
/// These are fixed by design; `Default` is the only configuration the engine
/// ships with. Tests build variants directly.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Shortest series the engine will evaluate.
    pub min_candles: usize,
    /// Raw (non-deduplicated) confluence count required to emit.
    pub min_confluences: usize,
    /// Recency window for fair value gaps and order blocks.
    pub zone_recency: Duration,
    /// Recency window for breaks of structure and changes of character.
    pub structure_recency: Duration,
    /// Decimal places kept on entry, stop and target.
    pub price_decimals: u32,
    pub atr_multiple: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_candles: 50,
            min_confluences: 3,
            zone_recency: Duration::hours(4),
            structure_recency: Duration::hours(2),
            price_decimals: 5,
            atr_multiple: crate::risk::DEFAULT_ATR_MULTIPLE,
        }
    }
}

impl EngineConfig {
    /// Round a price to `price_decimals` places.
    pub fn round_price(&self, value: f64) -> f64 {
        let scale = 10f64.powi(self.price_decimals as i32);
        (value * scale).round() / scale
    }
}
