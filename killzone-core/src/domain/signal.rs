//! Signal: the record emitted when enough confluences agree.
//!
//! A signal describes a market decision, not an order: ownership passes to the
//! caller, which decides on deduplication, persistence, and delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Trade direction of an emitted signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => f.write_str("BUY"),
            Direction::Sell => f.write_str("SELL"),
        }
    }
}

/// Trading session window during which emission is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KillZone {
    London,
    NewYork,
}

impl fmt::Display for KillZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KillZone::London => f.write_str("London"),
            KillZone::NewYork => f.write_str("New York"),
        }
    }
}

/// Share of confluences agreeing with the chosen direction, shown as `k/n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confidence {
    pub agreeing: usize,
    pub total: usize,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.agreeing, self.total)
    }
}

/// Immutable trade signal for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub asset: String,
    pub direction: Direction,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub kill_zone: KillZone,
    /// Deduplicated confluence tags (e.g. `FVG_bullish`).
    pub setup: BTreeSet<String>,
    /// Stop distance as a percent of entry, capped at 1.0.
    pub risk_pct: f64,
    pub confidence: Confidence,
    /// Instant the engine evaluated the series.
    pub evaluated_at: DateTime<Utc>,
    /// Time of the last candle the signal was derived from.
    pub candle_time: DateTime<Utc>,
}

impl Signal {
    /// Setup tags joined for display: `BOS_bullish + FVG_bullish + OB_bullish`.
    ///
    /// Tag order is lexicographic so the string is stable across runs, which
    /// the caller's duplicate check relies on.
    pub fn setup_display(&self) -> String {
        self.setup.iter().map(String::as_str).collect::<Vec<_>>().join(" + ")
    }

    /// Risk shown with one decimal, e.g. `0.4%`.
    pub fn risk_display(&self) -> String {
        format!("{:.1}%", self.risk_pct)
    }

    /// Content hash over asset, direction, setup and levels.
    ///
    /// Two evaluations of the same snapshot produce the same id.
    pub fn id(&self) -> String {
        let key = format!(
            "{}|{}|{}|{:.5}|{:.5}|{:.5}|{}",
            self.asset,
            self.direction,
            self.setup_display(),
            self.entry,
            self.stop_loss,
            self.take_profit,
            self.candle_time.timestamp(),
        );
        blake3::hash(key.as_bytes()).to_hex()[..16].to_string()
    }

    /// Absolute distance from entry to stop.
    pub fn risk_distance(&self) -> f64 {
        (self.entry - self.stop_loss).abs()
    }

    /// Absolute distance from entry to target.
    pub fn reward_distance(&self) -> f64 {
        (self.take_profit - self.entry).abs()
    }
}
