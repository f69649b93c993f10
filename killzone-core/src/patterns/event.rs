//! Pattern events: the output of every structure detector.
//!
//! Events are derived values: recomputed from the candle series on every
//! evaluation, never persisted, no identity beyond their fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Directional bias of a structural pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    Bullish,
    Bearish,
}

impl Bias {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bias::Bullish => "bullish",
            Bias::Bearish => "bearish",
        }
    }

    pub fn opposite(&self) -> Bias {
        match self {
            Bias::Bullish => Bias::Bearish,
            Bias::Bearish => Bias::Bullish,
        }
    }
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the book a liquidity pool rests on.
///
/// Swing highs hold sell-side liquidity (stops above the high); swing lows
/// hold buy-side liquidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PoolSide {
    BuySide,
    SellSide,
}

impl PoolSide {
    pub fn opposite(&self) -> PoolSide {
        match self {
            PoolSide::BuySide => PoolSide::SellSide,
            PoolSide::SellSide => PoolSide::BuySide,
        }
    }
}

/// Detector family an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PatternKind {
    LiquidityPool,
    FairValueGap,
    OrderBlock,
    BreakOfStructure,
    ChangeOfCharacter,
}

impl PatternKind {
    /// Short tag prefix used in confluence labels.
    pub fn tag(&self) -> &'static str {
        match self {
            PatternKind::LiquidityPool => "LIQ",
            PatternKind::FairValueGap => "FVG",
            PatternKind::OrderBlock => "OB",
            PatternKind::BreakOfStructure => "BOS",
            PatternKind::ChangeOfCharacter => "CHoCH",
        }
    }

    pub const ALL: [PatternKind; 5] = [
        PatternKind::LiquidityPool,
        PatternKind::FairValueGap,
        PatternKind::OrderBlock,
        PatternKind::BreakOfStructure,
        PatternKind::ChangeOfCharacter,
    ];
}

/// Swing extreme eligible as a liquidity pool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiquidityPool {
    pub side: PoolSide,
    pub index: usize,
    pub time: DateTime<Utc>,
    pub price: f64,
    /// Extreme relative to the nearest neighboring extreme (>= 1.0).
    pub strength: f64,
}

/// Three-candle imbalance. `low`/`high` bound the untraded gap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FairValueGap {
    pub bias: Bias,
    /// Index of the first candle of the window.
    pub index: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub low: f64,
    pub high: f64,
    pub gap_size: f64,
}

/// Last opposing candle before a volume-confirmed reversal.
///
/// Anchored on the block candle (the one before the reversal candle).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBlock {
    pub bias: Bias,
    pub index: usize,
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Reversal volume over average volume (1.0 when no average exists).
    pub strength: f64,
    /// ATR at the reversal candle, when defined.
    pub atr: Option<f64>,
}

/// A break through a recent extreme, shared by BOS and CHoCH.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructureBreak {
    pub bias: Bias,
    pub index: usize,
    pub time: DateTime<Utc>,
    pub break_level: f64,
    /// Break magnitude in ATR units.
    pub strength: f64,
}

/// Union of every detector's output, consumed uniformly by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternEvent {
    LiquidityPool(LiquidityPool),
    FairValueGap(FairValueGap),
    OrderBlock(OrderBlock),
    BreakOfStructure(StructureBreak),
    ChangeOfCharacter(StructureBreak),
}

impl PatternEvent {
    pub fn kind(&self) -> PatternKind {
        match self {
            PatternEvent::LiquidityPool(_) => PatternKind::LiquidityPool,
            PatternEvent::FairValueGap(_) => PatternKind::FairValueGap,
            PatternEvent::OrderBlock(_) => PatternKind::OrderBlock,
            PatternEvent::BreakOfStructure(_) => PatternKind::BreakOfStructure,
            PatternEvent::ChangeOfCharacter(_) => PatternKind::ChangeOfCharacter,
        }
    }

    /// Directional bias; liquidity pools carry none.
    pub fn bias(&self) -> Option<Bias> {
        match self {
            PatternEvent::LiquidityPool(_) => None,
            PatternEvent::FairValueGap(e) => Some(e.bias),
            PatternEvent::OrderBlock(e) => Some(e.bias),
            PatternEvent::BreakOfStructure(e) | PatternEvent::ChangeOfCharacter(e) => Some(e.bias),
        }
    }

    /// Time used for recency checks. Gaps anchor on their last candle.
    pub fn anchor_time(&self) -> DateTime<Utc> {
        match self {
            PatternEvent::LiquidityPool(e) => e.time,
            PatternEvent::FairValueGap(e) => e.end_time,
            PatternEvent::OrderBlock(e) => e.time,
            PatternEvent::BreakOfStructure(e) | PatternEvent::ChangeOfCharacter(e) => e.time,
        }
    }

    /// Detector-specific strength metric.
    pub fn strength(&self) -> f64 {
        match self {
            PatternEvent::LiquidityPool(e) => e.strength,
            PatternEvent::FairValueGap(e) => e.gap_size,
            PatternEvent::OrderBlock(e) => e.strength,
            PatternEvent::BreakOfStructure(e) | PatternEvent::ChangeOfCharacter(e) => e.strength,
        }
    }

    /// Confluence tag, e.g. `FVG_bullish`. `None` for liquidity pools.
    pub fn tag(&self) -> Option<String> {
        self.bias()
            .map(|bias| format!("{}_{}", self.kind().tag(), bias))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 14, min, 0).unwrap()
    }

    #[test]
    fn tags_use_kind_prefix_and_bias() {
        let ev = PatternEvent::ChangeOfCharacter(StructureBreak {
            bias: Bias::Bearish,
            index: 12,
            time: t(0),
            break_level: 100.0,
            strength: 0.8,
        });
        assert_eq!(ev.tag().as_deref(), Some("CHoCH_bearish"));
        assert_eq!(ev.kind(), PatternKind::ChangeOfCharacter);
    }

    #[test]
    fn pools_have_no_bias_or_tag() {
        let ev = PatternEvent::LiquidityPool(LiquidityPool {
            side: PoolSide::SellSide,
            index: 10,
            time: t(0),
            price: 101.0,
            strength: 1.01,
        });
        assert_eq!(ev.bias(), None);
        assert_eq!(ev.tag(), None);
    }

    #[test]
    fn gap_anchors_on_end_time() {
        let ev = PatternEvent::FairValueGap(FairValueGap {
            bias: Bias::Bullish,
            index: 3,
            start_time: t(0),
            end_time: t(10),
            low: 100.0,
            high: 101.0,
            gap_size: 1.0,
        });
        assert_eq!(ev.anchor_time(), t(10));
        assert_eq!(ev.strength(), 1.0);
    }

    #[test]
    fn event_serializes_with_kind_tag() {
        let ev = PatternEvent::BreakOfStructure(StructureBreak {
            bias: Bias::Bullish,
            index: 7,
            time: t(5),
            break_level: 99.5,
            strength: 1.2,
        });
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"kind\":\"break_of_structure\""));
        assert!(json.contains("\"bias\":\"bullish\""));
    }
}
