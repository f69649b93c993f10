//! Confluence tally: recency filter plus directional vote.

use super::config::EngineConfig;
use crate::domain::{Confidence, Direction};
use crate::patterns::{Bias, PatternEvent, PatternKind, PatternSet};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Tags and vote counts of every recent directional event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tally {
    /// One tag per event, duplicates kept.
    pub tags: Vec<String>,
    pub bullish: usize,
    pub bearish: usize,
}

impl Tally {
    /// Tally the events that are recent enough relative to `last_time`.
    ///
    /// Liquidity pools never vote.
    pub fn from_patterns(patterns: &PatternSet, last_time: DateTime<Utc>, config: &EngineConfig) -> Self {
        let mut tally = Tally::default();
        for event in &patterns.events {
            if !is_recent(event, last_time, config) {
                continue;
            }
            let (Some(bias), Some(tag)) = (event.bias(), event.tag()) else {
                continue;
            };
            match bias {
                Bias::Bullish => tally.bullish += 1,
                Bias::Bearish => tally.bearish += 1,
            }
            tally.tags.push(tag);
        }
        tally
    }

    /// Raw count used for the threshold.
    pub fn count(&self) -> usize {
        self.tags.len()
    }

    /// BUY only on a strict bullish majority; ties go to SELL.
    pub fn direction(&self) -> Direction {
        if self.bullish > self.bearish {
            Direction::Buy
        } else {
            Direction::Sell
        }
    }

    pub fn confidence(&self) -> Confidence {
        Confidence {
            agreeing: self.bullish.max(self.bearish),
            total: self.count(),
        }
    }

    pub fn setup(&self) -> BTreeSet<String> {
        self.tags.iter().cloned().collect()
    }
}

fn is_recent(event: &PatternEvent, last_time: DateTime<Utc>, config: &EngineConfig) -> bool {
    let window = match event.kind() {
        PatternKind::FairValueGap | PatternKind::OrderBlock => config.zone_recency,
        PatternKind::BreakOfStructure | PatternKind::ChangeOfCharacter => config.structure_recency,
        PatternKind::LiquidityPool => return false,
    };
    last_time - event.anchor_time() <= window
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::{FairValueGap, LiquidityPool, OrderBlock, PoolSide, StructureBreak};
    use chrono::{Duration, TimeZone};

    fn last() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap()
    }

    fn fvg(bias: Bias, age: Duration) -> PatternEvent {
        PatternEvent::FairValueGap(FairValueGap {
            bias,
            index: 0,
            start_time: last() - age - Duration::minutes(10),
            end_time: last() - age,
            low: 100.0,
            high: 101.0,
            gap_size: 1.0,
        })
    }

    fn ob(bias: Bias, age: Duration) -> PatternEvent {
        PatternEvent::OrderBlock(OrderBlock {
            bias,
            index: 0,
            time: last() - age,
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            strength: 2.0,
            atr: Some(1.0),
        })
    }

    fn bos(bias: Bias, age: Duration) -> PatternEvent {
        PatternEvent::BreakOfStructure(StructureBreak {
            bias,
            index: 0,
            time: last() - age,
            break_level: 101.0,
            strength: 1.0,
        })
    }

    fn tally(events: Vec<PatternEvent>) -> Tally {
        Tally::from_patterns(&PatternSet { events }, last(), &EngineConfig::default())
    }

    #[test]
    fn recency_windows_are_inclusive() {
        let t = tally(vec![
            fvg(Bias::Bullish, Duration::hours(4)),
            ob(Bias::Bullish, Duration::hours(4) + Duration::minutes(5)),
            bos(Bias::Bullish, Duration::hours(2)),
            bos(Bias::Bullish, Duration::hours(2) + Duration::minutes(5)),
        ]);
        assert_eq!(t.tags, vec!["FVG_bullish", "BOS_bullish"]);
    }

    #[test]
    fn pools_do_not_vote() {
        let pool = PatternEvent::LiquidityPool(LiquidityPool {
            side: PoolSide::SellSide,
            index: 0,
            time: last(),
            price: 101.0,
            strength: 1.01,
        });
        assert_eq!(tally(vec![pool]).count(), 0);
    }

    #[test]
    fn duplicates_count_but_setup_dedups() {
        let t = tally(vec![
            fvg(Bias::Bullish, Duration::minutes(30)),
            fvg(Bias::Bullish, Duration::minutes(20)),
            ob(Bias::Bearish, Duration::minutes(10)),
        ]);
        assert_eq!(t.count(), 3);
        assert_eq!(t.setup().len(), 2);
        assert_eq!(t.direction(), Direction::Buy);
        assert_eq!(t.confidence(), Confidence { agreeing: 2, total: 3 });
    }

    #[test]
    fn tie_goes_to_sell() {
        let t = tally(vec![
            fvg(Bias::Bullish, Duration::minutes(30)),
            ob(Bias::Bearish, Duration::minutes(10)),
        ]);
        assert_eq!(t.direction(), Direction::Sell);
    }
}
