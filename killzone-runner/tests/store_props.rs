//! Property tests for the duplicate rule.

use chrono::{Duration, TimeZone, Utc};
use killzone_core::domain::Confidence;
use killzone_core::{Direction, KillZone, Signal};
use killzone_runner::SignalStore;
use proptest::prelude::*;

fn signal(entry: f64, direction: Direction) -> Signal {
    let at = Utc.with_ymd_and_hms(2024, 3, 4, 14, 0, 0).unwrap();
    Signal {
        asset: "EUR/USD".into(),
        direction,
        entry,
        stop_loss: entry * 0.99,
        take_profit: entry * 1.015,
        kill_zone: KillZone::NewYork,
        setup: ["BOS_bullish", "FVG_bullish", "OB_bullish"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        risk_pct: 1.0,
        confidence: Confidence {
            agreeing: 3,
            total: 3,
        },
        evaluated_at: at,
        candle_time: at,
    }
}

proptest! {
    #[test]
    fn entries_inside_tolerance_are_duplicates(
        entry in 0.5f64..50_000.0,
        rel in -0.0009f64..0.0009,
        minutes in 0i64..=240,
    ) {
        let mut store = SignalStore::in_memory(Duration::hours(4), 0.001);
        let first = signal(entry, Direction::Buy);
        let sent_at = first.evaluated_at;
        store.record(first, sent_at).unwrap();

        let repeat = signal(entry * (1.0 + rel), Direction::Buy);
        prop_assert!(store.is_duplicate(&repeat, sent_at + Duration::minutes(minutes)));
    }

    #[test]
    fn entries_outside_tolerance_are_new(
        entry in 0.5f64..50_000.0,
        rel in 0.0011f64..0.5,
        down in any::<bool>(),
    ) {
        let mut store = SignalStore::in_memory(Duration::hours(4), 0.001);
        let first = signal(entry, Direction::Buy);
        let sent_at = first.evaluated_at;
        store.record(first, sent_at).unwrap();

        let factor = if down { 1.0 - rel } else { 1.0 + rel };
        prop_assert!(!store.is_duplicate(&signal(entry * factor, Direction::Buy), sent_at));
    }

    #[test]
    fn opposite_direction_is_never_a_duplicate(entry in 0.5f64..50_000.0) {
        let mut store = SignalStore::in_memory(Duration::hours(4), 0.001);
        let first = signal(entry, Direction::Buy);
        let sent_at = first.evaluated_at;
        store.record(first, sent_at).unwrap();
        prop_assert!(!store.is_duplicate(&signal(entry, Direction::Sell), sent_at));
    }
}
