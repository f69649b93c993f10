//! Polling-cycle behaviour against an engineered series and in-memory collaborators.

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use killzone_core::data::{CandleProvider, DataError, RawCandle, Timeframe};
use killzone_core::{Direction, FixedClock, KillZone};
use killzone_runner::{
    AssetConfig, AssetOutcome, BotConfig, CycleError, CycleReport, CycleSummary, MarketKind,
    MemoryNotifier, SignalBot, SignalStore,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ── Fixtures ─────────────────────────────────────────────────────────

fn est(hour: u32, minute: u32) -> DateTime<Utc> {
    FixedOffset::west_opt(5 * 3600)
        .unwrap()
        .with_ymd_and_hms(2024, 3, 4, hour, minute, 0)
        .unwrap()
        .with_timezone(&Utc)
}

fn flat(price: f64) -> (f64, f64, f64, f64, f64) {
    (price, price + 0.5, price - 0.5, price, 1000.0)
}

/// 60 five-minute candles ending 08:55 EST with a gap, an order block and a
/// breakout, all bullish.
fn bullish_raw() -> Vec<RawCandle> {
    let mut rows = Vec::with_capacity(60);
    for i in 0..31 {
        if i == 20 {
            rows.push((100.0, 100.5, 98.5, 100.0, 1000.0));
        } else {
            rows.push(flat(100.0));
        }
    }
    rows.push((100.8, 101.2, 100.7, 101.1, 1000.0));
    rows.push((101.4, 101.9, 101.3, 101.8, 1000.0));
    for _ in 33..39 {
        rows.push(flat(101.8));
    }
    rows.push((101.8, 102.0, 101.2, 101.4, 1000.0));
    rows.push((101.4, 102.7, 101.3, 102.6, 3000.0));
    for _ in 41..55 {
        rows.push(flat(102.6));
    }
    rows.push((102.6, 104.2, 102.5, 104.0, 3000.0));
    for _ in 56..60 {
        rows.push(flat(104.0));
    }

    let start = est(9, 0) - Duration::minutes(5 * rows.len() as i64);
    rows.into_iter()
        .enumerate()
        .map(|(i, (open, high, low, close, volume))| RawCandle {
            time: start + Duration::minutes(5 * i as i64),
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close: Some(close),
            volume: Some(volume),
        })
        .collect()
}

/// Serves the bullish series for every ticker except those listed as failing.
struct ScriptedProvider {
    failing: Vec<String>,
}

impl ScriptedProvider {
    fn healthy() -> Box<Self> {
        Box::new(Self { failing: vec![] })
    }

    fn failing_for(tickers: &[&str]) -> Box<Self> {
        Box::new(Self {
            failing: tickers.iter().map(|t| t.to_string()).collect(),
        })
    }
}

impl CandleProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fetch(&self, ticker: &str, _timeframe: Timeframe) -> Result<Vec<RawCandle>, DataError> {
        if self.failing.iter().any(|t| t == ticker) {
            return Err(DataError::NetworkUnreachable(format!("{ticker} offline")));
        }
        Ok(bullish_raw())
    }

    fn is_available(&self) -> bool {
        true
    }
}

fn config(assets: Vec<AssetConfig>) -> BotConfig {
    BotConfig {
        assets,
        ..BotConfig::default()
    }
}

fn forex(name: &str) -> AssetConfig {
    AssetConfig::new(name, name, 0.0, MarketKind::Forex)
}

fn bot(
    config: BotConfig,
    provider: Box<dyn CandleProvider>,
    notifier: Arc<MemoryNotifier>,
    store: SignalStore,
    now: DateTime<Utc>,
) -> SignalBot {
    let clock = Arc::new(FixedClock::new(now));
    let sleeper = clock.clone();
    SignalBot::new(config, provider, Box::new(notifier), store, clock)
        .unwrap()
        .with_pause(move |pause, _| {
            sleeper.advance(Duration::from_std(pause).unwrap());
        })
}

fn memory_store() -> SignalStore {
    SignalStore::in_memory(Duration::hours(4), 0.001)
}

fn processed(report: CycleReport) -> CycleSummary {
    match report {
        CycleReport::Processed(summary) => summary,
        CycleReport::OutsideKillZone => panic!("expected a processed cycle"),
    }
}

// ── Single cycle ─────────────────────────────────────────────────────

#[test]
fn sends_and_records_signal_in_new_york() {
    let notifier = Arc::new(MemoryNotifier::new());
    let mut bot = bot(
        config(vec![forex("EUR/USD")]),
        ScriptedProvider::healthy(),
        notifier.clone(),
        memory_store(),
        est(9, 0),
    );

    let summary = processed(bot.process_cycle(est(9, 0)).unwrap());
    assert_eq!(summary.zone, KillZone::NewYork);
    assert_eq!(summary.sent().len(), 1);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].direction, Direction::Buy);
    assert_eq!(sent[0].entry, 104.0);
    assert_eq!(bot.store().get("EUR/USD").unwrap().sent_at, est(9, 0));
}

#[test]
fn outside_kill_zone_does_nothing() {
    let notifier = Arc::new(MemoryNotifier::new());
    let mut bot = bot(
        config(vec![forex("EUR/USD")]),
        ScriptedProvider::healthy(),
        notifier.clone(),
        memory_store(),
        est(14, 0),
    );
    assert_eq!(bot.process_cycle(est(14, 0)).unwrap(), CycleReport::OutsideKillZone);
    assert!(notifier.sent().is_empty());
}

#[test]
fn throttles_then_suppresses_duplicate() {
    let notifier = Arc::new(MemoryNotifier::new());
    let mut bot = bot(
        config(vec![forex("EUR/USD")]),
        ScriptedProvider::healthy(),
        notifier.clone(),
        memory_store(),
        est(9, 0),
    );

    processed(bot.process_cycle(est(9, 0)).unwrap());

    let early = processed(bot.process_cycle(est(9, 3)).unwrap());
    assert_eq!(early.outcome("EUR/USD"), Some(&AssetOutcome::Throttled));

    let later = processed(bot.process_cycle(est(9, 5)).unwrap());
    assert_eq!(later.outcome("EUR/USD"), Some(&AssetOutcome::Duplicate));
    assert_eq!(notifier.sent().len(), 1);
}

#[test]
fn failed_send_is_not_recorded_and_retried() {
    let notifier = Arc::new(MemoryNotifier::new());
    notifier.set_failing(true);
    let mut bot = bot(
        config(vec![forex("EUR/USD")]),
        ScriptedProvider::healthy(),
        notifier.clone(),
        memory_store(),
        est(9, 0),
    );

    let first = processed(bot.process_cycle(est(9, 0)).unwrap());
    assert!(matches!(first.outcome("EUR/USD"), Some(AssetOutcome::SendFailed(_))));
    assert!(bot.store().is_empty());

    notifier.set_failing(false);
    let second = processed(bot.process_cycle(est(9, 5)).unwrap());
    assert!(matches!(second.outcome("EUR/USD"), Some(AssetOutcome::Sent(_))));
    assert_eq!(notifier.sent().len(), 1);
}

#[test]
fn one_failing_asset_does_not_block_others() {
    let notifier = Arc::new(MemoryNotifier::new());
    let mut bot = bot(
        config(vec![forex("EUR/USD"), forex("GBP/USD")]),
        ScriptedProvider::failing_for(&["GBP/USD"]),
        notifier.clone(),
        memory_store(),
        est(9, 0),
    );

    let summary = processed(bot.process_cycle(est(9, 0)).unwrap());
    assert_eq!(summary.failures(), 1);
    assert!(matches!(summary.outcome("GBP/USD"), Some(AssetOutcome::FetchFailed(_))));
    assert!(matches!(summary.outcome("EUR/USD"), Some(AssetOutcome::Sent(_))));
}

#[test]
fn every_asset_failing_fails_the_cycle() {
    let mut bot = bot(
        config(vec![forex("EUR/USD"), forex("GBP/USD")]),
        ScriptedProvider::failing_for(&["EUR/USD", "GBP/USD"]),
        Arc::new(MemoryNotifier::new()),
        memory_store(),
        est(9, 0),
    );
    assert!(matches!(
        bot.process_cycle(est(9, 0)),
        Err(CycleError::AllAssetsFailed { count: 2 })
    ));
}

#[test]
fn closed_market_is_skipped_in_london() {
    let mut bot = bot(
        config(vec![AssetConfig::new("NASDAQ-100", "^NDX", 0.0, MarketKind::Equity)]),
        ScriptedProvider::healthy(),
        Arc::new(MemoryNotifier::new()),
        memory_store(),
        est(3, 0),
    );
    let summary = processed(bot.process_cycle(est(3, 0)).unwrap());
    assert_eq!(summary.zone, KillZone::London);
    assert_eq!(summary.outcome("NASDAQ-100"), Some(&AssetOutcome::MarketClosed));
}

#[test]
fn thin_volume_is_skipped() {
    let mut bot = bot(
        config(vec![AssetConfig::new("Gold", "GC=F", 5000.0, MarketKind::Forex)]),
        ScriptedProvider::healthy(),
        Arc::new(MemoryNotifier::new()),
        memory_store(),
        est(9, 0),
    );
    let summary = processed(bot.process_cycle(est(9, 0)).unwrap());
    assert_eq!(
        summary.outcome("Gold"),
        Some(&AssetOutcome::LowVolume {
            volume: 1000.0,
            min_volume: 5000.0
        })
    );
}

// ── Persistence across restarts ──────────────────────────────────────

#[test]
fn stored_signal_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("signals.json");
    let open = || SignalStore::open(&path, Duration::hours(4), 0.001);

    let first_notifier = Arc::new(MemoryNotifier::new());
    let mut first = bot(
        config(vec![forex("EUR/USD")]),
        ScriptedProvider::healthy(),
        first_notifier.clone(),
        open(),
        est(9, 0),
    );
    processed(first.process_cycle(est(9, 0)).unwrap());
    assert_eq!(first_notifier.sent().len(), 1);
    drop(first);

    let second_notifier = Arc::new(MemoryNotifier::new());
    let mut second = bot(
        config(vec![forex("EUR/USD")]),
        ScriptedProvider::healthy(),
        second_notifier.clone(),
        open(),
        est(9, 10),
    );
    let summary = processed(second.process_cycle(est(9, 10)).unwrap());
    assert_eq!(summary.outcome("EUR/USD"), Some(&AssetOutcome::Duplicate));
    assert!(second_notifier.sent().is_empty());
}

// ── Run loop ─────────────────────────────────────────────────────────

#[test]
fn run_stops_after_max_cycles_of_simulated_time() {
    // Pauses advance the clock: 09:00 sends, 09:05 and 09:10 are duplicates.
    let notifier = Arc::new(MemoryNotifier::new());
    let mut bot = bot(
        config(vec![forex("EUR/USD")]),
        ScriptedProvider::healthy(),
        notifier.clone(),
        memory_store(),
        est(9, 0),
    );
    let summary = bot.run(&AtomicBool::new(false), Some(3)).unwrap();
    assert_eq!(summary.cycles, 3);
    assert_eq!(summary.signals_sent, 1);
    assert_eq!(summary.failed_cycles, 0);
    assert_eq!(notifier.sent().len(), 1);
}

#[test]
fn run_gives_up_after_consecutive_errors() {
    // Backoffs of 60s then 120s must clear the per-asset interval.
    let mut cfg = config(vec![forex("EUR/USD")]);
    cfg.poll.min_asset_interval_secs = 30;
    let mut bot = bot(
        cfg,
        ScriptedProvider::failing_for(&["EUR/USD"]),
        Arc::new(MemoryNotifier::new()),
        memory_store(),
        est(9, 0),
    );
    let result = bot.run(&AtomicBool::new(false), None);
    assert!(matches!(result, Err(CycleError::TooManyErrors { count: 3 })));
}

#[test]
fn run_returns_immediately_when_shut_down() {
    let mut bot = bot(
        config(vec![forex("EUR/USD")]),
        ScriptedProvider::healthy(),
        Arc::new(MemoryNotifier::new()),
        memory_store(),
        est(9, 0),
    );
    let shutdown = AtomicBool::new(true);
    assert_eq!(bot.run(&shutdown, None).unwrap().cycles, 0);
}

#[test]
fn shutdown_during_pause_stops_before_next_cycle() {
    // The pause stands in for an interrupt arriving between cycles.
    let notifier = Arc::new(MemoryNotifier::new());
    let mut bot = SignalBot::new(
        config(vec![forex("EUR/USD")]),
        ScriptedProvider::healthy(),
        Box::new(notifier.clone()),
        memory_store(),
        Arc::new(FixedClock::new(est(9, 0))),
    )
    .unwrap()
    .with_pause(|_, shutdown| shutdown.store(true, Ordering::SeqCst));

    let shutdown = AtomicBool::new(false);
    let summary = bot.run(&shutdown, None).unwrap();
    assert!(shutdown.load(Ordering::SeqCst));
    assert_eq!(summary.cycles, 1);
    assert_eq!(summary.signals_sent, 1);
    assert_eq!(notifier.sent().len(), 1);
}
