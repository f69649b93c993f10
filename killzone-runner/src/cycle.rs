//! The polling bot: one cycle gates, fetches, evaluates, dedups and delivers.
//!
//! Per-asset work (fetch, ingest, evaluate) runs on the rayon pool; delivery
//! and the signal store are touched sequentially afterwards, so the store
//! never needs a lock.

use chrono::{DateTime, Utc};
use killzone_core::data::{
    ingest, CandleProvider, CircuitBreaker, CsvProvider, DataError, DataSource, SyntheticProvider,
    YahooProvider,
};
use killzone_core::{Clock, ConfluenceEngine, Decision, KillZone, Signal, SystemClock};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{AssetConfig, BotConfig, ConfigError, NotifierKind};
use crate::notify::{Notifier, NotifyError, StdoutNotifier, TelegramNotifier, TelegramSettings};
use crate::store::{SignalStore, StoreError};

/// Candles the synthetic source serves per fetch.
const SYNTHETIC_CANDLES: usize = 300;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("failed to build data provider: {0}")]
    Provider(#[from] DataError),

    #[error("all {count} selected assets failed")]
    AllAssetsFailed { count: usize },

    #[error("too many consecutive errors ({count}), shutting down")]
    TooManyErrors { count: u32 },
}

/// What happened to one asset in a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetOutcome {
    /// Checked too recently.
    Throttled,
    MarketClosed,
    ProviderUnavailable,
    FetchFailed(String),
    LowVolume { volume: f64, min_volume: f64 },
    /// Evaluated without emitting; the label says why.
    NoSignal(&'static str),
    Duplicate,
    Sent(Signal),
    SendFailed(String),
}

impl AssetOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, AssetOutcome::FetchFailed(_) | AssetOutcome::SendFailed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetReport {
    pub asset: String,
    pub outcome: AssetOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleSummary {
    pub zone: KillZone,
    pub expired_removed: usize,
    pub assets: Vec<AssetReport>,
}

impl CycleSummary {
    pub fn sent(&self) -> Vec<&Signal> {
        self.assets
            .iter()
            .filter_map(|r| match &r.outcome {
                AssetOutcome::Sent(signal) => Some(signal),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> usize {
        self.assets.iter().filter(|r| r.outcome.is_failure()).count()
    }

    pub fn outcome(&self, asset: &str) -> Option<&AssetOutcome> {
        self.assets.iter().find(|r| r.asset == asset).map(|r| &r.outcome)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleReport {
    OutsideKillZone,
    Processed(CycleSummary),
}

/// Totals for a [`SignalBot::run`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub signals_sent: usize,
    pub failed_cycles: u64,
}

/// Pause between cycles; returns early when `shutdown` is set.
pub type PauseFn = Box<dyn Fn(std::time::Duration, &AtomicBool) + Send + Sync>;

fn interruptible_sleep(duration: std::time::Duration, shutdown: &AtomicBool) {
    let step = std::time::Duration::from_millis(250);
    let deadline = std::time::Instant::now() + duration;
    while !shutdown.load(Ordering::SeqCst) {
        let now = std::time::Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(step.min(deadline - now));
    }
}

pub struct SignalBot {
    config: BotConfig,
    engine: ConfluenceEngine,
    provider: Box<dyn CandleProvider>,
    notifier: Box<dyn Notifier>,
    store: SignalStore,
    clock: Arc<dyn Clock>,
    last_checked: HashMap<String, DateTime<Utc>>,
    pause: PauseFn,
}

impl SignalBot {
    pub fn new(
        config: BotConfig,
        provider: Box<dyn CandleProvider>,
        notifier: Box<dyn Notifier>,
        store: SignalStore,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CycleError> {
        config.validate()?;
        let engine = ConfluenceEngine::new(config.session.gate()?);
        Ok(Self {
            config,
            engine,
            provider,
            notifier,
            store,
            clock,
            last_checked: HashMap::new(),
            pause: Box::new(interruptible_sleep),
        })
    }

    /// Wire provider, notifier and store from the configuration.
    pub fn from_config(config: BotConfig) -> Result<Self, CycleError> {
        config.validate()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let offset = config.session.gate()?.offset();

        let provider: Box<dyn CandleProvider> = match config.data.source {
            DataSource::Yahoo => Box::new(YahooProvider::new(
                Arc::new(CircuitBreaker::default_provider()),
                config.data.range.clone(),
            )?),
            DataSource::Csv => Box::new(CsvProvider::new(config.data.csv_dir.clone())),
            DataSource::Synthetic => Box::new(SyntheticProvider::new(
                config.data.seed,
                SYNTHETIC_CANDLES,
                clock.now(),
            )),
        };

        let notifier: Box<dyn Notifier> = match config.notifier.kind {
            NotifierKind::Stdout => Box::new(StdoutNotifier::new(offset)),
            NotifierKind::Telegram => {
                let (token, chat_id) = config.notifier.telegram_credentials()?;
                let settings = TelegramSettings {
                    min_interval: std::time::Duration::from_millis(config.notifier.min_interval_ms),
                    max_retries: config.notifier.max_retries,
                    retry_delay: std::time::Duration::from_millis(config.notifier.retry_delay_ms),
                };
                Box::new(TelegramNotifier::new(&token, chat_id, offset, settings)?)
            }
        };

        let store = SignalStore::open(
            config.store.path.clone(),
            config.store.expiry(),
            config.store.entry_tolerance,
        );

        info!(
            provider = provider.name(),
            notifier = notifier.name(),
            assets = config.assets.len(),
            "signal bot configured"
        );
        Self::new(config, provider, notifier, store, clock)
    }

    /// Replace the between-cycle pause, e.g. to drive a simulated clock.
    pub fn with_pause(
        mut self,
        pause: impl Fn(std::time::Duration, &AtomicBool) + Send + Sync + 'static,
    ) -> Self {
        self.pause = Box::new(pause);
        self
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn store(&self) -> &SignalStore {
        &self.store
    }

    fn select_assets(&mut self, now: DateTime<Utc>) -> (Vec<AssetConfig>, Vec<AssetReport>) {
        let min_interval = self.config.poll.min_asset_interval();
        let offset = self.engine.gate().offset();
        let mut selected = Vec::new();
        let mut skipped = Vec::new();

        for asset in &self.config.assets {
            if let Some(last) = self.last_checked.get(&asset.name) {
                if now - *last < min_interval {
                    skipped.push(AssetReport {
                        asset: asset.name.clone(),
                        outcome: AssetOutcome::Throttled,
                    });
                    continue;
                }
            }
            self.last_checked.insert(asset.name.clone(), now);

            if !asset.market().is_open(now, offset) {
                debug!(asset = %asset.name, "market closed");
                skipped.push(AssetReport {
                    asset: asset.name.clone(),
                    outcome: AssetOutcome::MarketClosed,
                });
                continue;
            }
            selected.push(asset.clone());
        }
        (selected, skipped)
    }

    /// Fetch, ingest and evaluate one asset. Runs on the rayon pool.
    fn evaluate_asset(&self, asset: &AssetConfig, now: DateTime<Utc>) -> Result<Signal, AssetOutcome> {
        if !self.provider.is_available() {
            return Err(AssetOutcome::ProviderUnavailable);
        }

        let raw = self
            .provider
            .fetch(&asset.ticker, asset.timeframe)
            .map_err(|e| AssetOutcome::FetchFailed(e.to_string()))?;
        let series = ingest(raw, now, self.engine.required_candles())
            .map_err(|e| AssetOutcome::FetchFailed(e.to_string()))?;

        let volume = series.last().volume;
        if volume < asset.min_volume {
            return Err(AssetOutcome::LowVolume {
                volume,
                min_volume: asset.min_volume,
            });
        }

        match self.engine.evaluate_detailed(&asset.name, series.as_slice(), now) {
            Ok(Decision::Emitted(signal)) => Ok(signal),
            Ok(decision) => Err(AssetOutcome::NoSignal(decision.label())),
            Err(e) => Err(AssetOutcome::FetchFailed(e.to_string())),
        }
    }

    /// Run one polling cycle at `now`.
    pub fn process_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        let local = now.with_timezone(&self.engine.gate().offset());
        let Some(zone) = self.engine.gate().active_zone(now) else {
            info!(time = %local.format("%H:%M"), "not in a kill zone, waiting");
            return Ok(CycleReport::OutsideKillZone);
        };
        info!(time = %local.format("%H:%M"), %zone, "in kill zone, checking for signals");

        let expired_removed = self.store.cleanup_expired(now)?;
        let (selected, mut reports) = self.select_assets(now);

        let evaluated: Vec<(String, Result<Signal, AssetOutcome>)> = selected
            .par_iter()
            .map(|asset| (asset.name.clone(), self.evaluate_asset(asset, now)))
            .collect();

        let mut failed = 0;
        for (asset, result) in evaluated {
            let outcome = match result {
                Ok(signal) => self.deliver(signal, now)?,
                Err(outcome) => {
                    match &outcome {
                        AssetOutcome::FetchFailed(e) => {
                            failed += 1;
                            error!(asset = %asset, error = %e, "error processing asset");
                        }
                        AssetOutcome::NoSignal(reason) => {
                            info!(asset = %asset, reason, "no signal detected")
                        }
                        other => debug!(asset = %asset, outcome = ?other, "asset skipped"),
                    }
                    outcome
                }
            };
            reports.push(AssetReport { asset, outcome });
        }

        if !selected.is_empty() && failed == selected.len() {
            return Err(CycleError::AllAssetsFailed { count: failed });
        }

        Ok(CycleReport::Processed(CycleSummary {
            zone,
            expired_removed,
            assets: reports,
        }))
    }

    /// Duplicate check, then send, then record. Only a delivered signal is recorded.
    fn deliver(&mut self, signal: Signal, now: DateTime<Utc>) -> Result<AssetOutcome, CycleError> {
        if self.store.is_duplicate(&signal, now) {
            info!(asset = %signal.asset, "duplicate signal, skipping");
            return Ok(AssetOutcome::Duplicate);
        }
        match self.notifier.send(&signal, now) {
            Ok(()) => {
                info!(
                    asset = %signal.asset,
                    direction = %signal.direction,
                    setup = %signal.setup_display(),
                    notifier = self.notifier.name(),
                    "signal dispatched"
                );
                self.store.record(signal.clone(), now)?;
                Ok(AssetOutcome::Sent(signal))
            }
            Err(e) => {
                error!(asset = %signal.asset, error = %e, "failed to send signal");
                Ok(AssetOutcome::SendFailed(e.to_string()))
            }
        }
    }

    /// Poll until `shutdown` is set, `max_cycles` cycles have run, or too
    /// many consecutive cycles fail.
    pub fn run(&mut self, shutdown: &AtomicBool, max_cycles: Option<u64>) -> Result<RunSummary, CycleError> {
        let max_errors = self.config.poll.max_consecutive_errors;
        let interval = std::time::Duration::from_secs(self.config.poll.interval_secs);
        let mut summary = RunSummary::default();
        let mut consecutive_errors = 0u32;

        info!(assets = self.config.assets.len(), "signal bot started");
        while !shutdown.load(Ordering::SeqCst) {
            let now = self.clock.now();
            let result = self.process_cycle(now);
            summary.cycles += 1;

            let pause = match result {
                Ok(report) => {
                    consecutive_errors = 0;
                    if let CycleReport::Processed(cycle) = &report {
                        summary.signals_sent += cycle.sent().len();
                    }
                    interval
                }
                Err(e) => {
                    consecutive_errors += 1;
                    summary.failed_cycles += 1;
                    error!(error = %e, consecutive_errors, "cycle failed");
                    if consecutive_errors >= max_errors {
                        error!(count = consecutive_errors, "too many consecutive errors, shutting down");
                        return Err(CycleError::TooManyErrors {
                            count: consecutive_errors,
                        });
                    }
                    let backoff = std::time::Duration::from_secs(
                        self.config.poll.backoff_base_secs * u64::from(consecutive_errors),
                    );
                    warn!(secs = backoff.as_secs(), "backing off before retry");
                    backoff
                }
            };

            if max_cycles.is_some_and(|max| summary.cycles >= max) {
                break;
            }
            (self.pause)(pause, shutdown);
        }

        info!(cycles = summary.cycles, sent = summary.signals_sent, "signal bot stopped");
        Ok(summary)
    }
}

impl std::fmt::Debug for SignalBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalBot")
            .field("provider", &self.provider.name())
            .field("notifier", &self.notifier.name())
            .field("assets", &self.config.assets.len())
            .field("stored_signals", &self.store.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use killzone_core::FixedClock;

    #[test]
    fn interruptible_sleep_returns_on_shutdown() {
        let shutdown = AtomicBool::new(true);
        let start = std::time::Instant::now();
        interruptible_sleep(std::time::Duration::from_secs(30), &shutdown);
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn failure_outcomes() {
        assert!(AssetOutcome::FetchFailed("x".into()).is_failure());
        assert!(AssetOutcome::SendFailed("x".into()).is_failure());
        assert!(!AssetOutcome::Duplicate.is_failure());
        assert!(!AssetOutcome::NoSignal("insufficient_confluence").is_failure());
    }

    #[test]
    fn rejects_invalid_config() {
        let config = BotConfig {
            assets: vec![],
            ..BotConfig::default()
        };
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let bot = SignalBot::new(
            config,
            Box::new(SyntheticProvider::new(1, 100, Utc::now())),
            Box::new(crate::notify::MemoryNotifier::new()),
            SignalStore::in_memory(chrono::Duration::hours(4), 0.001),
            clock,
        );
        assert!(matches!(bot, Err(CycleError::Config(_))));
    }
}
