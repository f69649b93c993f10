//! Killzone Runner: the polling bot built on `killzone-core`.
//!
//! This crate provides:
//! - TOML configuration with defaults for every section
//! - Market-hours filtering per asset class
//! - A persistent, deduplicating signal store
//! - Notifiers (stdout, Telegram, in-memory)
//! - The polling cycle with per-asset isolation and error backoff
//! - A replay harness over historical candles

pub mod config;
pub mod cycle;
pub mod logging;
pub mod market_hours;
pub mod notify;
pub mod replay;
pub mod store;

pub use config::{AssetConfig, BotConfig, ConfigError, NotifierKind};
pub use cycle::{AssetOutcome, AssetReport, CycleError, CycleReport, CycleSummary, RunSummary, SignalBot};
pub use market_hours::MarketKind;
pub use notify::{
    format_signal_message, MemoryNotifier, Notifier, NotifyError, StdoutNotifier, TelegramNotifier,
};
pub use replay::{export_signals_csv, replay, write_signals_csv, ReplayReport, ReplaySignal};
pub use store::{SignalStore, StoreError, StoredSignal};
