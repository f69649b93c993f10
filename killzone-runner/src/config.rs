//! Bot configuration loaded from TOML.
//!
//! Every section has defaults, so an empty file is a valid configuration
//! watching the default asset universe. Secrets never live in the file: the
//! notifier section only names the environment variables that hold them.

use chrono::Duration;
use killzone_core::data::{DataSource, Timeframe};
use killzone_core::session::{SessionGate, DEFAULT_UTC_OFFSET_HOURS};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::market_hours::MarketKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("environment variable {0} is not set")]
    MissingEnv(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub session: SessionConfig,
    pub poll: PollConfig,
    pub store: StoreConfig,
    pub data: DataConfig,
    pub notifier: NotifierConfig,
    pub assets: Vec<AssetConfig>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            poll: PollConfig::default(),
            store: StoreConfig::default(),
            data: DataConfig::default(),
            notifier: NotifierConfig::default(),
            assets: Self::default_assets(),
        }
    }
}

impl BotConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: BotConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Five-minute candles on two FX majors, the Nasdaq 100, gold and bitcoin.
    pub fn default_assets() -> Vec<AssetConfig> {
        vec![
            AssetConfig::new("EUR/USD", "EUR/USD", 0.0, MarketKind::Forex),
            AssetConfig::new("GBP/USD", "GBP/USD", 0.0, MarketKind::Forex),
            AssetConfig::new("NASDAQ-100", "^NDX", 1000.0, MarketKind::Equity),
            AssetConfig::new("Gold", "GC=F", 100.0, MarketKind::Futures),
            AssetConfig::new("Bitcoin", "BTC-USD", 1.0, MarketKind::Crypto),
        ]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.assets.is_empty() {
            return Err(ConfigError::Invalid("no assets configured".into()));
        }

        let mut seen = HashSet::new();
        for asset in &self.assets {
            if asset.name.trim().is_empty() || asset.ticker.trim().is_empty() {
                return Err(ConfigError::Invalid("asset name and ticker must be non-empty".into()));
            }
            if !seen.insert(asset.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate asset '{}'", asset.name)));
            }
            if !(asset.min_volume >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "asset '{}': min_volume must be >= 0",
                    asset.name
                )));
            }
        }

        if self.poll.interval_secs == 0 || self.poll.min_asset_interval_secs == 0 {
            return Err(ConfigError::Invalid("poll intervals must be positive".into()));
        }
        if self.poll.max_consecutive_errors == 0 {
            return Err(ConfigError::Invalid("max_consecutive_errors must be >= 1".into()));
        }
        if self.store.expiry_hours <= 0 {
            return Err(ConfigError::Invalid("store.expiry_hours must be positive".into()));
        }
        if !(self.store.entry_tolerance > 0.0 && self.store.entry_tolerance < 1.0) {
            return Err(ConfigError::Invalid("store.entry_tolerance must be in (0, 1)".into()));
        }
        if self.data.source == DataSource::Yahoo && self.data.range.trim().is_empty() {
            return Err(ConfigError::Invalid("data.range must be set for yahoo".into()));
        }
        self.session.gate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Offset of the kill-zone reference zone from UTC (EST is -5).
    pub utc_offset_hours: i32,
}

impl SessionConfig {
    pub fn gate(&self) -> Result<SessionGate, ConfigError> {
        SessionGate::from_utc_offset_hours(self.utc_offset_hours)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_secs: u64,
    /// An asset is not re-checked sooner than this.
    pub min_asset_interval_secs: u64,
    pub max_consecutive_errors: u32,
    /// Backoff after the n-th consecutive failed cycle is `n × backoff_base_secs`.
    pub backoff_base_secs: u64,
}

impl PollConfig {
    pub fn min_asset_interval(&self) -> Duration {
        Duration::seconds(self.min_asset_interval_secs as i64)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            min_asset_interval_secs: 240,
            max_consecutive_errors: 3,
            backoff_base_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub expiry_hours: i64,
    /// Relative entry difference under which a repeat is a duplicate.
    pub entry_tolerance: f64,
}

impl StoreConfig {
    pub fn expiry(&self) -> Duration {
        Duration::hours(self.expiry_hours)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("signals.json"),
            expiry_hours: 4,
            entry_tolerance: 0.001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub source: DataSource,
    /// Directory of `<ticker>.csv` files for the csv source.
    pub csv_dir: PathBuf,
    /// Yahoo lookback window.
    pub range: String,
    /// Seed for the synthetic source.
    pub seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            source: DataSource::Yahoo,
            csv_dir: PathBuf::from("data"),
            range: "5d".into(),
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifierKind {
    Stdout,
    Telegram,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub kind: NotifierKind,
    pub token_env: String,
    pub chat_id_env: String,
    pub min_interval_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl NotifierConfig {
    /// Read the Telegram token and chat id from the named variables.
    pub fn telegram_credentials(&self) -> Result<(String, String), ConfigError> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnv(name.to_string()))
        };
        Ok((read(&self.token_env)?, read(&self.chat_id_env)?))
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::Stdout,
            token_env: "BOT_TOKEN".into(),
            chat_id_env: "CHAT_ID".into(),
            min_interval_ms: 1000,
            max_retries: 3,
            retry_delay_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Display name, also the key in the signal store.
    pub name: String,
    /// Symbol handed to the data provider.
    pub ticker: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: Timeframe,
    /// Latest candle volume below this skips the asset.
    #[serde(default)]
    pub min_volume: f64,
    /// Trading hours; inferred from the ticker when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market: Option<MarketKind>,
}

fn default_timeframe() -> Timeframe {
    Timeframe::M5
}

impl AssetConfig {
    pub fn new(name: &str, ticker: &str, min_volume: f64, market: MarketKind) -> Self {
        Self {
            name: name.to_string(),
            ticker: ticker.to_string(),
            timeframe: Timeframe::M5,
            min_volume,
            market: Some(market),
        }
    }

    pub fn market(&self) -> MarketKind {
        self.market.unwrap_or_else(|| MarketKind::infer(&self.ticker))
    }
}
