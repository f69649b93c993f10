//! Persistent record of delivered signals.
//!
//! - One JSON file mapping each asset to the last signal sent for it
//! - Atomic saves (write to .tmp, rename into place)
//! - A corrupt file is renamed to `{filename}.quarantined` and the store starts empty
//! - An unreadable file is logged and the store starts empty
//!
//! Only delivered signals are recorded, so a failed send is retried on the
//! next cycle instead of being suppressed as a duplicate.

use chrono::{DateTime, Duration, Utc};
use killzone_core::Signal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("signal store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize signal store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A signal plus the instant it was handed to the notifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSignal {
    #[serde(flatten)]
    pub signal: Signal,
    pub sent_at: DateTime<Utc>,
}

impl StoredSignal {
    pub fn is_expired(&self, now: DateTime<Utc>, expiry: Duration) -> bool {
        now - self.sent_at > expiry
    }
}

#[derive(Debug)]
pub struct SignalStore {
    path: PathBuf,
    expiry: Duration,
    entry_tolerance: f64,
    signals: BTreeMap<String, StoredSignal>,
}

impl SignalStore {
    /// Load the store at `path`. A missing, unreadable or corrupt file is an empty store.
    pub fn open(path: impl Into<PathBuf>, expiry: Duration, entry_tolerance: f64) -> Self {
        let path = path.into();
        let signals = load_or_quarantine(&path);
        debug!(path = %path.display(), assets = signals.len(), "signal store opened");
        Self {
            path,
            expiry,
            entry_tolerance,
            signals,
        }
    }

    /// Store with no backing file; saves are no-ops.
    pub fn in_memory(expiry: Duration, entry_tolerance: f64) -> Self {
        Self {
            path: PathBuf::new(),
            expiry,
            entry_tolerance,
            signals: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `signal` repeats the live one for its asset: same direction
    /// and setup, with an entry within the relative tolerance.
    pub fn is_duplicate(&self, signal: &Signal, now: DateTime<Utc>) -> bool {
        let Some(stored) = self.signals.get(&signal.asset) else {
            return false;
        };
        if stored.is_expired(now, self.expiry) {
            return false;
        }
        let old = &stored.signal;
        old.direction == signal.direction
            && old.setup_display() == signal.setup_display()
            && relative_diff(old.entry, signal.entry) < self.entry_tolerance
    }

    /// Replace the asset's last signal and persist.
    pub fn record(&mut self, signal: Signal, sent_at: DateTime<Utc>) -> Result<(), StoreError> {
        debug!(asset = %signal.asset, id = %signal.id(), "recording sent signal");
        self.signals
            .insert(signal.asset.clone(), StoredSignal { signal, sent_at });
        self.save()
    }

    /// Drop expired entries, persisting if anything changed. Returns how many were removed.
    pub fn cleanup_expired(&mut self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let expiry = self.expiry;
        let before = self.signals.len();
        self.signals.retain(|_, stored| !stored.is_expired(now, expiry));
        let removed = before - self.signals.len();
        if removed > 0 {
            debug!(removed, "expired signals cleaned up");
            self.save()?;
        }
        Ok(removed)
    }

    pub fn get(&self, asset: &str) -> Option<&StoredSignal> {
        self.signals.get(asset)
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the store atomically. No-op for an in-memory store.
    pub fn save(&self) -> Result<(), StoreError> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        let json = serde_json::to_string_pretty(&self.signals)?;
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(io_err)?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            io_err(e)
        })
    }
}

fn relative_diff(old: f64, new: f64) -> f64 {
    if old == 0.0 {
        return if new == 0.0 { 0.0 } else { f64::INFINITY };
    }
    ((new - old) / old).abs()
}

fn load_or_quarantine(path: &Path) -> BTreeMap<String, StoredSignal> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "signal store unreadable, starting empty");
            return BTreeMap::new();
        }
    };

    match serde_json::from_str(&text) {
        Ok(signals) => signals,
        Err(e) => {
            let quarantine = path.with_extension("json.quarantined");
            warn!(
                path = %path.display(),
                quarantine = %quarantine.display(),
                error = %e,
                "quarantining corrupt signal store"
            );
            if let Err(e) = fs::rename(path, &quarantine) {
                warn!(path = %path.display(), error = %e, "failed to quarantine signal store");
            }
            BTreeMap::new()
        }
    }
}
