//! Session gate: kill-zone windows in a single fixed reference zone.
//!
//! The gate looks only at the time of day of the instant it is given. It
//! holds no state, so calling it twice with the same instant always agrees.

use crate::domain::KillZone;
use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Offset of the reference zone (EST, no daylight saving).
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = -5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("utc offset {0}h is out of range")]
    InvalidOffset(i32),
}

/// Half-open window `[start, end)` in minutes after local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub zone: KillZone,
    pub start_minute: u32,
    pub end_minute: u32,
}

impl SessionWindow {
    pub const LONDON: SessionWindow = SessionWindow {
        zone: KillZone::London,
        start_minute: 2 * 60,
        end_minute: 5 * 60,
    };

    pub const NEW_YORK: SessionWindow = SessionWindow {
        zone: KillZone::NewYork,
        start_minute: 8 * 60 + 30,
        end_minute: 11 * 60 + 30,
    };

    pub fn contains(&self, minute_of_day: u32) -> bool {
        minute_of_day >= self.start_minute && minute_of_day < self.end_minute
    }
}

#[derive(Debug, Clone)]
pub struct SessionGate {
    offset: FixedOffset,
    windows: Vec<SessionWindow>,
}

impl SessionGate {
    /// Gate with the London and New York windows in the given zone.
    pub fn with_offset(offset: FixedOffset) -> Self {
        Self {
            offset,
            windows: vec![SessionWindow::LONDON, SessionWindow::NEW_YORK],
        }
    }

    pub fn from_utc_offset_hours(hours: i32) -> Result<Self, SessionError> {
        let offset = hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or(SessionError::InvalidOffset(hours))?;
        Ok(Self::with_offset(offset))
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn windows(&self) -> &[SessionWindow] {
        &self.windows
    }

    /// Kill zone active at `at`, if any.
    pub fn active_zone(&self, at: DateTime<Utc>) -> Option<KillZone> {
        let local = at.with_timezone(&self.offset);
        let minute = local.hour() * 60 + local.minute();
        self.windows
            .iter()
            .find(|w| w.contains(minute))
            .map(|w| w.zone)
    }

    pub fn is_open(&self, at: DateTime<Utc>) -> bool {
        self.active_zone(at).is_some()
    }
}

impl Default for SessionGate {
    fn default() -> Self {
        Self::from_utc_offset_hours(DEFAULT_UTC_OFFSET_HOURS)
            .unwrap_or_else(|_| Self::with_offset(Utc.fix()))
    }
}
