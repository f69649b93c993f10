//! Market-hours filter applied before an asset is fetched.

use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Minute-of-day bounds for cash-session assets, inclusive on both ends.
const CASH_OPEN_MINUTE: u32 = 9 * 60 + 30;
const CASH_CLOSE_MINUTE: u32 = 16 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    /// Trades around the clock.
    Forex,
    /// Trades around the clock.
    Crypto,
    /// 09:30 to 16:00 reference time.
    Equity,
    /// Same cash-session window as equities.
    Futures,
}

impl MarketKind {
    /// Guess the market from a ticker: `/` pairs are forex, `-USD` pairs are crypto.
    pub fn infer(ticker: &str) -> Self {
        if ticker.contains('/') || ticker.ends_with("=X") {
            MarketKind::Forex
        } else if ticker.ends_with("-USD") {
            MarketKind::Crypto
        } else if ticker.ends_with("=F") {
            MarketKind::Futures
        } else {
            MarketKind::Equity
        }
    }

    pub fn is_always_open(self) -> bool {
        matches!(self, MarketKind::Forex | MarketKind::Crypto)
    }

    /// Whether the market trades at `at`, read in the `offset` zone.
    pub fn is_open(self, at: DateTime<Utc>, offset: FixedOffset) -> bool {
        if self.is_always_open() {
            return true;
        }
        let local = at.with_timezone(&offset);
        let minute = local.hour() * 60 + local.minute();
        (CASH_OPEN_MINUTE..=CASH_CLOSE_MINUTE).contains(&minute)
    }
}
