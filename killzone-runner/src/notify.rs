//! Signal delivery: message formatting and notifier backends.

use chrono::{DateTime, FixedOffset, Utc};
use killzone_core::{Direction, Signal};
use serde_json::json;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Telegram rejects longer messages.
pub const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("notifier rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("failed to send message after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("notifier unavailable: {0}")]
    Unavailable(String),
}

/// Delivery channel for emitted signals.
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one signal. `now` stamps the message.
    fn send(&self, signal: &Signal, now: DateTime<Utc>) -> Result<(), NotifyError>;
}

impl<N: Notifier + ?Sized> Notifier for std::sync::Arc<N> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn send(&self, signal: &Signal, now: DateTime<Utc>) -> Result<(), NotifyError> {
        (**self).send(signal, now)
    }
}

/// Decimal places for prices: five for currency pairs, two otherwise.
pub fn price_precision(asset: &str) -> usize {
    if asset.contains('/') {
        5
    } else {
        2
    }
}

/// `EST` for the default zone, `UTC±hh:mm` otherwise.
fn zone_label(offset: FixedOffset) -> String {
    let secs = offset.local_minus_utc();
    if secs == -5 * 3600 {
        return "EST".into();
    }
    let sign = if secs < 0 { '-' } else { '+' };
    let secs = secs.abs();
    format!("UTC{sign}{:02}:{:02}", secs / 3600, (secs % 3600) / 60)
}

/// Markdown message for one signal, timestamped in the reference zone.
pub fn format_signal_message(signal: &Signal, offset: FixedOffset, now: DateTime<Utc>) -> String {
    let p = price_precision(&signal.asset);
    let emoji = match signal.direction {
        Direction::Buy => "🟢",
        Direction::Sell => "🔴",
    };
    let risk = signal.risk_distance();
    let reward = signal.reward_distance();
    let ratio = if risk > 0.0 {
        format!("1:{:.1}", reward / risk)
    } else {
        "n/a".to_string()
    };
    let local = now.with_timezone(&offset);

    format!(
        "*{emoji} NEW ICT SIGNAL*\n\
         \n\
         *Asset:* {asset}\n\
         *Direction:* {direction}\n\
         *Entry:* {entry:.p$}\n\
         *Stop Loss:* {sl:.p$} ({risk:.p$} pips)\n\
         *Take Profit:* {tp:.p$} ({reward:.p$} pips)\n\
         *R:R Ratio:* {ratio}\n\
         \n\
         *Kill Zone:* {zone}\n\
         *Setup:* {setup}\n\
         *Risk:* {risk_pct}\n\
         *Confidence:* {confidence} confluences\n\
         \n\
         *Time:* {time} {label}\n",
        asset = signal.asset,
        direction = signal.direction,
        entry = signal.entry,
        sl = signal.stop_loss,
        tp = signal.take_profit,
        zone = signal.kill_zone,
        setup = signal.setup_display(),
        risk_pct = signal.risk_display(),
        confidence = signal.confidence,
        time = local.format("%Y-%m-%d %H:%M:%S"),
        label = zone_label(offset),
    )
}

/// Cut to [`MAX_MESSAGE_CHARS`] characters, ending in `...` when cut.
pub fn truncate_message(message: &str) -> String {
    if message.chars().count() <= MAX_MESSAGE_CHARS {
        return message.to_string();
    }
    warn!("message too long, truncating to {MAX_MESSAGE_CHARS} characters");
    let mut out: String = message.chars().take(MAX_MESSAGE_CHARS - 3).collect();
    out.push_str("...");
    out
}

/// Prints messages to stdout.
#[derive(Debug, Clone)]
pub struct StdoutNotifier {
    offset: FixedOffset,
}

impl StdoutNotifier {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Notifier for StdoutNotifier {
    fn name(&self) -> &str {
        "stdout"
    }

    fn send(&self, signal: &Signal, now: DateTime<Utc>) -> Result<(), NotifyError> {
        println!("{}", format_signal_message(signal, self.offset, now));
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub min_interval: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(1),
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// Posts Markdown messages through the Telegram Bot API.
///
/// Messages are spaced by at least `min_interval`; a failed post is retried
/// after a fixed `retry_delay`, up to `max_retries` attempts in total.
pub struct TelegramNotifier {
    client: reqwest::blocking::Client,
    base_url: String,
    chat_id: String,
    offset: FixedOffset,
    settings: TelegramSettings,
    last_sent: Mutex<Option<Instant>>,
}

impl TelegramNotifier {
    pub fn new(
        token: &str,
        chat_id: impl Into<String>,
        offset: FixedOffset,
        settings: TelegramSettings,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: format!("https://api.telegram.org/bot{token}"),
            chat_id: chat_id.into(),
            offset,
            settings,
            last_sent: Mutex::new(None),
        })
    }

    /// Point at a different API host (used against local test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn wait_for_slot(&self) {
        let last = *self.last_sent.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(last) = last {
            let elapsed = last.elapsed();
            if elapsed < self.settings.min_interval {
                std::thread::sleep(self.settings.min_interval - elapsed);
            }
        }
    }

    fn post_once(&self, text: &str) -> Result<(), NotifyError> {
        self.wait_for_slot();
        let payload = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        let response = self
            .client
            .post(format!("{}/sendMessage", self.base_url))
            .json(&payload)
            .send()?;
        *self.last_sent.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    /// Send raw Markdown text with rate limiting and retries.
    pub fn send_text(&self, message: &str) -> Result<(), NotifyError> {
        let text = truncate_message(message);
        let attempts = self.settings.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.post_once(&text) {
                Ok(()) => {
                    info!("telegram message sent");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "telegram send failed");
                    last_error = e.to_string();
                    if attempt < attempts {
                        std::thread::sleep(self.settings.retry_delay);
                    }
                }
            }
        }
        Err(NotifyError::RetriesExhausted {
            attempts,
            last: last_error,
        })
    }
}

impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    fn send(&self, signal: &Signal, now: DateTime<Utc>) -> Result<(), NotifyError> {
        self.send_text(&format_signal_message(signal, self.offset, now))
    }
}

/// Collects signals in memory. Can be switched to fail every send.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Signal>>,
    failing: std::sync::atomic::AtomicBool,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Signal> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Notifier for MemoryNotifier {
    fn name(&self) -> &str {
        "memory"
    }

    fn send(&self, signal: &Signal, _now: DateTime<Utc>) -> Result<(), NotifyError> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(NotifyError::Unavailable("memory notifier set to fail".into()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(signal.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use killzone_core::domain::Confidence;
    use killzone_core::KillZone;

    fn est() -> FixedOffset {
        FixedOffset::west_opt(5 * 3600).unwrap()
    }

    fn sample(asset: &str, direction: Direction, entry: f64, sl: f64, tp: f64) -> Signal {
        let at = Utc.with_ymd_and_hms(2024, 3, 4, 14, 0, 0).unwrap();
        Signal {
            asset: asset.into(),
            direction,
            entry,
            stop_loss: sl,
            take_profit: tp,
            kill_zone: KillZone::NewYork,
            setup: ["FVG_bullish", "OB_bullish", "BOS_bullish"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            risk_pct: 0.18,
            confidence: Confidence {
                agreeing: 3,
                total: 4,
            },
            evaluated_at: at,
            candle_time: at,
        }
    }

    #[test]
    fn forex_message_layout() {
        let signal = sample("EUR/USD", Direction::Buy, 1.085, 1.083, 1.088);
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 14, 5, 0).unwrap();
        let msg = format_signal_message(&signal, est(), now);

        assert!(msg.starts_with("*🟢 NEW ICT SIGNAL*\n"));
        assert!(msg.contains("*Asset:* EUR/USD\n"));
        assert!(msg.contains("*Direction:* BUY\n"));
        assert!(msg.contains("*Entry:* 1.08500\n"));
        assert!(msg.contains("*Stop Loss:* 1.08300 (0.00200 pips)\n"));
        assert!(msg.contains("*Take Profit:* 1.08800 (0.00300 pips)\n"));
        assert!(msg.contains("*R:R Ratio:* 1:1.5\n"));
        assert!(msg.contains("*Kill Zone:* New York\n"));
        assert!(msg.contains("*Setup:* BOS_bullish + FVG_bullish + OB_bullish\n"));
        assert!(msg.contains("*Risk:* 0.2%\n"));
        assert!(msg.contains("*Confidence:* 3/4 confluences\n"));
        assert!(msg.contains("*Time:* 2024-03-04 09:05:00 EST\n"));
    }

    #[test]
    fn non_pair_uses_two_decimals_and_red_emoji() {
        let signal = sample("Gold", Direction::Sell, 2050.0, 2060.0, 2035.0);
        let msg = format_signal_message(&signal, est(), signal.evaluated_at);
        assert!(msg.starts_with("*🔴 NEW ICT SIGNAL*"));
        assert!(msg.contains("*Entry:* 2050.00\n"));
        assert!(msg.contains("*Stop Loss:* 2060.00 (10.00 pips)\n"));
    }

    #[test]
    fn other_offsets_are_labelled() {
        let signal = sample("Gold", Direction::Sell, 2050.0, 2060.0, 2035.0);
        let utc = FixedOffset::east_opt(0).unwrap();
        let msg = format_signal_message(&signal, utc, signal.evaluated_at);
        assert!(msg.contains("*Time:* 2024-03-04 14:00:00 UTC+00:00\n"));
    }

    #[test]
    fn long_messages_are_truncated() {
        let short = "hello";
        assert_eq!(truncate_message(short), short);

        let long = "é".repeat(5000);
        let cut = truncate_message(&long);
        assert_eq!(cut.chars().count(), MAX_MESSAGE_CHARS);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn memory_notifier_collects_and_fails_on_demand() {
        let notifier = MemoryNotifier::new();
        let signal = sample("EUR/USD", Direction::Buy, 1.085, 1.083, 1.088);
        notifier.send(&signal, signal.evaluated_at).unwrap();
        assert_eq!(notifier.sent().len(), 1);

        notifier.set_failing(true);
        assert!(notifier.send(&signal, signal.evaluated_at).is_err());
        assert_eq!(notifier.sent().len(), 1);
    }

    #[test]
    fn telegram_gives_up_after_retries() {
        let settings = TelegramSettings {
            min_interval: Duration::ZERO,
            max_retries: 2,
            retry_delay: Duration::ZERO,
        };
        // Port 9 on localhost refuses connections.
        let notifier = TelegramNotifier::new("token", "chat", est(), settings)
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        match notifier.send_text("ping") {
            Err(NotifyError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }
}
