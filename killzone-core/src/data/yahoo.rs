//! Yahoo Finance intraday provider.
//!
//! Fetches OHLCV candles from Yahoo's v8 chart API. Handles rate limiting,
//! retries with exponential backoff, response parsing, and the circuit breaker.
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes. CSV files are the fallback when Yahoo is unavailable.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{CandleProvider, DataError, RawCandle, Timeframe};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

/// Map a display name to Yahoo's symbol.
///
/// `EUR/USD` becomes `EURUSD=X`; `NASDAQ-100` and `Gold` map to their index
/// and futures symbols; anything else passes through trimmed.
pub fn format_ticker(ticker: &str) -> String {
    let ticker = ticker.trim();
    if let Some((base, quote)) = ticker.split_once('/') {
        return format!("{}{}=X", base.trim(), quote.trim());
    }
    match ticker {
        "NASDAQ-100" => "^NDX".to_string(),
        "Gold" => "GC=F".to_string(),
        other => other.to_string(),
    }
}

pub struct YahooProvider {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    range: String,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooProvider {
    /// `range` is Yahoo's lookback window, e.g. `1d` or `5d`.
    pub fn new(circuit_breaker: Arc<CircuitBreaker>, range: impl Into<String>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            circuit_breaker,
            range: range.into(),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    fn chart_url(symbol: &str, timeframe: Timeframe, range: &str) -> String {
        format!(
            "https://query2.finance.yahoo.com/v8/finance/chart/{symbol}\
             ?interval={timeframe}&range={range}"
        )
    }

    fn parse_response(symbol: &str, resp: ChartResponse) -> Result<Vec<RawCandle>, DataError> {
        let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
            Some(err) if err.code == "Not Found" => DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            },
            Some(err) => DataError::ResponseFormatChanged(format!("{}: {}", err.code, err.description)),
            None => DataError::ResponseFormatChanged("empty result with no error".into()),
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("result array is empty".into()))?;

        let timestamps = data
            .timestamp
            .ok_or_else(|| DataError::NoData {
                ticker: symbol.to_string(),
            })?;

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("no quote data".into()))?;

        let mut rows = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let time = chrono::DateTime::from_timestamp(ts, 0).ok_or_else(|| {
                DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
            })?;
            let row = RawCandle {
                time,
                open: quote.open.get(i).copied().flatten(),
                high: quote.high.get(i).copied().flatten(),
                low: quote.low.get(i).copied().flatten(),
                close: quote.close.get(i).copied().flatten(),
                volume: quote.volume.get(i).copied().flatten(),
            };
            // Rows with nothing at all are non-trading slots, not gaps.
            if !row.is_empty() {
                rows.push(row);
            }
        }

        if rows.is_empty() {
            return Err(DataError::NoData {
                ticker: symbol.to_string(),
            });
        }
        Ok(rows)
    }

    /// One HTTP round trip, classified for the retry loop.
    fn attempt(&self, url: &str, symbol: &str) -> Attempt {
        let resp = match self.client.get(url).send() {
            Ok(resp) => resp,
            Err(e) if e.is_connect() || e.is_timeout() => {
                return Attempt::Retry(DataError::NetworkUnreachable(e.to_string()))
            }
            Err(e) => return Attempt::Fail(DataError::NetworkUnreachable(e.to_string())),
        };

        match resp.status() {
            reqwest::StatusCode::FORBIDDEN => Attempt::Blocked,
            reqwest::StatusCode::NOT_FOUND => Attempt::Fail(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            }),
            reqwest::StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok()?.parse::<u64>().ok())
                    .unwrap_or(60);
                Attempt::Retry(DataError::RateLimited { retry_after_secs })
            }
            status if !status.is_success() => {
                Attempt::Retry(DataError::Other(format!("HTTP {status} for {symbol}")))
            }
            _ => match resp.json::<ChartResponse>() {
                Ok(chart) => Attempt::Done(chart),
                Err(e) => Attempt::Fail(DataError::ResponseFormatChanged(format!(
                    "unparseable chart for {symbol}: {e}"
                ))),
            },
        }
    }

    fn fetch_with_retry(&self, symbol: &str, timeframe: Timeframe) -> Result<Vec<RawCandle>, DataError> {
        let url = Self::chart_url(symbol, timeframe, &self.range);
        let mut delay = self.base_delay;
        let mut last_error = DataError::Other(format!("no attempts made for {symbol}"));

        for attempt in 0..=self.max_retries {
            if !self.circuit_breaker.is_allowed() {
                return Err(DataError::CircuitBreakerTripped);
            }
            if attempt > 0 {
                debug!(symbol, attempt, delay_ms = delay.as_millis() as u64, "retrying chart request");
                std::thread::sleep(delay);
                delay *= 2;
            }

            match self.attempt(&url, symbol) {
                Attempt::Done(chart) => {
                    let rows = Self::parse_response(symbol, chart)?;
                    self.circuit_breaker.record_success();
                    return Ok(rows);
                }
                Attempt::Blocked => {
                    warn!(symbol, "HTTP 403 from Yahoo, opening circuit breaker");
                    self.circuit_breaker.trip();
                    return Err(DataError::CircuitBreakerTripped);
                }
                Attempt::Retry(err) => {
                    self.circuit_breaker.record_failure();
                    warn!(symbol, attempt, error = %err, "chart request failed");
                    last_error = err;
                }
                Attempt::Fail(err) => {
                    if err.is_transient() {
                        self.circuit_breaker.record_failure();
                    }
                    return Err(err);
                }
            }
        }
        Err(last_error)
    }
}

/// Outcome of a single chart request.
enum Attempt {
    Done(ChartResponse),
    /// HTTP 403: Yahoo is blocking this client.
    Blocked,
    Retry(DataError),
    Fail(DataError),
}

impl CandleProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(&self, ticker: &str, timeframe: Timeframe) -> Result<Vec<RawCandle>, DataError> {
        self.fetch_with_retry(&format_ticker(ticker), timeframe)
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}
