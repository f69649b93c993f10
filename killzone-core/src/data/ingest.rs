//! Raw-row ingestion: ordering, gap filling and validation.
//!
//! Every provider's output passes through [`ingest`] before reaching the
//! engine, so CSV files, Yahoo responses and synthetic data obey one rulebook.

use super::provider::{DataError, RawCandle};
use crate::domain::{Candle, CandleSeries};
use chrono::{DateTime, Utc};

/// Longest run of consecutive missing values that gets forward-filled.
pub const MAX_FILL: usize = 2;

/// Minimum candles for the engine to evaluate.
pub const MIN_CANDLES: usize = 50;

/// Turn raw rows into a validated [`CandleSeries`].
///
/// Rows are sorted by time. Each column is forward-filled across at most
/// [`MAX_FILL`] consecutive gaps; a longer run, or a gap in the first row,
/// rejects the whole series. Duplicate timestamps, timestamps after `now`,
/// non-positive prices and broken OHLC relationships are rejected too.
pub fn ingest(
    mut raw: Vec<RawCandle>,
    now: DateTime<Utc>,
    min_candles: usize,
) -> Result<CandleSeries, DataError> {
    if raw.len() < min_candles {
        return Err(DataError::InsufficientData {
            got: raw.len(),
            need: min_candles,
        });
    }

    raw.sort_by_key(|r| r.time);
    if let Some(pair) = raw.windows(2).find(|w| w[0].time == w[1].time) {
        return Err(DataError::DuplicateTimestamp { time: pair[1].time });
    }

    let opens = fill_column("open", raw.iter().map(|r| r.open))?;
    let highs = fill_column("high", raw.iter().map(|r| r.high))?;
    let lows = fill_column("low", raw.iter().map(|r| r.low))?;
    let closes = fill_column("close", raw.iter().map(|r| r.close))?;
    let volumes = fill_column("volume", raw.iter().map(|r| r.volume))?;

    let mut candles = Vec::with_capacity(raw.len());
    for (i, row) in raw.iter().enumerate() {
        let candle = Candle {
            time: row.time,
            open: opens[i],
            high: highs[i],
            low: lows[i],
            close: closes[i],
            volume: volumes[i],
        };
        if candle.open <= 0.0 || candle.high <= 0.0 || candle.low <= 0.0 || candle.close <= 0.0 {
            return Err(DataError::InvalidPrice { time: candle.time });
        }
        if !has_valid_ohlc(&candle) {
            return Err(DataError::InvalidOhlc { time: candle.time });
        }
        candles.push(candle);
    }

    if let Some(last) = candles.last() {
        if last.time > now {
            return Err(DataError::FutureTimestamp { time: last.time });
        }
    }

    Ok(CandleSeries::new(candles)?)
}

fn has_valid_ohlc(c: &Candle) -> bool {
    c.high >= c.low && c.high >= c.open && c.high >= c.close && c.low <= c.open && c.low <= c.close
}

fn fill_column(
    column: &'static str,
    values: impl Iterator<Item = Option<f64>>,
) -> Result<Vec<f64>, DataError> {
    let mut filled = Vec::new();
    let mut last: Option<f64> = None;
    let mut gap = 0usize;

    for (index, value) in values.enumerate() {
        match value.filter(|v| v.is_finite()) {
            Some(v) => {
                last = Some(v);
                gap = 0;
                filled.push(v);
            }
            None => {
                gap += 1;
                match last {
                    Some(v) if gap <= MAX_FILL => filled.push(v),
                    _ => return Err(DataError::MissingValues { column, index }),
                }
            }
        }
    }

    Ok(filled)
}
