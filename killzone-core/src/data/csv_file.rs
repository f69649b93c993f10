//! CSV candle files.
//!
//! Layout: header `time,open,high,low,close,volume`, one row per candle.
//! `time` is RFC 3339 or unix seconds; an empty cell is a missing value.

use super::provider::{CandleProvider, DataError, RawCandle, Timeframe};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct CsvRow {
    time: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
}

/// Parse an RFC 3339 timestamp or integer unix seconds.
pub fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0);
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Read every row of a candle CSV file.
pub fn read_candles_csv(path: &Path) -> Result<Vec<RawCandle>, DataError> {
    let file = std::fs::File::open(path)?;
    read_candles(file, &path.display().to_string())
}

/// Read candle rows from any reader; `origin` labels errors.
pub fn read_candles<R: std::io::Read>(reader: R, origin: &str) -> Result<Vec<RawCandle>, DataError> {
    let csv_err = |message: String| DataError::Csv {
        path: origin.to_string(),
        message,
    };

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (line, record) in rdr.deserialize::<CsvRow>().enumerate() {
        let row = record.map_err(|e| csv_err(e.to_string()))?;
        let time = parse_time(&row.time)
            .ok_or_else(|| csv_err(format!("row {}: bad timestamp '{}'", line + 1, row.time)))?;
        rows.push(RawCandle {
            time,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }
    Ok(rows)
}

/// Write candles in the same layout `read_candles` accepts.
pub fn write_candles<W: std::io::Write>(
    writer: W,
    candles: &[crate::domain::Candle],
) -> Result<(), DataError> {
    let mut wtr = csv::Writer::from_writer(writer);
    let to_err = |e: csv::Error| DataError::Csv {
        path: "<writer>".into(),
        message: e.to_string(),
    };
    wtr.write_record(["time", "open", "high", "low", "close", "volume"])
        .map_err(to_err)?;
    for c in candles {
        wtr.write_record([
            c.time.to_rfc3339(),
            c.open.to_string(),
            c.high.to_string(),
            c.low.to_string(),
            c.close.to_string(),
            c.volume.to_string(),
        ])
        .map_err(to_err)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write candles to a file, creating parent directories.
pub fn write_candles_csv(path: &Path, candles: &[crate::domain::Candle]) -> Result<(), DataError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    write_candles(std::io::BufWriter::new(file), candles).map_err(|e| match e {
        DataError::Csv { message, .. } => DataError::Csv {
            path: path.display().to_string(),
            message,
        },
        other => other,
    })
}

/// File name for a ticker: anything outside `[A-Za-z0-9._-]` becomes `_`.
pub fn sanitize_ticker(ticker: &str) -> String {
    ticker
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Serves `<dir>/<sanitized ticker>.csv` regardless of timeframe.
#[derive(Debug, Clone)]
pub struct CsvProvider {
    dir: PathBuf,
}

impl CsvProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", sanitize_ticker(ticker)))
    }
}

impl CandleProvider for CsvProvider {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(&self, ticker: &str, _timeframe: Timeframe) -> Result<Vec<RawCandle>, DataError> {
        let path = self.path_for(ticker);
        if !path.exists() {
            return Err(DataError::SymbolNotFound {
                symbol: ticker.to_string(),
            });
        }
        let rows = read_candles_csv(&path)?;
        if rows.is_empty() {
            return Err(DataError::NoData {
                ticker: ticker.to_string(),
            });
        }
        Ok(rows)
    }

    fn is_available(&self) -> bool {
        self.dir.is_dir()
    }
}
