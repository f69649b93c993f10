//! Candle acquisition: providers and the ingestion rules they share.

pub mod circuit_breaker;
pub mod csv_file;
pub mod ingest;
pub mod provider;
pub mod synthetic;
pub mod yahoo;

pub use circuit_breaker::CircuitBreaker;
pub use csv_file::{read_candles, read_candles_csv, write_candles, write_candles_csv, CsvProvider};
pub use ingest::{ingest, MAX_FILL, MIN_CANDLES};
pub use provider::{CandleProvider, DataError, DataSource, RawCandle, Timeframe, UnknownTimeframe};
pub use synthetic::SyntheticProvider;
pub use yahoo::{format_ticker, YahooProvider};
