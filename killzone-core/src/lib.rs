//! Killzone Core: candle domain, structure detectors, session gate, confluence engine.
//!
//! This crate contains the signal engine and the boundary it reads from:
//! - Domain types (candles, validated series, signals)
//! - Precomputed indicators (ATR, rolling volume)
//! - Five independent structure detectors (pools, gaps, order blocks, BOS, CHoCH)
//! - Session gate over fixed kill-zone windows
//! - Confluence aggregator and ATR-based risk levels
//! - Candle providers (CSV, Yahoo, synthetic) and the ingestion rules they share

pub mod clock;
pub mod data;
pub mod domain;
pub mod engine;
pub mod indicators;
pub mod patterns;
pub mod risk;
pub mod session;

pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::{Candle, CandleSeries, DataQualityError, Direction, KillZone, Signal};
pub use engine::{evaluate, ConfluenceEngine, Decision, EngineConfig};
pub use patterns::{analyze, PatternEvent, PatternSet};
pub use risk::{RiskCalculator, RiskError};
pub use session::SessionGate;
