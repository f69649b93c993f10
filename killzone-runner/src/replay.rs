//! Replay harness: walk a historical series bar by bar through the engine.
//!
//! Each step evaluates the window ending at bar `i` with that bar's time as
//! the evaluation instant, so the kill-zone gate follows the data rather
//! than the wall clock. This is not a backtester: no fills, no P&L.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use killzone_core::domain::validate;
use killzone_core::{Candle, ConfluenceEngine, DataQualityError, Decision, Signal};
use rayon::prelude::*;
use tracing::info;

/// A signal emitted during replay, with the bar that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySignal {
    pub bar_index: usize,
    pub bar_time: DateTime<Utc>,
    pub signal: Signal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    pub asset: String,
    pub bars: usize,
    pub evaluations: usize,
    /// Count of decisions by label.
    pub decisions: BTreeMap<&'static str, usize>,
    pub signals: Vec<ReplaySignal>,
}

/// Replay `candles` for `asset`. Windows start at the engine's required candle count.
pub fn replay(
    engine: &ConfluenceEngine,
    asset: &str,
    candles: &[Candle],
) -> Result<ReplayReport, DataQualityError> {
    validate(candles)?;
    let min = engine.required_candles();
    if candles.len() < min {
        return Err(DataQualityError::InsufficientCandles {
            got: candles.len(),
            need: min,
        });
    }

    let first = min.saturating_sub(1);
    let decisions: Vec<(usize, Decision)> = (first..candles.len())
        .into_par_iter()
        .map(|end| {
            let window = &candles[..=end];
            let at = window[end].time;
            engine
                .evaluate_detailed(asset, window, at)
                .map(|decision| (end, decision))
        })
        .collect::<Result<_, _>>()?;

    let mut counts = BTreeMap::new();
    let mut signals = Vec::new();
    for (end, decision) in decisions {
        *counts.entry(decision.label()).or_insert(0) += 1;
        if let Decision::Emitted(signal) = decision {
            signals.push(ReplaySignal {
                bar_index: end,
                bar_time: candles[end].time,
                signal,
            });
        }
    }

    let evaluations = candles.len() - first;
    info!(asset, bars = candles.len(), evaluations, signals = signals.len(), "replay complete");
    Ok(ReplayReport {
        asset: asset.to_string(),
        bars: candles.len(),
        evaluations,
        decisions: counts,
        signals,
    })
}

/// Replay signals as CSV.
///
/// Columns: id, bar_index, bar_time, asset, direction, entry, stop_loss,
/// take_profit, kill_zone, setup, risk_pct, confidence
pub fn export_signals_csv(signals: &[ReplaySignal]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "id",
        "bar_index",
        "bar_time",
        "asset",
        "direction",
        "entry",
        "stop_loss",
        "take_profit",
        "kill_zone",
        "setup",
        "risk_pct",
        "confidence",
    ])?;

    for s in signals {
        let sig = &s.signal;
        wtr.write_record([
            &sig.id(),
            &s.bar_index.to_string(),
            &s.bar_time.to_rfc3339(),
            &sig.asset,
            &sig.direction.to_string(),
            &format!("{:.5}", sig.entry),
            &format!("{:.5}", sig.stop_loss),
            &format!("{:.5}", sig.take_profit),
            &sig.kill_zone.to_string(),
            &sig.setup_display(),
            &format!("{:.2}", sig.risk_pct),
            &sig.confidence.to_string(),
        ])?;
    }

    let bytes = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

pub fn write_signals_csv(path: &Path, signals: &[ReplaySignal]) -> Result<()> {
    let text = export_signals_csv(signals)?;
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}
