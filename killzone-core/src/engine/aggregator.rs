//! The confluence aggregator: one asset, one snapshot, one decision.

use super::config::EngineConfig;
use super::confluence::Tally;
use crate::domain::{validate, Candle, DataQualityError, KillZone, Signal};
use crate::indicators::{Atr, Indicator, IndicatorValues, ATR_PERIOD};
use crate::patterns::{default_detectors, required_indicators, run_detectors, DetectorError, PatternDetector};
use crate::risk::{RiskCalculator, RiskError};
use crate::session::SessionGate;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Why an evaluation did or did not produce a signal.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    OutsideKillZone,
    /// A detector failed; the confluence set for this snapshot is empty.
    DetectorsFailed(DetectorError),
    InsufficientConfluence { count: usize },
    RiskRejected(RiskError),
    Emitted(Signal),
}

impl Decision {
    pub fn into_signal(self) -> Option<Signal> {
        match self {
            Decision::Emitted(signal) => Some(signal),
            _ => None,
        }
    }

    /// Short label for logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Decision::OutsideKillZone => "outside_kill_zone",
            Decision::DetectorsFailed(_) => "detectors_failed",
            Decision::InsufficientConfluence { .. } => "insufficient_confluence",
            Decision::RiskRejected(_) => "risk_rejected",
            Decision::Emitted(_) => "emitted",
        }
    }
}

/// Stateless signal engine. Safe to share across threads.
pub struct ConfluenceEngine {
    config: EngineConfig,
    gate: SessionGate,
    risk: RiskCalculator,
    detectors: Vec<Box<dyn PatternDetector>>,
    indicators: Vec<Box<dyn Indicator>>,
}

/// What the detectors read, plus the ATR the risk levels are sized from.
fn indicator_set(detectors: &[Box<dyn PatternDetector>]) -> Vec<Box<dyn Indicator>> {
    let mut set = required_indicators(detectors);
    let risk_key = Atr::key(ATR_PERIOD);
    if !set.iter().any(|i| i.name() == risk_key) {
        set.push(Box::new(Atr::default()));
    }
    set
}

impl ConfluenceEngine {
    pub fn new(gate: SessionGate) -> Self {
        let config = EngineConfig::default();
        let detectors = default_detectors();
        Self {
            risk: RiskCalculator::new(config.atr_multiple),
            config,
            gate,
            indicators: indicator_set(&detectors),
            detectors,
        }
    }

    /// Replace the detector set; the precomputed indicators follow it.
    pub fn with_detectors(mut self, detectors: Vec<Box<dyn PatternDetector>>) -> Self {
        self.indicators = indicator_set(&detectors);
        self.detectors = detectors;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.risk = RiskCalculator::new(config.atr_multiple);
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    /// Longest indicator warmup among the precomputed indicators.
    pub fn warmup(&self) -> usize {
        self.indicators.iter().map(|i| i.lookback()).max().unwrap_or(0)
    }

    /// Shortest series `evaluate` accepts: `min_candles`, or more when an
    /// indicator needs a longer warmup.
    pub fn required_candles(&self) -> usize {
        self.config.min_candles.max(self.warmup() + 1)
    }

    /// Evaluate `candles` for `asset` at `evaluation_time`.
    ///
    /// `Err` means the data was unusable; `Ok(None)` means no setup.
    pub fn evaluate(
        &self,
        asset: &str,
        candles: &[Candle],
        evaluation_time: DateTime<Utc>,
    ) -> Result<Option<Signal>, DataQualityError> {
        Ok(self
            .evaluate_detailed(asset, candles, evaluation_time)?
            .into_signal())
    }

    /// Like [`evaluate`](Self::evaluate), but says why nothing was emitted.
    pub fn evaluate_detailed(
        &self,
        asset: &str,
        candles: &[Candle],
        evaluation_time: DateTime<Utc>,
    ) -> Result<Decision, DataQualityError> {
        validate(candles)?;
        let need = self.required_candles();
        if candles.len() < need {
            return Err(DataQualityError::InsufficientCandles {
                got: candles.len(),
                need,
            });
        }

        // Sampled once: the same zone gates and labels.
        let Some(zone) = self.gate.active_zone(evaluation_time) else {
            debug!(asset, %evaluation_time, "session gate closed");
            return Ok(Decision::OutsideKillZone);
        };

        let refs: Vec<&dyn Indicator> = self.indicators.iter().map(|i| i.as_ref()).collect();
        let indicators = IndicatorValues::precompute(candles, &refs);
        let patterns = match run_detectors(&self.detectors, candles, &indicators) {
            Ok(patterns) => patterns,
            Err(err) => {
                warn!(asset, error = %err, "detector failed; no confluences this cycle");
                return Ok(Decision::DetectorsFailed(err));
            }
        };

        let last = candles[candles.len() - 1];
        let tally = Tally::from_patterns(&patterns, last.time, &self.config);
        debug!(
            asset,
            count = tally.count(),
            bullish = tally.bullish,
            bearish = tally.bearish,
            "confluences tallied"
        );
        if tally.count() < self.config.min_confluences {
            return Ok(Decision::InsufficientConfluence {
                count: tally.count(),
            });
        }

        let direction = tally.direction();
        let last_atr = indicators
            .get_series(&Atr::key(ATR_PERIOD))
            .and_then(|s| s.last().copied())
            .unwrap_or(f64::NAN);
        let levels = match self.risk.levels(direction, last.close, last_atr) {
            Ok(levels) => levels,
            Err(err) => {
                warn!(asset, error = %err, "risk calculation rejected the signal");
                return Ok(Decision::RiskRejected(err));
            }
        };

        let signal = self.assemble(asset, zone, &tally, levels, evaluation_time, last.time);
        info!(
            asset,
            direction = %signal.direction,
            entry = signal.entry,
            setup = %signal.setup_display(),
            kill_zone = %signal.kill_zone,
            "signal emitted"
        );
        Ok(Decision::Emitted(signal))
    }

    fn assemble(
        &self,
        asset: &str,
        kill_zone: KillZone,
        tally: &Tally,
        levels: crate::risk::RiskLevels,
        evaluated_at: DateTime<Utc>,
        candle_time: DateTime<Utc>,
    ) -> Signal {
        Signal {
            asset: asset.to_string(),
            direction: tally.direction(),
            entry: self.config.round_price(levels.entry),
            stop_loss: self.config.round_price(levels.stop_loss),
            take_profit: self.config.round_price(levels.take_profit),
            kill_zone,
            setup: tally.setup(),
            risk_pct: levels.risk_pct,
            confidence: tally.confidence(),
            evaluated_at,
            candle_time,
        }
    }
}

impl Default for ConfluenceEngine {
    fn default() -> Self {
        Self::new(SessionGate::default())
    }
}

impl std::fmt::Debug for ConfluenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.detectors.iter().map(|d| d.name()).collect();
        let indicators: Vec<&str> = self.indicators.iter().map(|i| i.name()).collect();
        f.debug_struct("ConfluenceEngine")
            .field("config", &self.config)
            .field("gate", &self.gate)
            .field("detectors", &names)
            .field("indicators", &indicators)
            .finish()
    }
}
