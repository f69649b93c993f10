//! Killzone CLI: evaluate, replay, run, check and demo commands.
//!
//! Commands:
//! - `evaluate`: one evaluation of a CSV series at a given instant
//! - `replay`: walk a CSV series bar by bar and list emitted signals
//! - `run`: start the polling bot from a TOML config
//! - `check`: deployment check for a config (parse, store, secrets)
//! - `demo`: synthetic series through the engine, no network

use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use clap::{Parser, Subcommand};
use killzone_core::data::{ingest, read_candles_csv, synthetic, write_candles_csv, Timeframe};
use killzone_core::patterns::{analyze, PatternKind};
use killzone_core::session::{SessionGate, DEFAULT_UTC_OFFSET_HOURS};
use killzone_core::{ConfluenceEngine, Decision, Signal};
use killzone_runner::{
    format_signal_message, logging, replay, write_signals_csv, BotConfig, NotifierKind,
    ReplayReport, SignalBot, SignalStore,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "killzone", about = "Killzone CLI: ICT confluence signals in session kill zones")]
struct Cli {
    /// Default log level when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a CSV series once.
    Evaluate {
        /// CSV with header time,open,high,low,close,volume.
        #[arg(long)]
        csv: PathBuf,

        /// Asset name used in the signal (e.g., EUR/USD).
        #[arg(long)]
        asset: String,

        /// Evaluation instant (RFC 3339). Defaults to now.
        #[arg(long)]
        at: Option<String>,

        /// Reference zone offset from UTC in hours.
        #[arg(long, default_value_t = DEFAULT_UTC_OFFSET_HOURS, allow_hyphen_values = true)]
        utc_offset: i32,

        /// Print the signal as JSON instead of the message layout.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Replay a CSV series bar by bar.
    Replay {
        #[arg(long)]
        csv: PathBuf,

        #[arg(long)]
        asset: String,

        /// Write emitted signals as CSV.
        #[arg(long)]
        out: Option<PathBuf>,

        #[arg(long, default_value_t = DEFAULT_UTC_OFFSET_HOURS, allow_hyphen_values = true)]
        utc_offset: i32,
    },
    /// Start the polling bot.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Run a single cycle and exit.
        #[arg(long, default_value_t = false)]
        once: bool,

        /// Stop after this many cycles.
        #[arg(long)]
        max_cycles: Option<u64>,
    },
    /// Check that a deployment is ready to run.
    Check {
        #[arg(long)]
        config: PathBuf,
    },
    /// Run the engine over synthetic candles.
    Demo {
        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long, default_value_t = 600, value_parser = clap::value_parser!(u32).range(50..=100_000))]
        candles: u32,

        /// Also write the synthetic candles as CSV, readable by `replay` and the csv source.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    match cli.command {
        Commands::Evaluate {
            csv,
            asset,
            at,
            utc_offset,
            json,
        } => run_evaluate(&csv, &asset, at.as_deref(), utc_offset, json),
        Commands::Replay {
            csv,
            asset,
            out,
            utc_offset,
        } => run_replay(&csv, &asset, out.as_deref(), utc_offset),
        Commands::Run {
            config,
            once,
            max_cycles,
        } => run_bot(&config, if once { Some(1) } else { max_cycles }),
        Commands::Check { config } => run_check(&config),
        Commands::Demo { seed, candles, out } => run_demo(seed, candles, out.as_deref()),
    }
}

fn engine_for(utc_offset: i32) -> Result<ConfluenceEngine> {
    let gate = SessionGate::from_utc_offset_hours(utc_offset)?;
    Ok(ConfluenceEngine::new(gate))
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid --at '{s}', expected RFC 3339"))?
        .with_timezone(&Utc))
}

fn print_signal(signal: &Signal, offset: FixedOffset, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(signal)?);
    } else {
        println!("{}", format_signal_message(signal, offset, signal.evaluated_at));
    }
    Ok(())
}

fn run_evaluate(csv: &Path, asset: &str, at: Option<&str>, utc_offset: i32, json: bool) -> Result<()> {
    let engine = engine_for(utc_offset)?;
    let at = match at {
        Some(s) => parse_instant(s)?,
        None => Utc::now(),
    };

    let raw = read_candles_csv(csv)?;
    let series = ingest(raw, at, engine.required_candles())?;
    println!(
        "{asset}: {} candles, {} to {}",
        series.len(),
        series.first().time,
        series.last().time
    );

    match engine.evaluate_detailed(asset, series.as_slice(), at)? {
        Decision::Emitted(signal) => print_signal(&signal, engine.gate().offset(), json)?,
        Decision::InsufficientConfluence { count } => {
            println!("No signal: {count} confluence(s), need {}", engine.config().min_confluences)
        }
        Decision::RiskRejected(e) => println!("No signal: risk levels rejected ({e})"),
        Decision::DetectorsFailed(e) => println!("No signal: detector failed ({e})"),
        Decision::OutsideKillZone => println!("No signal: {at} is outside both kill zones"),
    }
    Ok(())
}

fn print_replay(report: &ReplayReport) {
    println!(
        "{}: {} bars, {} evaluations, {} signals",
        report.asset,
        report.bars,
        report.evaluations,
        report.signals.len()
    );
    for (label, count) in &report.decisions {
        println!("  {label:<24} {count}");
    }
    for s in &report.signals {
        let sig = &s.signal;
        println!(
            "  [{:>5}] {} {} {:<4} entry {:.5} sl {:.5} tp {:.5}  {}",
            s.bar_index,
            s.bar_time.format("%Y-%m-%d %H:%M"),
            sig.kill_zone,
            sig.direction.to_string(),
            sig.entry,
            sig.stop_loss,
            sig.take_profit,
            sig.setup_display()
        );
    }
}

fn run_replay(csv: &Path, asset: &str, out: Option<&Path>, utc_offset: i32) -> Result<()> {
    let engine = engine_for(utc_offset)?;
    let raw = read_candles_csv(csv)?;
    let last = raw.iter().map(|c| c.time).max().unwrap_or_else(Utc::now);
    let series = ingest(raw, last, engine.required_candles())?;

    let report = replay(&engine, asset, series.as_slice())?;
    print_replay(&report);

    if let Some(out) = out {
        write_signals_csv(out, &report.signals)?;
        println!("Signals written to {}", out.display());
    }
    Ok(())
}

fn run_bot(config_path: &Path, max_cycles: Option<u64>) -> Result<()> {
    let config = BotConfig::from_file(config_path)?;
    info!(config = %config_path.display(), ?max_cycles, "starting signal bot");
    let mut bot = SignalBot::from_config(config)?;
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        info!("shutdown requested, stopping after the current cycle");
        flag.store(true, Ordering::SeqCst);
    })
    .context("failed to install the shutdown handler")?;
    let summary = bot.run(&shutdown, max_cycles)?;
    println!(
        "Stopped after {} cycle(s): {} signal(s) sent, {} failed cycle(s)",
        summary.cycles, summary.signals_sent, summary.failed_cycles
    );
    Ok(())
}

/// Deployment check: every item is reported; any failure fails the command.
fn run_check(config_path: &Path) -> Result<()> {
    let mut failed = 0usize;
    let mut report = |ok: bool, what: String| {
        if ok {
            println!("✓ {what}");
        } else {
            println!("✗ {what}");
            failed += 1;
        }
    };

    let config = match BotConfig::from_file(config_path) {
        Ok(config) => {
            report(true, format!("config {} parses and validates", config_path.display()));
            config
        }
        Err(e) => {
            report(false, format!("config {}: {e}", config_path.display()));
            bail!("deployment check failed");
        }
    };
    report(true, format!("{} asset(s) configured", config.assets.len()));

    let store = SignalStore::open(
        &config.store.path,
        config.store.expiry(),
        config.store.entry_tolerance,
    );
    let writable = store.save().map_err(|e| e.to_string());
    report(
        writable.is_ok(),
        format!(
            "signal store {} writable{}",
            config.store.path.display(),
            writable.err().map(|e| format!(": {e}")).unwrap_or_default()
        ),
    );

    if config.notifier.kind == NotifierKind::Telegram {
        match config.notifier.telegram_credentials() {
            Ok(_) => report(
                true,
                format!(
                    "telegram credentials present ({}, {})",
                    config.notifier.token_env, config.notifier.chat_id_env
                ),
            ),
            Err(e) => report(false, e.to_string()),
        }
    } else {
        report(true, "stdout notifier needs no credentials".to_string());
    }

    if failed > 0 {
        bail!("deployment check failed: {failed} problem(s)");
    }
    println!("All checks passed");
    Ok(())
}

fn run_demo(seed: u64, candles: u32, out: Option<&Path>) -> Result<()> {
    let candles = usize::try_from(candles)?;
    let engine = ConfluenceEngine::default();
    let offset = engine.gate().offset();

    // End the series at 11:25 reference time so the last windows fall in the New York kill zone.
    let today = Utc::now().with_timezone(&offset).date_naive();
    let end = offset
        .from_local_datetime(&today.and_hms_opt(11, 25, 0).context("invalid demo end time")?)
        .single()
        .context("failed to build demo end time")?
        .with_timezone(&Utc);
    let step = Timeframe::M5.duration();
    let start = synthetic::series_start(end, step, candles)
        .context("demo series does not fit a time span")?;
    let series = synthetic::generate(seed, candles, start, step);
    if let Some(path) = out {
        write_candles_csv(path, &series)?;
        println!("Wrote {} candles to {}", series.len(), path.display());
    }

    let patterns = analyze(&series)?;
    println!("Synthetic series: {} candles, seed {seed}", series.len());
    for kind in PatternKind::ALL {
        println!("  {:<24} {}", format!("{kind:?}"), patterns.count(kind));
    }

    let report = replay(&engine, "DEMO", &series)?;
    print_replay(&report);
    if report.signals.is_empty() {
        println!("No signals; try another --seed or more --candles");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_candles_are_bounded() {
        let parse = |n: &str| Cli::try_parse_from(["killzone", "demo", "--candles", n]);
        assert!(parse("49").is_err());
        assert!(parse("100001").is_err());
        assert!(parse("5000000000").is_err());
        let cli = parse("600").unwrap();
        assert!(matches!(cli.command, Commands::Demo { candles: 600, .. }));
    }
}
