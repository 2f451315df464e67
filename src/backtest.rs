use crate::config::PairSignalConfig;
use crate::engine::{CalibrationRecord, EngineError, PairSignalEngine, TickOutcome};
use crate::feed::{PriceTick, TickSource};
use crate::ports::paper_venue::{PaperAccount, PaperVenue};
use crate::ports::replay_feed::ReplayFeed;
use crate::ports::synthetic_feed::{SyntheticFeed, SyntheticParams};
use crate::position::{PositionAction, PositionIntent};
use crate::signal::Signal;
use crate::trade::execution::OrderStatus;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tokio::time::{sleep, Duration};

#[derive(Debug, Clone, Serialize)]
pub struct TickRecord {
    pub tick: PriceTick,
    pub outcome: Option<TickOutcome>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignalCounts {
    pub long: u64,
    pub short: u64,
    pub exit: u64,
    pub hold: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorCounts {
    pub calibration: u64,
    pub degenerate_spread: u64,
    pub order_placement: u64,
}

impl ErrorCounts {
    fn record(&mut self, err: &EngineError) {
        match err {
            EngineError::Calibration(_) => self.calibration += 1,
            EngineError::DegenerateSpread(_) => self.degenerate_spread += 1,
            EngineError::OrderPlacement(_) => self.order_placement += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestSummary {
    pub source: String,
    pub ticks: u64,
    pub missing: u64,
    pub warmup: u64,
    pub signals: SignalCounts,
    pub entries: u64,
    pub exits: u64,
    pub errors: ErrorCounts,
    pub fills: u64,
    pub cancels: u64,
    pub final_intent: PositionIntent,
    pub unreconciled: bool,
    pub account: PaperAccount,
    pub equity: Option<f64>,
    pub calibrations: Vec<CalibrationRecord>,
}

/// Caller-owned loop: deliver the venue's fills for a tick, then hand the tick to the engine.
pub struct Backtest {
    engine: PairSignalEngine,
    venue: PaperVenue,
    source: Box<dyn TickSource>,
    interval: Duration,
    summary_file: Option<String>,
    records: Vec<TickRecord>,
    errors: ErrorCounts,
    fills: u64,
    cancels: u64,
    last_prices: (Option<f64>, Option<f64>),
}

impl Backtest {
    pub fn new(
        engine: PairSignalEngine,
        venue: PaperVenue,
        source: Box<dyn TickSource>,
        interval_ms: u64,
    ) -> Self {
        Self {
            engine,
            venue,
            source,
            interval: Duration::from_millis(interval_ms),
            summary_file: None,
            records: Vec::new(),
            errors: ErrorCounts::default(),
            fills: 0,
            cancels: 0,
            last_prices: (None, None),
        }
    }

    pub fn from_config(cfg: &PairSignalConfig) -> Result<Self> {
        let source: Box<dyn TickSource> = match &cfg.replay_file {
            Some(path) => Box::new(ReplayFeed::new(path, &cfg.symbol_0, &cfg.symbol_1)?),
            None => Box::new(SyntheticFeed::new(SyntheticParams {
                ticks: cfg.synthetic_ticks,
                seed: cfg.seed,
                missing_prob: cfg.synthetic_missing_prob,
                ..SyntheticParams::default()
            })?),
        };
        let mut backtest = Self::new(
            PairSignalEngine::from_config(cfg),
            PaperVenue::new(cfg.fill_probability, cfg.seed),
            source,
            cfg.replay_interval_ms,
        );
        backtest.summary_file = cfg.summary_file.clone();
        Ok(backtest)
    }

    pub fn engine(&self) -> &PairSignalEngine {
        &self.engine
    }

    pub fn records(&self) -> &[TickRecord] {
        &self.records
    }

    pub async fn run(&mut self) -> Result<BacktestSummary> {
        log::info!("[BACKTEST] Running on {} feed.", self.source.name());
        while let Some(tick) = self.source.next_tick() {
            self.step(tick);
            if !self.interval.is_zero() {
                sleep(self.interval).await;
            }
        }
        log::info!(
            "[BACKTEST] End of feed reached after {} ticks. Backtest finished.",
            self.records.len()
        );

        let summary = self.summarize();
        if let Some(path) = &self.summary_file {
            write_summary(Path::new(path), &summary)?;
        }
        Ok(summary)
    }

    fn step(&mut self, tick: PriceTick) {
        for event in self.venue.on_tick(&tick) {
            match event.status {
                OrderStatus::Completed { .. } => self.fills += 1,
                OrderStatus::Canceled => self.cancels += 1,
                _ => {}
            }
            if let Some(intent) = self.engine.on_order_event(&event) {
                log::info!("[BACKTEST] {} {} -> {:?}", event.handle, event.status.label(), intent);
            }
        }

        let record = match self.engine.on_tick(tick.p0, tick.p1, &mut self.venue) {
            Ok(outcome) => TickRecord {
                tick,
                outcome: Some(outcome),
                error: None,
            },
            Err(e) => {
                // The engine stays usable after any error; keep going.
                log::error!("[BACKTEST] Step failed at {}: {}", tick.timestamp, e);
                self.errors.record(&e);
                TickRecord {
                    tick,
                    outcome: None,
                    error: Some(e.to_string()),
                }
            }
        };
        self.records.push(record);
        if tick.p0.is_some() {
            self.last_prices.0 = tick.p0;
        }
        if tick.p1.is_some() {
            self.last_prices.1 = tick.p1;
        }
    }

    fn summarize(&self) -> BacktestSummary {
        let mut signals = SignalCounts::default();
        let (mut missing, mut warmup, mut entries, mut exits) = (0, 0, 0, 0);
        for record in &self.records {
            match record.outcome {
                Some(TickOutcome::MissingData) => missing += 1,
                Some(TickOutcome::Warmup) => warmup += 1,
                Some(TickOutcome::Decision { signal, action, .. }) => {
                    match signal {
                        Signal::Long => signals.long += 1,
                        Signal::Short => signals.short += 1,
                        Signal::Exit => signals.exit += 1,
                        Signal::Hold => signals.hold += 1,
                    }
                    match action {
                        PositionAction::EntrySubmitted(_) => entries += 1,
                        PositionAction::ExitSubmitted(_) => exits += 1,
                        PositionAction::Ignored => {}
                    }
                }
                None => {}
            }
        }

        let account = self.venue.account();
        let equity = match self.last_prices {
            (Some(p0), Some(p1)) => Some(account.equity(p0, p1)),
            _ => None,
        };
        BacktestSummary {
            source: self.source.name().to_string(),
            ticks: self.records.len() as u64,
            missing,
            warmup,
            signals,
            entries,
            exits,
            errors: self.errors.clone(),
            fills: self.fills,
            cancels: self.cancels,
            final_intent: self.engine.intent(),
            unreconciled: self.engine.position().is_unreconciled(),
            account,
            equity,
            calibrations: self.engine.calibration_history().to_vec(),
        }
    }
}

fn write_summary(path: &Path, summary: &BacktestSummary) -> Result<()> {
    let payload = serde_json::to_string_pretty(summary).context("failed to encode summary")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, payload)
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)?;
    log::info!("[BACKTEST] summary written to {}", path.display());
    Ok(())
}
