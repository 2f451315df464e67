use crate::config::PairSignalConfig;
use crate::diagnostics::{DiagnosticsReport, PretradeDiagnostics};
use crate::estimator::{
    CalibrationError, EstimatorKind, HedgeRatio, HedgeRatioEstimator, MleOuOptimiser,
    OlsEstimator, OuEstimator, OuPrior,
};
use crate::position::{OrderPlacementError, PositionAction, PositionIntent, PositionStateMachine};
use crate::scheduler::{CalibrationScheduler, CalibrationState, TrainTrigger};
use crate::signal::{DegenerateSpreadError, Signal, SpreadSignalGenerator, ZScore};
use crate::trade::execution::{ExecutionVenue, OrderEvent};
use crate::window::{RollingWindowBuffer, WindowPolicy};
use serde::Serialize;
use std::error::Error;
use std::fmt;

#[derive(Debug, PartialEq)]
pub enum EngineError {
    Calibration(CalibrationError),
    DegenerateSpread(DegenerateSpreadError),
    OrderPlacement(OrderPlacementError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Calibration(e) => write!(f, "calibration failed: {}", e),
            EngineError::DegenerateSpread(e) => write!(f, "degenerate spread: {}", e),
            EngineError::OrderPlacement(e) => write!(f, "order placement failed: {}", e),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EngineError::Calibration(e) => Some(e),
            EngineError::DegenerateSpread(e) => Some(e),
            EngineError::OrderPlacement(e) => Some(e),
        }
    }
}

impl From<CalibrationError> for EngineError {
    fn from(err: CalibrationError) -> Self {
        EngineError::Calibration(err)
    }
}

impl From<DegenerateSpreadError> for EngineError {
    fn from(err: DegenerateSpreadError) -> Self {
        EngineError::DegenerateSpread(err)
    }
}

impl From<OrderPlacementError> for EngineError {
    fn from(err: OrderPlacementError) -> Self {
        EngineError::OrderPlacement(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TickOutcome {
    MissingData,
    Warmup,
    Decision {
        calibrated: Option<TrainTrigger>,
        z: ZScore,
        signal: Signal,
        action: PositionAction,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationRecord {
    pub total_ticks: u64,
    pub trigger: TrainTrigger,
    pub window_len: usize,
    pub hedge: HedgeRatio,
    pub diagnostics: Option<DiagnosticsReport>,
}

/// Signal engine for a single instrument pair. The caller owns the loop: feed every
/// tick to `on_tick` and every venue notification to `on_order_event`.
pub struct PairSignalEngine {
    window: RollingWindowBuffer,
    scheduler: CalibrationScheduler,
    estimator: Box<dyn HedgeRatioEstimator>,
    signal: SpreadSignalGenerator,
    position: PositionStateMachine,
    diagnostics: Option<PretradeDiagnostics>,
    history: Vec<CalibrationRecord>,
}

impl PairSignalEngine {
    pub fn new(
        cfg: &PairSignalConfig,
        estimator: Box<dyn HedgeRatioEstimator>,
        diagnostics: Option<PretradeDiagnostics>,
    ) -> Self {
        let policy = WindowPolicy::from_flag(cfg.use_fixed_train_size, cfg.num_train_initial);
        log::info!(
            "[ENGINE] estimator={} window={:?} train_initial={} test={} z_entry={} z_exit={}",
            estimator.name(),
            policy,
            cfg.num_train_initial,
            cfg.num_test,
            cfg.z_entry,
            cfg.z_exit
        );
        Self {
            window: RollingWindowBuffer::new(policy),
            scheduler: CalibrationScheduler::new(cfg.num_train_initial, cfg.num_test),
            estimator,
            signal: SpreadSignalGenerator::new(cfg.z_entry, cfg.z_exit),
            position: PositionStateMachine::new(),
            diagnostics,
            history: Vec::new(),
        }
    }

    pub fn from_config(cfg: &PairSignalConfig) -> Self {
        let estimator: Box<dyn HedgeRatioEstimator> = match cfg.estimator {
            EstimatorKind::Ols => Box::new(OlsEstimator::new()),
            EstimatorKind::Ou => Box::new(OuEstimator::with_optimiser(
                OuPrior {
                    dt: cfg.ou_dt,
                    notional: cfg.ou_notional,
                },
                Box::new(MleOuOptimiser::with_grid_steps(cfg.ou_grid_steps)),
            )),
        };
        let diagnostics = cfg.enable_diagnostics.then(|| {
            PretradeDiagnostics::with_threshold(cfg.adf_p_threshold, cfg.diagnostics_trend)
        });
        Self::new(cfg, estimator, diagnostics)
    }

    pub fn on_tick(
        &mut self,
        p0: Option<f64>,
        p1: Option<f64>,
        venue: &mut dyn ExecutionVenue,
    ) -> Result<TickOutcome, EngineError> {
        self.scheduler.record_tick();
        if !self.window.append(p0, p1) {
            return Ok(TickOutcome::MissingData);
        }
        let Some((p0, p1)) = self.window.last() else {
            return Ok(TickOutcome::MissingData);
        };

        let calibrated = match self.scheduler.due(self.position.is_flat()) {
            Some(trigger) => {
                self.calibrate(trigger)?;
                Some(trigger)
            }
            None => None,
        };
        let Some(hedge) = self.signal.hedge() else {
            return Ok(TickOutcome::Warmup);
        };
        // a fresh calibration already covers this tick
        if calibrated.is_none() {
            self.signal.push(p0, p1);
        }

        let z = match self.signal.z_score() {
            Ok(z) => z,
            Err(e) => {
                log::warn!("[SIGNAL] holding: {}", e);
                return Err(e.into());
            }
        };
        let signal = self.signal.decide(z.z);
        log::debug!(
            "[SIGNAL] tick={} since={} z={:.3} spread={:.5} mean={:.5} std={:.5} signal={:?} state={:?}",
            self.scheduler.state().total_ticks,
            self.scheduler.state().ticks_since_retrain,
            z.z,
            z.spread,
            z.mean,
            z.std,
            signal,
            self.position.intent()
        );
        let action = self.position.apply(signal, &hedge, venue)?;
        Ok(TickOutcome::Decision {
            calibrated,
            z,
            signal,
            action,
        })
    }

    pub fn on_order_event(&mut self, event: &OrderEvent) -> Option<PositionIntent> {
        self.position.on_order_event(event)
    }

    fn calibrate(&mut self, trigger: TrainTrigger) -> Result<(), CalibrationError> {
        let (s0, s1) = self.window.series();
        let hedge = match self.estimator.fit(&s0, &s1) {
            Ok(hedge) => hedge,
            Err(e) => {
                log::warn!(
                    "[TRAIN] {:?} {} fit failed on {} samples: {}",
                    trigger,
                    self.estimator.name(),
                    s0.len(),
                    e
                );
                return Err(e);
            }
        };
        self.signal.recalibrate(hedge, &s0, &s1);
        let diagnostics = self
            .diagnostics
            .as_ref()
            .map(|d| d.run(&s0, &s1, self.signal.series()));
        self.scheduler.mark_trained();

        let state = self.scheduler.state();
        log::info!(
            "[TRAIN] {:?} tick={} alpha={:.6} beta={:.6} A={:.6} B={:.6} window={}",
            trigger,
            state.total_ticks,
            hedge.alpha,
            hedge.beta,
            hedge.size_a,
            hedge.size_b,
            s0.len()
        );
        self.history.push(CalibrationRecord {
            total_ticks: state.total_ticks,
            trigger,
            window_len: s0.len(),
            hedge,
            diagnostics,
        });
        Ok(())
    }

    pub fn calibration_state(&self) -> CalibrationState {
        self.scheduler.state()
    }

    pub fn hedge(&self) -> Option<HedgeRatio> {
        self.signal.hedge()
    }

    pub fn spread_series(&self) -> &[f64] {
        self.signal.series()
    }

    pub fn intent(&self) -> PositionIntent {
        self.position.intent()
    }

    pub fn position(&self) -> &PositionStateMachine {
        &self.position
    }

    pub fn window(&self) -> &RollingWindowBuffer {
        &self.window
    }

    pub fn calibration_history(&self) -> &[CalibrationRecord] {
        &self.history
    }

    pub fn last_diagnostics(&self) -> Option<DiagnosticsReport> {
        self.history.last().and_then(|r| r.diagnostics)
    }
}
