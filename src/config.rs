use crate::diagnostics::Trend;
use crate::estimator::EstimatorKind;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs::File;
use std::num::{ParseFloatError, ParseIntError};
use std::path::Path;
use std::str::FromStr;

const DEFAULT_Z_ENTRY: f64 = 0.5;
const DEFAULT_Z_EXIT: f64 = 0.1;
const DEFAULT_NUM_TRAIN_INITIAL: usize = 24 * 7 * 13;
const DEFAULT_NUM_TEST: usize = 24 * 7;
const DEFAULT_OU_DT: f64 = 1.0 / 252.0;
const DEFAULT_OU_NOTIONAL: f64 = 1.0;
const DEFAULT_OU_GRID_STEPS: usize = 100;
const DEFAULT_ADF_P_THRESHOLD: f64 = 0.05;
const DEFAULT_FILL_PROBABILITY: f64 = 1.0;
const DEFAULT_SEED: u64 = 42;
const DEFAULT_SYNTHETIC_TICKS: usize = 5_000;

#[derive(Debug)]
pub enum ConfigError {
    ParseIntError(ParseIntError),
    ParseFloatError(ParseFloatError),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::ParseIntError(e) => write!(f, "Parse int error: {}", e),
            ConfigError::ParseFloatError(e) => write!(f, "Parse float error: {}", e),
            ConfigError::Invalid(e) => write!(f, "Invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ParseIntError> for ConfigError {
    fn from(err: ParseIntError) -> ConfigError {
        ConfigError::ParseIntError(err)
    }
}

impl From<ParseFloatError> for ConfigError {
    fn from(err: ParseFloatError) -> ConfigError {
        ConfigError::ParseFloatError(err)
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
struct PairSignalYaml {
    z_entry: Option<f64>,
    z_exit: Option<f64>,
    num_train_initial: Option<usize>,
    num_test: Option<usize>,
    use_fixed_train_size: Option<bool>,
    estimator: Option<String>,
    ou_dt: Option<f64>,
    ou_notional: Option<f64>,
    ou_grid_steps: Option<usize>,
    enable_diagnostics: Option<bool>,
    diagnostics_trend: Option<String>,
    adf_p_threshold: Option<f64>,
    symbol_0: Option<String>,
    symbol_1: Option<String>,
    replay_file: Option<String>,
    replay_interval_ms: Option<u64>,
    fill_probability: Option<f64>,
    seed: Option<u64>,
    synthetic_ticks: Option<usize>,
    synthetic_missing_prob: Option<f64>,
    summary_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PairSignalConfig {
    pub z_entry: f64,
    pub z_exit: f64,
    pub num_train_initial: usize,
    pub num_test: usize,
    pub use_fixed_train_size: bool,
    pub estimator: EstimatorKind,
    pub ou_dt: f64,
    pub ou_notional: f64,
    pub ou_grid_steps: usize,
    pub enable_diagnostics: bool,
    pub diagnostics_trend: Trend,
    pub adf_p_threshold: f64,
    pub symbol_0: String,
    pub symbol_1: String,
    // Replay source; synthetic data when absent
    pub replay_file: Option<String>,
    pub replay_interval_ms: u64,
    // Paper venue
    pub fill_probability: f64,
    pub seed: u64,
    pub synthetic_ticks: usize,
    pub synthetic_missing_prob: f64,
    pub summary_file: Option<String>,
}

impl Default for PairSignalConfig {
    fn default() -> Self {
        Self {
            z_entry: DEFAULT_Z_ENTRY,
            z_exit: DEFAULT_Z_EXIT,
            num_train_initial: DEFAULT_NUM_TRAIN_INITIAL,
            num_test: DEFAULT_NUM_TEST,
            use_fixed_train_size: true,
            estimator: EstimatorKind::Ols,
            ou_dt: DEFAULT_OU_DT,
            ou_notional: DEFAULT_OU_NOTIONAL,
            ou_grid_steps: DEFAULT_OU_GRID_STEPS,
            enable_diagnostics: true,
            diagnostics_trend: Trend::Constant,
            adf_p_threshold: DEFAULT_ADF_P_THRESHOLD,
            symbol_0: "ASSET0".to_string(),
            symbol_1: "ASSET1".to_string(),
            replay_file: None,
            replay_interval_ms: 0,
            fill_probability: DEFAULT_FILL_PROBABILITY,
            seed: DEFAULT_SEED,
            synthetic_ticks: DEFAULT_SYNTHETIC_TICKS,
            synthetic_missing_prob: 0.0,
            summary_file: None,
        }
    }
}

impl PairSignalConfig {
    pub fn from_env_or_yaml() -> Result<Self> {
        let config_path = env::var("PAIRSIGNAL_CONFIG_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty());
        if let Some(path) = config_path {
            return Self::from_yaml_path(path);
        }
        Self::from_env()
    }

    pub fn from_yaml_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)
            .with_context(|| format!("failed to open config {}", path_ref.display()))?;
        let yaml: PairSignalYaml = serde_yaml::from_reader(file)
            .with_context(|| format!("failed to parse config {}", path_ref.display()))?;
        let mut cfg = Self::from_yaml(yaml)?;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_yaml(yaml: PairSignalYaml) -> Result<Self, ConfigError> {
        let d = Self::default();
        let estimator = match yaml.estimator {
            Some(raw) => raw.parse().map_err(ConfigError::Invalid)?,
            None => d.estimator,
        };
        let diagnostics_trend = match yaml.diagnostics_trend {
            Some(raw) => raw.parse().map_err(ConfigError::Invalid)?,
            None => d.diagnostics_trend,
        };
        Ok(PairSignalConfig {
            z_entry: yaml.z_entry.unwrap_or(d.z_entry),
            z_exit: yaml.z_exit.unwrap_or(d.z_exit),
            num_train_initial: yaml.num_train_initial.unwrap_or(d.num_train_initial),
            num_test: yaml.num_test.unwrap_or(d.num_test),
            use_fixed_train_size: yaml
                .use_fixed_train_size
                .unwrap_or(d.use_fixed_train_size),
            estimator,
            ou_dt: yaml.ou_dt.unwrap_or(d.ou_dt),
            ou_notional: yaml.ou_notional.unwrap_or(d.ou_notional),
            ou_grid_steps: yaml.ou_grid_steps.unwrap_or(d.ou_grid_steps),
            enable_diagnostics: yaml.enable_diagnostics.unwrap_or(d.enable_diagnostics),
            diagnostics_trend,
            adf_p_threshold: yaml.adf_p_threshold.unwrap_or(d.adf_p_threshold),
            symbol_0: yaml.symbol_0.unwrap_or(d.symbol_0),
            symbol_1: yaml.symbol_1.unwrap_or(d.symbol_1),
            replay_file: yaml.replay_file.filter(|v| !v.trim().is_empty()),
            replay_interval_ms: yaml.replay_interval_ms.unwrap_or(d.replay_interval_ms),
            fill_probability: yaml.fill_probability.unwrap_or(d.fill_probability),
            seed: yaml.seed.unwrap_or(d.seed),
            synthetic_ticks: yaml.synthetic_ticks.unwrap_or(d.synthetic_ticks),
            synthetic_missing_prob: yaml
                .synthetic_missing_prob
                .unwrap_or(d.synthetic_missing_prob),
            summary_file: yaml.summary_file.filter(|v| !v.trim().is_empty()),
        })
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_value("Z_ENTRY") {
            self.z_entry = v.parse()?;
        }
        if let Some(v) = env_value("Z_EXIT") {
            self.z_exit = v.parse()?;
        }
        if let Some(v) = env_value("NUM_TRAIN_INITIAL") {
            self.num_train_initial = v.parse()?;
        }
        if let Some(v) = env_value("NUM_TEST") {
            self.num_test = v.parse()?;
        }
        if let Some(v) = env_value("USE_FIXED_TRAIN_SIZE") {
            self.use_fixed_train_size = v.to_lowercase() == "true";
        }
        if let Some(v) = env_value("ESTIMATOR") {
            self.estimator = EstimatorKind::from_str(&v).map_err(ConfigError::Invalid)?;
        }
        if let Some(v) = env_value("OU_DT") {
            self.ou_dt = v.parse()?;
        }
        if let Some(v) = env_value("OU_NOTIONAL") {
            self.ou_notional = v.parse()?;
        }
        if let Some(v) = env_value("OU_GRID_STEPS") {
            self.ou_grid_steps = v.parse()?;
        }
        if let Some(v) = env_value("ENABLE_DIAGNOSTICS") {
            self.enable_diagnostics = v.to_lowercase() == "true";
        }
        if let Some(v) = env_value("DIAGNOSTICS_TREND") {
            self.diagnostics_trend = Trend::from_str(&v).map_err(ConfigError::Invalid)?;
        }
        if let Some(v) = env_value("ADF_P_THRESHOLD") {
            self.adf_p_threshold = v.parse()?;
        }
        if let Some(v) = env_value("SYMBOL_0") {
            self.symbol_0 = v;
        }
        if let Some(v) = env_value("SYMBOL_1") {
            self.symbol_1 = v;
        }
        if let Some(v) = env_value("REPLAY_FILE") {
            self.replay_file = Some(v);
        }
        if let Some(v) = env_value("REPLAY_INTERVAL_MS") {
            self.replay_interval_ms = v.parse()?;
        }
        if let Some(v) = env_value("FILL_PROBABILITY") {
            self.fill_probability = v.parse()?;
        }
        if let Some(v) = env_value("SEED") {
            self.seed = v.parse()?;
        }
        if let Some(v) = env_value("SYNTHETIC_TICKS") {
            self.synthetic_ticks = v.parse()?;
        }
        if let Some(v) = env_value("SYNTHETIC_MISSING_PROB") {
            self.synthetic_missing_prob = v.parse()?;
        }
        if let Some(v) = env_value("SUMMARY_FILE") {
            self.summary_file = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg)) };
        if !(self.z_entry > 0.0) {
            return invalid(format!("z_entry must be > 0 (got {})", self.z_entry));
        }
        if !(self.z_exit >= 0.0 && self.z_exit < self.z_entry) {
            return invalid(format!(
                "z_exit must satisfy 0 <= z_exit < z_entry (got {} / {})",
                self.z_exit, self.z_entry
            ));
        }
        if self.num_train_initial == 0 {
            return invalid("num_train_initial must be > 0".to_string());
        }
        if self.num_test == 0 {
            return invalid("num_test must be > 0".to_string());
        }
        if self.estimator == EstimatorKind::Ou {
            if !(self.ou_dt > 0.0) {
                return invalid(format!("ou_dt must be > 0 (got {})", self.ou_dt));
            }
            if !(self.ou_notional > 0.0) {
                return invalid(format!("ou_notional must be > 0 (got {})", self.ou_notional));
            }
            if self.ou_grid_steps == 0 {
                return invalid("ou_grid_steps must be > 0".to_string());
            }
        }
        if !(0.0..=1.0).contains(&self.adf_p_threshold) {
            return invalid(format!(
                "adf_p_threshold must be within [0, 1] (got {})",
                self.adf_p_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.fill_probability) {
            return invalid(format!(
                "fill_probability must be within [0, 1] (got {})",
                self.fill_probability
            ));
        }
        if !(0.0..1.0).contains(&self.synthetic_missing_prob) {
            return invalid(format!(
                "synthetic_missing_prob must be within [0, 1) (got {})",
                self.synthetic_missing_prob
            ));
        }
        if self.symbol_0 == self.symbol_1 {
            return invalid(format!("symbols must differ (both {})", self.symbol_0));
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
