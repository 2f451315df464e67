use nalgebra::{DMatrix, DVector};
use serde::Serialize;

const DEFAULT_P_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    #[serde(rename = "n")]
    None,
    #[serde(rename = "c")]
    Constant,
    #[serde(rename = "ct")]
    ConstantTrend,
}

impl Trend {
    pub fn label(self) -> &'static str {
        match self {
            Trend::None => "n",
            Trend::Constant => "c",
            Trend::ConstantTrend => "ct",
        }
    }

    fn deterministic_terms(self) -> usize {
        match self {
            Trend::None => 0,
            Trend::Constant => 1,
            Trend::ConstantTrend => 2,
        }
    }
}

impl std::str::FromStr for Trend {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "n" | "nc" | "none" => Ok(Trend::None),
            "c" | "constant" => Ok(Trend::Constant),
            "ct" | "trend" => Ok(Trend::ConstantTrend),
            other => Err(format!("unknown trend '{}'", other)),
        }
    }
}

pub trait StationarityTest {
    fn is_stationary(&self, series: &[f64], trend: Trend) -> bool;
}

pub trait CointegrationTest {
    fn is_cointegrated(&self, s0: &[f64], s1: &[f64], trend: Trend) -> bool;
}

/// Augmented Dickey-Fuller test with interpolated critical values.
#[derive(Debug, Clone, Copy)]
pub struct AdfTest {
    p_threshold: f64,
    lags: usize,
}

impl Default for AdfTest {
    fn default() -> Self {
        Self {
            p_threshold: DEFAULT_P_THRESHOLD,
            lags: 0,
        }
    }
}

impl AdfTest {
    pub fn new(p_threshold: f64, lags: usize) -> Self {
        Self { p_threshold, lags }
    }

    pub fn p_value(&self, series: &[f64], trend: Trend) -> f64 {
        match adf_t_stat(series, trend, self.lags) {
            Some((t_stat, n)) => CriticalValues::dickey_fuller(trend).p_value(t_stat, n),
            None => 1.0,
        }
    }
}

impl StationarityTest for AdfTest {
    fn is_stationary(&self, series: &[f64], trend: Trend) -> bool {
        self.p_value(series, trend) <= self.p_threshold
    }
}

/// Two-step Engle-Granger test, run in both directions.
#[derive(Debug, Clone, Copy)]
pub struct EngleGrangerTest {
    p_threshold: f64,
    lags: usize,
}

impl Default for EngleGrangerTest {
    fn default() -> Self {
        Self {
            p_threshold: DEFAULT_P_THRESHOLD,
            lags: 0,
        }
    }
}

impl EngleGrangerTest {
    pub fn new(p_threshold: f64, lags: usize) -> Self {
        Self { p_threshold, lags }
    }

    pub fn p_value(&self, y: &[f64], x: &[f64], trend: Trend) -> f64 {
        let Some(resid) = cointegrating_residuals(y, x, trend) else {
            return 1.0;
        };
        // residuals are already demeaned/detrended by the first-step regression
        match adf_t_stat(&resid, Trend::None, self.lags) {
            Some((t_stat, n)) => CriticalValues::engle_granger(trend).p_value(t_stat, n),
            None => 1.0,
        }
    }
}

impl CointegrationTest for EngleGrangerTest {
    fn is_cointegrated(&self, s0: &[f64], s1: &[f64], trend: Trend) -> bool {
        let forward = self.p_value(s0, s1, trend);
        let backward = self.p_value(s1, s0, trend);
        forward <= self.p_threshold && backward <= self.p_threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiagnosticsReport {
    pub trend: Trend,
    pub samples: usize,
    pub spread_stationary: bool,
    pub cointegrated: bool,
}

/// Post-calibration monitoring. Results never gate trading.
pub struct PretradeDiagnostics {
    stationarity: Box<dyn StationarityTest>,
    cointegration: Box<dyn CointegrationTest>,
    trend: Trend,
}

impl PretradeDiagnostics {
    pub fn new(
        stationarity: Box<dyn StationarityTest>,
        cointegration: Box<dyn CointegrationTest>,
        trend: Trend,
    ) -> Self {
        Self {
            stationarity,
            cointegration,
            trend,
        }
    }

    pub fn with_threshold(p_threshold: f64, trend: Trend) -> Self {
        Self::new(
            Box::new(AdfTest::new(p_threshold, 0)),
            Box::new(EngleGrangerTest::new(p_threshold, 0)),
            trend,
        )
    }

    pub fn run(&self, s0: &[f64], s1: &[f64], spread: &[f64]) -> DiagnosticsReport {
        let report = DiagnosticsReport {
            trend: self.trend,
            samples: spread.len(),
            spread_stationary: self.stationarity.is_stationary(spread, self.trend),
            cointegrated: self.cointegration.is_cointegrated(s0, s1, self.trend),
        };
        log::info!(
            "[DIAG] adf_{}={} engle_granger_{}={} samples={}",
            self.trend.label(),
            report.spread_stationary,
            self.trend.label(),
            report.cointegrated,
            report.samples
        );
        report
    }
}

// dY_t = [c] + [b*t] + phi * Y_{t-1} + sum(g_i * dY_{t-i}) + eps
// Returns the t statistic of phi and the number of regression rows.
fn adf_t_stat(series: &[f64], trend: Trend, lags: usize) -> Option<(f64, usize)> {
    if series.len() < lags + 6 {
        return None;
    }
    let dy: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();
    let rows = dy.len() - lags;
    let cols = 1 + lags + trend.deterministic_terms();
    let mut x_data = Vec::with_capacity(rows * cols);
    for j in lags..dy.len() {
        x_data.push(series[j]);
        x_data.extend((1..=lags).map(|i| dy[j - i]));
        push_deterministic(&mut x_data, trend, j);
    }
    let x = DMatrix::from_row_slice(rows, cols, &x_data);
    let y = DVector::from_vec(dy[lags..].to_vec());
    let fit = least_squares(&x, &y)?;
    if !(fit.std_errors[0] > 1e-12) {
        return None;
    }
    let t_stat = fit.coefficients[0] / fit.std_errors[0];
    t_stat.is_finite().then_some((t_stat, rows))
}

fn cointegrating_residuals(y: &[f64], x: &[f64], trend: Trend) -> Option<Vec<f64>> {
    if y.len() != x.len() || y.len() < 6 {
        return None;
    }
    let cols = 1 + trend.deterministic_terms();
    let mut x_data = Vec::with_capacity(x.len() * cols);
    for (t, xi) in x.iter().enumerate() {
        x_data.push(*xi);
        push_deterministic(&mut x_data, trend, t);
    }
    let design = DMatrix::from_row_slice(x.len(), cols, &x_data);
    let fit = least_squares(&design, &DVector::from_vec(y.to_vec()))?;
    Some(fit.residuals.iter().copied().collect())
}

fn push_deterministic(row: &mut Vec<f64>, trend: Trend, t: usize) {
    match trend {
        Trend::None => {}
        Trend::Constant => row.push(1.0),
        Trend::ConstantTrend => {
            row.push(1.0);
            row.push(t as f64);
        }
    }
}

struct LeastSquares {
    coefficients: DVector<f64>,
    std_errors: DVector<f64>,
    residuals: DVector<f64>,
}

// beta = (X'X)^-1 X'y, se_i = sqrt(s^2 * [(X'X)^-1]_ii)
fn least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<LeastSquares> {
    let (n, k) = x.shape();
    if n <= k || y.len() != n {
        return None;
    }
    let xt = x.transpose();
    let xtx_inv = (&xt * x).try_inverse()?;
    let coefficients = &xtx_inv * (&xt * y);
    let residuals = y - x * &coefficients;
    let sigma2 = residuals.norm_squared() / (n - k) as f64;
    let std_errors = xtx_inv.diagonal().map(|v| (sigma2 * v).max(0.0).sqrt());
    Some(LeastSquares {
        coefficients,
        std_errors,
        residuals,
    })
}

/// Critical values at 1%, 5% and 10%, keyed by the number of regression rows.
#[derive(Debug, Clone, Copy)]
struct CriticalValues {
    rows: &'static [(usize, [f64; 3])],
}

impl CriticalValues {
    fn dickey_fuller(trend: Trend) -> Self {
        const NONE: &[(usize, [f64; 3])] = &[
            (25, [-2.66, -1.95, -1.60]),
            (50, [-2.62, -1.95, -1.61]),
            (100, [-2.60, -1.95, -1.61]),
            (250, [-2.58, -1.95, -1.62]),
            (500, [-2.58, -1.95, -1.62]),
        ];
        const CONSTANT: &[(usize, [f64; 3])] = &[
            (25, [-3.75, -3.00, -2.63]),
            (50, [-3.58, -2.93, -2.60]),
            (100, [-3.51, -2.89, -2.58]),
            (250, [-3.46, -2.88, -2.57]),
            (500, [-3.44, -2.87, -2.57]),
        ];
        const CONSTANT_TREND: &[(usize, [f64; 3])] = &[
            (25, [-4.38, -3.60, -3.24]),
            (50, [-4.15, -3.50, -3.18]),
            (100, [-4.04, -3.45, -3.15]),
            (250, [-3.99, -3.43, -3.13]),
            (500, [-3.98, -3.42, -3.13]),
        ];
        let rows = match trend {
            Trend::None => NONE,
            Trend::Constant => CONSTANT,
            Trend::ConstantTrend => CONSTANT_TREND,
        };
        Self { rows }
    }

    // Asymptotic values for the two-variable residual test.
    fn engle_granger(trend: Trend) -> Self {
        let rows: &'static [(usize, [f64; 3])] = match trend {
            Trend::None => &[(0, [-3.39, -2.76, -2.45])],
            Trend::Constant => &[(0, [-3.90, -3.34, -3.04])],
            Trend::ConstantTrend => &[(0, [-4.32, -3.78, -3.50])],
        };
        Self { rows }
    }

    // Linear in sample size between table rows, clamped at both ends.
    fn at(&self, n: usize) -> [f64; 3] {
        match self.rows.iter().position(|(size, _)| *size >= n) {
            Some(0) => self.rows[0].1,
            Some(i) => {
                let (lo, below) = self.rows[i - 1];
                let (hi, above) = self.rows[i];
                let w = (n - lo) as f64 / (hi - lo) as f64;
                [0, 1, 2].map(|c| below[c] + w * (above[c] - below[c]))
            }
            None => self.rows.last().map(|row| row.1).unwrap_or_default(),
        }
    }

    // Coarse p-value bucket for a left-tailed statistic.
    fn p_value(&self, t_stat: f64, n: usize) -> f64 {
        self.at(n)
            .iter()
            .zip([0.005, 0.025, 0.075])
            .find(|(crit, _)| t_stat < **crit)
            .map_or(0.5, |(_, p)| p)
    }
}
