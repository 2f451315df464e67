use super::{check_windows, CalibrationError, HedgeRatio, HedgeRatioEstimator};
use serde::Serialize;

const DEFAULT_GRID_STEPS: usize = 100;
const MIN_TRANSITIONS: usize = 3;
const MIN_PRICE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OuPrior {
    /// Time step between consecutive samples, in model time units.
    pub dt: f64,
    /// Base notional held in instrument 0.
    pub notional: f64,
}

/// Outcome of fitting an Ornstein-Uhlenbeck process to the best hedged spread.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OuFit {
    pub hedge: HedgeRatio,
    pub mean_level: f64,
    pub speed: f64,
    pub sigma: f64,
    pub log_likelihood: f64,
}

impl OuFit {
    pub fn half_life(&self) -> f64 {
        (2.0_f64).ln() / self.speed
    }
}

pub trait OuOptimiser {
    fn optimise(&self, s0: &[f64], s1: &[f64], prior: &OuPrior) -> Result<OuFit, CalibrationError>;
}

/// Grid search over the instrument-1 notional, scoring each candidate spread by
/// its exact OU likelihood.
#[derive(Debug, Clone, Copy)]
pub struct MleOuOptimiser {
    grid_steps: usize,
}

impl Default for MleOuOptimiser {
    fn default() -> Self {
        Self {
            grid_steps: DEFAULT_GRID_STEPS,
        }
    }
}

impl MleOuOptimiser {
    pub fn with_grid_steps(grid_steps: usize) -> Self {
        Self {
            grid_steps: grid_steps.max(1),
        }
    }
}

impl OuOptimiser for MleOuOptimiser {
    fn optimise(&self, s0: &[f64], s1: &[f64], prior: &OuPrior) -> Result<OuFit, CalibrationError> {
        check_windows(s0, s1, MIN_TRANSITIONS + 1)?;
        if !(prior.dt > 0.0) || !(prior.notional > 0.0) {
            return Err(CalibrationError::NotConverged(format!(
                "invalid prior dt={} notional={}",
                prior.dt, prior.notional
            )));
        }
        if s0[0].abs() < MIN_PRICE || s1[0].abs() < MIN_PRICE {
            return Err(CalibrationError::Singular);
        }

        let alpha = prior.notional / s0[0];
        let mut best: Option<OuFit> = None;
        let mut spread = vec![0.0; s0.len()];
        for k in 1..=self.grid_steps {
            let notional_b = prior.notional * k as f64 / self.grid_steps as f64;
            let beta = notional_b / s1[0];
            for (i, x) in spread.iter_mut().enumerate() {
                *x = alpha * s0[i] - beta * s1[i];
            }
            let Some((mean_level, speed, sigma, log_likelihood)) = ou_mle(&spread, prior.dt)
            else {
                continue;
            };
            let better = best
                .as_ref()
                .map_or(true, |b| log_likelihood > b.log_likelihood);
            if better {
                best = Some(OuFit {
                    hedge: HedgeRatio {
                        alpha,
                        beta,
                        size_a: prior.notional,
                        size_b: notional_b,
                    },
                    mean_level,
                    speed,
                    sigma,
                    log_likelihood,
                });
            }
        }

        best.ok_or_else(|| {
            CalibrationError::NotConverged("no mean-reverting candidate spread".to_string())
        })
    }
}

// Closed-form OU maximum likelihood. Returns (mean level, speed, sigma, avg log-likelihood).
fn ou_mle(x: &[f64], dt: f64) -> Option<(f64, f64, f64, f64)> {
    let n = x.len().checked_sub(1)?;
    if n < MIN_TRANSITIONS {
        return None;
    }
    let nf = n as f64;
    let (mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0);
    for w in x.windows(2) {
        let (prev, curr) = (w[0], w[1]);
        sx += prev;
        sy += curr;
        sxx += prev * prev;
        sxy += prev * curr;
    }

    let den = nf * (sxx - sxy) - (sx * sx - sx * sy);
    if den.abs() < 1e-12 {
        return None;
    }
    let theta = (sy * sxx - sx * sxy) / den;
    let ratio = (sxy - theta * sx - theta * sy + nf * theta * theta)
        / (sxx - 2.0 * theta * sx + nf * theta * theta);
    if !ratio.is_finite() || ratio <= 0.0 || ratio >= 1.0 {
        return None;
    }
    let speed = -ratio.ln() / dt;

    let resid_var = x
        .windows(2)
        .map(|w| {
            let e = w[1] - w[0] * ratio - theta * (1.0 - ratio);
            e * e
        })
        .sum::<f64>()
        / nf;
    if !(resid_var > 0.0) || !resid_var.is_finite() {
        return None;
    }
    let sigma = (resid_var * 2.0 * speed / (1.0 - ratio * ratio)).sqrt();
    let log_likelihood =
        -0.5 * (2.0 * std::f64::consts::PI).ln() - 0.5 * resid_var.ln() - 0.5;
    if !sigma.is_finite() || !log_likelihood.is_finite() {
        return None;
    }
    Some((theta, speed, sigma, log_likelihood))
}

pub struct OuEstimator {
    prior: OuPrior,
    optimiser: Box<dyn OuOptimiser>,
}

impl OuEstimator {
    pub fn new(prior: OuPrior) -> Self {
        Self::with_optimiser(prior, Box::new(MleOuOptimiser::default()))
    }

    pub fn with_optimiser(prior: OuPrior, optimiser: Box<dyn OuOptimiser>) -> Self {
        Self { prior, optimiser }
    }
}

impl HedgeRatioEstimator for OuEstimator {
    fn name(&self) -> &'static str {
        "ou"
    }

    fn fit(&self, s0: &[f64], s1: &[f64]) -> Result<HedgeRatio, CalibrationError> {
        let fit = self.optimiser.optimise(s0, s1, &self.prior)?;
        log::debug!(
            "[OU] mean={:.4} speed={:.4} sigma={:.4} half_life={:.2} ll={:.4} B={:.4}",
            fit.mean_level,
            fit.speed,
            fit.sigma,
            fit.half_life(),
            fit.log_likelihood,
            fit.hedge.size_b
        );
        Ok(fit.hedge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn cointegrated_pair(n: usize, seed: u64) -> (Vec<f64>, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let step = Normal::new(0.0, 0.5).unwrap();
        let shock = Normal::new(0.0, 0.2).unwrap();
        let mut p1 = 50.0;
        let mut spread = 0.0;
        let mut s0 = Vec::with_capacity(n);
        let mut s1 = Vec::with_capacity(n);
        for _ in 0..n {
            p1 += step.sample(&mut rng);
            spread += -0.3 * spread + shock.sample(&mut rng);
            s1.push(p1);
            s0.push(0.8 * p1 + 10.0 + spread);
        }
        (s0, s1)
    }

    fn prior() -> OuPrior {
        OuPrior {
            dt: 1.0 / 252.0,
            notional: 1.0,
        }
    }

    #[test]
    fn mle_recovers_mean_reverting_spread() {
        let (s0, s1) = cointegrated_pair(400, 7);
        let fit = MleOuOptimiser::default()
            .optimise(&s0, &s1, &prior())
            .unwrap();
        assert!(fit.speed > 0.0);
        assert!(fit.sigma > 0.0);
        assert!((fit.hedge.alpha - 1.0 / s0[0]).abs() < 1e-12);
        assert_eq!(fit.hedge.size_a, 1.0);
        assert!(fit.hedge.size_b > 0.0 && fit.hedge.size_b <= 1.0);
        assert!((fit.hedge.beta - fit.hedge.size_b / s1[0]).abs() < 1e-12);
    }

    #[test]
    fn ou_estimator_is_deterministic() {
        let (s0, s1) = cointegrated_pair(200, 11);
        let est = OuEstimator::new(prior());
        assert_eq!(est.fit(&s0, &s1).unwrap(), est.fit(&s0, &s1).unwrap());
    }

    #[test]
    fn flat_prices_do_not_converge() {
        let s0 = vec![10.0; 20];
        let s1 = vec![5.0; 20];
        let err = OuEstimator::new(prior()).fit(&s0, &s1).unwrap_err();
        assert!(matches!(err, CalibrationError::NotConverged(_)));
    }

    #[test]
    fn short_window_is_insufficient() {
        let err = MleOuOptimiser::default()
            .optimise(&[1.0, 2.0], &[1.0, 2.0], &prior())
            .unwrap_err();
        assert!(matches!(err, CalibrationError::InsufficientData { .. }));
    }

    #[test]
    fn zero_first_price_is_singular() {
        let s0 = [0.0, 1.0, 2.0, 3.0, 4.0];
        let s1 = [1.0, 2.0, 3.0, 4.0, 5.0];
        let err = MleOuOptimiser::with_grid_steps(10)
            .optimise(&s0, &s1, &prior())
            .unwrap_err();
        assert_eq!(err, CalibrationError::Singular);
    }
}
