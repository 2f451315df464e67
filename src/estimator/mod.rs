pub mod ols;
pub mod ou;

use serde::Serialize;
use std::error::Error;
use std::fmt;

pub use ols::OlsEstimator;
pub use ou::{MleOuOptimiser, OuEstimator, OuFit, OuOptimiser, OuPrior};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HedgeRatio {
    pub alpha: f64,
    pub beta: f64,
    pub size_a: f64,
    pub size_b: f64,
}

impl HedgeRatio {
    pub fn spread(&self, p0: f64, p1: f64) -> f64 {
        self.alpha * p0 - self.beta * p1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    InsufficientData { required: usize, available: usize },
    Singular,
    NotConverged(String),
    NonFinite(&'static str),
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CalibrationError::InsufficientData {
                required,
                available,
            } => write!(
                f,
                "insufficient data: need {} samples, have {}",
                required, available
            ),
            CalibrationError::Singular => write!(f, "singular regression"),
            CalibrationError::NotConverged(e) => write!(f, "optimiser did not converge: {}", e),
            CalibrationError::NonFinite(what) => write!(f, "non-finite {}", what),
        }
    }
}

impl Error for CalibrationError {}

pub trait HedgeRatioEstimator {
    fn name(&self) -> &'static str;

    fn fit(&self, s0: &[f64], s1: &[f64]) -> Result<HedgeRatio, CalibrationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorKind {
    Ols,
    Ou,
}

impl std::str::FromStr for EstimatorKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ols" => Ok(EstimatorKind::Ols),
            "ou" | "ornstein_uhlenbeck" => Ok(EstimatorKind::Ou),
            other => Err(format!("unknown estimator '{}'", other)),
        }
    }
}

pub(crate) fn check_windows(
    s0: &[f64],
    s1: &[f64],
    required: usize,
) -> Result<(), CalibrationError> {
    let available = s0.len().min(s1.len());
    if s0.len() != s1.len() || available < required {
        return Err(CalibrationError::InsufficientData {
            required,
            available,
        });
    }
    if s0.iter().chain(s1.iter()).any(|v| !v.is_finite()) {
        return Err(CalibrationError::NonFinite("price"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spread_uses_alpha_and_beta() {
        let hedge = HedgeRatio {
            alpha: 2.0,
            beta: 0.5,
            size_a: 1.0,
            size_b: 1.0,
        };
        assert_eq!(hedge.spread(10.0, 4.0), 18.0);
    }

    #[test]
    fn estimator_kind_parses_aliases() {
        assert_eq!("OLS".parse::<EstimatorKind>(), Ok(EstimatorKind::Ols));
        assert_eq!(
            "ornstein_uhlenbeck".parse::<EstimatorKind>(),
            Ok(EstimatorKind::Ou)
        );
        assert!("kalman".parse::<EstimatorKind>().is_err());
    }

    #[test]
    fn mismatched_windows_are_rejected() {
        assert_eq!(
            check_windows(&[1.0, 2.0], &[1.0], 1),
            Err(CalibrationError::InsufficientData {
                required: 1,
                available: 1
            })
        );
        assert_eq!(
            check_windows(&[1.0, f64::NAN], &[1.0, 2.0], 1),
            Err(CalibrationError::NonFinite("price"))
        );
    }
}
