use super::{check_windows, CalibrationError, HedgeRatio, HedgeRatioEstimator};

const MIN_SUM_SQ: f64 = 1e-12;

/// Static hedge from a no-intercept least-squares fit of instrument 0 on instrument 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct OlsEstimator;

impl OlsEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl HedgeRatioEstimator for OlsEstimator {
    fn name(&self) -> &'static str {
        "ols"
    }

    fn fit(&self, s0: &[f64], s1: &[f64]) -> Result<HedgeRatio, CalibrationError> {
        check_windows(s0, s1, 1)?;
        let beta = regression_slope(s1, s0)?;
        let alpha = 1.0;
        Ok(HedgeRatio {
            alpha,
            beta,
            size_a: alpha * s0[0],
            size_b: beta * s1[0],
        })
    }
}

// y = slope * x, no intercept
fn regression_slope(x: &[f64], y: &[f64]) -> Result<f64, CalibrationError> {
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (xi, yi) in x.iter().zip(y.iter()) {
        sxy += xi * yi;
        sxx += xi * xi;
    }
    if sxx.abs() < MIN_SUM_SQ {
        return Err(CalibrationError::Singular);
    }
    let slope = sxy / sxx;
    if !slope.is_finite() {
        return Err(CalibrationError::NonFinite("beta"));
    }
    Ok(slope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfectly_proportional_prices_give_half_beta() {
        let s0 = [1.0, 2.0, 3.0, 4.0, 5.0];
        let s1 = [2.0, 4.0, 6.0, 8.0, 10.0];
        let hedge = OlsEstimator::new().fit(&s0, &s1).unwrap();
        assert_eq!(hedge.alpha, 1.0);
        assert!((hedge.beta - 0.5).abs() < 1e-12);
        assert_eq!(hedge.size_a, 1.0);
        assert!((hedge.size_b - 1.0).abs() < 1e-12);
        for (p0, p1) in s0.iter().zip(s1.iter()) {
            assert!(hedge.spread(*p0, *p1).abs() < 1e-12);
        }
    }

    #[test]
    fn fit_is_deterministic() {
        let s0 = [10.0, 10.4, 10.1, 9.8, 10.6, 10.9];
        let s1 = [20.3, 20.1, 20.9, 19.5, 21.0, 21.7];
        let est = OlsEstimator::new();
        let a = est.fit(&s0, &s1).unwrap();
        let b = est.fit(&s0, &s1).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn all_zero_regressor_is_singular() {
        let err = OlsEstimator::new()
            .fit(&[1.0, 2.0, 3.0], &[0.0, 0.0, 0.0])
            .unwrap_err();
        assert_eq!(err, CalibrationError::Singular);
    }

    #[test]
    fn empty_window_is_insufficient() {
        let err = OlsEstimator::new().fit(&[], &[]).unwrap_err();
        assert!(matches!(err, CalibrationError::InsufficientData { .. }));
    }
}
