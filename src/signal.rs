use crate::estimator::HedgeRatio;
use serde::Serialize;
use std::error::Error;
use std::fmt;

const MIN_SPREAD_STD: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Long,
    Short,
    Exit,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegenerateSpreadError {
    pub samples: usize,
    pub std: f64,
}

impl fmt::Display for DegenerateSpreadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "spread variance is zero over {} samples (std={:e})",
            self.samples, self.std
        )
    }
}

impl Error for DegenerateSpreadError {}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZScore {
    pub z: f64,
    pub mean: f64,
    pub std: f64,
    pub spread: f64,
}

/// Spread series since the last calibration plus the z-score decision rule.
#[derive(Debug, Clone)]
pub struct SpreadSignalGenerator {
    z_entry: f64,
    z_exit: f64,
    hedge: Option<HedgeRatio>,
    series: Vec<f64>,
}

impl SpreadSignalGenerator {
    pub fn new(z_entry: f64, z_exit: f64) -> Self {
        Self {
            z_entry,
            z_exit,
            hedge: None,
            series: Vec::new(),
        }
    }

    pub fn recalibrate(&mut self, hedge: HedgeRatio, s0: &[f64], s1: &[f64]) {
        self.series = s0
            .iter()
            .zip(s1.iter())
            .map(|(p0, p1)| hedge.spread(*p0, *p1))
            .collect();
        self.hedge = Some(hedge);
    }

    /// Appends the spread for a new tick. Returns None before the first calibration.
    pub fn push(&mut self, p0: f64, p1: f64) -> Option<f64> {
        let spread = self.hedge?.spread(p0, p1);
        self.series.push(spread);
        Some(spread)
    }

    pub fn z_score(&self) -> Result<ZScore, DegenerateSpreadError> {
        let degenerate = DegenerateSpreadError {
            samples: self.series.len(),
            std: 0.0,
        };
        let (&latest, _) = self.series.split_last().ok_or(degenerate)?;
        let (mean, std) = moments(&self.series).ok_or(degenerate)?;
        if !std.is_finite() || std < MIN_SPREAD_STD {
            return Err(DegenerateSpreadError {
                samples: self.series.len(),
                std,
            });
        }
        Ok(ZScore {
            z: (latest - mean) / std,
            mean,
            std,
            spread: latest,
        })
    }

    pub fn decide(&self, z: f64) -> Signal {
        if z <= -self.z_entry {
            Signal::Long
        } else if z >= self.z_entry {
            Signal::Short
        } else if z.abs() <= self.z_exit {
            Signal::Exit
        } else {
            Signal::Hold
        }
    }

    pub fn hedge(&self) -> Option<HedgeRatio> {
        self.hedge
    }

    pub fn series(&self) -> &[f64] {
        &self.series
    }
}

// Population mean and standard deviation in one pass (Welford).
fn moments(series: &[f64]) -> Option<(f64, f64)> {
    if series.is_empty() {
        return None;
    }
    let (count, mean, m2) = series
        .iter()
        .fold((0.0_f64, 0.0_f64, 0.0_f64), |(count, mean, m2), &x| {
            let count = count + 1.0;
            let delta = x - mean;
            let mean = mean + delta / count;
            (count, mean, m2 + delta * (x - mean))
        });
    Some((mean, (m2 / count).sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_hedge() -> HedgeRatio {
        HedgeRatio {
            alpha: 1.0,
            beta: 1.0,
            size_a: 1.0,
            size_b: 1.0,
        }
    }

    #[test]
    fn recalibrate_replaces_series_with_window_spreads() {
        let mut gen = SpreadSignalGenerator::new(1.0, 0.2);
        gen.recalibrate(unit_hedge(), &[3.0, 5.0], &[1.0, 1.0]);
        assert_eq!(gen.series(), &[2.0, 4.0]);
        gen.recalibrate(unit_hedge(), &[1.0], &[1.0]);
        assert_eq!(gen.series(), &[0.0]);
    }

    #[test]
    fn push_before_calibration_is_ignored() {
        let mut gen = SpreadSignalGenerator::new(1.0, 0.2);
        assert_eq!(gen.push(1.0, 2.0), None);
        assert!(gen.series().is_empty());
    }

    #[test]
    fn z_score_uses_whole_series_population_std() {
        let mut gen = SpreadSignalGenerator::new(1.0, 0.2);
        gen.recalibrate(unit_hedge(), &[1.0, 3.0], &[0.0, 0.0]);
        gen.push(5.0, 0.0);
        // series [1, 3, 5]: mean 3, population std sqrt(8/3)
        let z = gen.z_score().unwrap();
        assert!((z.mean - 3.0).abs() < 1e-12);
        assert!((z.std - (8.0_f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((z.z - 2.0 / (8.0_f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn moments_hold_up_under_a_large_offset() {
        assert_eq!(moments(&[]), None);
        let (mean, std) = moments(&[1e9 + 1.0, 1e9 + 3.0, 1e9 + 5.0]).unwrap();
        assert_eq!(mean, 1e9 + 3.0);
        assert!((std - (8.0_f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn constant_spread_is_degenerate() {
        let mut gen = SpreadSignalGenerator::new(1.0, 0.2);
        gen.recalibrate(unit_hedge(), &[2.0, 2.0, 2.0], &[1.0, 1.0, 1.0]);
        let err = gen.z_score().unwrap_err();
        assert_eq!(err.samples, 3);
        assert_eq!(err.std, 0.0);
    }

    #[test]
    fn decision_rule_priority() {
        let gen = SpreadSignalGenerator::new(0.5, 0.1);
        assert_eq!(gen.decide(-0.5), Signal::Long);
        assert_eq!(gen.decide(0.6), Signal::Short);
        assert_eq!(gen.decide(0.05), Signal::Exit);
        assert_eq!(gen.decide(-0.1), Signal::Exit);
        assert_eq!(gen.decide(0.3), Signal::Hold);
    }
}
