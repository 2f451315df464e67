use crate::feed::{PriceTick, TickSource};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticParams {
    pub ticks: usize,
    pub seed: u64,
    pub missing_prob: f64,
    pub beta: f64,
    pub start_price: f64,
    pub price_vol: f64,
    pub spread_speed: f64,
    pub spread_vol: f64,
    pub step_secs: i64,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            ticks: 5000,
            seed: 42,
            missing_prob: 0.0,
            beta: 0.5,
            start_price: 100.0,
            price_vol: 0.5,
            spread_speed: 0.05,
            spread_vol: 0.2,
            step_secs: 3600,
        }
    }
}

/// Cointegrated pair: p1 random walk, p0 = beta * p1 + OU spread.
pub struct SyntheticFeed {
    params: SyntheticParams,
    rng: StdRng,
    price_step: Normal<f64>,
    spread_shock: Normal<f64>,
    start: DateTime<Utc>,
    emitted: usize,
    p1: f64,
    spread: f64,
}

impl SyntheticFeed {
    pub fn new(params: SyntheticParams) -> Result<Self> {
        if !(0.0..=1.0).contains(&params.missing_prob) {
            return Err(anyhow!("missing_prob must lie in [0, 1]: {}", params.missing_prob));
        }
        if !(params.spread_speed > 0.0 && params.spread_speed < 1.0) {
            return Err(anyhow!("spread_speed must lie in (0, 1): {}", params.spread_speed));
        }
        let price_step = Normal::new(0.0, params.price_vol)
            .map_err(|e| anyhow!("invalid price_vol {}: {}", params.price_vol, e))?;
        let spread_shock = Normal::new(0.0, params.spread_vol)
            .map_err(|e| anyhow!("invalid spread_vol {}: {}", params.spread_vol, e))?;
        let start = Utc
            .timestamp_opt(1_700_000_000, 0)
            .single()
            .ok_or_else(|| anyhow!("invalid synthetic start timestamp"))?;
        log::info!(
            "[SYNTH] ticks={} seed={} beta={} missing_prob={}",
            params.ticks,
            params.seed,
            params.beta,
            params.missing_prob
        );
        Ok(Self {
            rng: StdRng::seed_from_u64(params.seed),
            p1: params.start_price,
            spread: 0.0,
            params,
            price_step,
            spread_shock,
            start,
            emitted: 0,
        })
    }

    fn maybe_drop(&mut self, price: f64) -> Option<f64> {
        if self.params.missing_prob > 0.0 && self.rng.gen_bool(self.params.missing_prob) {
            None
        } else {
            Some(price)
        }
    }
}

impl TickSource for SyntheticFeed {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn next_tick(&mut self) -> Option<PriceTick> {
        if self.emitted >= self.params.ticks {
            return None;
        }
        if self.emitted > 0 {
            self.p1 = (self.p1 + self.price_step.sample(&mut self.rng)).max(1e-6);
            self.spread += -self.params.spread_speed * self.spread
                + self.spread_shock.sample(&mut self.rng);
        }
        let timestamp = self.start + Duration::seconds(self.params.step_secs * self.emitted as i64);
        self.emitted += 1;

        let p0 = self.params.beta * self.p1 + self.spread;
        let p1 = self.p1;
        Some(PriceTick {
            timestamp,
            p0: self.maybe_drop(p0),
            p1: self.maybe_drop(p1),
        })
    }
}
