use chrono::{DateTime, Utc};
use serde::Serialize;

/// One observation of the pair. `None` marks a price the source could not provide.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceTick {
    pub timestamp: DateTime<Utc>,
    pub p0: Option<f64>,
    pub p1: Option<f64>,
}

pub trait TickSource {
    fn name(&self) -> &'static str;
    fn next_tick(&mut self) -> Option<PriceTick>;
}
