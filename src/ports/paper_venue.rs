use crate::feed::PriceTick;
use crate::trade::execution::{
    ExecutionVenue, Instrument, OrderEvent, OrderHandle, OrderRequest, OrderSide, OrderStatus,
    VenueError,
};
use crate::window::usable;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PaperAccount {
    pub position_a: Decimal,
    pub position_b: Decimal,
    pub cash: Decimal,
    pub fills: u64,
    pub cancels: u64,
}

impl PaperAccount {
    pub fn position(&self, instrument: Instrument) -> Decimal {
        match instrument {
            Instrument::A => self.position_a,
            Instrument::B => self.position_b,
        }
    }

    pub fn equity(&self, p0: f64, p1: f64) -> f64 {
        let cash = self.cash.to_f64().unwrap_or(0.0);
        let a = self.position_a.to_f64().unwrap_or(0.0);
        let b = self.position_b.to_f64().unwrap_or(0.0);
        cash + a * p0 + b * p1
    }
}

/// Simulated venue: orders rest until the next tick, then fill at that tick's
/// price with probability `fill_probability` or are canceled.
pub struct PaperVenue {
    fill_probability: f64,
    rng: StdRng,
    next_id: u64,
    queued: Vec<(OrderHandle, OrderRequest)>,
    account: PaperAccount,
}

impl PaperVenue {
    pub fn new(fill_probability: f64, seed: u64) -> Self {
        Self {
            fill_probability: fill_probability.clamp(0.0, 1.0),
            rng: StdRng::seed_from_u64(seed),
            next_id: 1,
            queued: Vec::new(),
            account: PaperAccount::default(),
        }
    }

    pub fn account(&self) -> PaperAccount {
        self.account
    }

    pub fn queued(&self) -> usize {
        self.queued.len()
    }

    /// Resolves every queued order against `tick`. Orders whose instrument has no
    /// price on this tick stay queued.
    pub fn on_tick(&mut self, tick: &PriceTick) -> Vec<OrderEvent> {
        let queued = std::mem::take(&mut self.queued);
        let mut events = Vec::with_capacity(queued.len());
        for (handle, order) in queued {
            let price = match order.instrument {
                Instrument::A => usable(tick.p0),
                Instrument::B => usable(tick.p1),
            };
            let Some(price) = price else {
                self.queued.push((handle, order));
                continue;
            };
            let filled = self.fill_probability >= 1.0
                || (self.fill_probability > 0.0 && self.rng.gen_bool(self.fill_probability));
            let status = match Decimal::from_f64(price) {
                Some(px) if filled => {
                    self.book_fill(&order, px);
                    log::info!(
                        "[PAPER_FILL] {} {:?} {:?} size={} price={}",
                        handle,
                        order.instrument,
                        order.side,
                        order.size,
                        px
                    );
                    OrderStatus::Completed {
                        price,
                        timestamp: tick.timestamp,
                    }
                }
                _ => {
                    self.account.cancels += 1;
                    log::info!("[PAPER_CANCEL] {} {:?} {:?}", handle, order.instrument, order.side);
                    OrderStatus::Canceled
                }
            };
            events.push(OrderEvent { handle, status });
        }
        events
    }

    fn book_fill(&mut self, order: &OrderRequest, price: Decimal) {
        let signed = match order.side {
            OrderSide::Buy => order.size,
            OrderSide::Sell => -order.size,
        };
        match order.instrument {
            Instrument::A => self.account.position_a += signed,
            Instrument::B => self.account.position_b += signed,
        }
        self.account.cash -= signed * price;
        self.account.fills += 1;
    }
}

impl ExecutionVenue for PaperVenue {
    fn submit(&mut self, order: &OrderRequest) -> Result<OrderHandle, VenueError> {
        if order.size <= Decimal::ZERO {
            return Err(VenueError::Rejected(format!(
                "non-positive size {} for {:?}",
                order.size, order.instrument
            )));
        }
        let handle = OrderHandle(self.next_id);
        self.next_id += 1;
        self.queued.push((handle, order.clone()));
        Ok(handle)
    }
}
