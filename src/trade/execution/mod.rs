use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instrument {
    A,
    B,
}

impl Instrument {
    pub fn index(self) -> usize {
        match self {
            Instrument::A => 0,
            Instrument::B => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Market,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub instrument: Instrument,
    pub side: OrderSide,
    pub size: Decimal,
    pub kind: OrderKind,
}

impl OrderRequest {
    pub fn market(instrument: Instrument, side: OrderSide, size: Decimal) -> Self {
        Self {
            instrument,
            side,
            size,
            kind: OrderKind::Market,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OrderHandle(pub u64);

impl fmt::Display for OrderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Submitted,
    Accepted,
    Completed {
        price: f64,
        timestamp: DateTime<Utc>,
    },
    Expired,
    Canceled,
    Margin,
}

impl OrderStatus {
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Submitted => "Submitted",
            OrderStatus::Accepted => "Accepted",
            OrderStatus::Completed { .. } => "Completed",
            OrderStatus::Expired => "Expired",
            OrderStatus::Canceled => "Canceled",
            OrderStatus::Margin => "Margin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OrderEvent {
    pub handle: OrderHandle,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VenueError {
    Rejected(String),
    Unavailable(String),
}

impl fmt::Display for VenueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VenueError::Rejected(e) => write!(f, "order rejected: {}", e),
            VenueError::Unavailable(e) => write!(f, "venue unavailable: {}", e),
        }
    }
}

impl Error for VenueError {}

/// Order sink. Fill notifications come back through `PairSignalEngine::on_order_event`.
pub trait ExecutionVenue {
    fn submit(&mut self, order: &OrderRequest) -> Result<OrderHandle, VenueError>;
}
