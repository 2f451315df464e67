use crate::estimator::HedgeRatio;
use crate::signal::Signal;
use crate::trade::execution::{
    ExecutionVenue, Instrument, OrderEvent, OrderHandle, OrderRequest, OrderSide, OrderStatus,
    VenueError,
};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::error::Error;
use std::fmt;

const SIZE_DECIMALS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionIntent {
    Flat,
    PendingEntry(Direction),
    Open(Direction),
    PendingExit(Direction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionAction {
    EntrySubmitted(Direction),
    ExitSubmitted(Direction),
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LegOutcome {
    Filled,
    Failed,
}

#[derive(Debug, Clone)]
struct PendingLeg {
    handle: OrderHandle,
    instrument: Instrument,
    side: OrderSide,
    size: Decimal,
    outcome: Option<LegOutcome>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderPlacementError {
    InvalidSize { instrument: Instrument, size: f64 },
    Venue(VenueError),
    Partial {
        submitted: Vec<OrderHandle>,
        source: VenueError,
    },
}

impl fmt::Display for OrderPlacementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderPlacementError::InvalidSize { instrument, size } => {
                write!(f, "invalid order size {} for {:?}", size, instrument)
            }
            OrderPlacementError::Venue(e) => write!(f, "failed to place order pair: {}", e),
            OrderPlacementError::Partial { submitted, source } => write!(
                f,
                "failed to place all legs ({} submitted): {}",
                submitted.len(),
                source
            ),
        }
    }
}

impl Error for OrderPlacementError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            OrderPlacementError::InvalidSize { .. } => None,
            OrderPlacementError::Venue(e) => Some(e),
            OrderPlacementError::Partial { source, .. } => Some(source),
        }
    }
}

/// Tracks the outstanding order legs and the net quantity filled per instrument.
#[derive(Debug, Clone)]
pub struct PositionStateMachine {
    intent: PositionIntent,
    pending: Vec<PendingLeg>,
    exposure: [Decimal; 2],
    unreconciled: bool,
}

impl Default for PositionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionStateMachine {
    pub fn new() -> Self {
        Self {
            intent: PositionIntent::Flat,
            pending: Vec::new(),
            exposure: [Decimal::ZERO; 2],
            unreconciled: false,
        }
    }

    pub fn intent(&self) -> PositionIntent {
        self.intent
    }

    pub fn is_flat(&self) -> bool {
        self.intent == PositionIntent::Flat
    }

    /// Set when a terminal non-fill left the pair partially hedged.
    pub fn is_unreconciled(&self) -> bool {
        self.unreconciled
    }

    /// Net filled quantity in `instrument`, positive when long.
    pub fn exposure(&self, instrument: Instrument) -> Decimal {
        self.exposure[instrument.index()]
    }

    pub fn outstanding(&self) -> Vec<OrderHandle> {
        self.pending
            .iter()
            .filter(|leg| leg.outcome.is_none())
            .map(|leg| leg.handle)
            .collect()
    }

    pub fn apply(
        &mut self,
        signal: Signal,
        hedge: &HedgeRatio,
        venue: &mut dyn ExecutionVenue,
    ) -> Result<PositionAction, OrderPlacementError> {
        match signal {
            Signal::Long => self.enter(Direction::Long, hedge, venue),
            Signal::Short => self.enter(Direction::Short, hedge, venue),
            Signal::Exit => self.exit(venue),
            Signal::Hold => Ok(PositionAction::Ignored),
        }
    }

    fn enter(
        &mut self,
        direction: Direction,
        hedge: &HedgeRatio,
        venue: &mut dyn ExecutionVenue,
    ) -> Result<PositionAction, OrderPlacementError> {
        if self.intent != PositionIntent::Flat {
            log::debug!(
                "[ORDER] {:?} signal ignored; state={:?}",
                direction,
                self.intent
            );
            return Ok(PositionAction::Ignored);
        }

        let size_a = order_size(Instrument::A, hedge.size_a)?;
        let size_b = order_size(Instrument::B, hedge.size_b)?;
        let (side_a, side_b) = match direction {
            Direction::Long => (OrderSide::Buy, OrderSide::Sell),
            Direction::Short => (OrderSide::Sell, OrderSide::Buy),
        };
        log::info!(
            "[ORDER] {:?} PORTFOLIO: {:?} A {} / {:?} B {}",
            direction,
            side_a,
            size_a,
            side_b,
            size_b
        );
        let orders = [
            OrderRequest::market(Instrument::A, side_a, size_a),
            OrderRequest::market(Instrument::B, side_b, size_b),
        ];
        self.unreconciled = false;
        self.submit_pair(&orders, PositionIntent::PendingEntry(direction), venue)?;
        Ok(PositionAction::EntrySubmitted(direction))
    }

    fn exit(&mut self, venue: &mut dyn ExecutionVenue) -> Result<PositionAction, OrderPlacementError> {
        let direction = match self.intent {
            PositionIntent::Open(direction) | PositionIntent::PendingEntry(direction) => direction,
            PositionIntent::Flat | PositionIntent::PendingExit(_) => {
                return Ok(PositionAction::Ignored);
            }
        };

        // Unresolved entry legs are market orders; close them as if they fill and
        // keep tracking them so a late non-fill shows up in the exposure.
        let mut target = self.exposure;
        let in_flight = self.outstanding();
        for leg in self.pending.iter().filter(|leg| leg.outcome.is_none()) {
            target[leg.instrument.index()] += signed(leg.side, leg.size);
        }
        if !in_flight.is_empty() {
            log::warn!(
                "[ORDER] exiting before entry confirmed; closing {:?} as if filled",
                in_flight
            );
        }

        let orders: Vec<OrderRequest> = [Instrument::A, Instrument::B]
            .into_iter()
            .filter(|instrument| !target[instrument.index()].is_zero())
            .map(|instrument| {
                let quantity = target[instrument.index()];
                let side = if quantity > Decimal::ZERO {
                    OrderSide::Sell
                } else {
                    OrderSide::Buy
                };
                OrderRequest::market(instrument, side, quantity.abs())
            })
            .collect();
        if orders.is_empty() {
            log::warn!("[ORDER] exit requested but no legs are held");
            self.settle_flat();
            return Ok(PositionAction::Ignored);
        }

        log::info!("[ORDER] EXITING MARKET ({:?})", direction);
        self.submit_pair(&orders, PositionIntent::PendingExit(direction), venue)?;
        Ok(PositionAction::ExitSubmitted(direction))
    }

    fn submit_pair(
        &mut self,
        orders: &[OrderRequest],
        next: PositionIntent,
        venue: &mut dyn ExecutionVenue,
    ) -> Result<(), OrderPlacementError> {
        let mut legs = Vec::with_capacity(orders.len());
        for order in orders {
            match venue.submit(order) {
                Ok(handle) => legs.push(PendingLeg {
                    handle,
                    instrument: order.instrument,
                    side: order.side,
                    size: order.size,
                    outcome: None,
                }),
                Err(source) if legs.is_empty() => {
                    log::error!("[ORDER] order pair rejected: {}", source);
                    return Err(OrderPlacementError::Venue(source));
                }
                Err(source) => {
                    let submitted: Vec<OrderHandle> = legs.iter().map(|l| l.handle).collect();
                    log::error!(
                        "[ORDER] partial placement, tracking {:?}: {}",
                        submitted,
                        source
                    );
                    self.pending.extend(legs);
                    self.intent = next;
                    self.unreconciled = true;
                    return Err(OrderPlacementError::Partial { submitted, source });
                }
            }
        }
        self.pending.extend(legs);
        self.intent = next;
        Ok(())
    }

    /// Applies a venue notification. Returns the new intent when it changed.
    pub fn on_order_event(&mut self, event: &OrderEvent) -> Option<PositionIntent> {
        let Some(leg) = self
            .pending
            .iter_mut()
            .find(|leg| leg.handle == event.handle && leg.outcome.is_none())
        else {
            if !matches!(
                event.status,
                OrderStatus::Submitted | OrderStatus::Accepted
            ) {
                log::debug!(
                    "[FILL] {} for untracked order {}",
                    event.status.label(),
                    event.handle
                );
            }
            return None;
        };

        match event.status {
            OrderStatus::Submitted | OrderStatus::Accepted => return None,
            OrderStatus::Completed { price, timestamp } => {
                log::info!(
                    "[FILL] {} {:?} {:?} COMPLETE: {} @ {:.4} ({})",
                    event.handle,
                    leg.side,
                    leg.instrument,
                    leg.size,
                    price,
                    timestamp.to_rfc3339()
                );
                leg.outcome = Some(LegOutcome::Filled);
                self.exposure[leg.instrument.index()] += signed(leg.side, leg.size);
            }
            OrderStatus::Expired | OrderStatus::Canceled | OrderStatus::Margin => {
                log::warn!(
                    "[FILL] {} {:?} {:?} {}; not resubmitting",
                    event.handle,
                    leg.side,
                    leg.instrument,
                    event.status.label()
                );
                leg.outcome = Some(LegOutcome::Failed);
            }
        }

        if self.pending.iter().any(|leg| leg.outcome.is_none()) {
            return None;
        }
        let before = self.intent;
        self.settle();
        (self.intent != before).then_some(self.intent)
    }

    fn held_legs(&self) -> usize {
        self.exposure.iter().filter(|q| !q.is_zero()).count()
    }

    fn settle(&mut self) {
        let legs = std::mem::take(&mut self.pending);
        let all_filled = legs
            .iter()
            .all(|leg| leg.outcome == Some(LegOutcome::Filled));
        match self.intent {
            PositionIntent::PendingEntry(direction) => {
                if self.held_legs() == 0 {
                    log::warn!("[POSITION] entry not filled; back to flat");
                    self.settle_flat();
                    return;
                }
                self.intent = PositionIntent::Open(direction);
                if all_filled && !self.unreconciled {
                    log::info!("[POSITION] open {:?}", direction);
                } else {
                    self.unreconciled = true;
                    log::warn!(
                        "[POSITION] open {:?} with {} of 2 legs; needs reconciliation",
                        direction,
                        self.held_legs()
                    );
                }
            }
            PositionIntent::PendingExit(direction) => {
                if self.held_legs() == 0 {
                    log::info!("[POSITION] flat");
                    self.settle_flat();
                } else {
                    self.unreconciled = true;
                    self.intent = PositionIntent::Open(direction);
                    log::warn!(
                        "[POSITION] exit left exposure A={} B={}; needs reconciliation",
                        self.exposure[0],
                        self.exposure[1]
                    );
                }
            }
            PositionIntent::Flat | PositionIntent::Open(_) => {}
        }
    }

    fn settle_flat(&mut self) {
        self.intent = PositionIntent::Flat;
        self.pending.clear();
        self.unreconciled = false;
    }
}

fn signed(side: OrderSide, size: Decimal) -> Decimal {
    match side {
        OrderSide::Buy => size,
        OrderSide::Sell => -size,
    }
}

fn order_size(instrument: Instrument, size: f64) -> Result<Decimal, OrderPlacementError> {
    if !size.is_finite() || size <= 0.0 {
        return Err(OrderPlacementError::InvalidSize { instrument, size });
    }
    Decimal::from_f64(size)
        .map(|d| d.round_dp(SIZE_DECIMALS))
        .filter(|d| *d > Decimal::ZERO)
        .ok_or(OrderPlacementError::InvalidSize { instrument, size })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::execution::testing::RecordingVenue;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn hedge() -> HedgeRatio {
        HedgeRatio {
            alpha: 1.0,
            beta: 0.5,
            size_a: 2.0,
            size_b: 3.0,
        }
    }

    fn completed(handle: OrderHandle) -> OrderEvent {
        OrderEvent {
            handle,
            status: OrderStatus::Completed {
                price: 100.0,
                timestamp: Utc::now(),
            },
        }
    }

    fn failed(handle: OrderHandle, status: OrderStatus) -> OrderEvent {
        OrderEvent { handle, status }
    }

    #[test]
    fn long_entry_buys_a_and_sells_b() {
        let mut venue = RecordingVenue::default();
        let mut sm = PositionStateMachine::new();
        let action = sm.apply(Signal::Long, &hedge(), &mut venue).unwrap();
        assert_eq!(action, PositionAction::EntrySubmitted(Direction::Long));
        assert_eq!(sm.intent(), PositionIntent::PendingEntry(Direction::Long));
        let orders: Vec<_> = venue.orders.iter().map(|(_, o)| o.clone()).collect();
        assert_eq!(
            orders,
            vec![
                OrderRequest::market(Instrument::A, OrderSide::Buy, dec!(2)),
                OrderRequest::market(Instrument::B, OrderSide::Sell, dec!(3)),
            ]
        );
    }

    #[test]
    fn short_entry_sells_a_and_buys_b() {
        let mut venue = RecordingVenue::default();
        let mut sm = PositionStateMachine::new();
        sm.apply(Signal::Short, &hedge(), &mut venue).unwrap();
        assert_eq!(venue.orders[0].1.side, OrderSide::Sell);
        assert_eq!(venue.orders[0].1.instrument, Instrument::A);
        assert_eq!(venue.orders[1].1.side, OrderSide::Buy);
        assert_eq!(venue.orders[1].1.instrument, Instrument::B);
    }

    #[test]
    fn duplicate_entry_while_pending_submits_one_pair() {
        let mut venue = RecordingVenue::default();
        let mut sm = PositionStateMachine::new();
        sm.apply(Signal::Long, &hedge(), &mut venue).unwrap();
        let second = sm.apply(Signal::Long, &hedge(), &mut venue).unwrap();
        let third = sm.apply(Signal::Short, &hedge(), &mut venue).unwrap();
        assert_eq!(second, PositionAction::Ignored);
        assert_eq!(third, PositionAction::Ignored);
        assert_eq!(venue.orders.len(), 2);
    }

    #[test]
    fn exit_while_flat_is_noop() {
        let mut venue = RecordingVenue::default();
        let mut sm = PositionStateMachine::new();
        let action = sm.apply(Signal::Exit, &hedge(), &mut venue).unwrap();
        assert_eq!(action, PositionAction::Ignored);
        assert_eq!(sm.intent(), PositionIntent::Flat);
        assert!(venue.orders.is_empty());
    }

    #[test]
    fn full_cycle_flat_to_flat() {
        let mut venue = RecordingVenue::default();
        let mut sm = PositionStateMachine::new();
        sm.apply(Signal::Long, &hedge(), &mut venue).unwrap();
        let handles = venue.handles();
        assert_eq!(sm.on_order_event(&completed(handles[0])), None);
        assert_eq!(
            sm.on_order_event(&completed(handles[1])),
            Some(PositionIntent::Open(Direction::Long))
        );
        assert!(sm.outstanding().is_empty());

        // entries are blocked while open
        assert_eq!(
            sm.apply(Signal::Short, &hedge(), &mut venue).unwrap(),
            PositionAction::Ignored
        );

        let action = sm.apply(Signal::Exit, &hedge(), &mut venue).unwrap();
        assert_eq!(action, PositionAction::ExitSubmitted(Direction::Long));
        let closes: Vec<_> = venue.orders[2..].iter().map(|(_, o)| o.clone()).collect();
        assert_eq!(
            closes,
            vec![
                OrderRequest::market(Instrument::A, OrderSide::Sell, dec!(2)),
                OrderRequest::market(Instrument::B, OrderSide::Buy, dec!(3)),
            ]
        );
        let handles = venue.handles();
        sm.on_order_event(&completed(handles[2]));
        assert_eq!(
            sm.on_order_event(&completed(handles[3])),
            Some(PositionIntent::Flat)
        );
        assert!(sm.is_flat());
        assert!(!sm.is_unreconciled());
    }

    #[test]
    fn exit_while_pending_entry_closes_both_legs() {
        let mut venue = RecordingVenue::default();
        let mut sm = PositionStateMachine::new();
        sm.apply(Signal::Short, &hedge(), &mut venue).unwrap();
        let action = sm.apply(Signal::Exit, &hedge(), &mut venue).unwrap();
        assert_eq!(action, PositionAction::ExitSubmitted(Direction::Short));
        assert_eq!(sm.intent(), PositionIntent::PendingExit(Direction::Short));
        assert_eq!(venue.orders.len(), 4);
        assert_eq!(venue.orders[2].1.side, OrderSide::Buy);
        assert_eq!(venue.orders[3].1.side, OrderSide::Sell);

        // entry legs stay tracked next to the closes
        let handles = venue.handles();
        assert_eq!(sm.on_order_event(&completed(handles[0])), None);
        assert_eq!(sm.outstanding(), vec![handles[1], handles[2], handles[3]]);
        sm.on_order_event(&completed(handles[1]));
        sm.on_order_event(&completed(handles[2]));
        assert_eq!(
            sm.on_order_event(&completed(handles[3])),
            Some(PositionIntent::Flat)
        );
        assert!(!sm.is_unreconciled());
        assert_eq!(sm.exposure(Instrument::A), Decimal::ZERO);
        assert_eq!(sm.exposure(Instrument::B), Decimal::ZERO);
    }

    #[test]
    fn canceled_entry_after_early_exit_leaves_reversed_exposure() {
        let mut venue = RecordingVenue::default();
        let mut sm = PositionStateMachine::new();
        sm.apply(Signal::Short, &hedge(), &mut venue).unwrap();
        sm.apply(Signal::Exit, &hedge(), &mut venue).unwrap();
        let h = venue.handles();
        assert_eq!(sm.on_order_event(&failed(h[0], OrderStatus::Canceled)), None);
        assert_eq!(sm.on_order_event(&failed(h[1], OrderStatus::Canceled)), None);
        sm.on_order_event(&completed(h[2]));
        assert_eq!(
            sm.on_order_event(&completed(h[3])),
            Some(PositionIntent::Open(Direction::Short))
        );
        assert!(sm.is_unreconciled());
        assert!(!sm.is_flat());
        assert_eq!(sm.exposure(Instrument::A), dec!(2));
        assert_eq!(sm.exposure(Instrument::B), dec!(-3));

        // a second exit unwinds what was actually filled
        sm.apply(Signal::Exit, &hedge(), &mut venue).unwrap();
        let closes: Vec<_> = venue.orders[4..].iter().map(|(_, o)| o.clone()).collect();
        assert_eq!(
            closes,
            vec![
                OrderRequest::market(Instrument::A, OrderSide::Sell, dec!(2)),
                OrderRequest::market(Instrument::B, OrderSide::Buy, dec!(3)),
            ]
        );
        let h = venue.handles();
        sm.on_order_event(&completed(h[4]));
        assert_eq!(
            sm.on_order_event(&completed(h[5])),
            Some(PositionIntent::Flat)
        );
        assert!(!sm.is_unreconciled());
    }

    #[test]
    fn early_exit_skips_entry_leg_already_failed() {
        let mut venue = RecordingVenue::default();
        let mut sm = PositionStateMachine::new();
        sm.apply(Signal::Long, &hedge(), &mut venue).unwrap();
        let h = venue.handles();
        sm.on_order_event(&failed(h[1], OrderStatus::Expired));
        sm.apply(Signal::Exit, &hedge(), &mut venue).unwrap();
        assert_eq!(venue.orders.len(), 3);
        assert_eq!(
            venue.orders[2].1,
            OrderRequest::market(Instrument::A, OrderSide::Sell, dec!(2))
        );
        let h = venue.handles();
        sm.on_order_event(&completed(h[0]));
        assert_eq!(
            sm.on_order_event(&completed(h[2])),
            Some(PositionIntent::Flat)
        );
    }

    #[test]
    fn entry_with_no_fills_returns_to_flat() {
        let mut venue = RecordingVenue::default();
        let mut sm = PositionStateMachine::new();
        sm.apply(Signal::Long, &hedge(), &mut venue).unwrap();
        let handles = venue.handles();
        sm.on_order_event(&failed(handles[0], OrderStatus::Canceled));
        assert_eq!(
            sm.on_order_event(&failed(handles[1], OrderStatus::Expired)),
            Some(PositionIntent::Flat)
        );
        assert!(venue.orders.len() == 2, "terminal outcomes are not resubmitted");
    }

    #[test]
    fn half_filled_entry_is_open_and_unreconciled() {
        let mut venue = RecordingVenue::default();
        let mut sm = PositionStateMachine::new();
        sm.apply(Signal::Long, &hedge(), &mut venue).unwrap();
        let handles = venue.handles();
        sm.on_order_event(&completed(handles[0]));
        assert_eq!(
            sm.on_order_event(&failed(handles[1], OrderStatus::Margin)),
            Some(PositionIntent::Open(Direction::Long))
        );
        assert!(sm.is_unreconciled());

        // exit only closes the leg actually held
        sm.apply(Signal::Exit, &hedge(), &mut venue).unwrap();
        assert_eq!(venue.orders.len(), 3);
        assert_eq!(
            venue.orders[2].1,
            OrderRequest::market(Instrument::A, OrderSide::Sell, dec!(2))
        );
    }

    #[test]
    fn failed_close_leg_stays_open() {
        let mut venue = RecordingVenue::default();
        let mut sm = PositionStateMachine::new();
        sm.apply(Signal::Long, &hedge(), &mut venue).unwrap();
        let h = venue.handles();
        sm.on_order_event(&completed(h[0]));
        sm.on_order_event(&completed(h[1]));
        sm.apply(Signal::Exit, &hedge(), &mut venue).unwrap();
        let h = venue.handles();
        sm.on_order_event(&completed(h[2]));
        assert_eq!(
            sm.on_order_event(&failed(h[3], OrderStatus::Canceled)),
            Some(PositionIntent::Open(Direction::Long))
        );
        assert!(sm.is_unreconciled());
    }

    #[test]
    fn submitted_and_accepted_do_not_resolve_legs() {
        let mut venue = RecordingVenue::default();
        let mut sm = PositionStateMachine::new();
        sm.apply(Signal::Long, &hedge(), &mut venue).unwrap();
        let h = venue.handles();
        for status in [OrderStatus::Submitted, OrderStatus::Accepted] {
            assert_eq!(sm.on_order_event(&OrderEvent { handle: h[0], status }), None);
        }
        assert_eq!(sm.outstanding().len(), 2);
    }

    #[test]
    fn rejected_first_leg_keeps_state() {
        let mut venue = RecordingVenue::failing_on(0);
        let mut sm = PositionStateMachine::new();
        let err = sm.apply(Signal::Long, &hedge(), &mut venue).unwrap_err();
        assert!(matches!(err, OrderPlacementError::Venue(_)));
        assert!(sm.is_flat());
    }

    #[test]
    fn rejected_second_leg_tracks_first() {
        let mut venue = RecordingVenue::failing_on(1);
        let mut sm = PositionStateMachine::new();
        let err = sm.apply(Signal::Long, &hedge(), &mut venue).unwrap_err();
        match err {
            OrderPlacementError::Partial { submitted, .. } => assert_eq!(submitted.len(), 1),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(sm.intent(), PositionIntent::PendingEntry(Direction::Long));
        assert_eq!(sm.outstanding().len(), 1);
    }

    #[test]
    fn negative_size_is_rejected_before_submission() {
        let mut venue = RecordingVenue::default();
        let mut sm = PositionStateMachine::new();
        let bad = HedgeRatio {
            size_b: -1.0,
            ..hedge()
        };
        let err = sm.apply(Signal::Short, &bad, &mut venue).unwrap_err();
        assert!(matches!(
            err,
            OrderPlacementError::InvalidSize {
                instrument: Instrument::B,
                ..
            }
        ));
        assert!(venue.orders.is_empty());
        assert!(sm.is_flat());
    }
}
