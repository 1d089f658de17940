//! Risk Engine: ordered admission pipeline
//!
//! Structural checks run first so a malformed order is never reported as
//! a closed market, then the session gate, the slot cap and finally the
//! projected-position check.

use chrono::{DateTime, Utc};
use tracing::debug;
use types::errors::AdmissionError;
use types::order::{NewOrder, Order};
use types::position::{Position, PositionKey};

use crate::limits::AdmissionLimits;
use crate::session::{MarketClock, MarketState};
use crate::validator;

/// Admission service combining the session clock and caps
#[derive(Debug, Clone, Default)]
pub struct RiskEngine {
    clock: MarketClock,
    limits: AdmissionLimits,
}

impl RiskEngine {
    pub fn new(clock: MarketClock, limits: AdmissionLimits) -> Self {
        Self { clock, limits }
    }

    pub fn clock(&self) -> &MarketClock {
        &self.clock
    }

    pub fn limits(&self) -> &AdmissionLimits {
        &self.limits
    }

    pub fn market_state(&self, now: DateTime<Utc>) -> MarketState {
        self.clock.market_state(now)
    }

    /// Run every admission check against the request
    ///
    /// `slot_orders` are the trader's existing orders for the same node,
    /// market and delivery slot, in any status.
    pub fn check_admission(
        &self,
        order: &NewOrder,
        slot_orders: &[Order],
        now: DateTime<Utc>,
    ) -> Result<(), AdmissionError> {
        validator::validate_structure(order, &self.limits, now)?;
        validator::check_market_open(order, &self.clock, now)?;
        validator::check_slot_limit(order, slot_orders, &self.limits)?;

        let key = PositionKey {
            trader_id: order.trader_id.clone(),
            node_id: order.node_id.clone(),
            market: order.market,
            slot: order.delivery_slot(),
        };
        let position = Position::from_orders(key, slot_orders);
        validator::check_position(order, &position, &self.limits)?;

        debug!(
            trader = %order.trader_id,
            node = %order.node_id,
            market = %order.market,
            projected = %position.projected(),
            "Order passed admission"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;
    use types::ids::{NodeId, TraderId};
    use types::market::Market;
    use types::numeric::Quantity;
    use types::order::{OrderType, Side, TimeInForce};

    fn request(side: Side) -> NewOrder {
        NewOrder {
            trader_id: TraderId::new("t1"),
            node_id: NodeId::new("PJM_RTO"),
            market: Market::DayAhead,
            hour_start: Utc.with_ymd_and_hms(2025, 8, 17, 14, 0, 0).unwrap(),
            time_slot: None,
            side,
            order_type: OrderType::Market,
            limit_price: None,
            quantity: Quantity::from_str("1").unwrap(),
            time_in_force: TimeInForce::GTC,
            expires_at: None,
        }
    }

    #[test]
    fn test_slot_limit_checked_before_position() {
        let engine = RiskEngine::default();
        let now = Utc.with_ymd_and_hms(2025, 8, 16, 13, 0, 0).unwrap();
        let existing: Vec<Order> = (0..10)
            .map(|i| Order::new(request(Side::Buy), i, now))
            .collect();

        let err = engine.check_admission(&request(Side::Sell), &existing, now).unwrap_err();
        assert!(matches!(err, AdmissionError::SlotLimitExceeded { current: 10, max: 10, .. }));
    }

    #[test]
    fn test_invalid_reported_before_market_closed() {
        let engine = RiskEngine::default();
        let after_cutoff = Utc.with_ymd_and_hms(2025, 8, 16, 16, 0, 0).unwrap();
        let mut order = request(Side::Buy);
        order.order_type = OrderType::Limit;
        let err = engine.check_admission(&order, &[], after_cutoff).unwrap_err();
        assert!(matches!(err, AdmissionError::InvalidOrder(_)));

        let err = engine.check_admission(&request(Side::Buy), &[], after_cutoff).unwrap_err();
        assert!(matches!(err, AdmissionError::MarketClosed { .. }));
    }
}
