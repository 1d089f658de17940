//! Match execution logic
//!
//! Pure evaluation of a tick's eligible orders. Given the same orders,
//! positions and reference price it always yields the same decisions; the
//! tick timestamp is the only clock it reads.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use types::fill::Fill;
use types::ids::TraderId;
use types::numeric::Price;
use types::order::{CancelReason, Order, RejectReason, Side};

use super::crossing;

/// What happens to one order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Fill { price: Price },
    Reject(RejectReason),
    /// `expires_at` reached before the tick
    Expire,
}

/// An order's decision and resulting state
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Order after the transition (not yet committed)
    pub order: Order,
    pub decision: Decision,
    pub fill: Option<Fill>,
}

/// Stateless evaluator
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchExecutor;

impl MatchExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `eligible` (already in priority order) at `reference_price`
    ///
    /// `filled_positions` is each trader's net filled MWh in the slot before
    /// the pass. Sells are re-checked against it so a sell whose supporting
    /// buy did not fill is rejected rather than going short; fills earlier in
    /// the pass update it.
    pub fn evaluate(
        &self,
        eligible: &[Order],
        mut filled_positions: HashMap<TraderId, Decimal>,
        reference_price: Price,
        tick_timestamp: DateTime<Utc>,
    ) -> Vec<Evaluation> {
        let mut evaluations = Vec::with_capacity(eligible.len());

        for order in eligible.iter().filter(|o| o.is_pending()) {
            let decision = if order.is_expired_at(tick_timestamp) {
                Decision::Expire
            } else if !crossing::should_fill(
                order.order_type,
                order.side,
                order.limit_price,
                reference_price,
            ) {
                Decision::Reject(RejectReason::LimitNotMet)
            } else {
                let held = filled_positions
                    .get(&order.trader_id)
                    .copied()
                    .unwrap_or(Decimal::ZERO);
                if order.side == Side::Sell && order.quantity.as_decimal() > held {
                    Decision::Reject(RejectReason::InsufficientPosition)
                } else {
                    Decision::Fill {
                        price: reference_price,
                    }
                }
            };

            let mut next = order.clone();
            let transitioned = match decision {
                Decision::Fill { price } => next.fill(price, tick_timestamp),
                Decision::Reject(reason) => next.reject(reason, tick_timestamp),
                Decision::Expire => next.cancel(CancelReason::Expired, tick_timestamp),
            };
            if transitioned.is_err() {
                continue;
            }

            let fill = match decision {
                Decision::Fill { price } => {
                    *filled_positions
                        .entry(order.trader_id.clone())
                        .or_insert(Decimal::ZERO) += order.side.sign() * order.quantity.as_decimal();
                    Some(Fill::for_order(&next, price, tick_timestamp))
                }
                _ => None,
            };

            evaluations.push(Evaluation {
                order: next,
                decision,
                fill,
            });
        }

        evaluations
    }
}

/// Net filled MWh per trader among `orders`
pub fn filled_positions<'a>(orders: impl IntoIterator<Item = &'a Order>) -> HashMap<TraderId, Decimal> {
    let mut positions: HashMap<TraderId, Decimal> = HashMap::new();
    for order in orders {
        if let (types::order::OrderStatus::Filled, Some(qty)) = (order.status, order.filled_quantity) {
            *positions.entry(order.trader_id.clone()).or_insert(Decimal::ZERO) +=
                order.side.sign() * qty.as_decimal();
        }
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use std::str::FromStr;
    use types::ids::NodeId;
    use types::market::Market;
    use types::numeric::Quantity;
    use types::order::{NewOrder, OrderStatus, OrderType, TimeInForce};

    fn hour() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 17, 14, 0, 0).unwrap()
    }

    fn order(seq: u64, trader: &str, side: Side, qty: &str, limit: Option<&str>) -> Order {
        Order::new(
            NewOrder {
                trader_id: TraderId::new(trader),
                node_id: NodeId::new("PJM_RTO"),
                market: Market::DayAhead,
                hour_start: hour(),
                time_slot: None,
                side,
                order_type: if limit.is_some() { OrderType::Limit } else { OrderType::Market },
                limit_price: limit.map(|l| Price::from_str(l).unwrap()),
                quantity: Quantity::from_str(qty).unwrap(),
                time_in_force: TimeInForce::GTC,
                expires_at: None,
            },
            seq,
            hour() - TimeDelta::hours(20),
        )
    }

    #[test]
    fn test_limit_sell_rejected_below_limit() {
        let mut positions = HashMap::new();
        positions.insert(TraderId::new("t1"), Decimal::from(3));
        let orders = vec![order(1, "t1", Side::Sell, "3.0", Some("55.00"))];

        let evals = MatchExecutor::new().evaluate(&orders, positions, Price::from_str("50.00").unwrap(), hour());
        assert_eq!(evals.len(), 1);
        assert_eq!(evals[0].decision, Decision::Reject(RejectReason::LimitNotMet));
        assert_eq!(evals[0].order.status, OrderStatus::Rejected);
        assert!(evals[0].fill.is_none());
    }

    #[test]
    fn test_buy_fill_supports_later_sell() {
        let orders = vec![
            order(1, "t1", Side::Buy, "2", Some("45")),
            order(2, "t1", Side::Sell, "2", None),
        ];
        let evals = MatchExecutor::new().evaluate(&orders, HashMap::new(), Price::from_u64(40), hour());
        assert!(matches!(evals[0].decision, Decision::Fill { .. }));
        assert!(matches!(evals[1].decision, Decision::Fill { .. }));
    }

    #[test]
    fn test_sell_rejected_when_supporting_buy_misses() {
        let orders = vec![
            order(1, "t1", Side::Buy, "2", Some("35")),
            order(2, "t1", Side::Sell, "2", None),
        ];
        let evals = MatchExecutor::new().evaluate(&orders, HashMap::new(), Price::from_u64(40), hour());
        assert_eq!(evals[0].decision, Decision::Reject(RejectReason::LimitNotMet));
        assert_eq!(evals[1].decision, Decision::Reject(RejectReason::InsufficientPosition));
    }

    #[test]
    fn test_expired_order_cancelled() {
        let mut expiring = order(1, "t1", Side::Buy, "1", None);
        expiring.expires_at = Some(hour());
        let evals = MatchExecutor::new().evaluate(&[expiring], HashMap::new(), Price::from_u64(40), hour());
        assert_eq!(evals[0].decision, Decision::Expire);
        assert_eq!(evals[0].order.status, OrderStatus::Cancelled);
    }

    #[test]
    fn test_filled_positions_fold() {
        let mut buy = order(1, "t1", Side::Buy, "5", None);
        buy.fill(Price::from_u64(40), hour()).unwrap();
        let mut sell = order(2, "t1", Side::Sell, "2", None);
        sell.fill(Price::from_u64(40), hour()).unwrap();
        let pending = order(3, "t1", Side::Buy, "9", None);

        let positions = filled_positions([&buy, &sell, &pending]);
        assert_eq!(positions[&TraderId::new("t1")], Decimal::from(3));
    }
}
