//! Derived per-slot positions
//!
//! Positions are never stored. They are folded from orders on demand, keyed
//! by trader, node, market and delivery slot.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{NodeId, TraderId};
use crate::market::Market;
use crate::order::{Order, OrderStatus, Side};

/// Aggregation key for a position
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionKey {
    pub trader_id: TraderId,
    pub node_id: NodeId,
    pub market: Market,
    pub slot: DateTime<Utc>,
}

impl PositionKey {
    pub fn of(order: &Order) -> Self {
        Self {
            trader_id: order.trader_id.clone(),
            node_id: order.node_id.clone(),
            market: order.market,
            slot: order.delivery_slot(),
        }
    }
}

/// Filled and pending volume for one key, in MWh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub key: PositionKey,
    pub filled_buys: Decimal,
    pub filled_sells: Decimal,
    pub pending_buys: Decimal,
    pub pending_sells: Decimal,
}

impl Position {
    pub fn empty(key: PositionKey) -> Self {
        Self {
            key,
            filled_buys: Decimal::ZERO,
            filled_sells: Decimal::ZERO,
            pending_buys: Decimal::ZERO,
            pending_sells: Decimal::ZERO,
        }
    }

    /// Fold matching orders into a position; orders for other keys are ignored
    pub fn from_orders<'a>(key: PositionKey, orders: impl IntoIterator<Item = &'a Order>) -> Self {
        let mut position = Self::empty(key);
        for order in orders {
            if PositionKey::of(order) == position.key {
                position.apply(order);
            }
        }
        position
    }

    /// Add one order's contribution
    pub fn apply(&mut self, order: &Order) {
        let qty = match order.status {
            OrderStatus::Filled => order
                .filled_quantity
                .unwrap_or(order.quantity)
                .as_decimal(),
            _ => order.quantity.as_decimal(),
        };
        match (order.status, order.side) {
            (OrderStatus::Filled, Side::Buy) => self.filled_buys += qty,
            (OrderStatus::Filled, Side::Sell) => self.filled_sells += qty,
            (OrderStatus::Pending, Side::Buy) => self.pending_buys += qty,
            (OrderStatus::Pending, Side::Sell) => self.pending_sells += qty,
            _ => {}
        }
    }

    /// Net filled position (buys minus sells)
    pub fn net(&self) -> Decimal {
        self.filled_buys - self.filled_sells
    }

    /// Net position if every pending order filled
    pub fn projected(&self) -> Decimal {
        self.net() + self.pending_buys - self.pending_sells
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::{Price, Quantity};
    use crate::order::{NewOrder, OrderType, TimeInForce};
    use chrono::TimeZone;

    fn order(side: Side, qty: i64) -> Order {
        let hour = Utc.with_ymd_and_hms(2025, 8, 17, 14, 0, 0).unwrap();
        Order::new(
            NewOrder {
                trader_id: TraderId::new("t1"),
                node_id: NodeId::new("PJM_RTO"),
                market: Market::DayAhead,
                hour_start: hour,
                time_slot: None,
                side,
                order_type: OrderType::Market,
                limit_price: None,
                quantity: Quantity::new(Decimal::from(qty)),
                time_in_force: TimeInForce::GTC,
                expires_at: None,
            },
            0,
            hour,
        )
    }

    #[test]
    fn test_projected_includes_pending() {
        let mut buy = order(Side::Buy, 5);
        buy.fill(Price::from_u64(40), buy.created_at).unwrap();
        let sell = order(Side::Sell, 2);
        let mut cancelled = order(Side::Sell, 9);
        cancelled
            .cancel(crate::order::CancelReason::TraderRequested, buy.created_at)
            .unwrap();

        let key = PositionKey::of(&buy);
        let pos = Position::from_orders(key, [&buy, &sell, &cancelled]);
        assert_eq!(pos.net(), Decimal::from(5));
        assert_eq!(pos.projected(), Decimal::from(3));
    }
}
