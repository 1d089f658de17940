//! Order lifecycle types
//!
//! An order is created `pending` and leaves that state exactly once: to
//! `filled` or `rejected` through the matching engine, or to `cancelled`
//! through the trader or the expiry sweep. Terminal states are final.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::OrderError;
use crate::ids::{NodeId, OrderId, TraderId};
use crate::market::Market;
use crate::numeric::{Price, Quantity};

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for buys, -1 for sells
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

/// Execution style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Fills at the reference price unconditionally
    Market,
    /// Fills only if the reference price satisfies `limit_price`
    Limit,
}

/// Time-in-force policy for orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good-Till-Cancel: remains until evaluated or explicitly cancelled
    GTC,
    /// Immediate-Or-Cancel: cancelled once its slot goes stale unevaluated
    IOC,
    /// Good for the market day containing its delivery slot
    DAY,
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Filled,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Filled => "filled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Some(OrderStatus::Pending),
            "filled" => Some(OrderStatus::Filled),
            "rejected" => Some(OrderStatus::Rejected),
            "cancelled" | "canceled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Market-outcome reasons for a `rejected` order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Reference price did not satisfy the limit
    LimitNotMet,
    /// A supporting buy did not fill, so this sell would have gone short
    InsufficientPosition,
}

/// Why an order was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    TraderRequested,
    Expired,
}

/// Order submission request, before the book assigns identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub trader_id: TraderId,
    pub node_id: NodeId,
    pub market: Market,
    pub hour_start: DateTime<Utc>,
    /// Real-time only: the specific 5-minute bucket
    pub time_slot: Option<DateTime<Utc>>,
    pub side: Side,
    pub order_type: OrderType,
    pub limit_price: Option<Price>,
    pub quantity: Quantity,
    pub time_in_force: TimeInForce,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewOrder {
    /// Slot the order is evaluated at: `time_slot` for RT, `hour_start` for DA
    pub fn delivery_slot(&self) -> DateTime<Utc> {
        match self.market {
            Market::RealTime => self.time_slot.unwrap_or(self.hour_start),
            Market::DayAhead => self.hour_start,
        }
    }
}

/// Complete order record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    /// Book-assigned admission sequence, final priority tie-breaker
    pub sequence: u64,
    pub trader_id: TraderId,
    pub node_id: NodeId,
    pub market: Market,
    pub hour_start: DateTime<Utc>,
    pub time_slot: Option<DateTime<Utc>>,
    pub side: Side,
    pub order_type: OrderType,
    pub limit_price: Option<Price>,
    pub quantity: Quantity,
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    pub filled_price: Option<Price>,
    pub filled_quantity: Option<Quantity>,
    pub reject_reason: Option<RejectReason>,
    pub cancel_reason: Option<CancelReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub version: u64, // Optimistic locking
}

impl Order {
    /// Create a new pending order from an admitted request
    pub fn new(request: NewOrder, sequence: u64, created_at: DateTime<Utc>) -> Self {
        let time_slot = match request.market {
            Market::RealTime => Some(request.delivery_slot()),
            Market::DayAhead => None,
        };

        Self {
            order_id: OrderId::new(),
            sequence,
            trader_id: request.trader_id,
            node_id: request.node_id,
            market: request.market,
            hour_start: request.hour_start,
            time_slot,
            side: request.side,
            order_type: request.order_type,
            limit_price: request.limit_price,
            quantity: request.quantity,
            time_in_force: request.time_in_force,
            status: OrderStatus::Pending,
            filled_price: None,
            filled_quantity: None,
            reject_reason: None,
            cancel_reason: None,
            created_at,
            updated_at: created_at,
            expires_at: request.expires_at,
            version: 0,
        }
    }

    /// Slot the order is evaluated at
    pub fn delivery_slot(&self) -> DateTime<Utc> {
        match self.market {
            Market::RealTime => self.time_slot.unwrap_or(self.hour_start),
            Market::DayAhead => self.hour_start,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    /// Price-time priority key: admission time, then admission sequence
    pub fn priority(&self) -> (DateTime<Utc>, u64) {
        (self.created_at, self.sequence)
    }

    /// Whether `expires_at` has been reached at instant `at`
    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= at)
    }

    /// Fill in full at `price`
    pub fn fill(&mut self, price: Price, at: DateTime<Utc>) -> Result<(), OrderError> {
        self.transition(OrderStatus::Filled, at)?;
        self.filled_price = Some(price);
        self.filled_quantity = Some(self.quantity);
        Ok(())
    }

    /// Reject in full with a market-outcome reason
    pub fn reject(&mut self, reason: RejectReason, at: DateTime<Utc>) -> Result<(), OrderError> {
        self.transition(OrderStatus::Rejected, at)?;
        self.reject_reason = Some(reason);
        Ok(())
    }

    /// Cancel; only legal while pending
    pub fn cancel(&mut self, reason: CancelReason, at: DateTime<Utc>) -> Result<(), OrderError> {
        self.transition(OrderStatus::Cancelled, at)?;
        self.cancel_reason = Some(reason);
        Ok(())
    }

    /// Compare-and-swap out of `pending`
    fn transition(&mut self, to: OrderStatus, at: DateTime<Utc>) -> Result<(), OrderError> {
        if self.status != OrderStatus::Pending {
            return Err(OrderError::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = at;
        self.version += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn hour() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 17, 14, 0, 0).unwrap()
    }

    fn request(market: Market, side: Side) -> NewOrder {
        NewOrder {
            trader_id: TraderId::new("demo_user"),
            node_id: NodeId::new("PJM_RTO"),
            market,
            hour_start: hour(),
            time_slot: match market {
                Market::RealTime => Some(hour() + chrono::TimeDelta::minutes(15)),
                Market::DayAhead => None,
            },
            side,
            order_type: OrderType::Limit,
            limit_price: Some(Price::from_str("55.00").unwrap()),
            quantity: Quantity::from_str("3.0").unwrap(),
            time_in_force: TimeInForce::GTC,
            expires_at: None,
        }
    }

    #[test]
    fn test_side_sign() {
        assert_eq!(Side::Buy.sign(), Decimal::ONE);
        assert_eq!(Side::Sell.sign(), Decimal::NEGATIVE_ONE);
    }

    #[test]
    fn test_order_creation() {
        let order = Order::new(request(Market::DayAhead, Side::Sell), 1, hour());
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.delivery_slot(), hour());
        assert!(order.time_slot.is_none());
    }

    #[test]
    fn test_real_time_delivery_slot() {
        let order = Order::new(request(Market::RealTime, Side::Buy), 1, hour());
        assert_eq!(order.delivery_slot(), hour() + chrono::TimeDelta::minutes(15));
    }

    #[test]
    fn test_fill_sets_price_and_quantity() {
        let mut order = Order::new(request(Market::DayAhead, Side::Buy), 1, hour());
        order.fill(Price::from_str("48.00").unwrap(), hour()).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_quantity, Some(order.quantity));
        assert_eq!(order.version, 1);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut order = Order::new(request(Market::DayAhead, Side::Sell), 1, hour());
        order.reject(RejectReason::LimitNotMet, hour()).unwrap();

        let err = order.cancel(CancelReason::TraderRequested, hour()).unwrap_err();
        assert_eq!(
            err,
            OrderError::InvalidStateTransition {
                from: "rejected".into(),
                to: "cancelled".into()
            }
        );
        assert!(order.fill(Price::from_u64(60), hour()).is_err());
        assert_eq!(order.reject_reason, Some(RejectReason::LimitNotMet));
    }

    #[test]
    fn test_expiry_check() {
        let mut order = Order::new(request(Market::DayAhead, Side::Buy), 1, hour());
        assert!(!order.is_expired_at(hour()));
        order.expires_at = Some(hour());
        assert!(order.is_expired_at(hour()));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&OrderStatus::Cancelled).unwrap(), "\"cancelled\"");
        assert_eq!(serde_json::to_string(&TimeInForce::GTC).unwrap(), "\"GTC\"");
        assert_eq!(
            serde_json::to_string(&RejectReason::LimitNotMet).unwrap(),
            "\"limit_not_met\""
        );
        assert_eq!(OrderStatus::parse("canceled"), Some(OrderStatus::Cancelled));
    }
}
