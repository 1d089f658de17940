//! Fill records produced by the matching engine
//!
//! One fill per filled order: orders fill in full or not at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{FillId, NodeId, OrderId, TraderId};
use crate::market::Market;
use crate::numeric::{Price, Quantity};
use crate::order::{Order, Side};

/// Which reference price an execution was struck against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecRef {
    /// Day-ahead hourly clearing price
    #[serde(rename = "DA_HOURLY")]
    DaHourly,
    /// Real-time 5-minute LMP
    #[serde(rename = "RT_5M")]
    Rt5m,
}

impl ExecRef {
    pub fn for_market(market: Market) -> Self {
        match market {
            Market::DayAhead => ExecRef::DaHourly,
            Market::RealTime => ExecRef::Rt5m,
        }
    }
}

/// Immutable execution record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub fill_id: FillId,
    pub order_id: OrderId,
    pub trader_id: TraderId,
    pub node_id: NodeId,
    pub market: Market,
    pub side: Side,
    /// Delivery slot (hour start for DA, interval start for RT)
    pub slot: DateTime<Utc>,
    pub filled_price: Price,
    pub filled_quantity: Quantity,
    /// The tick timestamp the fill executed at
    pub execution_timestamp: DateTime<Utc>,
    pub exec_ref: ExecRef,
}

impl Fill {
    /// Build the fill for `order` executing in full at `price`
    pub fn for_order(order: &Order, price: Price, execution_timestamp: DateTime<Utc>) -> Self {
        Self {
            fill_id: FillId::new(),
            order_id: order.order_id,
            trader_id: order.trader_id.clone(),
            node_id: order.node_id.clone(),
            market: order.market,
            side: order.side,
            slot: order.delivery_slot(),
            filled_price: price,
            filled_quantity: order.quantity,
            execution_timestamp,
            exec_ref: ExecRef::for_market(order.market),
        }
    }
}
