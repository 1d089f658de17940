//! Event structures for the matching engine
//!
//! Per-order match outcomes returned inline to the ingesting caller, and the
//! stale-pending signal raised by the reconciliation sweep.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use types::fill::ExecRef;
use types::ids::{NodeId, OrderId, TraderId};
use types::market::{Market, TickKey};
use types::numeric::{Price, Quantity};
use types::order::{OrderType, Side, TimeInForce};

/// Outcome of one order in a matching pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Filled,
    Rejected,
    /// Expired before its tick arrived
    Cancelled,
    /// Left `pending` concurrently (e.g. cancelled by the trader); untouched
    Skipped,
}

/// Per-order decision returned by `match_tick`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub order_id: OrderId,
    pub trader_id: TraderId,
    pub side: Side,
    pub order_type: OrderType,
    pub status: MatchStatus,
    pub filled_price: Option<Price>,
    pub filled_quantity: Option<Quantity>,
    pub reason: Option<String>,
    pub exec_ref: ExecRef,
}

impl MatchResult {
    /// Log the decision against the tick that produced it
    pub fn log(&self, key: &TickKey) {
        match self.status {
            MatchStatus::Filled => info!(
                order_id = %self.order_id,
                trader = %self.trader_id,
                tick = %key,
                price = ?self.filled_price,
                quantity = ?self.filled_quantity,
                "Order filled"
            ),
            MatchStatus::Rejected => info!(
                order_id = %self.order_id,
                trader = %self.trader_id,
                tick = %key,
                reason = ?self.reason,
                "Order rejected"
            ),
            MatchStatus::Cancelled => info!(
                order_id = %self.order_id,
                tick = %key,
                "Order expired before evaluation"
            ),
            MatchStatus::Skipped => info!(
                order_id = %self.order_id,
                tick = %key,
                reason = ?self.reason,
                "Order left pending concurrently, skipped"
            ),
        }
    }
}

/// What the sweep did with a stale order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaleAction {
    /// Cancelled with reason `expired`
    Cancelled,
    /// Still pending; surfaced for out-of-band resolution
    Reported,
}

/// Observability signal: a pending order whose slot passed with no tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalePendingOrder {
    pub order_id: OrderId,
    pub trader_id: TraderId,
    pub node_id: NodeId,
    pub market: Market,
    pub slot: DateTime<Utc>,
    pub time_in_force: TimeInForce,
    pub created_at: DateTime<Utc>,
    /// Seconds since the slot ended
    pub overdue_seconds: i64,
    pub action: StaleAction,
}

impl StalePendingOrder {
    pub fn emit(&self) {
        warn!(
            order_id = %self.order_id,
            trader = %self.trader_id,
            node = %self.node_id,
            market = %self.market,
            slot = %self.slot,
            overdue_seconds = self.overdue_seconds,
            action = ?self.action,
            "StalePendingOrder"
        );
    }
}

/// Result of one reconciliation sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Orders cancelled as expired
    pub expired: Vec<OrderId>,
    pub stale: Vec<StalePendingOrder>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.stale.is_empty()
    }
}
