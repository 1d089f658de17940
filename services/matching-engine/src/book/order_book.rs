//! Order book and position store
//!
//! Admits orders through the risk engine, cancels pending orders, serves
//! eligible orders for a tick in priority order and folds positions on
//! demand. Admission is serialized so slot caps and projected positions
//! are checked against a consistent view.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use risk_engine::RiskEngine;
use tracing::{debug, info};
use types::errors::{EngineError, OrderError, StoreError};
use types::fill::Fill;
use types::ids::{NodeId, OrderId, TraderId};
use types::market::{Market, TickKey};
use types::order::{CancelReason, NewOrder, Order, OrderStatus, TimeInForce};
use types::position::{Position, PositionKey};

use super::store::{CommitBatch, OrderStore, SlotKey};
use crate::events::{ReconcileReport, StaleAction, StalePendingOrder};

/// Book configuration
#[derive(Debug, Clone)]
pub struct BookConfig {
    /// Time after a slot ends before a pending order counts as stale
    pub stale_grace: TimeDelta,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            stale_grace: TimeDelta::seconds(900),
        }
    }
}

/// Query filter for `list`
#[derive(Debug, Clone)]
pub struct OrderFilter {
    pub trader_id: Option<TraderId>,
    pub node_id: Option<NodeId>,
    pub market: Option<Market>,
    pub status: Option<OrderStatus>,
    /// UTC calendar day of the delivery slot
    pub date: Option<NaiveDate>,
    pub limit: usize,
}

impl Default for OrderFilter {
    fn default() -> Self {
        Self {
            trader_id: None,
            node_id: None,
            market: None,
            status: None,
            date: None,
            limit: 100,
        }
    }
}

impl OrderFilter {
    fn matches(&self, order: &Order) -> bool {
        self.trader_id.as_ref().map_or(true, |t| &order.trader_id == t)
            && self.node_id.as_ref().map_or(true, |n| &order.node_id == n)
            && self.market.map_or(true, |m| order.market == m)
            && self.status.map_or(true, |s| order.status == s)
            && self
                .date
                .map_or(true, |d| order.delivery_slot().date_naive() == d)
    }
}

/// Order book over a pluggable store
pub struct OrderBook {
    store: Arc<dyn OrderStore>,
    risk: RiskEngine,
    config: BookConfig,
    admission: Mutex<()>,
}

impl OrderBook {
    pub fn new(store: Arc<dyn OrderStore>, risk: RiskEngine, config: BookConfig) -> Self {
        Self {
            store,
            risk,
            config,
            admission: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    pub fn risk(&self) -> &RiskEngine {
        &self.risk
    }

    /// Admit a new order; on success it is stored `pending`
    pub fn submit(&self, request: NewOrder, now: DateTime<Utc>) -> Result<Order, EngineError> {
        let _guard = self
            .admission
            .lock()
            .map_err(|_| StoreError::Unavailable("admission lock poisoned".to_string()))?;

        let slot_key = SlotKey {
            node_id: request.node_id.clone(),
            market: request.market,
            slot: request.delivery_slot(),
        };
        let slot_orders: Vec<Order> = self
            .store
            .slot_orders(&slot_key)?
            .into_iter()
            .filter(|o| o.trader_id == request.trader_id)
            .collect();

        if let Err(err) = self.risk.check_admission(&request, &slot_orders, now) {
            info!(
                trader = %request.trader_id,
                node = %request.node_id,
                market = %request.market,
                error = %err,
                "Order rejected at admission"
            );
            return Err(err.into());
        }

        let order = Order::new(request, self.store.next_sequence(), now);
        self.store.insert(order.clone())?;

        info!(
            order_id = %order.order_id,
            trader = %order.trader_id,
            node = %order.node_id,
            market = %order.market,
            side = ?order.side,
            quantity = %order.quantity,
            slot = %order.delivery_slot(),
            "Order accepted"
        );
        Ok(order)
    }

    /// Cancel a pending order on the trader's request
    pub fn cancel(&self, order_id: &OrderId, now: DateTime<Utc>) -> Result<Order, EngineError> {
        let mut order = self.get(order_id)?;
        order.cancel(CancelReason::TraderRequested, now)?;

        let report = self.store.commit(CommitBatch {
            updates: vec![order.clone()],
            ..Default::default()
        })?;
        if let Some((_, found)) = report.skipped.first() {
            // Lost the race with a matching pass
            return Err(OrderError::InvalidStateTransition {
                from: found.to_string(),
                to: OrderStatus::Cancelled.to_string(),
            }
            .into());
        }

        info!(order_id = %order.order_id, trader = %order.trader_id, "Order cancelled");
        Ok(order)
    }

    pub fn get(&self, order_id: &OrderId) -> Result<Order, EngineError> {
        self.store.get(order_id)?.ok_or_else(|| {
            OrderError::NotFound {
                order_id: order_id.to_string(),
            }
            .into()
        })
    }

    pub fn fill(&self, order_id: &OrderId) -> Result<Option<Fill>, StoreError> {
        self.store.fill(order_id)
    }

    /// Pending orders whose delivery slot is exactly the tick's timestamp
    pub fn eligible_orders(&self, key: &TickKey) -> Result<Vec<Order>, StoreError> {
        let orders = self.store.slot_orders(&SlotKey::for_tick(key))?;
        Ok(orders.into_iter().filter(Order::is_pending).collect())
    }

    /// Every order in the tick's slot, any status, priority order
    pub fn slot_orders(&self, key: &TickKey) -> Result<Vec<Order>, StoreError> {
        self.store.slot_orders(&SlotKey::for_tick(key))
    }

    /// Orders the trader may still place in this order's slot
    pub fn remaining_slots(&self, order: &Order) -> Result<usize, StoreError> {
        let slot_key = SlotKey {
            node_id: order.node_id.clone(),
            market: order.market,
            slot: order.delivery_slot(),
        };
        let used = self
            .store
            .slot_orders(&slot_key)?
            .iter()
            .filter(|o| o.trader_id == order.trader_id && o.status != OrderStatus::Cancelled)
            .count();
        Ok(self.risk.limits().max_orders(order.market).saturating_sub(used))
    }

    pub fn position(&self, key: &PositionKey) -> Result<Position, StoreError> {
        let slot_key = SlotKey {
            node_id: key.node_id.clone(),
            market: key.market,
            slot: key.slot,
        };
        let orders = self.store.slot_orders(&slot_key)?;
        Ok(Position::from_orders(key.clone(), &orders))
    }

    /// Orders matching `filter`, newest first
    pub fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .store
            .all_orders()?
            .into_iter()
            .filter(|o| filter.matches(o))
            .collect();
        orders.sort_by(|a, b| b.priority().cmp(&a.priority()));
        orders.truncate(filter.limit);
        Ok(orders)
    }

    /// Filled orders for a delivery hour on a node (both markets)
    pub fn filled_in_hour(
        &self,
        node_id: &NodeId,
        hour_start: DateTime<Utc>,
    ) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .store
            .all_orders()?
            .into_iter()
            .filter(|o| {
                o.status == OrderStatus::Filled
                    && &o.node_id == node_id
                    && o.hour_start == hour_start
            })
            .collect();
        orders.sort_by_key(Order::priority);
        Ok(orders)
    }

    /// Stale-pending sweep
    ///
    /// Policy:
    /// - `expires_at` reached: cancelled (`expired`), stale or not
    /// - IOC: cancelled once stale
    /// - DAY: cancelled once the market civil day of its slot has ended
    /// - otherwise: reported as `StalePendingOrder` and left pending
    pub fn reconcile(&self, now: DateTime<Utc>) -> Result<ReconcileReport, StoreError> {
        let mut pending: Vec<Order> = self
            .store
            .all_orders()?
            .into_iter()
            .filter(Order::is_pending)
            .collect();
        pending.sort_by_key(Order::priority);

        let mut report = ReconcileReport::default();
        let mut batch = CommitBatch::default();

        for order in pending {
            let slot_end = order.delivery_slot() + order.market.interval();
            let stale = now >= slot_end + self.config.stale_grace;

            let cancel = order.is_expired_at(now)
                || match order.time_in_force {
                    TimeInForce::IOC => stale,
                    TimeInForce::DAY => now >= self.risk.clock().day_end(order.delivery_slot()),
                    TimeInForce::GTC => false,
                };

            if stale {
                let signal = StalePendingOrder {
                    order_id: order.order_id,
                    trader_id: order.trader_id.clone(),
                    node_id: order.node_id.clone(),
                    market: order.market,
                    slot: order.delivery_slot(),
                    time_in_force: order.time_in_force,
                    created_at: order.created_at,
                    overdue_seconds: (now - slot_end).num_seconds(),
                    action: if cancel {
                        StaleAction::Cancelled
                    } else {
                        StaleAction::Reported
                    },
                };
                signal.emit();
                report.stale.push(signal);
            }

            if cancel {
                let mut expired = order;
                if expired.cancel(CancelReason::Expired, now).is_ok() {
                    batch.updates.push(expired);
                }
            }
        }

        if !batch.updates.is_empty() {
            let committed = self.store.commit(batch)?;
            report.expired = committed.applied;
            // Orders that settled concurrently are no longer stale
            report
                .stale
                .retain(|s| !committed.skipped.iter().any(|(id, _)| *id == s.order_id));
        }

        debug!(
            expired = report.expired.len(),
            stale = report.stale.len(),
            "Reconciliation sweep complete"
        );
        Ok(report)
    }
}
