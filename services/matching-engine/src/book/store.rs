//! Order storage
//!
//! `OrderStore` is the persistence seam of the book. Every status change goes
//! through `commit`, which applies a batch atomically and only to orders that
//! are still `pending` at commit time (compare-and-swap on status). A batch
//! entry whose order already left `pending` is skipped, never overwritten.
//! An all-or-nothing batch applies nothing at all when any entry is skipped.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use types::errors::StoreError;
use types::fill::Fill;
use types::ids::{NodeId, OrderId};
use types::market::{Market, TickKey};
use types::order::{Order, OrderStatus};

use super::slot_queue::SlotQueue;

/// Orders sharing one delivery slot on one node and market
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub node_id: NodeId,
    pub market: Market,
    pub slot: DateTime<Utc>,
}

impl SlotKey {
    pub fn of(order: &Order) -> Self {
        Self {
            node_id: order.node_id.clone(),
            market: order.market,
            slot: order.delivery_slot(),
        }
    }

    /// The slot a price tick evaluates
    pub fn for_tick(key: &TickKey) -> Self {
        Self {
            node_id: key.node_id.clone(),
            market: key.market,
            slot: key.timestamp,
        }
    }
}

/// New order states and fills to apply in one transaction
#[derive(Debug, Clone, Default)]
pub struct CommitBatch {
    pub updates: Vec<Order>,
    pub fills: Vec<Fill>,
    /// Decisions in the batch depend on each other
    pub all_or_nothing: bool,
}

impl CommitBatch {
    pub fn all_or_nothing(updates: Vec<Order>, fills: Vec<Fill>) -> Self {
        Self {
            updates,
            fills,
            all_or_nothing: true,
        }
    }
}

/// What a commit actually changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReport {
    pub applied: Vec<OrderId>,
    /// Orders that were no longer pending, with the status found
    pub skipped: Vec<(OrderId, OrderStatus)>,
}

/// Persistence contract for orders and fills
pub trait OrderStore: Send + Sync {
    /// Monotonic admission sequence
    fn next_sequence(&self) -> u64;

    fn insert(&self, order: Order) -> Result<(), StoreError>;

    fn get(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError>;

    /// All orders for a slot, in priority order
    fn slot_orders(&self, key: &SlotKey) -> Result<Vec<Order>, StoreError>;

    fn all_orders(&self) -> Result<Vec<Order>, StoreError>;

    fn fill(&self, order_id: &OrderId) -> Result<Option<Fill>, StoreError>;

    /// Apply a batch atomically with compare-and-swap from `pending`
    fn commit(&self, batch: CommitBatch) -> Result<CommitReport, StoreError>;
}

#[derive(Debug, Default)]
struct StoreInner {
    orders: HashMap<OrderId, Order>,
    slots: BTreeMap<SlotKey, SlotQueue>,
    fills: HashMap<OrderId, Fill>,
}

/// Process-local store backed by a single lock
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    inner: RwLock<StoreInner>,
    sequence: AtomicU64,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreInner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("order store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreInner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("order store lock poisoned".to_string()))
    }
}

impl OrderStore for InMemoryOrderStore {
    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn insert(&self, order: Order) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        if inner.orders.contains_key(&order.order_id) {
            return Err(StoreError::Duplicate(order.order_id.to_string()));
        }
        inner
            .slots
            .entry(SlotKey::of(&order))
            .or_default()
            .insert(order.priority(), order.order_id);
        inner.orders.insert(order.order_id, order);
        Ok(())
    }

    fn get(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.read()?.orders.get(order_id).cloned())
    }

    fn slot_orders(&self, key: &SlotKey) -> Result<Vec<Order>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .slots
            .get(key)
            .map(|queue| {
                queue
                    .iter()
                    .filter_map(|id| inner.orders.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn all_orders(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self.read()?.orders.values().cloned().collect())
    }

    fn fill(&self, order_id: &OrderId) -> Result<Option<Fill>, StoreError> {
        Ok(self.read()?.fills.get(order_id).cloned())
    }

    fn commit(&self, batch: CommitBatch) -> Result<CommitReport, StoreError> {
        let mut inner = self.write()?;
        let mut report = CommitReport::default();

        // Decide every entry before mutating anything
        for update in &batch.updates {
            match inner.orders.get(&update.order_id) {
                Some(current) if current.status == OrderStatus::Pending => {
                    report.applied.push(update.order_id)
                }
                Some(current) => report.skipped.push((update.order_id, current.status)),
                None => return Err(StoreError::Unavailable(format!(
                    "order {} missing from store",
                    update.order_id
                ))),
            }
        }
        if batch.all_or_nothing && !report.skipped.is_empty() {
            report.applied.clear();
            return Ok(report);
        }

        for update in batch.updates {
            if report.applied.contains(&update.order_id) {
                inner.orders.insert(update.order_id, update);
            }
        }
        for fill in batch.fills {
            if report.applied.contains(&fill.order_id) {
                inner.fills.insert(fill.order_id, fill);
            }
        }

        Ok(report)
    }
}
