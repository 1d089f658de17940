//! Per-slot priority queue
//!
//! All orders for one (node, market, delivery slot) in price-time priority:
//! admission time first, then the book's admission sequence. Iteration is
//! deterministic because the queue is a BTreeMap over that key.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use types::ids::OrderId;

/// Ordered set of orders sharing one delivery slot
#[derive(Debug, Clone, Default)]
pub struct SlotQueue {
    entries: BTreeMap<(DateTime<Utc>, u64), OrderId>,
}

impl SlotQueue {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Insert an order at its priority position
    pub fn insert(&mut self, priority: (DateTime<Utc>, u64), order_id: OrderId) {
        self.entries.insert(priority, order_id);
    }

    /// Order ids, highest priority first
    pub fn iter(&self) -> impl Iterator<Item = &OrderId> {
        self.entries.values()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
