//! Versioned settlement records
//!
//! Every promoted version of an order's record is kept. Promotion is a
//! compare-and-swap on the version number, so a record computed from a
//! stale read is refused instead of overwriting a newer one.

use std::collections::HashMap;
use std::sync::RwLock;

use rust_decimal::Decimal;
use types::errors::SettlementError;
use types::ids::OrderId;
use types::pnl::{PnLRecord, Revision};

/// Record history keyed by order
#[derive(Debug, Default)]
pub struct RecordBook {
    history: RwLock<HashMap<OrderId, Vec<PnLRecord>>>,
}

impl RecordBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current (latest promoted) record
    pub fn latest(&self, order_id: &OrderId) -> Option<PnLRecord> {
        self.history
            .read()
            .ok()?
            .get(order_id)
            .and_then(|versions| versions.last().cloned())
    }

    /// All versions, oldest first
    pub fn history(&self, order_id: &OrderId) -> Vec<PnLRecord> {
        self.history
            .read()
            .map(|h| h.get(order_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Version history with the delta each version booked
    pub fn revisions(&self, order_id: &OrderId) -> Vec<Revision> {
        let mut previous = Decimal::ZERO;
        self.history(order_id)
            .into_iter()
            .map(|record| {
                let hour_pnl = record.hour_pnl();
                let revision = Revision {
                    version: record.version(),
                    hour_pnl,
                    data_quality: record.data_quality(),
                    delta: hour_pnl - previous,
                    computed_at: record.settlement().computed_at,
                };
                previous = hour_pnl;
                revision
            })
            .collect()
    }

    /// Promote a fully computed record; returns the delta it books
    ///
    /// The record's version must be exactly one past the current latest.
    pub fn promote(&self, record: PnLRecord) -> Result<Decimal, SettlementError> {
        let mut history = self.history.write().map_err(|_| SettlementError::NotSettleable {
            order_id: record.order_id().to_string(),
            reason: "record store lock poisoned".to_string(),
        })?;
        let versions = history.entry(record.order_id()).or_default();

        let current = versions.last().map(|r| (r.version(), r.hour_pnl()));
        let expected = current.map_or(1, |(v, _)| v + 1);
        if record.version() != expected {
            return Err(SettlementError::NotSettleable {
                order_id: record.order_id().to_string(),
                reason: format!(
                    "stale settlement version {} (expected {})",
                    record.version(),
                    expected
                ),
            });
        }

        let delta = record.hour_pnl() - current.map_or(Decimal::ZERO, |(_, pnl)| pnl);
        versions.push(record);
        Ok(delta)
    }
}
