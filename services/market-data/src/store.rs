//! Idempotent price store
//!
//! One current tick per (node, timestamp, market) key. Each entry remembers
//! whether a matching pass completed at it and whether anything downstream
//! (a fill or a settlement bucket) consumed its price, because those two
//! flags decide what a re-delivered tick is allowed to do.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use types::errors::{IngestError, StoreError};
use types::ids::NodeId;
use types::market::{hour_floor, Market, TickKey};
use types::tick::{PriceQuality, PriceTick};

/// What an upsert did to the stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// First value for the key
    Inserted,
    /// Identical value, matching already completed; no side effects
    Duplicate,
    /// Identical value whose earlier matching pass did not complete
    Retry,
    /// Different price at the same quality, never consumed
    Replaced,
    /// Provisional value upgraded to verified
    Revised,
}

impl UpsertOutcome {
    /// Whether the caller should run a matching pass for the key
    pub fn triggers_matching(&self) -> bool {
        !matches!(self, UpsertOutcome::Duplicate)
    }

    /// Whether settlements covering the key must be recomputed
    pub fn triggers_settlement(&self) -> bool {
        !matches!(self, UpsertOutcome::Duplicate | UpsertOutcome::Retry)
    }
}

/// Stored tick plus its downstream flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTick {
    pub tick: PriceTick,
    /// A matching pass completed at this value
    pub matched: bool,
    /// A fill or settlement used this value
    pub consumed: bool,
    /// Number of accepted value changes after the first insert
    pub revision: u32,
    pub ingested_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of an accepted upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upsert {
    pub outcome: UpsertOutcome,
    pub current: StoredTick,
    /// Value that was overwritten, if any
    pub previous: Option<PriceTick>,
}

/// Ingestion counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceStoreStats {
    pub inserted: u64,
    pub duplicates: u64,
    pub retries: u64,
    pub replaced: u64,
    pub revised: u64,
    pub conflicts: u64,
}

#[derive(Debug, Default)]
struct Inner {
    ticks: BTreeMap<TickKey, StoredTick>,
    stats: PriceStoreStats,
}

/// In-memory price store
#[derive(Debug, Default)]
pub struct PriceStore {
    inner: RwLock<Inner>,
}

fn unavailable() -> StoreError {
    StoreError::Unavailable("price store lock poisoned".to_string())
}

fn conflict(existing: &PriceTick, incoming: &PriceTick) -> IngestError {
    IngestError::PriceConflict {
        key: incoming.key().to_string(),
        existing: format!("{} ({:?})", existing.price, existing.quality),
        incoming: format!("{} ({:?})", incoming.price, incoming.quality),
    }
}

impl PriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update the value for the tick's key
    ///
    /// The caller must hold the key's lock for the whole
    /// ingest → match → settle sequence.
    pub fn upsert(&self, tick: PriceTick, now: DateTime<Utc>) -> Result<Upsert, IngestError> {
        let mut inner = self.inner.write().map_err(|_| unavailable())?;
        let key = tick.key();

        let Some(existing) = inner.ticks.get(&key).cloned() else {
            let stored = StoredTick {
                tick,
                matched: false,
                consumed: false,
                revision: 0,
                ingested_at: now,
                updated_at: now,
            };
            inner.ticks.insert(key.clone(), stored.clone());
            inner.stats.inserted += 1;
            info!(key = %key, price = %stored.tick.price, "Tick accepted");
            return Ok(Upsert {
                outcome: UpsertOutcome::Inserted,
                current: stored,
                previous: None,
            });
        };

        if existing.tick.same_value(&tick) {
            let outcome = if existing.matched {
                inner.stats.duplicates += 1;
                debug!(key = %key, "Duplicate tick dropped");
                UpsertOutcome::Duplicate
            } else {
                inner.stats.retries += 1;
                info!(key = %key, "Tick re-delivered before matching completed; retrying");
                UpsertOutcome::Retry
            };
            return Ok(Upsert {
                outcome,
                current: existing,
                previous: None,
            });
        }

        let outcome = match (existing.tick.quality, tick.quality) {
            (PriceQuality::Provisional, PriceQuality::Verified) => UpsertOutcome::Revised,
            (PriceQuality::Verified, PriceQuality::Provisional) => {
                inner.stats.conflicts += 1;
                warn!(key = %key, "Verified price cannot be downgraded to provisional");
                return Err(conflict(&existing.tick, &tick));
            }
            _ if existing.consumed => {
                inner.stats.conflicts += 1;
                warn!(
                    key = %key,
                    existing = %existing.tick.price,
                    incoming = %tick.price,
                    "Conflicting price for a consumed tick"
                );
                return Err(conflict(&existing.tick, &tick));
            }
            _ => UpsertOutcome::Replaced,
        };

        let stored = StoredTick {
            tick,
            // A replaced value has not been matched yet; a revision keeps the
            // completed pass and the consumers that must be recomputed
            matched: existing.matched && outcome == UpsertOutcome::Revised,
            consumed: existing.consumed,
            revision: existing.revision + 1,
            ingested_at: existing.ingested_at,
            updated_at: now,
        };
        inner.ticks.insert(key.clone(), stored.clone());
        match outcome {
            UpsertOutcome::Revised => inner.stats.revised += 1,
            _ => inner.stats.replaced += 1,
        }
        info!(
            key = %key,
            outcome = ?outcome,
            previous = %existing.tick.price,
            price = %stored.tick.price,
            "Tick value changed"
        );

        Ok(Upsert {
            outcome,
            current: stored,
            previous: Some(existing.tick),
        })
    }

    pub fn get(&self, key: &TickKey) -> Option<StoredTick> {
        self.inner.read().ok()?.ticks.get(key).cloned()
    }

    /// Record that a matching pass completed at the key's current value
    pub fn mark_matched(&self, key: &TickKey) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| unavailable())?;
        if let Some(stored) = inner.ticks.get_mut(key) {
            stored.matched = true;
        }
        Ok(())
    }

    /// Record that a fill or settlement used the key's current value
    pub fn mark_consumed(&self, key: &TickKey) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| unavailable())?;
        if let Some(stored) = inner.ticks.get_mut(key) {
            if !stored.consumed {
                debug!(key = %key, "Tick consumed");
            }
            stored.consumed = true;
        }
        Ok(())
    }

    /// Real-time ticks of a node inside the hour starting at `hour_start`
    pub fn real_time_hour(&self, node_id: &NodeId, hour_start: DateTime<Utc>) -> Vec<StoredTick> {
        let start = hour_floor(hour_start);
        let from = TickKey::new(node_id.clone(), start, Market::DayAhead);
        let to = TickKey::new(node_id.clone(), start + TimeDelta::hours(1), Market::DayAhead);

        self.inner
            .read()
            .map(|inner| {
                inner
                    .ticks
                    .range((Bound::Included(from), Bound::Excluded(to)))
                    .filter(|(key, _)| key.market == Market::RealTime)
                    .map(|(_, stored)| stored.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.ticks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> PriceStoreStats {
        self.inner.read().map(|i| i.stats).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use types::numeric::Price;

    fn ts(m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 16, 14, m, 0).unwrap()
    }

    fn rt(m: u32, price: u64) -> PriceTick {
        PriceTick::real_time(NodeId::new("PJM_RTO"), ts(m), Price::from_u64(price))
    }

    #[test]
    fn test_insert_then_duplicate_after_match() {
        let store = PriceStore::new();
        assert_eq!(store.upsert(rt(5, 48), ts(6)).unwrap().outcome, UpsertOutcome::Inserted);
        // Matching has not completed yet: the same tick is a retry
        assert_eq!(store.upsert(rt(5, 48), ts(6)).unwrap().outcome, UpsertOutcome::Retry);

        store.mark_matched(&rt(5, 48).key()).unwrap();
        let dup = store.upsert(rt(5, 48), ts(7)).unwrap();
        assert_eq!(dup.outcome, UpsertOutcome::Duplicate);
        assert!(!dup.outcome.triggers_matching());
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().duplicates, 1);
    }

    #[test]
    fn test_replace_unconsumed_value() {
        let store = PriceStore::new();
        store.upsert(rt(5, 48), ts(6)).unwrap();
        store.mark_matched(&rt(5, 48).key()).unwrap();

        let up = store.upsert(rt(5, 50), ts(7)).unwrap();
        assert_eq!(up.outcome, UpsertOutcome::Replaced);
        assert_eq!(up.previous.unwrap().price, Price::from_u64(48));
        assert!(!up.current.matched);
        assert_eq!(up.current.revision, 1);
    }

    #[test]
    fn test_conflict_on_consumed_value() {
        let store = PriceStore::new();
        store.upsert(rt(5, 48), ts(6)).unwrap();
        store.mark_consumed(&rt(5, 48).key()).unwrap();

        let err = store.upsert(rt(5, 50), ts(7)).unwrap_err();
        assert!(matches!(err, IngestError::PriceConflict { .. }));
        // The consumed value is untouched
        assert_eq!(store.get(&rt(5, 48).key()).unwrap().tick.price, Price::from_u64(48));
        assert_eq!(store.stats().conflicts, 1);
    }

    #[test]
    fn test_verified_revision_accepted_even_if_consumed() {
        let store = PriceStore::new();
        store.upsert(rt(5, 48), ts(6)).unwrap();
        store.mark_matched(&rt(5, 48).key()).unwrap();
        store.mark_consumed(&rt(5, 48).key()).unwrap();

        let verified = rt(5, 47).with_quality(PriceQuality::Verified);
        let up = store.upsert(verified.clone(), ts(8)).unwrap();
        assert_eq!(up.outcome, UpsertOutcome::Revised);
        assert!(up.outcome.triggers_settlement());
        assert!(up.current.consumed);

        // Downgrade back to provisional is refused
        assert!(store.upsert(rt(5, 48), ts(9)).is_err());
        // Re-delivering the verified value is a no-op
        assert_eq!(store.upsert(verified, ts(9)).unwrap().outcome, UpsertOutcome::Duplicate);
    }

    #[test]
    fn test_real_time_hour_range() {
        let store = PriceStore::new();
        for m in (0..60).step_by(5) {
            store.upsert(rt(m, 40 + u64::from(m)), ts(0)).unwrap();
        }
        store
            .upsert(
                PriceTick::day_ahead(NodeId::new("PJM_RTO"), ts(0), Price::from_u64(45)),
                ts(0),
            )
            .unwrap();
        store
            .upsert(
                PriceTick::real_time(
                    NodeId::new("PJM_RTO"),
                    Utc.with_ymd_and_hms(2025, 8, 16, 15, 0, 0).unwrap(),
                    Price::from_u64(1),
                ),
                ts(0),
            )
            .unwrap();
        store
            .upsert(PriceTick::real_time(NodeId::new("OTHER"), ts(5), Price::from_u64(1)), ts(0))
            .unwrap();

        let hour = store.real_time_hour(&NodeId::new("PJM_RTO"), ts(0));
        assert_eq!(hour.len(), 12);
        assert!(hour.iter().all(|s| s.tick.market == Market::RealTime));
        assert_eq!(hour[0].tick.timestamp, ts(0));
        assert_eq!(hour[11].tick.timestamp, ts(55));
    }
}
