//! Price ingestion layer
//!
//! Validates incoming ticks, upserts them into the idempotent price store
//! and hands out the per-key lock that serializes everything downstream of
//! one (node, timestamp, market) key. Ticks for different keys never
//! contend.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{info, warn};
use types::errors::IngestError;
use types::market::TickKey;
use types::tick::PriceTick;

use crate::store::{PriceStore, Upsert};
use crate::validation::validate_tick;

/// Configuration for the price ingester.
#[derive(Debug, Clone)]
pub struct IngesterConfig {
    /// Maximum number of ticks accepted in one batch request.
    pub max_batch_size: usize,
}

impl Default for IngesterConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 2_000,
        }
    }
}

/// Validates ticks, stores them and serializes work per key.
pub struct PriceIngester {
    store: PriceStore,
    key_locks: DashMap<TickKey, Arc<Mutex<()>>>,
    config: IngesterConfig,
}

impl PriceIngester {
    /// Create a new ingester with the given configuration.
    pub fn new(config: IngesterConfig) -> Self {
        info!(max_batch_size = config.max_batch_size, "PriceIngester initialized");
        Self {
            store: PriceStore::new(),
            key_locks: DashMap::new(),
            config,
        }
    }

    /// Create a new ingester with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(IngesterConfig::default())
    }

    pub fn store(&self) -> &PriceStore {
        &self.store
    }

    pub fn config(&self) -> &IngesterConfig {
        &self.config
    }

    /// Run `f` while holding the lock for `key`
    ///
    /// Poisoning is ignored: the lock guards no data.
    pub fn with_key_lock<T>(&self, key: &TickKey, f: impl FnOnce() -> T) -> T {
        let lock = self
            .key_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let result = {
            let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f()
        };
        drop(lock);
        // Last user out removes the entry; the shard lock makes the count exact
        self.key_locks
            .remove_if(key, |_, held| Arc::strong_count(held) == 1);
        result
    }

    /// Validate and upsert one tick
    ///
    /// Callers that go on to match or settle must already hold the key's
    /// lock (see [`PriceIngester::with_key_lock`]).
    pub fn accept(&self, tick: PriceTick, now: DateTime<Utc>) -> Result<Upsert, IngestError> {
        if let Err(err) = validate_tick(&tick) {
            warn!(node_id = %tick.node_id, market = %tick.market, error = %err, "Tick rejected");
            return Err(err);
        }
        self.store.upsert(tick, now)
    }

    /// Refuse batches above the configured size before any tick is applied
    pub fn check_batch(&self, len: usize) -> Result<(), IngestError> {
        if len > self.config.max_batch_size {
            return Err(IngestError::MalformedTick {
                reason: format!(
                    "batch of {} ticks exceeds the limit of {}",
                    len, self.config.max_batch_size
                ),
            });
        }
        Ok(())
    }

    /// Number of keys whose lock is held or awaited
    pub fn tracked_keys(&self) -> usize {
        self.key_locks.len()
    }
}

impl Default for PriceIngester {
    fn default() -> Self {
        Self::with_defaults()
    }
}
