//! Market Data Service
//!
//! Price ingestion gateway for the exchange:
//! - `validation`: grid alignment and field checks for incoming ticks
//! - `store`: idempotent one-value-per-key price store with consumption flags
//! - `ingestion`: validate + upsert, batch limits and per-key serialization
//!
//! # Architecture
//!
//! ```text
//! upstream feed (RT 5-min LMP, DA hourly clearing price)
//!        │
//!    ┌───▼──────┐
//!    │Validate  │  ← node id, grid alignment
//!    └───┬──────┘
//!        │  per-key lock held from here
//!    ┌───▼──────┐
//!    │Upsert    │  ← inserted / duplicate / retry / replaced / revised / conflict
//!    └───┬──────┘
//!        │
//!   matching pass → settlement (driven by the gateway)
//! ```

pub mod validation;
pub mod store;
pub mod ingestion;

pub use ingestion::{IngesterConfig, PriceIngester};
pub use store::{PriceStore, PriceStoreStats, StoredTick, Upsert, UpsertOutcome};
