//! Matching Engine Service
//!
//! Order book, derived positions and the deterministic per-tick matching
//! pass.
//!
//! **Key Invariants:**
//! - An order leaves `pending` exactly once (compare-and-swap in the store)
//! - Deterministic matching (same orders and price → same decisions)
//! - Filled sells never exceed filled buys per trader and slot
//! - A failed pass changes nothing

pub mod book;
pub mod matching;
pub mod engine;
pub mod events;

pub use book::{BookConfig, InMemoryOrderStore, OrderBook, OrderFilter, OrderStore};
pub use engine::{MatchOutcome, MatchingEngine};
pub use events::{MatchResult, MatchStatus, ReconcileReport, StaleAction, StalePendingOrder};
