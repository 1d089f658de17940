//! Settlement Service
//!
//! Turns fills into P&L:
//! - `calculator`: pure bucket formula for day-ahead and real-time fills
//! - `records`: versioned record store (every revision kept for true-ups)
//! - `ledger`: trader capital, moved only by deltas between versions
//! - `engine`: per-order serialized settle / revise / promote

pub mod calculator;
pub mod records;
pub mod ledger;
pub mod engine;

pub use calculator::RtBucketPrice;
pub use engine::{HourSettlement, SettlementEngine, SettlementUpdate};
pub use ledger::CapitalLedger;
pub use records::RecordBook;
