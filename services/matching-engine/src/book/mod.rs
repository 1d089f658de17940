//! Order book module
//!
//! Order storage with atomic per-order status transitions, plus the book
//! façade that admits, cancels, queries and sweeps orders.

pub mod order_book;
pub mod slot_queue;
pub mod store;

pub use order_book::{BookConfig, OrderBook, OrderFilter};
pub use slot_queue::SlotQueue;
pub use store::{CommitBatch, CommitReport, InMemoryOrderStore, OrderStore, SlotKey};
