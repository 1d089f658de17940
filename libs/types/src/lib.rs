//! Types library for the virtual electricity exchange
//!
//! This library provides the core type definitions shared by the price
//! ingestion gateway, the order book, the matching engine and the settlement
//! calculator. Every monetary and energy value is a fixed-point decimal so
//! matching and settlement are reproducible bit for bit.
//!
//! # Modules
//! - `ids`: Unique identifiers (OrderId, FillId, TraderId, NodeId)
//! - `numeric`: Fixed-point decimal types (Price, Quantity)
//! - `market`: Day-Ahead / Real-Time markets and their time grids
//! - `tick`: Price ticks (DA clearing price, RT 5-minute LMP)
//! - `order`: Order lifecycle types
//! - `fill`: Fill records produced by matching
//! - `position`: Derived per-slot net positions
//! - `pnl`: Settlement records and data-quality classification
//! - `account`: Trader capital ledger entries
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod numeric;
pub mod market;
pub mod tick;
pub mod order;
pub mod fill;
pub mod position;
pub mod pnl;
pub mod account;
pub mod errors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::market::*;
    pub use crate::tick::*;
    pub use crate::order::*;
    pub use crate::fill::*;
    pub use crate::position::*;
    pub use crate::pnl::*;
    pub use crate::account::*;
    pub use crate::errors::*;
}
