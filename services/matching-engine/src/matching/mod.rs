//! Matching logic module
//!
//! Each eligible order is evaluated independently against the tick's single
//! reference price, in price-time priority order.

pub mod crossing;
pub mod executor;

pub use crossing::should_fill;
pub use executor::{Decision, Evaluation, MatchExecutor};
