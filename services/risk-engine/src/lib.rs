//! Risk Engine Service
//!
//! Gates order admission upstream of the order book:
//! - `session`: Day-Ahead cutoff clock in the market's civil time zone
//! - `limits`: per-order and per-slot caps
//! - `validator`: individual admission checks
//! - `engine`: ordered composition of the checks

pub mod session;
pub mod limits;
pub mod validator;
pub mod engine;

pub use engine::RiskEngine;
pub use limits::AdmissionLimits;
pub use session::{MarketClock, MarketState, SessionPhase};
