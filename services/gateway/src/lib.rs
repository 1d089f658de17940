//! Gateway Service
//!
//! HTTP surface of the virtual electricity exchange: price ingestion,
//! order entry, P&L settlement and session state, all served from one
//! in-process [`exchange::Exchange`].

pub mod config;
pub mod error;
pub mod exchange;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;

pub use config::{ConfigError, ExchangeConfig};
pub use exchange::{DaySimulation, Exchange, IngestReport};
pub use router::create_router;
pub use state::AppState;
