use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::exchange::Exchange;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    pub exchange: Arc<Exchange>,
    clock: Clock,
}

impl AppState {
    pub fn new(exchange: Arc<Exchange>) -> Self {
        Self::with_clock(exchange, Arc::new(Utc::now))
    }

    /// State with a fixed or scripted wall clock, for tests and replays
    pub fn with_clock(exchange: Arc<Exchange>, clock: Clock) -> Self {
        Self { exchange, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}
