//! Trader capital ledger
//!
//! Invariant: capital = starting_capital + realized_pnl

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::TraderId;
use crate::numeric::round_cents;

/// Capital snapshot for one trader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraderCapital {
    pub trader_id: TraderId,
    pub starting_capital: Decimal,
    pub realized_pnl: Decimal,
    /// Number of deltas applied (new records and revisions)
    pub adjustments: u64,
    pub updated_at: DateTime<Utc>,
}

impl TraderCapital {
    pub fn new(trader_id: TraderId, starting_capital: Decimal, at: DateTime<Utc>) -> Self {
        Self {
            trader_id,
            starting_capital,
            realized_pnl: Decimal::ZERO,
            adjustments: 0,
            updated_at: at,
        }
    }

    pub fn capital(&self) -> Decimal {
        self.starting_capital + self.realized_pnl
    }

    /// Apply a settlement delta (new value minus previously booked value)
    pub fn apply_delta(&mut self, delta: Decimal, at: DateTime<Utc>) {
        self.realized_pnl = round_cents(self.realized_pnl + delta);
        self.adjustments += 1;
        self.updated_at = at;
    }
}
