//! Trader capital ledger
//!
//! Capital moves only by the delta a settlement version books against the
//! previous version of the same record, so revisions never double count.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::info;
use types::account::TraderCapital;
use types::ids::TraderId;

/// Capital accounts, created on first use with the starting capital
#[derive(Debug)]
pub struct CapitalLedger {
    starting_capital: Decimal,
    accounts: DashMap<TraderId, TraderCapital>,
}

impl CapitalLedger {
    pub fn new(starting_capital: Decimal) -> Self {
        Self {
            starting_capital,
            accounts: DashMap::new(),
        }
    }

    pub fn starting_capital(&self) -> Decimal {
        self.starting_capital
    }

    /// Apply a settlement delta and return the updated snapshot
    pub fn apply(&self, trader_id: &TraderId, delta: Decimal, at: DateTime<Utc>) -> TraderCapital {
        let mut entry = self
            .accounts
            .entry(trader_id.clone())
            .or_insert_with(|| TraderCapital::new(trader_id.clone(), self.starting_capital, at));
        entry.apply_delta(delta, at);

        info!(
            trader = %trader_id,
            delta = %delta,
            realized_pnl = %entry.realized_pnl,
            capital = %entry.capital(),
            "Capital updated"
        );
        entry.value().clone()
    }

    /// Snapshot; traders never settled show the starting capital
    pub fn snapshot(&self, trader_id: &TraderId, at: DateTime<Utc>) -> TraderCapital {
        self.accounts
            .get(trader_id)
            .map(|c| c.value().clone())
            .unwrap_or_else(|| TraderCapital::new(trader_id.clone(), self.starting_capital, at))
    }
}
