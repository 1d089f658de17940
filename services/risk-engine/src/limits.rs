//! Admission caps per market

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::market::Market;

/// Order-count, order-size and position caps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionLimits {
    /// Per trader, node and delivery hour
    pub max_da_orders_per_hour: usize,
    /// Per trader, node and 5-minute slot
    pub max_rt_orders_per_slot: usize,
    pub max_da_quantity_mwh: Decimal,
    pub max_rt_quantity_mwh: Decimal,
    /// Absolute projected net position per slot
    pub max_net_position_mwh: Decimal,
}

impl Default for AdmissionLimits {
    fn default() -> Self {
        Self {
            max_da_orders_per_hour: 10,
            max_rt_orders_per_slot: 50,
            max_da_quantity_mwh: Decimal::from(100),
            max_rt_quantity_mwh: Decimal::from(25),
            max_net_position_mwh: Decimal::from(100),
        }
    }
}

impl AdmissionLimits {
    pub fn max_orders(&self, market: Market) -> usize {
        match market {
            Market::DayAhead => self.max_da_orders_per_hour,
            Market::RealTime => self.max_rt_orders_per_slot,
        }
    }

    pub fn max_quantity(&self, market: Market) -> Decimal {
        match market {
            Market::DayAhead => self.max_da_quantity_mwh,
            Market::RealTime => self.max_rt_quantity_mwh,
        }
    }

    /// Label used in slot-limit rejection messages
    pub fn slot_label(market: Market) -> &'static str {
        match market {
            Market::DayAhead => "Day-Ahead hour",
            Market::RealTime => "Real-Time 5-minute slot",
        }
    }
}
