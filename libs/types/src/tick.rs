//! Price ticks delivered by the upstream market-data feed
//!
//! A Day-Ahead tick is the hourly clearing price keyed by hour start; a
//! Real-Time tick is the 5-minute LMP keyed by interval start.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::NodeId;
use crate::market::{Market, TickKey};
use crate::numeric::Price;

/// Settlement grade of a price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceQuality {
    /// Intraday feed value, subject to revision
    Provisional,
    /// T+2 officially reconciled settlement value
    Verified,
}

impl PriceQuality {
    /// Default grade for a market's ticks when the feed does not say
    pub fn default_for(market: Market) -> Self {
        match market {
            Market::DayAhead => PriceQuality::Verified,
            Market::RealTime => PriceQuality::Provisional,
        }
    }
}

/// One price observation for a (node, timestamp, market) key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTick {
    pub node_id: NodeId,
    pub timestamp: DateTime<Utc>,
    pub market: Market,
    pub price: Price,
    pub energy_component: Option<Price>,
    pub congestion_component: Option<Price>,
    pub loss_component: Option<Price>,
    pub quality: PriceQuality,
}

impl PriceTick {
    /// Real-time 5-minute LMP with the feed's default (provisional) grade
    pub fn real_time(node_id: NodeId, timestamp: DateTime<Utc>, lmp: Price) -> Self {
        Self {
            node_id,
            timestamp,
            market: Market::RealTime,
            price: lmp,
            energy_component: None,
            congestion_component: None,
            loss_component: None,
            quality: PriceQuality::Provisional,
        }
    }

    /// Day-ahead hourly clearing price
    pub fn day_ahead(node_id: NodeId, hour_start: DateTime<Utc>, clearing_price: Price) -> Self {
        Self {
            node_id,
            timestamp: hour_start,
            market: Market::DayAhead,
            price: clearing_price,
            energy_component: None,
            congestion_component: None,
            loss_component: None,
            quality: PriceQuality::Verified,
        }
    }

    pub fn with_quality(mut self, quality: PriceQuality) -> Self {
        self.quality = quality;
        self
    }

    pub fn key(&self) -> TickKey {
        TickKey::new(self.node_id.clone(), self.timestamp, self.market)
    }

    /// Same price and grade as `other` (components are informational)
    pub fn same_value(&self, other: &PriceTick) -> bool {
        self.price == other.price && self.quality == other.quality
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    #[test]
    fn test_default_qualities() {
        let ts = Utc.with_ymd_and_hms(2025, 8, 16, 14, 5, 0).unwrap();
        let rt = PriceTick::real_time(NodeId::new("PJM_RTO"), ts, Price::from_str("48.75").unwrap());
        assert_eq!(rt.quality, PriceQuality::Provisional);
        assert_eq!(rt.key().market, Market::RealTime);

        let da = PriceTick::day_ahead(NodeId::new("PJM_RTO"), ts, Price::from_u64(50));
        assert_eq!(da.quality, PriceQuality::default_for(Market::DayAhead));
    }

    #[test]
    fn test_same_value_ignores_components() {
        let ts = Utc.with_ymd_and_hms(2025, 8, 16, 14, 5, 0).unwrap();
        let a = PriceTick::real_time(NodeId::new("N"), ts, Price::from_u64(40));
        let mut b = a.clone();
        b.energy_component = Some(Price::from_u64(39));
        assert!(a.same_value(&b));
        assert!(!a.same_value(&b.clone().with_quality(PriceQuality::Verified)));
    }
}
