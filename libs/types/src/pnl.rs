//! Settlement records and data-quality classification
//!
//! A day-ahead position is offset against real time bucket by bucket: the
//! n 5-minute buckets with a real-time price each carry q/n MWh, so a
//! complete hour gives q/12 per bucket. Buckets without a price are left out
//! of the sum, never priced at zero. A real-time fill settles as a single bucket at its own price.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{NodeId, OrderId, TraderId};
use crate::market::{Market, BUCKETS_PER_HOUR};
use crate::numeric::{Price, Quantity};
use crate::order::Side;
use crate::tick::PriceQuality;

/// Identifier of the settlement formula used to compute a record
pub const FORMULA_VERSION: &str = "pjm-bucket-v1";

/// Human-readable formula annotation returned with day simulations
pub const FORMULA_ANNOTATION: &str =
    "P&L_H = sum over the n available buckets t of (P_RT,t - P_DA) x (q / n) for buys, (P_DA - P_RT,t) x (q / n) for sells";

/// Data quality label carried by every record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQuality {
    ProvisionalComplete,
    ProvisionalPartial,
    VerifiedComplete,
    VerifiedPartial,
}

impl DataQuality {
    /// Classify from bucket coverage
    ///
    /// Any missing bucket makes the record `provisional_partial` whatever the
    /// grade of the buckets that did arrive.
    pub fn classify(expected: usize, used: usize, verified: usize) -> Self {
        if used < expected {
            DataQuality::ProvisionalPartial
        } else if verified >= expected {
            DataQuality::VerifiedComplete
        } else if verified > 0 {
            DataQuality::VerifiedPartial
        } else {
            DataQuality::ProvisionalComplete
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, DataQuality::ProvisionalComplete | DataQuality::VerifiedComplete)
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, DataQuality::VerifiedComplete | DataQuality::VerifiedPartial)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataQuality::ProvisionalComplete => "provisional_complete",
            DataQuality::ProvisionalPartial => "provisional_partial",
            DataQuality::VerifiedComplete => "verified_complete",
            DataQuality::VerifiedPartial => "verified_partial",
        }
    }
}

impl fmt::Display for DataQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One bucket's contribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketPnl {
    /// 0..12 within the hour
    pub index: usize,
    pub bucket_start: DateTime<Utc>,
    pub rt_price: Price,
    pub quality: PriceQuality,
    /// Notional MWh offset in this bucket
    pub mwh: Decimal,
    /// Unrounded contribution
    pub pnl: Decimal,
}

/// Fields shared by provisional and verified records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub order_id: OrderId,
    pub trader_id: TraderId,
    pub node_id: NodeId,
    pub market: Market,
    pub hour_start: DateTime<Utc>,
    pub side: Side,
    pub quantity: Quantity,
    /// Fill price the buckets are offset against
    pub fill_price: Price,
    pub buckets: Vec<BucketPnl>,
    /// Sum of bucket contributions, rounded to cents
    pub hour_pnl: Decimal,
    /// Buckets that must be present for the record to be complete
    pub expected_buckets: usize,
    pub buckets_used: usize,
    pub verified_buckets: usize,
    /// 1 for the first record of an order, incremented per revision
    pub version: u32,
    pub computed_at: DateTime<Utc>,
    pub formula_version: String,
}

impl Settlement {
    pub fn data_quality(&self) -> DataQuality {
        DataQuality::classify(self.expected_buckets, self.buckets_used, self.verified_buckets)
    }

    /// Whether two settlements carry the same economic content
    pub fn same_outcome(&self, other: &Settlement) -> bool {
        self.buckets == other.buckets && self.hour_pnl == other.hour_pnl
    }
}

/// A versioned settlement record, tagged by grade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record_type", rename_all = "snake_case")]
pub enum PnLRecord {
    Provisional(Settlement),
    Verified(Settlement),
}

impl PnLRecord {
    /// Wrap a computed settlement in the variant its quality implies
    pub fn from_settlement(settlement: Settlement) -> Self {
        if settlement.data_quality().is_verified() {
            PnLRecord::Verified(settlement)
        } else {
            PnLRecord::Provisional(settlement)
        }
    }

    pub fn settlement(&self) -> &Settlement {
        match self {
            PnLRecord::Provisional(s) | PnLRecord::Verified(s) => s,
        }
    }

    pub fn data_quality(&self) -> DataQuality {
        self.settlement().data_quality()
    }

    pub fn hour_pnl(&self) -> Decimal {
        self.settlement().hour_pnl
    }

    pub fn version(&self) -> u32 {
        self.settlement().version
    }

    pub fn order_id(&self) -> OrderId {
        self.settlement().order_id
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, PnLRecord::Verified(_))
    }
}

/// One entry in a record's revision history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub version: u32,
    pub hour_pnl: Decimal,
    pub data_quality: DataQuality,
    /// Change versus the previous version (equals `hour_pnl` for version 1)
    pub delta: Decimal,
    pub computed_at: DateTime<Utc>,
}

/// Expected bucket count for a market's settlement
pub fn expected_buckets(market: Market) -> usize {
    match market {
        Market::DayAhead => BUCKETS_PER_HOUR,
        Market::RealTime => 1,
    }
}
