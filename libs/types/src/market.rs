//! Markets and their delivery time grids
//!
//! Day-Ahead prices clear per delivery hour; Real-Time LMPs settle per
//! 5-minute interval. Twelve 5-minute buckets compose one settlement hour.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::NodeId;

/// Number of 5-minute buckets in a settlement hour
pub const BUCKETS_PER_HOUR: usize = 12;

/// Length of a real-time interval in minutes
pub const RT_INTERVAL_MINUTES: i64 = 5;

/// Market selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Market {
    /// Hourly-cleared forward market with a daily submission cutoff
    #[serde(rename = "day-ahead")]
    DayAhead,
    /// 5-minute settled spot market, always open
    #[serde(rename = "real-time")]
    RealTime,
}

impl Market {
    /// Width of one delivery slot on this market's grid
    pub fn interval(&self) -> TimeDelta {
        match self {
            Market::DayAhead => TimeDelta::hours(1),
            Market::RealTime => TimeDelta::minutes(RT_INTERVAL_MINUTES),
        }
    }

    /// Whether `ts` sits exactly on this market's grid
    pub fn is_aligned(&self, ts: DateTime<Utc>) -> bool {
        ts.timestamp_subsec_nanos() == 0
            && ts.timestamp().rem_euclid(self.interval().num_seconds()) == 0
    }

    /// Short wire label
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::DayAhead => "day-ahead",
            Market::RealTime => "real-time",
        }
    }

    /// Parse a wire label (`day-ahead`/`da`, `real-time`/`rt`)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "day-ahead" | "da" => Some(Market::DayAhead),
            "real-time" | "rt" => Some(Market::RealTime),
            _ => None,
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Truncate to the start of the containing UTC hour
pub fn hour_floor(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts - TimeDelta::seconds(ts.timestamp().rem_euclid(3600))
        - TimeDelta::nanoseconds(i64::from(ts.timestamp_subsec_nanos()))
}

/// Index (0..12) of the 5-minute bucket containing `ts` within its hour
pub fn bucket_index(ts: DateTime<Utc>) -> usize {
    ((ts - hour_floor(ts)).num_minutes() / RT_INTERVAL_MINUTES) as usize
}

/// Start instant of bucket `index` within the hour starting at `hour_start`
pub fn bucket_start(hour_start: DateTime<Utc>, index: usize) -> DateTime<Utc> {
    hour_start + TimeDelta::minutes(RT_INTERVAL_MINUTES * index as i64)
}

/// Natural dedup key of a price tick: one price per node, instant and market
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TickKey {
    pub node_id: NodeId,
    pub timestamp: DateTime<Utc>,
    pub market: Market,
}

impl TickKey {
    pub fn new(node_id: NodeId, timestamp: DateTime<Utc>, market: Market) -> Self {
        Self {
            node_id,
            timestamp,
            market,
        }
    }
}

impl fmt::Display for TickKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.node_id, self.timestamp.to_rfc3339(), self.market)
    }
}
