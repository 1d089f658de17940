//! Market session clock
//!
//! Day-Ahead ordering closes at a civil-time cutoff (11:00 America/New_York
//! by default) and reopens at the next local midnight. Real-Time ordering is
//! always open. Every answer is a pure function of the supplied `now`; the
//! cutoff instant is recomputed per query in the zone's local time, so DST
//! changes move it correctly.

use chrono::{DateTime, Days, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    #[error("Unknown time zone: {0}")]
    UnknownTimeZone(String),

    #[error("Invalid cutoff time {hour:02}:{minute:02}")]
    InvalidCutoff { hour: u32, minute: u32 },
}

/// Session state for Day-Ahead ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPhase {
    PreCutoff,
    PostCutoff,
}

/// Answer to "what may be ordered right now"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketState {
    pub phase: SessionPhase,
    pub da_orders_enabled: bool,
    pub rt_orders_enabled: bool,
    /// Instant the phase next changes
    pub next_transition: DateTime<Utc>,
    /// Today's cutoff instant in the market zone
    pub da_cutoff: DateTime<Utc>,
    pub seconds_until_cutoff: i64,
    pub market_date: NaiveDate,
    pub timezone: String,
}

/// Zone-aware Day-Ahead cutoff clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketClock {
    tz: Tz,
    cutoff: NaiveTime,
}

impl Default for MarketClock {
    fn default() -> Self {
        Self {
            tz: chrono_tz::America::New_York,
            cutoff: NaiveTime::from_hms_opt(11, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl MarketClock {
    pub fn new(tz: Tz, cutoff_hour: u32, cutoff_minute: u32) -> Result<Self, ClockError> {
        let cutoff = NaiveTime::from_hms_opt(cutoff_hour, cutoff_minute, 0).ok_or(
            ClockError::InvalidCutoff {
                hour: cutoff_hour,
                minute: cutoff_minute,
            },
        )?;
        Ok(Self { tz, cutoff })
    }

    /// Build from an IANA zone name such as `America/New_York`
    pub fn from_zone_name(name: &str, cutoff_hour: u32, cutoff_minute: u32) -> Result<Self, ClockError> {
        let tz: Tz = name
            .parse()
            .map_err(|_| ClockError::UnknownTimeZone(name.to_string()))?;
        Self::new(tz, cutoff_hour, cutoff_minute)
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Civil date in the market zone containing `at`
    pub fn market_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.tz).date_naive()
    }

    /// Cutoff instant on civil date `date`
    pub fn cutoff_on(&self, date: NaiveDate) -> DateTime<Utc> {
        self.resolve_local(date.and_time(self.cutoff))
    }

    /// First instant of civil date `date`
    pub fn day_start(&self, date: NaiveDate) -> DateTime<Utc> {
        self.resolve_local(date.and_time(NaiveTime::MIN))
    }

    /// First instant after the civil day containing `at`
    pub fn day_end(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let date = self.market_date(at);
        let next = date.checked_add_days(Days::new(1)).unwrap_or(date);
        self.day_start(next)
    }

    /// Session state at `now`
    pub fn market_state(&self, now: DateTime<Utc>) -> MarketState {
        let date = self.market_date(now);
        let da_cutoff = self.cutoff_on(date);

        let (phase, next_transition) = if now < da_cutoff {
            (SessionPhase::PreCutoff, da_cutoff)
        } else {
            (SessionPhase::PostCutoff, self.day_end(now))
        };

        MarketState {
            phase,
            da_orders_enabled: phase == SessionPhase::PreCutoff,
            rt_orders_enabled: true,
            next_transition,
            da_cutoff,
            seconds_until_cutoff: (da_cutoff - now).num_seconds().max(0),
            market_date: date,
            timezone: self.tz.name().to_string(),
        }
    }

    pub fn da_orders_enabled(&self, now: DateTime<Utc>) -> bool {
        now < self.cutoff_on(self.market_date(now))
    }

    /// Rejection text for a Day-Ahead order submitted after the cutoff
    pub fn closed_message(&self) -> String {
        format!(
            "Day-Ahead orders are not allowed after {} {}",
            self.cutoff.format("%-I:%M %p"),
            self.zone_label()
        )
    }

    fn zone_label(&self) -> &'static str {
        match self.tz {
            chrono_tz::America::New_York | chrono_tz::US::Eastern => "ET",
            chrono_tz::America::Chicago | chrono_tz::US::Central => "CT",
            chrono_tz::America::Los_Angeles | chrono_tz::US::Pacific => "PT",
            tz => tz.name(),
        }
    }

    /// Map a local wall time to UTC: the earlier instant when ambiguous,
    /// one hour later when it falls in a spring-forward gap
    fn resolve_local(&self, local: NaiveDateTime) -> DateTime<Utc> {
        match self.tz.from_local_datetime(&local) {
            LocalResult::Single(dt) => dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
            LocalResult::None => {
                let shifted = local + TimeDelta::hours(1);
                self.tz
                    .from_local_datetime(&shifted)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|| Utc.from_utc_datetime(&local))
            }
        }
    }
}
