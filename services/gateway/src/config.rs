//! Service configuration
//!
//! Every value comes from the environment (optionally seeded from a `.env`
//! file) and falls back to a default. Unparseable values are errors rather
//! than silent defaults.

use std::net::SocketAddr;
use std::str::FromStr;

use chrono::TimeDelta;
use matching_engine::BookConfig;
use market_data::IngesterConfig;
use risk_engine::session::ClockError;
use risk_engine::{AdmissionLimits, MarketClock, RiskEngine};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error(transparent)]
    Clock(#[from] ClockError),
}

/// Exchange configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeConfig {
    pub bind_addr: SocketAddr,
    pub market_timezone: String,
    pub cutoff_hour: u32,
    pub cutoff_minute: u32,
    pub limits: AdmissionLimits,
    pub starting_capital: Decimal,
    pub stale_grace_seconds: i64,
    pub max_batch_size: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            market_timezone: "America/New_York".to_string(),
            cutoff_hour: 11,
            cutoff_minute: 0,
            limits: AdmissionLimits::default(),
            starting_capital: Decimal::from(10_000),
            stale_grace_seconds: 900,
            max_batch_size: IngesterConfig::default().max_batch_size,
        }
    }
}

fn read<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        _ => Ok(default),
    }
}

impl ExchangeConfig {
    /// Load from the process environment, reading `.env` first if present
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "Ignoring unreadable .env file");
            }
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let d = Self::default();
        let limits = AdmissionLimits {
            max_da_orders_per_hour: read(&lookup, "MAX_DA_ORDERS_PER_HOUR", d.limits.max_da_orders_per_hour)?,
            max_rt_orders_per_slot: read(&lookup, "MAX_RT_ORDERS_PER_SLOT", d.limits.max_rt_orders_per_slot)?,
            max_da_quantity_mwh: read(&lookup, "MAX_DA_QUANTITY_MWH", d.limits.max_da_quantity_mwh)?,
            max_rt_quantity_mwh: read(&lookup, "MAX_RT_QUANTITY_MWH", d.limits.max_rt_quantity_mwh)?,
            max_net_position_mwh: read(&lookup, "MAX_NET_POSITION_MWH", d.limits.max_net_position_mwh)?,
        };

        let config = Self {
            bind_addr: read(&lookup, "BIND_ADDR", d.bind_addr)?,
            market_timezone: read(&lookup, "MARKET_TIMEZONE", d.market_timezone)?,
            cutoff_hour: read(&lookup, "ORDER_CUTOFF_HOUR", d.cutoff_hour)?,
            cutoff_minute: read(&lookup, "ORDER_CUTOFF_MINUTE", d.cutoff_minute)?,
            limits,
            starting_capital: read(&lookup, "SIM_STARTING_CAPITAL", d.starting_capital)?,
            stale_grace_seconds: read(&lookup, "STALE_PENDING_GRACE_SECONDS", d.stale_grace_seconds)?,
            max_batch_size: read(&lookup, "MAX_INGEST_BATCH_SIZE", d.max_batch_size)?,
        };
        // Fail on a bad zone or cutoff at load time, not at first order
        config.market_clock()?;
        Ok(config)
    }

    pub fn market_clock(&self) -> Result<MarketClock, ClockError> {
        MarketClock::from_zone_name(&self.market_timezone, self.cutoff_hour, self.cutoff_minute)
    }

    pub fn risk_engine(&self) -> Result<RiskEngine, ClockError> {
        Ok(RiskEngine::new(self.market_clock()?, self.limits.clone()))
    }

    pub fn book_config(&self) -> BookConfig {
        BookConfig {
            stale_grace: TimeDelta::seconds(self.stale_grace_seconds),
        }
    }

    pub fn ingester_config(&self) -> IngesterConfig {
        IngesterConfig {
            max_batch_size: self.max_batch_size,
        }
    }
}
