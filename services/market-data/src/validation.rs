//! Tick validation
//!
//! Ticks are checked before they touch the store. Misaligned timestamps are
//! refused, never rounded onto the grid.

use types::errors::IngestError;
use types::market::Market;
use types::tick::PriceTick;

fn malformed(reason: impl Into<String>) -> IngestError {
    IngestError::MalformedTick {
        reason: reason.into(),
    }
}

/// Validate a tick against its market's grid
pub fn validate_tick(tick: &PriceTick) -> Result<(), IngestError> {
    if !tick.node_id.is_valid() {
        return Err(malformed("node_id must not be empty"));
    }

    if !tick.market.is_aligned(tick.timestamp) {
        let grid = match tick.market {
            Market::DayAhead => "an hour boundary",
            Market::RealTime => "a 5-minute boundary",
        };
        return Err(malformed(format!(
            "{} timestamp {} is not on {}",
            tick.market,
            tick.timestamp.to_rfc3339(),
            grid
        )));
    }

    Ok(())
}
