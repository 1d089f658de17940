//! Order admission checks
//!
//! Each check returns the first violation it finds as a typed
//! `AdmissionError`. None of them mutate anything.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use types::errors::AdmissionError;
use types::market::{hour_floor, Market};
use types::order::{NewOrder, Order, OrderStatus, OrderType, Side};
use types::position::Position;

use crate::limits::AdmissionLimits;
use crate::session::MarketClock;

/// Structural validity of the request at `now`
///
/// Checks (in order):
/// 1. Limit orders carry a limit price
/// 2. Quantity in (0, market cap]
/// 3. Delivery slot alignment
/// 4. Delivery slot not already started
/// 5. `expires_at`, when given, is in the future
pub fn validate_structure(
    order: &NewOrder,
    limits: &AdmissionLimits,
    now: DateTime<Utc>,
) -> Result<(), AdmissionError> {
    if order.order_type == OrderType::Limit && order.limit_price.is_none() {
        return Err(AdmissionError::InvalidOrder(
            "limit orders require limit_price".to_string(),
        ));
    }

    let qty = order.quantity.as_decimal();
    if qty <= Decimal::ZERO {
        return Err(AdmissionError::InvalidOrder(
            "quantity_mwh must be positive".to_string(),
        ));
    }
    let cap = limits.max_quantity(order.market);
    if qty > cap {
        return Err(AdmissionError::InvalidOrder(format!(
            "quantity_mwh {} exceeds the {} cap of {} MWh",
            qty, order.market, cap
        )));
    }

    if !Market::DayAhead.is_aligned(order.hour_start) {
        return Err(AdmissionError::InvalidOrder(format!(
            "hour_start {} is not on an hour boundary",
            order.hour_start.to_rfc3339()
        )));
    }

    if order.market == Market::RealTime {
        let slot = order.time_slot.ok_or_else(|| {
            AdmissionError::InvalidOrder("real-time orders require time_slot".to_string())
        })?;
        if !Market::RealTime.is_aligned(slot) {
            return Err(AdmissionError::InvalidOrder(format!(
                "time_slot {} is not on a 5-minute boundary",
                slot.to_rfc3339()
            )));
        }
        if hour_floor(slot) != order.hour_start {
            return Err(AdmissionError::InvalidOrder(format!(
                "time_slot {} is outside hour {}",
                slot.to_rfc3339(),
                order.hour_start.to_rfc3339()
            )));
        }
    }

    let slot = order.delivery_slot();
    if slot <= now {
        return Err(AdmissionError::InvalidOrder(format!(
            "delivery slot {} has already started",
            slot.to_rfc3339()
        )));
    }

    if let Some(expires_at) = order.expires_at {
        if expires_at <= now {
            return Err(AdmissionError::InvalidOrder(
                "expires_at must be in the future".to_string(),
            ));
        }
    }

    Ok(())
}

/// Day-Ahead orders are only accepted before the cutoff
pub fn check_market_open(
    order: &NewOrder,
    clock: &MarketClock,
    now: DateTime<Utc>,
) -> Result<(), AdmissionError> {
    if order.market == Market::DayAhead && !clock.da_orders_enabled(now) {
        return Err(AdmissionError::MarketClosed {
            message: clock.closed_message(),
        });
    }
    Ok(())
}

/// Count non-cancelled orders already placed in the same slot
///
/// `slot_orders` must already be filtered to the request's trader, node,
/// market and delivery slot.
pub fn check_slot_limit(
    order: &NewOrder,
    slot_orders: &[Order],
    limits: &AdmissionLimits,
) -> Result<(), AdmissionError> {
    let current = slot_orders
        .iter()
        .filter(|o| o.status != OrderStatus::Cancelled)
        .count();
    let max = limits.max_orders(order.market);
    if current >= max {
        return Err(AdmissionError::SlotLimitExceeded {
            current,
            max,
            slot_label: AdmissionLimits::slot_label(order.market).to_string(),
        });
    }
    Ok(())
}

/// No naked shorts and no oversized net exposure, against the projected position
pub fn check_position(
    order: &NewOrder,
    position: &Position,
    limits: &AdmissionLimits,
) -> Result<(), AdmissionError> {
    let qty = order.quantity.as_decimal();
    let projected = position.projected();

    if order.side == Side::Sell && qty > projected {
        return Err(AdmissionError::InsufficientPosition {
            message: format!(
                "Insufficient position to sell {} MWh: projected position is {} MWh",
                qty,
                projected.max(Decimal::ZERO)
            ),
        });
    }

    let after = projected + order.side.sign() * qty;
    if after.abs() > limits.max_net_position_mwh {
        return Err(AdmissionError::InsufficientPosition {
            message: format!(
                "Projected net position {} MWh exceeds the {} MWh limit",
                after, limits.max_net_position_mwh
            ),
        });
    }

    Ok(())
}
