//! P&L calculator
//!
//! Day-ahead fills are offset against real time bucket by bucket:
//!
//! ```text
//! buy:  P&L_t = (P_RT,t - P_DA) × q / n
//! sell: P&L_t = (P_DA - P_RT,t) × q / n
//! ```
//!
//! where n is the number of buckets with a price. A complete hour gives each
//! bucket q/12 MWh; absent buckets are excluded rather than priced at zero,
//! so the hour's P&L is the spread against the average of the real-time
//! prices present, counted in `buckets_used`. Real-time fills settle at
//! their own execution as a single bucket cash flow: a sale receives
//! price × q, a purchase pays it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::errors::SettlementError;
use types::market::{bucket_index, bucket_start, hour_floor, Market, BUCKETS_PER_HOUR};
use types::numeric::{round_cents, Price};
use types::order::{Order, OrderStatus, Side};
use types::pnl::{expected_buckets, BucketPnl, Settlement, FORMULA_VERSION};
use types::tick::PriceQuality;

/// A real-time price for one bucket of an hour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtBucketPrice {
    pub index: usize,
    pub price: Price,
    pub quality: PriceQuality,
}

impl RtBucketPrice {
    /// Bucket price for the 5-minute interval starting at `timestamp`
    pub fn at(timestamp: DateTime<Utc>, price: Price, quality: PriceQuality) -> Self {
        Self {
            index: bucket_index(timestamp),
            price,
            quality,
        }
    }
}

/// Contribution of one bucket carrying `mwh` of a day-ahead position
pub fn bucket_pnl(side: Side, da_price: Price, rt_price: Price, mwh: Decimal) -> Decimal {
    let spread = match side {
        Side::Buy => rt_price.as_decimal() - da_price.as_decimal(),
        Side::Sell => da_price.as_decimal() - rt_price.as_decimal(),
    };
    spread * mwh
}

/// Cash flow of a real-time fill
pub fn real_time_cash_flow(side: Side, price: Price, quantity: Decimal) -> Decimal {
    match side {
        Side::Sell => price.as_decimal() * quantity,
        Side::Buy => -(price.as_decimal() * quantity),
    }
}

fn filled_terms(order: &Order) -> Result<(Price, Decimal), SettlementError> {
    match (order.status, order.filled_price, order.filled_quantity) {
        (OrderStatus::Filled, Some(price), Some(qty)) => Ok((price, qty.as_decimal())),
        _ => Err(SettlementError::NotSettleable {
            order_id: order.order_id.to_string(),
            reason: format!("order is {}, not filled", order.status),
        }),
    }
}

/// Settle a filled day-ahead order against the buckets available
///
/// Later entries for the same bucket index replace earlier ones.
pub fn settle_day_ahead(
    order: &Order,
    buckets: &[RtBucketPrice],
    version: u32,
    computed_at: DateTime<Utc>,
) -> Result<Settlement, SettlementError> {
    if order.market != Market::DayAhead {
        return Err(SettlementError::NotSettleable {
            order_id: order.order_id.to_string(),
            reason: "bucket settlement applies to day-ahead orders".to_string(),
        });
    }
    let (da_price, qty) = filled_terms(order)?;

    let mut by_index: BTreeMap<usize, RtBucketPrice> = BTreeMap::new();
    for bucket in buckets {
        if bucket.index >= BUCKETS_PER_HOUR {
            return Err(SettlementError::BucketOutOfRange { index: bucket.index });
        }
        by_index.insert(bucket.index, *bucket);
    }

    if by_index.is_empty() {
        return Ok(assemble(order, da_price, Vec::new(), version, computed_at));
    }
    let mwh = qty / Decimal::from(by_index.len() as u64);
    let lines: Vec<BucketPnl> = by_index
        .values()
        .map(|b| BucketPnl {
            index: b.index,
            bucket_start: bucket_start(order.hour_start, b.index),
            rt_price: b.price,
            quality: b.quality,
            mwh,
            pnl: bucket_pnl(order.side, da_price, b.price, mwh),
        })
        .collect();

    Ok(assemble(order, da_price, lines, version, computed_at))
}

/// Settle a filled real-time order at its own execution price
pub fn settle_real_time(
    order: &Order,
    quality: PriceQuality,
    version: u32,
    computed_at: DateTime<Utc>,
) -> Result<Settlement, SettlementError> {
    if order.market != Market::RealTime {
        return Err(SettlementError::NotSettleable {
            order_id: order.order_id.to_string(),
            reason: "cash-flow settlement applies to real-time orders".to_string(),
        });
    }
    let (price, qty) = filled_terms(order)?;
    let slot = order.delivery_slot();

    let line = BucketPnl {
        index: bucket_index(slot),
        bucket_start: slot,
        rt_price: price,
        quality,
        mwh: qty,
        pnl: real_time_cash_flow(order.side, price, qty),
    };

    Ok(assemble(order, price, vec![line], version, computed_at))
}

fn assemble(
    order: &Order,
    fill_price: Price,
    buckets: Vec<BucketPnl>,
    version: u32,
    computed_at: DateTime<Utc>,
) -> Settlement {
    let total: Decimal = buckets.iter().map(|b| b.pnl).sum();
    let verified = buckets
        .iter()
        .filter(|b| b.quality == PriceQuality::Verified)
        .count();

    Settlement {
        order_id: order.order_id,
        trader_id: order.trader_id.clone(),
        node_id: order.node_id.clone(),
        market: order.market,
        hour_start: hour_floor(order.hour_start),
        side: order.side,
        quantity: order.filled_quantity.unwrap_or(order.quantity),
        fill_price,
        buckets_used: buckets.len(),
        verified_buckets: verified,
        buckets,
        hour_pnl: round_cents(total),
        expected_buckets: expected_buckets(order.market),
        version,
        computed_at,
        formula_version: FORMULA_VERSION.to_string(),
    }
}
