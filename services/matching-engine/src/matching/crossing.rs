//! Crossing detection logic
//!
//! Determines whether an order fills at a reference price

use types::numeric::Price;
use types::order::{OrderType, Side};

/// Check if a limit is satisfied by the reference price
///
/// - Buy: reference <= limit
/// - Sell: reference >= limit
pub fn limit_satisfied(side: Side, limit_price: Price, reference_price: Price) -> bool {
    match side {
        Side::Buy => reference_price <= limit_price,
        Side::Sell => reference_price >= limit_price,
    }
}

/// Check if an order fills at `reference_price`
///
/// Market orders always fill. A limit order without a limit price never
/// fills; admission rejects those before they reach the book.
pub fn should_fill(
    order_type: OrderType,
    side: Side,
    limit_price: Option<Price>,
    reference_price: Price,
) -> bool {
    match order_type {
        OrderType::Market => true,
        OrderType::Limit => {
            limit_price.is_some_and(|limit| limit_satisfied(side, limit, reference_price))
        }
    }
}
