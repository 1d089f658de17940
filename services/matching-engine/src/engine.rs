//! Matching engine core
//!
//! Runs one matching pass per price tick: fetch the slot's eligible orders,
//! evaluate them against the tick's reference price, then commit every
//! decision in a single store transaction. A store failure aborts the pass
//! with nothing applied, so re-ingesting the tick is a safe retry.

use std::sync::Arc;

use tracing::{debug, info, warn};
use types::errors::MatchError;
use types::fill::{ExecRef, Fill};
use types::market::TickKey;
use types::numeric::Price;
use types::order::{Order, OrderStatus, RejectReason};

use crate::book::store::CommitBatch;
use crate::book::OrderBook;
use crate::events::{MatchResult, MatchStatus};
use crate::matching::executor::{self, Decision, MatchExecutor};

/// Re-evaluations allowed when orders keep leaving `pending` mid-pass
const MAX_PASS_ATTEMPTS: usize = 16;

/// Everything a matching pass produced
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub key: TickKey,
    pub reference_price: Price,
    pub results: Vec<MatchResult>,
    pub fills: Vec<Fill>,
    /// Orders as committed in `filled` state
    pub filled_orders: Vec<Order>,
}

impl MatchOutcome {
    pub fn filled_count(&self) -> usize {
        self.fills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Main matching engine
pub struct MatchingEngine {
    book: Arc<OrderBook>,
    executor: MatchExecutor,
}

impl MatchingEngine {
    pub fn new(book: Arc<OrderBook>) -> Self {
        Self {
            book,
            executor: MatchExecutor::new(),
        }
    }

    pub fn book(&self) -> &Arc<OrderBook> {
        &self.book
    }

    /// Match every eligible order for `key` at `reference_price`
    ///
    /// Callers must serialize passes per key; different keys may run in
    /// parallel. A sell's decision depends on the buys filled beside it, so
    /// the pass commits all-or-nothing: when an order leaves `pending` after
    /// the snapshot (a cancel or expiry), nothing is applied and the slot is
    /// re-evaluated without it. Such orders are reported as skipped.
    pub fn match_tick(&self, key: &TickKey, reference_price: Price) -> Result<MatchOutcome, MatchError> {
        let failed = |reason: String| MatchError::MatchingFailed {
            key: key.to_string(),
            reason,
        };

        let mut skipped: Vec<(Order, OrderStatus)> = Vec::new();
        let mut attempt = 0;
        let evaluations = loop {
            attempt += 1;
            let slot_orders = self
                .book
                .slot_orders(key)
                .map_err(|e| failed(e.to_string()))?;
            let eligible: Vec<Order> = slot_orders.iter().filter(|o| o.is_pending()).cloned().collect();

            let positions = executor::filled_positions(&slot_orders);
            let evaluations = self
                .executor
                .evaluate(&eligible, positions, reference_price, key.timestamp);

            let batch = CommitBatch::all_or_nothing(
                evaluations.iter().map(|e| e.order.clone()).collect(),
                evaluations.iter().filter_map(|e| e.fill.clone()).collect(),
            );
            let report = match self.book.store().commit(batch) {
                Ok(report) => report,
                Err(err) => {
                    warn!(tick = %key, error = %err, "Matching pass aborted, no order changed");
                    return Err(failed(err.to_string()));
                }
            };
            if report.skipped.is_empty() {
                break evaluations;
            }

            debug!(
                tick = %key,
                attempt,
                conflicts = report.skipped.len(),
                "Orders changed during matching pass, re-evaluating"
            );
            if attempt >= MAX_PASS_ATTEMPTS {
                warn!(tick = %key, attempt, "Matching pass gave up, no order changed");
                return Err(failed(format!(
                    "slot changed during {MAX_PASS_ATTEMPTS} consecutive passes"
                )));
            }
            for (order_id, found) in report.skipped {
                if let Some(e) = evaluations.iter().find(|e| e.order.order_id == order_id) {
                    skipped.push((e.order.clone(), found));
                }
            }
        };

        let exec_ref = ExecRef::for_market(key.market);
        let mut outcome = MatchOutcome {
            key: key.clone(),
            reference_price,
            results: Vec::with_capacity(evaluations.len() + skipped.len()),
            fills: Vec::new(),
            filled_orders: Vec::new(),
        };

        for (order, found) in &skipped {
            outcome.results.push(MatchResult {
                order_id: order.order_id,
                trader_id: order.trader_id.clone(),
                side: order.side,
                order_type: order.order_type,
                status: MatchStatus::Skipped,
                filled_price: None,
                filled_quantity: None,
                reason: Some(format!("order already {}", found)),
                exec_ref,
            });
        }

        for evaluation in evaluations {
            let order = &evaluation.order;
            let result = match evaluation.decision {
                Decision::Fill { price } => {
                    if let Some(fill) = evaluation.fill.clone() {
                        outcome.fills.push(fill);
                    }
                    outcome.filled_orders.push(order.clone());
                    MatchResult {
                        order_id: order.order_id,
                        trader_id: order.trader_id.clone(),
                        side: order.side,
                        order_type: order.order_type,
                        status: MatchStatus::Filled,
                        filled_price: Some(price),
                        filled_quantity: order.filled_quantity,
                        reason: None,
                        exec_ref,
                    }
                }
                Decision::Reject(reason) => MatchResult {
                    order_id: order.order_id,
                    trader_id: order.trader_id.clone(),
                    side: order.side,
                    order_type: order.order_type,
                    status: MatchStatus::Rejected,
                    filled_price: None,
                    filled_quantity: None,
                    reason: Some(reject_message(reason, order, reference_price)),
                    exec_ref,
                },
                Decision::Expire => MatchResult {
                    order_id: order.order_id,
                    trader_id: order.trader_id.clone(),
                    side: order.side,
                    order_type: order.order_type,
                    status: MatchStatus::Cancelled,
                    filled_price: None,
                    filled_quantity: None,
                    reason: Some("expired".to_string()),
                    exec_ref,
                },
            };
            outcome.results.push(result);
        }

        for result in &outcome.results {
            result.log(key);
        }
        info!(
            tick = %key,
            price = %reference_price,
            evaluated = outcome.results.len(),
            filled = outcome.filled_count(),
            "Matching pass committed"
        );
        Ok(outcome)
    }
}

/// Human-readable market-outcome reason
fn reject_message(reason: RejectReason, order: &Order, reference_price: Price) -> String {
    match reason {
        RejectReason::LimitNotMet => format!(
            "LimitNotMet: reference price {} does not satisfy {:?} limit {}",
            reference_price,
            order.side,
            order.limit_price.map(|p| p.to_string()).unwrap_or_default()
        ),
        RejectReason::InsufficientPosition => {
            "InsufficientPosition: supporting buy did not fill".to_string()
        }
    }
}
