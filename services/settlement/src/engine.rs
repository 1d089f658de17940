//! Settlement engine
//!
//! Computes a candidate record from scratch, compares it with the current
//! version and promotes it only if the economics changed. The candidate is
//! built completely before promotion; a failure while computing leaves the
//! promoted record and capital untouched. Work on one order is serialized.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use types::account::TraderCapital;
use types::errors::SettlementError;
use types::ids::{NodeId, OrderId, TraderId};
use types::market::{Market, BUCKETS_PER_HOUR};
use types::numeric::round_cents;
use types::order::Order;
use types::pnl::{DataQuality, PnLRecord, Revision, Settlement};
use types::tick::PriceQuality;

use crate::calculator::{self, RtBucketPrice};
use crate::ledger::CapitalLedger;
use crate::records::RecordBook;

/// A newly promoted record and what it did to capital
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementUpdate {
    pub record: PnLRecord,
    /// Previous version's hour P&L, if any
    pub previous_pnl: Option<Decimal>,
    pub delta: Decimal,
    pub capital: TraderCapital,
}

/// All settled orders of one node and delivery hour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourSettlement {
    pub node_id: NodeId,
    pub hour_start: DateTime<Utc>,
    pub records: Vec<PnLRecord>,
    pub hour_pnl: Decimal,
    /// Real-time buckets with a price this hour
    pub buckets_available: usize,
    pub verified_buckets: usize,
    pub data_quality: DataQuality,
    /// Records promoted by this call
    pub updates: Vec<SettlementUpdate>,
}

/// Settlement service
pub struct SettlementEngine {
    records: RecordBook,
    ledger: CapitalLedger,
    order_locks: DashMap<OrderId, Arc<Mutex<()>>>,
}

impl SettlementEngine {
    pub fn new(starting_capital: Decimal) -> Self {
        Self {
            records: RecordBook::new(),
            ledger: CapitalLedger::new(starting_capital),
            order_locks: DashMap::new(),
        }
    }

    pub fn record(&self, order_id: &OrderId) -> Option<PnLRecord> {
        self.records.latest(order_id)
    }

    pub fn revisions(&self, order_id: &OrderId) -> Vec<Revision> {
        self.records.revisions(order_id)
    }

    pub fn history(&self, order_id: &OrderId) -> Vec<PnLRecord> {
        self.records.history(order_id)
    }

    pub fn capital(&self, trader_id: &TraderId, at: DateTime<Utc>) -> TraderCapital {
        self.ledger.snapshot(trader_id, at)
    }

    /// Settle a real-time fill at its own price
    ///
    /// The first call settles the fill; later calls only promote a new
    /// version when the slot's price is upgraded to verified. A verified
    /// record is never downgraded.
    pub fn settle_real_time(
        &self,
        order: &Order,
        quality: PriceQuality,
        now: DateTime<Utc>,
    ) -> Result<Option<SettlementUpdate>, SettlementError> {
        self.with_order_lock(order.order_id, || {
            let current = self.records.latest(&order.order_id);
            if let Some(record) = &current {
                if record.is_verified() || quality != PriceQuality::Verified {
                    return Ok(None);
                }
            }
            let version = current.as_ref().map_or(1, |r| r.version() + 1);
            let candidate = calculator::settle_real_time(order, quality, version, now)?;
            self.promote_if_changed(candidate, current)
        })
    }

    /// Recompute a day-ahead order from the full set of available buckets
    ///
    /// Returns `None` when nothing is available yet or the result equals
    /// the current version.
    pub fn settle_day_ahead(
        &self,
        order: &Order,
        buckets: &[RtBucketPrice],
        now: DateTime<Utc>,
    ) -> Result<Option<SettlementUpdate>, SettlementError> {
        self.settle_day_ahead_with(order, || buckets.to_vec(), now)
    }

    /// Like [`SettlementEngine::settle_day_ahead`], reading the buckets
    /// while the order's lock is held
    ///
    /// Two recomputes of the same order triggered by different ticks can
    /// then never promote a bucket set older than the one already promoted.
    pub fn settle_day_ahead_with(
        &self,
        order: &Order,
        load_buckets: impl FnOnce() -> Vec<RtBucketPrice>,
        now: DateTime<Utc>,
    ) -> Result<Option<SettlementUpdate>, SettlementError> {
        self.with_order_lock(order.order_id, || {
            let buckets = load_buckets();
            if buckets.is_empty() {
                return Ok(None);
            }
            let current = self.records.latest(&order.order_id);
            let version = current.as_ref().map_or(1, |r| r.version() + 1);
            let candidate = calculator::settle_day_ahead(order, &buckets, version, now)?;
            self.promote_if_changed(candidate, current)
        })
    }

    /// Settle every filled order of a node's hour
    ///
    /// Day-ahead orders are recomputed from the hour's buckets as returned
    /// by `load_buckets`; real-time orders are settled once if they have not
    /// been. `rt_quality` supplies the grade of a real-time fill's own tick.
    pub fn settle_hour(
        &self,
        node_id: &NodeId,
        hour_start: DateTime<Utc>,
        filled_orders: &[Order],
        load_buckets: impl Fn() -> Vec<RtBucketPrice>,
        rt_quality: impl Fn(&Order) -> PriceQuality,
        now: DateTime<Utc>,
    ) -> Result<HourSettlement, SettlementError> {
        let mut updates = Vec::new();
        let mut records = Vec::new();

        for order in filled_orders
            .iter()
            .filter(|o| &o.node_id == node_id && o.hour_start == hour_start)
        {
            let update = match order.market {
                Market::DayAhead => self.settle_day_ahead_with(order, &load_buckets, now)?,
                Market::RealTime => self.settle_real_time(order, rt_quality(order), now)?,
            };
            if let Some(update) = update {
                updates.push(update);
            }
            if let Some(record) = self.records.latest(&order.order_id) {
                records.push(record);
            }
        }

        let buckets = load_buckets();
        let verified = buckets
            .iter()
            .filter(|b| b.quality == PriceQuality::Verified)
            .count();
        let hour_pnl = round_cents(records.iter().map(PnLRecord::hour_pnl).sum());

        Ok(HourSettlement {
            node_id: node_id.clone(),
            hour_start,
            hour_pnl,
            buckets_available: buckets.len(),
            verified_buckets: verified,
            data_quality: DataQuality::classify(BUCKETS_PER_HOUR, buckets.len(), verified),
            records,
            updates,
        })
    }

    fn with_order_lock<T>(
        &self,
        order_id: OrderId,
        f: impl FnOnce() -> Result<T, SettlementError>,
    ) -> Result<T, SettlementError> {
        let lock = self
            .order_locks
            .entry(order_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let result = match lock.lock() {
            Ok(_guard) => f(),
            Err(_) => Err(SettlementError::NotSettleable {
                order_id: order_id.to_string(),
                reason: "settlement lock poisoned".to_string(),
            }),
        };
        drop(lock);
        self.order_locks
            .remove_if(&order_id, |_, held| Arc::strong_count(held) == 1);
        result
    }

    fn promote_if_changed(
        &self,
        candidate: Settlement,
        current: Option<PnLRecord>,
    ) -> Result<Option<SettlementUpdate>, SettlementError> {
        if let Some(current) = &current {
            if current.settlement().same_outcome(&candidate) {
                debug!(order_id = %candidate.order_id, "Settlement unchanged");
                return Ok(None);
            }
        }
        self.promote(candidate, current.map(|r| r.hour_pnl())).map(Some)
    }

    fn promote(
        &self,
        candidate: Settlement,
        previous_pnl: Option<Decimal>,
    ) -> Result<SettlementUpdate, SettlementError> {
        let trader_id = candidate.trader_id.clone();
        let computed_at = candidate.computed_at;
        let record = PnLRecord::from_settlement(candidate);
        let delta = self.records.promote(record.clone())?;
        let capital = self.ledger.apply(&trader_id, delta, computed_at);

        info!(
            order_id = %record.order_id(),
            version = record.version(),
            quality = %record.data_quality(),
            hour_pnl = %record.hour_pnl(),
            delta = %delta,
            "Settlement promoted"
        );

        Ok(SettlementUpdate {
            record,
            previous_pnl,
            delta,
            capital,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;
    use types::numeric::{Price, Quantity};
    use types::order::{NewOrder, OrderType, Side, TimeInForce};

    fn hour() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 17, 14, 0, 0).unwrap()
    }

    fn da_buy(qty: &str, price: &str) -> Order {
        let mut order = Order::new(
            NewOrder {
                trader_id: TraderId::new("demo_user"),
                node_id: NodeId::new("PJM_RTO"),
                market: Market::DayAhead,
                hour_start: hour(),
                time_slot: None,
                side: Side::Buy,
                order_type: OrderType::Market,
                limit_price: None,
                quantity: Quantity::from_str(qty).unwrap(),
                time_in_force: TimeInForce::GTC,
                expires_at: None,
            },
            1,
            hour(),
        );
        order.fill(Price::from_str(price).unwrap(), hour()).unwrap();
        order
    }

    fn buckets(price: &str, quality: PriceQuality) -> Vec<RtBucketPrice> {
        (0..12)
            .map(|index| RtBucketPrice {
                index,
                price: Price::from_str(price).unwrap(),
                quality,
            })
            .collect()
    }

    fn uneven(first: &str, last: &str, quality: PriceQuality) -> Vec<RtBucketPrice> {
        let mut b = buckets(first, quality);
        b[11].price = Price::from_str(last).unwrap();
        b
    }

    #[test]
    fn test_revision_delta_and_history() {
        let engine = SettlementEngine::new(Decimal::from(10_000));
        // 12 MWh at 40: each bucket contributes its spread × 1 MWh
        let order = da_buy("12", "40");
        let first = engine
            .settle_day_ahead(&order, &uneven("48", "52", PriceQuality::Provisional), hour())
            .unwrap()
            .unwrap();
        assert_eq!(first.record.hour_pnl(), Decimal::from_str("100.00").unwrap());
        assert!(!first.record.is_verified());

        let second = engine
            .settle_day_ahead(&order, &uneven("47.65", "48", PriceQuality::Verified), hour())
            .unwrap()
            .unwrap();
        assert_eq!(second.record.hour_pnl(), Decimal::from_str("92.15").unwrap());
        assert_eq!(second.delta, Decimal::from_str("-7.85").unwrap());
        assert_eq!(second.previous_pnl, Some(Decimal::from_str("100.00").unwrap()));
        assert!(second.record.is_verified());

        let capital = engine.capital(&order.trader_id, hour());
        assert_eq!(capital.realized_pnl, Decimal::from_str("92.15").unwrap());

        let revisions = engine.revisions(&order.order_id);
        assert_eq!(revisions.len(), 2);
        assert_eq!(revisions[0].data_quality, DataQuality::ProvisionalComplete);
        assert_eq!(revisions[1].delta, Decimal::from_str("-7.85").unwrap());
    }

    #[test]
    fn test_unchanged_recompute_is_noop() {
        let engine = SettlementEngine::new(Decimal::from(10_000));
        let order = da_buy("2.5", "48.00");
        let b = buckets("52.30", PriceQuality::Provisional);
        assert!(engine.settle_day_ahead(&order, &b, hour()).unwrap().is_some());
        assert!(engine.settle_day_ahead(&order, &b, hour()).unwrap().is_none());
        assert_eq!(engine.history(&order.order_id).len(), 1);
        assert_eq!(
            engine.capital(&order.trader_id, hour()).realized_pnl,
            Decimal::from_str("10.75").unwrap()
        );
    }

    #[test]
    fn test_incremental_buckets_build_the_hour() {
        let engine = SettlementEngine::new(Decimal::from(10_000));
        let order = da_buy("2.5", "48.00");
        let all = buckets("52.30", PriceQuality::Provisional);
        for arrived in 1..=12 {
            engine
                .settle_day_ahead_with(&order, || all[..arrived].to_vec(), hour())
                .unwrap();
        }
        let record = engine.record(&order.order_id).unwrap();
        assert_eq!(record.hour_pnl(), Decimal::from_str("10.75").unwrap());
        assert_eq!(record.data_quality(), DataQuality::ProvisionalComplete);
        assert_eq!(record.version(), 12);
        // Capital equals the latest value regardless of how many versions
        assert_eq!(
            engine.capital(&order.trader_id, hour()).realized_pnl,
            Decimal::from_str("10.75").unwrap()
        );
    }

    #[test]
    fn test_failed_recompute_keeps_previous_record() {
        let engine = SettlementEngine::new(Decimal::from(10_000));
        let order = da_buy("1", "40");
        engine
            .settle_day_ahead(&order, &buckets("41", PriceQuality::Provisional), hour())
            .unwrap();

        let mut bad = buckets("1", PriceQuality::Verified);
        bad[0].index = 13;
        let err = engine.settle_day_ahead(&order, &bad, hour());
        assert!(err.is_err());
        assert_eq!(engine.record(&order.order_id).unwrap().version(), 1);
    }

    #[test]
    fn test_settle_hour_aggregates() {
        let engine = SettlementEngine::new(Decimal::from(10_000));
        let a = da_buy("2.5", "48.00");
        let b = da_buy("2.5", "48.00");
        let partial: Vec<RtBucketPrice> = buckets("52.80", PriceQuality::Provisional)
            .into_iter()
            .take(6)
            .collect();

        let hour_result = engine
            .settle_hour(
                &NodeId::new("PJM_RTO"),
                hour(),
                &[a, b],
                || partial.clone(),
                |_| PriceQuality::Provisional,
                hour(),
            )
            .unwrap();
        assert_eq!(hour_result.records.len(), 2);
        assert_eq!(hour_result.updates.len(), 2);
        assert_eq!(hour_result.data_quality, DataQuality::ProvisionalPartial);
        assert_eq!(hour_result.buckets_available, 6);
        // Each order: 6 buckets × 4.80 × 2.5/6 = 12.00
        assert_eq!(hour_result.hour_pnl, Decimal::from_str("24.00").unwrap());
    }

    #[test]
    fn test_real_time_record_upgrades_to_verified() {
        let engine = SettlementEngine::new(Decimal::from(10_000));
        let mut order = Order::new(
            NewOrder {
                trader_id: TraderId::new("demo_user"),
                node_id: NodeId::new("PJM_RTO"),
                market: Market::RealTime,
                hour_start: hour(),
                time_slot: Some(hour() + chrono::TimeDelta::minutes(15)),
                side: Side::Sell,
                order_type: OrderType::Market,
                limit_price: None,
                quantity: Quantity::from_str("2").unwrap(),
                time_in_force: TimeInForce::GTC,
                expires_at: None,
            },
            1,
            hour(),
        );
        order.fill(Price::from_str("48.75").unwrap(), hour()).unwrap();

        let first = engine
            .settle_real_time(&order, PriceQuality::Provisional, hour())
            .unwrap()
            .unwrap();
        assert_eq!(first.record.hour_pnl(), Decimal::from_str("97.50").unwrap());
        assert!(engine
            .settle_real_time(&order, PriceQuality::Provisional, hour())
            .unwrap()
            .is_none());

        let upgraded = engine
            .settle_real_time(&order, PriceQuality::Verified, hour())
            .unwrap()
            .unwrap();
        assert_eq!(upgraded.record.version(), 2);
        assert!(upgraded.delta.is_zero());

        // Never downgraded once verified
        assert!(engine
            .settle_real_time(&order, PriceQuality::Provisional, hour())
            .unwrap()
            .is_none());

        assert!(engine.order_locks.is_empty());

        let history = engine.history(&order.order_id);
        assert_eq!(history.len(), 2);
        assert!(!history[0].is_verified());
        let latest = engine.record(&order.order_id).unwrap();
        assert!(latest.is_verified());
        assert_eq!(latest.data_quality(), DataQuality::VerifiedComplete);
        assert_eq!(
            engine.capital(&order.trader_id, hour()).realized_pnl,
            Decimal::from_str("97.50").unwrap()
        );
    }
}
