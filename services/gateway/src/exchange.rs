//! Exchange composition root
//!
//! Wires price ingestion, the order book, matching and settlement into one
//! synchronous call chain per tick:
//!
//! ```text
//! ingest(tick) ── key lock ──▶ validate + upsert
//!                              ├─▶ match_tick(key, price)       (new / changed / retried value)
//!                              ├─▶ settle fills at this key
//!                              └─▶ re-settle the hour's DA fills (new / changed RT bucket)
//! ```
//!
//! The key lock is held for the whole chain, so two deliveries of the same
//! tick can never race to produce duplicate fills.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use matching_engine::{
    BookConfig, InMemoryOrderStore, MatchOutcome, MatchingEngine, OrderBook, OrderFilter,
    OrderStore, ReconcileReport,
};
use market_data::{IngesterConfig, PriceIngester, UpsertOutcome};
use risk_engine::{MarketState, RiskEngine};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use settlement::{HourSettlement, RtBucketPrice, SettlementEngine, SettlementUpdate};
use tracing::{debug, info, warn};
use types::account::TraderCapital;
use types::errors::{EngineError, OrderError};
use types::ids::{NodeId, OrderId, TraderId};
use types::market::{hour_floor, Market, TickKey};
use types::numeric::round_cents;
use types::order::{NewOrder, Order};
use types::pnl::{PnLRecord, Revision, FORMULA_ANNOTATION, FORMULA_VERSION};
use types::tick::{PriceQuality, PriceTick};

use crate::config::{ConfigError, ExchangeConfig};

/// Everything one tick ingestion did
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub key: TickKey,
    pub outcome: UpsertOutcome,
    pub matching_triggered: bool,
    pub matching: Option<MatchOutcome>,
    /// Settlement records promoted as a consequence of this tick
    pub settlements: Vec<SettlementUpdate>,
}

/// Hour-by-hour P&L for one node and UTC day
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaySimulation {
    pub date: NaiveDate,
    pub node_id: NodeId,
    pub trader_id: Option<TraderId>,
    /// Always 24 entries, hour ending 1..24
    pub hours: Vec<HourSettlement>,
    pub day_total: Decimal,
    pub orders_settled: usize,
    pub formula: String,
    pub formula_version: String,
}

/// The exchange: ingestion → matching → settlement
pub struct Exchange {
    ingester: PriceIngester,
    book: Arc<OrderBook>,
    matching: MatchingEngine,
    settlement: SettlementEngine,
}

impl Exchange {
    pub fn new(config: &ExchangeConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_store(
            Arc::new(InMemoryOrderStore::new()),
            config.risk_engine()?,
            config.book_config(),
            config.ingester_config(),
            config.starting_capital,
        ))
    }

    /// Build over an explicit order store
    pub fn with_store(
        store: Arc<dyn OrderStore>,
        risk: RiskEngine,
        book_config: BookConfig,
        ingester_config: IngesterConfig,
        starting_capital: Decimal,
    ) -> Self {
        let book = Arc::new(OrderBook::new(store, risk, book_config));
        Self {
            ingester: PriceIngester::new(ingester_config),
            matching: MatchingEngine::new(Arc::clone(&book)),
            book,
            settlement: SettlementEngine::new(starting_capital),
        }
    }

    pub fn book(&self) -> &Arc<OrderBook> {
        &self.book
    }

    pub fn ingester(&self) -> &PriceIngester {
        &self.ingester
    }

    pub fn settlement(&self) -> &SettlementEngine {
        &self.settlement
    }

    // ---- prices ----

    /// Ingest one tick and run everything it triggers
    pub fn ingest(&self, tick: PriceTick, now: DateTime<Utc>) -> Result<IngestReport, EngineError> {
        let key = tick.key();
        self.ingester
            .with_key_lock(&key, || self.ingest_locked(key.clone(), tick, now))
    }

    /// Ingest ticks in list order; one failure does not stop the rest
    pub fn ingest_batch(
        &self,
        ticks: Vec<PriceTick>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Result<IngestReport, EngineError>>, EngineError> {
        self.ingester.check_batch(ticks.len())?;
        let results: Vec<_> = ticks.into_iter().map(|t| self.ingest(t, now)).collect();
        info!(
            total = results.len(),
            failed = results.iter().filter(|r| r.is_err()).count(),
            "Batch ingested"
        );
        Ok(results)
    }

    fn ingest_locked(
        &self,
        key: TickKey,
        tick: PriceTick,
        now: DateTime<Utc>,
    ) -> Result<IngestReport, EngineError> {
        let upsert = self.ingester.accept(tick, now)?;
        let current = upsert.current.tick;
        let mut report = IngestReport {
            key: key.clone(),
            outcome: upsert.outcome,
            matching_triggered: false,
            matching: None,
            settlements: Vec::new(),
        };

        if upsert.outcome.triggers_matching() {
            let outcome = self.matching.match_tick(&key, current.price)?;
            report.matching_triggered = true;
            report.matching = Some(outcome);
            // Settles this pass's fills and any left unsettled by an earlier,
            // interrupted delivery of the same tick
            report
                .settlements
                .extend(self.settle_slot(&key, current.quality, now)?);
            self.ingester.store().mark_matched(&key)?;
        }

        if upsert.outcome.triggers_settlement() && key.market == Market::RealTime {
            report
                .settlements
                .extend(self.resettle_day_ahead_hour(&key.node_id, hour_floor(key.timestamp), now)?);
        }

        debug!(
            tick = %key,
            outcome = ?report.outcome,
            fills = report.matching.as_ref().map_or(0, MatchOutcome::filled_count),
            settlements = report.settlements.len(),
            "Tick processed"
        );
        Ok(report)
    }

    /// Settle every filled order whose delivery slot is exactly `key`
    fn settle_slot(
        &self,
        key: &TickKey,
        quality: PriceQuality,
        now: DateTime<Utc>,
    ) -> Result<Vec<SettlementUpdate>, EngineError> {
        let filled: Vec<Order> = self
            .book
            .filled_in_hour(&key.node_id, hour_floor(key.timestamp))?
            .into_iter()
            .filter(|o| o.market == key.market && o.delivery_slot() == key.timestamp)
            .collect();
        if filled.is_empty() {
            return Ok(Vec::new());
        }
        self.ingester.store().mark_consumed(key)?;

        let mut updates = Vec::new();
        for order in &filled {
            let update = match order.market {
                Market::RealTime => self.settlement.settle_real_time(order, quality, now)?,
                Market::DayAhead => self.settle_day_ahead(order, now)?,
            };
            updates.extend(update);
        }
        Ok(updates)
    }

    fn resettle_day_ahead_hour(
        &self,
        node_id: &NodeId,
        hour_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<SettlementUpdate>, EngineError> {
        let mut updates = Vec::new();
        for order in self
            .book
            .filled_in_hour(node_id, hour_start)?
            .iter()
            .filter(|o| o.market == Market::DayAhead)
        {
            updates.extend(self.settle_day_ahead(order, now)?);
        }
        Ok(updates)
    }

    fn settle_day_ahead(
        &self,
        order: &Order,
        now: DateTime<Utc>,
    ) -> Result<Option<SettlementUpdate>, EngineError> {
        let update = self.settlement.settle_day_ahead_with(
            order,
            || self.real_time_buckets(&order.node_id, order.hour_start),
            now,
        )?;
        if let Some(update) = &update {
            self.mark_buckets_consumed(update.record.settlement())?;
        }
        Ok(update)
    }

    fn mark_buckets_consumed(&self, settlement: &types::pnl::Settlement) -> Result<(), EngineError> {
        for bucket in &settlement.buckets {
            let key = TickKey::new(settlement.node_id.clone(), bucket.bucket_start, Market::RealTime);
            self.ingester.store().mark_consumed(&key)?;
        }
        Ok(())
    }

    fn real_time_buckets(&self, node_id: &NodeId, hour_start: DateTime<Utc>) -> Vec<RtBucketPrice> {
        self.ingester
            .store()
            .real_time_hour(node_id, hour_start)
            .into_iter()
            .map(|s| RtBucketPrice::at(s.tick.timestamp, s.tick.price, s.tick.quality))
            .collect()
    }

    fn real_time_quality(&self, order: &Order) -> PriceQuality {
        let key = TickKey::new(order.node_id.clone(), order.delivery_slot(), Market::RealTime);
        self.ingester
            .store()
            .get(&key)
            .map_or(PriceQuality::Provisional, |s| s.tick.quality)
    }

    // ---- orders ----

    pub fn submit_order(&self, request: NewOrder, now: DateTime<Utc>) -> Result<Order, EngineError> {
        self.book.submit(request, now)
    }

    pub fn cancel_order(&self, order_id: &OrderId, now: DateTime<Utc>) -> Result<Order, EngineError> {
        self.book.cancel(order_id, now)
    }

    pub fn order(&self, order_id: &OrderId) -> Result<Order, EngineError> {
        self.book.get(order_id)
    }

    pub fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, EngineError> {
        Ok(self.book.list(filter)?)
    }

    /// Stale-pending sweep over the whole book
    pub fn reconcile(&self, now: DateTime<Utc>) -> Result<ReconcileReport, EngineError> {
        let report = self.book.reconcile(now)?;
        if !report.is_empty() {
            warn!(
                expired = report.expired.len(),
                stale = report.stale.len(),
                "Reconciliation found stale pending orders"
            );
        }
        Ok(report)
    }

    pub fn market_state(&self, now: DateTime<Utc>) -> MarketState {
        self.book.risk().market_state(now)
    }

    // ---- P&L ----

    /// Latest settlement record of an order, `None` while unsettled
    pub fn order_pnl(&self, order_id: &OrderId) -> Result<Option<PnLRecord>, EngineError> {
        self.book.get(order_id)?;
        Ok(self.settlement.record(order_id))
    }

    pub fn revisions(&self, order_id: &OrderId) -> Result<Vec<Revision>, EngineError> {
        self.book.get(order_id)?;
        Ok(self.settlement.revisions(order_id))
    }

    pub fn capital(&self, trader_id: &TraderId, now: DateTime<Utc>) -> TraderCapital {
        self.settlement.capital(trader_id, now)
    }

    /// Settle and report all 24 UTC hours of `date` for a node
    ///
    /// Hours without orders are still listed, with zero P&L.
    pub fn simulate_day(
        &self,
        date: NaiveDate,
        node_id: &NodeId,
        trader_id: Option<&TraderId>,
        now: DateTime<Utc>,
    ) -> Result<DaySimulation, EngineError> {
        let day_start = date.and_time(chrono::NaiveTime::MIN).and_utc();
        let mut hours = Vec::with_capacity(24);

        for h in 0..24 {
            let hour_start = day_start + TimeDelta::hours(h);
            let mut filled = self.book.filled_in_hour(node_id, hour_start)?;
            if let Some(trader_id) = trader_id {
                filled.retain(|o| &o.trader_id == trader_id);
            }

            let hour = self.settlement.settle_hour(
                node_id,
                hour_start,
                &filled,
                || self.real_time_buckets(node_id, hour_start),
                |order| self.real_time_quality(order),
                now,
            )?;
            for update in &hour.updates {
                if update.record.settlement().market == Market::DayAhead {
                    self.mark_buckets_consumed(update.record.settlement())?;
                }
            }
            hours.push(hour);
        }

        let day_total = round_cents(hours.iter().map(|h| h.hour_pnl).sum());
        let orders_settled = hours.iter().map(|h| h.records.len()).sum();
        info!(
            date = %date,
            node = %node_id,
            day_total = %day_total,
            orders_settled,
            "Day simulated"
        );

        Ok(DaySimulation {
            date,
            node_id: node_id.clone(),
            trader_id: trader_id.cloned(),
            hours,
            day_total,
            orders_settled,
            formula: FORMULA_ANNOTATION.to_string(),
            formula_version: FORMULA_VERSION.to_string(),
        })
    }
}

/// `NotFound` for an id that does not parse
pub fn parse_order_id(raw: &str) -> Result<OrderId, EngineError> {
    OrderId::parse(raw).ok_or_else(|| {
        OrderError::NotFound {
            order_id: raw.to_string(),
        }
        .into()
    })
}
