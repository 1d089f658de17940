//! End-to-end exchange scenarios: ingest → match → settle in one process

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone, Utc};
use gateway::{Exchange, ExchangeConfig};
use market_data::UpsertOutcome;
use matching_engine::{MatchStatus, StaleAction};
use rust_decimal::Decimal;
use types::errors::{EngineError, IngestError};
use types::ids::{NodeId, OrderId, TraderId};
use types::market::Market;
use types::numeric::{Price, Quantity};
use types::order::{NewOrder, OrderStatus, OrderType, RejectReason, Side, TimeInForce};
use types::pnl::DataQuality;
use types::tick::{PriceQuality, PriceTick};

/// 09:00 in New York, before the day-ahead cutoff
fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 16, 13, 0, 0).unwrap()
}

fn hour() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 17, 14, 0, 0).unwrap()
}

fn bucket(index: i64) -> DateTime<Utc> {
    hour() + TimeDelta::minutes(5 * index)
}

fn node() -> NodeId {
    NodeId::new("PJM_RTO")
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn exchange() -> Exchange {
    Exchange::new(&ExchangeConfig::default()).unwrap()
}

fn order(market: Market, side: Side, qty: &str, limit: Option<&str>) -> NewOrder {
    NewOrder {
        trader_id: TraderId::new("demo_user"),
        node_id: node(),
        market,
        hour_start: hour(),
        time_slot: (market == Market::RealTime).then(|| bucket(3)),
        side,
        order_type: if limit.is_some() {
            OrderType::Limit
        } else {
            OrderType::Market
        },
        limit_price: limit.map(|l| Price::from_str(l).unwrap()),
        quantity: Quantity::from_str(qty).unwrap(),
        time_in_force: TimeInForce::GTC,
        expires_at: None,
    }
}

fn rt_tick(index: i64, price: &str, quality: PriceQuality) -> PriceTick {
    PriceTick::real_time(node(), bucket(index), Price::from_str(price).unwrap()).with_quality(quality)
}

fn da_tick(price: &str) -> PriceTick {
    PriceTick::day_ahead(node(), hour(), Price::from_str(price).unwrap())
}

#[test]
fn test_real_time_market_buy_fills_at_lmp() {
    let ex = exchange();
    let placed = ex
        .submit_order(order(Market::RealTime, Side::Buy, "2.5", None), now())
        .unwrap();

    let report = ex
        .ingest(rt_tick(3, "48.75", PriceQuality::Provisional), now())
        .unwrap();
    assert_eq!(report.outcome, UpsertOutcome::Inserted);
    assert!(report.matching_triggered);
    let matching = report.matching.unwrap();
    assert_eq!(matching.results.len(), 1);
    assert_eq!(matching.results[0].status, MatchStatus::Filled);

    let filled = ex.order(&placed.order_id).unwrap();
    assert_eq!(filled.status, OrderStatus::Filled);
    assert_eq!(filled.filled_price, Some(Price::from_str("48.75").unwrap()));

    let fill = ex.book().fill(&placed.order_id).unwrap().unwrap();
    assert_eq!(fill.filled_quantity, Quantity::from_str("2.5").unwrap());
    assert_eq!(fill.execution_timestamp, bucket(3));

    // RT fills settle once, as a cash flow at the slot
    assert_eq!(report.settlements.len(), 1);
    assert!(ex.order_pnl(&placed.order_id).unwrap().is_some());
}

#[test]
fn test_real_time_record_verified_when_tick_is_upgraded() {
    let ex = exchange();
    let trader = TraderId::new("demo_user");
    let placed = ex
        .submit_order(order(Market::RealTime, Side::Buy, "2", None), now())
        .unwrap();
    ex.ingest(rt_tick(3, "48.75", PriceQuality::Provisional), now())
        .unwrap();
    let provisional = ex.order_pnl(&placed.order_id).unwrap().unwrap();
    assert!(!provisional.is_verified());

    let report = ex
        .ingest(rt_tick(3, "48.75", PriceQuality::Verified), now())
        .unwrap();
    assert_eq!(report.outcome, UpsertOutcome::Revised);
    assert_eq!(report.settlements.len(), 1);

    let record = ex.order_pnl(&placed.order_id).unwrap().unwrap();
    assert!(record.is_verified());
    assert_eq!(record.version(), 2);
    assert_eq!(record.hour_pnl(), dec("-97.50"));
    assert_eq!(ex.revisions(&placed.order_id).unwrap().len(), 2);
    assert_eq!(ex.capital(&trader, now()).capital(), dec("9902.50"));
}

#[test]
fn test_day_ahead_limit_sell_rejected_below_limit() {
    let ex = exchange();
    ex.submit_order(order(Market::DayAhead, Side::Buy, "3.0", None), now())
        .unwrap();
    let sell = ex
        .submit_order(order(Market::DayAhead, Side::Sell, "3.0", Some("55.00")), now())
        .unwrap();

    ex.ingest(da_tick("50.00"), now()).unwrap();

    let sell = ex.order(&sell.order_id).unwrap();
    assert_eq!(sell.status, OrderStatus::Rejected);
    assert_eq!(sell.reject_reason, Some(RejectReason::LimitNotMet));
}

#[test]
fn test_redelivered_tick_produces_no_second_fill() {
    let ex = exchange();
    ex.submit_order(order(Market::RealTime, Side::Buy, "1", None), now())
        .unwrap();

    let first = ex
        .ingest(rt_tick(3, "48.75", PriceQuality::Provisional), now())
        .unwrap();
    let again = ex
        .ingest(rt_tick(3, "48.75", PriceQuality::Provisional), now())
        .unwrap();

    assert_eq!(first.matching.unwrap().filled_count(), 1);
    assert_eq!(again.outcome, UpsertOutcome::Duplicate);
    assert!(!again.matching_triggered);
    assert!(again.settlements.is_empty());
}

#[test]
fn test_consumed_price_cannot_be_silently_changed() {
    let ex = exchange();
    ex.submit_order(order(Market::RealTime, Side::Buy, "1", None), now())
        .unwrap();
    ex.ingest(rt_tick(3, "48.75", PriceQuality::Provisional), now())
        .unwrap();

    let err = ex
        .ingest(rt_tick(3, "49.00", PriceQuality::Provisional), now())
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Ingest(IngestError::PriceConflict { .. })
    ));
}

#[test]
fn test_day_ahead_settles_across_real_time_buckets() {
    let ex = exchange();
    let buy = ex
        .submit_order(order(Market::DayAhead, Side::Buy, "2.5", None), now())
        .unwrap();
    ex.ingest(da_tick("48.00"), now()).unwrap();
    // No real-time buckets yet, so nothing to settle
    assert!(ex.order_pnl(&buy.order_id).unwrap().is_none());

    for index in 0..12 {
        ex.ingest(rt_tick(index, "52.30", PriceQuality::Provisional), now())
            .unwrap();
    }

    let record = ex.order_pnl(&buy.order_id).unwrap().unwrap();
    assert_eq!(record.hour_pnl(), dec("10.75"));
    assert_eq!(record.data_quality(), DataQuality::ProvisionalComplete);
    assert_eq!(record.settlement().buckets_used, 12);
}

#[test]
fn test_verified_prices_revise_by_delta() {
    let ex = exchange();
    let trader = TraderId::new("demo_user");
    // 12 MWh: each bucket contributes its spread × 1 MWh
    let buy = ex
        .submit_order(order(Market::DayAhead, Side::Buy, "12", None), now())
        .unwrap();
    ex.ingest(da_tick("40"), now()).unwrap();

    for index in 0..12 {
        let price = if index == 11 { "52" } else { "48" };
        ex.ingest(rt_tick(index, price, PriceQuality::Provisional), now())
            .unwrap();
    }
    assert_eq!(ex.order_pnl(&buy.order_id).unwrap().unwrap().hour_pnl(), dec("100.00"));
    assert_eq!(ex.capital(&trader, now()).capital(), dec("10100.00"));

    for index in 0..12 {
        let price = if index == 11 { "48" } else { "47.65" };
        let report = ex
            .ingest(rt_tick(index, price, PriceQuality::Verified), now())
            .unwrap();
        assert_eq!(report.outcome, UpsertOutcome::Revised);
    }

    let record = ex.order_pnl(&buy.order_id).unwrap().unwrap();
    assert_eq!(record.hour_pnl(), dec("92.15"));
    assert!(record.is_verified());
    assert_eq!(record.data_quality(), DataQuality::VerifiedComplete);
    assert_eq!(ex.capital(&trader, now()).capital(), dec("10092.15"));

    let revisions = ex.revisions(&buy.order_id).unwrap();
    let net: Decimal = revisions.iter().map(|r| r.delta).sum();
    assert_eq!(net, dec("92.15"));
}

#[test]
fn test_simulate_day_lists_every_hour() {
    let ex = exchange();
    ex.submit_order(order(Market::DayAhead, Side::Buy, "2.5", None), now())
        .unwrap();
    ex.ingest(da_tick("48.00"), now()).unwrap();
    for index in 0..6 {
        ex.ingest(rt_tick(index, "52.30", PriceQuality::Provisional), now())
            .unwrap();
    }

    let day = NaiveDate::from_ymd_opt(2025, 8, 17).unwrap();
    let sim = ex.simulate_day(day, &node(), None, now()).unwrap();
    assert_eq!(sim.hours.len(), 24);
    assert_eq!(sim.orders_settled, 1);

    let settled = &sim.hours[14];
    assert_eq!(settled.hour_start, hour());
    assert_eq!(settled.data_quality, DataQuality::ProvisionalPartial);
    assert_eq!(sim.day_total, settled.hour_pnl);
    assert!(sim.hours.iter().enumerate().all(|(h, s)| h == 14 || s.hour_pnl.is_zero()));

    // Another trader's filter sees nothing
    let other = TraderId::new("someone_else");
    let sim = ex.simulate_day(day, &node(), Some(&other), now()).unwrap();
    assert_eq!(sim.orders_settled, 0);
    assert!(sim.day_total.is_zero());
}

#[test]
fn test_unpriced_slot_is_reported_stale() {
    let ex = exchange();
    let mut ioc = order(Market::RealTime, Side::Buy, "1", None);
    ioc.time_in_force = TimeInForce::IOC;
    let ioc = ex.submit_order(ioc, now()).unwrap();
    let gtc = ex
        .submit_order(order(Market::RealTime, Side::Buy, "1", None), now())
        .unwrap();

    // Before the grace period nothing is stale
    assert!(ex.reconcile(bucket(4)).unwrap().is_empty());

    let later = bucket(4) + TimeDelta::seconds(900);
    let report = ex.reconcile(later).unwrap();
    assert_eq!(report.stale.len(), 2);
    assert_eq!(report.expired, vec![ioc.order_id]);

    let action = |id: OrderId| report.stale.iter().find(|s| s.order_id == id).unwrap().action;
    assert_eq!(action(ioc.order_id), StaleAction::Cancelled);
    assert_eq!(action(gtc.order_id), StaleAction::Reported);
    assert_eq!(ex.order(&gtc.order_id).unwrap().status, OrderStatus::Pending);
}
