//! Determinism and invariant tests for the matching pass
//!
//! - identical books and prices produce identical decisions
//! - filled sells never exceed filled buys per trader and slot
//! - concurrent cancel and match never both win

use std::str::FromStr;
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use matching_engine::{BookConfig, InMemoryOrderStore, MatchStatus, MatchingEngine, OrderBook};
use proptest::prelude::*;
use risk_engine::RiskEngine;
use rust_decimal::Decimal;
use types::ids::{NodeId, OrderId, TraderId};
use types::market::{Market, TickKey};
use types::numeric::{Price, Quantity};
use types::order::{NewOrder, OrderStatus, OrderType, Side, TimeInForce};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 16, 13, 0, 0).unwrap()
}

fn hour() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 17, 14, 0, 0).unwrap()
}

fn new_engine() -> MatchingEngine {
    let book = OrderBook::new(
        Arc::new(InMemoryOrderStore::new()),
        RiskEngine::default(),
        BookConfig::default(),
    );
    MatchingEngine::new(Arc::new(book))
}

#[derive(Debug, Clone)]
struct Draft {
    trader: u8,
    sell: bool,
    qty: u32,
    limit: Option<i32>,
}

fn to_request(draft: &Draft) -> NewOrder {
    NewOrder {
        trader_id: TraderId::new(format!("trader_{}", draft.trader)),
        node_id: NodeId::new("PJM_RTO"),
        market: Market::DayAhead,
        hour_start: hour(),
        time_slot: None,
        side: if draft.sell { Side::Sell } else { Side::Buy },
        order_type: if draft.limit.is_some() { OrderType::Limit } else { OrderType::Market },
        limit_price: draft.limit.map(|l| Price::new(Decimal::from(l))),
        quantity: Quantity::new(Decimal::from(draft.qty)),
        time_in_force: TimeInForce::GTC,
        expires_at: None,
    }
}

fn draft_strategy() -> impl Strategy<Value = Draft> {
    (0u8..3, any::<bool>(), 1u32..10, prop::option::of(20i32..80)).prop_map(
        |(trader, sell, qty, limit)| Draft {
            trader,
            sell,
            qty,
            limit,
        },
    )
}

/// Submit every draft, match once, return (admitted?, status, price) per draft
fn run(drafts: &[Draft], price: i32) -> Vec<(bool, Option<MatchStatus>, Option<Price>)> {
    let engine = new_engine();
    let admitted: Vec<_> = drafts
        .iter()
        .map(|s| engine.book().submit(to_request(s), now()).ok())
        .collect();

    let key = TickKey::new(NodeId::new("PJM_RTO"), hour(), Market::DayAhead);
    let outcome = engine
        .match_tick(&key, Price::new(Decimal::from(price)))
        .unwrap();

    admitted
        .iter()
        .map(|order| match order {
            None => (false, None, None),
            Some(order) => {
                let result = outcome.results.iter().find(|r| r.order_id == order.order_id);
                (true, result.map(|r| r.status), result.and_then(|r| r.filled_price))
            }
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_matching_is_deterministic(
        drafts in prop::collection::vec(draft_strategy(), 1..25),
        price in 10i32..90,
    ) {
        prop_assert_eq!(run(&drafts, price), run(&drafts, price));
    }

    #[test]
    fn prop_no_naked_shorts(
        drafts in prop::collection::vec(draft_strategy(), 1..25),
        price in 10i32..90,
    ) {
        let engine = new_engine();
        for draft in &drafts {
            let _ = engine.book().submit(to_request(draft), now());
        }
        let key = TickKey::new(NodeId::new("PJM_RTO"), hour(), Market::DayAhead);
        engine.match_tick(&key, Price::new(Decimal::from(price))).unwrap();

        for trader in 0..3 {
            let orders = engine.book().slot_orders(&key).unwrap();
            let (mut buys, mut sells) = (Decimal::ZERO, Decimal::ZERO);
            for order in orders.iter().filter(|o| {
                o.trader_id.as_str() == format!("trader_{}", trader) && o.status == OrderStatus::Filled
            }) {
                match order.side {
                    Side::Buy => buys += order.quantity.as_decimal(),
                    Side::Sell => sells += order.quantity.as_decimal(),
                }
            }
            prop_assert!(sells <= buys, "trader {} sold {} with {} bought", trader, sells, buys);
        }
    }
}

#[test]
fn test_concurrent_cancel_and_match() {
    for _ in 0..20 {
        let engine = Arc::new(new_engine());
        let mut ids = Vec::new();
        for _ in 0..10 {
            let order = engine
                .book()
                .submit(
                    to_request(&Draft {
                        trader: 0,
                        sell: false,
                        qty: 1,
                        limit: None,
                    }),
                    now(),
                )
                .unwrap();
            ids.push(order.order_id);
        }

        let canceller = {
            let engine = Arc::clone(&engine);
            let ids = ids.clone();
            thread::spawn(move || {
                ids.iter()
                    .filter(|id| engine.book().cancel(id, now()).is_ok())
                    .count()
            })
        };
        let matcher = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let key = TickKey::new(NodeId::new("PJM_RTO"), hour(), Market::DayAhead);
                engine
                    .match_tick(&key, Price::from_str("48.00").unwrap())
                    .unwrap()
                    .filled_count()
            })
        };

        let cancelled = canceller.join().unwrap();
        let filled = matcher.join().unwrap();
        assert_eq!(cancelled + filled, ids.len());

        for id in &ids {
            let order = engine.book().get(id).unwrap();
            let fill = engine.book().fill(id).unwrap();
            match order.status {
                OrderStatus::Filled => assert!(fill.is_some()),
                OrderStatus::Cancelled => assert!(fill.is_none()),
                other => panic!("unexpected status {}", other),
            }
        }
    }
}

#[test]
fn test_cancelling_buys_during_pass_never_leaves_a_short() {
    let key = TickKey::new(NodeId::new("PJM_RTO"), hour(), Market::DayAhead);
    let submit = |engine: &MatchingEngine, sell: bool| {
        engine
            .book()
            .submit(
                to_request(&Draft {
                    trader: 0,
                    sell,
                    qty: 1,
                    limit: None,
                }),
                now(),
            )
            .unwrap()
            .order_id
    };

    for _ in 0..50 {
        let engine = Arc::new(new_engine());
        let buys: Vec<_> = (0..5).map(|_| submit(&engine, false)).collect();
        let sells: Vec<_> = (0..5).map(|_| submit(&engine, true)).collect();

        let canceller = {
            let engine = Arc::clone(&engine);
            let buys = buys.clone();
            thread::spawn(move || {
                for id in buys.iter().rev() {
                    let _ = engine.book().cancel(id, now());
                }
            })
        };
        let matcher = {
            let engine = Arc::clone(&engine);
            let key = key.clone();
            thread::spawn(move || engine.match_tick(&key, Price::from_u64(48)).unwrap())
        };
        canceller.join().unwrap();
        matcher.join().unwrap();

        let filled = |ids: &[OrderId]| {
            ids.iter()
                .filter(|id| engine.book().get(id).unwrap().status == OrderStatus::Filled)
                .count()
        };
        let (bought, sold) = (filled(&buys), filled(&sells));
        assert!(sold <= bought, "sold {} with {} bought", sold, bought);

        for id in buys.iter().chain(&sells) {
            let order = engine.book().get(id).unwrap();
            let fill = engine.book().fill(id).unwrap();
            assert_eq!(order.status == OrderStatus::Filled, fill.is_some());
        }
    }
}

#[test]
fn test_passes_on_different_slots_run_in_parallel() {
    let engine = Arc::new(new_engine());
    for offset in 0..4 {
        let mut request = to_request(&Draft {
            trader: 0,
            sell: false,
            qty: 1,
            limit: None,
        });
        request.hour_start = hour() + TimeDelta::hours(offset);
        engine.book().submit(request, now()).unwrap();
    }

    let handles: Vec<_> = (0..4)
        .map(|offset| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let key = TickKey::new(
                    NodeId::new("PJM_RTO"),
                    hour() + TimeDelta::hours(offset),
                    Market::DayAhead,
                );
                engine.match_tick(&key, Price::from_u64(40)).unwrap().filled_count()
            })
        })
        .collect();

    let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, 4);
}
