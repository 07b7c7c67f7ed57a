//! Stress Tests - Push the engine to its limits.
//!
//! These tests verify correctness under extreme conditions:
//! - Full id space and full book width
//! - High contention at single price levels
//! - Rapid order churn (level reset, id reuse)
//! - Maximum values for prices and quantities

use relay_lob::{
    AckPolicy, AckStatus, BookConfig, DeltaKind, Engine, OrderRequest, OutputEvent, RequestKind,
    Side,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn engine_with(price_ticks: u32, max_orders: u32) -> Engine {
    Engine::new(
        &BookConfig {
            price_ticks,
            max_orders,
            level_capacity: 4,
        },
        AckPolicy::All,
    )
}

fn create(order_id: u32, trader_id: u16, side: Side, price: u32, qty: u32) -> OrderRequest {
    OrderRequest {
        order_id,
        side,
        kind: RequestKind::Create,
        price,
        qty,
        trader_id,
        ..OrderRequest::default()
    }
}

fn delete(order_id: u32) -> OrderRequest {
    OrderRequest {
        order_id,
        kind: RequestKind::Delete,
        ..OrderRequest::default()
    }
}

fn modify(order_id: u32, price: u32, qty: u32) -> OrderRequest {
    OrderRequest {
        order_id,
        kind: RequestKind::Modify,
        price,
        qty,
        ..OrderRequest::default()
    }
}

fn statuses(events: &[OutputEvent]) -> Vec<AckStatus> {
    events
        .iter()
        .filter_map(|e| if let OutputEvent::Ack(a) = e { Some(a.status) } else { None })
        .collect()
}

fn traded(events: &[OutputEvent]) -> u64 {
    events
        .iter()
        .filter_map(|e| if let OutputEvent::Trade(t) = e { Some(t.qty as u64) } else { None })
        .sum()
}

// ============================================================================
// Capacity Stress Tests
// ============================================================================

#[test]
fn test_full_id_space() {
    const CAPACITY: u32 = 10_000;
    let mut engine = engine_with(20_000, CAPACITY);

    for i in 0..CAPACITY {
        // Non-overlapping prices: bids 8000-8990, asks 10000-10990
        let (side, price) = if i % 2 == 0 {
            (Side::Bid, 8000 + (i % 100) * 10)
        } else {
            (Side::Ask, 10000 + (i % 100) * 10)
        };
        let events = engine.process(&create(i, 1, side, price, 100));
        assert_eq!(statuses(&events), vec![AckStatus::NewAccepted], "order {}", i);
    }
    assert_eq!(engine.live_orders(), CAPACITY);

    // One past the id space is refused without touching the book
    let events = engine.process(&create(CAPACITY, 1, Side::Bid, 8000, 100));
    assert_eq!(statuses(&events), vec![AckStatus::Rejected]);
    assert_eq!(engine.live_orders(), CAPACITY);
}

#[test]
fn test_id_reuse_after_cancel() {
    const CAPACITY: u32 = 100;
    let mut engine = engine_with(1_000, CAPACITY);

    for round in 0..10 {
        for i in 0..CAPACITY {
            let events = engine.process(&create(i, 1, Side::Bid, 100 + round, 10));
            assert_eq!(statuses(&events), vec![AckStatus::NewAccepted]);
        }
        for i in 0..CAPACITY {
            engine.process(&delete(i));
        }
        assert_eq!(engine.live_orders(), 0);
        assert_eq!(engine.best_bid(), None);
    }
}

// ============================================================================
// High Contention Tests
// ============================================================================

#[test]
fn test_single_price_level_contention() {
    let mut engine = engine_with(20_000, 10_000);

    for i in 0..1000 {
        engine.process(&create(i, 1, Side::Bid, 10000, 10));
    }
    assert_eq!(engine.matcher.book.depth_at(Side::Bid, 10000), (10_000, 1000));

    // A single aggressor sweeps the whole level
    let events = engine.process(&create(1000, 2, Side::Ask, 10000, 10_000));
    assert_eq!(traded(&events), 10_000);
    assert_eq!(engine.live_orders(), 0);
    assert_eq!(engine.best_bid(), None);
}

#[test]
fn test_fifo_priority_under_contention() {
    let mut engine = engine_with(20_000, 10_000);

    for i in 0..100 {
        engine.process(&create(i, 1, Side::Ask, 10000, 10));
    }

    // Makers must be hit in arrival order
    let events = engine.process(&create(100, 2, Side::Bid, 10000, 500));
    let makers: Vec<u32> = events
        .iter()
        .filter_map(|e| if let OutputEvent::Trade(t) = e { Some(t.sell_order_id) } else { None })
        .collect();
    assert_eq!(makers, (0..50).collect::<Vec<_>>());
}

// ============================================================================
// Rapid Churn Tests
// ============================================================================

#[test]
fn test_rapid_add_cancel_cycles() {
    let mut engine = engine_with(20_000, 100);

    for cycle in 0..10_000u32 {
        let order_id = cycle % 100;
        engine.process(&create(order_id, 1, Side::Bid, 10000, 10));
        engine.process(&delete(order_id));
    }

    assert_eq!(engine.live_orders(), 0);
    assert_eq!(engine.best_bid(), None);
    // Level storage resets when drained instead of growing with churn
    let level = engine.matcher.book.bids.level(10000).unwrap();
    assert_eq!(level.len(), 0);
}

#[test]
fn test_rapid_match_cycles() {
    let mut engine = engine_with(20_000, 1_000);
    let mut volume = 0u64;

    for cycle in 0..5_000u32 {
        let maker = (cycle * 2) % 1_000;
        engine.process(&create(maker, 1, Side::Ask, 10000, 10));
        let events = engine.process(&create(maker + 1, 2, Side::Bid, 10000, 10));
        volume += traded(&events);
    }

    assert_eq!(volume, 50_000);
    assert_eq!(engine.live_orders(), 0);
    assert_eq!(engine.matcher.stats().trades, 5_000);
}

// ============================================================================
// Edge Case Tests
// ============================================================================

#[test]
fn test_zero_price() {
    let mut engine = engine_with(1_000, 100);
    engine.process(&create(1, 1, Side::Bid, 0, 100));
    assert_eq!(engine.best_bid(), Some(0));

    engine.process(&create(2, 2, Side::Ask, 0, 100));
    assert_eq!(engine.best_bid(), None);
    assert_eq!(engine.best_ask(), None);
}

#[test]
fn test_max_price() {
    let mut engine = engine_with(1_000, 100);
    let events = engine.process(&create(1, 1, Side::Ask, 999, 100));
    assert_eq!(statuses(&events), vec![AckStatus::NewAccepted]);
    assert_eq!(engine.best_ask(), Some(999));

    let events = engine.process(&create(2, 1, Side::Ask, 1_000, 100));
    assert_eq!(statuses(&events), vec![AckStatus::Rejected]);
}

#[test]
fn test_max_quantity() {
    let mut engine = engine_with(1_000, 100);
    engine.process(&create(1, 1, Side::Bid, 500, u32::MAX));
    engine.process(&create(2, 1, Side::Bid, 500, u32::MAX));
    assert_eq!(
        engine.matcher.book.depth_at(Side::Bid, 500),
        (2 * u32::MAX as u64, 2)
    );

    let events = engine.process(&create(3, 2, Side::Ask, 500, u32::MAX));
    assert_eq!(traded(&events), u32::MAX as u64);
    assert_eq!(engine.live_orders(), 1);
}

#[test]
fn test_quantity_one() {
    let mut engine = engine_with(1_000, 100);
    engine.process(&create(1, 1, Side::Bid, 500, 1));
    let events = engine.process(&create(2, 2, Side::Ask, 500, 1));
    assert_eq!(traded(&events), 1);
    assert_eq!(engine.live_orders(), 0);
}

#[test]
fn test_many_price_levels() {
    let mut engine = engine_with(20_000, 20_000);
    for i in 0..10_000u32 {
        engine.process(&create(i, 1, Side::Bid, i, 1));
    }
    assert_eq!(engine.best_bid(), Some(9_999));

    // Cancelling from the top walks the cursor down one level at a time
    for i in (1..10_000u32).rev() {
        engine.process(&delete(i));
        assert_eq!(engine.best_bid(), Some(i - 1));
    }
}

#[test]
fn test_sparse_levels_glide() {
    let mut engine = engine_with(100_000, 100);
    engine.process(&create(1, 1, Side::Ask, 99_000, 5));
    engine.process(&create(2, 1, Side::Ask, 10, 5));
    assert_eq!(engine.best_ask(), Some(10));

    engine.process(&delete(2));
    assert_eq!(engine.best_ask(), Some(99_000));
}

// ============================================================================
// Cancel / Modify Edge Cases
// ============================================================================

#[test]
fn test_double_cancel() {
    let mut engine = engine_with(20_000, 100);
    engine.process(&create(1, 1, Side::Bid, 10000, 100));
    engine.process(&create(2, 1, Side::Bid, 10000, 100));

    let first = engine.process(&delete(1));
    assert_eq!(statuses(&first), vec![AckStatus::CancelAccepted]);
    let second = engine.process(&delete(1));
    assert!(second.is_empty());

    assert_eq!(engine.live_orders(), 1);
    assert_eq!(engine.best_bid(), Some(10000));
    assert_eq!(engine.matcher.book.depth_at(Side::Bid, 10000), (100, 1));
}

#[test]
fn test_cancel_after_partial_fill() {
    let mut engine = engine_with(20_000, 100);
    engine.process(&create(1, 1, Side::Ask, 10000, 100));
    engine.process(&create(2, 2, Side::Bid, 10000, 30));

    let events = engine.process(&delete(1));
    let cancelled: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            OutputEvent::Ack(a) if a.status == AckStatus::CancelAccepted => Some(a.qty),
            _ => None,
        })
        .collect();
    assert_eq!(cancelled, vec![70]);
    assert_eq!(engine.best_ask(), None);
}

#[test]
fn test_modify_keeps_resting_side() {
    let mut engine = engine_with(20_000, 100);
    engine.process(&create(1, 1, Side::Ask, 10000, 100));

    // Request side is ignored; the order stays an ask
    let events = engine.process(&OrderRequest {
        side: Side::Bid,
        ..modify(1, 10010, 100)
    });
    assert_eq!(statuses(&events), vec![AckStatus::UpdateAccepted]);
    assert_eq!(engine.best_ask(), Some(10010));
    assert_eq!(engine.best_bid(), None);
}

#[test]
fn test_modify_nonexistent() {
    let mut engine = engine_with(20_000, 100);
    assert!(engine.process(&modify(42, 10000, 5)).is_empty());
    assert_eq!(engine.matcher.stats().unknown_refs, 1);
}

#[test]
fn test_modify_emits_delete_then_add() {
    let mut engine = engine_with(20_000, 100);
    engine.process(&create(1, 1, Side::Bid, 10000, 100));

    let kinds: Vec<DeltaKind> = engine
        .process(&modify(1, 10005, 100))
        .iter()
        .filter_map(|e| if let OutputEvent::Delta(d) = e { Some(d.kind) } else { None })
        .collect();
    assert_eq!(kinds, vec![DeltaKind::Delete, DeltaKind::Add]);
}

// ============================================================================
// Matching Edge Cases
// ============================================================================

#[test]
fn test_self_trade_blocked_behind_other_traders() {
    let mut engine = engine_with(20_000, 100);
    engine.process(&create(1, 2, Side::Ask, 10000, 10));
    engine.process(&create(2, 1, Side::Ask, 10000, 10));
    engine.process(&create(3, 2, Side::Ask, 10000, 10));

    // Fills trader 2's first order, then hits its own and is killed
    let events = engine.process(&create(4, 1, Side::Bid, 10000, 30));
    assert_eq!(traded(&events), 10);
    assert_eq!(statuses(&events).last(), Some(&AckStatus::SelfTradeKilled));
    assert_eq!(engine.matcher.book.depth_at(Side::Ask, 10000), (20, 2));
    assert_eq!(engine.best_bid(), None);
}

#[test]
fn test_partial_match_across_levels() {
    let mut engine = engine_with(20_000, 100);
    engine.process(&create(1, 1, Side::Ask, 10000, 10));
    engine.process(&create(2, 1, Side::Ask, 10001, 10));
    engine.process(&create(3, 1, Side::Ask, 10002, 10));

    let events = engine.process(&create(4, 2, Side::Bid, 10001, 25));
    let prices: Vec<u32> = events
        .iter()
        .filter_map(|e| if let OutputEvent::Trade(t) = e { Some(t.price) } else { None })
        .collect();
    assert_eq!(prices, vec![10000, 10001]);
    assert_eq!(engine.best_bid(), Some(10001));
    assert_eq!(engine.best_ask(), Some(10002));
    assert_eq!(engine.matcher.book.depth_at(Side::Bid, 10001), (5, 1));
}

// ============================================================================
// Large Scale Workload
// ============================================================================

#[test]
fn test_large_random_workload() {
    const OPS: u32 = 200_000;
    let mut rng = ChaCha8Rng::seed_from_u64(0x5EED);
    let mut engine = engine_with(20_000, OPS);
    let mut live: Vec<u32> = Vec::new();

    for order_id in 0..OPS {
        if !live.is_empty() && rng.gen_bool(0.4) {
            let target = live.swap_remove(rng.gen_range(0..live.len()));
            engine.process(&delete(target));
        } else {
            let side = if rng.gen_bool(0.5) { Side::Bid } else { Side::Ask };
            engine.process(&create(
                order_id,
                rng.gen_range(0..50),
                side,
                rng.gen_range(9_900..10_100),
                rng.gen_range(1..100),
            ));
            live.push(order_id);
        }

        if let (Some(bid), Some(ask)) = (engine.best_bid(), engine.best_ask()) {
            assert!(bid < ask, "crossed book at op {}: {} >= {}", order_id, bid, ask);
        }
    }

    // Cancel everything still resting; the book must come back empty
    for order_id in live {
        engine.process(&delete(order_id));
    }
    assert_eq!(engine.live_orders(), 0);
    assert_eq!(engine.best_bid(), None);
    assert_eq!(engine.best_ask(), None);
}
