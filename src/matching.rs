//! Matching Engine - Core order matching algorithm.
//!
//! Implements the cross/rest algorithm:
//! 1. CROSSING: Match aggressive orders against the opposite side
//! 2. RESTING: Place remaining quantity in the book
//!
//! Price priority is strict and, within a price, time priority is strict
//! FIFO. An aggressor that reaches one of its own resting orders is killed
//! on the spot (self-trade prevention); fills made before that point stand.
//!
//! Output goes through an [`EventSink`] so the same code feeds a `Vec` in
//! tests and the outbound channels in the pipeline.

use tracing::trace;

use crate::command::{
    Ack, AckStatus, BookDelta, DeltaKind, OrderRequest, OutputEvent, RequestKind, Side, Trade,
};
use crate::config::{AckPolicy, BookConfig};
use crate::order_book::OrderBook;

/// Receiver for everything the matching core emits.
pub trait EventSink {
    /// An acknowledgement for an originator (already filtered by ack policy).
    fn ack(&mut self, ack: Ack);

    /// A book change for market data.
    fn delta(&mut self, delta: BookDelta);

    /// A full execution record. Sinks that only forward acks and deltas can
    /// ignore it.
    fn trade(&mut self, _trade: &Trade) {}
}

impl EventSink for Vec<OutputEvent> {
    #[inline]
    fn ack(&mut self, ack: Ack) {
        self.push(OutputEvent::Ack(ack));
    }

    #[inline]
    fn delta(&mut self, delta: BookDelta) {
        self.push(OutputEvent::Delta(delta));
    }

    #[inline]
    fn trade(&mut self, trade: &Trade) {
        self.push(OutputEvent::Trade(*trade));
    }
}

/// Running totals kept by the matching core.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatchStats {
    pub requests: u64,
    pub trades: u64,
    pub volume: u64,
    pub rejected: u64,
    pub self_trade_kills: u64,
    /// Modify/delete requests for ids that were not live
    pub unknown_refs: u64,
}

/// How crossing ended for an aggressor.
enum CrossOutcome {
    /// Quantity left to rest (may be 0)
    Residual(u32),
    /// Hit its own resting order; residual at that point is cancelled
    Killed(u32),
}

/// The matching engine core
pub struct MatchingEngine {
    /// The limit order book
    pub book: OrderBook,
    ack_policy: AckPolicy,
    stats: MatchStats,
}

impl MatchingEngine {
    /// Create an engine with an empty book.
    pub fn new(config: &BookConfig, ack_policy: AckPolicy) -> Self {
        Self {
            book: OrderBook::new(config),
            ack_policy,
            stats: MatchStats::default(),
        }
    }

    /// Apply one order-intent record, emitting into `sink`.
    #[inline]
    pub fn process<S: EventSink>(&mut self, request: &OrderRequest, sink: &mut S) {
        self.stats.requests += 1;
        match request.kind {
            RequestKind::Create => self.process_create(request, AckStatus::NewAccepted, sink),
            RequestKind::Modify => self.process_modify(request, sink),
            RequestKind::Delete => self.process_delete(request, sink),
        }
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Cross, then rest any remainder. Exactly one terminal ack is emitted,
    /// carrying `accepted` on success.
    fn process_create<S: EventSink>(
        &mut self,
        request: &OrderRequest,
        accepted: AckStatus,
        sink: &mut S,
    ) {
        if let Some(reason) = self.invalid_create(request) {
            trace!(order_id = request.order_id, reason, "create rejected");
            self.stats.rejected += 1;
            self.emit_ack(sink, request, request.qty, AckStatus::Rejected);
            return;
        }

        // Phase 1: CROSSING (aggressive matching)
        match self.cross_order(request, sink) {
            CrossOutcome::Killed(residual) => {
                self.stats.self_trade_kills += 1;
                self.emit_ack(sink, request, residual, AckStatus::SelfTradeKilled);
            }
            CrossOutcome::Residual(0) => {
                self.emit_ack(sink, request, 0, accepted);
            }
            // Phase 2: RESTING (passive posting)
            CrossOutcome::Residual(residual) => {
                self.book.side_mut(request.side).insert(
                    request.order_id,
                    request.trader_id,
                    request.price,
                    residual,
                );
                sink.delta(BookDelta {
                    order_id: request.order_id,
                    price: request.price,
                    qty: residual,
                    side: request.side,
                    kind: DeltaKind::Add,
                });
                self.emit_ack(sink, request, residual, accepted);
            }
        }
    }

    /// Reason a create cannot be applied, if any.
    fn invalid_create(&self, request: &OrderRequest) -> Option<&'static str> {
        let side = self.book.side(request.side);
        if request.qty == 0 {
            Some("zero quantity")
        } else if request.price >= side.width() {
            Some("price outside book")
        } else if request.order_id >= side.id_space() {
            Some("order id outside id space")
        } else if self.book.locate(request.order_id).is_some() {
            Some("order id already live")
        } else {
            None
        }
    }

    /// Cross (match) an incoming order against the opposite side.
    fn cross_order<S: EventSink>(&mut self, taker: &OrderRequest, sink: &mut S) -> CrossOutcome {
        let maker_side = taker.side.opposite();
        let mut residual = taker.qty;

        while residual > 0 {
            let makers = self.book.side_mut(maker_side);

            // Best live maker; dead orders are skipped inside `front`
            let Some((price, slot, maker)) = makers.front() else {
                break;
            };

            if !prices_cross(taker.side, taker.price, price) {
                break;
            }

            if maker.trader_id == taker.trader_id {
                return CrossOutcome::Killed(residual);
            }

            let qty = residual.min(maker.qty);
            makers.fill(price, slot, qty);
            residual -= qty;

            let (buy, sell) = match taker.side {
                Side::Bid => ((taker.order_id, taker.trader_id), (maker.order_id, maker.trader_id)),
                Side::Ask => ((maker.order_id, maker.trader_id), (taker.order_id, taker.trader_id)),
            };
            let trade = Trade {
                buy_order_id: buy.0,
                sell_order_id: sell.0,
                buy_trader_id: buy.1,
                sell_trader_id: sell.1,
                price,
                qty,
                aggressor: taker.side,
            };
            self.stats.trades += 1;
            self.stats.volume += qty as u64;
            sink.trade(&trade);

            sink.delta(BookDelta {
                order_id: maker.order_id,
                price,
                qty,
                side: maker_side,
                kind: DeltaKind::Trade,
            });

            if self.ack_policy.admits(taker.trader_id) {
                sink.ack(Ack {
                    order_id: taker.order_id,
                    price,
                    qty,
                    side: taker.side,
                    status: AckStatus::Trade,
                    trader_id: taker.trader_id,
                });
            }
            if self.ack_policy.admits(maker.trader_id) {
                sink.ack(Ack {
                    order_id: maker.order_id,
                    price,
                    qty,
                    side: maker_side,
                    status: AckStatus::Trade,
                    trader_id: maker.trader_id,
                });
            }
        }

        CrossOutcome::Residual(residual)
    }

    // ========================================================================
    // Modify / Delete
    // ========================================================================

    /// Decrease in place, or cancel and re-enter at the back of the queue.
    fn process_modify<S: EventSink>(&mut self, request: &OrderRequest, sink: &mut S) {
        if request.qty == 0 {
            self.process_delete(request, sink);
            return;
        }

        let Some(current) = self
            .book
            .locate(request.order_id)
            .and_then(|side| self.book.order(side, request.order_id))
        else {
            self.unknown_ref(request);
            return;
        };

        // Resting side and owner win over whatever the request carries
        let replacement = OrderRequest {
            kind: RequestKind::Create,
            side: current.side,
            trader_id: current.trader_id,
            ..*request
        };

        if request.price >= self.book.side(current.side).width() {
            trace!(order_id = request.order_id, "modify rejected: price outside book");
            self.stats.rejected += 1;
            self.emit_ack(sink, &replacement, request.qty, AckStatus::Rejected);
            return;
        }

        if request.price == current.price && request.qty < current.qty {
            self.book
                .side_mut(current.side)
                .reduce(request.order_id, request.qty);
            sink.delta(BookDelta {
                order_id: request.order_id,
                price: current.price,
                qty: request.qty,
                side: current.side,
                kind: DeltaKind::Update,
            });
            self.emit_ack(sink, &replacement, request.qty, AckStatus::UpdateAccepted);
            return;
        }

        // Priority is lost: cancel, then run the new terms as a fresh order
        self.book.side_mut(current.side).remove(request.order_id);
        sink.delta(BookDelta {
            order_id: request.order_id,
            price: current.price,
            qty: current.qty,
            side: current.side,
            kind: DeltaKind::Delete,
        });
        self.process_create(&replacement, AckStatus::UpdateAccepted, sink);
    }

    /// Lazily delete a resting order.
    fn process_delete<S: EventSink>(&mut self, request: &OrderRequest, sink: &mut S) {
        let Some(removed) = self
            .book
            .locate(request.order_id)
            .and_then(|side| self.book.side_mut(side).remove(request.order_id))
        else {
            self.unknown_ref(request);
            return;
        };

        sink.delta(BookDelta {
            order_id: removed.order_id,
            price: removed.price,
            qty: removed.qty,
            side: removed.side,
            kind: DeltaKind::Delete,
        });
        if self.ack_policy.admits(removed.trader_id) {
            sink.ack(Ack {
                order_id: removed.order_id,
                price: removed.price,
                qty: removed.qty,
                side: removed.side,
                status: AckStatus::CancelAccepted,
                trader_id: removed.trader_id,
            });
        }
    }

    #[inline]
    fn unknown_ref(&mut self, request: &OrderRequest) {
        trace!(order_id = request.order_id, kind = ?request.kind, "unknown order reference");
        self.stats.unknown_refs += 1;
    }

    #[inline]
    fn emit_ack<S: EventSink>(
        &self,
        sink: &mut S,
        request: &OrderRequest,
        qty: u32,
        status: AckStatus,
    ) {
        if self.ack_policy.admits(request.trader_id) {
            sink.ack(Ack {
                order_id: request.order_id,
                price: request.price,
                qty,
                side: request.side,
                status,
                trader_id: request.trader_id,
            });
        }
    }

    // ========================================================================
    // Utility Methods
    // ========================================================================

    /// Get the best bid price
    #[inline]
    pub fn best_bid(&self) -> Option<u32> {
        self.book.best_bid()
    }

    /// Get the best ask price
    #[inline]
    pub fn best_ask(&self) -> Option<u32> {
        self.book.best_ask()
    }

    /// Get the spread
    #[inline]
    pub fn spread(&self) -> Option<u32> {
        self.book.spread()
    }

    /// Live orders across both sides.
    #[inline]
    pub fn live_orders(&self) -> u32 {
        self.book.live_orders()
    }

    #[inline]
    pub fn stats(&self) -> MatchStats {
        self.stats
    }

    #[inline]
    pub fn ack_policy(&self) -> AckPolicy {
        self.ack_policy
    }

    /// Warm up the engine (pre-fault memory pages)
    pub fn warm_up(&mut self) {
        self.book.warm_up();
    }

    /// Compute a hash of the current state (for determinism testing)
    pub fn state_hash(&self) -> u64 {
        self.book.state_hash()
    }
}

/// Check if an incoming order price crosses the opposite best price.
#[inline]
fn prices_cross(taker_side: Side, taker_price: u32, maker_price: u32) -> bool {
    match taker_side {
        // Buyer willing to pay >= lowest ask
        Side::Bid => taker_price >= maker_price,
        // Seller willing to accept <= highest bid
        Side::Ask => taker_price <= maker_price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BookConfig {
        BookConfig {
            price_ticks: 20_000,
            max_orders: 1000,
            level_capacity: 8,
        }
    }

    fn engine() -> MatchingEngine {
        MatchingEngine::new(&config(), AckPolicy::All)
    }

    fn request(
        kind: RequestKind,
        order_id: u32,
        trader_id: u16,
        side: Side,
        price: u32,
        qty: u32,
    ) -> OrderRequest {
        OrderRequest {
            order_id,
            trader_id,
            side,
            kind,
            price,
            qty,
            ..OrderRequest::default()
        }
    }

    fn create(order_id: u32, trader_id: u16, side: Side, price: u32, qty: u32) -> OrderRequest {
        request(RequestKind::Create, order_id, trader_id, side, price, qty)
    }

    fn run(engine: &mut MatchingEngine, request: OrderRequest) -> Vec<OutputEvent> {
        let mut events = Vec::new();
        engine.process(&request, &mut events);
        events
    }

    fn trades(events: &[OutputEvent]) -> Vec<Trade> {
        events
            .iter()
            .filter_map(|e| if let OutputEvent::Trade(t) = e { Some(*t) } else { None })
            .collect()
    }

    fn acks(events: &[OutputEvent]) -> Vec<Ack> {
        events
            .iter()
            .filter_map(|e| if let OutputEvent::Ack(a) = e { Some(*a) } else { None })
            .collect()
    }

    fn deltas(events: &[OutputEvent]) -> Vec<BookDelta> {
        events
            .iter()
            .filter_map(|e| if let OutputEvent::Delta(d) = e { Some(*d) } else { None })
            .collect()
    }

    #[test]
    fn test_place_bid_no_match() {
        let mut engine = engine();

        let events = run(&mut engine, create(1, 100, Side::Bid, 10000, 100));

        // Add delta, then the terminal ack
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            OutputEvent::Delta(BookDelta { kind: DeltaKind::Add, qty: 100, .. })
        ));
        assert!(matches!(
            events[1],
            OutputEvent::Ack(Ack { status: AckStatus::NewAccepted, qty: 100, .. })
        ));

        assert_eq!(engine.best_bid(), Some(10000));
        assert_eq!(engine.best_ask(), None);
        assert_eq!(engine.live_orders(), 1);
    }

    #[test]
    fn test_full_match() {
        let mut engine = engine();

        run(&mut engine, create(1, 100, Side::Ask, 10000, 100));
        let events = run(&mut engine, create(2, 200, Side::Bid, 10000, 100));

        let trades = trades(&events);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, 10000);
        assert_eq!(trades[0].qty, 100);
        assert_eq!(trades[0].sell_order_id, 1);
        assert_eq!(trades[0].buy_order_id, 2);
        assert_eq!(trades[0].aggressor, Side::Bid);

        // Fill reported as a trade delta on the maker, nothing rests
        assert_eq!(
            deltas(&events),
            vec![BookDelta {
                order_id: 1,
                price: 10000,
                qty: 100,
                side: Side::Ask,
                kind: DeltaKind::Trade,
            }]
        );
        let terminal = *acks(&events).last().unwrap();
        assert_eq!(terminal.status, AckStatus::NewAccepted);
        assert_eq!(terminal.qty, 0);

        assert_eq!(engine.live_orders(), 0);
        assert_eq!(engine.best_bid(), None);
        assert_eq!(engine.best_ask(), None);
    }

    #[test]
    fn test_partial_match_taker_remains() {
        let mut engine = engine();

        run(&mut engine, create(1, 100, Side::Ask, 10000, 50));
        let events = run(&mut engine, create(2, 200, Side::Bid, 10000, 100));

        assert_eq!(trades(&events).len(), 1);
        assert_eq!(trades(&events)[0].qty, 50);

        let terminal = *acks(&events).last().unwrap();
        assert_eq!(terminal.order_id, 2);
        assert_eq!(terminal.status, AckStatus::NewAccepted);
        assert_eq!(terminal.qty, 50);

        assert_eq!(engine.live_orders(), 1);
        assert_eq!(engine.best_bid(), Some(10000));
        assert_eq!(engine.best_ask(), None);
    }

    #[test]
    fn test_partial_match_maker_remains() {
        let mut engine = engine();

        run(&mut engine, create(1, 100, Side::Ask, 10000, 100));
        run(&mut engine, create(2, 200, Side::Bid, 10000, 30));

        assert_eq!(engine.live_orders(), 1);
        assert_eq!(engine.best_ask(), Some(10000));
        assert_eq!(engine.book.depth_at(Side::Ask, 10000), (70, 1));
    }

    #[test]
    fn test_match_multiple_levels() {
        let mut engine = engine();

        run(&mut engine, create(1, 100, Side::Ask, 10000, 50));
        run(&mut engine, create(2, 100, Side::Ask, 10010, 50));
        run(&mut engine, create(3, 100, Side::Ask, 10020, 50));

        let events = run(&mut engine, create(4, 200, Side::Bid, 10020, 120));
        let trades = trades(&events);

        assert_eq!(trades.len(), 3);
        assert_eq!((trades[0].price, trades[0].qty), (10000, 50));
        assert_eq!((trades[1].price, trades[1].qty), (10010, 50));
        assert_eq!((trades[2].price, trades[2].qty), (10020, 20));

        // 30 remaining at 10020
        assert_eq!(engine.live_orders(), 1);
        assert_eq!(engine.best_ask(), Some(10020));
    }

    #[test]
    fn test_execution_at_maker_price() {
        let mut engine = engine();

        run(&mut engine, create(1, 100, Side::Bid, 10050, 10));
        let events = run(&mut engine, create(2, 200, Side::Ask, 9000, 10));

        assert_eq!(trades(&events)[0].price, 10050);
    }

    #[test]
    fn test_cancel_order() {
        let mut engine = engine();
        run(&mut engine, create(1, 100, Side::Bid, 10000, 100));

        let events = run(&mut engine, request(RequestKind::Delete, 1, 100, Side::Bid, 0, 0));

        assert_eq!(
            events,
            vec![
                OutputEvent::Delta(BookDelta {
                    order_id: 1,
                    price: 10000,
                    qty: 100,
                    side: Side::Bid,
                    kind: DeltaKind::Delete,
                }),
                OutputEvent::Ack(Ack {
                    order_id: 1,
                    price: 10000,
                    qty: 100,
                    side: Side::Bid,
                    status: AckStatus::CancelAccepted,
                    trader_id: 100,
                }),
            ]
        );
        assert_eq!(engine.live_orders(), 0);
        assert_eq!(engine.best_bid(), None);
    }

    #[test]
    fn test_cancel_nonexistent_is_silent() {
        let mut engine = engine();

        let events = run(&mut engine, request(RequestKind::Delete, 999, 1, Side::Bid, 0, 0));
        assert!(events.is_empty());

        let events = run(&mut engine, request(RequestKind::Modify, 999, 1, Side::Bid, 10, 5));
        assert!(events.is_empty());
        assert_eq!(engine.stats().unknown_refs, 2);
    }

    #[test]
    fn test_double_cancel() {
        let mut engine = engine();
        run(&mut engine, create(1, 100, Side::Ask, 10000, 100));
        run(&mut engine, create(2, 100, Side::Ask, 10010, 100));

        run(&mut engine, request(RequestKind::Delete, 1, 100, Side::Ask, 0, 0));
        let events = run(&mut engine, request(RequestKind::Delete, 1, 100, Side::Ask, 0, 0));

        assert!(events.is_empty());
        assert_eq!(engine.live_orders(), 1);
        assert_eq!(engine.best_ask(), Some(10010));
    }

    #[test]
    fn test_duplicate_order_id_rejected() {
        let mut engine = engine();

        run(&mut engine, create(1, 100, Side::Bid, 10000, 100));
        let events = run(&mut engine, create(1, 200, Side::Ask, 10100, 50));

        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            OutputEvent::Ack(Ack { status: AckStatus::Rejected, .. })
        ));
        assert_eq!(engine.live_orders(), 1);
    }

    #[test]
    fn test_invalid_creates_rejected() {
        let mut engine = engine();

        for bad in [
            create(1, 100, Side::Bid, 10000, 0),
            create(2, 100, Side::Bid, config().price_ticks, 10),
            create(config().max_orders, 100, Side::Bid, 10000, 10),
        ] {
            let events = run(&mut engine, bad);
            assert_eq!(acks(&events).len(), 1);
            assert_eq!(acks(&events)[0].status, AckStatus::Rejected);
            assert!(deltas(&events).is_empty());
        }

        assert_eq!(engine.live_orders(), 0);
        assert_eq!(engine.stats().rejected, 3);
    }

    #[test]
    fn test_fifo_order_priority() {
        let mut engine = engine();

        run(&mut engine, create(1, 100, Side::Ask, 10000, 100));
        run(&mut engine, create(2, 101, Side::Ask, 10000, 100));
        run(&mut engine, create(3, 102, Side::Ask, 10000, 100));

        let events = run(&mut engine, create(4, 200, Side::Bid, 10000, 200));
        let trades = trades(&events);

        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].sell_order_id, 1); // First in
        assert_eq!(trades[1].sell_order_id, 2); // Second in

        assert_eq!(engine.live_orders(), 1);
    }

    #[test]
    fn test_price_time_priority() {
        let mut engine = engine();

        run(&mut engine, create(1, 100, Side::Ask, 10020, 100)); // Worst
        run(&mut engine, create(2, 100, Side::Ask, 10000, 100)); // Best
        run(&mut engine, create(3, 100, Side::Ask, 10010, 100)); // Middle

        let events = run(&mut engine, create(4, 200, Side::Bid, 10020, 250));
        let prices: Vec<u32> = trades(&events).iter().map(|t| t.price).collect();

        assert_eq!(prices, vec![10000, 10010, 10020]);
    }

    #[test]
    fn test_self_trade_kills_aggressor() {
        let mut engine = engine();
        run(&mut engine, create(1, 7, Side::Ask, 10000, 100));

        let events = run(&mut engine, create(2, 7, Side::Bid, 10000, 40));

        assert!(trades(&events).is_empty());
        assert!(deltas(&events).is_empty());
        assert_eq!(
            acks(&events),
            vec![Ack {
                order_id: 2,
                price: 10000,
                qty: 40,
                side: Side::Bid,
                status: AckStatus::SelfTradeKilled,
                trader_id: 7,
            }]
        );

        // Resting order untouched, aggressor neither rested nor filled
        assert_eq!(engine.book.order(Side::Ask, 1).unwrap().qty, 100);
        assert_eq!(engine.book.order(Side::Bid, 2), None);
        assert_eq!(engine.best_bid(), None);
    }

    #[test]
    fn test_self_trade_after_partial_fills() {
        let mut engine = engine();
        run(&mut engine, create(1, 8, Side::Ask, 10000, 30));
        run(&mut engine, create(2, 7, Side::Ask, 10005, 30));

        let events = run(&mut engine, create(3, 7, Side::Bid, 10010, 100));

        assert_eq!(trades(&events).len(), 1);
        let terminal = *acks(&events).last().unwrap();
        assert_eq!(terminal.status, AckStatus::SelfTradeKilled);
        assert_eq!(terminal.qty, 70);
        assert_eq!(engine.best_ask(), Some(10005));
        assert_eq!(engine.best_bid(), None);
    }

    #[test]
    fn test_modify_decrease_keeps_priority() {
        let mut engine = engine();
        run(&mut engine, create(1, 100, Side::Ask, 10000, 100));
        run(&mut engine, create(2, 101, Side::Ask, 10000, 100));

        let events = run(&mut engine, request(RequestKind::Modify, 1, 100, Side::Ask, 10000, 40));
        assert_eq!(
            deltas(&events),
            vec![BookDelta {
                order_id: 1,
                price: 10000,
                qty: 40,
                side: Side::Ask,
                kind: DeltaKind::Update,
            }]
        );
        assert_eq!(acks(&events)[0].status, AckStatus::UpdateAccepted);

        // Order 1 is still first in line
        let events = run(&mut engine, create(3, 200, Side::Bid, 10000, 40));
        assert_eq!(trades(&events)[0].sell_order_id, 1);
    }

    #[test]
    fn test_modify_increase_loses_priority() {
        let mut engine = engine();
        run(&mut engine, create(1, 100, Side::Ask, 10000, 100));
        run(&mut engine, create(2, 101, Side::Ask, 10000, 100));

        let events = run(&mut engine, request(RequestKind::Modify, 1, 100, Side::Ask, 10000, 150));
        let kinds: Vec<DeltaKind> = deltas(&events).iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![DeltaKind::Delete, DeltaKind::Add]);
        assert_eq!(acks(&events)[0].status, AckStatus::UpdateAccepted);
        assert_eq!(acks(&events)[0].qty, 150);

        let events = run(&mut engine, create(3, 200, Side::Bid, 10000, 50));
        assert_eq!(trades(&events)[0].sell_order_id, 2);
    }

    #[test]
    fn test_modify_price_can_cross() {
        let mut engine = engine();
        run(&mut engine, create(1, 100, Side::Bid, 9900, 50));
        run(&mut engine, create(2, 200, Side::Ask, 10000, 20));

        // Move the bid through the ask
        let events = run(&mut engine, request(RequestKind::Modify, 1, 100, Side::Bid, 10000, 50));

        assert_eq!(trades(&events).len(), 1);
        assert_eq!(trades(&events)[0].qty, 20);
        let terminal = *acks(&events).last().unwrap();
        assert_eq!(terminal.status, AckStatus::UpdateAccepted);
        assert_eq!(terminal.qty, 30);
        assert_eq!(engine.best_bid(), Some(10000));
        assert_eq!(engine.best_ask(), None);
    }

    #[test]
    fn test_modify_to_zero_is_delete() {
        let mut engine = engine();
        run(&mut engine, create(1, 100, Side::Bid, 10000, 50));

        let events = run(&mut engine, request(RequestKind::Modify, 1, 100, Side::Bid, 10000, 0));

        assert_eq!(acks(&events)[0].status, AckStatus::CancelAccepted);
        assert_eq!(deltas(&events)[0].kind, DeltaKind::Delete);
        assert_eq!(engine.live_orders(), 0);
    }

    #[test]
    fn test_primary_only_ack_policy() {
        let mut engine = MatchingEngine::new(&config(), AckPolicy::PrimaryOnly { primary_trader: 0 });

        let events = run(&mut engine, create(1, 5, Side::Ask, 10000, 10));
        assert!(acks(&events).is_empty());
        assert_eq!(deltas(&events).len(), 1);

        let events = run(&mut engine, create(2, 0, Side::Bid, 10000, 10));
        let acks = acks(&events);
        // Trade ack for the primary taker plus its terminal ack; none for trader 5
        assert_eq!(acks.len(), 2);
        assert!(acks.iter().all(|a| a.trader_id == 0));
        assert_eq!(acks[0].status, AckStatus::Trade);
        assert_eq!(acks[1].status, AckStatus::NewAccepted);
    }

    #[test]
    fn test_end_to_end_cross_empties_book() {
        let mut engine = engine();

        run(&mut engine, create(1, 1, Side::Bid, 10000, 10));
        let events = run(&mut engine, create(2, 2, Side::Ask, 10000, 10));

        let trades = trades(&events);
        assert_eq!(trades.len(), 1);
        assert_eq!((trades[0].price, trades[0].qty), (10000, 10));
        assert_eq!(engine.book.order(Side::Bid, 1), None);
        assert_eq!(engine.book.order(Side::Ask, 2), None);
        assert_eq!(engine.best_bid(), None);
        assert_eq!(engine.best_ask(), None);
    }

    #[test]
    fn test_id_reused_after_fill() {
        let mut engine = engine();
        run(&mut engine, create(1, 1, Side::Bid, 10000, 10));
        run(&mut engine, create(2, 2, Side::Ask, 10000, 10));

        let events = run(&mut engine, create(1, 3, Side::Ask, 11000, 5));
        assert_eq!(acks(&events)[0].status, AckStatus::NewAccepted);
        assert_eq!(engine.book.order(Side::Ask, 1).unwrap().trader_id, 3);
    }
}
