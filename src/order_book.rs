//! Order Book - price-indexed levels per side with O(1) order lookup.
//!
//! Each side is a dense array of [`PriceLevel`]s indexed by tick, plus a
//! lookup table indexed by internal order id that records where each live
//! order sits. The best-price cursor is only recomputed when the level it
//! points at drains, by scanning away from the spread.
//!
//! ```text
//!   bids:  ... [99] [100] [101]*          * best bid (highest live)
//!   asks:           [102]* [103] [104] ... * best ask (lowest live)
//! ```

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::command::Side;
use crate::config::BookConfig;
use crate::price_level::{PriceLevel, RestingOrder};

/// Where a live order sits: price index and slot within that level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    pub price: u32,
    pub slot: u32,
}

/// A live order as seen from outside the book.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderView {
    pub order_id: u32,
    pub side: Side,
    pub price: u32,
    pub qty: u32,
    pub trader_id: u16,
}

/// One side of the book (all bids or all asks).
pub struct BookSide {
    side: Side,
    /// One level per tick
    levels: Vec<PriceLevel>,
    /// Internal id -> location, `None` when not live on this side
    lookup: Vec<Option<Location>>,
    /// Highest live bid / lowest live ask; `None` when the side is empty
    best: Option<u32>,
    live: u32,
    level_reserve: usize,
}

impl BookSide {
    pub fn new(side: Side, config: &BookConfig) -> Self {
        Self {
            side,
            levels: vec![PriceLevel::new(); config.price_ticks as usize],
            lookup: vec![None; config.max_orders as usize],
            best: None,
            live: 0,
            level_reserve: config.level_capacity as usize,
        }
    }

    #[inline]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Best price index, or `None` if there are no live orders.
    #[inline]
    pub fn best(&self) -> Option<u32> {
        self.best
    }

    /// Number of live orders on this side.
    #[inline]
    pub fn live_orders(&self) -> u32 {
        self.live
    }

    /// Number of price indices.
    #[inline]
    pub fn width(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Size of the internal id space.
    #[inline]
    pub fn id_space(&self) -> u32 {
        self.lookup.len() as u32
    }

    /// Returns true if `price` is more aggressive than `other` for this side.
    #[inline]
    fn improves(&self, price: u32, other: u32) -> bool {
        match self.side {
            Side::Bid => price > other,
            Side::Ask => price < other,
        }
    }

    #[inline]
    pub fn level(&self, price: u32) -> Option<&PriceLevel> {
        self.levels.get(price as usize)
    }

    /// Location of a live order.
    #[inline]
    pub fn locate(&self, order_id: u32) -> Option<Location> {
        self.lookup.get(order_id as usize).copied().flatten()
    }

    #[inline]
    pub fn contains(&self, order_id: u32) -> bool {
        self.locate(order_id).is_some()
    }

    /// A live order by internal id.
    pub fn order(&self, order_id: u32) -> Option<OrderView> {
        let location = self.locate(order_id)?;
        let resting = self.levels[location.price as usize].get(location.slot);
        Some(OrderView {
            order_id,
            side: self.side,
            price: location.price,
            qty: resting.qty,
            trader_id: resting.trader_id,
        })
    }

    /// Append an order to the back of its level.
    ///
    /// The caller has checked that `price` is inside the book, `order_id`
    /// is inside the id space and not live, and `qty` is non-zero.
    ///
    /// # Complexity
    /// O(1)
    pub fn insert(&mut self, order_id: u32, trader_id: u16, price: u32, qty: u32) {
        debug_assert!(qty > 0);
        debug_assert!(!self.contains(order_id));

        let slot = self.levels[price as usize].push(
            RestingOrder {
                order_id,
                qty,
                trader_id,
            },
            self.level_reserve,
        );
        self.lookup[order_id as usize] = Some(Location { price, slot });
        self.live += 1;

        if self.best.map_or(true, |best| self.improves(price, best)) {
            self.best = Some(price);
        }
    }

    /// Lower a live order's quantity in place (priority kept).
    pub fn reduce(&mut self, order_id: u32, new_qty: u32) -> bool {
        let Some(location) = self.locate(order_id) else {
            return false;
        };
        self.levels[location.price as usize].reduce(location.slot, new_qty);
        true
    }

    /// Remove a live order (lazy deletion).
    ///
    /// # Returns
    /// The order as it was just before removal, or `None` if it was not live
    /// (a second delete is a no-op).
    ///
    /// # Complexity
    /// O(1), plus a scan away from the spread if this emptied the best level
    pub fn remove(&mut self, order_id: u32) -> Option<OrderView> {
        let view = self.order(order_id)?;
        let location = self.lookup[order_id as usize].take()?;

        let level = &mut self.levels[location.price as usize];
        level.kill(location.slot);
        self.live -= 1;
        if level.is_empty() && self.best == Some(location.price) {
            self.glide_best();
        }
        Some(view)
    }

    /// First live order at the best price, skipping dead ones.
    #[inline]
    pub fn front(&mut self) -> Option<(u32, u32, RestingOrder)> {
        let price = self.best?;
        let (slot, order) = self.levels[price as usize].front()?;
        Some((price, slot, order))
    }

    /// Take `qty` from the order at (`price`, `slot`).
    ///
    /// # Returns
    /// The maker's remaining quantity. A fully filled order leaves the
    /// lookup table and, if its level drained, the cursor moves on.
    pub fn fill(&mut self, price: u32, slot: u32, qty: u32) -> u32 {
        let level = &mut self.levels[price as usize];
        let order_id = level.get(slot).order_id;
        let remaining = level.fill(slot, qty);

        if remaining == 0 {
            self.lookup[order_id as usize] = None;
            self.live -= 1;
            if self.levels[price as usize].is_empty() && self.best == Some(price) {
                self.glide_best();
            }
        }
        remaining
    }

    /// Move the cursor away from the spread to the next level with a live
    /// order, or to `None`.
    ///
    /// # Complexity
    /// O(book width) worst case
    fn glide_best(&mut self) {
        let Some(start) = self.best else {
            return;
        };
        self.best = match self.side {
            Side::Bid => (0..start)
                .rev()
                .find(|&price| !self.levels[price as usize].is_empty()),
            Side::Ask => (start + 1..self.width())
                .find(|&price| !self.levels[price as usize].is_empty()),
        };
    }

    /// (total quantity, live order count) at a price.
    pub fn depth_at(&self, price: u32) -> (u64, u32) {
        self.level(price)
            .map(|level| (level.total_qty(), level.live_count()))
            .unwrap_or((0, 0))
    }

    /// Pre-fault the lookup table and level array.
    pub fn warm_up(&mut self) {
        for entry in self.lookup.iter_mut() {
            let current = *entry;
            // SAFETY: `entry` is a valid, exclusive reference.
            // Volatile write to prevent optimization
            unsafe { std::ptr::write_volatile(entry, current) };
        }
        for level in self.levels.iter() {
            std::hint::black_box(level.live_count());
        }
    }

    fn hash_into(&self, hasher: &mut impl Hasher) {
        self.best.hash(hasher);
        self.live.hash(hasher);
        for (price, level) in self.levels.iter().enumerate() {
            if level.is_empty() {
                continue;
            }
            price.hash(hasher);
            for (_, order) in level.iter_live() {
                order.hash(hasher);
            }
        }
    }
}

/// The bid/ask pair.
pub struct OrderBook {
    pub bids: BookSide,
    pub asks: BookSide,
}

impl OrderBook {
    pub fn new(config: &BookConfig) -> Self {
        Self {
            bids: BookSide::new(Side::Bid, config),
            asks: BookSide::new(Side::Ask, config),
        }
    }

    // ========================================================================
    // Side Access
    // ========================================================================

    #[inline]
    pub fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    #[inline]
    pub fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    /// Side an internal id is currently live on.
    #[inline]
    pub fn locate(&self, order_id: u32) -> Option<Side> {
        if self.bids.contains(order_id) {
            Some(Side::Bid)
        } else if self.asks.contains(order_id) {
            Some(Side::Ask)
        } else {
            None
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Get the best bid price (highest buy price)
    #[inline]
    pub fn best_bid(&self) -> Option<u32> {
        self.bids.best()
    }

    /// Get the best ask price (lowest sell price)
    #[inline]
    pub fn best_ask(&self) -> Option<u32> {
        self.asks.best()
    }

    /// Calculate spread (best_ask - best_bid)
    pub fn spread(&self) -> Option<u32> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) if ask > bid => Some(ask - bid),
            _ => None,
        }
    }

    /// Get depth at a price level
    pub fn depth_at(&self, side: Side, price: u32) -> (u64, u32) {
        self.side(side).depth_at(price)
    }

    /// Live orders across both sides.
    pub fn live_orders(&self) -> u32 {
        self.bids.live_orders() + self.asks.live_orders()
    }

    /// A live order on the given side.
    pub fn order(&self, side: Side, order_id: u32) -> Option<OrderView> {
        self.side(side).order(order_id)
    }

    /// Hash of everything that affects future matching (for determinism
    /// testing).
    pub fn state_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.bids.hash_into(&mut hasher);
        self.asks.hash_into(&mut hasher);
        hasher.finish()
    }

    /// Pre-fault memory pages.
    pub fn warm_up(&mut self) {
        self.bids.warm_up();
        self.asks.warm_up();
    }
}
