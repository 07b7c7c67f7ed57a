//! Price Level - append-only FIFO of orders at one price, with lazy deletion.
//!
//! Orders are never removed from the middle. Cancelling or filling an order
//! zeroes its quantity in place; the head cursor skips dead orders the next
//! time the front of the queue is needed.
//!
//! ```text
//!   [ dead | dead | live | dead | live | live ]
//!                   ^
//!                  head (first possibly-live slot)
//! ```
//!
//! When the last live order goes, the level resets (length 0, head 0) and
//! keeps its allocation, so a busy price does not grow without bound.

/// An order resting in a level. Price and side are implied by where it sits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RestingOrder {
    /// Internal order id
    pub order_id: u32,
    /// Remaining quantity (0 = dead)
    pub qty: u32,
    pub trader_id: u16,
}

impl RestingOrder {
    #[inline]
    pub const fn is_live(&self) -> bool {
        self.qty != 0
    }
}

/// All orders at a single price, in arrival order.
#[derive(Clone, Debug, Default)]
pub struct PriceLevel {
    orders: Vec<RestingOrder>,
    /// Every slot before this is dead
    head: usize,
    /// Orders with non-zero quantity
    live: u32,
    /// Sum of live quantities
    total_qty: u64,
}

impl PriceLevel {
    /// Create an empty level. Storage is reserved on first use.
    #[inline]
    pub const fn new() -> Self {
        Self {
            orders: Vec::new(),
            head: 0,
            live: 0,
            total_qty: 0,
        }
    }

    /// Returns true if there are no live orders at this level
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of live orders.
    #[inline]
    pub const fn live_count(&self) -> u32 {
        self.live
    }

    /// Total live quantity.
    #[inline]
    pub const fn total_qty(&self) -> u64 {
        self.total_qty
    }

    /// Slots in use, dead ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Position of the head cursor.
    #[inline]
    pub const fn head(&self) -> usize {
        self.head
    }

    /// Append an order at the back of the queue (lowest time priority).
    ///
    /// `reserve` is the number of slots to reserve the first time this level
    /// is used.
    ///
    /// # Returns
    /// The slot the order landed in.
    ///
    /// # Complexity
    /// O(1) amortized
    #[inline]
    pub fn push(&mut self, order: RestingOrder, reserve: usize) -> u32 {
        debug_assert!(order.is_live());
        if self.orders.capacity() == 0 {
            self.orders.reserve(reserve);
        }
        self.orders.push(order);
        self.live += 1;
        self.total_qty += order.qty as u64;
        (self.orders.len() - 1) as u32
    }

    /// Read the order at `slot`.
    #[inline]
    pub fn get(&self, slot: u32) -> &RestingOrder {
        &self.orders[slot as usize]
    }

    /// Advance the head cursor past dead orders and return the first live
    /// one, if any.
    ///
    /// # Complexity
    /// O(1) amortized (each dead slot is skipped once)
    #[inline]
    pub fn front(&mut self) -> Option<(u32, RestingOrder)> {
        while let Some(order) = self.orders.get(self.head) {
            if order.is_live() {
                return Some((self.head as u32, *order));
            }
            self.head += 1;
        }
        None
    }

    /// Lower the quantity of a live order in place (keeps its priority).
    #[inline]
    pub fn reduce(&mut self, slot: u32, new_qty: u32) {
        let order = &mut self.orders[slot as usize];
        debug_assert!(new_qty > 0 && new_qty < order.qty);
        self.total_qty -= (order.qty - new_qty) as u64;
        order.qty = new_qty;
    }

    /// Take `qty` from a live order.
    ///
    /// # Returns
    /// The order's remaining quantity. At zero the order is dead and, if it
    /// was the last live one, the level has been reset.
    #[inline]
    pub fn fill(&mut self, slot: u32, qty: u32) -> u32 {
        let order = &mut self.orders[slot as usize];
        debug_assert!(qty > 0 && qty <= order.qty);
        order.qty -= qty;
        self.total_qty -= qty as u64;

        let remaining = order.qty;
        if remaining == 0 {
            self.retire();
        }
        remaining
    }

    /// Mark the order at `slot` dead (lazy deletion).
    ///
    /// # Returns
    /// The quantity it still had, or 0 if it was already dead (no-op).
    #[inline]
    pub fn kill(&mut self, slot: u32) -> u32 {
        let Some(order) = self.orders.get_mut(slot as usize) else {
            return 0;
        };
        let qty = std::mem::take(&mut order.qty);
        if qty != 0 {
            self.total_qty -= qty as u64;
            self.retire();
        }
        qty
    }

    /// Account for one order going dead.
    #[inline]
    fn retire(&mut self) {
        self.live -= 1;
        if self.live == 0 {
            self.orders.clear();
            self.head = 0;
            debug_assert_eq!(self.total_qty, 0);
        }
    }

    /// Live orders from the head, in priority order.
    pub fn iter_live(&self) -> impl Iterator<Item = (u32, &RestingOrder)> + '_ {
        self.orders[self.head..]
            .iter()
            .enumerate()
            .filter(|(_, order)| order.is_live())
            .map(move |(offset, order)| ((self.head + offset) as u32, order))
    }
}
