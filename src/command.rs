//! Channel record types.
//!
//! Every record is a small `Copy` value so it can be written straight into a
//! ring-buffer slot and read in place on the other side. No record refers
//! into another stage's memory.
//!
//! Internal records ([`OrderRequest`], [`Ack`], [`BookDelta`]) carry prices as
//! integer ticks and compact u32 ids. Originator-facing records
//! ([`ClientOrder`], [`ClientAck`]) carry decimal prices and the client's own
//! 64-bit ids; the gateway translates between the two.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (bid = buy, ask = sell)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    #[default]
    Bid = 0,
    /// Sell side (asks)
    Ask = 1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

/// What an order-intent record asks the matching core to do.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum RequestKind {
    #[default]
    Create = 0,
    Modify = 1,
    Delete = 2,
}

// ============================================================================
// Gateway -> Matching Core
// ============================================================================

/// Order intent, already translated to internal ids and ticks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OrderRequest {
    /// When the client order reached the gateway (ns, [`crate::clock`])
    pub arrived_at: u64,
    /// Internal id (index into the book's lookup table)
    pub order_id: u32,
    pub side: Side,
    pub kind: RequestKind,
    /// Price index in ticks from the grid minimum
    pub price: u32,
    pub qty: u32,
    pub trader_id: u16,
    /// When the gateway committed this record (ns)
    pub sent_at: u64,
}

// ============================================================================
// Matching Core -> Gateway / Fan-out
// ============================================================================

/// Outcome reported to the originator of an order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AckStatus {
    /// Create processed; qty is what rested (0 if it filled on arrival)
    #[default]
    NewAccepted = 0,
    /// Modify processed; qty is the new resting quantity
    UpdateAccepted = 1,
    /// Delete processed; qty is what was cancelled
    CancelAccepted = 2,
    /// One fill; qty is the fill size, price the execution price
    Trade = 3,
    /// Aggressor cancelled because it would have traded with its own order
    SelfTradeKilled = 4,
    /// Request refused without touching the book
    Rejected = 5,
}

/// Acknowledgement record (matching core -> gateway).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Ack {
    pub order_id: u32,
    pub price: u32,
    pub qty: u32,
    pub side: Side,
    pub status: AckStatus,
    pub trader_id: u16,
}

/// Kind of book change in a [`BookDelta`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum DeltaKind {
    /// Order rested; qty is its full resting size
    #[default]
    Add = 0,
    /// Resting order reduced in place; qty is the new balance
    Update = 1,
    /// Resting order removed by its owner
    Delete = 2,
    /// Resting order hit; qty is the amount traded
    Trade = 3,
}

/// Book-change notification (matching core -> fan-out).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BookDelta {
    pub order_id: u32,
    pub price: u32,
    pub qty: u32,
    pub side: Side,
    pub kind: DeltaKind,
}

/// One execution. Price is always the maker's price.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Trade {
    pub buy_order_id: u32,
    pub sell_order_id: u32,
    pub buy_trader_id: u16,
    pub sell_trader_id: u16,
    pub price: u32,
    pub qty: u32,
    pub aggressor: Side,
}

/// Everything the matching core can emit, in emission order.
///
/// Used by the synchronous [`crate::engine::Engine::process`] path; the
/// threaded path writes acks and deltas to separate channels instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputEvent {
    Ack(Ack),
    Delta(BookDelta),
    Trade(Trade),
}

// ============================================================================
// Originator <-> Gateway
// ============================================================================

/// Order as an originator submits it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOrder {
    /// Client-chosen id, unique per originator
    pub order_id: u64,
    pub side: Side,
    pub kind: RequestKind,
    pub price: Decimal,
    pub qty: u32,
    pub trader_id: u16,
}

/// Acknowledgement as an originator receives it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAck {
    pub order_id: u64,
    pub price: Decimal,
    pub qty: u32,
    pub side: Side,
    pub status: AckStatus,
    pub trader_id: u16,
}
