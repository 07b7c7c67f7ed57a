//! Synthetic order flow for one participant.
//!
//! A seeded ChaCha8 stream drives a random-walk mid price. Each step either
//! creates an order near the mid or modifies/deletes one of the participant's
//! own live orders. Feeding client acks back through [`OrderFlow::on_ack`]
//! keeps the live set honest as orders fill; without it the flow will
//! occasionally reference dead orders, which the pipeline drops.
//!
//! External ids are `sequence * 100 + trader_id`, unique across participants
//! as long as trader ids stay below 100.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::command::{AckStatus, ClientAck, ClientOrder, RequestKind, Side};

/// Shape of one participant's flow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub trader_id: u16,
    pub seed: u64,
    /// Starting mid price in ticks
    pub start_mid: u32,
    pub tick_size: Decimal,
    /// Creates land within this many ticks of the mid, either way
    pub max_offset: u32,
    pub max_qty: u32,
    /// Share of steps that modify a live order
    pub modify_ratio: f64,
    /// Share of steps that delete a live order
    pub delete_ratio: f64,
    /// Stop creating once this many orders are believed live
    pub max_live: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            trader_id: 1,
            seed: 42,
            start_mid: 10_000,
            tick_size: Decimal::new(1, 2),
            max_offset: 20,
            max_qty: 100,
            modify_ratio: 0.15,
            delete_ratio: 0.20,
            max_live: 1_000,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct LiveOrder {
    order_id: u64,
    side: Side,
    price: u32,
    qty: u32,
}

/// Deterministic order generator.
pub struct OrderFlow {
    config: FlowConfig,
    rng: ChaCha8Rng,
    mid: u32,
    sequence: u64,
    live: Vec<LiveOrder>,
    /// External id -> position in `live`
    positions: FxHashMap<u64, usize>,
}

impl OrderFlow {
    /// A `max_qty` of zero is raised to one.
    pub fn new(mut config: FlowConfig) -> Self {
        config.max_qty = config.max_qty.max(1);
        Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            mid: config.start_mid.max(config.max_offset + 1),
            sequence: 0,
            live: Vec::with_capacity(config.max_live),
            positions: FxHashMap::default(),
            config,
        }
    }

    /// Orders this participant believes are resting.
    #[inline]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    #[inline]
    pub fn mid(&self) -> u32 {
        self.mid
    }

    #[inline]
    pub fn trader_id(&self) -> u16 {
        self.config.trader_id
    }

    /// Produce the next order.
    pub fn next_order(&mut self) -> ClientOrder {
        self.walk_mid();

        let roll: f64 = self.rng.gen();
        let can_create = self.live.len() < self.config.max_live;
        if !self.live.is_empty() {
            if roll < self.config.delete_ratio || !can_create {
                return self.delete();
            }
            if roll < self.config.delete_ratio + self.config.modify_ratio {
                return self.modify();
            }
        }
        self.create()
    }

    /// Update the live set from an acknowledgement addressed to this trader.
    pub fn on_ack(&mut self, ack: &ClientAck) {
        if ack.trader_id != self.config.trader_id {
            return;
        }
        match ack.status {
            AckStatus::Trade => {
                if let Some(&position) = self.positions.get(&ack.order_id) {
                    let order = &mut self.live[position];
                    order.qty = order.qty.saturating_sub(ack.qty);
                    if order.qty == 0 {
                        self.forget(ack.order_id);
                    }
                }
            }
            AckStatus::NewAccepted | AckStatus::UpdateAccepted => {
                if ack.qty == 0 {
                    self.forget(ack.order_id);
                } else if let Some(&position) = self.positions.get(&ack.order_id) {
                    self.live[position].qty = ack.qty;
                }
            }
            AckStatus::CancelAccepted | AckStatus::SelfTradeKilled | AckStatus::Rejected => {
                self.forget(ack.order_id);
            }
        }
    }

    fn walk_mid(&mut self) {
        let step: i64 = self.rng.gen_range(-1..=1);
        let floor = self.config.max_offset as i64 + 1;
        self.mid = (self.mid as i64 + step).max(floor) as u32;
    }

    fn price(&self, ticks: u32) -> Decimal {
        self.config.tick_size * Decimal::from(ticks)
    }

    fn next_id(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence * 100 + self.config.trader_id as u64
    }

    fn create(&mut self) -> ClientOrder {
        let side = if self.rng.gen_bool(0.5) { Side::Bid } else { Side::Ask };
        let offset = self.config.max_offset as i64;
        let price = (self.mid as i64 + self.rng.gen_range(-offset..=offset)) as u32;
        let qty = self.rng.gen_range(1..=self.config.max_qty);
        let order_id = self.next_id();

        self.remember(LiveOrder {
            order_id,
            side,
            price,
            qty,
        });
        ClientOrder {
            order_id,
            side,
            kind: RequestKind::Create,
            price: self.price(price),
            qty,
            trader_id: self.config.trader_id,
        }
    }

    fn modify(&mut self) -> ClientOrder {
        let position = self.rng.gen_range(0..self.live.len());
        let qty = self.rng.gen_range(1..=self.config.max_qty);
        // Half the time keep the price so smaller sizes can update in place
        let price = if self.rng.gen_bool(0.5) {
            self.live[position].price
        } else {
            let offset = self.config.max_offset as i64;
            (self.mid as i64 + self.rng.gen_range(-offset..=offset)) as u32
        };

        let order = &mut self.live[position];
        order.price = price;
        order.qty = qty;
        ClientOrder {
            order_id: order.order_id,
            side: order.side,
            kind: RequestKind::Modify,
            price: self.config.tick_size * Decimal::from(price),
            qty,
            trader_id: self.config.trader_id,
        }
    }

    fn delete(&mut self) -> ClientOrder {
        let position = self.rng.gen_range(0..self.live.len());
        let order = self.live[position];
        self.forget(order.order_id);
        ClientOrder {
            order_id: order.order_id,
            side: order.side,
            kind: RequestKind::Delete,
            price: self.price(order.price),
            qty: 0,
            trader_id: self.config.trader_id,
        }
    }

    fn remember(&mut self, order: LiveOrder) {
        self.positions.insert(order.order_id, self.live.len());
        self.live.push(order);
    }

    fn forget(&mut self, order_id: u64) {
        let Some(position) = self.positions.remove(&order_id) else {
            return;
        };
        self.live.swap_remove(position);
        if let Some(moved) = self.live.get(position) {
            self.positions.insert(moved.order_id, position);
        }
    }
}

impl Iterator for OrderFlow {
    type Item = ClientOrder;

    fn next(&mut self) -> Option<ClientOrder> {
        Some(self.next_order())
    }
}
