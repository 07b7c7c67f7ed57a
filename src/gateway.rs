//! Gateway - ingress stage between originators and the matching core.
//!
//! Translates client orders (64-bit ids, decimal prices) into engine requests
//! (compact internal ids, integer ticks) and engine acks back into client
//! acks. Internal ids are handed out in arrival order and recorded in a
//! reverse array so the return path is a plain index.
//!
//! Every loop step is store-and-forward: an input record is released only
//! after its output slot has been committed, so a full output channel stalls
//! the input instead of losing it.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{info, trace};

use crate::clock;
use crate::command::{Ack, AckStatus, ClientAck, ClientOrder, OrderRequest, RequestKind};
use crate::config::{AckPolicy, GridConfig, PipelineConfig};
use crate::error::{ConfigError, TranslateError};
use crate::id_index::IdIndex;
use crate::pipeline::RunState;
use crate::ring::{Consumer, Producer};

/// Decimal price <-> tick index mapping.
///
/// Prices between ticks truncate down to the tick below.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriceGrid {
    tick_size: Decimal,
    min_price: Decimal,
    ticks: u32,
}

impl PriceGrid {
    /// Grid of `ticks` indices starting at `config.min_price`.
    pub fn new(config: &GridConfig, ticks: u32) -> Self {
        Self {
            tick_size: config.tick_size,
            min_price: config.min_price,
            ticks,
        }
    }

    /// Tick index for `price`, or `None` if it falls outside the grid.
    pub fn to_ticks(&self, price: Decimal) -> Option<u32> {
        if price < self.min_price {
            return None;
        }
        let index = price
            .checked_sub(self.min_price)?
            .checked_div(self.tick_size)?
            .trunc()
            .to_u32()?;
        (index < self.ticks).then_some(index)
    }

    /// Decimal price of tick `ticks`.
    pub fn to_price(&self, ticks: u32) -> Decimal {
        self.min_price + self.tick_size * Decimal::from(ticks)
    }

    #[inline]
    pub fn ticks(&self) -> u32 {
        self.ticks
    }
}

/// Channel ends owned by the gateway stage.
pub struct GatewayIo {
    /// One channel per participant
    pub orders: Vec<Consumer<ClientOrder>>,
    pub requests: Producer<OrderRequest>,
    pub engine_acks: Consumer<Ack>,
    pub client_acks: Producer<ClientAck>,
}

/// What the gateway stage did over its lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GatewayReport {
    /// Requests committed to the engine
    pub forwarded: u64,
    /// Client orders answered with a gateway-side reject
    pub rejected: u64,
    /// Modify/delete for external ids never seen
    pub unknown: u64,
    /// Engine acks translated back to clients
    pub acks_returned: u64,
    /// Internal ids handed out
    pub ids_assigned: u32,
}

/// The ingress stage.
pub struct Gateway {
    index: IdIndex,
    /// Internal id -> external id
    external_ids: Vec<u64>,
    next_id: u32,
    grid: PriceGrid,
    ack_policy: AckPolicy,
    report: GatewayReport,
}

impl Gateway {
    /// Fails with the [`PipelineConfig::validate`] error for an invalid
    /// `config`, before anything is allocated.
    pub fn new(config: &PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            index: IdIndex::with_node_capacity(config.index.node_capacity),
            external_ids: vec![0; config.book.max_orders as usize],
            next_id: 0,
            grid: PriceGrid::new(&config.grid, config.book.price_ticks),
            ack_policy: config.ack_policy,
            report: GatewayReport::default(),
        })
    }

    #[inline]
    pub fn grid(&self) -> &PriceGrid {
        &self.grid
    }

    #[inline]
    pub fn report(&self) -> GatewayReport {
        GatewayReport {
            ids_assigned: self.next_id,
            ..self.report
        }
    }

    /// Internal id currently mapped to an external id.
    #[inline]
    pub fn internal_id(&self, external_id: u64) -> Option<u32> {
        self.index.find(external_id)
    }

    /// Turn a client order into an engine request stamped with `now` as its
    /// arrival time.
    ///
    /// A create takes the next internal id; the index and reverse array are
    /// only touched if translation succeeds.
    pub fn translate(
        &mut self,
        order: &ClientOrder,
        now: u64,
    ) -> Result<OrderRequest, TranslateError> {
        let (order_id, price) = match order.kind {
            RequestKind::Create => {
                if order.qty == 0 {
                    return Err(TranslateError::ZeroQuantity);
                }
                let price = self.grid.to_ticks(order.price).ok_or(TranslateError::OffGrid)?;
                if self.next_id as usize >= self.external_ids.len() {
                    return Err(TranslateError::IdSpaceExhausted);
                }
                let order_id = self.next_id;
                self.next_id += 1;
                self.index.insert(order.order_id, order_id);
                self.external_ids[order_id as usize] = order.order_id;
                (order_id, price)
            }
            RequestKind::Modify => {
                let order_id = self.lookup(order.order_id)?;
                let price = self.grid.to_ticks(order.price).ok_or(TranslateError::OffGrid)?;
                (order_id, price)
            }
            // Price is irrelevant to a delete
            RequestKind::Delete => (self.lookup(order.order_id)?, 0),
        };

        Ok(OrderRequest {
            arrived_at: now,
            order_id,
            side: order.side,
            kind: order.kind,
            price,
            qty: order.qty,
            trader_id: order.trader_id,
            sent_at: now,
        })
    }

    #[inline]
    fn lookup(&self, external_id: u64) -> Result<u32, TranslateError> {
        self.index
            .find(external_id)
            .ok_or(TranslateError::UnknownOrder(external_id))
    }

    /// Turn an engine ack into a client ack.
    pub fn translate_ack(&self, ack: &Ack) -> ClientAck {
        ClientAck {
            order_id: self
                .external_ids
                .get(ack.order_id as usize)
                .copied()
                .unwrap_or_default(),
            price: self.grid.to_price(ack.price),
            qty: ack.qty,
            side: ack.side,
            status: ack.status,
            trader_id: ack.trader_id,
        }
    }

    /// Client ack for an order the gateway refused.
    fn reject(order: &ClientOrder) -> ClientAck {
        ClientAck {
            order_id: order.order_id,
            price: order.price,
            qty: order.qty,
            side: order.side,
            status: AckStatus::Rejected,
            trader_id: order.trader_id,
        }
    }

    /// Run the stage loop until `run_state` says stop.
    pub fn run(&mut self, io: &mut GatewayIo, run_state: &RunState) -> GatewayReport {
        self.index.warm_up();
        run_state.wait_for_start();
        info!(sources = io.orders.len(), "gateway stage running");

        while run_state.is_running() {
            let mut idle = true;
            for source in 0..io.orders.len() {
                idle &= !self.forward_order(io, source);
            }
            // Acks outnumber requests, so drain them all each cycle
            while self.return_ack(io) {
                idle = false;
            }
            if idle {
                std::hint::spin_loop();
            }
        }

        let report = self.report();
        info!(
            forwarded = report.forwarded,
            rejected = report.rejected,
            unknown = report.unknown,
            acks_returned = report.acks_returned,
            "gateway stage stopped"
        );
        report
    }

    /// Move at most one client order from `source` towards the engine.
    /// Returns true if the input advanced.
    fn forward_order(&mut self, io: &mut GatewayIo, source: usize) -> bool {
        let input = &mut io.orders[source];
        let Some(order) = input.peek_read().copied() else {
            return false;
        };
        let Some(slot) = io.requests.claim_write() else {
            return false;
        };

        let now = clock::now_nanos();
        match self.translate(&order, now) {
            Ok(request) => {
                *slot = request;
                slot.sent_at = clock::now_nanos();
                io.requests.commit_write();
                self.report.forwarded += 1;
            }
            Err(TranslateError::UnknownOrder(external_id)) => {
                trace!(external_id, kind = ?order.kind, "unknown order reference dropped");
                self.report.unknown += 1;
            }
            Err(err) => {
                trace!(external_id = order.order_id, %err, "client order rejected");
                if self.ack_policy.admits(order.trader_id) {
                    // Leave the order queued until there is room for the reject
                    if io.client_acks.push(Self::reject(&order)).is_err() {
                        return false;
                    }
                }
                self.report.rejected += 1;
            }
        }

        io.orders[source].commit_read();
        true
    }

    /// Move at most one engine ack back to clients. Returns true if the
    /// input advanced.
    fn return_ack(&mut self, io: &mut GatewayIo) -> bool {
        let Some(ack) = io.engine_acks.peek_read() else {
            return false;
        };
        let Some(slot) = io.client_acks.claim_write() else {
            return false;
        };
        *slot = self.translate_ack(ack);
        io.client_acks.commit_write();
        io.engine_acks.commit_read();
        self.report.acks_returned += 1;
        true
    }
}
