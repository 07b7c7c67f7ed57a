//! Engine - matching-core stage loop.
//!
//! Wraps the matching engine with I/O over the SPSC channels: requests are
//! read in place from every inbound channel, acks and book deltas are written
//! to their outbound channels. A full outbound channel drops the record and
//! counts it; the loop never blocks.

use hdrhistogram::Histogram;
use tracing::{info, warn};

use crate::clock::{self, LatencySummary};
use crate::command::{Ack, BookDelta, OrderRequest, OutputEvent};
use crate::config::{AckPolicy, BookConfig};
use crate::matching::{EventSink, MatchStats, MatchingEngine};
use crate::pipeline::RunState;
use crate::ring::{Consumer, Producer};

/// Channel ends owned by the engine stage.
pub struct EngineIo {
    /// Order-intent channels, drained round-robin
    pub inputs: Vec<Consumer<OrderRequest>>,
    pub acks: Producer<Ack>,
    pub deltas: Producer<BookDelta>,
}

/// Forwards matching output to the outbound channels.
struct ChannelSink<'a> {
    acks: &'a mut Producer<Ack>,
    deltas: &'a mut Producer<BookDelta>,
    dropped_acks: u64,
    dropped_deltas: u64,
}

impl EventSink for ChannelSink<'_> {
    #[inline]
    fn ack(&mut self, ack: Ack) {
        if self.acks.push(ack).is_err() {
            self.dropped_acks += 1;
        }
    }

    #[inline]
    fn delta(&mut self, delta: BookDelta) {
        if self.deltas.push(delta).is_err() {
            self.dropped_deltas += 1;
        }
    }
}

/// What the engine stage did over its lifetime.
#[derive(Clone, Copy, Debug, Default)]
pub struct EngineReport {
    /// Requests consumed from all inputs
    pub processed: u64,
    pub stats: MatchStats,
    pub dropped_acks: u64,
    pub dropped_deltas: u64,
    /// Gateway commit to engine pickup
    pub hop_latency: LatencySummary,
    pub live_orders: u32,
    pub state_hash: u64,
}

/// The matching-core stage.
pub struct Engine {
    /// The underlying matching engine
    pub matcher: MatchingEngine,
}

impl Engine {
    /// Create an engine with an empty book.
    pub fn new(config: &BookConfig, ack_policy: AckPolicy) -> Self {
        Self {
            matcher: MatchingEngine::new(config, ack_policy),
        }
    }

    /// Run the stage loop until `run_state` says stop.
    ///
    /// Waits for the start signal, then busy-polls each input once per
    /// cycle. Each request is processed in place and only then released.
    pub fn run(
        &mut self,
        io: &mut EngineIo,
        run_state: &RunState,
    ) -> Result<EngineReport, hdrhistogram::CreationError> {
        let mut hop: Histogram<u64> = clock::latency_histogram()?;
        let mut sink = ChannelSink {
            acks: &mut io.acks,
            deltas: &mut io.deltas,
            dropped_acks: 0,
            dropped_deltas: 0,
        };
        let mut processed = 0u64;

        self.warm_up();
        run_state.wait_for_start();
        info!(inputs = io.inputs.len(), "engine stage running");

        // Main event loop (busy-wait)
        while run_state.is_running() {
            let mut idle = true;
            for input in io.inputs.iter_mut() {
                let Some(request) = input.peek_read() else {
                    continue;
                };
                hop.saturating_record(clock::now_nanos().saturating_sub(request.sent_at));
                self.matcher.process(request, &mut sink);
                input.commit_read();
                processed += 1;
                idle = false;
            }
            if idle {
                std::hint::spin_loop();
            }
        }

        let report = EngineReport {
            processed,
            stats: self.matcher.stats(),
            dropped_acks: sink.dropped_acks,
            dropped_deltas: sink.dropped_deltas,
            hop_latency: LatencySummary::from_histogram(&hop),
            live_orders: self.matcher.live_orders(),
            state_hash: self.matcher.state_hash(),
        };
        if report.dropped_acks > 0 || report.dropped_deltas > 0 {
            warn!(
                dropped_acks = report.dropped_acks,
                dropped_deltas = report.dropped_deltas,
                "engine dropped outbound records on full channels"
            );
        }
        info!(
            processed,
            trades = report.stats.trades,
            volume = report.stats.volume,
            live_orders = report.live_orders,
            "engine stage stopped"
        );
        Ok(report)
    }

    /// Process a single request and return everything it emitted, in order.
    ///
    /// This is the main entry point for synchronous usage (testing, benchmarks).
    #[inline]
    pub fn process(&mut self, request: &OrderRequest) -> Vec<OutputEvent> {
        let mut events = Vec::new();
        self.matcher.process(request, &mut events);
        events
    }

    /// Process into a caller-owned buffer (avoids a fresh allocation per call).
    #[inline]
    pub fn process_into(&mut self, request: &OrderRequest, events: &mut Vec<OutputEvent>) {
        self.matcher.process(request, events);
    }

    /// Warm up the engine by pre-faulting memory pages.
    pub fn warm_up(&mut self) {
        self.matcher.warm_up();
    }

    /// Get the best bid price.
    #[inline]
    pub fn best_bid(&self) -> Option<u32> {
        self.matcher.best_bid()
    }

    /// Get the best ask price.
    #[inline]
    pub fn best_ask(&self) -> Option<u32> {
        self.matcher.best_ask()
    }

    /// Get the spread.
    #[inline]
    pub fn spread(&self) -> Option<u32> {
        self.matcher.spread()
    }

    /// Live orders across both sides.
    #[inline]
    pub fn live_orders(&self) -> u32 {
        self.matcher.live_orders()
    }

    /// Compute state hash for determinism testing.
    #[inline]
    pub fn state_hash(&self) -> u64 {
        self.matcher.state_hash()
    }
}
