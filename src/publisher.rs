//! Publisher - market-data fan-out stage.
//!
//! Copies each book delta to every subscriber channel, in engine order. A
//! delta is consumed only once all subscribers have room for it, so a slow
//! subscriber stalls the feed rather than causing gaps or partial broadcasts.

use arrayvec::ArrayVec;
use tracing::{info, warn};

use crate::command::BookDelta;
use crate::config::MAX_SUBSCRIBERS;
use crate::pipeline::RunState;
use crate::ring::{Consumer, Producer};

/// Subscriber channel ends, stored inline.
pub type Subscribers = ArrayVec<Producer<BookDelta>, MAX_SUBSCRIBERS>;

/// Channel ends owned by the publisher stage.
pub struct PublisherIo {
    pub deltas: Consumer<BookDelta>,
    pub subscribers: Subscribers,
}

/// What the publisher stage did over its lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublisherReport {
    /// Deltas delivered to every subscriber
    pub published: u64,
    /// Poll cycles spent waiting on a full subscriber
    pub stalls: u64,
}

/// The fan-out stage.
#[derive(Debug, Default)]
pub struct Publisher {
    report: PublisherReport,
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn report(&self) -> PublisherReport {
        self.report
    }

    /// Broadcast the oldest pending delta if every subscriber has room.
    ///
    /// # Returns
    /// True if a delta was consumed.
    pub fn publish_one(&mut self, io: &mut PublisherIo) -> bool {
        let Some(&delta) = io.deltas.peek_read() else {
            return false;
        };
        if io.subscribers.iter_mut().any(|subscriber| subscriber.is_full()) {
            self.report.stalls += 1;
            return false;
        }

        for subscriber in io.subscribers.iter_mut() {
            // Room was checked above and only this thread writes here
            let pushed = subscriber.push(delta).is_ok();
            debug_assert!(pushed, "subscriber filled up between check and push");
        }
        io.deltas.commit_read();
        self.report.published += 1;
        true
    }

    /// Run the stage loop until `run_state` says stop.
    pub fn run(&mut self, io: &mut PublisherIo, run_state: &RunState) -> PublisherReport {
        run_state.wait_for_start();
        info!(subscribers = io.subscribers.len(), "publisher stage running");

        while run_state.is_running() {
            if !self.publish_one(io) {
                std::hint::spin_loop();
            }
        }

        if self.report.stalls > 0 {
            warn!(stalls = self.report.stalls, "publisher stalled on slow subscribers");
        }
        info!(published = self.report.published, "publisher stage stopped");
        self.report
    }
}
