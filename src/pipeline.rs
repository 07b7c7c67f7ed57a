//! Pipeline bootstrap.
//!
//! Builds every channel, constructs each stage with the state it owns, and
//! spawns one named thread per stage:
//!
//! ```text
//!  participants ──orders──▶ [gateway] ──requests──▶ [engine] ──deltas──▶ [publisher] ──▶ subscribers
//!        ▲                      ▲                      │
//!        └────client acks───────┴──────engine acks─────┘
//! ```
//!
//! Stages share nothing mutable. They are released together by
//! [`Pipeline::start`] and stopped by [`Pipeline::shutdown`] through a shared
//! [`RunState`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use crate::command::{Ack, BookDelta, ClientAck, ClientOrder, OrderRequest};
use crate::config::PipelineConfig;
use crate::engine::{Engine, EngineIo, EngineReport};
use crate::error::PipelineError;
use crate::gateway::{Gateway, GatewayIo, GatewayReport};
use crate::publisher::{Publisher, PublisherIo, PublisherReport, Subscribers};
use crate::ring::{channel, Consumer, Producer};

/// Start/stop flags observed by every stage once per poll iteration.
#[derive(Debug, Default)]
pub struct RunState {
    started: AtomicBool,
    stopped: AtomicBool,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release stages waiting in [`wait_for_start`](Self::wait_for_start).
    pub fn start(&self) {
        self.started.store(true, Ordering::Release);
    }

    /// Ask every stage to leave its loop. Also releases stages that never
    /// started.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.started.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
    }

    /// Block (yielding) until started or stopped.
    pub fn wait_for_start(&self) {
        while !self.started.load(Ordering::Acquire) {
            thread::yield_now();
        }
    }
}

/// Participant-facing channel ends returned by [`Pipeline::launch`].
pub struct Endpoints {
    /// One order channel per participant
    pub orders: Vec<Producer<ClientOrder>>,
    /// Acks for every participant; filter on `trader_id`
    pub client_acks: Consumer<ClientAck>,
    /// One market-data feed per subscriber
    pub market_data: Vec<Consumer<BookDelta>>,
}

/// Final reports of all stages.
#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineReport {
    pub gateway: GatewayReport,
    pub engine: EngineReport,
    pub publisher: PublisherReport,
}

/// Running stage threads.
pub struct Pipeline {
    run_state: Arc<RunState>,
    gateway: Option<JoinHandle<GatewayReport>>,
    engine: Option<JoinHandle<Result<EngineReport, hdrhistogram::CreationError>>>,
    publisher: Option<JoinHandle<PublisherReport>>,
}

impl Pipeline {
    /// Validate `config`, wire up every channel and spawn the stages.
    ///
    /// Stages wait for [`start`](Self::start) before polling.
    pub fn launch(config: &PipelineConfig) -> Result<(Pipeline, Endpoints), PipelineError> {
        config.validate()?;
        let capacity = config.channel_capacity;

        let (order_txs, order_rxs): (Vec<_>, Vec<_>) = (0..config.order_sources)
            .map(|_| channel::<ClientOrder>(capacity))
            .unzip();
        let (request_tx, request_rx) = channel::<OrderRequest>(capacity);
        let (engine_ack_tx, engine_ack_rx) = channel::<Ack>(capacity);
        let (client_ack_tx, client_ack_rx) = channel::<ClientAck>(capacity);
        let (delta_tx, delta_rx) = channel::<BookDelta>(capacity);
        let (feed_txs, feed_rxs): (Vec<_>, Vec<_>) = (0..config.subscribers)
            .map(|_| channel::<BookDelta>(capacity))
            .unzip();

        let mut gateway_io = GatewayIo {
            orders: order_rxs,
            requests: request_tx,
            engine_acks: engine_ack_rx,
            client_acks: client_ack_tx,
        };
        let mut engine_io = EngineIo {
            inputs: vec![request_rx],
            acks: engine_ack_tx,
            deltas: delta_tx,
        };
        let mut publisher_io = PublisherIo {
            deltas: delta_rx,
            subscribers: feed_txs.into_iter().collect::<Subscribers>(),
        };

        let mut pipeline = Pipeline {
            run_state: Arc::new(RunState::new()),
            gateway: None,
            engine: None,
            publisher: None,
        };

        // A spawn failure drops `pipeline`, which stops and joins whatever
        // already started
        let mut gateway = Gateway::new(config)?;
        let state = Arc::clone(&pipeline.run_state);
        let core = config.cores.gateway;
        pipeline.gateway = Some(spawn_stage("gateway", move || {
            pin_current_thread("gateway", core);
            gateway.run(&mut gateway_io, &state)
        })?);

        let mut engine = Engine::new(&config.book, config.ack_policy);
        let state = Arc::clone(&pipeline.run_state);
        let core = config.cores.engine;
        pipeline.engine = Some(spawn_stage("engine", move || {
            pin_current_thread("engine", core);
            engine.run(&mut engine_io, &state)
        })?);

        let mut publisher = Publisher::new();
        let state = Arc::clone(&pipeline.run_state);
        let core = config.cores.publisher;
        pipeline.publisher = Some(spawn_stage("publisher", move || {
            pin_current_thread("publisher", core);
            publisher.run(&mut publisher_io, &state)
        })?);

        info!(
            channel_capacity = capacity,
            order_sources = config.order_sources,
            subscribers = config.subscribers,
            "pipeline launched"
        );

        let endpoints = Endpoints {
            orders: order_txs,
            client_acks: client_ack_rx,
            market_data: feed_rxs,
        };
        Ok((pipeline, endpoints))
    }

    /// Release all stages.
    pub fn start(&self) {
        info!("pipeline started");
        self.run_state.start();
    }

    /// Shared run state (for callers that want to watch it).
    pub fn run_state(&self) -> &Arc<RunState> {
        &self.run_state
    }

    /// Stop all stages, join them and collect their reports.
    ///
    /// Records still in flight are abandoned.
    pub fn shutdown(mut self) -> Result<PipelineReport, PipelineError> {
        self.run_state.stop();

        let gateway = self
            .gateway
            .take()
            .map(|handle| join_stage("gateway", handle))
            .transpose()?
            .unwrap_or_default();
        let engine = self
            .engine
            .take()
            .map(|handle| join_stage("engine", handle))
            .transpose()?
            .transpose()?
            .unwrap_or_default();
        let publisher = self
            .publisher
            .take()
            .map(|handle| join_stage("publisher", handle))
            .transpose()?
            .unwrap_or_default();

        info!(
            forwarded = gateway.forwarded,
            processed = engine.processed,
            published = publisher.published,
            "pipeline shut down"
        );
        Ok(PipelineReport {
            gateway,
            engine,
            publisher,
        })
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.run_state.stop();
        let _ = self.gateway.take().map(JoinHandle::join);
        let _ = self.engine.take().map(JoinHandle::join);
        let _ = self.publisher.take().map(JoinHandle::join);
    }
}

fn spawn_stage<T, F>(stage: &'static str, body: F) -> Result<JoinHandle<T>, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(format!("relay-{stage}"))
        .spawn(body)
        .map_err(|source| PipelineError::Spawn { stage, source })
}

fn join_stage<T>(stage: &'static str, handle: JoinHandle<T>) -> Result<T, PipelineError> {
    handle
        .join()
        .map_err(|_| PipelineError::StagePanicked(stage))
}

/// Pin the calling thread to `core`, if one is configured.
pub fn pin_current_thread(stage: &'static str, core: Option<usize>) {
    let Some(core) = core else {
        return;
    };
    let pinned = core_affinity::get_core_ids()
        .and_then(|ids| ids.into_iter().find(|id| id.id == core))
        .map(core_affinity::set_for_current)
        .unwrap_or(false);

    if pinned {
        info!(stage, core, "stage pinned");
    } else {
        warn!(stage, core, "could not pin stage; running unpinned");
    }
}
