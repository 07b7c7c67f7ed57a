//! # Relay-LOB
//!
//! A single-node matching engine for a simulated exchange, run as a pipeline
//! of pinned stages connected by lock-free single-producer/single-consumer
//! channels.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: every book, index and allocator is owned by one stage
//! - **No Blocking**: stages busy-poll; full and empty channels are absence values
//! - **Lazy Deletion**: cancels zero an order in place; the best-price cursor
//!   is only recomputed when the level it points at drains
//! - **Compact Ids**: clients speak 64-bit ids, the book speaks dense u32 ids
//!
//! ## Architecture
//!
//! ```text
//! [Participants] --orders--> [Gateway] --requests--> [Engine (Pinned)] --deltas--> [Publisher] --> [Subscribers]
//!       ^                       |  ^                        |
//!       +------client acks------+  +--------engine acks-----+
//! ```

pub mod clock;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod flow;
pub mod gateway;
pub mod id_index;
pub mod matching;
pub mod order_book;
pub mod pipeline;
pub mod price_level;
pub mod publisher;
pub mod ring;
pub mod slab;

// Re-exports for convenience
pub use command::{
    Ack, AckStatus, BookDelta, ClientAck, ClientOrder, DeltaKind, OrderRequest, OutputEvent,
    RequestKind, Side, Trade,
};
pub use config::{AckPolicy, BookConfig, GridConfig, IndexConfig, PipelineConfig};
pub use engine::{Engine, EngineReport};
pub use error::{ConfigError, PipelineError, SlabError, TranslateError};
pub use flow::{FlowConfig, OrderFlow};
pub use gateway::{Gateway, PriceGrid};
pub use id_index::IdIndex;
pub use matching::{EventSink, MatchStats, MatchingEngine};
pub use order_book::OrderBook;
pub use pipeline::{Endpoints, Pipeline, PipelineReport, RunState};
pub use price_level::PriceLevel;
pub use publisher::Publisher;
pub use ring::{channel, Consumer, Producer};
pub use slab::{Slab, SlabIndex};
