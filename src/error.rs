//! Error types.
//!
//! Capacity conditions on channels are not errors (they are `None`/`Err(value)`
//! returns the caller polls on). Everything here is either a construction-time
//! failure or a condition a stage maps to a reject record.

use thiserror::Error;

/// Slab allocator failures.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlabError {
    #[error("slab exhausted: all {capacity} slots in use")]
    Exhausted { capacity: u32 },
}

/// Configuration loading and validation failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Reasons the gateway cannot turn a client order into an engine request.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslateError {
    #[error("unknown order id {0}")]
    UnknownOrder(u64),

    #[error("price is outside the tick grid")]
    OffGrid,

    #[error("internal id space exhausted")]
    IdSpaceExhausted,

    #[error("zero quantity")]
    ZeroQuantity,
}

/// Pipeline bootstrap and shutdown failures.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn {stage} thread: {source}")]
    Spawn {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create latency histogram: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),

    #[error("{0} stage panicked")]
    StagePanicked(&'static str),
}
