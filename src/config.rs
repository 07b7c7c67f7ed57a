//! Pipeline configuration.
//!
//! Every field has a default, so a JSON file only needs to name what it
//! changes. Binaries layer their command-line flags on top.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::id_index::DEFAULT_FANOUT;

/// Upper bound on participant order channels feeding the gateway.
pub const MAX_ORDER_SOURCES: usize = 8;

/// Upper bound on market-data subscribers.
pub const MAX_SUBSCRIBERS: usize = 8;

/// Order book sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookConfig {
    /// Width of each side in ticks (valid price indices are `0..price_ticks`)
    pub price_ticks: u32,
    /// Size of the internal id space (valid ids are `0..max_orders`)
    pub max_orders: u32,
    /// Slots reserved the first time a price level is used
    pub level_capacity: u32,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            price_ticks: 1_000_000,
            max_orders: 1_000_000,
            level_capacity: 16,
        }
    }
}

/// Decimal price to tick mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub tick_size: Decimal,
    /// Price of tick 0
    pub min_price: Decimal,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            tick_size: Decimal::new(1, 2),
            min_price: Decimal::ZERO,
        }
    }
}

/// Identifier index sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Slab slots available for tree nodes
    pub node_capacity: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            node_capacity: 65_536,
        }
    }
}

/// Which originators receive acknowledgements from the matching core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AckPolicy {
    /// Only the distinguished primary originator is acknowledged
    PrimaryOnly { primary_trader: u16 },
    /// Every originator is acknowledged
    All,
}

impl AckPolicy {
    /// Returns true if acks for `trader_id` should be emitted.
    #[inline]
    pub const fn admits(&self, trader_id: u16) -> bool {
        match *self {
            AckPolicy::PrimaryOnly { primary_trader } => trader_id == primary_trader,
            AckPolicy::All => true,
        }
    }
}

impl Default for AckPolicy {
    fn default() -> Self {
        AckPolicy::PrimaryOnly { primary_trader: 0 }
    }
}

/// Optional core id per stage. `None` leaves the thread unpinned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreAssignment {
    pub gateway: Option<usize>,
    pub engine: Option<usize>,
    pub publisher: Option<usize>,
}

/// Everything needed to launch a [`crate::pipeline::Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Slots per channel (power of two)
    pub channel_capacity: usize,
    pub book: BookConfig,
    pub grid: GridConfig,
    pub index: IndexConfig,
    pub ack_policy: AckPolicy,
    /// Participant order channels into the gateway
    pub order_sources: usize,
    /// Market-data consumers fed by the publisher
    pub subscribers: usize,
    pub cores: CoreAssignment,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 65_536,
            book: BookConfig::default(),
            grid: GridConfig::default(),
            index: IndexConfig::default(),
            ack_policy: AckPolicy::default(),
            order_sources: 2,
            subscribers: 2,
            cores: CoreAssignment::default(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every constraint the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity < 2 || !self.channel_capacity.is_power_of_two() {
            return Err(invalid(
                "channel_capacity",
                format!("must be a power of two >= 2, got {}", self.channel_capacity),
            ));
        }
        if self.book.price_ticks == 0 {
            return Err(invalid("book.price_ticks", "must be non-zero".into()));
        }
        if self.book.max_orders == 0 {
            return Err(invalid("book.max_orders", "must be non-zero".into()));
        }
        if self.grid.tick_size <= Decimal::ZERO {
            return Err(invalid(
                "grid.tick_size",
                format!("must be positive, got {}", self.grid.tick_size),
            ));
        }
        if self.grid.min_price < Decimal::ZERO {
            return Err(invalid(
                "grid.min_price",
                format!("must not be negative, got {}", self.grid.min_price),
            ));
        }
        let min_nodes = min_index_nodes(self.book.max_orders);
        if self.index.node_capacity < min_nodes {
            return Err(invalid(
                "index.node_capacity",
                format!(
                    "{} nodes cannot index {} orders, need at least {min_nodes}",
                    self.index.node_capacity, self.book.max_orders
                ),
            ));
        }
        if !(1..=MAX_ORDER_SOURCES).contains(&self.order_sources) {
            return Err(invalid(
                "order_sources",
                format!("must be in 1..={MAX_ORDER_SOURCES}, got {}", self.order_sources),
            ));
        }
        if !(1..=MAX_SUBSCRIBERS).contains(&self.subscribers) {
            return Err(invalid(
                "subscribers",
                format!("must be in 1..={MAX_SUBSCRIBERS}, got {}", self.subscribers),
            ));
        }
        Ok(())
    }
}

/// Nodes the id index needs for `max_orders` keys with every leaf half full,
/// doubled to cover the internal levels.
fn min_index_nodes(max_orders: u32) -> u32 {
    let leaves = max_orders.div_ceil((DEFAULT_FANOUT / 2) as u32);
    leaves.saturating_mul(2).max(2)
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}
