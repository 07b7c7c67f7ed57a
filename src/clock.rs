//! Monotonic timestamps for latency accounting.
//!
//! Values are nanoseconds since the first call in this process. They only
//! order events relative to each other; they are not wall-clock time.

use std::sync::OnceLock;
use std::time::Instant;

use hdrhistogram::Histogram;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Highest latency a stage histogram tracks (60 s).
pub const MAX_TRACKED_NANOS: u64 = 60_000_000_000;

/// Nanoseconds elapsed since the process-wide epoch.
#[inline]
pub fn now_nanos() -> u64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos() as u64
}

/// Histogram sized for per-record stage latencies (3 significant digits).
pub fn latency_histogram() -> Result<Histogram<u64>, hdrhistogram::CreationError> {
    Histogram::new_with_bounds(1, MAX_TRACKED_NANOS, 3)
}

/// Percentile snapshot of a latency histogram, in nanoseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LatencySummary {
    pub count: u64,
    pub min: u64,
    pub p50: u64,
    pub p99: u64,
    pub p999: u64,
    pub max: u64,
    pub mean: f64,
}

impl LatencySummary {
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.is_empty() {
            return Self::default();
        }
        Self {
            count: hist.len(),
            min: hist.min(),
            p50: hist.value_at_quantile(0.50),
            p99: hist.value_at_quantile(0.99),
            p999: hist.value_at_quantile(0.999),
            max: hist.max(),
            mean: hist.mean(),
        }
    }
}
