//! # Parallelization adjustment record.
//!
//! [`Adjustment`] captures one accepted limit change together with the
//! metrics summary that justified it.
//!
//! ## Ordering guarantees
//! Each record carries a globally unique sequence number (`seq`) that
//! increases monotonically, so listeners can order records correctly even
//! when they arrive through independent async channels.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for adjustment ordering.
static ADJUSTMENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// One accepted parallelization-limit change.
#[derive(Clone, Copy, Debug)]
pub struct Adjustment {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp (may go backwards, use for logging only).
    pub at: SystemTime,
    /// The limit that was just published.
    pub new_limit: u32,
    /// Mean latency of the samples the decision was based on.
    pub average_latency: Duration,
    /// Error fraction of the samples the decision was based on.
    pub error_rate: f64,
    /// Number of samples the decision was based on.
    pub sample_count: usize,
}

impl Adjustment {
    /// Creates a record stamped with the current wall clock and the next
    /// sequence number.
    pub fn now(
        new_limit: u32,
        average_latency: Duration,
        error_rate: f64,
        sample_count: usize,
    ) -> Self {
        Self {
            seq: ADJUSTMENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            new_limit,
            average_latency,
            error_rate,
            sample_count,
        }
    }
}
