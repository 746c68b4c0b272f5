//! # Simple logging sink for debugging and demos.
//!
//! [`LogWriter`] prints adjustment records to stdout in a human-readable
//! format. Primarily useful for development and examples.
//!
//! ## Output format
//! ```text
//! [adjusted] limit=7 avg_latency=10ms error_rate=0.00 samples=5
//! ```

use async_trait::async_trait;

use super::event::Adjustment;
use super::sink::AdjustmentSink;

/// Simple stdout logging sink.
///
/// Enabled via the `logging` feature. Not intended for production use —
/// implement a custom [`AdjustmentSink`] for structured logging or metrics
/// collection.
pub struct LogWriter;

#[async_trait]
impl AdjustmentSink for LogWriter {
    async fn on_adjustment(&self, a: &Adjustment) {
        println!(
            "[adjusted] limit={} avg_latency={:?} error_rate={:.2} samples={}",
            a.new_limit, a.average_latency, a.error_rate, a.sample_count
        );
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
