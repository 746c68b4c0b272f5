//! # Adjustment sink trait.
//!
//! [`AdjustmentSink`] is the extension point for plugging custom adjustment
//! consumers (metrics exporters, alerting, dashboards) into a policy.
//!
//! Each sink driven by a [`SinkSet`](super::SinkSet) gets:
//! - **Dedicated worker task** (runs independently of the publisher)
//! - **Bounded queue** (configurable via [`AdjustmentSink::queue_capacity`])
//! - **Panic isolation** (panics are caught and reported on stderr)
//!
//! ## Rules
//! - Slow sinks only affect themselves (queue overflow → record drop).
//! - Panics do not crash the policy or other sinks.
//! - Sinks never block the controller that publishes.

use async_trait::async_trait;

use super::event::Adjustment;

/// Consumer of [`Adjustment`] records.
///
/// Runs on a dedicated worker task with a bounded queue; see the module
/// docs for the isolation rules.
#[async_trait]
pub trait AdjustmentSink: Send + Sync + 'static {
    /// Processes a single adjustment record.
    ///
    /// Called from the sink's worker task, records arrive in FIFO order.
    /// Handle errors internally; a panic is caught and reported but the
    /// record is lost for this sink.
    async fn on_adjustment(&self, adjustment: &Adjustment);

    /// Short name used in overflow/panic diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity for this sink.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
