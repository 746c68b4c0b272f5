//! # AIMD parallelization controller.
//!
//! [`AimdController`] owns the adjustment timer of one bulkhead. Every
//! `adjustment_interval` it reads a [`MetricsSnapshot`] from the shared
//! window and applies the AIMD law:
//!
//! ```text
//! fewer than min_samples        → no change (evidence gate)
//! latency or error rate crossed → limit = ceil(limit × multiplicative_decrease)
//! otherwise                     → limit = limit + additive_increase
//! candidate clamped to [min_limit, max_limit]
//! ```
//!
//! An accepted change is published to the admission gates (triggering the
//! semaphore swap) and fanned out as an [`Adjustment`] record. Each
//! decision that passes the evidence gate consumes its samples, so
//! consecutive ticks act on fresh observations only.
//!
//! ## Failure semantics
//! - A panic inside one tick is caught and reported to stderr; the timer
//!   keeps running.
//! - [`close`](AimdController::close) (also run on drop) cancels the timer
//!   and makes further [`record`](AimdController::record) calls silent
//!   no-ops.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::events::{Adjustment, AdjustmentBus};
use crate::metrics::{MetricsSnapshot, MetricsWindow};

use super::config::BulkheadConfig;
use super::slot::AdmissionGates;

/// Periodic AIMD tuner for one bulkhead's parallelism limit.
pub(crate) struct AimdController {
    config: BulkheadConfig,
    window: Arc<MetricsWindow>,
    gates: Arc<AdmissionGates>,
    bus: AdjustmentBus,
    last_adjustment_at: Mutex<Instant>,
    closed: AtomicBool,
    timer_token: CancellationToken,
}

impl AimdController {
    pub(crate) fn new(
        config: BulkheadConfig,
        window: Arc<MetricsWindow>,
        gates: Arc<AdmissionGates>,
        bus: AdjustmentBus,
    ) -> Self {
        Self {
            config,
            window,
            gates,
            bus,
            last_adjustment_at: Mutex::new(Instant::now()),
            closed: AtomicBool::new(false),
            timer_token: CancellationToken::new(),
        }
    }

    /// Spawns the adjustment timer. Must be called from within a tokio
    /// runtime; calling more than once spawns redundant (harmless, but
    /// wasteful) tickers.
    pub(crate) fn run(self: &Arc<Self>) {
        let controller = Arc::clone(self);
        let token = self.timer_token.clone();
        let period = self.config.adjustment_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick of a tokio interval fires immediately; consume
            // it so the first decision happens one full period after start.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let tick = std::panic::AssertUnwindSafe(|| controller.adjust_once());
                        if let Err(panic_err) = std::panic::catch_unwind(tick) {
                            eprintln!("[loadvisor] adjustment tick panicked: {panic_err:?}");
                        }
                    }
                }
            }
        });
    }

    /// Feeds one execution outcome into the sampling window.
    ///
    /// Silently ignored once the controller is closed.
    pub(crate) fn record(&self, latency: Duration, is_error: bool) {
        if self.closed.load(AtomicOrdering::Acquire) {
            return;
        }
        self.window.record(latency, is_error);
    }

    /// Token cancelled when the controller shuts down; companion tasks
    /// (sink forwarders) tie their lifetime to it.
    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.timer_token.clone()
    }

    /// Stops the timer and rejects further samples.
    pub(crate) fn close(&self) {
        self.closed.store(true, AtomicOrdering::Release);
        self.timer_token.cancel();
    }

    /// Runs one adjustment decision; the timer calls this every interval.
    ///
    /// Exposed at crate level so tests can drive decisions without a timer.
    pub(crate) fn adjust_once(&self) {
        if self.closed.load(AtomicOrdering::Acquire) {
            return;
        }

        let snapshot = self.window.snapshot();
        if snapshot.sample_count < self.config.min_samples {
            return;
        }
        // The decision consumes its evidence either way; the next tick
        // must not re-judge the same samples.
        self.window.clear();

        let current = self.gates.current_limit();
        let candidate = self
            .candidate_limit(current, &snapshot)
            .clamp(self.config.min_limit, self.config.max_limit);
        if candidate == current {
            return;
        }

        if self.gates.publish_limit(candidate) {
            *self.last_adjustment_at.lock().expect("adjustment clock poisoned") = Instant::now();
            self.bus.publish(Adjustment::now(
                candidate,
                snapshot.average_latency,
                snapshot.error_rate,
                snapshot.sample_count,
            ));
        }
    }

    /// Applies the AIMD law to `current`, unclamped.
    fn candidate_limit(&self, current: u32, snapshot: &MetricsSnapshot) -> u32 {
        let should_decrease = snapshot.average_latency > self.config.latency_threshold
            || snapshot.error_rate > self.config.error_rate_threshold;

        if should_decrease {
            (f64::from(current) * self.config.multiplicative_decrease).ceil() as u32
        } else {
            current.saturating_add(self.config.additive_increase)
        }
    }

    /// Instant of the most recently accepted adjustment.
    pub(crate) fn last_adjustment_at(&self) -> Instant {
        *self.last_adjustment_at.lock().expect("adjustment clock poisoned")
    }
}

impl Drop for AimdController {
    fn drop(&mut self) {
        self.close();
    }
}
