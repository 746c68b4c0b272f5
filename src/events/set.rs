//! # SinkSet: non-blocking fan-out over multiple adjustment sinks.
//!
//! [`SinkSet`] distributes each [`Adjustment`] to its sinks **without
//! awaiting** their processing.
//!
//! ## What it guarantees
//! - `emit(adjustment)` returns immediately.
//! - Per-sink FIFO (queue order).
//! - Panics inside sinks are caught and reported (isolation).
//!
//! ## What it does **not** guarantee
//! - No global ordering across different sinks (use [`Adjustment::seq`]).
//! - No retries on per-sink queue overflow; the record is dropped for that
//!   sink only.
//!
//! ```text
//!    emit(adjustment)
//!        │
//!        ├────────────► [queue S1] ─► worker S1 ─► on_adjustment()
//!        ├────────────► [queue S2] ─► worker S2 ─► on_adjustment()
//!        └────────────► [queue SN] ─► worker SN ─► on_adjustment()
//! ```

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use super::event::Adjustment;
use super::sink::AdjustmentSink;

/// Per-sink channel with metadata.
struct SinkChannel {
    name: &'static str,
    sender: mpsc::Sender<Adjustment>,
}

/// Composite fan-out with per-sink bounded queues and worker tasks.
pub struct SinkSet {
    channels: Vec<SinkChannel>,
    workers: Vec<JoinHandle<()>>,
}

impl SinkSet {
    /// Creates a set and spawns one worker per sink.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn AdjustmentSink>>) -> Self {
        let mut channels = Vec::with_capacity(sinks.len());
        let mut workers = Vec::with_capacity(sinks.len());

        for sink in sinks {
            let cap = sink.queue_capacity().max(1);
            let name = sink.name();
            let (tx, mut rx) = mpsc::channel::<Adjustment>(cap);
            let s = Arc::clone(&sink);

            let handle = tokio::spawn(async move {
                while let Some(adj) = rx.recv().await {
                    let fut = s.on_adjustment(&adj);
                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        eprintln!("[loadvisor] sink '{}' panicked: {:?}", s.name(), panic_err);
                    }
                }
            });

            channels.push(SinkChannel { name, sender: tx });
            workers.push(handle);
        }

        Self { channels, workers }
    }

    /// Fans one record out to all sinks (non-blocking).
    ///
    /// If a sink's queue is full or its worker has exited, the record is
    /// dropped for that sink and a warning goes to stderr.
    pub fn emit(&self, adjustment: Adjustment) {
        for channel in &self.channels {
            match channel.sender.try_send(adjustment) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    eprintln!(
                        "[loadvisor] sink '{}' dropped adjustment: queue full",
                        channel.name
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    eprintln!(
                        "[loadvisor] sink '{}' dropped adjustment: worker closed",
                        channel.name
                    );
                }
            }
        }
    }

    /// Closes all queues and waits for the workers to drain.
    pub async fn shutdown(mut self) {
        self.channels.clear();
        for worker in self.workers.drain(..) {
            let _ = worker.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    struct Counting {
        seen: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl AdjustmentSink for Counting {
        async fn on_adjustment(&self, _adjustment: &Adjustment) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
        fn name(&self) -> &'static str {
            "counting"
        }
    }

    struct Panicking;

    #[async_trait::async_trait]
    impl AdjustmentSink for Panicking {
        async fn on_adjustment(&self, _adjustment: &Adjustment) {
            panic!("sink blew up");
        }
        fn name(&self) -> &'static str {
            "panicking"
        }
    }

    #[tokio::test]
    async fn records_reach_every_sink() {
        let counting = Arc::new(Counting {
            seen: AtomicUsize::new(0),
        });
        let set = SinkSet::new(vec![counting.clone() as Arc<dyn AdjustmentSink>]);

        for _ in 0..3 {
            set.emit(Adjustment::now(4, Duration::ZERO, 0.0, 1));
        }
        set.shutdown().await;

        assert_eq!(counting.seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn panicking_sink_does_not_poison_the_set() {
        let counting = Arc::new(Counting {
            seen: AtomicUsize::new(0),
        });
        let set = SinkSet::new(vec![
            Arc::new(Panicking) as Arc<dyn AdjustmentSink>,
            counting.clone() as Arc<dyn AdjustmentSink>,
        ]);

        set.emit(Adjustment::now(2, Duration::ZERO, 0.0, 1));
        set.shutdown().await;

        assert_eq!(counting.seen.load(Ordering::SeqCst), 1);
    }
}
