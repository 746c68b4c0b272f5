//! # Adaptive bulkhead policy.
//!
//! [`AdaptiveBulkhead`] wraps a fallible user callback with self-tuning
//! concurrency isolation.
//!
//! ## Admission flow
//! ```text
//! execute(token, f)
//!   1. queue gate, zero-timeout try-acquire
//!        └─ full → on_rejected(token) → Err(Rejected)
//!   2. fetch current parallelism semaphore (re-read per attempt)
//!   3. blocking acquire, cancellable
//!        ├─ token fired   → release queue permit → Err(Canceled)
//!        └─ gate retired  → re-fetch the replacement, retry
//!   4. run f under a wall clock; record (elapsed, is_error)
//!   5. release parallelism permit, then queue permit — on every path,
//!      including panic
//! ```
//!
//! ## Rules
//! - Queue admission never blocks: oversubscription fails fast.
//! - Cancellation aborts a pending parallelism acquire immediately; once
//!   the callback has started the token is forwarded but not enforced —
//!   cooperative cancellation is the callback's responsibility.
//! - A panicking callback still releases both permits (reverse order) and
//!   is recorded as an error before the panic resumes.
//! - The blocking variant is the degenerate case of the cooperative one,
//!   driven to completion on the calling thread.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::{ConfigError, ExecuteError};
use crate::events::{Adjustment, AdjustmentBus, AdjustmentSink, SinkSet};
use crate::metrics::{MetricsSnapshot, MetricsWindow};

use super::config::BulkheadConfig;
use super::controller::AimdController;
use super::slot::AdmissionGates;

/// Ring-buffer capacity of the adjustment bus.
const BUS_CAPACITY: usize = 128;

/// Callback invoked when queue admission fails, before `Rejected` is
/// returned. A panic here propagates to the caller instead of `Rejected`.
pub type RejectionHook = Box<dyn Fn(&CancellationToken) + Send + Sync>;

/// Concurrency isolator whose parallelism limit self-tunes via AIMD
/// feedback on observed latency and error rate.
///
/// Must be created from within a tokio runtime (the controller owns a
/// timer task). Dropping the policy stops the timer; in-flight executions
/// complete against their captured semaphore references.
pub struct AdaptiveBulkhead {
    config: BulkheadConfig,
    gates: Arc<AdmissionGates>,
    controller: Arc<AimdController>,
    window: Arc<MetricsWindow>,
    bus: AdjustmentBus,
    on_rejected: Option<RejectionHook>,
}

impl AdaptiveBulkhead {
    /// Validates `config`, builds the gates and metrics window, and starts
    /// the adjustment timer.
    pub fn new(config: BulkheadConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let window = Arc::new(MetricsWindow::new(config.sampling_window_size));
        let gates = Arc::new(AdmissionGates::new(config.initial_limit, config.queue_depth));
        let bus = AdjustmentBus::new(BUS_CAPACITY);
        let controller = Arc::new(AimdController::new(
            config,
            Arc::clone(&window),
            Arc::clone(&gates),
            bus.clone(),
        ));
        controller.run();

        Ok(Self {
            config,
            gates,
            controller,
            window,
            bus,
            on_rejected: None,
        })
    }

    /// Installs the rejection hook invoked on each failed queue admission.
    #[must_use]
    pub fn with_on_rejected(
        mut self,
        hook: impl Fn(&CancellationToken) + Send + Sync + 'static,
    ) -> Self {
        self.on_rejected = Some(Box::new(hook));
        self
    }

    /// Attaches adjustment sinks, each driven by its own worker with a
    /// bounded queue and panic isolation. The forwarder stops when the
    /// policy is closed or dropped.
    #[must_use]
    pub fn with_sinks(self, sinks: Vec<Arc<dyn AdjustmentSink>>) -> Self {
        let set = SinkSet::new(sinks);
        let mut rx = self.bus.subscribe();
        let token = self.controller.shutdown_token();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(adjustment) => set.emit(adjustment),
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            set.shutdown().await;
        });

        self
    }

    /// Executes `f` under the bulkhead (cooperative-suspension surface).
    ///
    /// The token is forwarded to `f`; see the module docs for the
    /// admission and cancellation rules.
    pub async fn execute<T, E, F, Fut>(
        &self,
        token: &CancellationToken,
        f: F,
    ) -> Result<T, ExecuteError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        // 1. Zero-timeout queue admission: the fast-fail path that keeps
        //    the bulkhead non-blocking under oversubscription.
        let queue_permit = match self.gates.queue().clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                if let Some(hook) = &self.on_rejected {
                    hook(token);
                }
                return Err(ExecuteError::Rejected);
            }
        };

        // 2+3. Parallelism admission: blocking, cancellable, re-fetching
        //      the gate whenever a concurrent adjustment retires it.
        let parallel_permit = loop {
            let gate = self.gates.parallel();
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    drop(queue_permit);
                    return Err(ExecuteError::Canceled);
                }
                acquired = gate.acquire_owned() => match acquired {
                    Ok(permit) => break permit,
                    Err(_retired) => continue,
                },
            }
        };

        // 4. Timed execution. A panic is recorded as an error, both
        //    permits are released, and the panic resumes. tokio's clock
        //    equals the system clock in production and follows the paused
        //    clock under test.
        let started = tokio::time::Instant::now();
        let outcome = std::panic::AssertUnwindSafe(f(token.clone()))
            .catch_unwind()
            .await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(result) => {
                self.controller.record(elapsed, result.is_err());
                drop(parallel_permit);
                drop(queue_permit);
                result.map_err(ExecuteError::Operation)
            }
            Err(panic_err) => {
                self.controller.record(elapsed, true);
                drop(parallel_permit);
                drop(queue_permit);
                std::panic::resume_unwind(panic_err)
            }
        }
    }

    /// Executes `f` under the bulkhead on the calling thread.
    ///
    /// Identical semantics to [`execute`](Self::execute); the admission
    /// protocol is driven to completion synchronously. Do not call from
    /// inside an async task — it parks the worker thread.
    pub fn execute_blocking<T, E, F>(
        &self,
        token: &CancellationToken,
        f: F,
    ) -> Result<T, ExecuteError<E>>
    where
        F: FnOnce(CancellationToken) -> Result<T, E>,
    {
        futures::executor::block_on(self.execute(token, |forwarded| async move { f(forwarded) }))
    }

    /// The limit the controller has currently published.
    pub fn current_max_parallelization(&self) -> u32 {
        self.gates.current_limit()
    }

    /// Execution slots currently free.
    pub fn available_execution_slots(&self) -> usize {
        self.gates.available_parallel()
    }

    /// Queue slots currently free (clamped to the configured depth).
    pub fn available_queue_slots(&self) -> usize {
        self.gates.available_queue()
    }

    /// Summary of the samples the next adjustment decision will consume.
    pub fn current_metrics(&self) -> MetricsSnapshot {
        self.window.snapshot()
    }

    /// Instant of the most recently accepted adjustment (policy creation
    /// if none fired yet).
    pub fn last_adjustment_at(&self) -> Instant {
        self.controller.last_adjustment_at()
    }

    /// Subscribes to accepted limit changes. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe_adjustments(&self) -> broadcast::Receiver<Adjustment> {
        self.bus.subscribe()
    }

    /// The static configuration this policy was built from.
    pub fn config(&self) -> &BulkheadConfig {
        &self.config
    }

    /// Stops the adjustment timer and rejects further samples. Idempotent.
    pub fn close(&self) {
        self.controller.close();
    }
}

impl Drop for AdaptiveBulkhead {
    fn drop(&mut self) {
        // The timer task holds its own Arc to the controller; cancelling
        // here lets it exit and release that reference.
        self.controller.close();
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    fn small_bulkhead(initial: u32, queue_depth: u32) -> AdaptiveBulkhead {
        AdaptiveBulkhead::new(BulkheadConfig {
            initial_limit: initial,
            min_limit: 1,
            max_limit: 100,
            queue_depth,
            // Keep the timer quiet during admission-focused tests.
            adjustment_interval: Duration::from_secs(3600),
            ..BulkheadConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn successful_execution_returns_the_value_and_frees_slots() {
        let bulkhead = small_bulkhead(2, 2);
        let token = CancellationToken::new();

        let out: Result<u32, ExecuteError<Infallible>> =
            bulkhead.execute(&token, |_| async { Ok(41 + 1) }).await;

        assert_eq!(out.unwrap(), 42);
        assert_eq!(bulkhead.available_execution_slots(), 2);
        assert_eq!(bulkhead.available_queue_slots(), 2);
        assert_eq!(bulkhead.current_metrics().sample_count, 1);
    }

    #[tokio::test]
    async fn user_errors_are_recorded_then_propagated() {
        let bulkhead = small_bulkhead(2, 2);
        let token = CancellationToken::new();

        let out: Result<(), ExecuteError<&str>> =
            bulkhead.execute(&token, |_| async { Err("boom") }).await;

        assert!(matches!(out, Err(ExecuteError::Operation("boom"))));
        let metrics = bulkhead.current_metrics();
        assert_eq!(metrics.sample_count, 1);
        assert_eq!(metrics.error_rate, 1.0);
    }

    #[tokio::test]
    async fn oversubscription_rejects_and_fires_the_hook() {
        let rejections = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&rejections);
        let bulkhead = Arc::new(
            small_bulkhead(1, 0)
                .with_on_rejected(move |_| {
                    counted.fetch_add(1, Ordering::SeqCst);
                }),
        );
        let token = CancellationToken::new();

        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let long_running = {
            let bulkhead = Arc::clone(&bulkhead);
            let token = token.clone();
            tokio::spawn(async move {
                bulkhead
                    .execute::<_, Infallible, _, _>(&token, |_| async move {
                        let _ = started_tx.send(());
                        let _ = release_rx.await;
                        Ok(())
                    })
                    .await
            })
        };
        started_rx.await.unwrap();

        let second: Result<(), ExecuteError<Infallible>> =
            bulkhead.execute(&token, |_| async { Ok(()) }).await;
        assert!(matches!(second, Err(ExecuteError::Rejected)));
        assert_eq!(rejections.load(Ordering::SeqCst), 1);

        release_tx.send(()).unwrap();
        assert!(long_running.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn cancellation_while_waiting_releases_the_queue_permit() {
        let bulkhead = Arc::new(small_bulkhead(1, 1));
        let token = CancellationToken::new();

        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let holder = {
            let bulkhead = Arc::clone(&bulkhead);
            let token = token.clone();
            tokio::spawn(async move {
                bulkhead
                    .execute::<_, Infallible, _, _>(&token, |_| async move {
                        let _ = started_tx.send(());
                        let _ = release_rx.await;
                        Ok(())
                    })
                    .await
            })
        };
        started_rx.await.unwrap();

        let waiter_token = CancellationToken::new();
        let waiter = {
            let bulkhead = Arc::clone(&bulkhead);
            let token = waiter_token.clone();
            tokio::spawn(async move {
                bulkhead
                    .execute::<_, Infallible, _, _>(&token, |_| async { Ok(()) })
                    .await
            })
        };
        // Let the waiter reach the parallelism acquire, then cancel it.
        tokio::task::yield_now().await;
        waiter_token.cancel();

        let out = waiter.await.unwrap();
        assert!(matches!(out, Err(ExecuteError::Canceled)));
        assert_eq!(bulkhead.available_queue_slots(), 1);

        release_tx.send(()).unwrap();
        holder.await.unwrap().unwrap();
        assert_eq!(bulkhead.available_execution_slots(), 1);
    }

    #[tokio::test]
    async fn pre_cancelled_token_short_circuits_admission() {
        let bulkhead = small_bulkhead(1, 1);
        let token = CancellationToken::new();
        token.cancel();

        let out: Result<(), ExecuteError<Infallible>> =
            bulkhead.execute(&token, |_| async { Ok(()) }).await;
        assert!(matches!(out, Err(ExecuteError::Canceled)));
        assert_eq!(bulkhead.available_queue_slots(), 1);
        assert_eq!(bulkhead.available_execution_slots(), 1);
    }

    #[tokio::test]
    async fn panicking_callback_releases_both_permits() {
        let bulkhead = Arc::new(small_bulkhead(1, 1));
        let token = CancellationToken::new();

        let crashed = {
            let bulkhead = Arc::clone(&bulkhead);
            let token = token.clone();
            tokio::spawn(async move {
                bulkhead
                    .execute::<(), Infallible, _, _>(&token, |_| async { panic!("kaboom") })
                    .await
            })
        };
        assert!(crashed.await.unwrap_err().is_panic());

        assert_eq!(bulkhead.available_execution_slots(), 1);
        assert_eq!(bulkhead.available_queue_slots(), 1);
        // The crash is evidence for the controller.
        let metrics = bulkhead.current_metrics();
        assert_eq!(metrics.sample_count, 1);
        assert_eq!(metrics.error_rate, 1.0);
    }

    #[tokio::test]
    async fn blocking_surface_has_identical_semantics() {
        let bulkhead = Arc::new(small_bulkhead(1, 1));
        let token = CancellationToken::new();

        let handle = {
            let bulkhead = Arc::clone(&bulkhead);
            let token = token.clone();
            tokio::task::spawn_blocking(move || {
                bulkhead.execute_blocking::<_, &str, _>(&token, |_| Ok(7))
            })
        };
        assert_eq!(handle.await.unwrap().unwrap(), 7);

        let handle = {
            let bulkhead = Arc::clone(&bulkhead);
            let token = token.clone();
            tokio::task::spawn_blocking(move || {
                bulkhead.execute_blocking::<(), _, _>(&token, |_| Err("nope"))
            })
        };
        assert!(matches!(
            handle.await.unwrap(),
            Err(ExecuteError::Operation("nope"))
        ));
        assert_eq!(bulkhead.current_metrics().sample_count, 2);
    }
}
