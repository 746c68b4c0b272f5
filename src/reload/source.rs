//! # Configuration-change boundary.
//!
//! The core does not care where configuration events originate: it
//! subscribes once per reloading handle through the [`ChangeSource`]
//! contract, filters by name (case-sensitive, defaulting to the empty
//! name), and forwards matching options to the strategy's
//! [`ReloadBinding`](super::ReloadBinding).
//!
//! ```text
//! file watcher / DI container / test harness
//!        │ publish(name, options)
//!        ▼
//!   ChangeSource ──► listener(options, name) ──► binding ──► slot.store()
//!        ▲
//!        └── Subscription (detaches on dispose/drop)
//! ```
//!
//! [`MemoryChangeSource`] is the in-process implementation used by tests
//! and demos; production callers adapt their own option provider to
//! [`ChangeSource`].

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::binding::{PolicyOptions, ReloadBinding, RetryBinding, TimeoutBinding};
use super::retry::RetrySnapshot;
use super::slot::ReloadingSlot;
use super::timeout::TimeoutSnapshot;

/// Callback invoked with each published options record and its name.
pub type ChangeListener = Arc<dyn Fn(&PolicyOptions, &str) + Send + Sync>;

/// Asynchronous change-notification contract (consumed boundary).
pub trait ChangeSource {
    /// Registers `listener` for all future configuration changes; the
    /// returned [`Subscription`] detaches it.
    fn on_change(&self, listener: ChangeListener) -> Subscription;
}

/// Registration handle returned by [`ChangeSource::on_change`].
///
/// Detaches the listener on [`dispose`](Self::dispose) or drop.
pub struct Subscription {
    token: CancellationToken,
}

impl Subscription {
    /// Wraps a cancellation token controlling the listener's delivery loop.
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Detaches the listener now.
    pub fn dispose(self) {
        self.token.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// In-process [`ChangeSource`] backed by a broadcast channel.
///
/// Cloning shares the underlying channel, so any clone may publish.
#[derive(Clone)]
pub struct MemoryChangeSource {
    tx: broadcast::Sender<(String, PolicyOptions)>,
}

impl MemoryChangeSource {
    /// Creates a source with a small delivery buffer.
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(64);
        Self { tx }
    }

    /// Publishes an options record under `name` to all listeners.
    pub fn publish(&self, name: impl Into<String>, options: PolicyOptions) {
        let _ = self.tx.send((name.into(), options));
    }
}

impl Default for MemoryChangeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeSource for MemoryChangeSource {
    /// Spawns a delivery task that forwards each published record to
    /// `listener` until the subscription is disposed.
    ///
    /// Must be called from within a tokio runtime.
    fn on_change(&self, listener: ChangeListener) -> Subscription {
        let mut rx = self.tx.subscribe();
        let token = CancellationToken::new();
        let child = token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok((name, options)) => listener(&options, &name),
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        Subscription::new(token)
    }
}

/// A reloading slot bundled with its change subscription.
///
/// `dispose()` tears both down in one call; dropping the handle does the
/// same. Executors keep cloning snapshots out of [`load`](Self::load) while
/// the handle lives.
pub struct DisposableReloadingHandle<S> {
    slot: Arc<ReloadingSlot<S>>,
    subscription: Subscription,
}

impl<S> DisposableReloadingHandle<S> {
    /// Bundles an existing slot with a subscription.
    pub fn new(slot: Arc<ReloadingSlot<S>>, subscription: Subscription) -> Self {
        Self { slot, subscription }
    }

    /// Returns the current snapshot. Wait-free.
    pub fn load(&self) -> Arc<S> {
        self.slot.load()
    }

    /// The underlying slot, for sharing with executors.
    pub fn slot(&self) -> &Arc<ReloadingSlot<S>> {
        &self.slot
    }

    /// Detaches the subscription; the slot keeps its last snapshot.
    pub fn dispose(self) {
        self.subscription.dispose();
    }
}

impl DisposableReloadingHandle<RetrySnapshot> {
    /// Creates a retry slot holding `initial` and subscribes it to
    /// `source`, filtering by the case-sensitive `name`.
    pub fn bind_retry(
        source: &dyn ChangeSource,
        name: impl Into<String>,
        initial: RetrySnapshot,
    ) -> Self {
        let slot = Arc::new(ReloadingSlot::new(initial));
        let binding = RetryBinding::new(Arc::clone(&slot));
        let subscription = subscribe_filtered(source, name.into(), binding);
        Self { slot, subscription }
    }
}

impl DisposableReloadingHandle<TimeoutSnapshot> {
    /// Creates a timeout slot holding `initial` and subscribes it to
    /// `source`, filtering by the case-sensitive `name`.
    pub fn bind_timeout(
        source: &dyn ChangeSource,
        name: impl Into<String>,
        initial: TimeoutSnapshot,
    ) -> Self {
        let slot = Arc::new(ReloadingSlot::new(initial));
        let binding = TimeoutBinding::new(Arc::clone(&slot));
        let subscription = subscribe_filtered(source, name.into(), binding);
        Self { slot, subscription }
    }
}

/// Subscribes `binding` to `source`, forwarding only records whose name
/// matches `filter` exactly.
fn subscribe_filtered<B: ReloadBinding + 'static>(
    source: &dyn ChangeSource,
    filter: String,
    binding: B,
) -> Subscription {
    source.on_change(Arc::new(move |options, name| {
        if name == filter {
            binding.on_configuration_changed(options);
        }
    }))
}
