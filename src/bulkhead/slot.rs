//! # Admission gates: the two semaphores behind a bulkhead.
//!
//! [`AdmissionGates`] owns the **queue** semaphore (compound capacity
//! `queue_depth + current_limit`, bounding the number of in-system
//! requests) and the **parallelism** semaphore (capacity `current_limit`).
//!
//! ## Semaphore replacement
//! When the controller publishes a limit different from the last observed
//! one, the gates create a *new* parallelism semaphore sized to the new
//! limit, swap it in behind a read-biased lock, and schedule the old one
//! for closure after a grace period so in-flight waiters can complete. A
//! double-checked comparison on the observed limit ensures only one swap
//! occurs per change.
//!
//! The queue semaphore is a single instance resized in place on each
//! publication: permits are added on increase and forgotten (best-effort)
//! on decrease, so the in-system bound tracks `queue_depth +
//! current_limit`. Permits held by in-flight work are never clawed back;
//! the bound converges as work drains.
//!
//! ## Release-after-closure safety
//! Closing a tokio [`Semaphore`] makes pending and future acquires fail
//! while permit drops remain silent no-ops, which is exactly the
//! release-on-disposed tolerance the swap protocol requires.

use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Semaphore;

/// Grace period between swapping a parallelism semaphore out and closing
/// it.
const DISPOSE_GRACE: Duration = Duration::from_secs(1);

/// The queue and parallelism semaphores of one bulkhead, plus the
/// currently published limit.
pub(crate) struct AdmissionGates {
    /// Compound in-system gate; resized in place on limit publication.
    queue: Arc<Semaphore>,
    /// Current parallelism gate; replaced wholesale on limit publication.
    parallel: RwLock<Arc<Semaphore>>,
    /// The limit the current parallelism semaphore was sized to.
    limit: AtomicU32,
    /// Static queue depth on top of the parallelism limit.
    queue_depth: u32,
}

impl AdmissionGates {
    pub(crate) fn new(initial_limit: u32, queue_depth: u32) -> Self {
        Self {
            queue: Arc::new(Semaphore::new((queue_depth + initial_limit) as usize)),
            parallel: RwLock::new(Arc::new(Semaphore::new(initial_limit as usize))),
            limit: AtomicU32::new(initial_limit),
            queue_depth,
        }
    }

    /// The currently published parallelism limit.
    pub(crate) fn current_limit(&self) -> u32 {
        self.limit.load(AtomicOrdering::Acquire)
    }

    /// The compound queue semaphore (stable instance).
    pub(crate) fn queue(&self) -> &Arc<Semaphore> {
        &self.queue
    }

    /// The current parallelism semaphore.
    ///
    /// Admission must re-read this on every attempt: a concurrent
    /// publication may retire the returned instance at any point, in which
    /// case the pending acquire fails and the caller fetches the
    /// replacement.
    pub(crate) fn parallel(&self) -> Arc<Semaphore> {
        self.parallel
            .read()
            .expect("parallelism slot poisoned")
            .clone()
    }

    /// Execution slots currently free.
    pub(crate) fn available_parallel(&self) -> usize {
        self.parallel().available_permits()
    }

    /// Queue slots currently free, clamped to the configured depth.
    ///
    /// The compound semaphore also covers execution slots, so the raw
    /// permit count exceeds the queue depth on an idle bulkhead.
    pub(crate) fn available_queue(&self) -> usize {
        self.queue
            .available_permits()
            .min(self.queue_depth as usize)
    }

    /// Publishes `new_limit`: swaps in a fresh parallelism semaphore,
    /// resizes the queue gate, and schedules the old semaphore for
    /// grace-delayed closure.
    ///
    /// Returns `false` when `new_limit` is already published (including a
    /// lost race against another publisher).
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn publish_limit(&self, new_limit: u32) -> bool {
        // Fast path: nothing to do without taking the write lock.
        if self.limit.load(AtomicOrdering::Acquire) == new_limit {
            return false;
        }

        let retired = {
            let mut slot = self.parallel.write().expect("parallelism slot poisoned");
            // Double-check under the lock: another publisher may have won.
            let old_limit = self.limit.load(AtomicOrdering::Acquire);
            if old_limit == new_limit {
                return false;
            }
            let fresh = Arc::new(Semaphore::new(new_limit as usize));
            let retired = std::mem::replace(&mut *slot, fresh);
            self.limit.store(new_limit, AtomicOrdering::Release);
            self.resize_queue(old_limit, new_limit);
            retired
        };

        tokio::spawn(async move {
            tokio::time::sleep(DISPOSE_GRACE).await;
            retired.close();
        });

        true
    }

    /// Moves the compound queue capacity from `old_limit` to `new_limit`.
    fn resize_queue(&self, old_limit: u32, new_limit: u32) {
        if new_limit > old_limit {
            self.queue.add_permits((new_limit - old_limit) as usize);
            return;
        }
        // Shrink best-effort: only permits that are currently free can be
        // retired; the rest return to a smaller pool as work drains.
        for _ in 0..(old_limit - new_limit) {
            match self.queue.clone().try_acquire_owned() {
                Ok(permit) => permit.forget(),
                Err(_) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_swaps_the_parallelism_semaphore() {
        let gates = AdmissionGates::new(4, 2);
        let before = gates.parallel();

        assert!(gates.publish_limit(6));
        let after = gates.parallel();

        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(gates.current_limit(), 6);
        assert_eq!(after.available_permits(), 6);
    }

    #[tokio::test]
    async fn publishing_the_same_limit_is_a_no_op() {
        let gates = AdmissionGates::new(4, 2);
        let before = gates.parallel();

        assert!(!gates.publish_limit(4));
        assert!(Arc::ptr_eq(&before, &gates.parallel()));
    }

    #[tokio::test]
    async fn queue_capacity_tracks_the_published_limit() {
        let gates = AdmissionGates::new(4, 2);
        assert_eq!(gates.queue().available_permits(), 6);

        gates.publish_limit(10);
        assert_eq!(gates.queue().available_permits(), 12);

        gates.publish_limit(3);
        assert_eq!(gates.queue().available_permits(), 5);
    }

    #[tokio::test]
    async fn queue_shrink_is_best_effort_under_load() {
        let gates = AdmissionGates::new(4, 0);
        // All four in-system slots held by in-flight work.
        let held: Vec<_> = (0..4)
            .map(|_| gates.queue().clone().try_acquire_owned().unwrap())
            .collect();

        gates.publish_limit(1);
        // Nothing free to retire; the held permits drain the excess later.
        assert_eq!(gates.queue().available_permits(), 0);
        drop(held);
        assert_eq!(gates.queue().available_permits(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn retired_semaphore_closes_after_grace_and_release_is_silent() {
        let gates = AdmissionGates::new(2, 0);
        let old = gates.parallel();
        let permit = old.clone().try_acquire_owned().unwrap();

        gates.publish_limit(5);
        assert!(!old.is_closed());

        tokio::time::sleep(DISPOSE_GRACE + Duration::from_millis(10)).await;
        assert!(old.is_closed());

        // Release against the retired instance must not panic.
        drop(permit);
        assert!(old.clone().try_acquire_owned().is_err());
    }

    #[test]
    fn available_queue_is_clamped_to_depth() {
        let gates = AdmissionGates::new(8, 3);
        assert_eq!(gates.available_queue(), 3);
    }
}
