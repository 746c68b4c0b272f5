//! # Atomic snapshot slot.
//!
//! [`ReloadingSlot`] is the exclusive owner of the current snapshot `S`.
//! Readers observe only fully-published snapshots; writers may race, last
//! writer wins; the CAS returns the value it compared against so a caller
//! can detect a lost race by pointer identity.
//!
//! Built on `arc-swap`: `load` is wait-free, `store` is lock-free, and a
//! `store()` happens-before the first `load()` that observes the new value
//! on every subsequent reader thread (release/acquire semantics).

use std::sync::Arc;

use arc_swap::ArcSwap;

/// Atomic holder of an immutable snapshot.
///
/// Created with the policy and lives until the policy is dropped; the
/// configuration-change subscription feeds [`store`](Self::store).
pub struct ReloadingSlot<S> {
    current: ArcSwap<S>,
}

impl<S> ReloadingSlot<S> {
    /// Creates a slot holding `initial`.
    pub fn new(initial: S) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Returns the most recently stored snapshot. Wait-free.
    pub fn load(&self) -> Arc<S> {
        self.current.load_full()
    }

    /// Unconditionally replaces the current snapshot; returns the prior one
    /// for bookkeeping. Lock-free.
    pub fn store(&self, new: S) -> Arc<S> {
        self.current.swap(Arc::new(new))
    }

    /// Like [`store`](Self::store) but takes an already-shared snapshot.
    pub fn store_arc(&self, new: Arc<S>) -> Arc<S> {
        self.current.swap(new)
    }

    /// Replaces the snapshot only if the current one is identity-equal to
    /// `expected`; returns the value actually observed.
    ///
    /// The caller detects a lost race with
    /// `Arc::ptr_eq(&expected, &observed)`.
    pub fn compare_and_swap(&self, expected: &Arc<S>, new: Arc<S>) -> Arc<S> {
        let observed = self.current.compare_and_swap(expected, new);
        Arc::clone(&observed)
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for ReloadingSlot<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadingSlot")
            .field("current", &self.current.load())
            .finish()
    }
}
