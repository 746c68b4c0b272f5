//! # Per-strategy reload adapters.
//!
//! A [`ReloadBinding`] receives the opaque [`PolicyOptions`] record from the
//! configuration boundary and, when the kind matches its strategy, parses it
//! into a fresh snapshot and stores it into the slot.
//!
//! ## Rules
//! - An options record of an **unexpected kind is a no-op** — the current
//!   snapshot is preserved. Robustness property, testable.
//! - A matching kind whose fields fail validation is **also a no-op**: a
//!   live policy is never replaced by a snapshot that would not construct.

use std::sync::Arc;

use super::retry::{RetryOptions, RetrySnapshot};
use super::slot::ReloadingSlot;
use super::timeout::{TimeoutOptions, TimeoutSnapshot};

/// Opaque options record delivered by the configuration boundary.
///
/// Each variant carries the option record of one strategy; bindings filter
/// by variant.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PolicyOptions {
    /// Retry strategy options.
    Retry(RetryOptions),
    /// Timeout strategy options.
    Timeout(TimeoutOptions),
}

/// Strategy-specific configuration-change adapter.
pub trait ReloadBinding: Send + Sync {
    /// Applies `options` if they are of this binding's kind and valid;
    /// otherwise leaves the current snapshot untouched.
    fn on_configuration_changed(&self, options: &PolicyOptions);
}

/// Reload adapter for the retry strategy.
pub struct RetryBinding {
    slot: Arc<ReloadingSlot<RetrySnapshot>>,
}

impl RetryBinding {
    /// Creates a binding feeding `slot`.
    pub fn new(slot: Arc<ReloadingSlot<RetrySnapshot>>) -> Self {
        Self { slot }
    }

    /// The slot this binding stores into.
    pub fn slot(&self) -> &Arc<ReloadingSlot<RetrySnapshot>> {
        &self.slot
    }
}

impl ReloadBinding for RetryBinding {
    fn on_configuration_changed(&self, options: &PolicyOptions) {
        let PolicyOptions::Retry(opts) = options else {
            return;
        };
        if let Ok(snapshot) = RetrySnapshot::from_options(opts) {
            self.slot.store(snapshot);
        }
    }
}

/// Reload adapter for the timeout strategy.
pub struct TimeoutBinding {
    slot: Arc<ReloadingSlot<TimeoutSnapshot>>,
}

impl TimeoutBinding {
    /// Creates a binding feeding `slot`.
    pub fn new(slot: Arc<ReloadingSlot<TimeoutSnapshot>>) -> Self {
        Self { slot }
    }

    /// The slot this binding stores into.
    pub fn slot(&self) -> &Arc<ReloadingSlot<TimeoutSnapshot>> {
        &self.slot
    }
}

impl ReloadBinding for TimeoutBinding {
    fn on_configuration_changed(&self, options: &PolicyOptions) {
        let PolicyOptions::Timeout(opts) = options else {
            return;
        };
        if let Ok(snapshot) = TimeoutSnapshot::from_options(opts) {
            self.slot.store(snapshot);
        }
    }
}
