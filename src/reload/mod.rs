//! # Hot-reloadable policy snapshots.
//!
//! Retry and timeout parameters are held as **immutable snapshots** behind a
//! [`ReloadingSlot`]: executors `load()` a consistent snapshot per attempt,
//! and a configuration-change subscription `store()`s a replacement without
//! tearing down the enclosing pipeline.
//!
//! ## Pieces
//! - [`ReloadingSlot`] — the atomic snapshot holder (wait-free `load`,
//!   lock-free `store`, identity CAS).
//! - [`RetrySnapshot`] / [`TimeoutSnapshot`] — the immutable per-strategy
//!   state the surrounding executors consume.
//! - [`PolicyOptions`] — the opaque options record arriving from the
//!   configuration boundary.
//! - [`ReloadBinding`] — per-strategy adapter: parses a matching options
//!   kind into a snapshot and stores it; anything else is a **no-op**.
//! - [`ChangeSource`] / [`Subscription`] — the change-notification
//!   boundary; [`DisposableReloadingHandle`] bundles a slot with its
//!   subscription for one-call teardown.
//!
//! ## Why immutable snapshots
//! Making the state type immutable and atomically swappable eliminates
//! per-field locks inside the executors and makes reloads tear-free even
//! under heavy concurrent execution.

mod binding;
mod retry;
mod slot;
mod source;
mod timeout;

pub use binding::{PolicyOptions, ReloadBinding, RetryBinding, TimeoutBinding};
pub use retry::{BackoffKind, RetryOptions, RetrySnapshot};
pub use slot::ReloadingSlot;
pub use source::{
    ChangeListener, ChangeSource, DisposableReloadingHandle, MemoryChangeSource, Subscription,
};
pub use timeout::{TimeoutOptions, TimeoutSnapshot};
