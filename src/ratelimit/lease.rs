//! # Rate limit leases.
//!
//! A lease is the opaque handle representing one acquisition attempt.
//! Granted leases return their capacity on disposal (or drop); failed
//! leases carry metadata such as the limiter's `retry_after` estimate.
//!
//! ## Disposal rules
//! - A lease releases **exactly once**; re-disposal is a no-op.
//! - A [`CompositeLease`] releases both inner leases exactly once.
//! - Releasing into a stage that has since been retired by an adjustment
//!   rebuild is a silent no-op on that stage's side.

use std::time::Duration;

/// Metadata key for the suggested wait before retrying.
pub const RETRY_AFTER: &str = "retry_after";

/// Metadata key for a short rejection reason.
pub const REASON: &str = "reason";

/// Value attached to a lease under a metadata name.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetadataValue {
    /// A duration, e.g. the `retry_after` estimate.
    Duration(Duration),
    /// A counter, e.g. the number of permits requested.
    Count(u64),
    /// A short static label.
    Text(&'static str),
}

impl MetadataValue {
    /// Returns the duration value, if this is one.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            MetadataValue::Duration(d) => Some(*d),
            _ => None,
        }
    }
}

/// Handle for one acquisition against a single limiter stage.
pub struct RateLimitLease {
    acquired: bool,
    metadata: Vec<(&'static str, MetadataValue)>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl RateLimitLease {
    /// A granted lease whose disposal runs `release` exactly once.
    pub fn granted(
        metadata: Vec<(&'static str, MetadataValue)>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            acquired: true,
            metadata,
            release: Some(Box::new(release)),
        }
    }

    /// A granted lease with nothing to return on disposal (sliding-window
    /// permits expire with their segment instead).
    pub fn granted_untracked(metadata: Vec<(&'static str, MetadataValue)>) -> Self {
        Self {
            acquired: true,
            metadata,
            release: None,
        }
    }

    /// A failed lease carrying rejection metadata.
    pub fn failed(metadata: Vec<(&'static str, MetadataValue)>) -> Self {
        Self {
            acquired: false,
            metadata,
            release: None,
        }
    }

    /// A failed lease for a stage that was never attempted.
    pub fn idle() -> Self {
        Self::failed(Vec::new())
    }

    /// Whether the acquisition succeeded.
    pub fn acquired(&self) -> bool {
        self.acquired
    }

    /// Looks up a metadata value by name.
    pub fn try_get_metadata(&self, name: &str) -> Option<&MetadataValue> {
        self.metadata
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    /// Names of all attached metadata entries, in attachment order.
    pub fn metadata_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.metadata.iter().map(|(key, _)| *key)
    }

    /// Releases the held capacity. Idempotent; also runs on drop.
    pub fn dispose(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for RateLimitLease {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for RateLimitLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitLease")
            .field("acquired", &self.acquired)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Paired lease over both stages of the composite limiter.
///
/// `acquired` is the conjunction of the inner leases; metadata lookups
/// consult the token bucket first, then the sliding window.
#[derive(Debug)]
pub struct CompositeLease {
    token_bucket: RateLimitLease,
    sliding_window: RateLimitLease,
}

impl CompositeLease {
    pub(crate) fn new(token_bucket: RateLimitLease, sliding_window: RateLimitLease) -> Self {
        Self {
            token_bucket,
            sliding_window,
        }
    }

    /// Whether **both** stages granted.
    pub fn acquired(&self) -> bool {
        self.token_bucket.acquired() && self.sliding_window.acquired()
    }

    /// Looks up a metadata value, token bucket first (first match wins).
    pub fn try_get_metadata(&self, name: &str) -> Option<&MetadataValue> {
        self.token_bucket
            .try_get_metadata(name)
            .or_else(|| self.sliding_window.try_get_metadata(name))
    }

    /// Deduplicated union of both stages' metadata names, token bucket
    /// entries first.
    pub fn metadata_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.token_bucket.metadata_names().collect();
        for name in self.sliding_window.metadata_names() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Releases both inner leases exactly once. Idempotent; also runs on
    /// drop.
    pub fn dispose(&mut self) {
        self.token_bucket.dispose();
        self.sliding_window.dispose();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    fn counting_lease(counter: &Arc<AtomicUsize>) -> RateLimitLease {
        let counter = Arc::clone(counter);
        RateLimitLease::granted(Vec::new(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn dispose_releases_exactly_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut lease = counting_lease(&released);

        lease.dispose();
        lease.dispose();
        drop(lease);

        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases_an_undisposed_lease() {
        let released = Arc::new(AtomicUsize::new(0));
        drop(counting_lease(&released));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn composite_acquired_is_the_conjunction() {
        let ok = CompositeLease::new(
            RateLimitLease::granted_untracked(Vec::new()),
            RateLimitLease::granted_untracked(Vec::new()),
        );
        assert!(ok.acquired());

        let half = CompositeLease::new(
            RateLimitLease::granted_untracked(Vec::new()),
            RateLimitLease::idle(),
        );
        assert!(!half.acquired());
    }

    #[test]
    fn composite_metadata_union_prefers_the_token_bucket() {
        let tb = RateLimitLease::failed(vec![
            (RETRY_AFTER, MetadataValue::Duration(Duration::from_secs(1))),
            (REASON, MetadataValue::Text("bucket empty")),
        ]);
        let sw = RateLimitLease::failed(vec![
            (RETRY_AFTER, MetadataValue::Duration(Duration::from_secs(9))),
            ("segment", MetadataValue::Count(3)),
        ]);
        let lease = CompositeLease::new(tb, sw);

        assert_eq!(lease.metadata_names(), vec![RETRY_AFTER, REASON, "segment"]);
        assert_eq!(
            lease.try_get_metadata(RETRY_AFTER).unwrap().as_duration(),
            Some(Duration::from_secs(1))
        );
        assert_eq!(
            lease.try_get_metadata("segment"),
            Some(&MetadataValue::Count(3))
        );
        assert_eq!(lease.try_get_metadata("missing"), None);
    }

    #[test]
    fn composite_dispose_releases_both_exactly_once() {
        let tb_released = Arc::new(AtomicUsize::new(0));
        let sw_released = Arc::new(AtomicUsize::new(0));
        let mut lease = CompositeLease::new(
            counting_lease(&tb_released),
            counting_lease(&sw_released),
        );

        lease.dispose();
        lease.dispose();
        drop(lease);

        assert_eq!(tb_released.load(Ordering::SeqCst), 1);
        assert_eq!(sw_released.load(Ordering::SeqCst), 1);
    }
}
