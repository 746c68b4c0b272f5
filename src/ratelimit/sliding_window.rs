//! # Sliding window stage.
//!
//! Segmented sliding-window counter: the wall-clock window is divided into
//! `segments_per_window` equal segments, each holding the number of
//! permits granted while it was current. As time advances the oldest
//! segment expires and a fresh one opens, sliding the boundary in steps.
//!
//! Permits are **not** released back explicitly — they expire with their
//! segment. A granted lease therefore carries no release action.
//!
//! ## Retirement
//! Mirrors the token bucket: the adaptive loop replaces the window
//! wholesale; a retired instance refuses acquisition.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::config::SlidingWindowConfig;
use super::lease::{MetadataValue, RateLimitLease, REASON, RETRY_AFTER};

/// Mutable counters behind the mutex.
struct WindowState {
    /// Per-segment grant counts; front is oldest, back is current.
    segments: VecDeque<u64>,
    /// Total across `segments`, maintained incrementally.
    used: u64,
    /// Start of the current (back) segment.
    segment_started_at: Instant,
}

/// Aggregate-rate stage of the composite limiter.
pub struct SlidingWindow {
    config: SlidingWindowConfig,
    segment_length: Duration,
    state: Mutex<WindowState>,
    retired: AtomicBool,
}

impl SlidingWindow {
    /// Creates an empty window. `config` must already be validated.
    pub fn new(config: SlidingWindowConfig) -> Self {
        let mut segments = VecDeque::with_capacity(config.segments_per_window);
        segments.extend(std::iter::repeat(0u64).take(config.segments_per_window));
        Self {
            segment_length: config.window / config.segments_per_window as u32,
            state: Mutex::new(WindowState {
                segments,
                used: 0,
                segment_started_at: Instant::now(),
            }),
            config,
            retired: AtomicBool::new(false),
        }
    }

    /// Attempts to count `n` permits against the live window.
    ///
    /// A failed lease carries a `retry_after` pointing at the next segment
    /// boundary, when the oldest counts expire.
    pub fn try_acquire(&self, n: u64) -> RateLimitLease {
        if self.is_retired() {
            return RateLimitLease::failed(vec![(REASON, MetadataValue::Text("window retired"))]);
        }

        let mut state = self.state.lock().expect("sliding window poisoned");
        let now = Instant::now();
        self.slide(&mut state, now);

        if state.used.saturating_add(n) <= self.config.permit_limit {
            state.used += n;
            if let Some(current) = state.segments.back_mut() {
                *current += n;
            }
            return RateLimitLease::granted_untracked(vec![("permits", MetadataValue::Count(n))]);
        }

        let until_next_segment = self
            .segment_length
            .saturating_sub(now.saturating_duration_since(state.segment_started_at));
        RateLimitLease::failed(vec![
            ("permits", MetadataValue::Count(n)),
            (RETRY_AFTER, MetadataValue::Duration(until_next_segment)),
        ])
    }

    /// Permits still admittable in the live window.
    pub fn available(&self) -> u64 {
        let mut state = self.state.lock().expect("sliding window poisoned");
        self.slide(&mut state, Instant::now());
        self.config.permit_limit.saturating_sub(state.used)
    }

    /// Marks the window retired; acquisition fails from now on.
    pub fn retire(&self) {
        self.retired.store(true, AtomicOrdering::Release);
    }

    /// Whether the window has been retired by a rebuild.
    pub fn is_retired(&self) -> bool {
        self.retired.load(AtomicOrdering::Acquire)
    }

    /// The permit capacity this window was built with.
    pub fn permit_limit(&self) -> u64 {
        self.config.permit_limit
    }

    /// Expires whole segments elapsed since the last advance.
    fn slide(&self, state: &mut WindowState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.segment_started_at);
        let steps = (elapsed.as_nanos() / self.segment_length.as_nanos().max(1))
            .min(u128::from(u32::MAX)) as u32;
        if steps == 0 {
            return;
        }

        if steps as usize >= self.config.segments_per_window {
            // The whole window has passed; drop every count at once.
            for segment in state.segments.iter_mut() {
                *segment = 0;
            }
            state.used = 0;
        } else {
            for _ in 0..steps {
                let expired = state.segments.pop_front().unwrap_or(0);
                state.used -= expired;
                state.segments.push_back(0);
            }
        }
        state.segment_started_at += self.segment_length * steps;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(permit_limit: u64, window: Duration, segments: usize) -> SlidingWindow {
        SlidingWindow::new(SlidingWindowConfig {
            permit_limit,
            window,
            segments_per_window: segments,
        })
    }

    #[test]
    fn grants_until_the_limit_then_fails() {
        let w = window(3, Duration::from_secs(60), 6);
        assert!(w.try_acquire(1).acquired());
        assert!(w.try_acquire(2).acquired());

        let lease = w.try_acquire(1);
        assert!(!lease.acquired());
        assert!(lease.try_get_metadata(RETRY_AFTER).is_some());
        assert_eq!(w.available(), 0);
    }

    #[test]
    fn counts_expire_as_segments_slide() {
        // 10 ms window, 2 segments of 5 ms.
        let w = window(2, Duration::from_millis(10), 2);
        assert!(w.try_acquire(2).acquired());
        assert!(!w.try_acquire(1).acquired());

        // After a full window both segments have expired.
        std::thread::sleep(Duration::from_millis(12));
        assert!(w.try_acquire(2).acquired());
    }

    #[test]
    fn dropping_a_granted_lease_does_not_refund_the_window() {
        let w = window(2, Duration::from_secs(60), 4);
        drop(w.try_acquire(2));
        // Permits expire with their segment, not with the lease.
        assert_eq!(w.available(), 0);
    }

    #[test]
    fn retired_window_rejects() {
        let w = window(5, Duration::from_secs(1), 5);
        w.retire();
        let lease = w.try_acquire(1);
        assert!(!lease.acquired());
        assert_eq!(
            lease.try_get_metadata(REASON),
            Some(&MetadataValue::Text("window retired"))
        );
    }
}
