//! # Composite adaptive rate limiting.
//!
//! A two-stage admission filter: a **token bucket** smooths bursts, a
//! **sliding window** bounds the aggregate rate. Acquisition is paired —
//! both stages must grant, and a sliding-window refusal rolls the
//! speculative tokens back before the caller sees the failure.
//!
//! A feedback loop watches acceptance outcomes and rebuilds either stage
//! with scaled capacity when the weighted success EMA and the raw
//! acceptance rate cross a threshold together.
//!
//! | Piece | Role |
//! |---|---|
//! | [`RateLimiterConfig`] | All three parameter records, validated up front. |
//! | [`TokenBucket`] / [`SlidingWindow`] | The two stages. |
//! | [`RateLimitLease`] / [`CompositeLease`] | Acquisition handles with metadata. |
//! | [`CompositeRateLimiter`] | Paired acquire + adaptive loop + execute surface. |

mod composite;
mod config;
mod lease;
mod sliding_window;
mod token_bucket;

pub use composite::CompositeRateLimiter;
pub use config::{
    AdaptiveLimiterConfig, RateLimiterConfig, SlidingWindowConfig, TokenBucketConfig,
};
pub use lease::{CompositeLease, MetadataValue, RateLimitLease, REASON, RETRY_AFTER};
pub use sliding_window::SlidingWindow;
pub use token_bucket::TokenBucket;
