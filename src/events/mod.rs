//! # Adjustment events: records, bus, and sink fan-out.
//!
//! Every accepted parallelization change is published as an [`Adjustment`]
//! record. Publication is a channel fan-out, not a pluralized callback set:
//! the core publishes, listeners subscribe and unsubscribe cleanly.
//!
//! Two consumption styles:
//! - [`AdjustmentBus::subscribe`] hands out a raw broadcast receiver for
//!   code that wants to `recv().await` records itself.
//! - [`SinkSet`] drives a set of [`AdjustmentSink`]s, each with a dedicated
//!   worker task, a bounded queue, and panic isolation.

mod bus;
mod event;
#[cfg(feature = "logging")]
mod log;
mod set;
mod sink;

pub use bus::AdjustmentBus;
pub use event::Adjustment;
#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SinkSet;
pub use sink::AdjustmentSink;
