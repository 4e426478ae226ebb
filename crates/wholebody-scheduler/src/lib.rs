//! Absolute-deadline periodic scheduling with jitter tracking.
//!
//! The estimation worker runs at a fixed period (10 ms by default). This
//! crate provides the timing half of that loop:
//!
//! - **AbsoluteScheduler**: wakes at absolute deadlines so that processing
//!   time never accumulates into drift; sleeps coarsely then spins for the
//!   last stretch of each period
//! - **JitterMetrics**: deadline misses, maximum and mean jitter, and
//!   percentiles over a window of recent wake-ups
//!
//! Periods shorter than [`MIN_PERIOD`] are rejected: below that the OS
//! sleep granularity dominates the period itself.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use wholebody_scheduler::AbsoluteScheduler;
//!
//! let mut scheduler = AbsoluteScheduler::with_period(Duration::from_millis(10))?;
//! for _ in 0..100 {
//!     let tick = scheduler.wait_for_tick();
//!     // one estimation cycle, stamped with tick.elapsed_s
//!     let _ = tick.elapsed_s;
//! }
//! # Ok::<(), wholebody_errors::ConfigError>(())
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]
#![deny(unused_must_use)]

pub mod jitter;
pub mod prelude;
pub mod scheduler;

pub use jitter::{JitterMetrics, JitterSummary};
pub use scheduler::{AbsoluteScheduler, Tick, period_from_ms};

use std::time::Duration;

/// Default estimation period (10 ms).
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(10);

/// Shortest accepted period (1 ms).
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Remaining time below which the scheduler spins instead of sleeping.
pub const SPIN_TAIL: Duration = Duration::from_micros(200);
