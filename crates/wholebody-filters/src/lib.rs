//! Per-channel numeric filters for joint sensor streams.
//!
//! This crate provides the filters the estimation cycle runs once per period
//! on every degree of freedom:
//!
//! - **Adaptive window**: least-squares polynomial fit over a sliding window
//!   whose length shrinks during transients and grows when the signal is
//!   quiet. A linear fit yields the first derivative (velocity, torque
//!   derivative), a quadratic fit the second derivative (acceleration).
//! - **Low pass**: first-order IIR smoothing with a cutoff frequency that can
//!   be changed at any time without resetting history.
//! - **Banks**: fixed-size vectors of the above, one instance per channel,
//!   resized together when the number of degrees of freedom changes.
//!
//! # Bounded cost
//!
//! - Window buffers are allocated once at construction or resize
//! - An adaptive-window update is O(N²) in the configured window length N
//! - A low-pass update is O(1)
//!
//! # Example
//!
//! ```
//! use wholebody_filters::prelude::*;
//!
//! let params = AdaptiveWindowParams::new(16, 1.0);
//! let mut velocity = AdaptiveWindowEstimator::new(FitOrder::Linear, params)?;
//!
//! for k in 0..20 {
//!     let t = k as f64 * 0.01;
//!     velocity.update(2.0 * t, t);
//! }
//! assert!((velocity.estimate() - 2.0).abs() < 1e-9);
//! # Ok::<(), wholebody_errors::ConfigError>(())
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![deny(unused_must_use)]
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod adaptive_window;
pub mod bank;
pub mod low_pass;
pub mod prelude;
pub mod state;

pub use adaptive_window::{AdaptiveWindowEstimator, AdaptiveWindowParams, FitOrder};
pub use bank::{AdaptiveWindowBank, LowPassBank};
pub use low_pass::LowPassFilter;
pub use state::FilterState;
