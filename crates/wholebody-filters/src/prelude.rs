//! Prelude module for convenient imports.
//!
//! ```
//! use wholebody_filters::prelude::*;
//! ```

pub use crate::adaptive_window::{AdaptiveWindowEstimator, AdaptiveWindowParams, FitOrder};
pub use crate::bank::{AdaptiveWindowBank, LowPassBank};
pub use crate::low_pass::LowPassFilter;
pub use crate::state::FilterState;
