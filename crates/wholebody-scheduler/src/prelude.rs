//! Prelude module for common scheduler types.

pub use crate::jitter::{JitterMetrics, JitterSummary};
pub use crate::scheduler::{AbsoluteScheduler, Tick, period_from_ms};
pub use crate::{DEFAULT_PERIOD, MIN_PERIOD};
