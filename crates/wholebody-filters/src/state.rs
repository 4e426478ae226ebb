//! Common filter state operations.

use crate::{AdaptiveWindowBank, AdaptiveWindowEstimator, LowPassBank, LowPassFilter};

/// Filter trait for common filter operations.
pub trait FilterState: std::fmt::Debug {
    /// Reset the filter history, keeping its parameters.
    fn reset(&mut self);
}

impl FilterState for AdaptiveWindowEstimator {
    fn reset(&mut self) {
        self.clear();
    }
}

impl FilterState for LowPassFilter {
    fn reset(&mut self) {
        self.clear();
    }
}

impl FilterState for AdaptiveWindowBank {
    fn reset(&mut self) {
        self.channels_mut().iter_mut().for_each(FilterState::reset);
    }
}

impl FilterState for LowPassBank {
    fn reset(&mut self) {
        self.channels_mut().iter_mut().for_each(FilterState::reset);
    }
}
