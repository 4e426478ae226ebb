//! First-order low-pass filter.
//!
//! Discrete form of `tau * dy/dt + y = x` with `tau = 1 / (2π fc)`:
//!
//! ```text
//! alpha = dt / (dt + tau)
//! y[k]  = y[k-1] + alpha * (x[k] - y[k-1])
//! ```
//!
//! The step is taken with the measured `dt` of each cycle, so a late period
//! weighs the new sample more instead of drifting the corner frequency.

use std::f64::consts::TAU;

use wholebody_errors::ConfigError;

/// First-order IIR low-pass filter for one scalar channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LowPassFilter {
    cutoff_hz: f64,
    output: f64,
    primed: bool,
}

impl LowPassFilter {
    /// Create a filter with the given cutoff frequency.
    ///
    /// The first sample passed to [`update`](Self::update) seeds the output.
    /// An infinite cutoff makes the filter a passthrough.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] if `cutoff_hz` is not
    /// strictly positive.
    pub fn new(cutoff_hz: f64) -> Result<Self, ConfigError> {
        validate_cutoff(cutoff_hz)?;
        Ok(Self {
            cutoff_hz,
            output: 0.0,
            primed: false,
        })
    }

    /// Create a filter whose output starts at `initial` instead of being
    /// seeded by the first sample.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_initial(cutoff_hz: f64, initial: f64) -> Result<Self, ConfigError> {
        let mut filter = Self::new(cutoff_hz)?;
        filter.output = initial;
        filter.primed = true;
        Ok(filter)
    }

    /// Filter one sample taken `dt` seconds after the previous one.
    ///
    /// Non-finite samples and non-positive steps leave the output unchanged.
    pub fn update(&mut self, value: f64, dt: f64) -> f64 {
        if !value.is_finite() {
            return self.output;
        }
        if !self.primed {
            self.output = value;
            self.primed = true;
            return self.output;
        }
        if !(dt.is_finite() && dt > 0.0) {
            return self.output;
        }

        let alpha = if self.cutoff_hz.is_infinite() {
            1.0
        } else {
            let tau = 1.0 / (TAU * self.cutoff_hz);
            dt / (dt + tau)
        };
        self.output += alpha * (value - self.output);
        self.output
    }

    /// Change the cutoff frequency, keeping the filter history.
    ///
    /// # Errors
    ///
    /// Returns an error if `cutoff_hz` is invalid; the filter is unchanged.
    pub fn set_cutoff_frequency(&mut self, cutoff_hz: f64) -> Result<(), ConfigError> {
        validate_cutoff(cutoff_hz)?;
        self.cutoff_hz = cutoff_hz;
        Ok(())
    }

    /// Current cutoff frequency in Hz.
    #[inline]
    #[must_use]
    pub fn cutoff_hz(&self) -> f64 {
        self.cutoff_hz
    }

    /// Latest filtered value.
    #[inline]
    #[must_use]
    pub fn output(&self) -> f64 {
        self.output
    }

    /// Forget the history; the next sample seeds the output again.
    pub fn clear(&mut self) {
        self.output = 0.0;
        self.primed = false;
    }
}

fn validate_cutoff(cutoff_hz: f64) -> Result<(), ConfigError> {
    if cutoff_hz > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid_parameter("cutoff_frequency", cutoff_hz))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_first_sample_seeds_output() -> TestResult {
        let mut lp = LowPassFilter::new(3.0)?;
        assert!((lp.update(4.0, 0.01) - 4.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn test_infinite_cutoff_is_passthrough() -> TestResult {
        let mut lp = LowPassFilter::new(f64::INFINITY)?;
        for k in 0..10 {
            let x = f64::from(k).sin();
            assert!((lp.update(x, 0.001) - x).abs() < f64::EPSILON);
        }
        Ok(())
    }

    #[test]
    fn test_tiny_cutoff_holds_initial_value() -> TestResult {
        let mut lp = LowPassFilter::with_initial(1e-9, 2.0)?;
        for _ in 0..1000 {
            lp.update(100.0, 0.01);
        }
        assert!((lp.output() - 2.0).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn test_step_response_reaches_63_percent_at_tau() -> TestResult {
        let fc = 1.0;
        let tau = 1.0 / (TAU * fc);
        let steps = 16_000u32;
        let dt = tau / f64::from(steps);
        let mut lp = LowPassFilter::with_initial(fc, 0.0)?;
        for _ in 0..steps {
            lp.update(1.0, dt);
        }
        assert!((lp.output() - (1.0 - (-1.0f64).exp())).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn test_non_positive_dt_holds_output() -> TestResult {
        let mut lp = LowPassFilter::with_initial(3.0, 1.0)?;
        lp.update(10.0, 0.0);
        lp.update(10.0, -0.01);
        lp.update(10.0, f64::NAN);
        assert!((lp.output() - 1.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn test_set_cutoff_keeps_history() -> TestResult {
        let mut lp = LowPassFilter::with_initial(3.0, 5.0)?;
        lp.set_cutoff_frequency(10.0)?;
        assert!((lp.output() - 5.0).abs() < f64::EPSILON);
        assert!((lp.cutoff_hz() - 10.0).abs() < f64::EPSILON);
        assert!(lp.set_cutoff_frequency(0.0).is_err());
        assert!(lp.set_cutoff_frequency(f64::NAN).is_err());
        assert!((lp.cutoff_hz() - 10.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn test_clear_reseeds() -> TestResult {
        let mut lp = LowPassFilter::with_initial(3.0, 5.0)?;
        lp.clear();
        assert!((lp.update(-1.0, 0.01) + 1.0).abs() < f64::EPSILON);
        Ok(())
    }
}
