//! Per-channel filter banks.
//!
//! A bank owns one filter per degree of freedom and checks that every input
//! vector has exactly one entry per channel. Resizing rebuilds every channel
//! with the bank's current parameters, so no history survives a change in
//! the number of degrees of freedom.

use wholebody_errors::ConfigError;

use crate::adaptive_window::{AdaptiveWindowEstimator, AdaptiveWindowParams, FitOrder};
use crate::low_pass::LowPassFilter;

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), ConfigError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ConfigError::dimension_mismatch(what, expected, actual))
    }
}

/// One adaptive-window estimator per channel, sharing order and parameters.
#[derive(Debug, Clone)]
pub struct AdaptiveWindowBank {
    order: FitOrder,
    params: AdaptiveWindowParams,
    channels: Vec<AdaptiveWindowEstimator>,
}

impl AdaptiveWindowBank {
    /// Create a bank of `channels` empty estimators.
    ///
    /// # Errors
    ///
    /// Returns an error if `params` is invalid.
    pub fn new(
        order: FitOrder,
        params: AdaptiveWindowParams,
        channels: usize,
    ) -> Result<Self, ConfigError> {
        params.validate()?;
        let mut bank = Self {
            order,
            params,
            channels: Vec::new(),
        };
        bank.resize(channels)?;
        Ok(bank)
    }

    /// Rebuild the bank with `channels` empty estimators.
    ///
    /// # Errors
    ///
    /// Only fails if the stored parameters are invalid, which `new` and
    /// `set_params` rule out.
    pub fn resize(&mut self, channels: usize) -> Result<(), ConfigError> {
        self.channels = (0..channels)
            .map(|_| AdaptiveWindowEstimator::new(self.order, self.params))
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    /// Push one sample per channel and write the estimates into `out`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DimensionMismatch`] if `values` or `out` does
    /// not have one entry per channel. Nothing is updated in that case.
    pub fn update(&mut self, values: &[f64], stamp: f64, out: &mut [f64]) -> Result<(), ConfigError> {
        check_len("adaptive window input", self.channels.len(), values.len())?;
        check_len("adaptive window output", self.channels.len(), out.len())?;
        for ((channel, &value), slot) in self.channels.iter_mut().zip(values).zip(out.iter_mut()) {
            *slot = channel.update(value, stamp);
        }
        Ok(())
    }

    /// Apply new parameters to every channel, keeping buffered samples.
    ///
    /// # Errors
    ///
    /// Returns an error if `params` is invalid; the bank is unchanged.
    pub fn set_params(&mut self, params: AdaptiveWindowParams) -> Result<(), ConfigError> {
        params.validate()?;
        for channel in &mut self.channels {
            channel.set_params(params)?;
        }
        self.params = params;
        Ok(())
    }

    /// Current parameters.
    #[must_use]
    pub fn params(&self) -> AdaptiveWindowParams {
        self.params
    }

    /// Number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether the bank has no channels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Latest estimate of each channel.
    pub fn estimates(&self) -> impl Iterator<Item = f64> + '_ {
        self.channels.iter().map(AdaptiveWindowEstimator::estimate)
    }

    /// Channels, in index order.
    #[must_use]
    pub fn channels(&self) -> &[AdaptiveWindowEstimator] {
        &self.channels
    }

    /// Mutable access to the channels.
    pub fn channels_mut(&mut self) -> &mut [AdaptiveWindowEstimator] {
        &mut self.channels
    }
}

/// One low-pass filter per channel, sharing the cutoff frequency.
#[derive(Debug, Clone)]
pub struct LowPassBank {
    cutoff_hz: f64,
    channels: Vec<LowPassFilter>,
}

impl LowPassBank {
    /// Create a bank of `channels` unprimed filters.
    ///
    /// # Errors
    ///
    /// Returns an error if `cutoff_hz` is invalid.
    pub fn new(cutoff_hz: f64, channels: usize) -> Result<Self, ConfigError> {
        let mut bank = Self {
            cutoff_hz: LowPassFilter::new(cutoff_hz)?.cutoff_hz(),
            channels: Vec::new(),
        };
        bank.resize(channels)?;
        Ok(bank)
    }

    /// Rebuild the bank with `channels` unprimed filters.
    ///
    /// # Errors
    ///
    /// Only fails if the stored cutoff is invalid, which `new` and
    /// `set_cutoff_frequency` rule out.
    pub fn resize(&mut self, channels: usize) -> Result<(), ConfigError> {
        self.channels = (0..channels)
            .map(|_| LowPassFilter::new(self.cutoff_hz))
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    /// Filter one sample per channel and write the outputs into `out`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DimensionMismatch`] if `values` or `out` does
    /// not have one entry per channel. Nothing is updated in that case.
    pub fn update(&mut self, values: &[f64], dt: f64, out: &mut [f64]) -> Result<(), ConfigError> {
        check_len("low pass input", self.channels.len(), values.len())?;
        check_len("low pass output", self.channels.len(), out.len())?;
        for ((channel, &value), slot) in self.channels.iter_mut().zip(values).zip(out.iter_mut()) {
            *slot = channel.update(value, dt);
        }
        Ok(())
    }

    /// Change the cutoff of every channel, keeping history.
    ///
    /// # Errors
    ///
    /// Returns an error if `cutoff_hz` is invalid; the bank is unchanged.
    pub fn set_cutoff_frequency(&mut self, cutoff_hz: f64) -> Result<(), ConfigError> {
        LowPassFilter::new(cutoff_hz)?;
        for channel in &mut self.channels {
            channel.set_cutoff_frequency(cutoff_hz)?;
        }
        self.cutoff_hz = cutoff_hz;
        Ok(())
    }

    /// Current cutoff frequency in Hz.
    #[must_use]
    pub fn cutoff_hz(&self) -> f64 {
        self.cutoff_hz
    }

    /// Number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether the bank has no channels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Latest output of each channel.
    pub fn outputs(&self) -> impl Iterator<Item = f64> + '_ {
        self.channels.iter().map(LowPassFilter::output)
    }

    /// Mutable access to the channels.
    pub fn channels_mut(&mut self) -> &mut [LowPassFilter] {
        &mut self.channels
    }
}
