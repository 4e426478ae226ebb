//! Adaptive-window least-squares differentiator.
//!
//! The estimator keeps the most recent `window_length` samples of a channel.
//! On every update it fits a polynomial to the newest samples, starting from
//! the smallest window that determines the fit and growing it one sample at a
//! time. Growth stops at the first window where any sample deviates from the
//! fitted polynomial by more than `threshold`; the derivative of the last
//! accepted fit is the estimate.
//!
//! During a transient the residual test fails early and the window stays
//! short, so the estimate follows the signal without lag. On a quiet signal
//! the full window is used, which averages out sampling jitter and noise.

use std::collections::VecDeque;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use wholebody_errors::ConfigError;

/// Minimum time span a window must cover to be fitted (seconds).
const MIN_SPAN_S: f64 = 1e-12;

/// Polynomial order of the window fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FitOrder {
    /// Straight line; the estimate is the first derivative.
    Linear,
    /// Parabola; the estimate is the second derivative.
    Quadratic,
}

impl FitOrder {
    /// Number of samples needed before a fit is defined.
    #[must_use]
    pub const fn min_samples(self) -> usize {
        match self {
            FitOrder::Linear => 2,
            FitOrder::Quadratic => 3,
        }
    }
}

/// Window length and outlier threshold of an adaptive-window estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveWindowParams {
    /// Maximum number of samples kept in the window.
    pub window_length: usize,
    /// Maximum residual accepted when growing the window, in signal units.
    pub threshold: f64,
}

impl AdaptiveWindowParams {
    /// Create a parameter set.
    #[must_use]
    pub const fn new(window_length: usize, threshold: f64) -> Self {
        Self {
            window_length,
            threshold,
        }
    }

    /// Validate the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] if the window holds fewer
    /// than two samples or the threshold is not a positive finite number.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_length < FitOrder::Linear.min_samples() {
            return Err(ConfigError::invalid_parameter(
                "window_length",
                self.window_length,
            ));
        }
        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return Err(ConfigError::invalid_parameter("threshold", self.threshold));
        }
        Ok(())
    }
}

impl Default for AdaptiveWindowParams {
    fn default() -> Self {
        Self::new(16, 1.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    value: f64,
    stamp: f64,
}

/// Adaptive-window derivative estimator for one scalar channel.
///
/// Fewer samples than the fit needs yield an estimate of exactly `0.0`.
/// Samples whose timestamp does not advance past the newest stored sample are
/// ignored, so re-reading an unchanged sensor value is harmless.
#[derive(Debug, Clone)]
pub struct AdaptiveWindowEstimator {
    order: FitOrder,
    params: AdaptiveWindowParams,
    samples: VecDeque<Sample>,
    estimate: f64,
    effective_window: usize,
}

impl AdaptiveWindowEstimator {
    /// Create an estimator with an empty window.
    ///
    /// # Errors
    ///
    /// Returns an error if `params` fails [`AdaptiveWindowParams::validate`].
    pub fn new(order: FitOrder, params: AdaptiveWindowParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            order,
            params,
            samples: VecDeque::with_capacity(params.window_length),
            estimate: 0.0,
            effective_window: 0,
        })
    }

    /// Push a sample and recompute the estimate.
    ///
    /// Returns the new estimate. Non-finite samples and samples that do not
    /// advance in time leave the estimator untouched.
    pub fn update(&mut self, value: f64, stamp: f64) -> f64 {
        if !value.is_finite() || !stamp.is_finite() {
            return self.estimate;
        }
        if self.samples.back().is_some_and(|newest| stamp <= newest.stamp) {
            return self.estimate;
        }

        while self.samples.len() >= self.params.window_length {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample { value, stamp });

        self.estimate = self.fit_adaptive();
        self.estimate
    }

    /// Latest derivative estimate.
    #[inline]
    #[must_use]
    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    /// Number of samples used by the latest accepted fit (0 if none).
    #[inline]
    #[must_use]
    pub fn effective_window(&self) -> usize {
        self.effective_window
    }

    /// Number of samples currently buffered.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no sample has been buffered yet.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Fit order of this estimator.
    #[must_use]
    pub fn order(&self) -> FitOrder {
        self.order
    }

    /// Current parameters.
    #[must_use]
    pub fn params(&self) -> AdaptiveWindowParams {
        self.params
    }

    /// Replace window length and threshold.
    ///
    /// Buffered samples are kept; when the window shrinks the oldest samples
    /// are dropped. The new parameters apply from the next update.
    ///
    /// # Errors
    ///
    /// Returns an error if `params` is invalid; the estimator is unchanged.
    pub fn set_params(&mut self, params: AdaptiveWindowParams) -> Result<(), ConfigError> {
        params.validate()?;
        while self.samples.len() > params.window_length {
            self.samples.pop_front();
        }
        if params.window_length > self.samples.capacity() {
            self.samples
                .reserve(params.window_length.saturating_sub(self.samples.len()));
        }
        self.params = params;
        Ok(())
    }

    /// Drop every buffered sample and zero the estimate.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.estimate = 0.0;
        self.effective_window = 0;
    }

    fn fit_adaptive(&mut self) -> f64 {
        let available = self.samples.len();
        let min = self.order.min_samples();
        let mut best = 0.0;
        let mut used = 0;

        if available >= min {
            for len in min..=available {
                let window = self.samples.range(available - len..);
                let Some(fit) = Polynomial::fit(self.order, window.clone()) else {
                    break;
                };
                if len > min && !fit.fits_within(window, self.params.threshold) {
                    break;
                }
                best = fit.derivative();
                used = len;
            }
        }

        self.effective_window = used;
        best
    }
}

/// Polynomial in normalized time `u = (t - origin) / scale`, `u` in `[-1, 0]`.
#[derive(Debug, Clone, Copy)]
struct Polynomial {
    order: FitOrder,
    origin: f64,
    scale: f64,
    coeffs: [f64; 3],
}

impl Polynomial {
    fn fit<'a, I>(order: FitOrder, window: I) -> Option<Self>
    where
        I: Iterator<Item = &'a Sample> + Clone,
    {
        let oldest = window.clone().next()?.stamp;
        let newest = window.clone().last()?.stamp;
        let scale = newest - oldest;
        if scale.is_nan() || scale <= MIN_SPAN_S {
            return None;
        }
        let normalize = |stamp: f64| (stamp - newest) / scale;

        let coeffs = match order {
            FitOrder::Linear => {
                let (count, sum_u, sum_x) = window.clone().fold((0.0, 0.0, 0.0), |acc, s| {
                    (acc.0 + 1.0, acc.1 + normalize(s.stamp), acc.2 + s.value)
                });
                let mean_u = sum_u / count;
                let mean_x = sum_x / count;
                let (s_uu, s_ux) = window.fold((0.0, 0.0), |acc, s| {
                    let du = normalize(s.stamp) - mean_u;
                    (acc.0 + du * du, acc.1 + du * (s.value - mean_x))
                });
                if s_uu <= f64::EPSILON {
                    return None;
                }
                let slope = s_ux / s_uu;
                [mean_x - slope * mean_u, slope, 0.0]
            }
            FitOrder::Quadratic => {
                let mut normal = Matrix3::<f64>::zeros();
                let mut rhs = Vector3::<f64>::zeros();
                for s in window {
                    let u = normalize(s.stamp);
                    let basis = Vector3::new(1.0, u, u * u);
                    normal += basis * basis.transpose();
                    rhs += basis * s.value;
                }
                let c = normal.lu().solve(&rhs)?;
                [c.x, c.y, c.z]
            }
        };

        if coeffs.iter().all(|c| c.is_finite()) {
            Some(Self {
                order,
                origin: newest,
                scale,
                coeffs,
            })
        } else {
            None
        }
    }

    fn eval(&self, stamp: f64) -> f64 {
        let u = (stamp - self.origin) / self.scale;
        let [c0, c1, c2] = self.coeffs;
        c0 + u * (c1 + u * c2)
    }

    fn derivative(&self) -> f64 {
        let [_, c1, c2] = self.coeffs;
        match self.order {
            FitOrder::Linear => c1 / self.scale,
            FitOrder::Quadratic => 2.0 * c2 / (self.scale * self.scale),
        }
    }

    fn fits_within<'a, I>(&self, mut window: I, threshold: f64) -> bool
    where
        I: Iterator<Item = &'a Sample>,
    {
        window.all(|s| (s.value - self.eval(s.stamp)).abs() <= threshold)
    }
}
