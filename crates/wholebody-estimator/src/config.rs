//! Estimator configuration.
//!
//! Every field has a default, so an empty YAML document is a valid
//! configuration. Coupling matrices are given row-major, one row per motor
//! and one column per joint.

use serde::{Deserialize, Serialize};
use wholebody_errors::ConfigError;
use wholebody_filters::AdaptiveWindowParams;
use wholebody_kinematics::CouplingTransform;
use wholebody_scheduler::period_from_ms;

/// Default estimation period in milliseconds.
pub const DEFAULT_PERIOD_MS: f64 = 10.0;

/// Default cutoff of the torque and PWM low-pass filters, in Hz.
pub const DEFAULT_CUTOFF_HZ: f64 = 3.0;

/// Joint/motor coupling matrices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingConfig {
    /// Number of motors (rows of both matrices)
    pub motors: usize,
    /// Position/velocity/acceleration coupling, `motors` rows
    pub kinematic: Vec<Vec<f64>>,
    /// Torque coupling, `motors` rows
    pub torque: Vec<Vec<f64>>,
}

impl CouplingConfig {
    /// Build the transform for `joints` joints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::CouplingShape`] if either matrix does not have
    /// `motors` rows of `joints` entries.
    pub fn to_transform(&self, joints: usize) -> Result<CouplingTransform, ConfigError> {
        for (matrix, rows) in [("kinematic", &self.kinematic), ("torque", &self.torque)] {
            if rows.len() != self.motors {
                return Err(ConfigError::CouplingShape {
                    matrix,
                    rows: rows.len(),
                    cols: rows.first().map_or(0, Vec::len),
                    expected_rows: self.motors,
                    expected_cols: joints,
                });
            }
        }
        CouplingTransform::from_rows(joints, &self.kinematic, &self.torque)
    }
}

/// Configuration of a whole-body estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Estimation period in milliseconds (minimum 1 ms)
    pub period_ms: f64,
    /// Use device-computed joint velocity and acceleration when available
    pub read_speed_acc_from_device: bool,
    /// Estimate the floating-base pose and twist
    pub estimate_base: bool,
    /// Link that defines the world frame; the root link when unset
    pub world_reference_link: Option<String>,
    /// Estimate motor-space quantities through the coupling
    pub motor_estimation: bool,
    /// Coupling matrices; identity when unset
    pub coupling: Option<CouplingConfig>,
    /// Joint velocity differentiator
    pub velocity: AdaptiveWindowParams,
    /// Joint acceleration differentiator
    pub acceleration: AdaptiveWindowParams,
    /// Joint torque differentiator
    pub joint_torque_derivative: AdaptiveWindowParams,
    /// Motor torque differentiator
    pub motor_torque_derivative: AdaptiveWindowParams,
    /// Joint torque low-pass cutoff (Hz)
    pub joint_torque_cutoff_hz: f64,
    /// Motor torque low-pass cutoff (Hz)
    pub motor_torque_cutoff_hz: f64,
    /// PWM low-pass cutoff (Hz)
    pub pwm_cutoff_hz: f64,
    /// Offset removed from raw PWM before filtering, one entry per motor
    pub pwm_baseline: Option<Vec<f64>>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            period_ms: DEFAULT_PERIOD_MS,
            read_speed_acc_from_device: false,
            estimate_base: false,
            world_reference_link: None,
            motor_estimation: false,
            coupling: None,
            velocity: AdaptiveWindowParams::new(16, 1.0),
            acceleration: AdaptiveWindowParams::new(25, 1.0),
            joint_torque_derivative: AdaptiveWindowParams::new(16, 0.2),
            motor_torque_derivative: AdaptiveWindowParams::new(16, 0.2),
            joint_torque_cutoff_hz: DEFAULT_CUTOFF_HZ,
            motor_torque_cutoff_hz: DEFAULT_CUTOFF_HZ,
            pwm_cutoff_hz: DEFAULT_CUTOFF_HZ,
            pwm_baseline: None,
        }
    }
}

impl EstimatorConfig {
    /// Create a builder starting from the defaults.
    #[must_use]
    pub fn builder() -> EstimatorConfigBuilder {
        EstimatorConfigBuilder::default()
    }

    /// Parse a YAML document and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed YAML and any
    /// [`validate`](Self::validate) error.
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if serialization fails.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate the configuration.
    ///
    /// Dimension checks that depend on the number of joints happen at init.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        period_from_ms(self.period_ms)?;

        self.velocity.validate()?;
        self.joint_torque_derivative.validate()?;
        self.motor_torque_derivative.validate()?;
        // The acceleration fit is quadratic and needs one more sample.
        self.acceleration.validate()?;
        if self.acceleration.window_length < 3 {
            return Err(ConfigError::invalid_parameter(
                "acceleration.window_length",
                self.acceleration.window_length,
            ));
        }

        for (name, hz) in [
            ("joint_torque_cutoff_hz", self.joint_torque_cutoff_hz),
            ("motor_torque_cutoff_hz", self.motor_torque_cutoff_hz),
            ("pwm_cutoff_hz", self.pwm_cutoff_hz),
        ] {
            if hz.is_nan() || hz <= 0.0 {
                return Err(ConfigError::invalid_parameter(name, hz));
            }
        }

        if let Some(coupling) = &self.coupling {
            if coupling.motors == 0 {
                return Err(ConfigError::invalid_parameter("coupling.motors", 0));
            }
        }
        if let Some(baseline) = &self.pwm_baseline {
            if baseline.iter().any(|v| !v.is_finite()) {
                return Err(ConfigError::invalid_parameter(
                    "pwm_baseline",
                    "non-finite entry",
                ));
            }
        }
        if let Some(link) = &self.world_reference_link {
            if link.is_empty() {
                return Err(ConfigError::invalid_parameter("world_reference_link", "empty"));
            }
        }
        Ok(())
    }

    /// Coupling for `joints` joints; identity unless motor estimation is
    /// enabled with explicit matrices.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::CouplingShape`] if the matrices do not fit.
    pub fn coupling_for(&self, joints: usize) -> Result<CouplingTransform, ConfigError> {
        match (&self.coupling, self.motor_estimation) {
            (Some(coupling), true) => coupling.to_transform(joints),
            _ => Ok(CouplingTransform::identity(joints)),
        }
    }
}

/// Builder for [`EstimatorConfig`].
#[derive(Debug, Clone, Default)]
pub struct EstimatorConfigBuilder {
    config: EstimatorConfig,
}

impl EstimatorConfigBuilder {
    /// Set the estimation period in milliseconds.
    #[must_use]
    pub fn period_ms(mut self, period_ms: f64) -> Self {
        self.config.period_ms = period_ms;
        self
    }

    /// Trust device-computed joint velocity and acceleration.
    #[must_use]
    pub fn read_speed_acc_from_device(mut self, enabled: bool) -> Self {
        self.config.read_speed_acc_from_device = enabled;
        self
    }

    /// Enable floating-base estimation.
    #[must_use]
    pub fn estimate_base(mut self, enabled: bool) -> Self {
        self.config.estimate_base = enabled;
        self
    }

    /// Set the world reference link.
    #[must_use]
    pub fn world_reference_link(mut self, link: impl Into<String>) -> Self {
        self.config.world_reference_link = Some(link.into());
        self
    }

    /// Enable motor-space estimation.
    #[must_use]
    pub fn motor_estimation(mut self, enabled: bool) -> Self {
        self.config.motor_estimation = enabled;
        self
    }

    /// Set the coupling matrices.
    #[must_use]
    pub fn coupling(mut self, coupling: CouplingConfig) -> Self {
        self.config.coupling = Some(coupling);
        self
    }

    /// Set the joint velocity differentiator parameters.
    #[must_use]
    pub fn velocity(mut self, params: AdaptiveWindowParams) -> Self {
        self.config.velocity = params;
        self
    }

    /// Set the joint acceleration differentiator parameters.
    #[must_use]
    pub fn acceleration(mut self, params: AdaptiveWindowParams) -> Self {
        self.config.acceleration = params;
        self
    }

    /// Set the joint torque differentiator parameters.
    #[must_use]
    pub fn joint_torque_derivative(mut self, params: AdaptiveWindowParams) -> Self {
        self.config.joint_torque_derivative = params;
        self
    }

    /// Set the motor torque differentiator parameters.
    #[must_use]
    pub fn motor_torque_derivative(mut self, params: AdaptiveWindowParams) -> Self {
        self.config.motor_torque_derivative = params;
        self
    }

    /// Set the joint torque cutoff frequency.
    #[must_use]
    pub fn joint_torque_cutoff_hz(mut self, hz: f64) -> Self {
        self.config.joint_torque_cutoff_hz = hz;
        self
    }

    /// Set the motor torque cutoff frequency.
    #[must_use]
    pub fn motor_torque_cutoff_hz(mut self, hz: f64) -> Self {
        self.config.motor_torque_cutoff_hz = hz;
        self
    }

    /// Set the PWM cutoff frequency.
    #[must_use]
    pub fn pwm_cutoff_hz(mut self, hz: f64) -> Self {
        self.config.pwm_cutoff_hz = hz;
        self
    }

    /// Set the PWM baseline.
    #[must_use]
    pub fn pwm_baseline(mut self, baseline: Vec<f64>) -> Self {
        self.config.pwm_baseline = Some(baseline);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns any [`EstimatorConfig::validate`] error.
    pub fn build(self) -> Result<EstimatorConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_defaults_are_valid() -> TestResult {
        let config = EstimatorConfig::default();
        config.validate()?;
        assert_eq!(config.velocity.window_length, 16);
        assert_eq!(config.acceleration.window_length, 25);
        assert!((config.period_ms - 10.0).abs() < f64::EPSILON);
        assert!(!config.estimate_base);
        Ok(())
    }

    #[test]
    fn test_builder_validates() {
        assert!(EstimatorConfig::builder().period_ms(0.5).build().is_err());
        assert!(
            EstimatorConfig::builder()
                .pwm_cutoff_hz(0.0)
                .build()
                .is_err()
        );
        assert!(
            EstimatorConfig::builder()
                .acceleration(AdaptiveWindowParams::new(2, 1.0))
                .build()
                .is_err()
        );
        assert!(
            EstimatorConfig::builder()
                .world_reference_link("")
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_builder_sets_fields() -> TestResult {
        let config = EstimatorConfig::builder()
            .period_ms(5.0)
            .estimate_base(true)
            .world_reference_link("l_sole")
            .joint_torque_cutoff_hz(10.0)
            .build()?;
        assert!(config.estimate_base);
        assert_eq!(config.world_reference_link.as_deref(), Some("l_sole"));
        assert!((config.joint_torque_cutoff_hz - 10.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn test_empty_yaml_is_default() -> TestResult {
        let config = EstimatorConfig::from_yaml_str("{}")?;
        assert_eq!(config, EstimatorConfig::default());
        Ok(())
    }

    #[test]
    fn test_yaml_round_trip() -> TestResult {
        let config = EstimatorConfig::builder()
            .motor_estimation(true)
            .coupling(CouplingConfig {
                motors: 2,
                kinematic: vec![vec![1.0, 0.0], vec![1.0, -1.0]],
                torque: vec![vec![1.0, 1.0], vec![0.0, -1.0]],
            })
            .build()?;
        let yaml = config.to_yaml_string()?;
        assert_eq!(EstimatorConfig::from_yaml_str(&yaml)?, config);
        Ok(())
    }

    #[test]
    fn test_yaml_errors() {
        assert!(matches!(
            EstimatorConfig::from_yaml_str("period_ms: [1, 2"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EstimatorConfig::from_yaml_str("period_ms: 0.1"),
            Err(ConfigError::PeriodTooShort { .. })
        ));
    }

    #[test]
    fn test_coupling_for() -> TestResult {
        let coupling = CouplingConfig {
            motors: 3,
            kinematic: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            torque: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        };
        let disabled = EstimatorConfig {
            coupling: Some(coupling.clone()),
            ..EstimatorConfig::default()
        };
        assert!(disabled.coupling_for(2)?.is_identity());

        let enabled = EstimatorConfig {
            motor_estimation: true,
            coupling: Some(coupling),
            ..EstimatorConfig::default()
        };
        assert!(matches!(
            enabled.coupling_for(2),
            Err(ConfigError::CouplingShape { expected_rows: 3, .. })
        ));
        Ok(())
    }
}
