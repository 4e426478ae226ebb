//! Estimate types and runtime parameter updates.

use std::fmt;

use serde::{Deserialize, Serialize};
use wholebody_errors::{ConfigError, QueryError};
use wholebody_filters::AdaptiveWindowParams;

/// Vector space an estimate lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EstimateSpace {
    /// One value per joint
    Joint,
    /// One value per motor
    Motor,
    /// Fixed-size floating-base quantity
    Base,
}

/// Quantity produced by the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateType {
    /// Joint position as read from the sensors
    JointPosition,
    /// Joint velocity
    JointVelocity,
    /// Joint acceleration
    JointAcceleration,
    /// Low-pass filtered joint torque
    JointTorque,
    /// Joint torque derivative
    JointTorqueDerivative,
    /// Motor position, coupled from joint position
    MotorPosition,
    /// Motor velocity
    MotorVelocity,
    /// Motor acceleration
    MotorAcceleration,
    /// Low-pass filtered motor torque
    MotorTorque,
    /// Motor torque derivative
    MotorTorqueDerivative,
    /// Low-pass filtered PWM, baseline removed
    MotorPwm,
    /// Latest raw PWM reading
    MotorPwmRaw,
    /// Root link pose, row-major 4×4
    BasePose,
    /// Root link twist, linear then angular
    BaseVelocity,
}

impl EstimateType {
    /// Every estimate type, in declaration order.
    pub const ALL: [EstimateType; 14] = [
        EstimateType::JointPosition,
        EstimateType::JointVelocity,
        EstimateType::JointAcceleration,
        EstimateType::JointTorque,
        EstimateType::JointTorqueDerivative,
        EstimateType::MotorPosition,
        EstimateType::MotorVelocity,
        EstimateType::MotorAcceleration,
        EstimateType::MotorTorque,
        EstimateType::MotorTorqueDerivative,
        EstimateType::MotorPwm,
        EstimateType::MotorPwmRaw,
        EstimateType::BasePose,
        EstimateType::BaseVelocity,
    ];

    /// Stable snake-case name, used in logs and errors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            EstimateType::JointPosition => "joint_position",
            EstimateType::JointVelocity => "joint_velocity",
            EstimateType::JointAcceleration => "joint_acceleration",
            EstimateType::JointTorque => "joint_torque",
            EstimateType::JointTorqueDerivative => "joint_torque_derivative",
            EstimateType::MotorPosition => "motor_position",
            EstimateType::MotorVelocity => "motor_velocity",
            EstimateType::MotorAcceleration => "motor_acceleration",
            EstimateType::MotorTorque => "motor_torque",
            EstimateType::MotorTorqueDerivative => "motor_torque_derivative",
            EstimateType::MotorPwm => "motor_pwm",
            EstimateType::MotorPwmRaw => "motor_pwm_raw",
            EstimateType::BasePose => "base_pose",
            EstimateType::BaseVelocity => "base_velocity",
        }
    }

    /// Space the estimate lives in.
    #[must_use]
    pub const fn space(self) -> EstimateSpace {
        match self {
            EstimateType::JointPosition
            | EstimateType::JointVelocity
            | EstimateType::JointAcceleration
            | EstimateType::JointTorque
            | EstimateType::JointTorqueDerivative => EstimateSpace::Joint,
            EstimateType::MotorPosition
            | EstimateType::MotorVelocity
            | EstimateType::MotorAcceleration
            | EstimateType::MotorTorque
            | EstimateType::MotorTorqueDerivative
            | EstimateType::MotorPwm
            | EstimateType::MotorPwmRaw => EstimateSpace::Motor,
            EstimateType::BasePose | EstimateType::BaseVelocity => EstimateSpace::Base,
        }
    }

    /// Whether the value is a direct image of a sensor reading.
    ///
    /// Blocking queries of these refresh the sensor before answering;
    /// everything else is served from the last published snapshot.
    #[must_use]
    pub const fn is_raw(self) -> bool {
        matches!(
            self,
            EstimateType::JointPosition | EstimateType::MotorPosition | EstimateType::MotorPwmRaw
        )
    }
}

impl fmt::Display for EstimateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tunable filter parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationParameter {
    /// Adaptive-window maximum window length, in samples
    WindowLength,
    /// Adaptive-window residual threshold
    Threshold,
    /// Low-pass cutoff frequency, in Hz
    CutFrequency,
}

/// Which filter bank a parameter update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterTarget {
    /// Joint velocity differentiator
    Velocity,
    /// Joint acceleration differentiator
    Acceleration,
    /// Joint torque differentiator
    JointTorqueDerivative,
    /// Motor torque differentiator
    MotorTorqueDerivative,
    /// Joint torque low-pass
    JointTorque,
    /// Motor torque low-pass
    MotorTorque,
    /// PWM low-pass
    Pwm,
}

impl FilterTarget {
    /// Map an estimate type and parameter to the filter that owns it.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Unsupported`] if `estimate` has no tunable
    /// `parameter`.
    pub fn resolve(
        estimate: EstimateType,
        parameter: EstimationParameter,
    ) -> Result<Self, QueryError> {
        use EstimationParameter::{CutFrequency, Threshold, WindowLength};
        match (estimate, parameter) {
            (EstimateType::JointVelocity, WindowLength | Threshold) => Ok(Self::Velocity),
            (EstimateType::JointAcceleration, WindowLength | Threshold) => Ok(Self::Acceleration),
            (EstimateType::JointTorqueDerivative, WindowLength | Threshold) => {
                Ok(Self::JointTorqueDerivative)
            }
            (EstimateType::MotorTorqueDerivative, WindowLength | Threshold) => {
                Ok(Self::MotorTorqueDerivative)
            }
            (EstimateType::JointTorque, CutFrequency) => Ok(Self::JointTorque),
            (EstimateType::MotorTorque, CutFrequency) => Ok(Self::MotorTorque),
            (EstimateType::MotorPwm, CutFrequency) => Ok(Self::Pwm),
            _ => Err(QueryError::Unsupported(estimate.name())),
        }
    }

    /// Whether the target is an adaptive-window bank.
    #[must_use]
    pub const fn is_adaptive_window(self) -> bool {
        matches!(
            self,
            Self::Velocity
                | Self::Acceleration
                | Self::JointTorqueDerivative
                | Self::MotorTorqueDerivative
        )
    }
}

/// New value for one filter parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue {
    /// Adaptive-window window length and threshold together
    Window(AdaptiveWindowParams),
    /// Low-pass cutoff frequency in Hz
    CutFrequency(f64),
}

/// Parameter change applied by the worker between two cycles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterUpdate {
    /// Filter bank to change
    pub target: FilterTarget,
    /// New value
    pub value: ParameterValue,
}

impl ParameterUpdate {
    /// Validate the new value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] for invalid window
    /// parameters, a non-positive cutoff, or a value that does not fit the
    /// target.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (self.target.is_adaptive_window(), self.value) {
            (true, ParameterValue::Window(params)) => {
                params.validate()?;
                // The acceleration fit is quadratic.
                if self.target == FilterTarget::Acceleration && params.window_length < 3 {
                    return Err(ConfigError::invalid_parameter(
                        "acceleration.window_length",
                        params.window_length,
                    ));
                }
                Ok(())
            }
            (false, ParameterValue::CutFrequency(hz)) if hz > 0.0 => Ok(()),
            (false, ParameterValue::CutFrequency(hz)) => {
                Err(ConfigError::invalid_parameter("cut_frequency", hz))
            }
            (_, value) => Err(ConfigError::invalid_parameter(
                "parameter_update",
                format!("{value:?} does not apply to {:?}", self.target),
            )),
        }
    }
}
