//! Sensor boundary.
//!
//! The estimator does not talk to devices. It reads the latest samples from
//! a [`SensorProvider`], which also resolves channel names.
//! [`SharedSensorBuffer`] is an in-memory provider fed by the caller.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use wholebody_errors::{ConfigError, QueryError};

/// Physical quantity read from the sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorQuantity {
    /// Joint positions, one per joint
    JointPosition,
    /// Joint torques, one per joint
    JointTorque,
    /// Motor PWM duty, one per motor
    MotorPwm,
}

impl SensorQuantity {
    /// Stable name for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            SensorQuantity::JointPosition => "joint_position",
            SensorQuantity::JointTorque => "joint_torque",
            SensorQuantity::MotorPwm => "motor_pwm",
        }
    }
}

/// Source of raw joint samples.
///
/// Reads copy the latest sample of every channel into `out` and return the
/// sample timestamp in seconds. `out` must have one entry per joint, or per
/// motor for [`SensorQuantity::MotorPwm`].
pub trait SensorProvider: Send + Sync + fmt::Debug {
    /// Number of joint channels.
    fn channel_count(&self) -> usize;

    /// Resolve a joint channel name.
    fn channel_id(&self, name: &str) -> Option<usize>;

    /// Name of a joint channel.
    fn channel_name(&self, channel: usize) -> Option<String>;

    /// Resolve a motor channel name. Motors share the joint names unless
    /// the provider says otherwise.
    fn motor_channel_id(&self, name: &str) -> Option<usize> {
        self.channel_id(name)
    }

    /// Read the latest sample of `quantity`.
    ///
    /// With `blocking` the provider should wait for a sample newer than the
    /// one it last delivered instead of returning what it already has.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::SensorRead`] if no sample is available or
    /// `out` has the wrong length.
    fn read(
        &self,
        quantity: SensorQuantity,
        out: &mut [f64],
        blocking: bool,
    ) -> Result<f64, QueryError>;

    /// Whether the device computes joint velocity and acceleration itself.
    fn supports_device_derivatives(&self) -> bool {
        false
    }

    /// Read device-computed joint velocity and acceleration.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Unsupported`] unless the provider supports it.
    fn read_device_derivatives(
        &self,
        _velocity: &mut [f64],
        _acceleration: &mut [f64],
    ) -> Result<f64, QueryError> {
        Err(QueryError::Unsupported("device_derivatives"))
    }
}

#[derive(Debug, Clone, Default)]
struct Reading {
    values: Vec<f64>,
    stamp: f64,
    sequence: u64,
}

impl Reading {
    fn zeroed(len: usize) -> Self {
        Self {
            values: vec![0.0; len],
            stamp: 0.0,
            sequence: 0,
        }
    }

    fn copy_into(&self, quantity: SensorQuantity, out: &mut [f64]) -> Result<f64, QueryError> {
        if self.sequence == 0 {
            return Err(QueryError::sensor_read(format!(
                "no {} sample yet",
                quantity.name()
            )));
        }
        if out.len() != self.values.len() {
            return Err(QueryError::sensor_read(format!(
                "{} has {} channels, buffer has {}",
                quantity.name(),
                self.values.len(),
                out.len()
            )));
        }
        out.copy_from_slice(&self.values);
        Ok(self.stamp)
    }
}

#[derive(Debug)]
struct BufferState {
    names: Vec<String>,
    motor_names: Vec<String>,
    position: Reading,
    torque: Reading,
    pwm: Reading,
    velocity: Option<Reading>,
    acceleration: Reading,
    failing: bool,
}

impl BufferState {
    fn reading(&self, quantity: SensorQuantity) -> &Reading {
        match quantity {
            SensorQuantity::JointPosition => &self.position,
            SensorQuantity::JointTorque => &self.torque,
            SensorQuantity::MotorPwm => &self.pwm,
        }
    }

    fn reading_mut(&mut self, quantity: SensorQuantity) -> &mut Reading {
        match quantity {
            SensorQuantity::JointPosition => &mut self.position,
            SensorQuantity::JointTorque => &mut self.torque,
            SensorQuantity::MotorPwm => &mut self.pwm,
        }
    }
}

/// In-memory sensor provider.
///
/// Producers push whole sample vectors; the estimator and blocking queries
/// read them back. A blocking read waits up to the configured timeout for a
/// newer sample and otherwise returns the latest one.
#[derive(Debug)]
pub struct SharedSensorBuffer {
    state: Mutex<BufferState>,
    fresh: Condvar,
    blocking_timeout: Duration,
}

impl SharedSensorBuffer {
    /// Default wait of a blocking read.
    pub const DEFAULT_BLOCKING_TIMEOUT: Duration = Duration::from_millis(50);

    /// Create a buffer with one channel per name. Motors share the joint
    /// names.
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let n = names.len();
        Self {
            state: Mutex::new(BufferState {
                motor_names: names.clone(),
                names,
                position: Reading::zeroed(n),
                torque: Reading::zeroed(n),
                pwm: Reading::zeroed(n),
                velocity: None,
                acceleration: Reading::zeroed(n),
                failing: false,
            }),
            fresh: Condvar::new(),
            blocking_timeout: Self::DEFAULT_BLOCKING_TIMEOUT,
        }
    }

    /// Use distinct motor names; PWM then has one entry per motor.
    #[must_use]
    pub fn with_motor_names<S: Into<String>>(self, names: impl IntoIterator<Item = S>) -> Self {
        {
            let mut state = self.state.lock();
            state.motor_names = names.into_iter().map(Into::into).collect();
            state.pwm = Reading::zeroed(state.motor_names.len());
        }
        self
    }

    /// Set how long a blocking read waits for a new sample.
    #[must_use]
    pub fn with_blocking_timeout(mut self, timeout: Duration) -> Self {
        self.blocking_timeout = timeout;
        self
    }

    /// Publish a sample vector.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DimensionMismatch`] if `values` does not have
    /// one entry per channel.
    pub fn push(
        &self,
        quantity: SensorQuantity,
        values: &[f64],
        stamp: f64,
    ) -> Result<(), ConfigError> {
        let mut state = self.state.lock();
        let reading = state.reading_mut(quantity);
        if values.len() != reading.values.len() {
            return Err(ConfigError::dimension_mismatch(
                quantity.name(),
                reading.values.len(),
                values.len(),
            ));
        }
        reading.values.copy_from_slice(values);
        reading.stamp = stamp;
        reading.sequence += 1;
        drop(state);
        self.fresh.notify_all();
        Ok(())
    }

    /// Publish device-computed velocity and acceleration. From then on the
    /// buffer reports device derivative support.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DimensionMismatch`] on wrong lengths.
    pub fn push_device_derivatives(
        &self,
        velocity: &[f64],
        acceleration: &[f64],
        stamp: f64,
    ) -> Result<(), ConfigError> {
        let mut state = self.state.lock();
        let n = state.names.len();
        if velocity.len() != n {
            return Err(ConfigError::dimension_mismatch("device velocity", n, velocity.len()));
        }
        if acceleration.len() != n {
            return Err(ConfigError::dimension_mismatch(
                "device acceleration",
                n,
                acceleration.len(),
            ));
        }
        let sequence = state.velocity.as_ref().map_or(0, |r| r.sequence) + 1;
        state.velocity = Some(Reading {
            values: velocity.to_vec(),
            stamp,
            sequence,
        });
        state.acceleration = Reading {
            values: acceleration.to_vec(),
            stamp,
            sequence,
        };
        Ok(())
    }

    /// Replace the channel set. All readings restart empty.
    pub fn set_channels<S: Into<String>>(&self, names: impl IntoIterator<Item = S>) {
        let mut state = self.state.lock();
        state.names = names.into_iter().map(Into::into).collect();
        state.motor_names = state.names.clone();
        let n = state.names.len();
        state.position = Reading::zeroed(n);
        state.torque = Reading::zeroed(n);
        state.pwm = Reading::zeroed(n);
        state.velocity = None;
        state.acceleration = Reading::zeroed(n);
    }

    /// Make every read fail until cleared, to simulate a device fault.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }
}

impl SensorProvider for SharedSensorBuffer {
    fn channel_count(&self) -> usize {
        self.state.lock().names.len()
    }

    fn channel_id(&self, name: &str) -> Option<usize> {
        self.state.lock().names.iter().position(|n| n == name)
    }

    fn channel_name(&self, channel: usize) -> Option<String> {
        self.state.lock().names.get(channel).cloned()
    }

    fn motor_channel_id(&self, name: &str) -> Option<usize> {
        self.state.lock().motor_names.iter().position(|n| n == name)
    }

    fn read(
        &self,
        quantity: SensorQuantity,
        out: &mut [f64],
        blocking: bool,
    ) -> Result<f64, QueryError> {
        let mut state = self.state.lock();
        if blocking {
            let seen = state.reading(quantity).sequence;
            let deadline = Instant::now() + self.blocking_timeout;
            while state.reading(quantity).sequence == seen {
                if self.fresh.wait_until(&mut state, deadline).timed_out() {
                    break;
                }
            }
        }
        if state.failing {
            return Err(QueryError::sensor_read(format!(
                "{} device fault",
                quantity.name()
            )));
        }
        state.reading(quantity).copy_into(quantity, out)
    }

    fn supports_device_derivatives(&self) -> bool {
        self.state.lock().velocity.is_some()
    }

    fn read_device_derivatives(
        &self,
        velocity: &mut [f64],
        acceleration: &mut [f64],
    ) -> Result<f64, QueryError> {
        let state = self.state.lock();
        if state.failing {
            return Err(QueryError::sensor_read("device derivatives fault"));
        }
        let reading = state
            .velocity
            .as_ref()
            .ok_or(QueryError::Unsupported("device_derivatives"))?;
        let stamp = reading.copy_into(SensorQuantity::JointPosition, velocity)?;
        state
            .acceleration
            .copy_into(SensorQuantity::JointPosition, acceleration)?;
        Ok(stamp)
    }
}
