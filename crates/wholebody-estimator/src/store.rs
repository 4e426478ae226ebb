//! Published estimates.
//!
//! The worker fills a private [`EstimateSnapshot`], copies it into a spare
//! buffer outside any lock, then swaps the spare with the published one
//! under the store mutex. Readers copy out of the published snapshot under
//! the same mutex, so a read sees one whole cycle or the next, never a mix.

use parking_lot::Mutex;
use wholebody_errors::ConfigError;
use wholebody_kinematics::{SerializedFrame, Twist};

use crate::estimate::EstimateType;

/// Latest estimates of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimateSnapshot {
    /// Cycle that produced the snapshot; 0 before the first publish
    pub cycle: u64,
    /// Seconds since the worker started
    pub stamp: f64,
    /// Joint positions
    pub joint_position: Vec<f64>,
    /// Joint velocities
    pub joint_velocity: Vec<f64>,
    /// Joint accelerations
    pub joint_acceleration: Vec<f64>,
    /// Filtered joint torques
    pub joint_torque: Vec<f64>,
    /// Joint torque derivatives
    pub joint_torque_derivative: Vec<f64>,
    /// Motor positions
    pub motor_position: Vec<f64>,
    /// Motor velocities
    pub motor_velocity: Vec<f64>,
    /// Motor accelerations
    pub motor_acceleration: Vec<f64>,
    /// Filtered motor torques
    pub motor_torque: Vec<f64>,
    /// Motor torque derivatives
    pub motor_torque_derivative: Vec<f64>,
    /// Filtered PWM
    pub motor_pwm: Vec<f64>,
    /// Raw PWM of the last reading
    pub last_pwm_buffer: Vec<f64>,
    /// Root link pose, row-major
    pub base_pose: SerializedFrame,
    /// Root link twist
    pub base_velocity: Twist,
}

impl EstimateSnapshot {
    /// All-zero snapshot for `joints` joints and `motors` motors.
    #[must_use]
    pub fn new(joints: usize, motors: usize) -> Self {
        Self {
            cycle: 0,
            stamp: 0.0,
            joint_position: vec![0.0; joints],
            joint_velocity: vec![0.0; joints],
            joint_acceleration: vec![0.0; joints],
            joint_torque: vec![0.0; joints],
            joint_torque_derivative: vec![0.0; joints],
            motor_position: vec![0.0; motors],
            motor_velocity: vec![0.0; motors],
            motor_acceleration: vec![0.0; motors],
            motor_torque: vec![0.0; motors],
            motor_torque_derivative: vec![0.0; motors],
            motor_pwm: vec![0.0; motors],
            last_pwm_buffer: vec![0.0; motors],
            base_pose: [0.0; 16],
            base_velocity: [0.0; 6],
        }
    }

    /// Number of joints.
    #[must_use]
    pub fn joints(&self) -> usize {
        self.joint_position.len()
    }

    /// Number of motors.
    #[must_use]
    pub fn motors(&self) -> usize {
        self.motor_position.len()
    }

    /// Values of one estimate type.
    #[must_use]
    pub fn values(&self, estimate: EstimateType) -> &[f64] {
        match estimate {
            EstimateType::JointPosition => &self.joint_position,
            EstimateType::JointVelocity => &self.joint_velocity,
            EstimateType::JointAcceleration => &self.joint_acceleration,
            EstimateType::JointTorque => &self.joint_torque,
            EstimateType::JointTorqueDerivative => &self.joint_torque_derivative,
            EstimateType::MotorPosition => &self.motor_position,
            EstimateType::MotorVelocity => &self.motor_velocity,
            EstimateType::MotorAcceleration => &self.motor_acceleration,
            EstimateType::MotorTorque => &self.motor_torque,
            EstimateType::MotorTorqueDerivative => &self.motor_torque_derivative,
            EstimateType::MotorPwm => &self.motor_pwm,
            EstimateType::MotorPwmRaw => &self.last_pwm_buffer,
            EstimateType::BasePose => &self.base_pose,
            EstimateType::BaseVelocity => &self.base_velocity,
        }
    }

    /// Overwrite with `source`, reusing the existing allocations.
    pub fn copy_from(&mut self, source: &Self) {
        self.cycle = source.cycle;
        self.stamp = source.stamp;
        self.joint_position.clone_from(&source.joint_position);
        self.joint_velocity.clone_from(&source.joint_velocity);
        self.joint_acceleration.clone_from(&source.joint_acceleration);
        self.joint_torque.clone_from(&source.joint_torque);
        self.joint_torque_derivative.clone_from(&source.joint_torque_derivative);
        self.motor_position.clone_from(&source.motor_position);
        self.motor_velocity.clone_from(&source.motor_velocity);
        self.motor_acceleration.clone_from(&source.motor_acceleration);
        self.motor_torque.clone_from(&source.motor_torque);
        self.motor_torque_derivative.clone_from(&source.motor_torque_derivative);
        self.motor_pwm.clone_from(&source.motor_pwm);
        self.last_pwm_buffer.clone_from(&source.last_pwm_buffer);
        self.base_pose = source.base_pose;
        self.base_velocity = source.base_velocity;
    }

    /// Zero every value and give each space its new dimension.
    pub fn resize(&mut self, joints: usize, motors: usize) {
        *self = Self::new(joints, motors);
    }
}

/// Mutex-guarded published snapshot.
#[derive(Debug)]
pub struct EstimateStore {
    published: Mutex<EstimateSnapshot>,
}

impl EstimateStore {
    /// Store holding an all-zero snapshot.
    #[must_use]
    pub fn new(joints: usize, motors: usize) -> Self {
        Self {
            published: Mutex::new(EstimateSnapshot::new(joints, motors)),
        }
    }

    /// Swap `next` in as the published snapshot.
    ///
    /// On return `next` holds the previously published snapshot, ready to be
    /// overwritten by the following cycle.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DimensionMismatch`] if `next` was sized for a
    /// different number of joints or motors; nothing is published then.
    pub fn publish(&self, next: &mut EstimateSnapshot) -> Result<(), ConfigError> {
        let mut published = self.published.lock();
        if next.joints() != published.joints() {
            return Err(ConfigError::dimension_mismatch(
                "snapshot joints",
                published.joints(),
                next.joints(),
            ));
        }
        if next.motors() != published.motors() {
            return Err(ConfigError::dimension_mismatch(
                "snapshot motors",
                published.motors(),
                next.motors(),
            ));
        }
        std::mem::swap(&mut *published, next);
        Ok(())
    }

    /// Replace the published snapshot with a zeroed one of new dimensions.
    pub fn resize(&self, joints: usize, motors: usize) {
        let fresh = EstimateSnapshot::new(joints, motors);
        let stale = std::mem::replace(&mut *self.published.lock(), fresh);
        drop(stale);
    }

    /// Copy every value of `estimate` into `dest`, reusing its capacity.
    pub fn copy_vector(&self, estimate: EstimateType, dest: &mut Vec<f64>) {
        let published = self.published.lock();
        dest.clear();
        dest.extend_from_slice(published.values(estimate));
    }

    /// Copy one value of `estimate`.
    #[must_use]
    pub fn copy_element(&self, estimate: EstimateType, index: usize) -> Option<f64> {
        self.published.lock().values(estimate).get(index).copied()
    }

    /// Copy the values of `estimate` at `indices`, in order.
    ///
    /// Returns `None` without touching `dest` if any index is out of range.
    pub fn copy_selection(
        &self,
        estimate: EstimateType,
        indices: &[usize],
        dest: &mut Vec<f64>,
    ) -> Option<()> {
        let published = self.published.lock();
        let values = published.values(estimate);
        if indices.iter().any(|&i| i >= values.len()) {
            return None;
        }
        dest.clear();
        dest.extend(indices.iter().filter_map(|&i| values.get(i).copied()));
        Some(())
    }

    /// Clone the whole published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> EstimateSnapshot {
        self.published.lock().clone()
    }

    /// Dimension of `estimate` in the published snapshot.
    #[must_use]
    pub fn len(&self, estimate: EstimateType) -> usize {
        self.published.lock().values(estimate).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_new_is_sized_per_space() {
        let snapshot = EstimateSnapshot::new(3, 2);
        for estimate in EstimateType::ALL {
            let expected = match estimate {
                EstimateType::BasePose => 16,
                EstimateType::BaseVelocity => 6,
                e if e.name().starts_with("joint") => 3,
                _ => 2,
            };
            assert_eq!(snapshot.values(estimate).len(), expected, "{estimate}");
        }
    }

    #[test]
    fn test_publish_swaps() -> TestResult {
        let store = EstimateStore::new(2, 2);
        let mut next = EstimateSnapshot::new(2, 2);
        next.cycle = 7;
        next.joint_velocity[1] = 4.0;
        store.publish(&mut next)?;

        assert_eq!(next.cycle, 0);
        assert_eq!(store.snapshot().cycle, 7);
        let v = store.copy_element(EstimateType::JointVelocity, 1).ok_or("missing")?;
        assert!((v - 4.0).abs() < f64::EPSILON);
        assert_eq!(store.copy_element(EstimateType::JointVelocity, 2), None);
        Ok(())
    }

    #[test]
    fn test_copy_from_matches_source() {
        let mut source = EstimateSnapshot::new(2, 3);
        source.cycle = 3;
        source.motor_acceleration[2] = -1.0;
        source.base_pose[15] = 1.0;
        let mut copy = EstimateSnapshot::new(2, 3);
        copy.copy_from(&source);
        assert_eq!(copy, source);
    }

    #[test]
    fn test_publish_rejects_wrong_size() {
        let store = EstimateStore::new(2, 2);
        let mut next = EstimateSnapshot::new(3, 2);
        assert!(store.publish(&mut next).is_err());
        assert_eq!(store.snapshot().joints(), 2);
    }

    #[test]
    fn test_copy_vector_and_selection() -> TestResult {
        let store = EstimateStore::new(3, 3);
        let mut next = EstimateSnapshot::new(3, 3);
        next.motor_pwm = vec![0.1, 0.2, 0.3];
        store.publish(&mut next)?;

        let mut out = vec![9.0; 8];
        store.copy_vector(EstimateType::MotorPwm, &mut out);
        assert_eq!(out.len(), 3);

        store
            .copy_selection(EstimateType::MotorPwm, &[2, 0], &mut out)
            .ok_or("selection")?;
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.3).abs() < f64::EPSILON);
        assert!(store.copy_selection(EstimateType::MotorPwm, &[3], &mut out).is_none());
        Ok(())
    }

    #[test]
    fn test_resize_zeroes() -> TestResult {
        let store = EstimateStore::new(2, 2);
        let mut next = EstimateSnapshot::new(2, 2);
        next.joint_position = vec![1.0, 2.0];
        store.publish(&mut next)?;

        store.resize(4, 1);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.joints(), 4);
        assert_eq!(snapshot.motors(), 1);
        assert!(snapshot.joint_position.iter().all(|v| v.abs() < f64::EPSILON));
        Ok(())
    }
}
