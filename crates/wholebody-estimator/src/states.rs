//! Query facade over the estimator.
//!
//! [`WholeBodyStates`] owns the worker and exposes the latest snapshot,
//! subscription bookkeeping and runtime parameter changes. Queries take
//! `&self` and may come from any number of threads; lifecycle calls take
//! `&mut self`.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam::channel::{self, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};
use wholebody_errors::{ConfigError, LifecycleError, QueryError, Result};
use wholebody_filters::AdaptiveWindowParams;
use wholebody_kinematics::{CouplingTransform, KinematicModel};
use wholebody_scheduler::period_from_ms;

use crate::config::EstimatorConfig;
use crate::counters::{CycleCounters, CycleSnapshot};
use crate::cycle::EstimationCycle;
use crate::estimate::{
    EstimateSpace, EstimateType, EstimationParameter, FilterTarget, ParameterUpdate,
    ParameterValue,
};
use crate::registry::EstimateRegistry;
use crate::sensor::{SensorProvider, SensorQuantity};
use crate::store::{EstimateSnapshot, EstimateStore};
use crate::thread::EstimatorThread;

/// Capacity of the parameter update queue.
pub const UPDATE_QUEUE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Configuring,
    Running,
    Closed,
}

/// Whole-body state estimator with a snapshot query API.
///
/// ```no_run
/// use std::sync::Arc;
/// use wholebody_estimator::prelude::*;
///
/// # fn main() -> wholebody_errors::Result<()> {
/// let sensor = Arc::new(SharedSensorBuffer::new(["hip", "knee"]));
/// let mut states = WholeBodyStates::new(sensor.clone());
/// states.init()?;
/// states.add_estimate(EstimateType::JointVelocity, "knee")?;
///
/// sensor.push(SensorQuantity::JointPosition, &[0.1, 0.2], 0.01)?;
/// let knee_velocity = states.get_estimate(EstimateType::JointVelocity, 1, 0.0, false)?;
/// # let _ = knee_velocity;
/// states.close()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct WholeBodyStates {
    config: EstimatorConfig,
    sensor: Arc<dyn SensorProvider>,
    model: Option<Arc<dyn KinematicModel>>,
    store: Arc<EstimateStore>,
    counters: Arc<CycleCounters>,
    registry: RwLock<EstimateRegistry>,
    coupling: CouplingTransform,
    windows: Mutex<HashMap<FilterTarget, AdaptiveWindowParams>>,
    updates: Option<Sender<ParameterUpdate>>,
    worker: Option<EstimatorThread>,
    phase: Phase,
}

impl WholeBodyStates {
    /// Estimator over `sensor` with the default configuration.
    pub fn new(sensor: Arc<dyn SensorProvider>) -> Self {
        Self {
            config: EstimatorConfig::default(),
            sensor,
            model: None,
            store: Arc::new(EstimateStore::new(0, 0)),
            counters: Arc::new(CycleCounters::new()),
            registry: RwLock::new(EstimateRegistry::new()),
            coupling: CouplingTransform::identity(0),
            windows: Mutex::new(HashMap::new()),
            updates: None,
            worker: None,
            phase: Phase::Configuring,
        }
    }

    /// Kinematic model used for floating-base estimation.
    #[must_use]
    pub fn with_model(mut self, model: Arc<dyn KinematicModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Replace the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::AlreadyInitialized`] after `init`, or the
    /// validation error.
    pub fn set_config(&mut self, config: EstimatorConfig) -> Result<()> {
        if self.phase != Phase::Configuring {
            return Err(LifecycleError::AlreadyInitialized.into());
        }
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Start the periodic worker.
    ///
    /// # Errors
    ///
    /// Fails if already initialized or closed, or with the first
    /// configuration, sensor or kinematic error met while initializing.
    pub fn init(&mut self) -> Result<()> {
        match self.phase {
            Phase::Configuring => {}
            Phase::Running => return Err(LifecycleError::AlreadyInitialized.into()),
            Phase::Closed => return Err(LifecycleError::Released.into()),
        }
        let period = period_from_ms(self.config.period_ms)?;
        let coupling = self.config.coupling_for(self.sensor.channel_count())?;

        let (update_tx, update_rx) = channel::bounded(UPDATE_QUEUE);
        let cycle = EstimationCycle::new(
            self.config.clone(),
            Arc::clone(&self.sensor),
            self.model.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.counters),
        )
        .with_update_queue(update_rx);
        let worker = EstimatorThread::start(cycle, period)?;

        *self.windows.lock() = HashMap::from([
            (FilterTarget::Velocity, self.config.velocity),
            (FilterTarget::Acceleration, self.config.acceleration),
            (
                FilterTarget::JointTorqueDerivative,
                self.config.joint_torque_derivative,
            ),
            (
                FilterTarget::MotorTorqueDerivative,
                self.config.motor_torque_derivative,
            ),
        ]);
        self.coupling = coupling;
        self.updates = Some(update_tx);
        self.worker = Some(worker);
        self.phase = Phase::Running;
        info!(
            joints = self.coupling.joints(),
            motors = self.coupling.motors(),
            period_ms = self.config.period_ms,
            "whole-body estimator started"
        );
        Ok(())
    }

    fn worker(&self) -> Result<&EstimatorThread> {
        match (self.phase, self.worker.as_ref()) {
            (Phase::Running, Some(worker)) => Ok(worker),
            (Phase::Closed, _) => Err(LifecycleError::Released.into()),
            _ => Err(LifecycleError::NotInitialized.into()),
        }
    }

    /// Suspend the periodic cycle. Queries keep serving the last snapshot.
    ///
    /// # Errors
    ///
    /// Fails unless running.
    pub fn pause(&self) -> Result<()> {
        self.worker()?.pause();
        Ok(())
    }

    /// Resume the periodic cycle.
    ///
    /// # Errors
    ///
    /// Fails unless running.
    pub fn resume(&self) -> Result<()> {
        self.worker()?.resume();
        Ok(())
    }

    /// Whether the worker is alive and not paused.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| w.is_running() && !w.is_paused())
    }

    /// Stop the worker. The last snapshot stays readable. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Worker`] if the worker panicked.
    pub fn close(&mut self) -> Result<()> {
        self.updates = None;
        self.phase = Phase::Closed;
        if let Some(mut worker) = self.worker.take() {
            worker.stop()?;
            info!("whole-body estimator closed");
        }
        Ok(())
    }

    /// Resize to `joints` joints. The worker must be paused.
    ///
    /// Every estimate restarts from zero; subscriptions to channels that no
    /// longer exist are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::WorkerRunning`] unless paused, or the
    /// resize error; nothing changes on error.
    pub fn change_dof(&mut self, joints: usize) -> Result<()> {
        let coupling = self.config.coupling_for(joints)?;
        self.worker()?.change_dof(joints)?;
        let dropped = self
            .registry
            .write()
            .retain_within(coupling.joints(), coupling.motors());
        if dropped > 0 {
            info!(dropped, "subscriptions dropped by resize");
        }
        self.coupling = coupling;
        Ok(())
    }

    /// Latest value of one channel.
    ///
    /// `time` is accepted for interface compatibility and ignored: the
    /// latest snapshot is always served. With `blocking`, raw quantities
    /// are read fresh from the sensor first.
    ///
    /// # Errors
    ///
    /// - [`QueryError::UnknownChannel`] if `channel` is not subscribed
    /// - [`QueryError::Unsupported`] for base quantities, which are only
    ///   available as whole vectors
    /// - [`QueryError::SensorRead`] if a blocking read fails
    pub fn get_estimate(
        &self,
        estimate: EstimateType,
        channel: usize,
        _time: f64,
        blocking: bool,
    ) -> Result<f64> {
        self.ensure_started()?;
        if estimate.space() == EstimateSpace::Base {
            return Err(QueryError::Unsupported(estimate.name()).into());
        }
        if !self.registry.read().contains_channel(estimate, channel) {
            return Err(QueryError::unknown_channel(estimate.name(), channel).into());
        }

        if blocking && estimate.is_raw() {
            let values = self.read_raw(estimate)?;
            return values
                .get(channel)
                .copied()
                .ok_or_else(|| QueryError::unknown_channel(estimate.name(), channel).into());
        }
        self.store
            .copy_element(estimate, channel)
            .ok_or_else(|| QueryError::unknown_channel(estimate.name(), channel).into())
    }

    /// Latest values of every subscribed channel, in subscription order.
    ///
    /// Base quantities return the whole pose (16 values, row-major) or
    /// twist (6 values) once subscribed under any name, and nothing
    /// otherwise. `time` is ignored as in [`get_estimate`](Self::get_estimate).
    ///
    /// # Errors
    ///
    /// Fails before `init`, if a blocking read fails, or if a subscription
    /// no longer fits the snapshot.
    pub fn get_estimates(
        &self,
        estimate: EstimateType,
        _time: f64,
        blocking: bool,
    ) -> Result<Vec<f64>> {
        self.ensure_started()?;
        let channels: Vec<usize> = self.registry.read().channels(estimate).collect();
        let mut out = Vec::with_capacity(channels.len());

        if estimate.space() == EstimateSpace::Base {
            if !channels.is_empty() {
                self.store.copy_vector(estimate, &mut out);
            }
            return Ok(out);
        }

        if blocking && estimate.is_raw() {
            let values = self.read_raw(estimate)?;
            for &channel in &channels {
                let value = values
                    .get(channel)
                    .ok_or_else(|| QueryError::unknown_channel(estimate.name(), channel))?;
                out.push(*value);
            }
            return Ok(out);
        }

        self.store
            .copy_selection(estimate, &channels, &mut out)
            .ok_or_else(|| {
                let channel = channels.iter().copied().max().unwrap_or_default();
                QueryError::unknown_channel(estimate.name(), channel)
            })?;
        Ok(out)
    }

    /// Fresh sensor read of a raw quantity, done outside the store lock.
    ///
    /// Motor position is read fresh only when motor estimation is enabled,
    /// so both query paths agree on what the quantity holds.
    fn read_raw(&self, estimate: EstimateType) -> Result<Vec<f64>> {
        let joints = self.coupling.joints();
        let motors = self.coupling.motors();
        match estimate {
            EstimateType::JointPosition => {
                let mut position = vec![0.0; joints];
                self.sensor
                    .read(SensorQuantity::JointPosition, &mut position, true)?;
                Ok(position)
            }
            EstimateType::MotorPosition if !self.config.motor_estimation => {
                // The cycle never fills motor space; serve what it published.
                let mut motor = Vec::with_capacity(motors);
                self.store.copy_vector(estimate, &mut motor);
                Ok(motor)
            }
            EstimateType::MotorPosition => {
                let mut position = vec![0.0; joints];
                self.sensor
                    .read(SensorQuantity::JointPosition, &mut position, true)?;
                let mut motor = vec![0.0; motors];
                self.coupling.motor_from_joint(&position, &mut motor)?;
                Ok(motor)
            }
            EstimateType::MotorPwmRaw => {
                let mut pwm = vec![0.0; motors];
                self.sensor.read(SensorQuantity::MotorPwm, &mut pwm, true)?;
                Ok(pwm)
            }
            other => Err(QueryError::Unsupported(other.name()).into()),
        }
    }

    fn ensure_started(&self) -> Result<()> {
        if self.phase == Phase::Configuring {
            return Err(LifecycleError::NotInitialized.into());
        }
        Ok(())
    }

    /// Change one filter parameter.
    ///
    /// The change is validated here and applied by the worker before its
    /// next cycle. Window length and threshold are set one at a time; the
    /// other half of the pair keeps its last requested value.
    ///
    /// # Errors
    ///
    /// - [`QueryError::Unsupported`] if `estimate` has no such parameter
    /// - [`ConfigError::InvalidParameter`] for an invalid value
    /// - [`LifecycleError::QueueFull`] if the worker is not keeping up
    /// - [`LifecycleError::NotInitialized`] before `init`
    pub fn set_estimation_parameter(
        &self,
        estimate: EstimateType,
        parameter: EstimationParameter,
        value: f64,
    ) -> Result<()> {
        let target = FilterTarget::resolve(estimate, parameter)?;
        let updates = match (self.phase, self.updates.as_ref()) {
            (Phase::Running, Some(updates)) => updates,
            (Phase::Closed, _) => return Err(LifecycleError::Released.into()),
            _ => return Err(LifecycleError::NotInitialized.into()),
        };

        let mut windows = self.windows.lock();
        let update = match parameter {
            EstimationParameter::CutFrequency => ParameterUpdate {
                target,
                value: ParameterValue::CutFrequency(value),
            },
            EstimationParameter::WindowLength | EstimationParameter::Threshold => {
                let mut params = windows.get(&target).copied().unwrap_or_default();
                if parameter == EstimationParameter::WindowLength {
                    params.window_length = window_length(value)?;
                } else {
                    params.threshold = value;
                }
                ParameterUpdate {
                    target,
                    value: ParameterValue::Window(params),
                }
            }
        };
        update.validate()?;

        updates.try_send(update).map_err(|e| match e {
            TrySendError::Full(_) => LifecycleError::QueueFull,
            TrySendError::Disconnected(_) => LifecycleError::Worker("estimator thread is gone".into()),
        })?;
        if let ParameterValue::Window(params) = update.value {
            windows.insert(target, params);
        }
        debug!(%estimate, ?parameter, value, "parameter update queued");
        Ok(())
    }

    /// Subscribe the channel called `name`.
    ///
    /// Joint and motor names are resolved by the sensor provider; base
    /// quantities accept any label.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownChannelName`] if the name does not
    /// resolve, or [`QueryError::AlreadyRegistered`].
    pub fn add_estimate(&self, estimate: EstimateType, name: &str) -> Result<()> {
        let channel = self.resolve(estimate, name)?;
        self.registry.write().add(estimate, name, channel)?;
        debug!(%estimate, name, channel, "estimate subscribed");
        Ok(())
    }

    /// Subscribe every name in `names`; returns how many were added.
    pub fn add_estimates<S: AsRef<str>>(&self, estimate: EstimateType, names: &[S]) -> usize {
        names
            .iter()
            .filter(|name| self.add_estimate(estimate, name.as_ref()).is_ok())
            .count()
    }

    /// Unsubscribe `name`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NotRegistered`].
    pub fn remove_estimate(&self, estimate: EstimateType, name: &str) -> Result<()> {
        self.registry.write().remove(estimate, name)?;
        debug!(%estimate, name, "estimate unsubscribed");
        Ok(())
    }

    /// Subscribed names of `estimate`, in subscription order.
    #[must_use]
    pub fn estimate_list(&self, estimate: EstimateType) -> Vec<String> {
        self.registry
            .read()
            .list(estimate)
            .iter()
            .map(|s| s.name.clone())
            .collect()
    }

    /// Number of subscriptions of `estimate`.
    #[must_use]
    pub fn estimate_number(&self, estimate: EstimateType) -> usize {
        self.registry.read().count(estimate)
    }

    fn resolve(&self, estimate: EstimateType, name: &str) -> Result<usize> {
        let channel = match estimate.space() {
            EstimateSpace::Joint => self.sensor.channel_id(name),
            EstimateSpace::Motor => self.sensor.motor_channel_id(name),
            EstimateSpace::Base => Some(0),
        };
        channel.ok_or_else(|| QueryError::UnknownChannelName(name.to_owned()).into())
    }

    /// Latest motor velocity of `channel`.
    ///
    /// # Errors
    ///
    /// As [`get_estimate`](Self::get_estimate).
    pub fn motor_velocity(&self, channel: usize) -> Result<f64> {
        self.get_estimate(EstimateType::MotorVelocity, channel, 0.0, false)
    }

    /// Latest motor velocity of every subscribed channel.
    ///
    /// # Errors
    ///
    /// As [`get_estimates`](Self::get_estimates).
    pub fn motor_velocities(&self) -> Result<Vec<f64>> {
        self.get_estimates(EstimateType::MotorVelocity, 0.0, false)
    }

    /// Cycle counters.
    #[must_use]
    pub fn counters(&self) -> CycleSnapshot {
        self.counters.snapshot()
    }

    /// Copy of the whole published snapshot, subscriptions aside.
    #[must_use]
    pub fn snapshot(&self) -> EstimateSnapshot {
        self.store.snapshot()
    }

    /// Number of joints, 0 before `init`.
    #[must_use]
    pub fn joints(&self) -> usize {
        self.coupling.joints()
    }

    /// Number of motors, 0 before `init`.
    #[must_use]
    pub fn motors(&self) -> usize {
        self.coupling.motors()
    }
}

impl Drop for WholeBodyStates {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(error = %e, "failed to close estimator");
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "value checked to be a non-negative integer in range"
)]
fn window_length(value: f64) -> std::result::Result<usize, ConfigError> {
    if value.is_finite()
        && value >= 0.0
        && value.fract().abs() < f64::EPSILON
        && value <= f64::from(u32::MAX)
    {
        Ok(value as usize)
    } else {
        Err(ConfigError::invalid_parameter("window_length", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SharedSensorBuffer;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_window_length_conversion() {
        assert!(matches!(window_length(12.0), Ok(12)));
        assert!(window_length(-1.0).is_err());
        assert!(window_length(2.5).is_err());
        assert!(window_length(f64::NAN).is_err());
    }

    #[test]
    fn test_queries_require_init() {
        let states = WholeBodyStates::new(Arc::new(SharedSensorBuffer::new(["a"])));
        assert!(
            states
                .get_estimate(EstimateType::JointPosition, 0, 0.0, false)
                .is_err()
        );
        assert!(
            states
                .set_estimation_parameter(
                    EstimateType::MotorPwm,
                    EstimationParameter::CutFrequency,
                    2.0
                )
                .is_err()
        );
        assert!(states.pause().is_err());
    }

    #[test]
    fn test_config_is_frozen_after_init() -> TestResult {
        let mut states = WholeBodyStates::new(Arc::new(SharedSensorBuffer::new(["a"])));
        states.set_config(EstimatorConfig::builder().period_ms(2.0).build()?)?;
        states.init()?;
        assert!(states.set_config(EstimatorConfig::default()).is_err());
        assert!(states.init().is_err());
        states.close()?;
        states.close()?;
        assert!(states.init().is_err());
        Ok(())
    }

    #[test]
    fn test_subscription_resolves_names() -> TestResult {
        let states = WholeBodyStates::new(Arc::new(SharedSensorBuffer::new(["hip", "knee"])));
        states.add_estimate(EstimateType::JointTorque, "knee")?;
        assert!(states.add_estimate(EstimateType::JointTorque, "ankle").is_err());
        assert!(states.add_estimate(EstimateType::JointTorque, "knee").is_err());
        assert_eq!(
            states.add_estimates(EstimateType::MotorPwm, &["hip", "knee", "wrist"]),
            2
        );
        assert_eq!(states.estimate_list(EstimateType::MotorPwm), vec!["hip", "knee"]);
        states.remove_estimate(EstimateType::MotorPwm, "hip")?;
        assert_eq!(states.estimate_number(EstimateType::MotorPwm), 1);
        Ok(())
    }

    #[test]
    fn test_parameter_updates_are_validated_eagerly() -> TestResult {
        let mut states = WholeBodyStates::new(Arc::new(SharedSensorBuffer::new(["a"])));
        states.set_config(EstimatorConfig::builder().period_ms(2.0).build()?)?;
        states.init()?;

        states.set_estimation_parameter(
            EstimateType::JointVelocity,
            EstimationParameter::WindowLength,
            30.0,
        )?;
        assert!(
            states
                .set_estimation_parameter(
                    EstimateType::JointVelocity,
                    EstimationParameter::Threshold,
                    -1.0
                )
                .is_err()
        );
        assert!(
            states
                .set_estimation_parameter(
                    EstimateType::JointAcceleration,
                    EstimationParameter::WindowLength,
                    2.0
                )
                .is_err()
        );
        assert!(
            states
                .set_estimation_parameter(
                    EstimateType::BasePose,
                    EstimationParameter::CutFrequency,
                    2.0
                )
                .is_err()
        );
        states.close()?;
        Ok(())
    }
}
