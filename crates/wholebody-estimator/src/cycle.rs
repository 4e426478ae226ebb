//! The periodic estimation cycle.
//!
//! One call to [`EstimationCycle::run`] performs, in order:
//!
//! 1. read the latest joint positions (and device derivatives if trusted)
//! 2. differentiate positions into joint velocity and acceleration
//! 3. map joint kinematics to motor space
//! 4. filter and differentiate joint and motor torques, filter PWM
//! 5. estimate the floating-base pose and twist
//! 6. publish the snapshot
//!
//! A failed sub-step leaves its outputs at their previous values and the
//! cycle carries on. Parameter updates queued by other threads are applied
//! before step 1, never in the middle of a cycle.

use std::fmt;
use std::sync::Arc;

use crossbeam::channel::Receiver;
use tracing::{debug, info, warn};
use wholebody_errors::{ConfigError, LifecycleError, Result};
use wholebody_filters::{AdaptiveWindowBank, AdaptiveWindowParams, FitOrder, LowPassBank};
use wholebody_kinematics::{CouplingTransform, FloatingBaseEstimator, KinematicModel};
use wholebody_scheduler::Tick;

use crate::config::EstimatorConfig;
use crate::counters::CycleCounters;
use crate::estimate::{FilterTarget, ParameterUpdate, ParameterValue};
use crate::sensor::{SensorProvider, SensorQuantity};
use crate::store::{EstimateSnapshot, EstimateStore};

/// A failure streak is logged on its first cycle and then every this many.
pub const LOG_EVERY: u64 = 1000;

/// Lifecycle of an [`EstimationCycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// Constructed, not yet initialized
    Init,
    /// Initialized; `run` may be called
    Running,
    /// Torn down; cannot be restarted
    Released,
}

#[derive(Debug, Default)]
struct FailureStreak {
    count: u64,
}

impl FailureStreak {
    fn fail(&mut self, step: &'static str, error: &dyn fmt::Display) {
        self.count += 1;
        if self.count == 1 || self.count % LOG_EVERY == 0 {
            warn!(step, failures = self.count, error = %error, "estimation sub-step failed");
        }
    }

    fn succeed(&mut self, step: &'static str) {
        if self.count > 0 {
            info!(step, failures = self.count, "estimation sub-step recovered");
            self.count = 0;
        }
    }
}

#[derive(Debug, Default)]
struct Streaks {
    position: FailureStreak,
    device: FailureStreak,
    torque: FailureStreak,
    pwm: FailureStreak,
    base_position: FailureStreak,
    base_velocity: FailureStreak,
}

#[derive(Debug)]
struct Filters {
    velocity: AdaptiveWindowBank,
    acceleration: AdaptiveWindowBank,
    joint_torque_derivative: AdaptiveWindowBank,
    motor_torque_derivative: AdaptiveWindowBank,
    joint_torque: LowPassBank,
    motor_torque: LowPassBank,
    pwm: LowPassBank,
}

impl Filters {
    fn new(config: &EstimatorConfig, joints: usize, motors: usize) -> Result<Self> {
        Ok(Self {
            velocity: AdaptiveWindowBank::new(FitOrder::Linear, config.velocity, joints)?,
            acceleration: AdaptiveWindowBank::new(
                FitOrder::Quadratic,
                config.acceleration,
                joints,
            )?,
            joint_torque_derivative: AdaptiveWindowBank::new(
                FitOrder::Linear,
                config.joint_torque_derivative,
                joints,
            )?,
            motor_torque_derivative: AdaptiveWindowBank::new(
                FitOrder::Linear,
                config.motor_torque_derivative,
                motors,
            )?,
            joint_torque: LowPassBank::new(config.joint_torque_cutoff_hz, joints)?,
            motor_torque: LowPassBank::new(config.motor_torque_cutoff_hz, motors)?,
            pwm: LowPassBank::new(config.pwm_cutoff_hz, motors)?,
        })
    }

    /// Rebuild every bank with its current parameters.
    fn resize(&mut self, joints: usize, motors: usize) -> Result<()> {
        self.velocity.resize(joints)?;
        self.acceleration.resize(joints)?;
        self.joint_torque_derivative.resize(joints)?;
        self.motor_torque_derivative.resize(motors)?;
        self.joint_torque.resize(joints)?;
        self.motor_torque.resize(motors)?;
        self.pwm.resize(motors)?;
        Ok(())
    }

    fn apply(&mut self, update: &ParameterUpdate) -> std::result::Result<(), ConfigError> {
        update.validate()?;
        match (update.target, update.value) {
            (FilterTarget::Velocity, ParameterValue::Window(p)) => self.velocity.set_params(p),
            (FilterTarget::Acceleration, ParameterValue::Window(p)) => {
                self.acceleration.set_params(p)
            }
            (FilterTarget::JointTorqueDerivative, ParameterValue::Window(p)) => {
                self.joint_torque_derivative.set_params(p)
            }
            (FilterTarget::MotorTorqueDerivative, ParameterValue::Window(p)) => {
                self.motor_torque_derivative.set_params(p)
            }
            (FilterTarget::JointTorque, ParameterValue::CutFrequency(hz)) => {
                self.joint_torque.set_cutoff_frequency(hz)
            }
            (FilterTarget::MotorTorque, ParameterValue::CutFrequency(hz)) => {
                self.motor_torque.set_cutoff_frequency(hz)
            }
            (FilterTarget::Pwm, ParameterValue::CutFrequency(hz)) => {
                self.pwm.set_cutoff_frequency(hz)
            }
            (target, value) => Err(ConfigError::invalid_parameter(
                "parameter_update",
                format!("{value:?} does not apply to {target:?}"),
            )),
        }
    }

    fn parameter(&self, target: FilterTarget) -> ParameterValue {
        match target {
            FilterTarget::Velocity => ParameterValue::Window(self.velocity.params()),
            FilterTarget::Acceleration => ParameterValue::Window(self.acceleration.params()),
            FilterTarget::JointTorqueDerivative => {
                ParameterValue::Window(self.joint_torque_derivative.params())
            }
            FilterTarget::MotorTorqueDerivative => {
                ParameterValue::Window(self.motor_torque_derivative.params())
            }
            FilterTarget::JointTorque => ParameterValue::CutFrequency(self.joint_torque.cutoff_hz()),
            FilterTarget::MotorTorque => ParameterValue::CutFrequency(self.motor_torque.cutoff_hz()),
            FilterTarget::Pwm => ParameterValue::CutFrequency(self.pwm.cutoff_hz()),
        }
    }
}

/// Everything allocated by `thread_init` and dropped by `thread_release`.
#[derive(Debug)]
struct Pipeline {
    joints: usize,
    motors: usize,
    filters: Filters,
    coupling: CouplingTransform,
    base: FloatingBaseEstimator,
    pwm_baseline: Vec<f64>,
    position: Vec<f64>,
    torque: Vec<f64>,
    motor_torque: Vec<f64>,
    pwm_raw: Vec<f64>,
    pwm_decoupled: Vec<f64>,
    work: EstimateSnapshot,
    spare: EstimateSnapshot,
    streaks: Streaks,
}

impl Pipeline {
    fn new(
        joints: usize,
        motors: usize,
        filters: Filters,
        coupling: CouplingTransform,
        base: FloatingBaseEstimator,
        pwm_baseline: Vec<f64>,
    ) -> Self {
        Self {
            joints,
            motors,
            filters,
            coupling,
            base,
            pwm_baseline,
            position: vec![0.0; joints],
            torque: vec![0.0; joints],
            motor_torque: vec![0.0; motors],
            pwm_raw: vec![0.0; motors],
            pwm_decoupled: vec![0.0; motors],
            work: EstimateSnapshot::new(joints, motors),
            spare: EstimateSnapshot::new(joints, motors),
            streaks: Streaks::default(),
        }
    }

    /// Reallocate every buffer; filter history and estimates start over.
    fn resize(
        &mut self,
        joints: usize,
        motors: usize,
        coupling: CouplingTransform,
        pwm_baseline: Vec<f64>,
    ) -> Result<()> {
        self.filters.resize(joints, motors)?;
        self.joints = joints;
        self.motors = motors;
        self.coupling = coupling;
        self.pwm_baseline = pwm_baseline;
        self.position = vec![0.0; joints];
        self.torque = vec![0.0; joints];
        self.motor_torque = vec![0.0; motors];
        self.pwm_raw = vec![0.0; motors];
        self.pwm_decoupled = vec![0.0; motors];
        self.work = EstimateSnapshot::new(joints, motors);
        self.spare = EstimateSnapshot::new(joints, motors);
        self.streaks = Streaks::default();
        Ok(())
    }

    fn step(
        &mut self,
        config: &EstimatorConfig,
        sensor: &dyn SensorProvider,
        counters: &CycleCounters,
        store: &EstimateStore,
        tick: &Tick,
    ) -> Result<()> {
        self.estimate_joint_kinematics(config, sensor, counters)?;
        if config.motor_estimation {
            self.estimate_motor_kinematics()?;
        }
        self.estimate_torques(config, sensor, counters, tick.dt_s)?;
        self.estimate_pwm(sensor, counters, tick.dt_s)?;
        if config.estimate_base {
            self.estimate_base(counters);
        }

        self.work.cycle = tick.count;
        self.work.stamp = tick.elapsed_s;
        self.spare.copy_from(&self.work);
        store.publish(&mut self.spare)?;
        Ok(())
    }

    fn estimate_joint_kinematics(
        &mut self,
        config: &EstimatorConfig,
        sensor: &dyn SensorProvider,
        counters: &CycleCounters,
    ) -> Result<()> {
        let stamp = match sensor.read(SensorQuantity::JointPosition, &mut self.position, false) {
            Ok(stamp) => {
                self.streaks.position.succeed("joint_position");
                stamp
            }
            Err(e) => {
                counters.inc_sensor_read_failure();
                self.streaks.position.fail("joint_position", &e);
                return Ok(());
            }
        };
        self.work.joint_position.copy_from_slice(&self.position);

        if config.read_speed_acc_from_device && sensor.supports_device_derivatives() {
            match sensor.read_device_derivatives(
                &mut self.work.joint_velocity,
                &mut self.work.joint_acceleration,
            ) {
                Ok(_) => {
                    self.streaks.device.succeed("device_derivatives");
                    return Ok(());
                }
                Err(e) => {
                    counters.inc_sensor_read_failure();
                    self.streaks.device.fail("device_derivatives", &e);
                }
            }
        }

        self.filters
            .velocity
            .update(&self.position, stamp, &mut self.work.joint_velocity)?;
        self.filters
            .acceleration
            .update(&self.position, stamp, &mut self.work.joint_acceleration)?;
        Ok(())
    }

    fn estimate_motor_kinematics(&mut self) -> Result<()> {
        let work = &mut self.work;
        self.coupling
            .motor_from_joint(&work.joint_position, &mut work.motor_position)?;
        self.coupling
            .motor_from_joint(&work.joint_velocity, &mut work.motor_velocity)?;
        self.coupling
            .motor_from_joint(&work.joint_acceleration, &mut work.motor_acceleration)?;
        Ok(())
    }

    fn estimate_torques(
        &mut self,
        config: &EstimatorConfig,
        sensor: &dyn SensorProvider,
        counters: &CycleCounters,
        dt: f64,
    ) -> Result<()> {
        let stamp = match sensor.read(SensorQuantity::JointTorque, &mut self.torque, false) {
            Ok(stamp) => {
                self.streaks.torque.succeed("joint_torque");
                stamp
            }
            Err(e) => {
                counters.inc_sensor_read_failure();
                self.streaks.torque.fail("joint_torque", &e);
                return Ok(());
            }
        };

        self.filters
            .joint_torque
            .update(&self.torque, dt, &mut self.work.joint_torque)?;
        self.filters.joint_torque_derivative.update(
            &self.torque,
            stamp,
            &mut self.work.joint_torque_derivative,
        )?;

        if config.motor_estimation {
            // Stiff actuation: motor torque is the coupled joint torque.
            self.coupling
                .motor_torque_from_joint(&self.torque, &mut self.motor_torque)?;
            self.filters
                .motor_torque
                .update(&self.motor_torque, dt, &mut self.work.motor_torque)?;
            self.filters.motor_torque_derivative.update(
                &self.motor_torque,
                stamp,
                &mut self.work.motor_torque_derivative,
            )?;
        }
        Ok(())
    }

    fn estimate_pwm(
        &mut self,
        sensor: &dyn SensorProvider,
        counters: &CycleCounters,
        dt: f64,
    ) -> Result<()> {
        match sensor.read(SensorQuantity::MotorPwm, &mut self.pwm_raw, false) {
            Ok(_) => self.streaks.pwm.succeed("motor_pwm"),
            Err(e) => {
                counters.inc_sensor_read_failure();
                self.streaks.pwm.fail("motor_pwm", &e);
                return Ok(());
            }
        }

        self.work.last_pwm_buffer.copy_from_slice(&self.pwm_raw);
        for ((out, raw), baseline) in self
            .pwm_decoupled
            .iter_mut()
            .zip(&self.pwm_raw)
            .zip(&self.pwm_baseline)
        {
            *out = raw - baseline;
        }
        self.filters
            .pwm
            .update(&self.pwm_decoupled, dt, &mut self.work.motor_pwm)?;
        Ok(())
    }

    fn estimate_base(&mut self, counters: &CycleCounters) {
        match self.base.compute_base_position(&self.work.joint_position) {
            Ok(pose) => {
                self.work.base_pose = pose;
                self.streaks.base_position.succeed("base_pose");
            }
            Err(e) => {
                counters.inc_base_position_failure();
                self.streaks.base_position.fail("base_pose", &e);
            }
        }

        match self
            .base
            .compute_base_velocity(&self.work.joint_position, &self.work.joint_velocity)
        {
            Ok(twist) => {
                self.work.base_velocity = twist;
                self.streaks.base_velocity.succeed("base_velocity");
            }
            Err(e) => {
                counters.inc_base_velocity_failure();
                self.streaks.base_velocity.fail("base_velocity", &e);
            }
        }
    }
}

/// The estimation cycle and its state machine.
///
/// The cycle owns all filter state and is meant to live on the worker
/// thread. Other threads observe it through the [`EstimateStore`] and the
/// [`CycleCounters`], and reach it through the parameter-update queue.
#[derive(Debug)]
pub struct EstimationCycle {
    config: EstimatorConfig,
    sensor: Arc<dyn SensorProvider>,
    model: Option<Arc<dyn KinematicModel>>,
    store: Arc<EstimateStore>,
    counters: Arc<CycleCounters>,
    updates: Option<Receiver<ParameterUpdate>>,
    state: CycleState,
    pipeline: Option<Pipeline>,
}

impl EstimationCycle {
    /// Create a cycle in the [`CycleState::Init`] state.
    pub fn new(
        config: EstimatorConfig,
        sensor: Arc<dyn SensorProvider>,
        model: Option<Arc<dyn KinematicModel>>,
        store: Arc<EstimateStore>,
        counters: Arc<CycleCounters>,
    ) -> Self {
        Self {
            config,
            sensor,
            model,
            store,
            counters,
            updates: None,
            state: CycleState::Init,
            pipeline: None,
        }
    }

    /// Receive parameter updates from `updates`, applied before each cycle.
    #[must_use]
    pub fn with_update_queue(mut self, updates: Receiver<ParameterUpdate>) -> Self {
        self.updates = Some(updates);
        self
    }

    /// Validate the configuration and allocate all per-channel state.
    ///
    /// The number of joints is the sensor provider's channel count.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidDof`] if the provider has no channels
    /// - [`ConfigError::MissingKinematicModel`] if base estimation is on
    ///   without a model
    /// - any configuration, coupling or reference-link error
    /// - [`LifecycleError`] if the cycle is not in [`CycleState::Init`]
    pub fn thread_init(&mut self) -> Result<()> {
        match self.state {
            CycleState::Init => {}
            CycleState::Running => return Err(LifecycleError::AlreadyInitialized.into()),
            CycleState::Released => return Err(LifecycleError::Released.into()),
        }
        self.config.validate()?;
        let joints = self.sensor.channel_count();
        if joints == 0 {
            return Err(ConfigError::InvalidDof(joints).into());
        }

        let coupling = self.config.coupling_for(joints)?;
        let motors = coupling.motors();
        let pwm_baseline = self.pwm_baseline(motors)?;
        let filters = Filters::new(&self.config, joints, motors)?;

        let mut base = FloatingBaseEstimator::new();
        if self.config.estimate_base {
            let model = self
                .model
                .clone()
                .ok_or(ConfigError::MissingKinematicModel)?;
            base.init(model, joints)?;
            if let Some(link) = &self.config.world_reference_link {
                base.set_world_base_link_name(link)?;
            }
        }

        self.store.resize(joints, motors);
        self.pipeline = Some(Pipeline::new(
            joints,
            motors,
            filters,
            coupling,
            base,
            pwm_baseline,
        ));
        self.state = CycleState::Running;
        info!(
            joints,
            motors,
            estimate_base = self.config.estimate_base,
            motor_estimation = self.config.motor_estimation,
            "estimation cycle initialized"
        );
        Ok(())
    }

    fn pwm_baseline(&self, motors: usize) -> Result<Vec<f64>> {
        match &self.config.pwm_baseline {
            Some(baseline) if baseline.len() != motors => {
                Err(ConfigError::dimension_mismatch("pwm_baseline", motors, baseline.len()).into())
            }
            Some(baseline) => Ok(baseline.clone()),
            None => Ok(vec![0.0; motors]),
        }
    }

    /// Run one cycle.
    ///
    /// Sub-step failures are counted and logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] outside [`CycleState::Running`], and a
    /// [`ConfigError::DimensionMismatch`] if the published snapshot was
    /// resized behind the cycle's back.
    pub fn run(&mut self, tick: &Tick) -> Result<()> {
        let pipeline = match (self.state, self.pipeline.as_mut()) {
            (CycleState::Running, Some(pipeline)) => pipeline,
            (CycleState::Released, _) => return Err(LifecycleError::Released.into()),
            _ => return Err(LifecycleError::NotInitialized.into()),
        };
        self.counters.record_tick(tick.jitter_ns, tick.missed);

        if let Some(updates) = &self.updates {
            while let Ok(update) = updates.try_recv() {
                match pipeline.filters.apply(&update) {
                    Ok(()) => {
                        self.counters.inc_parameter_update();
                        debug!(filter = ?update.target, value = ?update.value, "parameter updated");
                    }
                    Err(e) => warn!(filter = ?update.target, error = %e, "parameter update rejected"),
                }
            }
        }

        pipeline.step(
            &self.config,
            self.sensor.as_ref(),
            &self.counters,
            &self.store,
            tick,
        )?;
        self.counters.inc_cycle();
        Ok(())
    }

    /// Tear down all per-channel state.
    ///
    /// Safe in any state, including after a failed `thread_init`. The cycle
    /// cannot be initialized again.
    pub fn thread_release(&mut self) {
        if self.state != CycleState::Released {
            info!(cycles = self.counters.snapshot().total_cycles, "estimation cycle released");
        }
        self.pipeline = None;
        self.state = CycleState::Released;
    }

    /// Resize every per-channel container to `joints` joints.
    ///
    /// History of every filter is dropped and the published snapshot is
    /// zeroed at the new size. Must not run concurrently with [`run`](Self::run),
    /// which the `&mut self` receiver guarantees.
    ///
    /// # Errors
    ///
    /// Fails outside [`CycleState::Running`], for zero joints, when the
    /// configured coupling or PWM baseline does not fit, or when the
    /// kinematic model has a different number of joints. Nothing changes on
    /// error.
    pub fn change_dof(&mut self, joints: usize) -> Result<()> {
        if joints == 0 {
            return Err(ConfigError::InvalidDof(joints).into());
        }
        let coupling = self.config.coupling_for(joints)?;
        let motors = coupling.motors();
        let pwm_baseline = self.pwm_baseline(motors)?;
        let pipeline = match (self.state, self.pipeline.as_mut()) {
            (CycleState::Running, Some(pipeline)) => pipeline,
            (CycleState::Released, _) => return Err(LifecycleError::Released.into()),
            _ => return Err(LifecycleError::NotInitialized.into()),
        };

        if self.config.estimate_base {
            pipeline.base.change_dof(joints)?;
        }
        pipeline.resize(joints, motors, coupling, pwm_baseline)?;
        self.store.resize(joints, motors);
        info!(joints, motors, "estimator degrees of freedom changed");
        Ok(())
    }

    /// Apply a parameter update immediately.
    ///
    /// # Errors
    ///
    /// Returns the validation error, or [`LifecycleError::NotInitialized`]
    /// before `thread_init`.
    pub fn apply_update(&mut self, update: &ParameterUpdate) -> Result<()> {
        let pipeline = self
            .pipeline
            .as_mut()
            .ok_or(LifecycleError::NotInitialized)?;
        pipeline.filters.apply(update)?;
        self.counters.inc_parameter_update();
        debug!(filter = ?update.target, value = ?update.value, "parameter updated");
        Ok(())
    }

    fn apply_window(&mut self, target: FilterTarget, params: AdaptiveWindowParams) -> Result<()> {
        self.apply_update(&ParameterUpdate {
            target,
            value: ParameterValue::Window(params),
        })
    }

    fn apply_cutoff(&mut self, target: FilterTarget, hz: f64) -> Result<()> {
        self.apply_update(&ParameterUpdate {
            target,
            value: ParameterValue::CutFrequency(hz),
        })
    }

    /// Set the joint velocity window length and threshold.
    ///
    /// # Errors
    ///
    /// Fails for invalid parameters or before init.
    pub fn set_velocity_params(&mut self, params: AdaptiveWindowParams) -> Result<()> {
        self.apply_window(FilterTarget::Velocity, params)
    }

    /// Set the joint acceleration window length and threshold.
    ///
    /// # Errors
    ///
    /// Fails for invalid parameters or before init.
    pub fn set_acceleration_params(&mut self, params: AdaptiveWindowParams) -> Result<()> {
        self.apply_window(FilterTarget::Acceleration, params)
    }

    /// Set the joint torque derivative window length and threshold.
    ///
    /// # Errors
    ///
    /// Fails for invalid parameters or before init.
    pub fn set_joint_torque_derivative_params(
        &mut self,
        params: AdaptiveWindowParams,
    ) -> Result<()> {
        self.apply_window(FilterTarget::JointTorqueDerivative, params)
    }

    /// Set the motor torque derivative window length and threshold.
    ///
    /// # Errors
    ///
    /// Fails for invalid parameters or before init.
    pub fn set_motor_torque_derivative_params(
        &mut self,
        params: AdaptiveWindowParams,
    ) -> Result<()> {
        self.apply_window(FilterTarget::MotorTorqueDerivative, params)
    }

    /// Set the joint torque low-pass cutoff.
    ///
    /// # Errors
    ///
    /// Fails for a non-positive cutoff or before init.
    pub fn set_joint_torque_cut_frequency(&mut self, hz: f64) -> Result<()> {
        self.apply_cutoff(FilterTarget::JointTorque, hz)
    }

    /// Set the motor torque low-pass cutoff.
    ///
    /// # Errors
    ///
    /// Fails for a non-positive cutoff or before init.
    pub fn set_motor_torque_cut_frequency(&mut self, hz: f64) -> Result<()> {
        self.apply_cutoff(FilterTarget::MotorTorque, hz)
    }

    /// Set the PWM low-pass cutoff.
    ///
    /// # Errors
    ///
    /// Fails for a non-positive cutoff or before init.
    pub fn set_pwm_cut_frequency(&mut self, hz: f64) -> Result<()> {
        self.apply_cutoff(FilterTarget::Pwm, hz)
    }

    /// Current value of a filter parameter, `None` before init.
    #[must_use]
    pub fn parameter(&self, target: FilterTarget) -> Option<ParameterValue> {
        self.pipeline.as_ref().map(|p| p.filters.parameter(target))
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Number of joints, 0 outside [`CycleState::Running`].
    #[must_use]
    pub fn joints(&self) -> usize {
        self.pipeline.as_ref().map_or(0, |p| p.joints)
    }

    /// Number of motors, 0 outside [`CycleState::Running`].
    #[must_use]
    pub fn motors(&self) -> usize {
        self.pipeline.as_ref().map_or(0, |p| p.motors)
    }

    /// Configuration the cycle was built with.
    #[must_use]
    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Coupling in use, `None` outside [`CycleState::Running`].
    #[must_use]
    pub fn coupling(&self) -> Option<&CouplingTransform> {
        self.pipeline.as_ref().map(|p| &p.coupling)
    }
}
