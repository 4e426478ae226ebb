//! Estimation cycle driven with synthetic ticks.
//!
//! These tests call `run` directly instead of starting the worker, so every
//! sample lands in exactly one cycle.

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use nalgebra::{Isometry3, Matrix6xX, Vector3};
use wholebody_errors::ConfigError;
use wholebody_estimator::{
    CycleCounters, EstimateStore, EstimationCycle, EstimatorConfig, SensorQuantity,
    SharedSensorBuffer,
};
use wholebody_kinematics::prelude::*;
use wholebody_scheduler::Tick;

type TestResult = Result<(), Box<dyn std::error::Error>>;

struct Rig {
    sensor: Arc<SharedSensorBuffer>,
    store: Arc<EstimateStore>,
    counters: Arc<CycleCounters>,
    cycle: EstimationCycle,
}

impl Rig {
    fn new(
        names: &[&str],
        config: EstimatorConfig,
        model: Option<Arc<dyn KinematicModel>>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let sensor = Arc::new(SharedSensorBuffer::new(names.iter().copied()));
        let store = Arc::new(EstimateStore::new(0, 0));
        let counters = Arc::new(CycleCounters::new());
        let mut cycle = EstimationCycle::new(
            config,
            sensor.clone(),
            model,
            Arc::clone(&store),
            Arc::clone(&counters),
        );
        cycle.thread_init()?;
        Ok(Self {
            sensor,
            store,
            counters,
            cycle,
        })
    }

    fn step(&mut self, count: u64, dt: f64) -> wholebody_errors::Result<()> {
        self.cycle.run(&Tick {
            count,
            elapsed_s: count as f64 * dt,
            dt_s: dt,
            jitter_ns: 0,
            missed: false,
        })
    }
}

/// Root, a 3-DoF leg ending in a sole, and a fixed head.
fn legged_model() -> Result<Arc<KinematicTree>, ConfigError> {
    let mut tree = KinematicTree::new("root_link");
    tree.add_link(
        "hip_roll",
        "root_link",
        Isometry3::translation(0.0, 0.1, -0.1),
        Joint::Revolute(Vector3::x_axis()),
    )?;
    tree.add_link(
        "hip_pitch",
        "hip_roll",
        Isometry3::identity(),
        Joint::Revolute(Vector3::y_axis()),
    )?;
    tree.add_link(
        "knee",
        "hip_pitch",
        Isometry3::translation(0.0, 0.0, -0.4),
        Joint::Revolute(Vector3::y_axis()),
    )?;
    tree.add_link(
        "l_sole",
        "knee",
        Isometry3::translation(0.02, 0.0, -0.4),
        Joint::Fixed,
    )?;
    tree.add_link(
        "head",
        "root_link",
        Isometry3::translation(0.0, 0.0, 0.5),
        Joint::Fixed,
    )?;
    Ok(Arc::new(tree))
}

#[test]
fn test_sine_position_gives_cosine_velocity() -> TestResult {
    let mut rig = Rig::new(&["q"], EstimatorConfig::default(), None)?;
    let dt = 1e-3;
    let steps = 2000u64;
    let mut worst_velocity = 0.0f64;
    let mut worst_acceleration = 0.0f64;

    for k in 1..=steps {
        let t = k as f64 * dt;
        rig.sensor.push(SensorQuantity::JointPosition, &[t.sin()], t)?;
        rig.step(k, dt)?;
        if k > steps / 2 {
            let snapshot = rig.store.snapshot();
            worst_velocity = worst_velocity.max((snapshot.joint_velocity[0] - t.cos()).abs());
            worst_acceleration =
                worst_acceleration.max((snapshot.joint_acceleration[0] + t.sin()).abs());
        }
    }
    assert!(worst_velocity < 0.02, "velocity error {worst_velocity}");
    assert!(worst_acceleration < 0.05, "acceleration error {worst_acceleration}");
    Ok(())
}

#[test]
fn test_failed_reads_keep_previous_values() -> TestResult {
    let mut rig = Rig::new(&["a", "b"], EstimatorConfig::default(), None)?;
    rig.sensor.push(SensorQuantity::JointPosition, &[0.4, -0.4], 0.01)?;
    rig.sensor.push(SensorQuantity::JointTorque, &[2.0, 1.0], 0.01)?;
    rig.sensor.push(SensorQuantity::MotorPwm, &[5.0, 6.0], 0.01)?;
    rig.step(1, 0.01)?;
    let before = rig.store.snapshot();
    assert_eq!(rig.counters.snapshot().sensor_read_failures, 0);

    rig.sensor.set_failing(true);
    rig.step(2, 0.01)?;
    let after = rig.store.snapshot();
    assert_eq!(after.cycle, 2);
    assert_eq!(after.joint_position, before.joint_position);
    assert_eq!(after.joint_torque, before.joint_torque);
    assert_eq!(after.last_pwm_buffer, before.last_pwm_buffer);
    assert_eq!(rig.counters.snapshot().sensor_read_failures, 3);

    rig.sensor.set_failing(false);
    rig.sensor.push(SensorQuantity::JointPosition, &[0.5, -0.5], 0.03)?;
    rig.step(3, 0.01)?;
    assert_abs_diff_eq!(rig.store.snapshot().joint_position[0], 0.5);
    assert_eq!(rig.counters.snapshot().sensor_read_failures, 3);
    Ok(())
}

#[test]
fn test_base_disabled_stays_zero() -> TestResult {
    let mut rig = Rig::new(&["a"], EstimatorConfig::default(), None)?;
    rig.sensor.push(SensorQuantity::JointPosition, &[1.0], 0.01)?;
    rig.step(1, 0.01)?;
    let snapshot = rig.store.snapshot();
    assert!(snapshot.base_pose.iter().all(|v| v.abs() < f64::EPSILON));
    assert!(snapshot.base_velocity.iter().all(|v| v.abs() < f64::EPSILON));
    Ok(())
}

#[test]
fn test_base_pose_keeps_reference_at_origin() -> TestResult {
    let model = legged_model()?;
    let sole = model.link_id("l_sole").ok_or("l_sole")?;
    let config = EstimatorConfig::builder()
        .estimate_base(true)
        .world_reference_link("l_sole")
        .build()?;
    let mut rig = Rig::new(&["hip_roll", "hip_pitch", "knee"], config, Some(model.clone()))?;

    let q = [0.1, -0.4, 0.9];
    for k in 1..=20 {
        rig.sensor
            .push(SensorQuantity::JointPosition, &q, k as f64 * 0.01)?;
        rig.step(k, 0.01)?;
    }
    let snapshot = rig.store.snapshot();
    let world_h_root = frame_from_serialization(&snapshot.base_pose).ok_or("invalid frame")?;
    let world_h_sole = model.forward_kinematics(&q, &world_h_root, sole)?;
    assert_abs_diff_eq!(world_h_sole.translation.vector, Vector3::zeros(), epsilon = 1e-9);

    // Constant posture: the base does not move.
    for v in snapshot.base_velocity {
        assert_abs_diff_eq!(v, 0.0, epsilon = 1e-6);
    }
    let counters = rig.counters.snapshot();
    assert_eq!(counters.base_position_failures, 0);
    assert_eq!(counters.base_velocity_failures, 0);
    Ok(())
}

#[test]
fn test_unknown_reference_link_fails_init() -> TestResult {
    let config = EstimatorConfig::builder()
        .estimate_base(true)
        .world_reference_link("r_sole")
        .build()?;
    let result = Rig::new(
        &["hip_roll", "hip_pitch", "knee"],
        config,
        Some(legged_model()?),
    );
    assert!(result.is_err());
    Ok(())
}

/// One prismatic DoF whose base Jacobian block is rank deficient.
#[derive(Debug)]
struct DegenerateSlider;

impl KinematicModel for DegenerateSlider {
    fn dof(&self) -> usize {
        1
    }

    fn root_link(&self) -> LinkId {
        LinkId(0)
    }

    fn link_id(&self, name: &str) -> Option<LinkId> {
        match name {
            "base" => Some(LinkId(0)),
            "slider" => Some(LinkId(1)),
            _ => None,
        }
    }

    fn link_name(&self, link: LinkId) -> Option<&str> {
        match link.0 {
            0 => Some("base"),
            1 => Some("slider"),
            _ => None,
        }
    }

    fn forward_kinematics(
        &self,
        q: &[f64],
        world_h_root: &Isometry3<f64>,
        link: LinkId,
    ) -> Result<Isometry3<f64>, ConfigError> {
        let x = q.first().copied().unwrap_or(0.0);
        match link.0 {
            0 => Ok(*world_h_root),
            1 => Ok(world_h_root * Isometry3::translation(x, 0.0, 0.0)),
            _ => Err(ConfigError::unknown_link(link.to_string())),
        }
    }

    fn jacobian(
        &self,
        _q: &[f64],
        _world_h_root: &Isometry3<f64>,
        _link: LinkId,
    ) -> Result<Matrix6xX<f64>, ConfigError> {
        let mut jac = Matrix6xX::zeros(7);
        jac[(0, 0)] = 1.0;
        jac[(0, 6)] = 1.0;
        Ok(jac)
    }
}

#[test]
fn test_singular_base_velocity_is_counted_not_published() -> TestResult {
    let config = EstimatorConfig::builder()
        .estimate_base(true)
        .world_reference_link("slider")
        .build()?;
    let mut rig = Rig::new(&["slide"], config, Some(Arc::new(DegenerateSlider)))?;

    for k in 1..=5 {
        let t = k as f64 * 0.01;
        rig.sensor.push(SensorQuantity::JointPosition, &[t], t)?;
        rig.step(k, 0.01)?;
    }
    let counters = rig.counters.snapshot();
    assert_eq!(counters.base_velocity_failures, 5);
    assert_eq!(counters.base_position_failures, 0);
    assert_eq!(counters.total_cycles, 5);

    let snapshot = rig.store.snapshot();
    assert!(snapshot.base_velocity.iter().all(|v| v.abs() < f64::EPSILON));
    // Slider at x = 0.05 pinned to the world origin puts the base at -0.05.
    assert_abs_diff_eq!(snapshot.base_pose[3], -0.05, epsilon = 1e-12);
    Ok(())
}
