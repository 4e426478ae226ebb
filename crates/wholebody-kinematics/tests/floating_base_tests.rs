//! Floating-base estimation against a small legged model.

use std::sync::Arc;

use approx::assert_relative_eq;
use nalgebra::{Isometry3, Matrix6xX, Vector3};
use proptest::prelude::*;
use wholebody_errors::{ConfigError, NumericalError, WholeBodyError};
use wholebody_kinematics::prelude::*;

type TestResult = Result<(), Box<dyn std::error::Error>>;

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

fn estimator_on_sole() -> Result<FloatingBaseEstimator, Box<dyn std::error::Error>> {
    let mut fb = FloatingBaseEstimator::new();
    fb.init(legged_model()?, 3)?;
    fb.set_world_base_link_name("l_sole")?;
    Ok(fb)
}

#[test]
fn test_sole_stays_at_world_origin() -> TestResult {
    let model = legged_model()?;
    let mut fb = estimator_on_sole()?;
    let sole = model.link_id("l_sole").ok_or("l_sole")?;

    for q in [[0.0, 0.0, 0.0], [0.1, -0.4, 0.9], [-0.2, 0.3, 1.4]] {
        let pose = fb.compute_base_position(&q)?;
        let world_h_root = frame_from_serialization(&pose).ok_or("invalid frame")?;
        let world_h_sole = model.forward_kinematics(&q, &world_h_root, sole)?;
        assert_relative_eq!(world_h_sole.translation.vector, Vector3::zeros(), epsilon = 1e-12);
        assert!(world_h_sole.rotation.imag().norm() < 1e-12);
    }
    Ok(())
}

#[test]
fn test_base_velocity_keeps_sole_still() -> TestResult {
    let model = legged_model()?;
    let mut fb = estimator_on_sole()?;
    let sole = model.link_id("l_sole").ok_or("l_sole")?;

    let q = [0.05, -0.5, 1.0];
    let dq = [0.2, -1.0, 1.5];
    let twist = fb.compute_base_velocity(&q, &dq)?;

    let world_h_root = fb.world_h_root(&q)?;
    let jac = model.jacobian(&q, &world_h_root, sole)?;
    let mut nu = nalgebra::DVector::zeros(9);
    nu.rows_mut(0, 6).copy_from_slice(&twist);
    nu.rows_mut(6, 3).copy_from_slice(&dq);
    let sole_twist = jac * nu;
    assert_relative_eq!(sole_twist.amax(), 0.0, epsilon = 1e-10);
    Ok(())
}

#[test]
fn test_base_velocity_matches_pose_derivative() -> TestResult {
    let mut fb = estimator_on_sole()?;
    let q = [0.05, -0.5, 1.0];
    let dq = [0.2, -1.0, 1.5];
    let h = 1e-7;
    let q_next: Vec<f64> = q.iter().zip(dq).map(|(q, v)| q + h * v).collect();

    let twist = fb.compute_base_velocity(&q, &dq)?;
    let p0 = fb.world_h_root(&q)?.translation.vector;
    let p1 = fb.world_h_root(&q_next)?.translation.vector;
    let numeric = (p1 - p0) / h;
    assert_relative_eq!(Vector3::new(twist[0], twist[1], twist[2]), numeric, epsilon = 1e-5);
    Ok(())
}

#[test]
fn test_wrong_lengths_rejected() -> TestResult {
    let mut fb = estimator_on_sole()?;
    assert!(matches!(
        fb.compute_base_velocity(&[0.0; 3], &[0.0; 2]),
        Err(WholeBodyError::Config(ConfigError::DimensionMismatch { .. }))
    ));
    assert!(fb.compute_base_position(&[0.0; 4]).is_err());
    Ok(())
}

/// One prismatic DoF whose model reports a rank-deficient base block, as a
/// chain with the reference coincident with the base origin along the
/// motion axis would.
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
        // Base translation along x only; the other five base directions
        // leave the link unaffected.
        jac[(0, 0)] = 1.0;
        jac[(0, 6)] = 1.0;
        Ok(jac)
    }
}

#[test]
fn test_singular_base_block_is_reported() -> TestResult {
    let mut fb = FloatingBaseEstimator::new();
    fb.init(Arc::new(DegenerateSlider), 1)?;
    fb.set_world_base_link_name("slider")?;

    let result = fb.compute_base_velocity(&[0.0], &[1.0]);
    assert!(matches!(
        result,
        Err(WholeBodyError::Numerical(NumericalError::SingularBaseJacobian { .. }))
    ));
    Ok(())
}

proptest! {
    #[test]
    fn root_reference_gives_identity(
        q0 in -1.5f64..1.5,
        q1 in -1.5f64..1.5,
        q2 in -1.5f64..1.5,
    ) {
        let model = legged_model().map_err(|e| TestCaseError::fail(e.to_string()))?;
        let mut fb = FloatingBaseEstimator::new();
        fb.init(model, 3).map_err(|e| TestCaseError::fail(e.to_string()))?;
        fb.set_world_base_link_name("root_link").map_err(|e| TestCaseError::fail(e.to_string()))?;

        let pose = fb.compute_base_position(&[q0, q1, q2])
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let identity = serialize_frame(&Isometry3::identity());
        for (a, b) in pose.iter().zip(identity) {
            prop_assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn invertible_coupling_round_trips(
        v in proptest::collection::vec(-10.0f64..10.0, 3),
        a in 0.5f64..2.0,
        b in -1.0f64..1.0,
    ) {
        let rows = vec![vec![a, b, 0.0], vec![0.0, a, b], vec![0.0, 0.0, a]];
        let coupling = CouplingTransform::from_rows(3, &rows, &rows)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let mut motor = [0.0; 3];
        let mut back = [0.0; 3];
        coupling.motor_from_joint(&v, &mut motor).map_err(|e| TestCaseError::fail(e.to_string()))?;
        coupling.joint_from_motor(&motor, &mut back).map_err(|e| TestCaseError::fail(e.to_string()))?;
        for (x, y) in back.iter().zip(&v) {
            prop_assert!((x - y).abs() < 1e-9);
        }
    }
}
