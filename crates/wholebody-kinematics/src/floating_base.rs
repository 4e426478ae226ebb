//! Floating-base pose and twist estimation.
//!
//! The world frame is attached to a reference link that is assumed fixed
//! in the world (a foot on the ground, a mounting flange). Its pose relative
//! to the root link follows from forward kinematics, and inverting it gives
//! the root pose in the world:
//!
//! ```text
//! world_H_root = world_H_reference * (root_H_reference(q))^-1
//! ```
//!
//! For the twist, the reference link does not move, so its Jacobian gives
//!
//! ```text
//! 0 = J_base(q) * v_base + J_joints(q) * dq
//! ```
//!
//! and `v_base` is the solution of a 6×6 linear system. A singular `J_base`
//! means the base twist is not observable from this reference link; the
//! estimate is then unavailable for the cycle.

use std::sync::Arc;

use nalgebra::{Isometry3, Matrix6, Vector6};
use tracing::{debug, info};
use wholebody_errors::{ConfigError, LifecycleError, NumericalError, Result};

use crate::frame::serialize_frame;
use crate::model::{KinematicModel, LinkId};
use crate::{SerializedFrame, Twist};

/// `|det(J_base)|` below this is treated as singular.
pub const SINGULAR_DETERMINANT: f64 = 1e-10;

#[derive(Debug)]
struct Bound {
    model: Arc<dyn KinematicModel>,
    root: LinkId,
    reference: LinkId,
}

/// Estimates the root link pose and twist in the reference-link world frame.
#[derive(Debug)]
pub struct FloatingBaseEstimator {
    bound: Option<Bound>,
    dof: usize,
    world_h_reference: Isometry3<f64>,
    reference_h_root: Isometry3<f64>,
    cached_q: Vec<f64>,
    cache_valid: bool,
}

impl Default for FloatingBaseEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl FloatingBaseEstimator {
    /// Create an estimator with no model attached.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bound: None,
            dof: 0,
            world_h_reference: Isometry3::identity(),
            reference_h_root: Isometry3::identity(),
            cached_q: Vec::new(),
            cache_valid: false,
        }
    }

    /// Attach a kinematic model with `dof` joints.
    ///
    /// The reference link defaults to the root link, which puts the world
    /// frame on the base itself.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DimensionMismatch`] if the model does not have
    /// `dof` joints.
    pub fn init(&mut self, model: Arc<dyn KinematicModel>, dof: usize) -> Result<()> {
        if model.dof() != dof {
            let err = ConfigError::dimension_mismatch("kinematic model dof", dof, model.dof());
            return Err(err.into());
        }
        let root = model.root_link();
        info!(dof, root = ?model.link_name(root), "floating base estimator initialized");
        self.bound = Some(Bound {
            model,
            root,
            reference: root,
        });
        self.resize(dof);
        Ok(())
    }

    /// Change the number of joints.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotInitialized`] before [`init`](Self::init)
    /// and [`ConfigError::DimensionMismatch`] if the attached model does not
    /// have `dof` joints.
    pub fn change_dof(&mut self, dof: usize) -> Result<()> {
        let bound = self.bound.as_ref().ok_or(LifecycleError::NotInitialized)?;
        if bound.model.dof() != dof {
            let err = ConfigError::dimension_mismatch("kinematic model dof", dof, bound.model.dof());
            return Err(err.into());
        }
        self.resize(dof);
        Ok(())
    }

    fn resize(&mut self, dof: usize) {
        self.dof = dof;
        self.cached_q.clear();
        self.cached_q.resize(dof, 0.0);
        self.cache_valid = false;
    }

    /// Attach the world frame to the link called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownLink`] if the model has no such link
    /// (the previous reference is kept) and
    /// [`LifecycleError::NotInitialized`] before [`init`](Self::init).
    pub fn set_world_base_link_name(&mut self, name: &str) -> Result<()> {
        let bound = self.bound.as_mut().ok_or(LifecycleError::NotInitialized)?;
        let link = bound
            .model
            .link_id(name)
            .ok_or_else(|| ConfigError::unknown_link(name))?;
        bound.reference = link;
        self.cached_q.iter_mut().for_each(|q| *q = 0.0);
        self.cache_valid = false;
        self.refresh_reference(None)?;
        info!(reference = name, "world reference link set");
        Ok(())
    }

    /// Root link of the attached model.
    #[must_use]
    pub fn root_link(&self) -> Option<LinkId> {
        self.bound.as_ref().map(|b| b.root)
    }

    /// Current reference link.
    #[must_use]
    pub fn reference_link(&self) -> Option<LinkId> {
        self.bound.as_ref().map(|b| b.reference)
    }

    /// Whether a model is attached.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.bound.is_some()
    }

    /// Number of joints.
    #[must_use]
    pub fn dof(&self) -> usize {
        self.dof
    }

    /// Root pose in the world frame.
    ///
    /// # Errors
    ///
    /// Fails before init or if `q` does not have `dof` entries.
    pub fn world_h_root(&mut self, q: &[f64]) -> Result<Isometry3<f64>> {
        self.check_len("joint positions", q)?;
        let stale = !self.cache_valid
            || self
                .cached_q
                .iter()
                .zip(q)
                .any(|(a, b)| a.to_bits() != b.to_bits());
        if stale {
            self.refresh_reference(Some(q))?;
        }
        Ok(self.world_h_reference * self.reference_h_root)
    }

    /// Root pose in the world frame, serialized row-major.
    ///
    /// # Errors
    ///
    /// Fails before init, on a dimension mismatch, or if the pose is not
    /// finite.
    pub fn compute_base_position(&mut self, q: &[f64]) -> Result<SerializedFrame> {
        let frame = serialize_frame(&self.world_h_root(q)?);
        if frame.iter().any(|v| !v.is_finite()) {
            return Err(NumericalError::NonFinite("base pose").into());
        }
        Ok(frame)
    }

    /// Root twist in the world frame, linear then angular.
    ///
    /// # Errors
    ///
    /// Returns [`NumericalError::SingularBaseJacobian`] when the base block
    /// of the reference Jacobian cannot be factorized, and
    /// [`NumericalError::NonFinite`] if the solution is not finite. Fails
    /// before init or on a dimension mismatch.
    ///
    /// With a [`KinematicTree`](crate::KinematicTree) the base block is
    /// `[I, -skew(r); 0, I]`, whose determinant is always 1, so the singular
    /// case only arises with other [`KinematicModel`] implementations.
    pub fn compute_base_velocity(&mut self, q: &[f64], dq: &[f64]) -> Result<Twist> {
        self.check_len("joint velocities", dq)?;
        let world_h_root = self.world_h_root(q)?;
        let bound = self.bound.as_ref().ok_or(LifecycleError::NotInitialized)?;
        let jac = bound.model.jacobian(q, &world_h_root, bound.reference)?;
        if jac.ncols() != 6 + self.dof {
            let err = ConfigError::dimension_mismatch("jacobian columns", 6 + self.dof, jac.ncols());
            return Err(err.into());
        }

        let base_block: Matrix6<f64> = jac.fixed_columns::<6>(0).into_owned();
        let mut rhs = Vector6::<f64>::zeros();
        for (j, dq_j) in dq.iter().enumerate() {
            rhs -= jac.column(6 + j) * *dq_j;
        }

        let determinant = base_block.determinant();
        if !determinant.is_finite() || determinant.abs() < SINGULAR_DETERMINANT {
            debug!(determinant, "base Jacobian block singular");
            return Err(NumericalError::SingularBaseJacobian {
                determinant: determinant.abs(),
            }
            .into());
        }
        let twist = base_block
            .lu()
            .solve(&rhs)
            .ok_or(NumericalError::SingularBaseJacobian {
                determinant: determinant.abs(),
            })?;
        if twist.iter().any(|v| !v.is_finite()) {
            return Err(NumericalError::NonFinite("base velocity").into());
        }

        let mut out = [0.0; 6];
        out.copy_from_slice(twist.as_slice());
        Ok(out)
    }

    fn check_len(&self, what: &'static str, v: &[f64]) -> Result<()> {
        if self.bound.is_none() {
            return Err(LifecycleError::NotInitialized.into());
        }
        if v.len() != self.dof {
            return Err(ConfigError::dimension_mismatch(what, self.dof, v.len()).into());
        }
        Ok(())
    }

    /// Recompute `reference_H_root` at `q`, or at the cached configuration.
    fn refresh_reference(&mut self, q: Option<&[f64]>) -> Result<()> {
        let bound = self.bound.as_ref().ok_or(LifecycleError::NotInitialized)?;
        if let Some(q) = q {
            self.cached_q.copy_from_slice(q);
        }
        let root_h_reference =
            bound
                .model
                .forward_kinematics(&self.cached_q, &Isometry3::identity(), bound.reference)?;
        self.reference_h_root = root_h_reference.inverse();
        self.cache_valid = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Joint, KinematicTree};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    fn leg() -> std::result::Result<Arc<KinematicTree>, ConfigError> {
        let mut tree = KinematicTree::new("root_link");
        tree.add_link(
            "hip",
            "root_link",
            Isometry3::translation(0.0, 0.1, -0.1),
            Joint::Revolute(Vector3::y_axis()),
        )?;
        tree.add_link(
            "knee",
            "hip",
            Isometry3::translation(0.0, 0.0, -0.4),
            Joint::Revolute(Vector3::y_axis()),
        )?;
        tree.add_link(
            "sole",
            "knee",
            Isometry3::translation(0.05, 0.0, -0.4),
            Joint::Fixed,
        )?;
        Ok(Arc::new(tree))
    }

    #[test]
    fn test_operations_before_init_fail() {
        let mut fb = FloatingBaseEstimator::new();
        assert!(!fb.is_initialized());
        assert!(fb.compute_base_position(&[]).is_err());
        assert!(fb.set_world_base_link_name("sole").is_err());
        assert!(fb.change_dof(2).is_err());
    }

    #[test]
    fn test_default_reference_is_root() -> TestResult {
        let mut fb = FloatingBaseEstimator::new();
        fb.init(leg()?, 2)?;
        let pose = fb.compute_base_position(&[0.3, -0.8])?;
        let identity = serialize_frame(&Isometry3::identity());
        for (a, b) in pose.iter().zip(identity) {
            assert_relative_eq!(*a, b, epsilon = 1e-15);
        }
        Ok(())
    }

    #[test]
    fn test_unknown_reference_keeps_previous() -> TestResult {
        let mut fb = FloatingBaseEstimator::new();
        fb.init(leg()?, 2)?;
        fb.set_world_base_link_name("sole")?;
        let before = fb.reference_link();
        assert!(fb.set_world_base_link_name("l_hand").is_err());
        assert_eq!(fb.reference_link(), before);
        Ok(())
    }

    #[test]
    fn test_base_above_sole() -> TestResult {
        let mut fb = FloatingBaseEstimator::new();
        fb.init(leg()?, 2)?;
        fb.set_world_base_link_name("sole")?;
        let world_h_root = fb.world_h_root(&[0.0, 0.0])?;
        assert_relative_eq!(
            world_h_root.translation.vector,
            Vector3::new(-0.05, -0.1, 0.9),
            epsilon = 1e-12
        );
        Ok(())
    }

    #[test]
    fn test_change_dof_must_match_model() -> TestResult {
        let mut fb = FloatingBaseEstimator::new();
        assert!(fb.init(leg()?, 3).is_err());
        fb.init(leg()?, 2)?;
        assert!(fb.change_dof(5).is_err());
        fb.change_dof(2)?;
        assert_eq!(fb.dof(), 2);
        Ok(())
    }
}
