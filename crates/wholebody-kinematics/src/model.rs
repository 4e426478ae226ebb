//! Kinematic model capability.

use std::fmt;

use nalgebra::{Isometry3, Matrix6xX};
use serde::{Deserialize, Serialize};
use wholebody_errors::ConfigError;

/// Index of a link inside a kinematic model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(pub usize);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// What the floating-base estimator needs from a robot model.
///
/// Poses are world-frame rigid transforms. `world_h_root` is the pose of the
/// root link; `q` holds one position per degree of freedom.
///
/// The Jacobian of a link maps the generalized velocity
/// `[v_root; ω_root; dq]` to the link twist `[v_link; ω_link]`, everything
/// in world coordinates, with `v` the velocity of the frame origin. It has 6
/// rows and `6 + dof()` columns.
pub trait KinematicModel: Send + Sync + fmt::Debug {
    /// Number of joint degrees of freedom.
    fn dof(&self) -> usize;

    /// The floating-base (root) link.
    fn root_link(&self) -> LinkId;

    /// Resolve a link name.
    fn link_id(&self, name: &str) -> Option<LinkId>;

    /// Name of a link, if it exists.
    fn link_name(&self, link: LinkId) -> Option<&str>;

    /// World pose of `link`.
    ///
    /// # Errors
    ///
    /// Fails on an unknown link or if `q` does not have `dof()` entries.
    fn forward_kinematics(
        &self,
        q: &[f64],
        world_h_root: &Isometry3<f64>,
        link: LinkId,
    ) -> Result<Isometry3<f64>, ConfigError>;

    /// Jacobian of `link`, 6 × (6 + dof).
    ///
    /// # Errors
    ///
    /// Fails on an unknown link or if `q` does not have `dof()` entries.
    fn jacobian(
        &self,
        q: &[f64],
        world_h_root: &Isometry3<f64>,
        link: LinkId,
    ) -> Result<Matrix6xX<f64>, ConfigError>;
}
