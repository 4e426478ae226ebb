//! Kinematics for whole-body state estimation.
//!
//! - [`KinematicModel`]: the capability the estimator needs from a robot
//!   model. Given joint positions and a base pose it returns the pose and
//!   the Jacobian of any link. [`KinematicTree`] is a serial/branched
//!   implementation built from fixed link offsets and 1-DoF joints.
//! - [`CouplingTransform`]: static linear maps between joint space and motor
//!   space, for kinematic quantities and for torques.
//! - [`FloatingBaseEstimator`]: pose and twist of the root link relative to
//!   a world frame attached to a chosen reference link.
//!
//! Twists and Jacobian rows are ordered linear then angular, expressed in
//! the world frame. Jacobian columns start with the six base coordinates.

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![deny(unused_must_use)]
#![warn(missing_docs)]

pub mod coupling;
pub mod floating_base;
pub mod frame;
pub mod model;
pub mod prelude;
pub mod tree;

pub use coupling::CouplingTransform;
pub use floating_base::FloatingBaseEstimator;
pub use frame::{frame_from_serialization, serialize_frame, skew};
pub use model::{KinematicModel, LinkId};
pub use tree::{Joint, KinematicTree};

/// Serialized homogeneous transform, 4×4 row-major.
pub type SerializedFrame = [f64; 16];

/// Twist: linear velocity then angular velocity.
pub type Twist = [f64; 6];
