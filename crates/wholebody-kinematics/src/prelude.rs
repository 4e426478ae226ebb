//! Prelude module for convenient imports.

pub use crate::coupling::CouplingTransform;
pub use crate::floating_base::FloatingBaseEstimator;
pub use crate::frame::{frame_from_serialization, serialize_frame};
pub use crate::model::{KinematicModel, LinkId};
pub use crate::tree::{Joint, KinematicTree};
pub use crate::{SerializedFrame, Twist};
