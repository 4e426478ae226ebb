//! Tree-structured kinematic model.
//!
//! Links are stored in insertion order and every link names a parent that
//! was inserted before it, so a single forward pass resolves all poses.
//! Each link is attached through a fixed offset followed by a joint motion:
//!
//! ```text
//! world_H_link = world_H_parent * parent_H_joint * motion(q_i)
//! ```

use std::collections::HashMap;

use nalgebra::{Isometry3, Matrix3, Matrix6xX, Translation3, Unit, UnitQuaternion, Vector3};
use wholebody_errors::ConfigError;

use crate::frame::skew;
use crate::model::{KinematicModel, LinkId};

/// Joint connecting a link to its parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Joint {
    /// Rigid attachment, no degree of freedom
    Fixed,
    /// Rotation about an axis expressed in the joint frame
    Revolute(Unit<Vector3<f64>>),
    /// Translation along an axis expressed in the joint frame
    Prismatic(Unit<Vector3<f64>>),
}

impl Joint {
    fn motion(&self, position: f64) -> Isometry3<f64> {
        match self {
            Joint::Fixed => Isometry3::identity(),
            Joint::Revolute(axis) => Isometry3::from_parts(
                Translation3::identity(),
                UnitQuaternion::from_axis_angle(axis, position),
            ),
            Joint::Prismatic(axis) => Isometry3::from_parts(
                Translation3::from(axis.into_inner() * position),
                UnitQuaternion::identity(),
            ),
        }
    }
}

#[derive(Debug, Clone)]
struct Link {
    name: String,
    parent: Option<LinkId>,
    parent_h_joint: Isometry3<f64>,
    joint: Joint,
    dof_index: Option<usize>,
}

/// Kinematic tree of rigid links and 1-DoF joints.
#[derive(Debug, Clone)]
pub struct KinematicTree {
    links: Vec<Link>,
    names: HashMap<String, LinkId>,
    dof: usize,
}

impl KinematicTree {
    /// Create a tree holding only the root link.
    pub fn new(root_name: impl Into<String>) -> Self {
        let name = root_name.into();
        let mut names = HashMap::new();
        names.insert(name.clone(), LinkId(0));
        Self {
            links: vec![Link {
                name,
                parent: None,
                parent_h_joint: Isometry3::identity(),
                joint: Joint::Fixed,
                dof_index: None,
            }],
            names,
            dof: 0,
        }
    }

    /// Attach a link to `parent`.
    ///
    /// Non-fixed joints take the next degree-of-freedom index.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownLink`] if `parent` does not exist and
    /// [`ConfigError::InvalidParameter`] if `name` is already taken.
    pub fn add_link(
        &mut self,
        name: impl Into<String>,
        parent: &str,
        parent_h_joint: Isometry3<f64>,
        joint: Joint,
    ) -> Result<LinkId, ConfigError> {
        let name = name.into();
        let parent = self
            .names
            .get(parent)
            .copied()
            .ok_or_else(|| ConfigError::unknown_link(parent))?;
        if self.names.contains_key(&name) {
            return Err(ConfigError::invalid_parameter("link_name", name));
        }

        let dof_index = match joint {
            Joint::Fixed => None,
            Joint::Revolute(_) | Joint::Prismatic(_) => {
                self.dof += 1;
                Some(self.dof - 1)
            }
        };
        let id = LinkId(self.links.len());
        self.names.insert(name.clone(), id);
        self.links.push(Link {
            name,
            parent: Some(parent),
            parent_h_joint,
            joint,
            dof_index,
        });
        Ok(id)
    }

    /// Number of links, root included.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    fn check_inputs(&self, q: &[f64], link: LinkId) -> Result<(), ConfigError> {
        if q.len() != self.dof {
            return Err(ConfigError::dimension_mismatch("joint positions", self.dof, q.len()));
        }
        if link.0 >= self.links.len() {
            return Err(ConfigError::unknown_link(link.to_string()));
        }
        Ok(())
    }

    /// Links from the root down to `link`, root first.
    fn chain(&self, link: LinkId) -> Vec<LinkId> {
        let mut chain = Vec::new();
        let mut cursor = Some(link);
        while let Some(id) = cursor {
            chain.push(id);
            cursor = self.links.get(id.0).and_then(|l| l.parent);
        }
        chain.reverse();
        chain
    }

    /// World pose of every joint frame and link frame along `chain`.
    fn chain_poses(
        &self,
        q: &[f64],
        world_h_root: &Isometry3<f64>,
        chain: &[LinkId],
    ) -> Vec<(Isometry3<f64>, Isometry3<f64>)> {
        let mut poses = Vec::with_capacity(chain.len());
        let mut world_h_parent = Isometry3::identity();
        for id in chain {
            let Some(link) = self.links.get(id.0) else {
                break;
            };
            let (world_h_joint, world_h_link) = if link.parent.is_none() {
                (*world_h_root, *world_h_root)
            } else {
                let world_h_joint = world_h_parent * link.parent_h_joint;
                let position = link.dof_index.and_then(|i| q.get(i)).copied().unwrap_or(0.0);
                (world_h_joint, world_h_joint * link.joint.motion(position))
            };
            poses.push((world_h_joint, world_h_link));
            world_h_parent = world_h_link;
        }
        poses
    }
}

impl KinematicModel for KinematicTree {
    fn dof(&self) -> usize {
        self.dof
    }

    fn root_link(&self) -> LinkId {
        LinkId(0)
    }

    fn link_id(&self, name: &str) -> Option<LinkId> {
        self.names.get(name).copied()
    }

    fn link_name(&self, link: LinkId) -> Option<&str> {
        self.links.get(link.0).map(|l| l.name.as_str())
    }

    fn forward_kinematics(
        &self,
        q: &[f64],
        world_h_root: &Isometry3<f64>,
        link: LinkId,
    ) -> Result<Isometry3<f64>, ConfigError> {
        self.check_inputs(q, link)?;
        let chain = self.chain(link);
        let poses = self.chain_poses(q, world_h_root, &chain);
        poses
            .last()
            .map(|(_, world_h_link)| *world_h_link)
            .ok_or_else(|| ConfigError::unknown_link(link.to_string()))
    }

    fn jacobian(
        &self,
        q: &[f64],
        world_h_root: &Isometry3<f64>,
        link: LinkId,
    ) -> Result<Matrix6xX<f64>, ConfigError> {
        self.check_inputs(q, link)?;
        let chain = self.chain(link);
        let poses = self.chain_poses(q, world_h_root, &chain);
        let p_link = poses
            .last()
            .map(|(_, world_h_link)| world_h_link.translation.vector)
            .ok_or_else(|| ConfigError::unknown_link(link.to_string()))?;
        let p_root = world_h_root.translation.vector;

        let mut jac = Matrix6xX::<f64>::zeros(6 + self.dof);

        // v_link = v_root + ω_root × (p_link - p_root)
        jac.fixed_view_mut::<3, 3>(0, 0).copy_from(&Matrix3::identity());
        jac.fixed_view_mut::<3, 3>(0, 3).copy_from(&(-skew(&(p_link - p_root))));
        jac.fixed_view_mut::<3, 3>(3, 3).copy_from(&Matrix3::identity());

        for (id, (world_h_joint, _)) in chain.iter().zip(&poses) {
            let Some(node) = self.links.get(id.0) else {
                continue;
            };
            let Some(column) = node.dof_index.map(|i| 6 + i) else {
                continue;
            };
            let (linear, angular) = match node.joint {
                Joint::Fixed => continue,
                Joint::Revolute(axis) => {
                    let axis_w = world_h_joint.rotation * axis.into_inner();
                    let lever = p_link - world_h_joint.translation.vector;
                    (axis_w.cross(&lever), axis_w)
                }
                Joint::Prismatic(axis) => {
                    (world_h_joint.rotation * axis.into_inner(), Vector3::zeros())
                }
            };
            jac.fixed_view_mut::<3, 1>(0, column).copy_from(&linear);
            jac.fixed_view_mut::<3, 1>(3, column).copy_from(&angular);
        }
        Ok(jac)
    }
}
