//! Joint/motor coupling.
//!
//! Two static `m × n` matrices relate the `n` joints to the `m` motors: one
//! for kinematic quantities (position, velocity, acceleration) and one for
//! torques. The reverse direction uses the Moore-Penrose pseudo-inverse,
//! computed once when the matrices are set.
//!
//! Actuation is assumed stiff: motor torque is obtained from joint torque
//! through the torque matrix alone. No transmission elasticity, friction or
//! rotor dynamics enter the mapping.

use nalgebra::DMatrix;
use wholebody_errors::ConfigError;

/// Singular values below this are treated as zero by the pseudo-inverse.
const PINV_EPS: f64 = 1e-12;

/// Static linear maps between joint space and motor space.
#[derive(Debug, Clone, PartialEq)]
pub struct CouplingTransform {
    joints: usize,
    motors: usize,
    kinematic: DMatrix<f64>,
    kinematic_pinv: DMatrix<f64>,
    torque: DMatrix<f64>,
    torque_pinv: DMatrix<f64>,
    identity: bool,
}

impl CouplingTransform {
    /// One motor per joint, no coupling.
    #[must_use]
    pub fn identity(joints: usize) -> Self {
        let eye = DMatrix::identity(joints, joints);
        Self {
            joints,
            motors: joints,
            kinematic: eye.clone(),
            kinematic_pinv: eye.clone(),
            torque: eye.clone(),
            torque_pinv: eye,
            identity: true,
        }
    }

    /// Build from explicit `motors × joints` matrices.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::CouplingShape`] if either matrix has the wrong
    /// shape and [`ConfigError::InvalidParameter`] if an entry is not finite
    /// or the pseudo-inverse cannot be computed.
    pub fn new(
        joints: usize,
        kinematic: DMatrix<f64>,
        torque: DMatrix<f64>,
    ) -> Result<Self, ConfigError> {
        let motors = kinematic.nrows();
        check_shape("kinematic", &kinematic, motors, joints)?;
        check_shape("torque", &torque, motors, joints)?;

        let kinematic_pinv = pseudo_inverse("kinematic_coupling", &kinematic)?;
        let torque_pinv = pseudo_inverse("torque_coupling", &torque)?;
        let identity = motors == joints
            && kinematic == DMatrix::identity(joints, joints)
            && torque == DMatrix::identity(joints, joints);

        Ok(Self {
            joints,
            motors,
            kinematic,
            kinematic_pinv,
            torque,
            torque_pinv,
            identity,
        })
    }

    /// Build from row-major rows, as loaded from configuration.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new); ragged rows are a shape error.
    pub fn from_rows(
        joints: usize,
        kinematic: &[Vec<f64>],
        torque: &[Vec<f64>],
    ) -> Result<Self, ConfigError> {
        Self::new(
            joints,
            matrix_from_rows("kinematic", kinematic, joints)?,
            matrix_from_rows("torque", torque, joints)?,
        )
    }

    /// Number of joints.
    #[must_use]
    pub fn joints(&self) -> usize {
        self.joints
    }

    /// Number of motors.
    #[must_use]
    pub fn motors(&self) -> usize {
        self.motors
    }

    /// Whether both maps are the identity.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Motor position, velocity or acceleration from the joint quantity.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DimensionMismatch`] on wrong slice lengths.
    pub fn motor_from_joint(&self, joint: &[f64], motor: &mut [f64]) -> Result<(), ConfigError> {
        apply(&self.kinematic, self.identity, joint, motor)
    }

    /// Joint position, velocity or acceleration from the motor quantity.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DimensionMismatch`] on wrong slice lengths.
    pub fn joint_from_motor(&self, motor: &[f64], joint: &mut [f64]) -> Result<(), ConfigError> {
        apply(&self.kinematic_pinv, self.identity, motor, joint)
    }

    /// Motor torque from joint torque.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DimensionMismatch`] on wrong slice lengths.
    pub fn motor_torque_from_joint(
        &self,
        joint: &[f64],
        motor: &mut [f64],
    ) -> Result<(), ConfigError> {
        apply(&self.torque, self.identity, joint, motor)
    }

    /// Joint torque from motor torque.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DimensionMismatch`] on wrong slice lengths.
    pub fn joint_torque_from_motor(
        &self,
        motor: &[f64],
        joint: &mut [f64],
    ) -> Result<(), ConfigError> {
        apply(&self.torque_pinv, self.identity, motor, joint)
    }
}

fn check_shape(
    matrix: &'static str,
    m: &DMatrix<f64>,
    rows: usize,
    cols: usize,
) -> Result<(), ConfigError> {
    if m.nrows() != rows || m.ncols() != cols || (rows == 0 && cols > 0) {
        return Err(ConfigError::CouplingShape {
            matrix,
            rows: m.nrows(),
            cols: m.ncols(),
            expected_rows: rows,
            expected_cols: cols,
        });
    }
    if m.iter().any(|v| !v.is_finite()) {
        return Err(ConfigError::invalid_parameter(matrix, "non-finite entry"));
    }
    Ok(())
}

fn matrix_from_rows(
    matrix: &'static str,
    rows: &[Vec<f64>],
    joints: usize,
) -> Result<DMatrix<f64>, ConfigError> {
    if let Some(bad) = rows.iter().find(|row| row.len() != joints) {
        return Err(ConfigError::CouplingShape {
            matrix,
            rows: rows.len(),
            cols: bad.len(),
            expected_rows: rows.len(),
            expected_cols: joints,
        });
    }
    Ok(DMatrix::from_fn(rows.len(), joints, |i, j| {
        rows.get(i).and_then(|row| row.get(j)).copied().unwrap_or(0.0)
    }))
}

fn pseudo_inverse(name: &'static str, m: &DMatrix<f64>) -> Result<DMatrix<f64>, ConfigError> {
    if m.is_empty() {
        return Ok(DMatrix::zeros(m.ncols(), m.nrows()));
    }
    m.clone()
        .pseudo_inverse(PINV_EPS)
        .map_err(|reason| ConfigError::invalid_parameter(name, reason))
}

fn apply(
    m: &DMatrix<f64>,
    identity: bool,
    input: &[f64],
    output: &mut [f64],
) -> Result<(), ConfigError> {
    if input.len() != m.ncols() {
        return Err(ConfigError::dimension_mismatch(
            "coupling input",
            m.ncols(),
            input.len(),
        ));
    }
    if output.len() != m.nrows() {
        return Err(ConfigError::dimension_mismatch(
            "coupling output",
            m.nrows(),
            output.len(),
        ));
    }
    if identity {
        output.copy_from_slice(input);
        return Ok(());
    }
    for (out, row) in output.iter_mut().zip(m.row_iter()) {
        *out = row.iter().zip(input).map(|(a, b)| a * b).sum();
    }
    Ok(())
}
