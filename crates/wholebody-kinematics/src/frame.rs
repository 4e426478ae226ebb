//! Homogeneous transform serialization.
//!
//! Frames cross the query boundary as 16 doubles in row-major order:
//!
//! ```text
//! [ r00 r01 r02 px ]
//! [ r10 r11 r12 py ]   ->   [r00, r01, r02, px, r10, ..., 0, 0, 0, 1]
//! [ r20 r21 r22 pz ]
//! [  0   0   0   1 ]
//! ```

use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};

use crate::SerializedFrame;

/// Largest deviation from orthonormality accepted when deserializing.
const ORTHONORMAL_TOL: f64 = 1e-6;

/// Skew-symmetric matrix of `v`, so that `skew(v) * w == v × w`.
#[must_use]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    #[rustfmt::skip]
    let m = Matrix3::new(
        0.0, -v.z, v.y,
        v.z, 0.0, -v.x,
        -v.y, v.x, 0.0,
    );
    m
}

/// Serialize a rigid transform as a row-major 4×4 matrix.
#[must_use]
pub fn serialize_frame(frame: &Isometry3<f64>) -> SerializedFrame {
    let h = frame.to_homogeneous();
    let mut out = [0.0; 16];
    for (k, slot) in out.iter_mut().enumerate() {
        *slot = h[(k / 4, k % 4)];
    }
    out
}

/// Deserialize a row-major 4×4 matrix into a rigid transform.
///
/// Returns `None` if a value is not finite, the last row is not
/// `[0, 0, 0, 1]`, or the rotation block is not orthonormal.
#[must_use]
pub fn frame_from_serialization(data: &SerializedFrame) -> Option<Isometry3<f64>> {
    if data.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let last_row = [data[12], data[13], data[14], data[15]];
    if last_row
        .iter()
        .zip([0.0, 0.0, 0.0, 1.0])
        .any(|(a, b)| (a - b).abs() > ORTHONORMAL_TOL)
    {
        return None;
    }

    #[rustfmt::skip]
    let rot = Matrix3::new(
        data[0], data[1], data[2],
        data[4], data[5], data[6],
        data[8], data[9], data[10],
    );
    if (rot.transpose() * rot - Matrix3::identity()).amax() > ORTHONORMAL_TOL
        || rot.determinant() < 0.0
    {
        return None;
    }

    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rot));
    let translation = Translation3::new(data[3], data[7], data[11]);
    Some(Isometry3::from_parts(translation, rotation))
}
