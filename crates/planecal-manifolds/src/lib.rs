//! Rotation and rigid-pose primitives for planar camera calibration.
//!
//! Camera poses are parameterised by an axis-angle (Rodrigues) vector and a
//! translation, the same layout used by OpenCV's `solvePnP`/`calibrateCamera`:
//!
//! ```text
//! p_cam = R(r) · p_world + t,    R(r) = exp([r]ₓ)
//! ```
//!
//! Besides the forward map, [`SO3::matrix_derivatives`] returns the three
//! partial derivatives `∂R/∂rᵢ`, which the inverse projection uses to push pose
//! covariances through the plane intersection.

use nalgebra::{Matrix3, Vector3};

pub mod pose;
pub mod so3;

pub use pose::Pose;
pub use so3::SO3;

/// Squared angle below which the Rodrigues map and its derivatives switch to
/// their Taylor expansions.
pub const SMALL_ANGLE_THRESHOLD: f64 = 1e-10;

/// Tolerance used when checking that a matrix is a proper rotation.
pub const ORTHONORMALITY_TOLERANCE: f64 = 1e-6;

/// Errors raised when building rotations or poses.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ManifoldError {
    #[error("Invalid manifold element: {0}")]
    InvalidElement(String),

    #[error("Non-finite component in {0}")]
    NonFinite(String),
}

/// Skew-symmetric matrix such that `hat(v) · w = v × w`.
///
/// ```text
/// [v]ₓ = [ 0  -vz  vy ]
///        [ vz  0  -vx ]
///        [-vy  vx  0  ]
/// ```
#[inline]
pub fn hat(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// `i`-th generator of so(3), i.e. `hat(eᵢ)`.
#[inline]
pub fn generator(i: usize) -> Matrix3<f64> {
    let mut axis = Vector3::zeros();
    axis[i] = 1.0;
    hat(&axis)
}
