//! SO3 - rotations parameterised by a Rodrigues vector
//!
//! The rotation vector `r = θ·u` gives the rotation axis `u` and the angle `θ`.
//! The rotation matrix is the exponential of its skew matrix:
//!
//! ```text
//! R = exp([r]ₓ) = I + sin θ/θ [r]ₓ + (1 - cos θ)/θ² [r]ₓ²
//! ```
//!
//! # Derivatives
//!
//! The partial derivatives of `R` with respect to the rotation-vector
//! components follow Gallego & Yezzi (2015), eq. (9):
//!
//! ```text
//! ∂R/∂rᵢ = ( rᵢ [r]ₓ + [r × (I - R) eᵢ]ₓ ) / θ² · R
//! ```
//!
//! Near the identity the expression is indeterminate, so the second-order
//! expansion `[eᵢ]ₓ + ½([eᵢ]ₓ[r]ₓ + [r]ₓ[eᵢ]ₓ)` is used instead.
//!
//! ## References
//!
//! - Gallego, Yezzi (2015): "A compact formula for the derivative of a 3-D
//!   rotation in exponential coordinates"

use crate::{ManifoldError, ORTHONORMALITY_TOLERANCE, SMALL_ANGLE_THRESHOLD, generator, hat};
use nalgebra::{Matrix3, Quaternion, Rotation3, UnitQuaternion, Vector3};
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// Rotation in 3D, keeping both the Rodrigues vector and its matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SO3 {
    rotation_vector: Vector3<f64>,
    matrix: Matrix3<f64>,
}

impl Display for SO3 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let r = &self.rotation_vector;
        write!(
            f,
            "SO3(rvec: [{:.4}, {:.4}, {:.4}], angle: {:.4})",
            r.x,
            r.y,
            r.z,
            self.angle()
        )
    }
}

impl Default for SO3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl SO3 {
    /// Degrees of freedom of the rotation vector.
    pub const DOF: usize = 3;

    pub fn identity() -> Self {
        SO3 {
            rotation_vector: Vector3::zeros(),
            matrix: Matrix3::identity(),
        }
    }

    /// Build a rotation from a Rodrigues vector.
    ///
    /// Small angles use the first-order quaternion so that no division by the
    /// angle happens.
    pub fn from_rotation_vector(rotation_vector: Vector3<f64>) -> Self {
        let theta_squared = rotation_vector.norm_squared();
        let quaternion = if theta_squared > SMALL_ANGLE_THRESHOLD {
            UnitQuaternion::from_scaled_axis(rotation_vector)
        } else {
            UnitQuaternion::from_quaternion(Quaternion::new(
                1.0,
                rotation_vector.x / 2.0,
                rotation_vector.y / 2.0,
                rotation_vector.z / 2.0,
            ))
        };

        SO3 {
            rotation_vector,
            matrix: quaternion.to_rotation_matrix().into_inner(),
        }
    }

    /// Same as [`from_rotation_vector`](Self::from_rotation_vector) but
    /// rejects NaN and infinite components.
    pub fn try_from_rotation_vector(rotation_vector: Vector3<f64>) -> Result<Self, ManifoldError> {
        if rotation_vector.iter().any(|c| !c.is_finite()) {
            return Err(ManifoldError::NonFinite(format!(
                "rotation vector {:?}",
                rotation_vector.as_slice()
            )));
        }
        Ok(Self::from_rotation_vector(rotation_vector))
    }

    /// Recover the Rodrigues vector of a proper rotation matrix.
    pub fn from_rotation_matrix(matrix: &Matrix3<f64>) -> Result<Self, ManifoldError> {
        if matrix.iter().any(|c| !c.is_finite()) {
            return Err(ManifoldError::NonFinite("rotation matrix".to_string()));
        }
        let orthogonality = (matrix.transpose() * matrix - Matrix3::identity()).norm();
        let determinant = matrix.determinant();
        if orthogonality > ORTHONORMALITY_TOLERANCE
            || (determinant - 1.0).abs() > ORTHONORMALITY_TOLERANCE
        {
            return Err(ManifoldError::InvalidElement(format!(
                "matrix is not a rotation (|RᵀR - I| = {orthogonality:.3e}, det = {determinant:.6})"
            )));
        }
        let rotation_vector = Rotation3::from_matrix_unchecked(*matrix).scaled_axis();
        Ok(Self::from_rotation_vector(rotation_vector))
    }

    #[inline]
    pub fn rotation_vector(&self) -> Vector3<f64> {
        self.rotation_vector
    }

    #[inline]
    pub fn rotation_matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Rotation angle in radians.
    pub fn angle(&self) -> f64 {
        self.rotation_vector.norm()
    }

    /// Rotate a point.
    #[inline]
    pub fn act(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.matrix * point
    }

    pub fn inverse(&self) -> Self {
        SO3 {
            rotation_vector: -self.rotation_vector,
            matrix: self.matrix.transpose(),
        }
    }

    /// Partial derivatives `[∂R/∂r₀, ∂R/∂r₁, ∂R/∂r₂]` of the rotation matrix.
    pub fn matrix_derivatives(&self) -> [Matrix3<f64>; 3] {
        let r = &self.rotation_vector;
        let theta_squared = r.norm_squared();

        if theta_squared <= SMALL_ANGLE_THRESHOLD {
            let r_hat = hat(r);
            return [0, 1, 2].map(|i| {
                let g = generator(i);
                g + 0.5 * (g * r_hat + r_hat * g)
            });
        }

        let r_hat = hat(r);
        let i_minus_r = Matrix3::identity() - self.matrix;
        [0, 1, 2].map(|i| {
            let column = r.cross(&i_minus_r.column(i).into_owned());
            (r[i] * r_hat + hat(&column)) * self.matrix / theta_squared
        })
    }
}
