//! Rigid world-to-camera pose `p_cam = R · p_world + t`.

use crate::{ManifoldError, SO3};
use nalgebra::{Matrix3, Vector3, Vector6};
use std::fmt;

/// Rigid transform stored as a rotation and a translation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pose {
    rotation: SO3,
    translation: Vector3<f64>,
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = &self.translation;
        write!(
            f,
            "Pose({}, t: [{:.4}, {:.4}, {:.4}])",
            self.rotation, t.x, t.y, t.z
        )
    }
}

impl Pose {
    /// Degrees of freedom: three for the rotation vector, three for the translation.
    pub const DOF: usize = 6;

    pub fn new(rotation: SO3, translation: Vector3<f64>) -> Self {
        Pose {
            rotation,
            translation,
        }
    }

    /// Build a pose from a Rodrigues vector and a translation, rejecting
    /// non-finite input.
    pub fn from_rotation_vector(
        rotation_vector: Vector3<f64>,
        translation: Vector3<f64>,
    ) -> Result<Self, ManifoldError> {
        if translation.iter().any(|c| !c.is_finite()) {
            return Err(ManifoldError::NonFinite(format!(
                "translation {:?}",
                translation.as_slice()
            )));
        }
        Ok(Pose {
            rotation: SO3::try_from_rotation_vector(rotation_vector)?,
            translation,
        })
    }

    pub fn identity() -> Self {
        Pose::default()
    }

    #[inline]
    pub fn rotation(&self) -> &SO3 {
        &self.rotation
    }

    #[inline]
    pub fn rotation_matrix(&self) -> &Matrix3<f64> {
        self.rotation.rotation_matrix()
    }

    #[inline]
    pub fn translation(&self) -> &Vector3<f64> {
        &self.translation
    }

    /// Pose packed as `[r₀, r₁, r₂, t₀, t₁, t₂]`.
    pub fn to_vector(&self) -> Vector6<f64> {
        let r = self.rotation.rotation_vector();
        let t = &self.translation;
        Vector6::new(r.x, r.y, r.z, t.x, t.y, t.z)
    }

    /// Inverse of [`to_vector`](Self::to_vector).
    pub fn from_vector(vector: &Vector6<f64>) -> Result<Self, ManifoldError> {
        Self::from_rotation_vector(
            vector.fixed_rows::<3>(0).into_owned(),
            vector.fixed_rows::<3>(3).into_owned(),
        )
    }

    /// Map a world point into the camera frame.
    #[inline]
    pub fn transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.act(point) + self.translation
    }

    /// Map a camera-frame point back into the world frame.
    pub fn inverse_transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse().act(&(point - self.translation))
    }
}
