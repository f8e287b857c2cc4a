//! Inverse projection: pixels to points on the world plane `z = 0`.
//!
//! Three stages, each usable on its own:
//!
//! 1. [`pixel_to_distorted`]: `(u, v)` to distorted homogeneous `(xpp, ypp)`
//! 2. [`distorted_to_undistorted`]: removes the radial distortion, `(xp, yp)`
//! 3. [`undistorted_to_plane`]: intersects the ray with the world plane
//!
//! # Plane intersection
//!
//! For `P = (X, Y, 0)` the camera point is `X·r₀ + Y·r₁ + t`. Requiring it to
//! project to `(xp, yp)` gives the linear system
//!
//! ```text
//! [a b] [X]   [-c]      a = R₀₀ - R₂₀·xp   b = R₀₁ - R₂₁·xp   c = t₀ - t₂·xp
//! [d e] [Y] = [-f]      d = R₁₀ - R₂₀·yp   e = R₁₁ - R₂₁·yp   f = t₁ - t₂·yp
//! ```
//!
//! solved by Cramer's rule with determinant `q = a·e - d·b`.

use crate::{
    camera::{CameraExtrinsics, CameraIntrinsics, PlanarCamera},
    error::{PlanecalError, PlanecalResult},
};
use nalgebra::{Matrix2, Vector2, Vector3};
use planecal_distortion::{Distortion, RadialDistortion};
use planecal_manifolds::Pose;
use rayon::prelude::*;
use tracing::debug;

/// Solved plane-intersection system, kept for the Jacobians.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlaneIntersection {
    /// Inverse of `[[a, b], [d, e]]`.
    pub inverse: Matrix2<f64>,
    /// `(X, Y)`
    pub point: Vector2<f64>,
}

/// Stage 1: pixel to distorted homogeneous coordinates.
#[inline]
pub fn pixel_to_distorted(pixel: &Vector2<f64>, intrinsics: &CameraIntrinsics) -> Vector2<f64> {
    intrinsics.pixel_to_normalized(pixel)
}

/// Stage 2: distorted to undistorted homogeneous coordinates.
pub fn distorted_to_undistorted(
    distorted: &Vector2<f64>,
    distortion: &Distortion,
) -> PlanecalResult<Vector2<f64>> {
    let ratio = distortion.radial_undistort(distorted.norm())?;
    Ok(distorted / ratio)
}

/// Stage 3: undistorted homogeneous coordinates to `(X, Y)` on the world plane.
pub fn undistorted_to_plane(
    undistorted: &Vector2<f64>,
    pose: &Pose,
    plane_tolerance: f64,
) -> PlanecalResult<Vector2<f64>> {
    Ok(intersect_plane(undistorted, pose, plane_tolerance)?.point)
}

pub(crate) fn intersect_plane(
    undistorted: &Vector2<f64>,
    pose: &Pose,
    plane_tolerance: f64,
) -> PlanecalResult<PlaneIntersection> {
    let rotation = pose.rotation_matrix();
    let t = pose.translation();
    let (xp, yp) = (undistorted.x, undistorted.y);

    let a = rotation[(0, 0)] - rotation[(2, 0)] * xp;
    let b = rotation[(0, 1)] - rotation[(2, 1)] * xp;
    let c = t.x - t.z * xp;
    let d = rotation[(1, 0)] - rotation[(2, 0)] * yp;
    let e = rotation[(1, 1)] - rotation[(2, 1)] * yp;
    let f = t.y - t.z * yp;

    let q = a * e - d * b;
    if !(q.abs() >= plane_tolerance) {
        return Err(PlanecalError::SingularGeometry { determinant: q });
    }

    Ok(PlaneIntersection {
        inverse: Matrix2::new(e, -b, -d, a) / q,
        point: Vector2::new((f * b - c * e) / q, (c * d - f * a) / q),
    })
}

impl PlanarCamera {
    /// Back-project a single pixel onto the world plane.
    pub fn unproject_point(&self, pixel: &Vector2<f64>) -> PlanecalResult<Vector3<f64>> {
        let distorted = pixel_to_distorted(pixel, self.intrinsics());
        let undistorted = distorted_to_undistorted(&distorted, self.distortion())?;
        let plane =
            undistorted_to_plane(&undistorted, self.pose(), self.tolerances().plane_tolerance)?;
        Ok(Vector3::new(plane.x, plane.y, 0.0))
    }

    /// Back-project a batch of pixels. Failures are reported per point.
    pub fn unproject_points(&self, pixels: &[Vector2<f64>]) -> Vec<PlanecalResult<Vector3<f64>>> {
        let unprojected: Vec<_> = pixels.par_iter().map(|p| self.unproject_point(p)).collect();

        let failures = unprojected.iter().filter(|r| r.is_err()).count();
        if failures > 0 {
            debug!(
                model = %self.model(),
                failures,
                total = pixels.len(),
                "inverse projection failed for some points"
            );
        }
        unprojected
    }
}

/// Back-project pixels with the given camera parameters.
pub fn unproject(
    pixel_points: &[Vector2<f64>],
    extrinsics: &CameraExtrinsics,
    intrinsics: &CameraIntrinsics,
    distortion: &Distortion,
) -> PlanecalResult<Vec<PlanecalResult<Vector3<f64>>>> {
    let camera = PlanarCamera::new(*intrinsics, *extrinsics, distortion.clone())?;
    Ok(camera.unproject_points(pixel_points))
}
