//! Direct projection: world points to pixels.
//!
//! ```text
//! p_c  = R(r)·P + t
//! x'   = (x_c / z_c, y_c / z_c)
//! x''  = q(‖x'‖) · x'
//! uv   = (fx·x''₀ + cx, fy·x''₁ + cy)
//! ```

use crate::{
    camera::{CameraExtrinsics, CameraIntrinsics, PlanarCamera},
    error::{PlanecalError, PlanecalResult},
};
use nalgebra::{Vector2, Vector3};
use planecal_distortion::{Distortion, RadialDistortion};
use rayon::prelude::*;
use tracing::debug;

impl PlanarCamera {
    /// Project a single world point.
    ///
    /// # Errors
    ///
    /// [`PlanecalError::DegenerateGeometry`] when the point lies (nearly) in the
    /// camera's principal plane, or a distortion domain error.
    pub fn project_point(&self, point: &Vector3<f64>) -> PlanecalResult<Vector2<f64>> {
        let camera_point = self.pose().transform_point(point);
        if !(camera_point.z.abs() >= self.tolerances().depth_tolerance) {
            return Err(PlanecalError::DegenerateGeometry {
                depth: camera_point.z,
            });
        }

        let normalized = Vector2::new(
            camera_point.x / camera_point.z,
            camera_point.y / camera_point.z,
        );
        let ratio = self.distortion().radial_distort(normalized.norm())?;
        Ok(self.intrinsics().normalized_to_pixel(&(normalized * ratio)))
    }

    /// Project a batch of world points. Failures are reported per point.
    pub fn project_points(&self, points: &[Vector3<f64>]) -> Vec<PlanecalResult<Vector2<f64>>> {
        let projected: Vec<_> = points.par_iter().map(|p| self.project_point(p)).collect();

        let failures = projected.iter().filter(|r| r.is_err()).count();
        if failures > 0 {
            debug!(
                model = %self.model(),
                failures,
                total = points.len(),
                "direct projection failed for some points"
            );
        }
        projected
    }
}

/// Project world points with the given camera parameters.
///
/// The outer error covers invalid camera parameters; per-point failures are
/// reported in the returned vector.
pub fn project(
    world_points: &[Vector3<f64>],
    extrinsics: &CameraExtrinsics,
    intrinsics: &CameraIntrinsics,
    distortion: &Distortion,
) -> PlanecalResult<Vec<PlanecalResult<Vector2<f64>>>> {
    let camera = PlanarCamera::new(*intrinsics, *extrinsics, distortion.clone())?;
    Ok(camera.project_points(world_points))
}
