//! Residual functions handed to external least-squares optimizers.
//!
//! Both residuals are pure functions of the flat parameter vector (see
//! [`codec`](crate::codec)) and return `2N` entries ordered `[e₀ₓ, e₀ᵧ, e₁ₓ, …]`.

use crate::{
    camera::PlanarCamera,
    codec::{format_camera, retrieve_parameters},
    error::{PlanecalError, PlanecalResult, check_same_length},
};
use nalgebra::{DVector, Vector2, Vector3};
use planecal_distortion::{ModelKind, RadialDistortion};

/// Reprojection residual `project(world) - observed` in pixels.
///
/// Any point that fails to project fails the whole evaluation.
pub fn residual_direct(
    params: &DVector<f64>,
    world_points: &[Vector3<f64>],
    pixel_points: &[Vector2<f64>],
    kind: ModelKind,
) -> PlanecalResult<DVector<f64>> {
    check_same_length("world/pixel correspondences", world_points.len(), pixel_points.len())?;
    let camera = retrieve_parameters(params, kind)?;
    let projected = camera.project_points(world_points);
    flatten_differences(projected.into_iter(), pixel_points, |p| p)
}

/// Back-projection residual `unproject(observed).xy - world.xy` in world units.
///
/// Any point that fails to back-project fails the whole evaluation.
pub fn residual_inverse(
    params: &DVector<f64>,
    world_points: &[Vector3<f64>],
    pixel_points: &[Vector2<f64>],
    kind: ModelKind,
) -> PlanecalResult<DVector<f64>> {
    check_same_length("world/pixel correspondences", world_points.len(), pixel_points.len())?;
    let camera = retrieve_parameters(params, kind)?;
    let targets: Vec<Vector2<f64>> = world_points.iter().map(|p| p.xy()).collect();
    let unprojected = camera.unproject_points(pixel_points);
    flatten_differences(unprojected.into_iter(), &targets, |p| p.xy())
}

fn flatten_differences<T>(
    estimates: impl Iterator<Item = PlanecalResult<T>>,
    targets: &[Vector2<f64>],
    to_plane: impl Fn(T) -> Vector2<f64>,
) -> PlanecalResult<DVector<f64>> {
    let mut residuals = DVector::zeros(2 * targets.len());
    for (i, (estimate, target)) in estimates.zip(targets).enumerate() {
        let difference = to_plane(estimate?) - target;
        residuals[2 * i] = difference.x;
        residuals[2 * i + 1] = difference.y;
    }
    Ok(residuals)
}

/// Root-mean-square point error of a flattened residual vector.
pub fn rms_error(residuals: &DVector<f64>) -> f64 {
    let points = residuals.len() / 2;
    if points == 0 {
        return 0.0;
    }
    (residuals.norm_squared() / points as f64).sqrt()
}

/// Single interface over a distortion family: packing, unpacking and the
/// optimizer residuals.
pub trait CalibrationModel {
    fn format_parameters(&self, camera: &PlanarCamera) -> PlanecalResult<DVector<f64>>;

    fn retrieve_parameters(&self, params: &DVector<f64>) -> PlanecalResult<PlanarCamera>;

    fn residual_direct(
        &self,
        params: &DVector<f64>,
        world_points: &[Vector3<f64>],
        pixel_points: &[Vector2<f64>],
    ) -> PlanecalResult<DVector<f64>>;

    fn residual_inverse(
        &self,
        params: &DVector<f64>,
        world_points: &[Vector3<f64>],
        pixel_points: &[Vector2<f64>],
    ) -> PlanecalResult<DVector<f64>>;
}

impl CalibrationModel for ModelKind {
    fn format_parameters(&self, camera: &PlanarCamera) -> PlanecalResult<DVector<f64>> {
        let camera_kind = camera.distortion().kind();
        if camera_kind != *self {
            return Err(PlanecalError::InvalidInput(format!(
                "camera uses the {camera_kind} model, expected {self}"
            )));
        }
        Ok(format_camera(camera))
    }

    fn retrieve_parameters(&self, params: &DVector<f64>) -> PlanecalResult<PlanarCamera> {
        retrieve_parameters(params, *self)
    }

    fn residual_direct(
        &self,
        params: &DVector<f64>,
        world_points: &[Vector3<f64>],
        pixel_points: &[Vector2<f64>],
    ) -> PlanecalResult<DVector<f64>> {
        residual_direct(params, world_points, pixel_points, *self)
    }

    fn residual_inverse(
        &self,
        params: &DVector<f64>,
        world_points: &[Vector3<f64>],
        pixel_points: &[Vector2<f64>],
    ) -> PlanecalResult<DVector<f64>> {
        residual_inverse(params, world_points, pixel_points, *self)
    }
}
