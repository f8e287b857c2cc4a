//! Flat parameter vectors for external optimizers.
//!
//! Layout, with `K` the model's coefficient count:
//!
//! ```text
//! [r₀ r₁ r₂ | t₀ t₁ t₂ | fx fy cx cy | c₀ … c_{K-1}]
//! ```

use crate::{
    camera::{CameraExtrinsics, CameraIntrinsics, PlanarCamera},
    error::{PlanecalError, PlanecalResult},
};
use nalgebra::DVector;
use planecal_distortion::{Distortion, ModelKind, RadialDistortion};

const ROTATION_OFFSET: usize = 0;
const TRANSLATION_OFFSET: usize = 3;
const INTRINSICS_OFFSET: usize = 6;
const COEFFICIENTS_OFFSET: usize = 10;

/// Length of the parameter vector for a model.
pub fn parameter_count(kind: ModelKind) -> usize {
    COEFFICIENTS_OFFSET + kind.coefficient_count()
}

/// Pack camera parameters into a flat vector.
pub fn format_parameters(
    extrinsics: &CameraExtrinsics,
    intrinsics: &CameraIntrinsics,
    distortion: &Distortion,
) -> DVector<f64> {
    let coefficients = distortion.coefficients();
    let mut params = DVector::zeros(COEFFICIENTS_OFFSET + coefficients.len());
    params
        .fixed_rows_mut::<3>(ROTATION_OFFSET)
        .copy_from(&extrinsics.rotation);
    params
        .fixed_rows_mut::<3>(TRANSLATION_OFFSET)
        .copy_from(&extrinsics.translation);
    params
        .fixed_rows_mut::<4>(INTRINSICS_OFFSET)
        .copy_from(&intrinsics.to_vector());
    params
        .rows_mut(COEFFICIENTS_OFFSET, coefficients.len())
        .copy_from_slice(&coefficients);
    params
}

/// Unpack a flat vector into a camera.
///
/// # Errors
///
/// [`PlanecalError::ShapeMismatch`] for a vector of the wrong length,
/// [`PlanecalError::InvalidInput`] for parameters that do not describe a valid camera.
pub fn retrieve_parameters(params: &DVector<f64>, kind: ModelKind) -> PlanecalResult<PlanarCamera> {
    let expected = parameter_count(kind);
    if params.len() != expected {
        return Err(PlanecalError::ShapeMismatch(format!(
            "{kind} parameter vector must have {expected} entries, got {}",
            params.len()
        )));
    }

    let extrinsics = CameraExtrinsics::new(
        params.fixed_rows::<3>(ROTATION_OFFSET).into_owned(),
        params.fixed_rows::<3>(TRANSLATION_OFFSET).into_owned(),
    );
    let intrinsics = CameraIntrinsics::new(
        params[INTRINSICS_OFFSET],
        params[INTRINSICS_OFFSET + 1],
        params[INTRINSICS_OFFSET + 2],
        params[INTRINSICS_OFFSET + 3],
    )?;
    let coefficients: Vec<f64> = params
        .rows(COEFFICIENTS_OFFSET, kind.coefficient_count())
        .iter()
        .copied()
        .collect();
    let distortion = Distortion::new(kind, &coefficients)?;

    PlanarCamera::new(intrinsics, extrinsics, distortion)
}

/// Pack a camera into a flat vector.
pub fn format_camera(camera: &PlanarCamera) -> DVector<f64> {
    format_parameters(camera.extrinsics(), camera.intrinsics(), camera.distortion())
}
