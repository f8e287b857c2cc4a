//! First-order covariance propagation through the inverse projection.
//!
//! Each stage maps an incoming point with covariance `Σ_in` and zero or more
//! independent parameter sources `Σ_s` to
//!
//! ```text
//! Σ_out = J_in Σ_in J_inᵀ + Σ_s J_s Σ_s J_sᵀ
//! ```
//!
//! | stage | input | sources |
//! |-------|-------|---------|
//! | pixel → distorted | `(u, v)` | intrinsics `(fx, fy, cx, cy)` |
//! | distorted → undistorted | `(xpp, ypp)` | distortion coefficients |
//! | undistorted → plane | `(xp, yp)` | pose `(r₀, r₁, r₂, t₀, t₁, t₂)` |
//!
//! Missing covariances are skipped, and a stage with nothing to propagate
//! does not compute its Jacobians.

use crate::{
    camera::{CameraIntrinsics, PlanarCamera},
    error::{PlanecalError, PlanecalResult, check_same_length},
    inverse::{distorted_to_undistorted, intersect_plane, pixel_to_distorted},
};
use nalgebra::{
    DMatrix, Matrix2, Matrix2x4, Matrix2x6, Matrix2xX, Matrix4, Matrix6, Vector2, Vector3,
};
use planecal_distortion::{Distortion, ORIGIN_RADIUS, RadialDistortion};
use planecal_manifolds::Pose;
use rayon::prelude::*;
use tracing::debug;

/// Pixel measurement noise, either shared by every point or given per point.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelCovariance {
    Shared(Matrix2<f64>),
    PerPoint(Vec<Matrix2<f64>>),
}

/// Covariances of the independent noise sources. `None` means "not tracked".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputCovariances {
    pub pixel: Option<PixelCovariance>,
    /// 4×4 over `(fx, fy, cx, cy)`
    pub intrinsics: Option<Matrix4<f64>>,
    /// K×K over the distortion coefficients in persisted order
    pub coefficients: Option<DMatrix<f64>>,
    /// 6×6 over `(r₀, r₁, r₂, t₀, t₁, t₂)`
    pub pose: Option<Matrix6<f64>>,
}

impl InputCovariances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pixel(mut self, covariance: Matrix2<f64>) -> Self {
        self.pixel = Some(PixelCovariance::Shared(covariance));
        self
    }

    pub fn with_pixel_per_point(mut self, covariances: Vec<Matrix2<f64>>) -> Self {
        self.pixel = Some(PixelCovariance::PerPoint(covariances));
        self
    }

    pub fn with_intrinsics(mut self, covariance: Matrix4<f64>) -> Self {
        self.intrinsics = Some(covariance);
        self
    }

    pub fn with_coefficients(mut self, covariance: DMatrix<f64>) -> Self {
        self.coefficients = Some(covariance);
        self
    }

    pub fn with_pose(mut self, covariance: Matrix6<f64>) -> Self {
        self.pose = Some(covariance);
        self
    }

    /// Check the shapes against the number of pixels and coefficients.
    pub fn validate(&self, point_count: usize, coefficient_count: usize) -> PlanecalResult<()> {
        if let Some(PixelCovariance::PerPoint(covariances)) = &self.pixel {
            check_same_length("per-point pixel covariances", point_count, covariances.len())?;
        }
        if let Some(covariance) = &self.coefficients {
            if covariance.nrows() != coefficient_count || covariance.ncols() != coefficient_count {
                return Err(PlanecalError::ShapeMismatch(format!(
                    "coefficient covariance must be {n}×{n}, got {}×{}",
                    covariance.nrows(),
                    covariance.ncols(),
                    n = coefficient_count,
                )));
            }
        }
        Ok(())
    }

    fn pixel_at(&self, index: usize) -> Option<&Matrix2<f64>> {
        match &self.pixel {
            Some(PixelCovariance::Shared(covariance)) => Some(covariance),
            Some(PixelCovariance::PerPoint(covariances)) => covariances.get(index),
            None => None,
        }
    }
}

/// Point and covariance leaving a stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    pub point: Vector2<f64>,
    pub covariance: Option<Matrix2<f64>>,
}

/// World-plane point with the covariance of its `(X, Y)` coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PropagatedPoint {
    pub world: Vector3<f64>,
    pub covariance: Option<Matrix2<f64>>,
}

// ============================================================================
// Jacobians
// ============================================================================

/// Stage 1 Jacobians with respect to the pixel and to `(fx, fy, cx, cy)`.
pub fn pixel_stage_jacobians(
    pixel: &Vector2<f64>,
    intrinsics: &CameraIntrinsics,
) -> (Matrix2<f64>, Matrix2x4<f64>) {
    let distorted = pixel_to_distorted(pixel, intrinsics);
    let (fx, fy) = (intrinsics.fx, intrinsics.fy);

    let j_pixel = Matrix2::new(1.0 / fx, 0.0, 0.0, 1.0 / fy);
    #[rustfmt::skip]
    let j_intrinsics = Matrix2x4::new(
        -distorted.x / fx, 0.0,               -1.0 / fx, 0.0,
        0.0,               -distorted.y / fy, 0.0,       -1.0 / fy,
    );
    (j_pixel, j_intrinsics)
}

/// Stage 2 Jacobians, returned with the undistorted point.
///
/// With `Q` the undistortion ratio at `rpp = ‖xpp‖`:
///
/// ```text
/// ∂xp/∂xpp = I/Q - xpp·xppᵀ · Q'/(rpp·Q²)
/// ∂xp/∂c   = -xpp · (∂Q/∂c)ᵀ / Q²
/// ```
pub fn undistort_stage_jacobians(
    distorted: &Vector2<f64>,
    distortion: &Distortion,
) -> PlanecalResult<(Vector2<f64>, Matrix2<f64>, Matrix2xX<f64>)> {
    let radius = distorted.norm();
    let jacobian = distortion.radial_undistort_with_jacobian(radius)?;
    let ratio = jacobian.ratio;
    let ratio2 = ratio * ratio;

    let mut j_point = Matrix2::identity() / ratio;
    if radius > ORIGIN_RADIUS {
        j_point -= distorted * distorted.transpose() * (jacobian.d_radius / (radius * ratio2));
    }
    let j_coefficients: Matrix2xX<f64> =
        distorted * jacobian.d_coefficients.transpose() * (-1.0 / ratio2);

    Ok((distorted / ratio, j_point, j_coefficients))
}

/// Stage 3 Jacobians, returned with the plane point.
///
/// Differentiating `A·X = b` gives `∂X/∂p = A⁻¹(∂b/∂p - ∂A/∂p·X)`. For the
/// image coordinates this collapses to `z_c·A⁻¹`, with `z_c` the camera-frame
/// depth of the intersection.
pub fn plane_stage_jacobians(
    undistorted: &Vector2<f64>,
    pose: &Pose,
    plane_tolerance: f64,
) -> PlanecalResult<(Vector2<f64>, Matrix2<f64>, Matrix2x6<f64>)> {
    let intersection = intersect_plane(undistorted, pose, plane_tolerance)?;
    let (inverse, point) = (&intersection.inverse, &intersection.point);
    let rotation = pose.rotation_matrix();
    let t = pose.translation();
    let (xp, yp) = (undistorted.x, undistorted.y);

    let depth = rotation[(2, 0)] * point.x + rotation[(2, 1)] * point.y + t.z;
    let j_point = inverse * depth;

    let mut j_pose = Matrix2x6::zeros();
    for (i, d) in pose.rotation().matrix_derivatives().iter().enumerate() {
        #[rustfmt::skip]
        let d_system = Matrix2::new(
            d[(0, 0)] - d[(2, 0)] * xp, d[(0, 1)] - d[(2, 1)] * xp,
            d[(1, 0)] - d[(2, 0)] * yp, d[(1, 1)] - d[(2, 1)] * yp,
        );
        j_pose.set_column(i, &(inverse * -(d_system * point)));
    }
    j_pose.set_column(3, &(inverse * Vector2::new(-1.0, 0.0)));
    j_pose.set_column(4, &(inverse * Vector2::new(0.0, -1.0)));
    j_pose.set_column(5, &(inverse * Vector2::new(xp, yp)));

    Ok((*point, j_point, j_pose))
}

// ============================================================================
// Stage propagation
// ============================================================================

fn symmetrized(covariance: Matrix2<f64>) -> Matrix2<f64> {
    (covariance + covariance.transpose()) * 0.5
}

/// Stage 1 with covariances.
pub fn propagate_pixel_stage(
    pixel: &Vector2<f64>,
    pixel_covariance: Option<&Matrix2<f64>>,
    intrinsics: &CameraIntrinsics,
    intrinsics_covariance: Option<&Matrix4<f64>>,
) -> StageOutput {
    let point = pixel_to_distorted(pixel, intrinsics);
    if pixel_covariance.is_none() && intrinsics_covariance.is_none() {
        return StageOutput {
            point,
            covariance: None,
        };
    }

    let (j_pixel, j_intrinsics) = pixel_stage_jacobians(pixel, intrinsics);
    let mut covariance = Matrix2::zeros();
    if let Some(sigma) = pixel_covariance {
        covariance += j_pixel * sigma * j_pixel.transpose();
    }
    if let Some(sigma) = intrinsics_covariance {
        covariance += j_intrinsics * sigma * j_intrinsics.transpose();
    }

    StageOutput {
        point,
        covariance: Some(symmetrized(covariance)),
    }
}

/// Stage 2 with covariances. `coefficients_covariance` must be K×K.
pub fn propagate_undistort_stage(
    distorted: &Vector2<f64>,
    distorted_covariance: Option<&Matrix2<f64>>,
    distortion: &Distortion,
    coefficients_covariance: Option<&DMatrix<f64>>,
) -> PlanecalResult<StageOutput> {
    if distorted_covariance.is_none() && coefficients_covariance.is_none() {
        return Ok(StageOutput {
            point: distorted_to_undistorted(distorted, distortion)?,
            covariance: None,
        });
    }

    let (point, j_point, j_coefficients) = undistort_stage_jacobians(distorted, distortion)?;
    let mut covariance = Matrix2::zeros();
    if let Some(sigma) = distorted_covariance {
        covariance += j_point * sigma * j_point.transpose();
    }
    if let Some(sigma) = coefficients_covariance {
        if sigma.nrows() != j_coefficients.ncols() || sigma.ncols() != j_coefficients.ncols() {
            return Err(PlanecalError::ShapeMismatch(format!(
                "coefficient covariance must be {n}×{n}, got {}×{}",
                sigma.nrows(),
                sigma.ncols(),
                n = j_coefficients.ncols()
            )));
        }
        covariance += &j_coefficients * sigma * j_coefficients.transpose();
    }

    Ok(StageOutput {
        point,
        covariance: Some(symmetrized(covariance)),
    })
}

/// Stage 3 with covariances.
pub fn propagate_plane_stage(
    undistorted: &Vector2<f64>,
    undistorted_covariance: Option<&Matrix2<f64>>,
    pose: &Pose,
    pose_covariance: Option<&Matrix6<f64>>,
    plane_tolerance: f64,
) -> PlanecalResult<StageOutput> {
    if undistorted_covariance.is_none() && pose_covariance.is_none() {
        return Ok(StageOutput {
            point: intersect_plane(undistorted, pose, plane_tolerance)?.point,
            covariance: None,
        });
    }

    let (point, j_point, j_pose) = plane_stage_jacobians(undistorted, pose, plane_tolerance)?;
    let mut covariance = Matrix2::zeros();
    if let Some(sigma) = undistorted_covariance {
        covariance += j_point * sigma * j_point.transpose();
    }
    if let Some(sigma) = pose_covariance {
        covariance += j_pose * sigma * j_pose.transpose();
    }

    Ok(StageOutput {
        point,
        covariance: Some(symmetrized(covariance)),
    })
}

// ============================================================================
// Full pipeline
// ============================================================================

impl PlanarCamera {
    /// Back-project one pixel and propagate `covariances` to the world plane.
    ///
    /// The covariances describe a batch of one point, so a per-point pixel
    /// covariance must hold exactly one matrix.
    pub fn unproject_with_covariance(
        &self,
        pixel: &Vector2<f64>,
        covariances: &InputCovariances,
    ) -> PlanecalResult<PropagatedPoint> {
        covariances.validate(1, self.distortion().coefficient_count())?;
        self.propagate_point(pixel, covariances.pixel_at(0), covariances)
    }

    fn propagate_point(
        &self,
        pixel: &Vector2<f64>,
        pixel_covariance: Option<&Matrix2<f64>>,
        covariances: &InputCovariances,
    ) -> PlanecalResult<PropagatedPoint> {
        let distorted = propagate_pixel_stage(
            pixel,
            pixel_covariance,
            self.intrinsics(),
            covariances.intrinsics.as_ref(),
        );
        let undistorted = propagate_undistort_stage(
            &distorted.point,
            distorted.covariance.as_ref(),
            self.distortion(),
            covariances.coefficients.as_ref(),
        )?;
        let plane = propagate_plane_stage(
            &undistorted.point,
            undistorted.covariance.as_ref(),
            self.pose(),
            covariances.pose.as_ref(),
            self.tolerances().plane_tolerance,
        )?;

        Ok(PropagatedPoint {
            world: Vector3::new(plane.point.x, plane.point.y, 0.0),
            covariance: plane.covariance,
        })
    }
}

/// Back-project pixels and propagate the input covariances to the world plane.
///
/// Shape errors in the covariances fail the whole call; projection failures
/// are reported per point.
pub fn propagate(
    pixel_points: &[Vector2<f64>],
    camera: &PlanarCamera,
    covariances: &InputCovariances,
) -> PlanecalResult<Vec<PlanecalResult<PropagatedPoint>>> {
    covariances.validate(pixel_points.len(), camera.distortion().coefficient_count())?;

    let propagated: Vec<_> = pixel_points
        .par_iter()
        .enumerate()
        .map(|(i, pixel)| camera.propagate_point(pixel, covariances.pixel_at(i), covariances))
        .collect();

    let failures = propagated.iter().filter(|r| r.is_err()).count();
    if failures > 0 {
        debug!(
            model = %camera.model(),
            failures,
            total = pixel_points.len(),
            "uncertainty propagation failed for some points"
        );
    }
    Ok(propagated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraExtrinsics;
    use planecal_distortion::ModelKind;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn camera(kind: ModelKind, coefficients: &[f64]) -> PlanecalResult<PlanarCamera> {
        PlanarCamera::new(
            CameraIntrinsics::new(600.0, 600.0, 320.0, 240.0)?,
            CameraExtrinsics::new(Vector3::new(0.1, -0.2, 0.05), Vector3::new(-0.3, 0.2, 2.0)),
            Distortion::new(kind, coefficients)?,
        )
    }

    #[test]
    fn test_no_covariance_skips_propagation() -> TestResult {
        let camera = camera(ModelKind::Poly, &[-0.1, 0.01, 0.0, 0.0, 0.0])?;
        let pixel = Vector2::new(350.0, 260.0);
        let result = camera.unproject_with_covariance(&pixel, &InputCovariances::new())?;
        assert!(result.covariance.is_none());
        assert_eq!(result.world, camera.unproject_point(&pixel)?);
        Ok(())
    }

    #[test]
    fn test_pixel_covariance_is_read_from_inputs() -> TestResult {
        let camera = camera(ModelKind::Poly, &[-0.1, 0.01, 0.0, 0.0, 0.0])?;
        let pixel = Vector2::new(350.0, 260.0);
        let sigma = Matrix2::new(0.25, 0.05, 0.05, 0.16);

        let shared = InputCovariances::new().with_pixel(sigma);
        let covariance = camera
            .unproject_with_covariance(&pixel, &shared)?
            .covariance
            .ok_or("missing covariance")?;
        assert!(covariance[(0, 0)] > 0.0 && covariance[(1, 1)] > 0.0);

        let per_point = InputCovariances::new().with_pixel_per_point(vec![sigma]);
        let result = camera.unproject_with_covariance(&pixel, &per_point)?;
        assert_eq!(result.covariance, Some(covariance));

        let batch = propagate(&[pixel], &camera, &shared)?;
        assert_eq!(batch[0].clone()?.covariance, Some(covariance));
        Ok(())
    }

    #[test]
    fn test_single_point_rejects_longer_pixel_batch() -> TestResult {
        let camera = camera(ModelKind::Poly, &[-0.1, 0.01, 0.0, 0.0, 0.0])?;
        let covariances =
            InputCovariances::new().with_pixel_per_point(vec![Matrix2::identity(); 2]);
        assert!(matches!(
            camera.unproject_with_covariance(&Vector2::new(350.0, 260.0), &covariances),
            Err(PlanecalError::ShapeMismatch(_))
        ));
        Ok(())
    }

    #[test]
    fn test_pixel_stage_is_exact_scaling() -> TestResult {
        let intrinsics = CameraIntrinsics::new(500.0, 250.0, 0.0, 0.0)?;
        let sigma = Matrix2::new(4.0, 1.0, 1.0, 9.0);
        let output =
            propagate_pixel_stage(&Vector2::new(10.0, 20.0), Some(&sigma), &intrinsics, None);
        let covariance = output.covariance.ok_or("missing covariance")?;
        let expected = Matrix2::new(
            4.0 / 250_000.0,
            1.0 / 125_000.0,
            1.0 / 125_000.0,
            9.0 / 62_500.0,
        );
        assert!((covariance - expected).norm() < 1e-18);
        Ok(())
    }

    #[test]
    fn test_zero_covariances_give_zero_output() -> TestResult {
        let camera = camera(ModelKind::Rational, &[-0.2, 0.05, 0.0, 0.0, 0.0, 0.01, 0.0, 0.0])?;
        let covariances = InputCovariances::new()
            .with_pixel(Matrix2::zeros())
            .with_coefficients(DMatrix::zeros(8, 8));
        let result = camera.unproject_with_covariance(&Vector2::new(400.0, 300.0), &covariances)?;
        assert_eq!(result.covariance, Some(Matrix2::zeros()));
        Ok(())
    }

    #[test]
    fn test_validate_rejects_mismatched_shapes() -> TestResult {
        let camera = camera(ModelKind::Fisheye, &[0.0; 4])?;
        let pixels = [Vector2::new(300.0, 200.0), Vector2::new(310.0, 210.0)];

        let per_point = InputCovariances::new().with_pixel_per_point(vec![Matrix2::identity()]);
        assert!(matches!(
            propagate(&pixels, &camera, &per_point),
            Err(PlanecalError::ShapeMismatch(_))
        ));

        let coefficients = InputCovariances::new().with_coefficients(DMatrix::identity(5, 5));
        assert!(matches!(
            propagate(&pixels, &camera, &coefficients),
            Err(PlanecalError::ShapeMismatch(_))
        ));
        Ok(())
    }

    #[test]
    fn test_output_is_symmetric() -> TestResult {
        let camera = camera(ModelKind::Unified, &[0.6])?;
        let covariances = InputCovariances::new()
            .with_pixel(Matrix2::new(0.25, 0.05, 0.05, 0.36))
            .with_intrinsics(Matrix4::from_diagonal(&nalgebra::Vector4::new(4.0, 4.0, 1.0, 1.0)))
            .with_coefficients(DMatrix::from_element(1, 1, 1e-4))
            .with_pose(Matrix6::identity() * 1e-6);
        let results = propagate(&[Vector2::new(100.0, 400.0)], &camera, &covariances)?;
        let covariance = results[0].clone()?.covariance.ok_or("missing covariance")?;
        assert_eq!(covariance, covariance.transpose());
        assert!(covariance[(0, 0)] > 0.0 && covariance[(1, 1)] > 0.0);
        Ok(())
    }
}
