//! Boundaries to external calibration machinery.
//!
//! Two collaborators are consumed through traits:
//!
//! - [`IntrinsicCalibrator`]: a multi-view intrinsic calibration routine
//!   (OpenCV-style `calibrateCamera` / `fisheye::calibrate`). The core supplies
//!   the per-model conventions: initial guesses, flags and termination criteria.
//! - [`LeastSquaresSolver`]: a nonlinear least-squares optimizer that minimises
//!   one of the [`residual`](crate::residual) functions over the flat parameter
//!   vector.

use crate::{
    camera::{CameraIntrinsics, PlanarCamera},
    codec::{format_camera, retrieve_parameters},
    error::{PlanecalError, PlanecalResult, check_same_length},
    residual::{residual_direct, residual_inverse, rms_error},
};
use nalgebra::{DVector, Vector2, Vector3};
use planecal_distortion::{Distortion, ModelKind, RadialDistortion};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Focal length used as the initial guess for intrinsic calibration.
pub const DEFAULT_FOCAL_LENGTH: f64 = 600.0;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Calibration flag bits understood by the external calibrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalibrationFlags(pub u32);

impl CalibrationFlags {
    pub const USE_INTRINSIC_GUESS: u32 = 1;
    pub const FIX_ASPECT_RATIO: u32 = 1 << 1;
    pub const FIX_PRINCIPAL_POINT: u32 = 1 << 2;
    pub const ZERO_TANGENT_DIST: u32 = 1 << 3;
    pub const RATIONAL_MODEL: u32 = 1 << 14;

    pub const FISHEYE_RECOMPUTE_EXTRINSIC: u32 = 1 << 1;
    pub const FISHEYE_FIX_SKEW: u32 = 1 << 3;

    /// Model defaults: poly `8`, rational `16386`, fisheye `10`.
    pub fn default_for(kind: ModelKind) -> PlanecalResult<Self> {
        match kind {
            ModelKind::Poly => Ok(Self(Self::ZERO_TANGENT_DIST)),
            ModelKind::Rational => Ok(Self(Self::FIX_ASPECT_RATIO | Self::RATIONAL_MODEL)),
            ModelKind::Fisheye => Ok(Self(
                Self::FISHEYE_RECOMPUTE_EXTRINSIC | Self::FISHEYE_FIX_SKEW,
            )),
            ModelKind::Stereographic | ModelKind::Unified => Err(unsupported(kind)),
        }
    }

    #[inline]
    pub fn bits(&self) -> u32 {
        self.0
    }

    #[inline]
    pub fn contains(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }
}

/// Iteration-count and accuracy stopping rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerminationCriteria {
    /// Bit set of [`COUNT`](Self::COUNT) and [`EPS`](Self::EPS).
    pub criteria_type: u32,
    pub max_count: usize,
    pub epsilon: f64,
}

impl Default for TerminationCriteria {
    fn default() -> Self {
        Self {
            criteria_type: Self::COUNT | Self::EPS,
            max_count: 50,
            epsilon: 1e-15,
        }
    }
}

impl TerminationCriteria {
    pub const COUNT: u32 = 1;
    pub const EPS: u32 = 2;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_count(mut self, max_count: usize) -> Self {
        self.max_count = max_count;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }
}

/// Optional overrides for [`calibrate_intrinsic`]. Unset fields fall back to
/// the model's defaults.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IntrinsicCalibrationConfig {
    pub initial_intrinsics: Option<CameraIntrinsics>,
    pub initial_coefficients: Option<Vec<f64>>,
    pub flags: Option<CalibrationFlags>,
    pub criteria: TerminationCriteria,
}

impl IntrinsicCalibrationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_intrinsics(mut self, intrinsics: CameraIntrinsics) -> Self {
        self.initial_intrinsics = Some(intrinsics);
        self
    }

    pub fn with_initial_coefficients(mut self, coefficients: Vec<f64>) -> Self {
        self.initial_coefficients = Some(coefficients);
        self
    }

    pub fn with_flags(mut self, flags: CalibrationFlags) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn with_criteria(mut self, criteria: TerminationCriteria) -> Self {
        self.criteria = criteria;
        self
    }
}

/// Fully resolved request handed to the external calibrator.
#[derive(Debug, Clone, PartialEq)]
pub struct IntrinsicCalibrationRequest<'a> {
    pub object_points: &'a [Vec<Vector3<f64>>],
    pub image_points: &'a [Vec<Vector2<f64>>],
    pub image_size: ImageSize,
    pub model: ModelKind,
    pub intrinsics: CameraIntrinsics,
    pub coefficients: Vec<f64>,
    pub flags: CalibrationFlags,
    pub criteria: TerminationCriteria,
}

/// Result of an intrinsic calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct IntrinsicCalibration {
    pub rms_error: f64,
    pub intrinsics: CameraIntrinsics,
    pub distortion: Distortion,
    /// Per-view Rodrigues vectors
    pub rotations: Vec<Vector3<f64>>,
    /// Per-view translations
    pub translations: Vec<Vector3<f64>>,
}

/// External multi-view intrinsic calibration routine.
pub trait IntrinsicCalibrator {
    fn calibrate(
        &self,
        request: &IntrinsicCalibrationRequest<'_>,
    ) -> PlanecalResult<IntrinsicCalibration>;
}

fn unsupported(kind: ModelKind) -> PlanecalError {
    PlanecalError::InvalidInput(format!(
        "intrinsic calibration is not available for the {kind} model"
    ))
}

/// Models the external calibrator handles.
pub fn supports_intrinsic_calibration(kind: ModelKind) -> bool {
    matches!(
        kind,
        ModelKind::Rational | ModelKind::Fisheye | ModelKind::Poly
    )
}

/// `fx = fy = 600` with the principal point at the image centre.
pub fn default_intrinsics(image_size: ImageSize) -> CameraIntrinsics {
    CameraIntrinsics {
        fx: DEFAULT_FOCAL_LENGTH,
        fy: DEFAULT_FOCAL_LENGTH,
        cx: f64::from(image_size.width) / 2.0,
        cy: f64::from(image_size.height) / 2.0,
    }
}

fn validate_views(
    object_points: &[Vec<Vector3<f64>>],
    image_points: &[Vec<Vector2<f64>>],
) -> PlanecalResult<()> {
    if object_points.is_empty() {
        return Err(PlanecalError::InvalidInput(
            "at least one calibration view is required".to_string(),
        ));
    }
    check_same_length("calibration views", object_points.len(), image_points.len())?;
    for (view, (objects, images)) in object_points.iter().zip(image_points).enumerate() {
        if objects.is_empty() {
            return Err(PlanecalError::InvalidInput(format!("view {view} has no points")));
        }
        check_same_length(&format!("view {view} correspondences"), objects.len(), images.len())?;
    }
    Ok(())
}

/// Run the external intrinsic calibration with the model's conventions.
///
/// # Errors
///
/// - [`PlanecalError::InvalidInput`] for stereographic and unified models or empty views
/// - [`PlanecalError::ShapeMismatch`] for inconsistent views or coefficient counts
/// - [`PlanecalError::Calibration`] when the calibrator returns an inconsistent result
pub fn calibrate_intrinsic<C: IntrinsicCalibrator + ?Sized>(
    calibrator: &C,
    object_points: &[Vec<Vector3<f64>>],
    image_points: &[Vec<Vector2<f64>>],
    image_size: ImageSize,
    kind: ModelKind,
    config: &IntrinsicCalibrationConfig,
) -> PlanecalResult<IntrinsicCalibration> {
    if !supports_intrinsic_calibration(kind) {
        return Err(unsupported(kind));
    }
    validate_views(object_points, image_points)?;

    let intrinsics = config
        .initial_intrinsics
        .unwrap_or_else(|| default_intrinsics(image_size));
    intrinsics.validate()?;

    let coefficients = match &config.initial_coefficients {
        Some(coefficients) => {
            Distortion::new(kind, coefficients)?;
            coefficients.clone()
        }
        None => vec![0.0; kind.coefficient_count()],
    };

    let flags = match config.flags {
        Some(flags) => flags,
        None => CalibrationFlags::default_for(kind)?,
    };

    let request = IntrinsicCalibrationRequest {
        object_points,
        image_points,
        image_size,
        model: kind,
        intrinsics,
        coefficients,
        flags,
        criteria: config.criteria,
    };
    let result = calibrator.calibrate(&request)?;

    let views = object_points.len();
    if result.distortion.kind() != kind
        || result.rotations.len() != views
        || result.translations.len() != views
        || !(result.rms_error.is_finite() && result.rms_error >= 0.0)
    {
        warn!(
            model = %kind,
            returned_model = %result.distortion.kind(),
            views,
            rotations = result.rotations.len(),
            translations = result.translations.len(),
            rms = result.rms_error,
            "calibrator returned an inconsistent result"
        );
        return Err(PlanecalError::Calibration(format!(
            "calibrator returned an inconsistent result for {views} {kind} views"
        )));
    }
    result.intrinsics.validate()?;

    info!(
        model = %kind,
        views,
        rms = result.rms_error,
        fx = result.intrinsics.fx,
        fy = result.intrinsics.fy,
        "intrinsic calibration finished"
    );
    Ok(result)
}

/// Residual signature handed to a [`LeastSquaresSolver`].
pub type ResidualFn<'a> = dyn Fn(&DVector<f64>) -> PlanecalResult<DVector<f64>> + Sync + 'a;

/// External nonlinear least-squares optimizer.
pub trait LeastSquaresSolver {
    /// Minimise `‖residual(x)‖²` starting from `initial`.
    fn minimize(
        &self,
        initial: DVector<f64>,
        residual: &ResidualFn<'_>,
    ) -> PlanecalResult<DVector<f64>>;
}

/// Refined camera with the RMS error before and after refinement.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementOutcome {
    pub camera: PlanarCamera,
    pub initial_rms: f64,
    pub final_rms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResidualSpace {
    Image,
    Plane,
}

/// Refine all camera parameters by minimising the reprojection residual.
pub fn calibrate_direct<S: LeastSquaresSolver + ?Sized>(
    solver: &S,
    world_points: &[Vector3<f64>],
    pixel_points: &[Vector2<f64>],
    initial: &PlanarCamera,
) -> PlanecalResult<RefinementOutcome> {
    refine(solver, world_points, pixel_points, initial, ResidualSpace::Image)
}

/// Refine all camera parameters by minimising the back-projection residual.
pub fn calibrate_inverse<S: LeastSquaresSolver + ?Sized>(
    solver: &S,
    world_points: &[Vector3<f64>],
    pixel_points: &[Vector2<f64>],
    initial: &PlanarCamera,
) -> PlanecalResult<RefinementOutcome> {
    refine(solver, world_points, pixel_points, initial, ResidualSpace::Plane)
}

fn refine<S: LeastSquaresSolver + ?Sized>(
    solver: &S,
    world_points: &[Vector3<f64>],
    pixel_points: &[Vector2<f64>],
    initial: &PlanarCamera,
    space: ResidualSpace,
) -> PlanecalResult<RefinementOutcome> {
    check_same_length("world/pixel correspondences", world_points.len(), pixel_points.len())?;
    let kind = initial.model();
    let residual = move |params: &DVector<f64>| match space {
        ResidualSpace::Image => residual_direct(params, world_points, pixel_points, kind),
        ResidualSpace::Plane => residual_inverse(params, world_points, pixel_points, kind),
    };

    let start = format_camera(initial);
    let initial_rms = rms_error(&residual(&start)?);
    let refined = solver.minimize(start, &residual)?;
    let final_rms = rms_error(&residual(&refined)?);
    let camera = retrieve_parameters(&refined, kind)?.with_tolerances(*initial.tolerances());

    info!(
        model = %kind,
        space = ?space,
        points = world_points.len(),
        initial_rms,
        final_rms,
        "camera refinement finished"
    );
    Ok(RefinementOutcome {
        camera,
        initial_rms,
        final_rms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_default_flags() -> TestResult {
        assert_eq!(CalibrationFlags::default_for(ModelKind::Poly)?.bits(), 8);
        assert_eq!(CalibrationFlags::default_for(ModelKind::Rational)?.bits(), 16386);
        assert_eq!(CalibrationFlags::default_for(ModelKind::Fisheye)?.bits(), 10);
        assert!(CalibrationFlags::default_for(ModelKind::Unified).is_err());
        assert!(CalibrationFlags::default_for(ModelKind::Stereographic).is_err());
        Ok(())
    }

    #[test]
    fn test_flag_contains() {
        let flags = CalibrationFlags(16386);
        assert!(flags.contains(CalibrationFlags::RATIONAL_MODEL));
        assert!(flags.contains(CalibrationFlags::FIX_ASPECT_RATIO));
        assert!(!flags.contains(CalibrationFlags::ZERO_TANGENT_DIST));
    }

    #[test]
    fn test_default_criteria() {
        let criteria = TerminationCriteria::default();
        assert_eq!(criteria.criteria_type, 3);
        assert_eq!(criteria.max_count, 50);
        assert_eq!(criteria.epsilon, 1e-15);
    }

    #[test]
    fn test_default_intrinsics_centre_the_principal_point() {
        let intrinsics = default_intrinsics(ImageSize::new(1280, 720));
        assert_eq!(intrinsics.fx, 600.0);
        assert_eq!(intrinsics.fy, 600.0);
        assert_eq!(intrinsics.cx, 640.0);
        assert_eq!(intrinsics.cy, 360.0);
    }

    #[test]
    fn test_supported_models() {
        assert!(supports_intrinsic_calibration(ModelKind::Rational));
        assert!(supports_intrinsic_calibration(ModelKind::Fisheye));
        assert!(supports_intrinsic_calibration(ModelKind::Poly));
        assert!(!supports_intrinsic_calibration(ModelKind::Unified));
        assert!(!supports_intrinsic_calibration(ModelKind::Stereographic));
    }

    #[test]
    fn test_config_builder() -> TestResult {
        let config = IntrinsicCalibrationConfig::new()
            .with_initial_intrinsics(CameraIntrinsics::new(500.0, 500.0, 10.0, 10.0)?)
            .with_initial_coefficients(vec![0.0; 4])
            .with_flags(CalibrationFlags(0))
            .with_criteria(TerminationCriteria::new().with_max_count(10).with_epsilon(1e-9));
        assert_eq!(config.flags, Some(CalibrationFlags(0)));
        assert_eq!(config.criteria.max_count, 10);
        assert_eq!(config.criteria.epsilon, 1e-9);
        Ok(())
    }
}
