//! Integration tests for the calibration boundaries.

use nalgebra::{Vector2, Vector3};
use planecal::calibration::{DEFAULT_FOCAL_LENGTH, default_intrinsics};
use planecal::{
    CalibrationFlags, CalibrationModel, CameraIntrinsics, Distortion, ImageSize,
    IntrinsicCalibration, IntrinsicCalibrationConfig, IntrinsicCalibrationRequest,
    IntrinsicCalibrator, ModelKind, PlanecalError, PlanecalResult, TerminationCriteria,
    calibrate_direct, calibrate_intrinsic, calibrate_inverse, format_camera, retrieve_parameters,
};
use std::sync::Mutex;

mod test_utils;
use test_utils::*;

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Records each request and answers with a canned result.
struct RecordingCalibrator {
    requests: Mutex<Vec<RecordedRequest>>,
    views_in_response: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
struct RecordedRequest {
    model: ModelKind,
    intrinsics: CameraIntrinsics,
    coefficients: Vec<f64>,
    flags: CalibrationFlags,
    criteria: TerminationCriteria,
}

impl RecordingCalibrator {
    fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            views_in_response: None,
        }
    }

    fn answering_views(views: usize) -> Self {
        Self {
            views_in_response: Some(views),
            ..Self::new()
        }
    }

    fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl IntrinsicCalibrator for RecordingCalibrator {
    fn calibrate(
        &self,
        request: &IntrinsicCalibrationRequest<'_>,
    ) -> PlanecalResult<IntrinsicCalibration> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                model: request.model,
                intrinsics: request.intrinsics,
                coefficients: request.coefficients.clone(),
                flags: request.flags,
                criteria: request.criteria,
            });
        }
        let views = self.views_in_response.unwrap_or(request.object_points.len());
        Ok(IntrinsicCalibration {
            rms_error: 0.31,
            intrinsics: CameraIntrinsics::new(598.0, 601.0, 322.0, 239.0)?,
            distortion: Distortion::new(request.model, &request.coefficients)?,
            rotations: vec![Vector3::new(0.1, 0.0, 0.0); views],
            translations: vec![Vector3::new(0.0, 0.0, 1.0); views],
        })
    }
}

fn views(count: usize) -> PlanecalResult<(Vec<Vec<Vector3<f64>>>, Vec<Vec<Vector2<f64>>>)> {
    let camera = sample_camera(ModelKind::Poly)?;
    let grid = plane_grid(4, 5, 0.05);
    let pixels = project_all(&camera, &grid)?;
    Ok((vec![grid; count], vec![pixels; count]))
}

#[test]
fn test_intrinsic_defaults_reach_the_calibrator() -> TestResult {
    let (objects, images) = views(3)?;
    let size = ImageSize::new(640, 480);
    let expected_flags = [
        (ModelKind::Poly, 8),
        (ModelKind::Rational, 16386),
        (ModelKind::Fisheye, 10),
    ];

    for (kind, flags) in expected_flags {
        let calibrator = RecordingCalibrator::new();
        let result = calibrate_intrinsic(
            &calibrator,
            &objects,
            &images,
            size,
            kind,
            &IntrinsicCalibrationConfig::default(),
        )?;
        assert_eq!(result.rotations.len(), 3);

        let recorded = calibrator.recorded();
        assert_eq!(recorded.len(), 1);
        let request = &recorded[0];
        assert_eq!(request.model, kind);
        assert_eq!(request.intrinsics, default_intrinsics(size));
        assert_eq!(request.intrinsics.fx, DEFAULT_FOCAL_LENGTH);
        assert_eq!((request.intrinsics.cx, request.intrinsics.cy), (320.0, 240.0));
        assert_eq!(request.coefficients, vec![0.0; kind.coefficient_count()]);
        assert_eq!(request.flags.bits(), flags);
        assert_eq!(request.criteria, TerminationCriteria::default());
    }
    Ok(())
}

#[test]
fn test_intrinsic_overrides_are_forwarded() -> TestResult {
    let (objects, images) = views(2)?;
    let calibrator = RecordingCalibrator::new();
    let initial = CameraIntrinsics::new(800.0, 800.0, 300.0, 200.0)?;
    let config = IntrinsicCalibrationConfig::new()
        .with_initial_intrinsics(initial)
        .with_initial_coefficients(vec![0.1, 0.0, 0.0, 0.0])
        .with_flags(CalibrationFlags(CalibrationFlags::FISHEYE_FIX_SKEW))
        .with_criteria(TerminationCriteria::new().with_max_count(5));

    calibrate_intrinsic(
        &calibrator,
        &objects,
        &images,
        ImageSize::new(640, 480),
        ModelKind::Fisheye,
        &config,
    )?;

    let request = &calibrator.recorded()[0];
    assert_eq!(request.intrinsics, initial);
    assert_eq!(request.coefficients, vec![0.1, 0.0, 0.0, 0.0]);
    assert_eq!(request.flags, CalibrationFlags(8));
    assert_eq!(request.criteria.max_count, 5);
    Ok(())
}

#[test]
fn test_intrinsic_request_validation() -> TestResult {
    let (objects, images) = views(2)?;
    let size = ImageSize::new(640, 480);
    let config = IntrinsicCalibrationConfig::default();
    let calibrator = RecordingCalibrator::new();

    for kind in [ModelKind::Stereographic, ModelKind::Unified] {
        assert!(matches!(
            calibrate_intrinsic(&calibrator, &objects, &images, size, kind, &config),
            Err(PlanecalError::InvalidInput(_))
        ));
    }

    assert!(matches!(
        calibrate_intrinsic(&calibrator, &objects, &images[..1], size, ModelKind::Poly, &config),
        Err(PlanecalError::ShapeMismatch(_))
    ));

    let mut short_view = images.clone();
    short_view[1].pop();
    assert!(matches!(
        calibrate_intrinsic(&calibrator, &objects, &short_view, size, ModelKind::Poly, &config),
        Err(PlanecalError::ShapeMismatch(_))
    ));

    assert!(matches!(
        calibrate_intrinsic(&calibrator, &[], &[], size, ModelKind::Poly, &config),
        Err(PlanecalError::InvalidInput(_))
    ));

    let wrong_length = IntrinsicCalibrationConfig::new().with_initial_coefficients(vec![0.0; 5]);
    assert!(matches!(
        calibrate_intrinsic(
            &calibrator,
            &objects,
            &images,
            size,
            ModelKind::Rational,
            &wrong_length,
        ),
        Err(PlanecalError::ShapeMismatch(_))
    ));

    assert!(calibrator.recorded().is_empty());
    Ok(())
}

#[test]
fn test_inconsistent_calibrator_output_is_rejected() -> TestResult {
    let (objects, images) = views(3)?;
    let calibrator = RecordingCalibrator::answering_views(2);
    assert!(matches!(
        calibrate_intrinsic(
            &calibrator,
            &objects,
            &images,
            ImageSize::new(640, 480),
            ModelKind::Rational,
            &IntrinsicCalibrationConfig::default(),
        ),
        Err(PlanecalError::Calibration(_))
    ));
    Ok(())
}

#[test]
fn test_direct_refinement_reduces_reprojection_error() -> TestResult {
    let truth = sample_camera(ModelKind::Poly)?;
    let world = plane_grid(7, 7, 0.05);
    let pixels = project_all(&truth, &world)?;

    let mut start = format_camera(&truth);
    // Nudge the pose only; one planar view does not pin down all intrinsics.
    for i in 0..6 {
        start[i] += 0.01 * (i as f64 + 1.0) / 6.0;
    }
    let initial = retrieve_parameters(&start, ModelKind::Poly)?;

    let solver = NumericLevenbergMarquardt::default();
    let outcome = calibrate_direct(&solver, &world, &pixels, &initial)?;
    assert!(outcome.initial_rms > 1.0);
    assert!(outcome.final_rms < outcome.initial_rms);
    assert!(outcome.final_rms < 1e-4, "final rms {}", outcome.final_rms);

    let residual =
        ModelKind::Poly.residual_direct(&format_camera(&outcome.camera), &world, &pixels)?;
    assert!((planecal::rms_error(&residual) - outcome.final_rms).abs() < 1e-12);
    Ok(())
}

#[test]
fn test_inverse_refinement_reduces_plane_error() -> TestResult {
    let truth = sample_camera(ModelKind::Rational)?;
    let world = plane_grid(6, 6, 0.06);
    let pixels = project_all(&truth, &world)?;

    let mut start = format_camera(&truth);
    start[3] += 0.004;
    start[4] -= 0.003;
    start[2] += 0.01;
    let initial = retrieve_parameters(&start, ModelKind::Rational)?;

    let solver = NumericLevenbergMarquardt::default();
    let outcome = calibrate_inverse(&solver, &world, &pixels, &initial)?;
    assert!(outcome.final_rms < outcome.initial_rms);
    assert!(outcome.final_rms < 1e-7, "final rms {}", outcome.final_rms);
    assert_eq!(outcome.camera.model(), ModelKind::Rational);
    Ok(())
}

#[test]
fn test_refinement_rejects_mismatched_correspondences() -> TestResult {
    let camera = sample_camera(ModelKind::Fisheye)?;
    let world = plane_grid(3, 3, 0.1);
    let pixels = project_all(&camera, &world)?;
    assert!(matches!(
        calibrate_direct(&NumericLevenbergMarquardt::default(), &world[1..], &pixels, &camera),
        Err(PlanecalError::ShapeMismatch(_))
    ));
    Ok(())
}
