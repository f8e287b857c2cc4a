//! Radial distortion models for planar camera calibration.
//!
//! Every model maps an undistorted normalized radius `r` to a *distortion
//! ratio* `q(r)` such that the distorted radius is `r·q(r)`. The inverse maps
//! a distorted radius `rpp` to the ratio `Q(rpp)` with undistorted radius
//! `rpp / Q(rpp)`. Both ratios equal exactly 1 at the optical axis.
//!
//! # Available Models
//!
//! - **Stereographic**: generalised stereographic projection, 1 coefficient
//! - **Unified**: unit-sphere (Mei/Geyer) model, 1 coefficient
//! - **Rational**: OpenCV rational radial model, 8 coefficients
//! - **Fisheye**: OpenCV fisheye (equidistant polynomial) model, 4 coefficients
//! - **Poly**: OpenCV polynomial radial model, 5 coefficients
//!
//! Stereographic and unified invert in closed form. The polynomial models
//! invert through [`roots::real_roots`], choosing among the admissible real
//! roots the one whose ratio is closest to 1.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub mod fisheye;
pub mod poly;
pub mod rational;
pub mod roots;
pub mod stereographic;
pub mod unified;

pub use fisheye::FisheyeDistortion;
pub use poly::PolyDistortion;
pub use rational::RationalDistortion;
pub use roots::RootConfig;
pub use stereographic::StereographicDistortion;
pub use unified::UnifiedDistortion;

// ============================================================================
// Precision Constants
// ============================================================================

/// Radii at or below this value are treated as lying on the optical axis,
/// where every ratio is exactly 1.
pub const ORIGIN_RADIUS: f64 = 1e-12;

/// Precision constant for invertibility checks.
///
/// The local slope `d(r·q)/dr` of the distortion must exceed this for the
/// inverse derivatives to exist.
pub const GEOMETRIC_PRECISION: f64 = 1e-9;

/// Epsilon for numerical differentiation in Jacobian computation.
///
/// Default: 1e-7 (provides good balance between truncation and round-off error)
pub const NUMERICAL_DERIVATIVE_EPS: f64 = 1e-7;

/// Tolerance for numerical Jacobian validation in tests.
pub const JACOBIAN_TEST_TOLERANCE: f64 = 1e-5;

/// Distortion model errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DistortionError {
    #[error("{model} distortion is undefined at radius {radius}: {reason}")]
    Domain {
        model: ModelKind,
        radius: f64,
        reason: String,
    },

    #[error("{model} undistortion found no admissible root for distorted radius {radius}")]
    Inversion { model: ModelKind, radius: f64 },

    #[error("{model} model expects {expected} coefficients, got {found}")]
    ShapeMismatch {
        model: ModelKind,
        expected: usize,
        found: usize,
    },

    #[error("Invalid {model} parameters: {reason}")]
    InvalidParams { model: ModelKind, reason: String },

    #[error("Unknown distortion model '{0}'")]
    UnknownModel(String),
}

/// Identifier of a distortion family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Stereographic,
    Unified,
    Rational,
    Fisheye,
    Poly,
}

impl ModelKind {
    pub const ALL: [ModelKind; 5] = [
        ModelKind::Stereographic,
        ModelKind::Unified,
        ModelKind::Rational,
        ModelKind::Fisheye,
        ModelKind::Poly,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Stereographic => "stereographic",
            ModelKind::Unified => "unified",
            ModelKind::Rational => "rational",
            ModelKind::Fisheye => "fisheye",
            ModelKind::Poly => "poly",
        }
    }

    /// Length of the persisted coefficient array.
    pub fn coefficient_count(&self) -> usize {
        match self {
            ModelKind::Stereographic => StereographicDistortion::COEFFICIENT_COUNT,
            ModelKind::Unified => UnifiedDistortion::COEFFICIENT_COUNT,
            ModelKind::Rational => RationalDistortion::COEFFICIENT_COUNT,
            ModelKind::Fisheye => FisheyeDistortion::COEFFICIENT_COUNT,
            ModelKind::Poly => PolyDistortion::COEFFICIENT_COUNT,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = DistortionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DistortionError::UnknownModel(s.to_string()))
    }
}

/// Distortion ratio at an undistorted radius together with its derivatives.
#[derive(Debug, Clone, PartialEq)]
pub struct RadialJacobian {
    /// `q(r)`
    pub ratio: f64,
    /// `∂q/∂r`
    pub d_radius: f64,
    /// `∂q/∂c` in persisted coefficient order.
    pub d_coefficients: DVector<f64>,
}

/// Undistortion ratio at a distorted radius together with its derivatives.
#[derive(Debug, Clone, PartialEq)]
pub struct UndistortJacobian {
    /// `Q(rpp)`
    pub ratio: f64,
    /// `rpp / Q(rpp)`
    pub undistorted_radius: f64,
    /// `∂Q/∂rpp`
    pub d_radius: f64,
    /// `∂Q/∂c` at fixed `rpp`, in persisted coefficient order.
    pub d_coefficients: DVector<f64>,
}

/// Common interface of the radial distortion families.
pub trait RadialDistortion: Send + Sync + Clone + fmt::Debug {
    fn kind(&self) -> ModelKind;

    /// Coefficients in persisted order.
    fn coefficients(&self) -> Vec<f64>;

    fn validate_params(&self) -> Result<(), DistortionError>;

    /// Ratio `q(r)` such that the distorted radius is `r·q(r)`.
    ///
    /// # Arguments
    ///
    /// * `radius` - Undistorted normalized radius, `r ≥ 0`
    ///
    /// # Returns
    ///
    /// The ratio, or [`DistortionError::Domain`] if `r` lies outside the
    /// model's support or the resulting ratio is not positive.
    fn radial_distort(&self, radius: f64) -> Result<f64, DistortionError>;

    /// Ratio with its derivatives with respect to the radius and the coefficients.
    fn radial_distort_with_jacobian(&self, radius: f64) -> Result<RadialJacobian, DistortionError>;

    /// Ratio `Q(rpp)` such that the undistorted radius is `rpp / Q(rpp)`.
    fn radial_undistort(&self, distorted_radius: f64) -> Result<f64, DistortionError>;

    /// Undistortion ratio with its derivatives.
    ///
    /// With `rp = rpp / Q` and `s = q(rp) + rp·q'(rp)` the slope of the forward
    /// map, the implicit function theorem gives
    ///
    /// ```text
    /// ∂Q/∂rpp = q'(rp) / s
    /// ∂Q/∂c   = ∂q/∂c · q(rp) / s
    /// ```
    fn radial_undistort_with_jacobian(
        &self,
        distorted_radius: f64,
    ) -> Result<UndistortJacobian, DistortionError> {
        let ratio = self.radial_undistort(distorted_radius)?;
        if distorted_radius <= ORIGIN_RADIUS {
            return Ok(UndistortJacobian {
                ratio,
                undistorted_radius: distorted_radius,
                d_radius: 0.0,
                d_coefficients: DVector::zeros(self.kind().coefficient_count()),
            });
        }

        let undistorted_radius = distorted_radius / ratio;
        let forward = self.radial_distort_with_jacobian(undistorted_radius)?;
        let slope = forward.ratio + undistorted_radius * forward.d_radius;
        if slope.abs() < GEOMETRIC_PRECISION {
            return Err(DistortionError::Domain {
                model: self.kind(),
                radius: distorted_radius,
                reason: "distortion is not locally invertible".to_string(),
            });
        }

        Ok(UndistortJacobian {
            ratio,
            undistorted_radius,
            d_radius: forward.d_radius / slope,
            d_coefficients: forward.d_coefficients * (forward.ratio / slope),
        })
    }

    fn get_model_name(&self) -> &'static str {
        self.kind().name()
    }
}

/// Any of the supported distortion models.
#[derive(Debug, Clone, PartialEq)]
pub enum Distortion {
    Stereographic(StereographicDistortion),
    Unified(UnifiedDistortion),
    Rational(RationalDistortion),
    Fisheye(FisheyeDistortion),
    Poly(PolyDistortion),
}

impl Distortion {
    /// Build a model from its persisted coefficients.
    pub fn new(kind: ModelKind, coefficients: &[f64]) -> Result<Self, DistortionError> {
        Ok(match kind {
            ModelKind::Stereographic => {
                Distortion::Stereographic(StereographicDistortion::from_coefficients(coefficients)?)
            }
            ModelKind::Unified => {
                Distortion::Unified(UnifiedDistortion::from_coefficients(coefficients)?)
            }
            ModelKind::Rational => {
                Distortion::Rational(RationalDistortion::from_coefficients(coefficients)?)
            }
            ModelKind::Fisheye => {
                Distortion::Fisheye(FisheyeDistortion::from_coefficients(coefficients)?)
            }
            ModelKind::Poly => Distortion::Poly(PolyDistortion::from_coefficients(coefficients)?),
        })
    }

    /// Zero-distortion coefficients for `kind`.
    ///
    /// The ratio is 1 everywhere for every model except fisheye, which has no
    /// identity: zero fisheye coefficients give the equidistant projection
    /// `q(r) = atan(r) / r`.
    pub fn identity(kind: ModelKind) -> Self {
        match kind {
            ModelKind::Stereographic => {
                Distortion::Stereographic(StereographicDistortion::identity())
            }
            ModelKind::Unified => Distortion::Unified(UnifiedDistortion::identity()),
            ModelKind::Rational => Distortion::Rational(RationalDistortion::identity()),
            ModelKind::Fisheye => Distortion::Fisheye(FisheyeDistortion::identity()),
            ModelKind::Poly => Distortion::Poly(PolyDistortion::identity()),
        }
    }

    pub fn coefficient_count(&self) -> usize {
        self.kind().coefficient_count()
    }

    /// Root-finding settings for the polynomial models. Stereographic and
    /// unified invert in closed form and are returned unchanged.
    pub fn with_root_config(self, config: RootConfig) -> Self {
        match self {
            Distortion::Rational(m) => Distortion::Rational(m.with_root_config(config)),
            Distortion::Fisheye(m) => Distortion::Fisheye(m.with_root_config(config)),
            Distortion::Poly(m) => Distortion::Poly(m.with_root_config(config)),
            closed_form => closed_form,
        }
    }

    /// Root-finding settings, or `None` for the closed-form models.
    pub fn root_config(&self) -> Option<&RootConfig> {
        match self {
            Distortion::Rational(m) => Some(m.root_config()),
            Distortion::Fisheye(m) => Some(m.root_config()),
            Distortion::Poly(m) => Some(m.root_config()),
            Distortion::Stereographic(_) | Distortion::Unified(_) => None,
        }
    }
}

impl RadialDistortion for Distortion {
    fn kind(&self) -> ModelKind {
        match self {
            Distortion::Stereographic(m) => m.kind(),
            Distortion::Unified(m) => m.kind(),
            Distortion::Rational(m) => m.kind(),
            Distortion::Fisheye(m) => m.kind(),
            Distortion::Poly(m) => m.kind(),
        }
    }

    fn coefficients(&self) -> Vec<f64> {
        match self {
            Distortion::Stereographic(m) => m.coefficients(),
            Distortion::Unified(m) => m.coefficients(),
            Distortion::Rational(m) => m.coefficients(),
            Distortion::Fisheye(m) => m.coefficients(),
            Distortion::Poly(m) => m.coefficients(),
        }
    }

    fn validate_params(&self) -> Result<(), DistortionError> {
        match self {
            Distortion::Stereographic(m) => m.validate_params(),
            Distortion::Unified(m) => m.validate_params(),
            Distortion::Rational(m) => m.validate_params(),
            Distortion::Fisheye(m) => m.validate_params(),
            Distortion::Poly(m) => m.validate_params(),
        }
    }

    fn radial_distort(&self, radius: f64) -> Result<f64, DistortionError> {
        match self {
            Distortion::Stereographic(m) => m.radial_distort(radius),
            Distortion::Unified(m) => m.radial_distort(radius),
            Distortion::Rational(m) => m.radial_distort(radius),
            Distortion::Fisheye(m) => m.radial_distort(radius),
            Distortion::Poly(m) => m.radial_distort(radius),
        }
    }

    fn radial_distort_with_jacobian(&self, radius: f64) -> Result<RadialJacobian, DistortionError> {
        match self {
            Distortion::Stereographic(m) => m.radial_distort_with_jacobian(radius),
            Distortion::Unified(m) => m.radial_distort_with_jacobian(radius),
            Distortion::Rational(m) => m.radial_distort_with_jacobian(radius),
            Distortion::Fisheye(m) => m.radial_distort_with_jacobian(radius),
            Distortion::Poly(m) => m.radial_distort_with_jacobian(radius),
        }
    }

    fn radial_undistort(&self, distorted_radius: f64) -> Result<f64, DistortionError> {
        match self {
            Distortion::Stereographic(m) => m.radial_undistort(distorted_radius),
            Distortion::Unified(m) => m.radial_undistort(distorted_radius),
            Distortion::Rational(m) => m.radial_undistort(distorted_radius),
            Distortion::Fisheye(m) => m.radial_undistort(distorted_radius),
            Distortion::Poly(m) => m.radial_undistort(distorted_radius),
        }
    }
}

impl From<StereographicDistortion> for Distortion {
    fn from(model: StereographicDistortion) -> Self {
        Distortion::Stereographic(model)
    }
}

impl From<UnifiedDistortion> for Distortion {
    fn from(model: UnifiedDistortion) -> Self {
        Distortion::Unified(model)
    }
}

impl From<RationalDistortion> for Distortion {
    fn from(model: RationalDistortion) -> Self {
        Distortion::Rational(model)
    }
}

impl From<FisheyeDistortion> for Distortion {
    fn from(model: FisheyeDistortion) -> Self {
        Distortion::Fisheye(model)
    }
}

impl From<PolyDistortion> for Distortion {
    fn from(model: PolyDistortion) -> Self {
        Distortion::Poly(model)
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Reject negative and non-finite radii.
pub(crate) fn check_radius(model: ModelKind, radius: f64) -> Result<(), DistortionError> {
    if !radius.is_finite() || radius < 0.0 {
        return Err(DistortionError::Domain {
            model,
            radius,
            reason: "radius must be finite and non-negative".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn check_coefficient_count(
    model: ModelKind,
    coefficients: &[f64],
) -> Result<(), DistortionError> {
    let expected = model.coefficient_count();
    if coefficients.len() != expected {
        return Err(DistortionError::ShapeMismatch {
            model,
            expected,
            found: coefficients.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_finite(model: ModelKind, coefficients: &[f64]) -> Result<(), DistortionError> {
    if let Some(c) = coefficients.iter().find(|c| !c.is_finite()) {
        return Err(DistortionError::InvalidParams {
            model,
            reason: format!("coefficient {c} is not finite"),
        });
    }
    Ok(())
}

/// Reject non-positive ratios, which would fold the image through the axis.
pub(crate) fn check_ratio(
    model: ModelKind,
    radius: f64,
    ratio: f64,
) -> Result<f64, DistortionError> {
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(DistortionError::Domain {
            model,
            radius,
            reason: format!("distortion ratio {ratio} is not positive"),
        });
    }
    Ok(ratio)
}

/// Pick, among candidate undistorted radii, the one whose ratio
/// `rpp / r` is closest to 1. Ties go to the smaller radius.
pub(crate) fn select_closest_to_unity(
    model: ModelKind,
    distorted_radius: f64,
    candidates: impl IntoIterator<Item = f64>,
) -> Result<f64, DistortionError> {
    candidates
        .into_iter()
        .filter(|r| r.is_finite() && *r > 0.0)
        .map(|r| distorted_radius / r)
        .min_by(|a, b| {
            (a - 1.0)
                .abs()
                .total_cmp(&(b - 1.0).abs())
                .then_with(|| b.total_cmp(a))
        })
        .ok_or(DistortionError::Inversion {
            model,
            radius: distorted_radius,
        })
}
