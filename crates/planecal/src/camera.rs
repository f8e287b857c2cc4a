//! Camera value types: intrinsics, extrinsics and the assembled planar camera.

use crate::error::{PlanecalError, PlanecalResult};
use nalgebra::{Matrix3, Vector2, Vector3, Vector4, Vector6};
use planecal_distortion::{Distortion, ModelKind, RadialDistortion};
use planecal_manifolds::Pose;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tolerance for the structural zeros of a camera matrix.
const MATRIX_STRUCTURE_TOLERANCE: f64 = 1e-12;

/// Linear intrinsic parameters (zero skew).
///
/// Covariances over the intrinsics use the order `(fx, fy, cx, cy)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    /// Focal length in x direction (pixels)
    pub fx: f64,
    /// Focal length in y direction (pixels)
    pub fy: f64,
    /// Principal point x-coordinate (pixels)
    pub cx: f64,
    /// Principal point y-coordinate (pixels)
    pub cy: f64,
}

impl CameraIntrinsics {
    pub const PARAMETER_COUNT: usize = 4;

    /// Create new intrinsics with validation.
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> PlanecalResult<Self> {
        let intrinsics = Self { fx, fy, cx, cy };
        intrinsics.validate()?;
        Ok(intrinsics)
    }

    pub fn validate(&self) -> PlanecalResult<()> {
        if !(self.fx > 0.0 && self.fy > 0.0) || !self.fx.is_finite() || !self.fy.is_finite() {
            return Err(PlanecalError::InvalidInput(format!(
                "focal lengths must be positive and finite, got fx = {}, fy = {}",
                self.fx, self.fy
            )));
        }
        if !self.cx.is_finite() || !self.cy.is_finite() {
            return Err(PlanecalError::InvalidInput(
                "principal point must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Read intrinsics from `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`.
    pub fn from_matrix(matrix: &Matrix3<f64>) -> PlanecalResult<Self> {
        let structural = [
            (matrix[(0, 1)], 0.0),
            (matrix[(1, 0)], 0.0),
            (matrix[(2, 0)], 0.0),
            (matrix[(2, 1)], 0.0),
            (matrix[(2, 2)], 1.0),
        ];
        if structural
            .iter()
            .any(|(value, expected)| !((value - expected).abs() <= MATRIX_STRUCTURE_TOLERANCE))
        {
            return Err(PlanecalError::InvalidInput(format!(
                "camera matrix must have zero skew and last row [0, 0, 1]: {matrix}"
            )));
        }
        Self::new(
            matrix[(0, 0)],
            matrix[(1, 1)],
            matrix[(0, 2)],
            matrix[(1, 2)],
        )
    }

    pub fn to_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    /// `[fx, fy, cx, cy]`
    pub fn to_vector(&self) -> Vector4<f64> {
        Vector4::new(self.fx, self.fy, self.cx, self.cy)
    }

    /// Pixel to homogeneous (normalized) image-plane coordinates.
    #[inline]
    pub fn pixel_to_normalized(&self, pixel: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new((pixel.x - self.cx) / self.fx, (pixel.y - self.cy) / self.fy)
    }

    #[inline]
    pub fn normalized_to_pixel(&self, normalized: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            self.fx * normalized.x + self.cx,
            self.fy * normalized.y + self.cy,
        )
    }
}

/// World-to-camera pose as a Rodrigues vector and a translation.
///
/// Covariances over the pose use the order `(r₀, r₁, r₂, t₀, t₁, t₂)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CameraExtrinsics {
    pub rotation: Vector3<f64>,
    pub translation: Vector3<f64>,
}

impl CameraExtrinsics {
    pub const PARAMETER_COUNT: usize = 6;

    pub fn new(rotation: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn to_pose(&self) -> PlanecalResult<Pose> {
        Ok(Pose::from_rotation_vector(self.rotation, self.translation)?)
    }

    pub fn to_vector(&self) -> Vector6<f64> {
        let (r, t) = (&self.rotation, &self.translation);
        Vector6::new(r.x, r.y, r.z, t.x, t.y, t.z)
    }

    pub fn from_vector(vector: &Vector6<f64>) -> Self {
        Self {
            rotation: vector.fixed_rows::<3>(0).into_owned(),
            translation: vector.fixed_rows::<3>(3).into_owned(),
        }
    }
}

/// Geometric tolerances used by the projectors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionTolerances {
    /// Minimum `|z|` of a camera-frame point in direct projection.
    pub depth_tolerance: f64,
    /// Minimum `|det|` of the 2×2 plane-intersection system in inverse projection.
    pub plane_tolerance: f64,
}

impl Default for ProjectionTolerances {
    fn default() -> Self {
        Self {
            depth_tolerance: 1e-9,
            plane_tolerance: 1e-10,
        }
    }
}

impl ProjectionTolerances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_depth_tolerance(mut self, tolerance: f64) -> Self {
        self.depth_tolerance = tolerance;
        self
    }

    pub fn with_plane_tolerance(mut self, tolerance: f64) -> Self {
        self.plane_tolerance = tolerance;
        self
    }
}

/// Pinhole camera with radial distortion looking at the world plane `z = 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanarCamera {
    intrinsics: CameraIntrinsics,
    extrinsics: CameraExtrinsics,
    pose: Pose,
    distortion: Distortion,
    tolerances: ProjectionTolerances,
}

impl fmt::Display for PlanarCamera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let k = &self.intrinsics;
        write!(
            f,
            "PlanarCamera({}, fx: {:.3}, fy: {:.3}, cx: {:.3}, cy: {:.3}, coefficients: {:?}, {})",
            self.distortion.kind(),
            k.fx,
            k.fy,
            k.cx,
            k.cy,
            self.distortion.coefficients(),
            self.pose
        )
    }
}

impl PlanarCamera {
    pub fn new(
        intrinsics: CameraIntrinsics,
        extrinsics: CameraExtrinsics,
        distortion: Distortion,
    ) -> PlanecalResult<Self> {
        intrinsics.validate()?;
        distortion.validate_params()?;
        Ok(Self {
            pose: extrinsics.to_pose()?,
            intrinsics,
            extrinsics,
            distortion,
            tolerances: ProjectionTolerances::default(),
        })
    }

    pub fn with_tolerances(mut self, tolerances: ProjectionTolerances) -> Self {
        self.tolerances = tolerances;
        self
    }

    #[inline]
    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    #[inline]
    pub fn extrinsics(&self) -> &CameraExtrinsics {
        &self.extrinsics
    }

    #[inline]
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    #[inline]
    pub fn distortion(&self) -> &Distortion {
        &self.distortion
    }

    #[inline]
    pub fn tolerances(&self) -> &ProjectionTolerances {
        &self.tolerances
    }

    pub fn model(&self) -> ModelKind {
        self.distortion.kind()
    }
}
