//! JSON persistence of calibrated cameras.
//!
//! ```json
//! {
//!   "model": "fisheye",
//!   "camera_matrix": [[600.0, 0.0, 320.0], [0.0, 600.0, 240.0], [0.0, 0.0, 1.0]],
//!   "distortion_coefficients": [0.01, 0.0, 0.0, 0.0],
//!   "rotation": [0.0, 0.0, 0.0],
//!   "translation": [0.0, 0.0, 1.0],
//!   "tolerances": { "depth_tolerance": 1e-9, "plane_tolerance": 1e-10 }
//! }
//! ```
//!
//! `rotation` and `translation` are optional; a file holding intrinsics only
//! loads with the identity pose.

use crate::{
    camera::{CameraExtrinsics, CameraIntrinsics, PlanarCamera, ProjectionTolerances},
    error::PlanecalResult,
};
use nalgebra::{Matrix3, Vector3};
use planecal_distortion::{Distortion, ModelKind, RadialDistortion};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::{debug, error};

/// Serialized form of a [`PlanarCamera`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraParameters {
    pub model: ModelKind,
    /// Row-major 3×3 camera matrix
    pub camera_matrix: [[f64; 3]; 3],
    pub distortion_coefficients: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<[f64; 3]>,
    #[serde(default)]
    pub tolerances: ProjectionTolerances,
}

impl CameraParameters {
    pub fn from_camera(camera: &PlanarCamera) -> Self {
        let k = camera.intrinsics().to_matrix();
        let extrinsics = camera.extrinsics();
        Self {
            model: camera.model(),
            camera_matrix: [
                [k[(0, 0)], k[(0, 1)], k[(0, 2)]],
                [k[(1, 0)], k[(1, 1)], k[(1, 2)]],
                [k[(2, 0)], k[(2, 1)], k[(2, 2)]],
            ],
            distortion_coefficients: camera.distortion().coefficients(),
            rotation: Some(extrinsics.rotation.into()),
            translation: Some(extrinsics.translation.into()),
            tolerances: *camera.tolerances(),
        }
    }

    /// Rebuild and validate the camera.
    pub fn to_camera(&self) -> PlanecalResult<PlanarCamera> {
        let rows = &self.camera_matrix;
        let matrix = Matrix3::from_fn(|i, j| rows[i][j]);
        let intrinsics = CameraIntrinsics::from_matrix(&matrix)?;
        let distortion = Distortion::new(self.model, &self.distortion_coefficients)?;
        let extrinsics = CameraExtrinsics::new(
            self.rotation.map(Vector3::from).unwrap_or_else(Vector3::zeros),
            self.translation.map(Vector3::from).unwrap_or_else(Vector3::zeros),
        );
        Ok(PlanarCamera::new(intrinsics, extrinsics, distortion)?.with_tolerances(self.tolerances))
    }

    pub fn to_json_string(&self) -> PlanecalResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(json: &str) -> PlanecalResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Write a camera to a JSON file.
pub fn save_camera(camera: &PlanarCamera, path: impl AsRef<Path>) -> PlanecalResult<()> {
    let path = path.as_ref();
    let json = CameraParameters::from_camera(camera).to_json_string()?;
    fs::write(path, json).inspect_err(|e| error!(?path, %e, "failed to write camera file"))?;
    debug!(?path, model = %camera.model(), "camera saved");
    Ok(())
}

/// Read and validate a camera from a JSON file.
pub fn load_camera(path: impl AsRef<Path>) -> PlanecalResult<PlanarCamera> {
    let path = path.as_ref();
    let json = fs::read_to_string(path)
        .inspect_err(|e| error!(?path, %e, "failed to read camera file"))?;
    let camera = CameraParameters::from_json_str(&json)?.to_camera()?;
    debug!(?path, model = %camera.model(), "camera loaded");
    Ok(camera)
}
