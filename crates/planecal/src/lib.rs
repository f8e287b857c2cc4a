//! Planar camera projection with uncertainty propagation.
//!
//! A pinhole camera with radial distortion observes the world plane `z = 0`.
//! The crate provides:
//!
//! - [`direct`]: world points to pixels
//! - [`inverse`]: pixels back onto the plane, one stage at a time
//! - [`uncertainty`]: first-order covariance propagation through the inverse stages
//! - [`codec`] and [`residual`]: flat parameter vectors and residuals for external optimizers
//! - [`calibration`]: boundaries to external intrinsic calibration and least-squares refinement
//! - [`io`]: JSON persistence of calibrated cameras
//!
//! Five distortion families are supported, see [`ModelKind`].
//!
//! # Example
//!
//! ```
//! use nalgebra::Vector3;
//! use planecal::{CameraExtrinsics, CameraIntrinsics, Distortion, ModelKind, PlanarCamera};
//!
//! let camera = PlanarCamera::new(
//!     CameraIntrinsics::new(600.0, 600.0, 320.0, 240.0)?,
//!     CameraExtrinsics::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 2.0)),
//!     Distortion::new(ModelKind::Fisheye, &[0.05, 0.0, 0.0, 0.0])?,
//! )?;
//!
//! let pixel = camera.project_point(&Vector3::new(0.1, 0.2, 0.0))?;
//! let world = camera.unproject_point(&pixel)?;
//! assert!((world - Vector3::new(0.1, 0.2, 0.0)).norm() < 1e-9);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod calibration;
pub mod camera;
pub mod codec;
pub mod direct;
pub mod error;
pub mod inverse;
pub mod io;
pub mod logger;
pub mod residual;
pub mod uncertainty;

pub use calibration::{
    CalibrationFlags, ImageSize, IntrinsicCalibration, IntrinsicCalibrationConfig,
    IntrinsicCalibrationRequest, IntrinsicCalibrator, LeastSquaresSolver, RefinementOutcome,
    TerminationCriteria, calibrate_direct, calibrate_intrinsic, calibrate_inverse,
};
pub use camera::{CameraExtrinsics, CameraIntrinsics, PlanarCamera, ProjectionTolerances};
pub use codec::{format_camera, format_parameters, parameter_count, retrieve_parameters};
pub use direct::project;
pub use error::{PlanecalError, PlanecalResult};
pub use inverse::{distorted_to_undistorted, pixel_to_distorted, undistorted_to_plane, unproject};
pub use io::{CameraParameters, load_camera, save_camera};
pub use logger::{init_logger, init_logger_with_level};
pub use residual::{CalibrationModel, residual_direct, residual_inverse, rms_error};
pub use uncertainty::{InputCovariances, PixelCovariance, PropagatedPoint, StageOutput, propagate};

pub use planecal_distortion::{
    Distortion, DistortionError, ModelKind, RadialDistortion, RootConfig,
};
pub use planecal_manifolds::{Pose, SO3};
