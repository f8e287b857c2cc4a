//! Error types for the planecal library
//!
//! All errors use the `thiserror` crate. Batch operations report these per
//! point; single-point operations return them directly.

use planecal_distortion::DistortionError;
use planecal_manifolds::ManifoldError;
use thiserror::Error;

/// Main result type used throughout the planecal library
pub type PlanecalResult<T> = Result<T, PlanecalError>;

/// Main error type for the planecal library
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanecalError {
    /// A radius outside a distortion model's support
    #[error("Domain error: {0}")]
    Domain(String),

    /// Polynomial undistortion produced no admissible root
    #[error("Inversion error: {0}")]
    Inversion(String),

    /// Camera-frame depth too close to zero during direct projection
    #[error("Degenerate geometry: camera-frame depth {depth:e} is too close to zero")]
    DegenerateGeometry { depth: f64 },

    /// Back-projected ray (nearly) parallel to the target plane
    #[error("Singular geometry: plane intersection determinant {determinant:e} is near zero")]
    SingularGeometry { determinant: f64 },

    /// Inconsistent array lengths or parameter vector size
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Invalid camera or model parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File system errors
    #[error("IO error: {0}")]
    Io(String),

    /// Persisted parameter format errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Failures reported by an external calibrator or solver
    #[error("Calibration error: {0}")]
    Calibration(String),
}

impl From<DistortionError> for PlanecalError {
    fn from(err: DistortionError) -> Self {
        match err {
            DistortionError::Domain { .. } => PlanecalError::Domain(err.to_string()),
            DistortionError::Inversion { .. } => PlanecalError::Inversion(err.to_string()),
            DistortionError::ShapeMismatch { .. } => PlanecalError::ShapeMismatch(err.to_string()),
            DistortionError::InvalidParams { .. } | DistortionError::UnknownModel(_) => {
                PlanecalError::InvalidInput(err.to_string())
            }
        }
    }
}

impl From<ManifoldError> for PlanecalError {
    fn from(err: ManifoldError) -> Self {
        PlanecalError::InvalidInput(err.to_string())
    }
}

impl From<std::io::Error> for PlanecalError {
    fn from(err: std::io::Error) -> Self {
        PlanecalError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PlanecalError {
    fn from(err: serde_json::Error) -> Self {
        PlanecalError::Serialization(err.to_string())
    }
}

/// Fail with [`PlanecalError::ShapeMismatch`] unless two parallel arrays have equal length.
pub(crate) fn check_same_length(
    what: &str,
    expected: usize,
    found: usize,
) -> PlanecalResult<()> {
    if expected != found {
        return Err(PlanecalError::ShapeMismatch(format!(
            "{what}: expected {expected} entries, got {found}"
        )));
    }
    Ok(())
}
