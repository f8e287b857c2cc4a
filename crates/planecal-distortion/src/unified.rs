//! Unified (unit-sphere) distortion.
//!
//! Points are first lifted onto the unit sphere and then projected from a
//! centre shifted by `ξ` along the optical axis. Expressed as a ratio on the
//! normalized radius and rescaled so that the optical axis is undistorted:
//!
//! # Mathematical Model
//!
//! ```text
//! q(r) = (1 + ξ) / (1 + ξ·√(1 + r²))
//! ```
//!
//! `ξ = 0` is the pinhole model, `ξ = 1` the stereographic projection.
//!
//! # Inverse
//!
//! With `m = rpp / (1 + ξ)`:
//!
//! ```text
//! Q(rpp) = (1 + ξ)(1 - ξ²m²) / (1 + ξ·√(1 + m²(1 - ξ²)))
//! ```
//!
//! valid while `ξ·m < 1`.

use crate::{
    DistortionError, ModelKind, ORIGIN_RADIUS, RadialDistortion, RadialJacobian,
    check_coefficient_count,
    check_finite, check_radius,
};
use nalgebra::DVector;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnifiedDistortion {
    pub xi: f64,
}

impl UnifiedDistortion {
    pub const KIND: ModelKind = ModelKind::Unified;
    pub const COEFFICIENT_COUNT: usize = 1;

    pub fn new(xi: f64) -> Result<Self, DistortionError> {
        let model = Self { xi };
        model.validate_params()?;
        Ok(model)
    }

    pub fn from_coefficients(coefficients: &[f64]) -> Result<Self, DistortionError> {
        check_coefficient_count(Self::KIND, coefficients)?;
        Self::new(coefficients[0])
    }

    /// `ξ = 0`, the undistorted pinhole.
    pub fn identity() -> Self {
        Self { xi: 0.0 }
    }
}

impl RadialDistortion for UnifiedDistortion {
    fn kind(&self) -> ModelKind {
        Self::KIND
    }

    fn coefficients(&self) -> Vec<f64> {
        vec![self.xi]
    }

    fn validate_params(&self) -> Result<(), DistortionError> {
        check_finite(Self::KIND, &[self.xi])?;
        if self.xi < 0.0 {
            return Err(DistortionError::InvalidParams {
                model: Self::KIND,
                reason: format!("xi must be non-negative, got {}", self.xi),
            });
        }
        Ok(())
    }

    fn radial_distort(&self, radius: f64) -> Result<f64, DistortionError> {
        check_radius(Self::KIND, radius)?;
        if radius <= ORIGIN_RADIUS {
            return Ok(1.0);
        }
        let s = (1.0 + radius * radius).sqrt();
        Ok((1.0 + self.xi) / (1.0 + self.xi * s))
    }

    fn radial_distort_with_jacobian(&self, radius: f64) -> Result<RadialJacobian, DistortionError> {
        let ratio = self.radial_distort(radius)?;
        if radius <= ORIGIN_RADIUS {
            return Ok(RadialJacobian {
                ratio,
                d_radius: 0.0,
                d_coefficients: DVector::zeros(Self::COEFFICIENT_COUNT),
            });
        }

        let xi = self.xi;
        let s = (1.0 + radius * radius).sqrt();
        let denominator = 1.0 + xi * s;
        let denominator2 = denominator * denominator;

        Ok(RadialJacobian {
            ratio,
            d_radius: -(1.0 + xi) * xi * (radius / s) / denominator2,
            d_coefficients: DVector::from_vec(vec![(1.0 - s) / denominator2]),
        })
    }

    fn radial_undistort(&self, distorted_radius: f64) -> Result<f64, DistortionError> {
        check_radius(Self::KIND, distorted_radius)?;
        if distorted_radius <= ORIGIN_RADIUS {
            return Ok(1.0);
        }

        let xi = self.xi;
        let m = distorted_radius / (1.0 + xi);
        let folded = 1.0 - xi * xi * m * m;
        if folded <= 0.0 {
            return Err(DistortionError::Domain {
                model: Self::KIND,
                radius: distorted_radius,
                reason: format!("radius beyond the image of the sphere (1 - ξ²m² = {folded})"),
            });
        }
        let discriminant = 1.0 + m * m * (1.0 - xi * xi);
        if discriminant < 0.0 {
            return Err(DistortionError::Domain {
                model: Self::KIND,
                radius: distorted_radius,
                reason: format!("negative discriminant {discriminant}"),
            });
        }

        Ok((1.0 + xi) * folded / (1.0 + xi * discriminant.sqrt()))
    }
}
