//! Generalised stereographic distortion.
//!
//! A single coefficient `k > 0` blends between projection families:
//!
//! # Mathematical Model
//!
//! ```text
//! θ   = atan(r)
//! rpp = k · tan(θ / k)
//! q   = rpp / r
//! ```
//!
//! `k = 1` is the pinhole model, `k = 2` the classical stereographic
//! projection, and `k → ∞` tends to the equidistant projection. The map is
//! defined while `θ / k < π/2` and inverts in closed form:
//!
//! ```text
//! θ  = k · atan(rpp / k)      (requires θ < π/2)
//! rp = tan θ
//! ```

use crate::{
    DistortionError, ModelKind, ORIGIN_RADIUS, RadialDistortion, RadialJacobian,
    check_coefficient_count,
    check_finite, check_radius,
};
use nalgebra::DVector;
use std::f64::consts::FRAC_PI_2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereographicDistortion {
    pub k: f64,
}

impl StereographicDistortion {
    pub const KIND: ModelKind = ModelKind::Stereographic;
    pub const COEFFICIENT_COUNT: usize = 1;

    pub fn new(k: f64) -> Result<Self, DistortionError> {
        let model = Self { k };
        model.validate_params()?;
        Ok(model)
    }

    pub fn from_coefficients(coefficients: &[f64]) -> Result<Self, DistortionError> {
        check_coefficient_count(Self::KIND, coefficients)?;
        Self::new(coefficients[0])
    }

    /// `k = 1`, the undistorted pinhole.
    pub fn identity() -> Self {
        Self { k: 1.0 }
    }

    fn outside_field_of_view(radius: f64) -> DistortionError {
        DistortionError::Domain {
            model: Self::KIND,
            radius,
            reason: "ray angle exceeds the model's field of view".to_string(),
        }
    }
}

impl RadialDistortion for StereographicDistortion {
    fn kind(&self) -> ModelKind {
        Self::KIND
    }

    fn coefficients(&self) -> Vec<f64> {
        vec![self.k]
    }

    fn validate_params(&self) -> Result<(), DistortionError> {
        check_finite(Self::KIND, &[self.k])?;
        if self.k <= 0.0 {
            return Err(DistortionError::InvalidParams {
                model: Self::KIND,
                reason: format!("k must be positive, got {}", self.k),
            });
        }
        Ok(())
    }

    fn radial_distort(&self, radius: f64) -> Result<f64, DistortionError> {
        check_radius(Self::KIND, radius)?;
        if radius <= ORIGIN_RADIUS {
            return Ok(1.0);
        }
        let half = radius.atan() / self.k;
        if half >= FRAC_PI_2 {
            return Err(Self::outside_field_of_view(radius));
        }
        Ok(self.k * half.tan() / radius)
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

        let half = radius.atan() / self.k;
        let tan_half = half.tan();
        let sec2 = 1.0 + tan_half * tan_half;
        // d(rpp)/dr = sec²(θ/k) / (1 + r²)
        let d_distorted = sec2 / (1.0 + radius * radius);
        let d_k = (tan_half - half * sec2) / radius;

        Ok(RadialJacobian {
            ratio,
            d_radius: (d_distorted - ratio) / radius,
            d_coefficients: DVector::from_vec(vec![d_k]),
        })
    }

    fn radial_undistort(&self, distorted_radius: f64) -> Result<f64, DistortionError> {
        check_radius(Self::KIND, distorted_radius)?;
        if distorted_radius <= ORIGIN_RADIUS {
            return Ok(1.0);
        }
        let theta = self.k * (distorted_radius / self.k).atan();
        if theta >= FRAC_PI_2 {
            return Err(Self::outside_field_of_view(distorted_radius));
        }
        Ok(distorted_radius / theta.tan())
    }
}
