//! Polynomial radial distortion (OpenCV default model, radial part).
//!
//! Coefficients are stored in OpenCV order `[k1, k2, p1, p2, k3]`; the
//! tangential terms are carried but ignored.
//!
//! # Mathematical Model
//!
//! ```text
//! q(r) = 1 + k1·r² + k2·r⁴ + k3·r⁶
//! ```
//!
//! # Inverse
//!
//! `rp` is a positive real root of `k3·r⁷ + k2·r⁵ + k1·r³ + r - rpp = 0`.

use crate::{
    DistortionError, ModelKind, ORIGIN_RADIUS, RadialDistortion, RadialJacobian,
    check_coefficient_count, check_finite, check_radius, check_ratio,
    roots::{RootConfig, real_roots},
    select_closest_to_unity,
};
use nalgebra::DVector;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PolyDistortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
    root_config: RootConfig,
}

impl PolyDistortion {
    pub const KIND: ModelKind = ModelKind::Poly;
    pub const COEFFICIENT_COUNT: usize = 5;

    pub fn from_coefficients(coefficients: &[f64]) -> Result<Self, DistortionError> {
        check_coefficient_count(Self::KIND, coefficients)?;
        let model = Self {
            k1: coefficients[0],
            k2: coefficients[1],
            p1: coefficients[2],
            p2: coefficients[3],
            k3: coefficients[4],
            root_config: RootConfig::default(),
        };
        model.validate_params()?;
        Ok(model)
    }

    pub fn identity() -> Self {
        Self::default()
    }

    /// Use `config` when solving for the undistorted radius.
    pub fn with_root_config(mut self, config: RootConfig) -> Self {
        self.root_config = config;
        self
    }

    pub fn root_config(&self) -> &RootConfig {
        &self.root_config
    }
}

impl RadialDistortion for PolyDistortion {
    fn kind(&self) -> ModelKind {
        Self::KIND
    }

    fn coefficients(&self) -> Vec<f64> {
        vec![self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    fn validate_params(&self) -> Result<(), DistortionError> {
        check_finite(Self::KIND, &self.coefficients())
    }

    fn radial_distort(&self, radius: f64) -> Result<f64, DistortionError> {
        check_radius(Self::KIND, radius)?;
        let r2 = radius * radius;
        let ratio = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        check_ratio(Self::KIND, radius, ratio)
    }

    fn radial_distort_with_jacobian(&self, radius: f64) -> Result<RadialJacobian, DistortionError> {
        let ratio = self.radial_distort(radius)?;
        let r = radius;
        let r2 = r * r;
        let r4 = r2 * r2;

        Ok(RadialJacobian {
            ratio,
            d_radius: r * (2.0 * self.k1 + 4.0 * self.k2 * r2 + 6.0 * self.k3 * r4),
            d_coefficients: DVector::from_vec(vec![r2, r4, 0.0, 0.0, r4 * r2]),
        })
    }

    fn radial_undistort(&self, distorted_radius: f64) -> Result<f64, DistortionError> {
        check_radius(Self::KIND, distorted_radius)?;
        if distorted_radius <= ORIGIN_RADIUS {
            return Ok(1.0);
        }

        let polynomial = [
            -distorted_radius,
            1.0,
            0.0,
            self.k1,
            0.0,
            self.k2,
            0.0,
            self.k3,
        ];
        let candidates = real_roots(&polynomial, &self.root_config)
            .into_iter()
            .filter(|r| self.radial_distort(*r).is_ok());
        select_closest_to_unity(Self::KIND, distorted_radius, candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JACOBIAN_TEST_TOLERANCE, NUMERICAL_DERIVATIVE_EPS};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const COEFFICIENTS: [f64; 5] = [-0.25, 0.07, 0.0, 0.0, -0.005];

    #[test]
    fn test_known_ratio() -> TestResult {
        let model = PolyDistortion::from_coefficients(&[0.1, 0.01, 0.0, 0.0, 0.001])?;
        let expected = 1.0 + 0.1 * 0.25 + 0.01 * 0.0625 + 0.001 * 0.015625;
        assert!((model.radial_distort(0.5)? - expected).abs() < 1e-15);
        Ok(())
    }

    #[test]
    fn test_negative_ratio_is_domain_error() -> TestResult {
        let model = PolyDistortion::from_coefficients(&[-1.0, 0.0, 0.0, 0.0, 0.0])?;
        assert!(matches!(
            model.radial_distort(1.5),
            Err(DistortionError::Domain { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_undistort_picks_ratio_closest_to_one() -> TestResult {
        // r - 0.5·r³ = 0.3 has two positive roots; the inner one is physical
        let model = PolyDistortion::from_coefficients(&[-0.5, 0.0, 0.0, 0.0, 0.0])?;
        let ratio = model.radial_undistort(0.3)?;
        let r = 0.3 / ratio;
        assert!((r - 0.5 * r.powi(3) - 0.3).abs() < 1e-12);
        assert!(r < 1.0);
        Ok(())
    }

    #[test]
    fn test_undistort_round_trip() -> TestResult {
        let model = PolyDistortion::from_coefficients(&COEFFICIENTS)?;
        for r in [0.01, 0.3, 0.8] {
            let rpp = r * model.radial_distort(r)?;
            let back = rpp / model.radial_undistort(rpp)?;
            assert!((back - r).abs() < 1e-10);
        }
        Ok(())
    }

    #[test]
    fn test_jacobian_numerical() -> TestResult {
        let model = PolyDistortion::from_coefficients(&COEFFICIENTS)?;
        let eps = NUMERICAL_DERIVATIVE_EPS;
        let r = 0.55;
        let jacobian = model.radial_distort_with_jacobian(r)?;
        let numeric_r =
            (model.radial_distort(r + eps)? - model.radial_distort(r - eps)?) / (2.0 * eps);
        assert!((jacobian.d_radius - numeric_r).abs() < JACOBIAN_TEST_TOLERANCE);

        for i in 0..PolyDistortion::COEFFICIENT_COUNT {
            let mut plus = COEFFICIENTS;
            let mut minus = COEFFICIENTS;
            plus[i] += eps;
            minus[i] -= eps;
            let numeric = (PolyDistortion::from_coefficients(&plus)?.radial_distort(r)?
                - PolyDistortion::from_coefficients(&minus)?.radial_distort(r)?)
                / (2.0 * eps);
            assert!((jacobian.d_coefficients[i] - numeric).abs() < JACOBIAN_TEST_TOLERANCE);
        }
        Ok(())
    }
}
