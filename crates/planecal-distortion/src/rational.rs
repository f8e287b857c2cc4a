//! Rational radial distortion (OpenCV `CALIB_RATIONAL_MODEL`).
//!
//! Coefficients are stored in OpenCV order `[k1, k2, p1, p2, k3, k4, k5, k6]`.
//! The tangential terms `p1`, `p2` are carried so the array keeps its shape,
//! but the radial model ignores them.
//!
//! # Mathematical Model
//!
//! ```text
//! q(r) = (1 + k1·r² + k2·r⁴ + k3·r⁶) / (1 + k4·r² + k5·r⁴ + k6·r⁶)
//! ```
//!
//! # Inverse
//!
//! `rp` is a positive real root of
//!
//! ```text
//! k3·r⁷ - rpp·k6·r⁶ + k2·r⁵ - rpp·k5·r⁴ + k1·r³ - rpp·k4·r² + r - rpp = 0
//! ```

use crate::{
    DistortionError, ModelKind, ORIGIN_RADIUS, RadialDistortion, RadialJacobian,
    check_coefficient_count, check_finite, check_radius, check_ratio,
    roots::{RootConfig, real_roots},
    select_closest_to_unity,
};
use nalgebra::DVector;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RationalDistortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
    pub k4: f64,
    pub k5: f64,
    pub k6: f64,
    root_config: RootConfig,
}

impl RationalDistortion {
    pub const KIND: ModelKind = ModelKind::Rational;
    pub const COEFFICIENT_COUNT: usize = 8;

    pub fn from_coefficients(coefficients: &[f64]) -> Result<Self, DistortionError> {
        check_coefficient_count(Self::KIND, coefficients)?;
        let model = Self {
            k1: coefficients[0],
            k2: coefficients[1],
            p1: coefficients[2],
            p2: coefficients[3],
            k3: coefficients[4],
            k4: coefficients[5],
            k5: coefficients[6],
            k6: coefficients[7],
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

    /// Numerator and denominator of the ratio.
    fn terms(&self, r2: f64) -> (f64, f64) {
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        (
            1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6,
            1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6,
        )
    }
}

impl RadialDistortion for RationalDistortion {
    fn kind(&self) -> ModelKind {
        Self::KIND
    }

    fn coefficients(&self) -> Vec<f64> {
        vec![
            self.k1, self.k2, self.p1, self.p2, self.k3, self.k4, self.k5, self.k6,
        ]
    }

    fn validate_params(&self) -> Result<(), DistortionError> {
        check_finite(Self::KIND, &self.coefficients())
    }

    fn radial_distort(&self, radius: f64) -> Result<f64, DistortionError> {
        check_radius(Self::KIND, radius)?;
        if radius <= ORIGIN_RADIUS {
            return Ok(1.0);
        }
        let (numerator, denominator) = self.terms(radius * radius);
        if denominator <= 0.0 {
            return Err(DistortionError::Domain {
                model: Self::KIND,
                radius,
                reason: format!("denominator {denominator} is not positive"),
            });
        }
        check_ratio(Self::KIND, radius, numerator / denominator)
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

        let r = radius;
        let r2 = r * r;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let (numerator, denominator) = self.terms(r2);
        let d_numerator = 2.0 * self.k1 * r + 4.0 * self.k2 * r2 * r + 6.0 * self.k3 * r4 * r;
        let d_denominator = 2.0 * self.k4 * r + 4.0 * self.k5 * r2 * r + 6.0 * self.k6 * r4 * r;
        let denominator2 = denominator * denominator;

        let d_coefficients = DVector::from_vec(vec![
            r2 / denominator,
            r4 / denominator,
            0.0,
            0.0,
            r6 / denominator,
            -numerator * r2 / denominator2,
            -numerator * r4 / denominator2,
            -numerator * r6 / denominator2,
        ]);

        Ok(RadialJacobian {
            ratio,
            d_radius: (d_numerator * denominator - numerator * d_denominator) / denominator2,
            d_coefficients,
        })
    }

    fn radial_undistort(&self, distorted_radius: f64) -> Result<f64, DistortionError> {
        check_radius(Self::KIND, distorted_radius)?;
        if distorted_radius <= ORIGIN_RADIUS {
            return Ok(1.0);
        }

        let rpp = distorted_radius;
        let polynomial = [
            -rpp,
            1.0,
            -rpp * self.k4,
            self.k1,
            -rpp * self.k5,
            self.k2,
            -rpp * self.k6,
            self.k3,
        ];
        let candidates = real_roots(&polynomial, &self.root_config)
            .into_iter()
            .filter(|r| self.radial_distort(*r).is_ok());
        select_closest_to_unity(Self::KIND, rpp, candidates)
    }
}
