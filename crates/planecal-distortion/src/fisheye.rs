//! Fisheye distortion (OpenCV `cv::fisheye`, Kannala-Brandt style).
//!
//! # Mathematical Model
//!
//! ```text
//! θ  = atan(r)
//! θd = θ·(1 + k1·θ² + k2·θ⁴ + k3·θ⁶ + k4·θ⁸)
//! q  = θd / r
//! ```
//!
//! # Inverse
//!
//! `θ ∈ (0, π/2)` is a real root of
//!
//! ```text
//! k4·θ⁹ + k3·θ⁷ + k2·θ⁵ + k1·θ³ + θ - rpp = 0
//! ```
//!
//! and `rp = tan θ`.

use crate::{
    DistortionError, ModelKind, ORIGIN_RADIUS, RadialDistortion, RadialJacobian,
    check_coefficient_count, check_finite, check_radius, check_ratio,
    roots::{RootConfig, real_roots},
    select_closest_to_unity,
};
use nalgebra::DVector;
use std::f64::consts::FRAC_PI_2;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FisheyeDistortion {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub k4: f64,
    root_config: RootConfig,
}

impl FisheyeDistortion {
    pub const KIND: ModelKind = ModelKind::Fisheye;
    pub const COEFFICIENT_COUNT: usize = 4;

    pub fn new(k1: f64, k2: f64, k3: f64, k4: f64) -> Result<Self, DistortionError> {
        let model = Self {
            k1,
            k2,
            k3,
            k4,
            root_config: RootConfig::default(),
        };
        model.validate_params()?;
        Ok(model)
    }

    pub fn from_coefficients(coefficients: &[f64]) -> Result<Self, DistortionError> {
        check_coefficient_count(Self::KIND, coefficients)?;
        Self::new(
            coefficients[0],
            coefficients[1],
            coefficients[2],
            coefficients[3],
        )
    }

    /// All-zero coefficients: the equidistant model `θd = atan(r)`.
    ///
    /// No fisheye coefficients leave the radius unchanged.
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

    /// Distorted angle `θd(θ)` and its derivative `dθd/dθ`.
    fn distorted_angle(&self, theta: f64) -> (f64, f64) {
        let t2 = theta * theta;
        let t4 = t2 * t2;
        let t6 = t4 * t2;
        let t8 = t4 * t4;
        let theta_d = theta * (1.0 + self.k1 * t2 + self.k2 * t4 + self.k3 * t6 + self.k4 * t8);
        let d_theta_d =
            1.0 + 3.0 * self.k1 * t2 + 5.0 * self.k2 * t4 + 7.0 * self.k3 * t6 + 9.0 * self.k4 * t8;
        (theta_d, d_theta_d)
    }
}

impl RadialDistortion for FisheyeDistortion {
    fn kind(&self) -> ModelKind {
        Self::KIND
    }

    fn coefficients(&self) -> Vec<f64> {
        vec![self.k1, self.k2, self.k3, self.k4]
    }

    fn validate_params(&self) -> Result<(), DistortionError> {
        check_finite(Self::KIND, &self.coefficients())
    }

    fn radial_distort(&self, radius: f64) -> Result<f64, DistortionError> {
        check_radius(Self::KIND, radius)?;
        if radius <= ORIGIN_RADIUS {
            return Ok(1.0);
        }
        let (theta_d, _) = self.distorted_angle(radius.atan());
        check_ratio(Self::KIND, radius, theta_d / radius)
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

        let theta = radius.atan();
        let (_, d_theta_d) = self.distorted_angle(theta);
        let d_distorted = d_theta_d / (1.0 + radius * radius);
        let t3 = theta.powi(3);
        let t2 = theta * theta;

        Ok(RadialJacobian {
            ratio,
            d_radius: (d_distorted - ratio) / radius,
            d_coefficients: DVector::from_vec(vec![
                t3 / radius,
                t3 * t2 / radius,
                t3 * t2 * t2 / radius,
                t3 * t2 * t2 * t2 / radius,
            ]),
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
            0.0,
            self.k4,
        ];
        let candidates = real_roots(&polynomial, &self.root_config)
            .into_iter()
            .filter(|theta| *theta > 0.0 && *theta < FRAC_PI_2)
            .map(f64::tan)
            .filter(|r| self.radial_distort(*r).is_ok());
        select_closest_to_unity(Self::KIND, distorted_radius, candidates)
    }
}
