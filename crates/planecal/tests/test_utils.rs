//! Shared utilities for planecal integration tests
//!
//! Scene generators, seeded noise, numerical Jacobians and a small dense
//! Levenberg-Marquardt solver standing in for an external optimizer.

#![allow(dead_code)]

use nalgebra::{DMatrix, DVector, Vector2, Vector3};
use planecal::calibration::{LeastSquaresSolver, ResidualFn};
use planecal::{
    CameraExtrinsics, CameraIntrinsics, Distortion, ModelKind, PlanarCamera, PlanecalError,
    PlanecalResult,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Coefficients used for each model in the integration tests.
///
/// All of them keep the distortion monotonic over the normalized radii a
/// 60° field of view produces.
pub fn sample_coefficients(kind: ModelKind) -> Vec<f64> {
    match kind {
        ModelKind::Stereographic => vec![2.0],
        ModelKind::Unified => vec![0.8],
        ModelKind::Rational => vec![-0.28, 0.07, 0.0, 0.0, 0.002, 0.05, 0.01, 0.001],
        ModelKind::Fisheye => vec![-0.02, 0.003, -0.0005, 0.0001],
        ModelKind::Poly => vec![-0.25, 0.07, 0.0, 0.0, -0.005],
    }
}

/// VGA camera about 1 m above the plane, slightly tilted.
pub fn sample_camera(kind: ModelKind) -> PlanecalResult<PlanarCamera> {
    PlanarCamera::new(
        CameraIntrinsics::new(600.0, 605.0, 320.0, 240.0)?,
        CameraExtrinsics::new(Vector3::new(0.12, -0.08, 0.03), Vector3::new(-0.05, 0.04, 1.0)),
        Distortion::new(kind, &sample_coefficients(kind))?,
    )
}

/// `rows × cols` grid on `z = 0`, centred on the origin.
pub fn plane_grid(rows: usize, cols: usize, spacing: f64) -> Vec<Vector3<f64>> {
    let x0 = -0.5 * spacing * (cols - 1) as f64;
    let y0 = -0.5 * spacing * (rows - 1) as f64;
    (0..rows)
        .flat_map(|i| {
            let y = y0 + spacing * i as f64;
            (0..cols).map(move |j| Vector3::new(x0 + spacing * j as f64, y, 0.0))
        })
        .collect()
}

/// Box-Muller standard normal sample.
pub fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.random_range(f64::EPSILON..1.0);
    let u2: f64 = rng.random_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Add isotropic Gaussian noise to pixels.
pub fn perturb_pixels(pixels: &[Vector2<f64>], std_dev: f64, seed: u64) -> Vec<Vector2<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    pixels
        .iter()
        .map(|p| p + Vector2::new(standard_normal(&mut rng), standard_normal(&mut rng)) * std_dev)
        .collect()
}

/// Multiply every parameter by `1 + N(0, percent)`.
pub fn perturb_parameters(params: &DVector<f64>, percent: f64, seed: u64) -> DVector<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    params.map(|value| value * (1.0 + percent * standard_normal(&mut rng)))
}

/// Random symmetric positive-definite matrix `AAᵀ + δI`.
pub fn random_spd(n: usize, scale: f64, rng: &mut StdRng) -> DMatrix<f64> {
    let a = DMatrix::from_fn(n, n, |_, _| rng.random_range(-1.0..1.0));
    (&a * a.transpose() + DMatrix::identity(n, n) * 0.1) * scale
}

/// Project every point and fail on the first error.
pub fn project_all(
    camera: &PlanarCamera,
    points: &[Vector3<f64>],
) -> PlanecalResult<Vec<Vector2<f64>>> {
    camera.project_points(points).into_iter().collect()
}

/// Central-difference Jacobian of a vector function.
pub fn numeric_jacobian<F>(f: F, x: &DVector<f64>, eps: f64) -> PlanecalResult<DMatrix<f64>>
where
    F: Fn(&DVector<f64>) -> PlanecalResult<DVector<f64>>,
{
    let mut columns = Vec::with_capacity(x.len());
    for i in 0..x.len() {
        let step = eps * x[i].abs().max(1.0);
        let mut plus = x.clone();
        let mut minus = x.clone();
        plus[i] += step;
        minus[i] -= step;
        columns.push((f(&plus)? - f(&minus)?) / (2.0 * step));
    }
    Ok(DMatrix::from_columns(&columns))
}

/// Largest elementwise error relative to the magnitude of `expected`.
pub fn relative_error(actual: &DMatrix<f64>, expected: &DMatrix<f64>) -> f64 {
    (actual - expected).amax() / expected.amax().max(1e-12)
}

/// Dense Levenberg-Marquardt with a finite-difference Jacobian.
#[derive(Debug, Clone)]
pub struct NumericLevenbergMarquardt {
    pub max_iterations: usize,
    pub cost_tolerance: f64,
    pub initial_lambda: f64,
}

impl Default for NumericLevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            cost_tolerance: 1e-14,
            initial_lambda: 1e-3,
        }
    }
}

impl LeastSquaresSolver for NumericLevenbergMarquardt {
    fn minimize(
        &self,
        initial: DVector<f64>,
        residual: &ResidualFn<'_>,
    ) -> PlanecalResult<DVector<f64>> {
        let mut params = initial;
        let mut r = residual(&params)?;
        let mut cost = r.norm_squared();
        let mut lambda = self.initial_lambda;

        for _ in 0..self.max_iterations {
            let jacobian = numeric_jacobian(residual, &params, 1e-7)?;
            let jtj = jacobian.transpose() * &jacobian;
            let gradient = jacobian.transpose() * &r;

            let mut improved = false;
            while lambda < 1e10 {
                let damping =
                    DMatrix::from_diagonal(&jtj.diagonal().map(|d| d.max(1e-12))) * lambda;
                let Some(cholesky) = (&jtj + damping).cholesky() else {
                    lambda *= 10.0;
                    continue;
                };
                let candidate = &params - cholesky.solve(&gradient);
                // Steps that leave the model domain count as rejected steps.
                if let Ok(candidate_r) = residual(&candidate) {
                    let candidate_cost = candidate_r.norm_squared();
                    if candidate_cost < cost {
                        let decrease = cost - candidate_cost;
                        params = candidate;
                        r = candidate_r;
                        cost = candidate_cost;
                        lambda = (lambda / 10.0).max(1e-12);
                        improved = true;
                        if decrease <= self.cost_tolerance * cost.max(1.0) {
                            return Ok(params);
                        }
                        break;
                    }
                }
                lambda *= 10.0;
            }
            if !improved {
                break;
            }
        }

        if cost.is_finite() {
            Ok(params)
        } else {
            Err(PlanecalError::Calibration("solver diverged".to_string()))
        }
    }
}
