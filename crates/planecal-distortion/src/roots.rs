//! Real roots of fixed-degree polynomials.
//!
//! Roots are the eigenvalues of the companion matrix, computed through a real
//! Schur decomposition. Eigenvalues whose imaginary part is negligible are
//! kept as real roots and refined with a fixed number of Newton corrections.
//!
//! Coefficients are given in ascending order: `c[0] + c[1]·x + … + c[n]·xⁿ`.

use nalgebra::{DMatrix, linalg::Schur};

/// Coefficients this small relative to the largest one are treated as zero
/// when trimming the leading terms.
const LEADING_COEFFICIENT_EPS: f64 = 1e-14;

/// Iteration cap handed to the Schur decomposition.
const SCHUR_MAX_ITERATIONS: usize = 1000;

/// Settings for [`real_roots`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootConfig {
    /// An eigenvalue `z` is accepted as real when `|Im z| ≤ tol · max(1, |Re z|)`.
    pub imaginary_tolerance: f64,
    /// Newton corrections applied to each real root.
    pub polish_steps: usize,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            imaginary_tolerance: 1e-8,
            polish_steps: 2,
        }
    }
}

impl RootConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_imaginary_tolerance(mut self, tolerance: f64) -> Self {
        self.imaginary_tolerance = tolerance;
        self
    }

    pub fn with_polish_steps(mut self, steps: usize) -> Self {
        self.polish_steps = steps;
        self
    }
}

/// Evaluate a polynomial and its derivative at `x` (Horner scheme).
pub fn evaluate(coefficients: &[f64], x: f64) -> (f64, f64) {
    let mut value = 0.0;
    let mut derivative = 0.0;
    for &c in coefficients.iter().rev() {
        derivative = derivative * x + value;
        value = value * x + c;
    }
    (value, derivative)
}

/// Drop leading (highest-degree) coefficients that are zero relative to the
/// largest coefficient.
fn trim_leading(coefficients: &[f64]) -> &[f64] {
    let scale = coefficients.iter().fold(0.0_f64, |m, c| m.max(c.abs()));
    if scale == 0.0 {
        return &[];
    }
    let mut end = coefficients.len();
    while end > 0 && coefficients[end - 1].abs() <= LEADING_COEFFICIENT_EPS * scale {
        end -= 1;
    }
    &coefficients[..end]
}

/// Companion matrix of the monic polynomial with the given ascending coefficients.
fn companion_matrix(coefficients: &[f64]) -> DMatrix<f64> {
    let degree = coefficients.len() - 1;
    let leading = coefficients[degree];
    let mut companion = DMatrix::<f64>::zeros(degree, degree);
    for i in 1..degree {
        companion[(i, i - 1)] = 1.0;
    }
    for i in 0..degree {
        companion[(i, degree - 1)] = -coefficients[i] / leading;
    }
    companion
}

/// Real roots of a polynomial, sorted ascending with duplicates merged.
///
/// Returns an empty vector for constant (or all-zero) polynomials and when
/// the eigenvalue decomposition does not converge.
pub fn real_roots(coefficients: &[f64], config: &RootConfig) -> Vec<f64> {
    let coefficients = trim_leading(coefficients);
    let mut roots = match coefficients.len() {
        0 | 1 => return Vec::new(),
        2 => vec![-coefficients[0] / coefficients[1]],
        _ => {
            let companion = companion_matrix(coefficients);
            let Some(schur) = Schur::try_new(companion, f64::EPSILON, SCHUR_MAX_ITERATIONS)
            else {
                return Vec::new();
            };
            schur
                .complex_eigenvalues()
                .iter()
                .filter(|z| z.im.abs() <= config.imaginary_tolerance * z.re.abs().max(1.0))
                .map(|z| polish(coefficients, z.re, config.polish_steps))
                .collect()
        }
    };

    roots.retain(|r| r.is_finite());
    roots.sort_by(|a, b| a.total_cmp(b));
    roots.dedup_by(|a, b| (*a - *b).abs() <= 1e-12 * a.abs().max(1.0));
    roots
}

/// Newton corrections on an eigenvalue estimate. A step that leaves the
/// residual larger is discarded.
fn polish(coefficients: &[f64], root: f64, steps: usize) -> f64 {
    let mut x = root;
    for _ in 0..steps {
        let (value, derivative) = evaluate(coefficients, x);
        if value == 0.0 || derivative == 0.0 {
            break;
        }
        let candidate = x - value / derivative;
        if !candidate.is_finite() || evaluate(coefficients, candidate).0.abs() > value.abs() {
            break;
        }
        x = candidate;
    }
    x
}
