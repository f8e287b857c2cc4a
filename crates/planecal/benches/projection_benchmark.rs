//! Batch projection benchmarks
//!
//! Measures direct projection, inverse projection and full covariance
//! propagation for every distortion model on a dense plane grid.
//!
//! ## Usage
//!
//! ```bash
//! cargo bench --bench projection_benchmark
//! ```

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use nalgebra::{DMatrix, Matrix2, Matrix4, Matrix6, Vector2, Vector3};
use planecal::{
    CameraExtrinsics, CameraIntrinsics, Distortion, InputCovariances, ModelKind, PlanarCamera,
    PlanecalResult, init_logger, propagate,
};
use std::hint::black_box;

const GRID_SIDE: usize = 64;

fn coefficients(kind: ModelKind) -> Vec<f64> {
    match kind {
        ModelKind::Stereographic => vec![2.0],
        ModelKind::Unified => vec![0.8],
        ModelKind::Rational => vec![-0.28, 0.07, 0.0, 0.0, 0.002, 0.05, 0.01, 0.001],
        ModelKind::Fisheye => vec![-0.02, 0.003, -0.0005, 0.0001],
        ModelKind::Poly => vec![-0.25, 0.07, 0.0, 0.0, -0.005],
    }
}

fn camera(kind: ModelKind) -> PlanecalResult<PlanarCamera> {
    PlanarCamera::new(
        CameraIntrinsics::new(600.0, 605.0, 320.0, 240.0)?,
        CameraExtrinsics::new(Vector3::new(0.12, -0.08, 0.03), Vector3::new(-0.05, 0.04, 1.0)),
        Distortion::new(kind, &coefficients(kind))?,
    )
}

fn world_grid() -> Vec<Vector3<f64>> {
    let step = 0.6 / (GRID_SIDE - 1) as f64;
    (0..GRID_SIDE)
        .flat_map(|i| {
            (0..GRID_SIDE)
                .map(move |j| Vector3::new(-0.3 + step * j as f64, -0.3 + step * i as f64, 0.0))
        })
        .collect()
}

fn projection_benchmark(c: &mut Criterion) {
    init_logger();

    let world = world_grid();
    let mut group = c.benchmark_group("projection");

    for kind in ModelKind::ALL {
        let Ok(camera) = camera(kind) else {
            continue;
        };
        let pixels: Vec<Vector2<f64>> =
            camera.project_points(&world).into_iter().flatten().collect();
        let count = kind.coefficient_count();
        let covariances = InputCovariances::new()
            .with_pixel(Matrix2::identity() * 0.25)
            .with_intrinsics(Matrix4::identity())
            .with_coefficients(DMatrix::identity(count, count) * 1e-6)
            .with_pose(Matrix6::identity() * 1e-6);

        group.bench_with_input(BenchmarkId::new("direct", kind), &world, |b, world| {
            b.iter(|| camera.project_points(black_box(world)))
        });
        group.bench_with_input(BenchmarkId::new("inverse", kind), &pixels, |b, pixels| {
            b.iter(|| camera.unproject_points(black_box(pixels)))
        });
        group.bench_with_input(BenchmarkId::new("propagate", kind), &pixels, |b, pixels| {
            b.iter(|| propagate(black_box(pixels), &camera, &covariances))
        });
    }

    group.finish();
}

criterion_group!(benches, projection_benchmark);
criterion_main!(benches);
