//! Benchmarks for the Split-Bregman deconvolution pipeline.
//!
//! Measures one normal-equation application (the CG workhorse) and one full
//! outer iteration at a few cubic volume sizes.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use num_complex::Complex64;
use std::time::Duration;

use sb_deblur::{build_solver, DeblurConfig, LinearOperator, Volume};

/// Deterministic pseudo-random volume (LCG) so runs are comparable.
fn random_volume(n: usize, seed: u64) -> Volume {
    let mut state = seed;
    let mut next = || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 11) as f64 / (1u64 << 53) as f64 - 0.5
    };
    let data = (0..n * n * n).map(|_| Complex64::new(next(), next())).collect();
    Volume::from_shape_vec(&[n, n, n], data).unwrap()
}

/// Separable 3-tap box blur.
fn box_kernel(n: usize) -> Volume {
    let mut kernel = Volume::zeros([n, n, n]).unwrap();
    let w = Complex64::new(1.0 / 27.0, 0.0);
    for k in [0, 1, n - 1] {
        for j in [0, 1, n - 1] {
            for i in [0, 1, n - 1] {
                kernel.as_mut_slice()[i + j * n + k * n * n] = w;
            }
        }
    }
    kernel
}

fn normal_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("normal_apply");
    group.warm_up_time(Duration::from_secs(2));

    for &n in &[32usize, 64] {
        let solver = build_solver(&box_kernel(n), &DeblurConfig::default()).unwrap();
        let op = solver.normal_operator().unwrap();
        let x = random_volume(n, 1);
        let mut out = Volume::zeros([n, n, n]).unwrap();
        group.throughput(Throughput::Elements((n * n * n) as u64));
        group.bench_with_input(BenchmarkId::new("n", n), &n, |b, _| {
            b.iter(|| op.apply_into(criterion::black_box(&x), &mut out).unwrap());
        });
    }
    group.finish();
}

fn outer_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("sb_outer_iteration");
    group.warm_up_time(Duration::from_secs(2));
    group.sample_size(20);

    for &n in &[32usize, 64] {
        let config = DeblurConfig {
            outer_iterations: 1,
            ..Default::default()
        };
        let solver = build_solver(&box_kernel(n), &config).unwrap();
        let observation = random_volume(n, 2);
        group.bench_with_input(BenchmarkId::new("n", n), &n, |b, _| {
            b.iter(|| {
                solver
                    .solve(criterion::black_box(&observation), None, None)
                    .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(sb, normal_apply, outer_iteration);
criterion_main!(sb);
