//! Benchmark: MSM throughput using Criterion
//!
//! Run with: cargo bench
//!
//! Covers host plan execution at several sizes, and GPU execution when an
//! adapter is available.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use naive_msm::curve::{flatten_points, flatten_scalars, random_instance};
use naive_msm::gpu::GpuBackend;
use naive_msm::{
    naive_msm_with, point_mul_plan, GpuContext, GpuExecutor, HostBackend, MsmConfig,
    ScalarChunking, WorkgroupVariant,
};
use std::time::Duration;

fn instance(log_size: u32) -> (Vec<u32>, Vec<u32>) {
    let (points, scalars) = random_instance(1 << log_size, 7);
    (flatten_points(&points), flatten_scalars(&scalars))
}

/// Benchmark 1: plan construction cost (host-side copies only)
fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_build");
    for log_size in [10u32, 14] {
        let (points, scalars) = instance(log_size);
        group.throughput(Throughput::Elements(1 << log_size));
        group.bench_with_input(BenchmarkId::from_parameter(1 << log_size), &log_size, |b, _| {
            b.iter(|| {
                point_mul_plan(1 << log_size, &points, &scalars, true, ScalarChunking::default())
                    .unwrap()
            });
        });
    }
    group.finish();
}

/// Benchmark 2: end-to-end MSM on the CPU backend
fn bench_host(c: &mut Criterion) {
    let mut group = c.benchmark_group("host_msm");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));

    let backend = HostBackend::new();
    let config = MsmConfig::default();
    for log_size in [6u32, 8, 10] {
        let (points, scalars) = instance(log_size);
        group.throughput(Throughput::Elements(1 << log_size));
        group.bench_with_input(BenchmarkId::from_parameter(1 << log_size), &log_size, |b, _| {
            b.iter(|| {
                pollster::block_on(naive_msm_with(&backend, &points, &scalars, &config)).unwrap()
            });
        });
    }
    group.finish();
}

/// Benchmark 3: end-to-end MSM on the GPU, both workgroup sizes
fn bench_gpu(c: &mut Criterion) {
    let ctx = match pollster::block_on(GpuContext::new(0, GpuBackend::Auto)) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Skipping GPU benchmarks: {e}");
            return;
        }
    };

    let mut group = c.benchmark_group("gpu_msm");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(20));

    let executor = GpuExecutor::new(ctx);
    let (points, scalars) = instance(14);
    for workgroup in [WorkgroupVariant::Wg64, WorkgroupVariant::Wg128] {
        let config = MsmConfig {
            workgroup,
            ..MsmConfig::default()
        };
        group.throughput(Throughput::Elements(1 << 14));
        group.bench_with_input(
            BenchmarkId::new("workgroup", workgroup.size()),
            &workgroup,
            |b, _| {
                b.iter(|| {
                    pollster::block_on(naive_msm_with(&executor, &points, &scalars, &config))
                        .unwrap()
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_plan, bench_host, bench_gpu);
criterion_main!(benches);
