//! Naive MSM: multi-scalar multiplication on ed-on-BLS12-377 using
//! Vulkan/Metal/DX12 compute
//!
//! Every `scalar_i * point_i` runs as an independent chunked double-and-add
//! on the GPU; the products are summed on the host.
//!
//! Supports AMD, NVIDIA, Intel GPUs via wgpu, plus a CPU backend that runs
//! the same execution plan.

pub mod backend;
mod benchmark;
mod cli;
pub mod cpu;
pub mod curve;
pub mod field;
pub mod gpu;
pub mod msm;
pub mod plan;

pub use backend::ComputeBackend;
pub use cpu::HostBackend;
pub use curve::{add_points, create_point, AffineCoordinates};
pub use gpu::{GpuBackend, GpuContext, GpuExecutor};
pub use msm::{naive_msm, naive_msm_with};
pub use plan::{point_mul_plan, ExecutionPlan, MsmConfig, ScalarChunking, WorkgroupVariant};

use anyhow::bail;
use clap::Parser;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Naive multi-scalar multiplication on ed-on-BLS12-377
///
/// Runs an MSM over a seeded random instance of 2^size points and scalars
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Instance size as log2 of the number of points
    #[arg(short, long, default_value = "10")]
    size: u32,

    /// Seed for the random instance
    #[arg(long, default_value = "42")]
    seed: u64,

    /// GPU device index
    #[arg(long, default_value = "0")]
    gpu: u32,

    /// GPU backend
    #[arg(long, value_enum, default_value_t = GpuBackend::Auto)]
    backend: GpuBackend,

    /// Kernel workgroup size
    #[arg(short, long, value_enum, default_value_t = WorkgroupVariant::Wg64)]
    workgroup: WorkgroupVariant,

    /// Scalar bits consumed per multiply stage (must divide 256)
    #[arg(long, default_value = "64")]
    chunk_bits: u32,

    /// Use the CPU backend instead of the GPU
    #[arg(long)]
    cpu: bool,

    /// Check the result against a host reference MSM
    #[arg(long)]
    verify: bool,

    /// Output results in JSON format to stdout
    #[arg(long)]
    json: bool,

    /// Quiet mode - minimal output, just print the result point
    #[arg(short, long)]
    quiet: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Run benchmark suite and print results
    #[arg(long)]
    benchmark: bool,

    /// Save benchmark results to BENCHMARKS.md
    #[arg(long)]
    save_benchmark: bool,
}

#[derive(Serialize)]
struct MsmReport {
    metric: String,
    value: f64,
    unit: String,
    result: AffineCoordinates,
    metadata: Metadata,
}

#[derive(Serialize)]
struct Metadata {
    device: String,
    points: usize,
    seed: u64,
    chunk_bits: u32,
    workgroup_size: u32,
    verified: Option<bool>,
    time_seconds: f64,
}

pub fn run_from_args<I, S>(args: I) -> anyhow::Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<std::ffi::OsString> + Clone,
{
    let args = Args::parse_from(args);
    run(args)
}

/// Run one MSM and time it
fn time_msm<B: ComputeBackend>(
    backend: &B,
    points: &[u32],
    scalars: &[u32],
    config: &MsmConfig,
) -> anyhow::Result<(AffineCoordinates, Duration)> {
    let start = Instant::now();
    let result = pollster::block_on(naive_msm_with(backend, points, scalars, config))?;
    Ok((result, start.elapsed()))
}

pub fn run(args: Args) -> anyhow::Result<()> {
    cli::init_tracing(args.verbose, args.quiet || args.json || args.benchmark);

    if args.benchmark {
        return benchmark::run(args.gpu, args.backend, args.workgroup, args.save_benchmark);
    }

    if args.size > 24 {
        bail!("Instance size 2^{} is too large (max 2^24)", args.size);
    }

    let config = MsmConfig {
        chunking: ScalarChunking::with_chunk_bits(args.chunk_bits)?,
        workgroup: args.workgroup,
    };
    let num_points = 1usize << args.size;
    let show = !args.quiet && !args.json;

    if show {
        info!("Naive MSM");
        info!("=========");
        info!("Points: {} (seed {})", num_points, args.seed);
        info!(
            "Chunking: {} x {} bits",
            config.chunking.chunk_count(),
            config.chunking.chunk_bits()
        );
    }

    let (affine, scalar_words) = curve::random_instance(num_points, args.seed);
    let points = curve::flatten_points(&affine);
    let scalars = curve::flatten_scalars(&scalar_words);

    let (device, (result, duration)) = if args.cpu {
        let backend = HostBackend::new();
        if show {
            info!("Mode: CPU ({})", backend.name());
        }
        (backend.name(), time_msm(&backend, &points, &scalars, &config)?)
    } else {
        let ctx = pollster::block_on(GpuContext::new(args.gpu, args.backend))?;
        let backend = GpuExecutor::new(ctx);
        if show {
            info!("GPU: {}", backend.name());
        }
        (backend.name(), time_msm(&backend, &points, &scalars, &config)?)
    };

    let verified = if args.verify {
        let expected = AffineCoordinates::from(curve::reference_msm(&affine, &scalar_words));
        let ok = expected == result;
        if !ok {
            error!("Verification FAILED: expected {}", expected);
        }
        Some(ok)
    } else {
        None
    };

    if args.json {
        let time_seconds = duration.as_secs_f64();
        let report = MsmReport {
            metric: "msm_time".to_string(),
            value: time_seconds * 1000.0,
            unit: "ms".to_string(),
            result: result.clone(),
            metadata: Metadata {
                device,
                points: num_points,
                seed: args.seed,
                chunk_bits: config.chunking.chunk_bits(),
                workgroup_size: config.workgroup.size(),
                verified,
                time_seconds,
            },
        };
        println!("{}", serde_json::to_string(&report)?);
    } else if args.quiet {
        println!("{}", result);
    } else {
        info!("Result: {}", result);
        if verified == Some(true) {
            info!("Verification: SUCCESS");
        }
        info!("Time elapsed: {:.2}ms", duration.as_secs_f64() * 1000.0);
    }

    if verified == Some(false) {
        bail!("MSM result does not match the host reference");
    }
    Ok(())
}
