//! CLI utilities for tracing

use tracing_subscriber::{fmt, EnvFilter};

/// wgpu and naga log every pipeline and buffer at debug level
const QUIET_GPU_CRATES: &str = "wgpu_core=warn,wgpu_hal=warn,naga=warn";

/// Initialize tracing with optional verbosity.
///
/// `RUST_LOG` wins over both flags when set.
pub fn init_tracing(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},{QUIET_GPU_CRATES}")));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
