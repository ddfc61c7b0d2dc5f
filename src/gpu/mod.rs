//! GPU compute module

mod buffers;
mod context;
mod executor;
mod pipeline;
pub mod shaders;

pub use buffers::StageBuffers;
pub use context::{GpuBackend, GpuContext};
pub use executor::GpuExecutor;
pub use pipeline::StagePipeline;
