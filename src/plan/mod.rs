//! Execution plans
//!
//! A plan is a linear list of compute stages. Each stage declares its
//! buffers as named ports; an input port is either uploaded from the host,
//! deferred until the caller binds it, or wired from a named output port of
//! the previous stage. Binding numbers inside a kernel follow port order:
//! inputs first, then outputs.

mod builder;

pub use builder::point_mul_plan;

use crate::field::SCALAR_BITS;
use crate::gpu::shaders;
use anyhow::{anyhow, bail, Result};
use clap::ValueEnum;
use wgpu::BufferUsages;

/// Kernel workgroup size, passed as the `WORKGROUP_SIZE` override
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, ValueEnum)]
pub enum WorkgroupVariant {
    #[default]
    Wg64,
    Wg128,
}

impl WorkgroupVariant {
    pub fn size(self) -> u32 {
        match self {
            Self::Wg64 => 64,
            Self::Wg128 => 128,
        }
    }
}

/// How a 256-bit scalar is split across multiply stages
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ScalarChunking {
    chunk_bits: u32,
    chunk_count: u32,
}

impl Default for ScalarChunking {
    fn default() -> Self {
        Self {
            chunk_bits: 64,
            chunk_count: 4,
        }
    }
}

impl ScalarChunking {
    pub fn new(chunk_bits: u32, chunk_count: u32) -> Result<Self> {
        let chunking = Self {
            chunk_bits,
            chunk_count,
        };
        chunking.validate()?;
        Ok(chunking)
    }

    /// Chunking of `chunk_bits` wide stages covering the whole scalar
    pub fn with_chunk_bits(chunk_bits: u32) -> Result<Self> {
        if chunk_bits == 0 || SCALAR_BITS % chunk_bits != 0 {
            bail!("Chunk width {} does not divide {}", chunk_bits, SCALAR_BITS);
        }
        Self::new(chunk_bits, SCALAR_BITS / chunk_bits)
    }

    /// First and final multiply are separate kernels, so at least two chunks
    /// are needed, and together they must cover the whole scalar.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_count < 2 {
            bail!("Scalar chunking needs at least 2 chunks, got {}", self.chunk_count);
        }
        if self.chunk_bits == 0 || self.chunk_bits.checked_mul(self.chunk_count) != Some(SCALAR_BITS) {
            bail!(
                "{} chunks of {} bits do not cover a {}-bit scalar",
                self.chunk_count,
                self.chunk_bits,
                SCALAR_BITS
            );
        }
        Ok(())
    }

    pub fn chunk_bits(&self) -> u32 {
        self.chunk_bits
    }

    pub fn chunk_count(&self) -> u32 {
        self.chunk_count
    }

    /// Number of intermediate multiply stages between the first and final one
    pub fn intermediate_stages(&self) -> u32 {
        self.chunk_count.saturating_sub(2)
    }
}

/// Plan-wide settings
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MsmConfig {
    pub chunking: ScalarChunking,
    pub workgroup: WorkgroupVariant,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StorageClass {
    ReadOnly,
    ReadWrite,
}

impl StorageClass {
    pub fn is_read_only(self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}

/// Where an input buffer's contents come from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortSource {
    /// Uploaded from the host when the plan runs
    Upload(Vec<u32>),
    /// Must be bound with [`ExecutionPlan::bind`] before the plan runs
    Deferred,
    /// Copied from the previous stage's output port of this name
    Stage(&'static str),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputPort {
    pub name: &'static str,
    pub class: StorageClass,
    pub size: u64,
    pub usage: BufferUsages,
    pub source: PortSource,
}

impl InputPort {
    pub fn upload(name: &'static str, size: u64, words: Vec<u32>) -> Self {
        Self::with_source(name, size, PortSource::Upload(words))
    }

    pub fn deferred(name: &'static str, size: u64) -> Self {
        Self::with_source(name, size, PortSource::Deferred)
    }

    pub fn wired(name: &'static str, size: u64) -> Self {
        Self::with_source(name, size, PortSource::Stage(name))
    }

    fn with_source(name: &'static str, size: u64, source: PortSource) -> Self {
        Self {
            name,
            class: StorageClass::ReadOnly,
            size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
            source,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputPort {
    pub name: &'static str,
    pub class: StorageClass,
    pub size: u64,
    pub usage: BufferUsages,
}

impl OutputPort {
    pub fn new(name: &'static str, size: u64) -> Self {
        Self {
            name,
            class: StorageClass::ReadWrite,
            size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC,
        }
    }
}

/// Stage kernels, one WGSL entry each
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Kernel {
    Elevate,
    MultiplyFirst,
    MultiplyIntermediate,
    MultiplyFinal,
    Passthrough,
}

impl Kernel {
    pub fn entry_source(self) -> &'static str {
        match self {
            Self::Elevate => shaders::ELEVATE_WGSL,
            Self::MultiplyFirst => shaders::MUL_FIRST_WGSL,
            Self::MultiplyIntermediate => shaders::MUL_INTERMEDIATE_WGSL,
            Self::MultiplyFinal => shaders::MUL_FINAL_WGSL,
            Self::Passthrough => shaders::PASSTHROUGH_WGSL,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Elevate => "elevate",
            Self::MultiplyFirst => "multiply-first",
            Self::MultiplyIntermediate => "multiply-intermediate",
            Self::MultiplyFinal => "multiply-final",
            Self::Passthrough => "passthrough",
        }
    }

    pub fn is_multiply(self) -> bool {
        matches!(
            self,
            Self::MultiplyFirst | Self::MultiplyIntermediate | Self::MultiplyFinal
        )
    }
}

/// One data-parallel dispatch over `work_items` items
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stage {
    pub label: String,
    pub kernel: Kernel,
    pub work_items: u32,
    /// Scalar bits consumed per item; only set for multiply kernels
    pub chunk_bits: Option<u32>,
    pub inputs: Vec<InputPort>,
    pub outputs: Vec<OutputPort>,
}

impl Stage {
    /// Base modules followed by this stage's entry
    pub fn shader_sources(&self) -> Vec<&'static str> {
        let mut sources = shaders::BASE_MODULES.to_vec();
        sources.push(self.kernel.entry_source());
        sources
    }

    /// Override constants for pipeline creation
    pub fn constants(&self, workgroup: WorkgroupVariant) -> Vec<(&'static str, f64)> {
        let mut constants = vec![(shaders::WORKGROUP_SIZE_CONSTANT, workgroup.size() as f64)];
        if let Some(bits) = self.chunk_bits {
            constants.push((shaders::CHUNK_BITS_CONSTANT, bits as f64));
        }
        constants
    }

    pub fn input(&self, name: &str) -> Option<&InputPort> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&OutputPort> {
        self.outputs.iter().find(|p| p.name == name)
    }

    pub fn binding_count(&self) -> usize {
        self.inputs.len() + self.outputs.len()
    }
}

/// What the caller needs to decode the final read-back
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PlanInfo {
    pub num_inputs: usize,
    pub output_size: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub stages: Vec<Stage>,
    pub info: PlanInfo,
    pub chunking: ScalarChunking,
    pub workgroup: WorkgroupVariant,
}

impl ExecutionPlan {
    pub fn with_workgroup(mut self, workgroup: WorkgroupVariant) -> Self {
        self.workgroup = workgroup;
        self
    }

    /// Check chunking and the name/size agreement of every wired input
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;

        for (index, stage) in self.stages.iter().enumerate() {
            if stage.kernel.is_multiply() != stage.chunk_bits.is_some() {
                bail!("Stage '{}' has inconsistent chunk width", stage.label);
            }

            let previous = index.checked_sub(1).map(|i| &self.stages[i]);
            for input in &stage.inputs {
                let PortSource::Stage(source) = input.source else {
                    continue;
                };
                let previous = previous.ok_or_else(|| {
                    anyhow!(
                        "Stage '{}' wires input '{}' but has no previous stage",
                        stage.label,
                        input.name
                    )
                })?;
                let output = previous.output(source).ok_or_else(|| {
                    anyhow!(
                        "Stage '{}' wires input '{}' from missing output '{}' of '{}'",
                        stage.label,
                        input.name,
                        source,
                        previous.label
                    )
                })?;
                if output.size != input.size {
                    bail!(
                        "Stage '{}' input '{}' is {} bytes but '{}' output '{}' is {} bytes",
                        stage.label,
                        input.name,
                        input.size,
                        previous.label,
                        output.name,
                        output.size
                    );
                }
            }
        }

        match self.final_output() {
            Some(output) if output.size != self.info.output_size => bail!(
                "Final output is {} bytes, plan metadata says {}",
                output.size,
                self.info.output_size
            ),
            None if !self.stages.is_empty() => bail!("Final stage declares no outputs"),
            _ => Ok(()),
        }
    }

    /// Supply contents for a deferred input of the first stage
    pub fn bind(&mut self, name: &str, words: Vec<u32>) -> Result<()> {
        let stage = self
            .stages
            .first_mut()
            .ok_or_else(|| anyhow!("Plan has no stages"))?;
        let port = stage
            .inputs
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| anyhow!("First stage has no input '{}'", name))?;
        if port.source != PortSource::Deferred {
            bail!("Input '{}' is not deferred", name);
        }
        port.source = PortSource::Upload(words);
        Ok(())
    }

    /// Fail if any deferred input is still unbound
    pub fn ensure_bound(&self) -> Result<()> {
        for stage in &self.stages {
            if let Some(port) = stage
                .inputs
                .iter()
                .find(|p| p.source == PortSource::Deferred)
            {
                bail!("Input '{}' of stage '{}' was never bound", port.name, stage.label);
            }
        }
        Ok(())
    }

    /// The read-back buffer: first output of the last stage
    pub fn final_output(&self) -> Option<&OutputPort> {
        self.stages.last().and_then(|s| s.outputs.first())
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }
}
