//! GPU buffer management
//!
//! Every stage gets fresh buffers. Uploaded inputs are written from the
//! host; wired inputs are filled by a buffer-to-buffer copy from the named
//! output of the previous stage, recorded on the shared encoder ahead of the
//! stage's compute pass.

use super::{GpuContext, StagePipeline};
use crate::field::fit_words;
use crate::plan::{PortSource, Stage};
use anyhow::{anyhow, bail, Result};
use wgpu::{BindGroup, Buffer, CommandEncoder};

/// Buffers bound to one stage dispatch
pub struct StageBuffers {
    inputs: Vec<Buffer>,
    outputs: Vec<(&'static str, Buffer)>,
    pub bind_group: BindGroup,
}

impl StageBuffers {
    pub fn new(
        ctx: &GpuContext,
        pipeline: &StagePipeline,
        stage: &Stage,
        previous: Option<&StageBuffers>,
        encoder: &mut CommandEncoder,
    ) -> Result<Self> {
        let mut inputs = Vec::with_capacity(stage.inputs.len());
        for port in &stage.inputs {
            let label = format!("{} {} in", stage.label, port.name);
            let buffer = match &port.source {
                PortSource::Upload(words) => {
                    ctx.create_buffer_init(&label, port.usage, &fit_words(words, port.size))
                }
                PortSource::Stage(source) => {
                    let previous = previous
                        .ok_or_else(|| anyhow!("Stage '{}' has no previous stage", stage.label))?;
                    let buffer = ctx.create_buffer::<u8>(&label, port.usage, port.size);
                    encoder.copy_buffer_to_buffer(previous.output(source)?, 0, &buffer, 0, port.size);
                    buffer
                }
                PortSource::Deferred => {
                    bail!("Input '{}' of stage '{}' was never bound", port.name, stage.label)
                }
            };
            inputs.push(buffer);
        }

        let outputs: Vec<(&'static str, Buffer)> = stage
            .outputs
            .iter()
            .map(|port| {
                let label = format!("{} {} out", stage.label, port.name);
                (port.name, ctx.create_buffer::<u8>(&label, port.usage, port.size))
            })
            .collect();

        let entries: Vec<wgpu::BindGroupEntry> = inputs
            .iter()
            .chain(outputs.iter().map(|(_, buffer)| buffer))
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&stage.label),
            layout: &pipeline.bind_group_layout,
            entries: &entries,
        });

        Ok(Self {
            inputs,
            outputs,
            bind_group,
        })
    }

    /// Output buffer by port name
    pub fn output(&self, name: &str) -> Result<&Buffer> {
        self.outputs
            .iter()
            .find(|(port, _)| *port == name)
            .map(|(_, buffer)| buffer)
            .ok_or_else(|| anyhow!("No output buffer named '{}'", name))
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }
}
