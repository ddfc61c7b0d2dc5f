//! Multipass plan execution on the GPU
//!
//! All stages are recorded into one command encoder, one compute pass per
//! stage. wgpu orders the passes and the copies between them, so each stage
//! sees the previous stage's completed outputs.

use super::{GpuContext, StageBuffers, StagePipeline};
use crate::backend::ComputeBackend;
use crate::field::WORD_BYTES;
use crate::plan::{ExecutionPlan, Kernel};
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info};
use wgpu::BufferUsages;

/// Runs execution plans on a wgpu device
#[derive(Clone)]
pub struct GpuExecutor {
    ctx: GpuContext,
}

impl GpuExecutor {
    pub fn new(ctx: GpuContext) -> Self {
        Self { ctx }
    }

    /// Reject plans the device cannot dispatch before anything is submitted
    fn check_limits(&self, plan: &ExecutionPlan) -> Result<()> {
        let max_size = self.ctx.max_storage_buffer_size();
        let max_workgroups = self.ctx.max_workgroups();
        for stage in &plan.stages {
            let workgroups = stage.work_items.div_ceil(plan.workgroup.size());
            if workgroups > max_workgroups {
                bail!(
                    "Stage '{}' needs {} workgroups, device allows {}",
                    stage.label,
                    workgroups,
                    max_workgroups
                );
            }
            let sizes = stage
                .inputs
                .iter()
                .map(|p| p.size)
                .chain(stage.outputs.iter().map(|p| p.size));
            for size in sizes {
                if size > max_size {
                    bail!(
                        "Stage '{}' needs a {} byte buffer, device allows {}",
                        stage.label,
                        size,
                        max_size
                    );
                }
            }
        }
        Ok(())
    }
}

impl ComputeBackend for GpuExecutor {
    fn name(&self) -> String {
        format!("{} ({:?})", self.ctx.device_name(), self.ctx.backend())
    }

    async fn execute(&self, plan: &ExecutionPlan) -> Result<Option<Vec<u32>>> {
        plan.validate()?;
        plan.ensure_bound()?;

        let Some(result_port) = plan.final_output() else {
            return Ok(None);
        };
        // Zero-sized bindings are invalid, so an empty plan never reaches the device
        if plan.info.num_inputs == 0 || result_port.size == 0 {
            debug!("Plan has no work items, skipping dispatch");
            return Ok(None);
        }
        self.check_limits(plan)?;

        let start = Instant::now();
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("MSM Encoder"),
            });

        let mut pipelines: HashMap<Kernel, StagePipeline> = HashMap::new();
        let mut previous: Option<StageBuffers> = None;

        for stage in &plan.stages {
            let pipeline = pipelines
                .entry(stage.kernel)
                .or_insert_with(|| StagePipeline::new(&self.ctx, stage, plan.workgroup));
            let buffers =
                StageBuffers::new(&self.ctx, pipeline, stage, previous.as_ref(), &mut encoder)?;

            let workgroups = stage.work_items.div_ceil(plan.workgroup.size());
            debug!(
                "Stage {}: {} items, {} workgroups, {} inputs",
                stage.label,
                stage.work_items,
                workgroups,
                buffers.input_count()
            );

            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(&stage.label),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&pipeline.pipeline);
                pass.set_bind_group(0, &buffers.bind_group, &[]);
                pass.dispatch_workgroups(workgroups, 1, 1);
            }

            previous = Some(buffers);
        }

        let last = previous.context("Plan has no stages")?;
        let staging = self.ctx.create_buffer::<u8>(
            "Staging Buffer",
            BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            result_port.size,
        );
        encoder.copy_buffer_to_buffer(last.output(result_port.name)?, 0, &staging, 0, result_port.size);

        self.ctx.queue.submit(Some(encoder.finish()));

        let words = self
            .ctx
            .read_buffer::<u32>(&staging, 0, result_port.size / WORD_BYTES as u64)
            .await?;

        info!(
            "GPU ran {} stages over {} points in {:.2?}",
            plan.num_stages(),
            plan.info.num_inputs,
            start.elapsed()
        );
        Ok(Some(words))
    }
}
