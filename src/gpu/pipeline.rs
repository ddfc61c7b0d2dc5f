//! Compute pipeline setup

use super::GpuContext;
use crate::plan::{Stage, StorageClass, WorkgroupVariant};
use crate::gpu::shaders::ENTRY_POINT;
use std::sync::Arc;
use tracing::debug;
use wgpu::{BindGroupLayout, ComputePipeline};

/// Pipeline for one stage kernel (Clone is cheap - wgpu types are Arc-wrapped)
#[derive(Clone)]
pub struct StagePipeline {
    pub pipeline: Arc<ComputePipeline>,
    pub bind_group_layout: Arc<BindGroupLayout>,
}

impl StagePipeline {
    pub fn new(ctx: &GpuContext, stage: &Stage, variant: WorkgroupVariant) -> Self {
        let label = stage.kernel.name();
        debug!("Creating pipeline for {} kernel", label);

        let shader = ctx.create_shader_module(label, &stage.shader_sources());
        let constants = stage.constants(variant);

        // Inputs take bindings 0..k, outputs follow
        let classes = stage
            .inputs
            .iter()
            .map(|p| p.class)
            .chain(stage.outputs.iter().map(|p| p.class));
        let entries: Vec<wgpu::BindGroupLayoutEntry> = classes
            .enumerate()
            .map(|(binding, class)| storage_entry(binding as u32, class))
            .collect();

        let bind_group_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(label),
                    entries: &entries,
                });

        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[&bind_group_layout],
                immediate_size: 0,
            });

        let pipeline = ctx
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(ENTRY_POINT),
                compilation_options: wgpu::PipelineCompilationOptions {
                    constants: &constants,
                    zero_initialize_workgroup_memory: true,
                },
                cache: None,
            });

        Self {
            pipeline: Arc::new(pipeline),
            bind_group_layout: Arc::new(bind_group_layout),
        }
    }
}

fn storage_entry(binding: u32, class: StorageClass) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage {
                read_only: class.is_read_only(),
            },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
