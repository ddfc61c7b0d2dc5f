//! Scalar-multiplication plan
//!
//! Elevate -> first multiply -> intermediate multiply (x chunk_count - 2)
//! -> final multiply -> passthrough. Every stage is N wide and the plan
//! length depends only on the chunking, never on N.

use super::{
    ExecutionPlan, InputPort, Kernel, OutputPort, PlanInfo, ScalarChunking, Stage,
    WorkgroupVariant,
};
use crate::field::{buffer_size, AFFINE_POINT_WORDS, EXTENDED_POINT_WORDS, FIELD_WORDS};
use anyhow::{Context, Result};
use tracing::debug;

const AFFINE_POINTS: &str = "affine_points";
const POINTS: &str = "points";
const SCALARS: &str = "scalars";
const TEMPS: &str = "temps";

/// Build the plan computing `scalar_i * point_i` for every i, leaving the
/// products in extended coordinates. No reduction happens on the device.
///
/// With `upload_points` the affine points are uploaded with the plan;
/// otherwise the `affine_points` input is deferred and must be supplied
/// through [`ExecutionPlan::bind`]. Point and scalar counts are not
/// cross-checked.
pub fn point_mul_plan(
    num_inputs: usize,
    affine_points: &[u32],
    scalars: &[u32],
    upload_points: bool,
    chunking: ScalarChunking,
) -> Result<ExecutionPlan> {
    chunking.validate()?;
    let work_items = u32::try_from(num_inputs)
        .with_context(|| format!("{} inputs do not fit a 32-bit dispatch index", num_inputs))?;

    let affine_size = buffer_size(num_inputs, AFFINE_POINT_WORDS);
    let scalars_size = buffer_size(num_inputs, FIELD_WORDS);
    let points_size = buffer_size(num_inputs, EXTENDED_POINT_WORDS);
    let chunk_bits = Some(chunking.chunk_bits());

    let mut stages = Vec::with_capacity(chunking.chunk_count() as usize + 2);

    let affine_input = if upload_points {
        InputPort::upload(AFFINE_POINTS, affine_size, affine_points.to_vec())
    } else {
        InputPort::deferred(AFFINE_POINTS, affine_size)
    };
    stages.push(Stage {
        label: "elevate".to_string(),
        kernel: Kernel::Elevate,
        work_items,
        chunk_bits: None,
        inputs: vec![affine_input],
        outputs: vec![OutputPort::new(POINTS, points_size)],
    });

    stages.push(Stage {
        label: "multiply-0".to_string(),
        kernel: Kernel::MultiplyFirst,
        work_items,
        chunk_bits,
        inputs: vec![
            InputPort::wired(POINTS, points_size),
            InputPort::upload(SCALARS, scalars_size, scalars.to_vec()),
        ],
        outputs: multiply_outputs(points_size, scalars_size),
    });

    for i in 0..chunking.intermediate_stages() {
        stages.push(Stage {
            label: format!("multiply-{}", i + 1),
            kernel: Kernel::MultiplyIntermediate,
            work_items,
            chunk_bits,
            inputs: multiply_inputs(points_size, scalars_size),
            outputs: multiply_outputs(points_size, scalars_size),
        });
    }

    stages.push(Stage {
        label: format!("multiply-{}", chunking.chunk_count() - 1),
        kernel: Kernel::MultiplyFinal,
        work_items,
        chunk_bits,
        inputs: multiply_inputs(points_size, scalars_size),
        outputs: vec![OutputPort::new(POINTS, points_size)],
    });

    stages.push(Stage {
        label: "passthrough".to_string(),
        kernel: Kernel::Passthrough,
        work_items,
        chunk_bits: None,
        inputs: vec![InputPort::wired(POINTS, points_size)],
        outputs: vec![OutputPort::new(POINTS, points_size)],
    });

    let plan = ExecutionPlan {
        stages,
        info: PlanInfo {
            num_inputs,
            output_size: points_size,
        },
        chunking,
        workgroup: WorkgroupVariant::default(),
    };
    plan.validate()?;

    debug!(
        "Built {} stage plan for {} points ({} byte result)",
        plan.num_stages(),
        num_inputs,
        points_size
    );
    Ok(plan)
}

fn multiply_inputs(points_size: u64, scalars_size: u64) -> Vec<InputPort> {
    vec![
        InputPort::wired(POINTS, points_size),
        InputPort::wired(SCALARS, scalars_size),
        InputPort::wired(TEMPS, points_size),
    ]
}

fn multiply_outputs(points_size: u64, scalars_size: u64) -> Vec<OutputPort> {
    vec![
        OutputPort::new(POINTS, points_size),
        OutputPort::new(SCALARS, scalars_size),
        OutputPort::new(TEMPS, points_size),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{PortSource, StorageClass};
    use wgpu::BufferUsages;

    fn plan(n: usize, upload: bool) -> ExecutionPlan {
        let points = vec![0u32; n * AFFINE_POINT_WORDS];
        let scalars = vec![0u32; n * FIELD_WORDS];
        point_mul_plan(n, &points, &scalars, upload, ScalarChunking::default()).unwrap()
    }

    #[test]
    fn stage_order() {
        let kernels: Vec<Kernel> = plan(3, true).stages.iter().map(|s| s.kernel).collect();
        assert_eq!(
            kernels,
            vec![
                Kernel::Elevate,
                Kernel::MultiplyFirst,
                Kernel::MultiplyIntermediate,
                Kernel::MultiplyIntermediate,
                Kernel::MultiplyFinal,
                Kernel::Passthrough,
            ]
        );
    }

    #[test]
    fn storage_classes_and_usages() {
        for stage in plan(2, true).stages {
            for input in &stage.inputs {
                assert_eq!(input.class, StorageClass::ReadOnly);
                assert_eq!(input.usage, BufferUsages::STORAGE | BufferUsages::COPY_DST);
            }
            for output in &stage.outputs {
                assert_eq!(output.class, StorageClass::ReadWrite);
                assert_eq!(output.usage, BufferUsages::STORAGE | BufferUsages::COPY_SRC);
            }
        }
    }

    #[test]
    fn scalars_are_uploaded_to_first_multiply_only() {
        let plan = plan(2, true);
        let uploads: Vec<(&str, &str)> = plan
            .stages
            .iter()
            .flat_map(|s| {
                s.inputs
                    .iter()
                    .filter(|p| matches!(p.source, PortSource::Upload(_)))
                    .map(move |p| (s.label.as_str(), p.name))
            })
            .collect();
        assert_eq!(
            uploads,
            vec![("elevate", AFFINE_POINTS), ("multiply-0", SCALARS)]
        );
    }

    #[test]
    fn deferred_points_must_be_bound() {
        let mut plan = plan(1, false);
        assert_eq!(plan.stages[0].inputs[0].source, PortSource::Deferred);
        assert!(plan.ensure_bound().is_err());

        assert!(plan.bind(SCALARS, vec![]).is_err());
        plan.bind(AFFINE_POINTS, vec![1; AFFINE_POINT_WORDS]).unwrap();
        assert!(plan.ensure_bound().is_ok());
        assert!(plan.bind(AFFINE_POINTS, vec![]).is_err());
    }

    #[test]
    fn validation_catches_miswired_ports() {
        let mut broken = plan(4, true);
        broken.stages[2].inputs[2].source = PortSource::Stage("missing");
        assert!(broken.validate().is_err());

        let mut broken = plan(4, true);
        broken.stages[3].inputs[1].size += 4;
        assert!(broken.validate().is_err());

        let mut broken = plan(4, true);
        broken.stages[0].inputs[0].source = PortSource::Stage(POINTS);
        assert!(broken.validate().is_err());
    }

    #[test]
    fn chunk_width_reaches_multiply_stages() {
        let chunking = ScalarChunking::new(32, 8).unwrap();
        let plan = point_mul_plan(1, &[0; 16], &[0; 8], true, chunking).unwrap();
        assert_eq!(plan.num_stages(), 10);
        for stage in &plan.stages {
            assert_eq!(stage.chunk_bits.is_some(), stage.kernel.is_multiply());
        }
        assert_eq!(plan.stages[1].chunk_bits, Some(32));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn rejects_inputs_beyond_u32_dispatch() {
        let too_many = u32::MAX as usize + 1;
        let err = point_mul_plan(too_many, &[], &[], false, ScalarChunking::default()).unwrap_err();
        assert!(err.to_string().contains("32-bit dispatch index"));
        assert!(point_mul_plan(0, &[], &[], false, ScalarChunking::default()).is_ok());
    }
}
