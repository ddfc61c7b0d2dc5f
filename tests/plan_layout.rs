//! Integration tests: plan shape and buffer sizing
//!
//! Host-only, no GPU required.

use naive_msm::plan::{Kernel, PortSource};
use naive_msm::{point_mul_plan, ExecutionPlan, ScalarChunking};

fn build(n: usize) -> ExecutionPlan {
    let points = vec![0u32; n * 16];
    let scalars = vec![0u32; n * 8];
    point_mul_plan(n, &points, &scalars, true, ScalarChunking::default()).unwrap()
}

#[test]
fn six_stages_for_every_size() {
    for n in [0, 1, 2, 3, 63, 64, 65, 100, 1000, 4096] {
        let plan = build(n);
        assert_eq!(plan.num_stages(), 6, "N = {n}");
        assert_eq!(plan.info.num_inputs, n);
        assert!(plan.stages.iter().all(|s| s.work_items as usize == n));
    }
}

#[test]
fn single_point_sizes() {
    let plan = build(1);
    assert_eq!(plan.stages[0].inputs[0].size, 64);
    assert_eq!(plan.stages[1].inputs[1].size, 32);
    assert_eq!(plan.stages[0].outputs[0].size, 128);
    assert_eq!(plan.info.output_size, 128);
}

#[test]
fn hundred_point_sizes() {
    let plan = build(100);
    let elevate = &plan.stages[0];
    assert_eq!(elevate.inputs[0].size, 6_400);
    assert_eq!(elevate.outputs[0].size, 12_800);

    let first = &plan.stages[1];
    assert_eq!(first.input("scalars").unwrap().size, 3_200);
    assert_eq!(first.output("temps").unwrap().size, 12_800);
    assert_eq!(plan.info.output_size, 12_800);
}

#[test]
fn empty_plan_is_valid() {
    let plan = point_mul_plan(0, &[], &[], true, ScalarChunking::default()).unwrap();
    assert_eq!(plan.info.output_size, 0);
    assert!(plan.validate().is_ok());
    assert!(plan
        .stages
        .iter()
        .flat_map(|s| s.outputs.iter())
        .all(|p| p.size == 0));
}

#[test]
fn every_multiply_continues_from_previous_stage() {
    let plan = build(5);
    for stage in plan.stages.iter().skip(2) {
        for input in &stage.inputs {
            assert_eq!(input.source, PortSource::Stage(input.name), "{}", stage.label);
        }
    }
    assert_eq!(plan.stages[4].kernel, Kernel::MultiplyFinal);
    assert_eq!(plan.stages[4].outputs.len(), 1);
    assert_eq!(plan.stages[5].kernel, Kernel::Passthrough);
}

#[test]
fn binding_counts_per_kernel() {
    let counts: Vec<usize> = build(2).stages.iter().map(|s| s.binding_count()).collect();
    assert_eq!(counts, vec![2, 5, 6, 6, 4, 2]);
}
