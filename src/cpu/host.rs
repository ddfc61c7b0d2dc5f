//! Host execution of plans with arkworks arithmetic
//!
//! Mirrors the kernels stage by stage: the same port wiring, the same
//! positional bindings and the same chunked double-and-add, so a GPU run can
//! be checked word-for-word against the host up to projective scaling.

use crate::backend::ComputeBackend;
use crate::field::{
    bigint_to_words, fit_words, fq_to_words, words_to_bigint, words_to_fq_reduced, FieldWords,
    GpuAffinePoint, GpuExtendedPoint,
};
use crate::plan::{ExecutionPlan, Kernel, PortSource, Stage};
use anyhow::{anyhow, bail, Context, Result};
use ark_ec::Group;
use ark_ed_on_bls12_377::EdwardsProjective;
use ark_ff::{BigInt, BigInteger, One, Zero};
use bytemuck::Pod;
use rayon::prelude::*;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info};

/// CPU backend running every work item of a stage in parallel
#[derive(Clone, Copy, Debug, Default)]
pub struct HostBackend;

impl HostBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ComputeBackend for HostBackend {
    fn name(&self) -> String {
        format!("CPU ({} threads)", rayon::current_num_threads())
    }

    async fn execute(&self, plan: &ExecutionPlan) -> Result<Option<Vec<u32>>> {
        plan.validate()?;
        plan.ensure_bound()?;

        let Some(result_port) = plan.final_output() else {
            return Ok(None);
        };
        if plan.info.num_inputs == 0 || result_port.size == 0 {
            debug!("Plan has no work items, skipping");
            return Ok(None);
        }

        let start = Instant::now();
        let mut previous: HashMap<&'static str, Vec<u32>> = HashMap::new();
        for stage in &plan.stages {
            let inputs = resolve_inputs(stage, &previous)?;
            let outputs = run_kernel(stage, &inputs)?;
            if outputs.len() != stage.outputs.len() {
                bail!(
                    "Stage '{}' declares {} outputs, kernel produced {}",
                    stage.label,
                    stage.outputs.len(),
                    outputs.len()
                );
            }
            previous = stage
                .outputs
                .iter()
                .zip(outputs)
                .map(|(port, words)| (port.name, fit_words(&words, port.size)))
                .collect();
            debug!("Stage {} done in {:.2?}", stage.label, start.elapsed());
        }

        let words = previous
            .remove(result_port.name)
            .with_context(|| format!("Final stage has no output '{}'", result_port.name))?;

        info!(
            "Host ran {} stages over {} points in {:.2?}",
            plan.num_stages(),
            plan.info.num_inputs,
            start.elapsed()
        );
        Ok(Some(words))
    }
}

/// Input buffers in binding order
fn resolve_inputs(stage: &Stage, previous: &HashMap<&'static str, Vec<u32>>) -> Result<Vec<Vec<u32>>> {
    stage
        .inputs
        .iter()
        .map(|port| match &port.source {
            PortSource::Upload(words) => Ok(fit_words(words, port.size)),
            PortSource::Stage(source) => previous
                .get(source)
                .map(|words| fit_words(words, port.size))
                .ok_or_else(|| anyhow!("Stage '{}' reads missing output '{}'", stage.label, source)),
            PortSource::Deferred => Err(anyhow!(
                "Input '{}' of stage '{}' was never bound",
                port.name,
                stage.label
            )),
        })
        .collect()
}

fn run_kernel(stage: &Stage, inputs: &[Vec<u32>]) -> Result<Vec<Vec<u32>>> {
    let n = stage.work_items as usize;
    let expected = match stage.kernel {
        Kernel::Elevate | Kernel::Passthrough => 1,
        Kernel::MultiplyFirst => 2,
        Kernel::MultiplyIntermediate | Kernel::MultiplyFinal => 3,
    };
    if inputs.len() != expected {
        bail!(
            "Kernel {} takes {} inputs, stage '{}' binds {}",
            stage.kernel.name(),
            expected,
            stage.label,
            inputs.len()
        );
    }

    match stage.kernel {
        Kernel::Elevate => {
            let affine: &[GpuAffinePoint] = view(&inputs[0])?;
            let points: Vec<GpuExtendedPoint> = (0..n)
                .into_par_iter()
                .map(|i| elevate(&affine.get(i).copied().unwrap_or_default()))
                .collect();
            Ok(vec![to_words(&points)])
        }
        Kernel::Passthrough => Ok(vec![inputs[0].clone()]),
        kernel => {
            let bits = stage
                .chunk_bits
                .with_context(|| format!("Stage '{}' has no chunk width", stage.label))?;
            let points: &[GpuExtendedPoint] = view(&inputs[0])?;
            let scalars: &[FieldWords] = view(&inputs[1])?;
            let temps: &[GpuExtendedPoint] = match kernel {
                Kernel::MultiplyFirst => &[],
                _ => view(&inputs[2])?,
            };

            let states: Vec<ChunkState> = (0..n)
                .into_par_iter()
                .map(|i| {
                    let point = to_projective(&points.get(i).copied().unwrap_or_default());
                    let scalar = words_to_bigint(&scalars.get(i).copied().unwrap_or_default());
                    let state = match kernel {
                        Kernel::MultiplyFirst => ChunkState {
                            result: EdwardsProjective::zero(),
                            scalar,
                            temp: point,
                        },
                        _ => ChunkState {
                            result: point,
                            scalar,
                            temp: to_projective(&temps.get(i).copied().unwrap_or_default()),
                        },
                    };
                    state.step(bits)
                })
                .collect();

            let results: Vec<GpuExtendedPoint> =
                states.iter().map(|s| from_projective(&s.result)).collect();
            if kernel == Kernel::MultiplyFinal {
                return Ok(vec![to_words(&results)]);
            }
            let shifted: Vec<FieldWords> = states.iter().map(|s| bigint_to_words(&s.scalar)).collect();
            let temps: Vec<GpuExtendedPoint> =
                states.iter().map(|s| from_projective(&s.temp)).collect();
            Ok(vec![to_words(&results), to_words(&shifted), to_words(&temps)])
        }
    }
}

/// Partial double-and-add carried between multiply stages
struct ChunkState {
    result: EdwardsProjective,
    scalar: BigInt<4>,
    temp: EdwardsProjective,
}

impl ChunkState {
    /// Consume the low `bits` bits of the scalar, LSB first
    fn step(mut self, bits: u32) -> Self {
        for _ in 0..bits {
            if self.scalar.is_odd() {
                self.result += self.temp;
            }
            self.temp.double_in_place();
            self.scalar.div2();
        }
        self
    }
}

fn elevate(point: &GpuAffinePoint) -> GpuExtendedPoint {
    let x = words_to_fq_reduced(&point.x);
    let y = words_to_fq_reduced(&point.y);
    GpuExtendedPoint {
        x: fq_to_words(&x),
        y: fq_to_words(&y),
        t: fq_to_words(&(x * y)),
        z: fq_to_words(&One::one()),
    }
}

fn to_projective(point: &GpuExtendedPoint) -> EdwardsProjective {
    EdwardsProjective::new_unchecked(
        words_to_fq_reduced(&point.x),
        words_to_fq_reduced(&point.y),
        words_to_fq_reduced(&point.t),
        words_to_fq_reduced(&point.z),
    )
}

fn from_projective(point: &EdwardsProjective) -> GpuExtendedPoint {
    GpuExtendedPoint {
        x: fq_to_words(&point.x),
        y: fq_to_words(&point.y),
        t: fq_to_words(&point.t),
        z: fq_to_words(&point.z),
    }
}

/// Typed view of a word buffer
fn view<T: Pod>(words: &[u32]) -> Result<&[T]> {
    bytemuck::try_cast_slice(words).map_err(|e| anyhow!("Buffer layout mismatch: {e:?}"))
}

fn to_words<T: Pod>(items: &[T]) -> Vec<u32> {
    bytemuck::cast_slice(items).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{flatten_points, generator, scalar_words_u64};
    use crate::field::{AFFINE_POINT_WORDS, EXTENDED_POINT_WORDS};
    use crate::plan::{point_mul_plan, ScalarChunking};
    use ark_ec::CurveGroup;
    use ark_ed_on_bls12_377::Fr;

    #[test]
    fn chunk_steps_compose_to_full_multiply() {
        let g = EdwardsProjective::from(generator());
        let scalar = words_to_bigint(&scalar_words_u64(0xdead_beef_1234_5678));
        let mut state = ChunkState {
            result: EdwardsProjective::zero(),
            scalar,
            temp: g,
        };
        for _ in 0..4 {
            state = state.step(64);
        }
        assert_eq!(state.result, g * Fr::from(0xdead_beef_1234_5678u64));
        assert_eq!(state.scalar, BigInt::new([0; 4]));
    }

    #[test]
    fn elevate_sets_t_and_z() {
        let g = generator();
        let words = flatten_points(&[g]);
        let affine: &[GpuAffinePoint] = view(&words).unwrap();
        let extended = elevate(&affine[0]);
        assert_eq!(to_projective(&extended).into_affine(), g);
        assert_eq!(extended.z, [0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn intermediate_buffers_follow_port_sizes() {
        let points = flatten_points(&[generator(), generator()]);
        let scalars: Vec<u32> = [scalar_words_u64(3), scalar_words_u64(5)].concat();
        let plan = point_mul_plan(2, &points, &scalars, true, ScalarChunking::default()).unwrap();

        let words = pollster::block_on(HostBackend.execute(&plan)).unwrap().unwrap();
        assert_eq!(words.len(), 2 * EXTENDED_POINT_WORDS);
        assert_eq!(points.len(), 2 * AFFINE_POINT_WORDS);
    }

    #[test]
    fn unbound_plan_fails() {
        let plan = point_mul_plan(1, &[], &[0; 8], false, ScalarChunking::default()).unwrap();
        assert!(pollster::block_on(HostBackend.execute(&plan)).is_err());
    }
}
