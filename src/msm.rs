//! Orchestration and host-side reduction
//!
//! The device computes one scalar multiplication per point; the products are
//! summed here. Reduction order does not matter since point addition is
//! commutative and associative.

use crate::backend::ComputeBackend;
use crate::curve::{add_points, create_point, AffineCoordinates};
use crate::field::{GpuExtendedPoint, AFFINE_POINT_WORDS, EXTENDED_POINT_WORDS};
use crate::plan::{point_mul_plan, MsmConfig};
use anyhow::Result;
use ark_ed_on_bls12_377::EdwardsProjective;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Multi-scalar multiplication with the default plan configuration.
///
/// `points` holds N affine points (16 words each) and `scalars` N scalars
/// (8 words each), all most-significant word first.
pub async fn naive_msm<B: ComputeBackend>(
    backend: &B,
    points: &[u32],
    scalars: &[u32],
) -> Result<AffineCoordinates> {
    naive_msm_with(backend, points, scalars, &MsmConfig::default()).await
}

/// Multi-scalar multiplication with explicit chunking.
///
/// An empty run reduces to the identity `(0, 1)`. Any product the curve
/// library rejects fails the whole call.
pub async fn naive_msm_with<B: ComputeBackend>(
    backend: &B,
    points: &[u32],
    scalars: &[u32],
    config: &MsmConfig,
) -> Result<AffineCoordinates> {
    let num_inputs = points.len() / AFFINE_POINT_WORDS;
    let plan = point_mul_plan(num_inputs, points, scalars, true, config.chunking)?
        .with_workgroup(config.workgroup);

    debug!("Running {} point MSM on {}", num_inputs, backend.name());
    let start = Instant::now();
    let words = backend.execute(&plan).await?.unwrap_or_default();
    let device_time = start.elapsed();

    let products = decode_points(&words)?;
    let sum = add_points(&products);

    info!(
        "MSM of {} points: backend {:.2?}, reduction {:.2?}",
        num_inputs,
        device_time,
        start.elapsed() - device_time
    );
    Ok(AffineCoordinates::from(sum))
}

/// Extended points from raw read-back words
pub fn decode_points(words: &[u32]) -> Result<Vec<EdwardsProjective>> {
    let chunks = words.chunks_exact(EXTENDED_POINT_WORDS);
    if !chunks.remainder().is_empty() {
        warn!(
            "Dropping {} trailing words that do not form a point",
            chunks.remainder().len()
        );
    }

    chunks
        .map(|chunk| {
            let point: GpuExtendedPoint = bytemuck::pod_read_unaligned(bytemuck::cast_slice(chunk));
            create_point(&point.x, &point.y, &point.t, &point.z)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::generator;
    use crate::field::fq_to_words;
    use ark_ec::Group;

    fn words_of(point: &EdwardsProjective) -> Vec<u32> {
        [
            fq_to_words(&point.x),
            fq_to_words(&point.y),
            fq_to_words(&point.t),
            fq_to_words(&point.z),
        ]
        .concat()
    }

    #[test]
    fn decode_drops_partial_point() {
        let g = EdwardsProjective::from(generator());
        let mut words = words_of(&g);
        words.extend(words_of(&g.double()));
        words.extend([1, 2, 3]);

        let points = decode_points(&words).unwrap();
        assert_eq!(points, vec![g, g.double()]);
    }

    #[test]
    fn decode_rejects_garbage() {
        let words = vec![u32::MAX; EXTENDED_POINT_WORDS];
        assert!(decode_points(&words).is_err());
    }

    #[test]
    fn decode_empty() {
        assert!(decode_points(&[]).unwrap().is_empty());
    }
}
