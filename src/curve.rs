//! Curve library: ed-on-BLS12-377 points via arkworks
//!
//! Host-side point construction from device words, reduction of per-point
//! products, and a reference scalar multiplication to check the device
//! results against.

use crate::field::{
    fq_to_words, words_to_fq, FieldWords, GpuAffinePoint, FIELD_WORDS, SCALAR_BITS,
};
use anyhow::{bail, Result};
use ark_ec::{AffineRepr, CurveGroup, Group};
use ark_ed_on_bls12_377::{EdwardsAffine, EdwardsProjective, Fr};
use ark_ff::{BigInt, BigInteger, PrimeField, Zero};
use ark_std::UniformRand;
use num_bigint::BigUint;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

/// Affine result of an MSM as plain integers
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AffineCoordinates {
    #[serde(serialize_with = "serialize_hex")]
    pub x: BigUint,
    #[serde(serialize_with = "serialize_hex")]
    pub y: BigUint,
}

impl AffineCoordinates {
    /// Affine coordinates of the group identity, (0, 1)
    pub fn identity() -> Self {
        Self::from(EdwardsAffine::zero())
    }
}

impl From<EdwardsAffine> for AffineCoordinates {
    fn from(point: EdwardsAffine) -> Self {
        Self {
            x: BigUint::from(point.x.into_bigint()),
            y: BigUint::from(point.y.into_bigint()),
        }
    }
}

impl From<EdwardsProjective> for AffineCoordinates {
    fn from(point: EdwardsProjective) -> Self {
        Self::from(point.into_affine())
    }
}

impl std::fmt::Display for AffineCoordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(0x{:x}, 0x{:x})", self.x, self.y)
    }
}

fn serialize_hex<S: serde::Serializer>(value: &BigUint, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("0x{value:x}"))
}

/// Build an extended point from its four coordinates.
///
/// Rejects non-canonical field elements, a zero `z`, coordinates that break
/// `t * z == x * y`, and points off the curve.
pub fn create_point(
    x: &FieldWords,
    y: &FieldWords,
    t: &FieldWords,
    z: &FieldWords,
) -> Result<EdwardsProjective> {
    let (x, y, t, z) = (words_to_fq(x)?, words_to_fq(y)?, words_to_fq(t)?, words_to_fq(z)?);

    if z.is_zero() {
        bail!("Extended point has z = 0");
    }
    if t * z != x * y {
        bail!("Extended point violates t*z = x*y");
    }

    let point = EdwardsProjective::new_unchecked(x, y, t, z);
    if !point.into_affine().is_on_curve() {
        bail!("Point is not on the curve");
    }
    Ok(point)
}

/// Sum of all points, normalized to affine. The empty sum is the identity.
pub fn add_points(points: &[EdwardsProjective]) -> EdwardsAffine {
    points.iter().sum::<EdwardsProjective>().into_affine()
}

/// Scalar from device words; all 256 bits are used, no reduction mod r
pub fn scalar_from_words(words: &FieldWords) -> BigInt<4> {
    crate::field::words_to_bigint(words)
}

/// Reference double-and-add `scalar * point` over the full 256-bit scalar
pub fn reference_mul(point: &EdwardsAffine, scalar: &FieldWords) -> EdwardsProjective {
    let scalar = scalar_from_words(scalar);
    let mut result = EdwardsProjective::zero();
    for bit in (0..SCALAR_BITS as usize).rev() {
        result.double_in_place();
        if scalar.get_bit(bit) {
            result += point;
        }
    }
    result
}

/// Reference MSM computed on the host
pub fn reference_msm(points: &[EdwardsAffine], scalars: &[FieldWords]) -> EdwardsAffine {
    points
        .iter()
        .zip(scalars)
        .map(|(point, scalar)| reference_mul(point, scalar))
        .sum::<EdwardsProjective>()
        .into_affine()
}

pub fn flatten_points(points: &[EdwardsAffine]) -> Vec<u32> {
    let gpu_points: Vec<GpuAffinePoint> = points
        .iter()
        .map(|p| GpuAffinePoint {
            x: fq_to_words(&p.x),
            y: fq_to_words(&p.y),
        })
        .collect();
    bytemuck::cast_slice(&gpu_points).to_vec()
}

pub fn flatten_scalars(scalars: &[FieldWords]) -> Vec<u32> {
    scalars.iter().flatten().copied().collect()
}

pub fn scalar_words(scalar: &Fr) -> FieldWords {
    crate::field::bigint_to_words(&scalar.into_bigint())
}

pub fn scalar_words_u64(scalar: u64) -> FieldWords {
    let mut words = [0u32; FIELD_WORDS];
    words[FIELD_WORDS - 1] = scalar as u32;
    words[FIELD_WORDS - 2] = (scalar >> 32) as u32;
    words
}

pub fn generator() -> EdwardsAffine {
    EdwardsAffine::generator()
}

/// Random MSM instance of `count` points and scalars from a fixed seed
pub fn random_instance(count: usize, seed: u64) -> (Vec<EdwardsAffine>, Vec<FieldWords>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let points: Vec<EdwardsProjective> =
        (0..count).map(|_| EdwardsProjective::rand(&mut rng)).collect();
    let points = EdwardsProjective::normalize_batch(&points);
    let scalars = (0..count)
        .map(|_| scalar_words(&Fr::rand(&mut rng)))
        .collect();
    (points, scalars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ed_on_bls12_377::Fq;
    use ark_ff::{Field, One};

    fn extended_words(point: &EdwardsProjective) -> [FieldWords; 4] {
        [
            fq_to_words(&point.x),
            fq_to_words(&point.y),
            fq_to_words(&point.t),
            fq_to_words(&point.z),
        ]
    }

    #[test]
    fn create_point_accepts_valid_extended_coordinates() {
        let p = EdwardsProjective::from(generator()).double();
        let [x, y, t, z] = extended_words(&p);
        let created = create_point(&x, &y, &t, &z).unwrap();
        assert_eq!(created, p);
    }

    #[test]
    fn create_point_rejects_malformed_input() {
        let g = EdwardsProjective::from(generator());
        let [x, y, t, _] = extended_words(&g);

        let zero = fq_to_words(&Fq::ZERO);
        assert!(create_point(&x, &y, &t, &zero).is_err());

        let two = fq_to_words(&Fq::from(2u64));
        assert!(create_point(&x, &y, &two, &fq_to_words(&Fq::one())).is_err());

        let above_modulus = [u32::MAX; FIELD_WORDS];
        assert!(create_point(&above_modulus, &y, &t, &fq_to_words(&Fq::one())).is_err());

        // (1, 1) satisfies t*z = x*y but is not on the curve
        let one = fq_to_words(&Fq::one());
        assert!(create_point(&one, &one, &one, &one).is_err());
    }

    #[test]
    fn add_points_of_nothing_is_identity() {
        let sum = add_points(&[]);
        assert!(sum.is_zero());
        assert_eq!(AffineCoordinates::from(sum), AffineCoordinates::identity());
        assert_eq!(AffineCoordinates::identity().y, BigUint::from(1u32));
    }

    #[test]
    fn reference_mul_matches_arkworks() {
        let g = generator();
        let k = Fr::from(123_456_789u64);
        assert_eq!(reference_mul(&g, &scalar_words(&k)), g * k);
        assert_eq!(reference_mul(&g, &scalar_words_u64(0)), EdwardsProjective::zero());
    }

    #[test]
    fn random_instance_is_deterministic() {
        let (points_a, scalars_a) = random_instance(4, 7);
        let (points_b, scalars_b) = random_instance(4, 7);
        assert_eq!(points_a, points_b);
        assert_eq!(scalars_a, scalars_b);
        assert_eq!(flatten_points(&points_a).len(), 4 * crate::field::AFFINE_POINT_WORDS);
        assert_eq!(flatten_scalars(&scalars_a).len(), 4 * FIELD_WORDS);
    }
}
