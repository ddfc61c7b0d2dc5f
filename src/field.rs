//! Word encoding shared with the WGSL kernels
//!
//! Every device buffer is an array of `u32` words. A field element is 8
//! consecutive words, most-significant word first (word 0 holds bits
//! 255..224), matching `u256.components` in the shaders.

use anyhow::{anyhow, Result};
use ark_ed_on_bls12_377::Fq;
use ark_ff::{BigInt, PrimeField};
use bytemuck::{Pod, Zeroable};

/// Bytes per buffer word
pub const WORD_BYTES: usize = 4;
/// Words per 256-bit field element
pub const FIELD_WORDS: usize = 8;
/// Words per affine point (x, y)
pub const AFFINE_POINT_WORDS: usize = 2 * FIELD_WORDS;
/// Words per extended point (x, y, t, z)
pub const EXTENDED_POINT_WORDS: usize = 4 * FIELD_WORDS;
/// Bit width of a scalar as laid out in device buffers
pub const SCALAR_BITS: u32 = (FIELD_WORDS * 32) as u32;

/// One field element in device word order
pub type FieldWords = [u32; FIELD_WORDS];

/// GPU affine point (x, y in 32-bit limbs)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuAffinePoint {
    pub x: FieldWords,
    pub y: FieldWords,
}

/// GPU extended point (x, y, t, z in 32-bit limbs)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuExtendedPoint {
    pub x: FieldWords,
    pub y: FieldWords,
    pub t: FieldWords,
    pub z: FieldWords,
}

/// Convert 64-bit little-endian limbs into device words
pub fn limbs_to_words(limbs: &[u64; 4]) -> FieldWords {
    let mut words = [0u32; FIELD_WORDS];
    for (i, limb) in limbs.iter().enumerate() {
        words[FIELD_WORDS - 1 - 2 * i] = *limb as u32;
        words[FIELD_WORDS - 2 - 2 * i] = (*limb >> 32) as u32;
    }
    words
}

/// Convert device words into 64-bit little-endian limbs
pub fn words_to_limbs(words: &FieldWords) -> [u64; 4] {
    let mut limbs = [0u64; 4];
    for (i, limb) in limbs.iter_mut().enumerate() {
        let lo = words[FIELD_WORDS - 1 - 2 * i] as u64;
        let hi = words[FIELD_WORDS - 2 - 2 * i] as u64;
        *limb = (hi << 32) | lo;
    }
    limbs
}

pub fn words_to_bigint(words: &FieldWords) -> BigInt<4> {
    BigInt::new(words_to_limbs(words))
}

pub fn bigint_to_words(value: &BigInt<4>) -> FieldWords {
    limbs_to_words(&value.0)
}

/// Canonical field element from words; values >= the modulus are rejected
pub fn words_to_fq(words: &FieldWords) -> Result<Fq> {
    Fq::from_bigint(words_to_bigint(words))
        .ok_or_else(|| anyhow!("Field element 0x{} is not below the modulus", words_hex(words)))
}

/// Field element from words, reduced modulo the field order
pub fn words_to_fq_reduced(words: &FieldWords) -> Fq {
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
    Fq::from_be_bytes_mod_order(&bytes)
}

pub fn fq_to_words(value: &Fq) -> FieldWords {
    bigint_to_words(&value.into_bigint())
}

/// Byte size of a buffer holding `count` elements of `words` words each
pub fn buffer_size(count: usize, words: usize) -> u64 {
    (count * words * WORD_BYTES) as u64
}

/// Truncate or zero-pad host words to exactly `size` bytes
pub fn fit_words(words: &[u32], size: u64) -> Vec<u32> {
    let count = size as usize / WORD_BYTES;
    let mut fitted = words[..words.len().min(count)].to_vec();
    fitted.resize(count, 0);
    fitted
}

pub fn words_hex(words: &FieldWords) -> String {
    words.iter().map(|w| format!("{w:08x}")).collect()
}
