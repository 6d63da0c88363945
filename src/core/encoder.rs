//! Encoders turn raw values into sparse distributed representations the
//! spatial pooler can consume: fixed-width bit vectors in which a small,
//! fixed number of bits is ON and equal values always produce identical
//! encodings.
//!
//! The `CharacterEncoder` hashes a character into the seed of a random
//! number generator and samples the ON bits from it, so distinct characters
//! land on (almost always) different bit sets without any stored state.

use super::error::{RegionError, Result};
use rand::{rngs::StdRng, seq::IteratorRandom, SeedableRng};

/// Turns values of one type into sparse bit patterns of a fixed width and
/// cardinality.
pub trait Encoder<T> {
    /// Total width of the encoding in bits.
    fn width(&self) -> usize;

    /// Number of ON bits in every encoding.
    fn active_bits(&self) -> usize;

    /// Encodes a value as the sorted indices of its ON bits.
    fn encode(&self, value: T) -> Vec<usize>;

    /// Encodes a value as a dense boolean vector of `width` bits.
    fn encode_dense(&self, value: T) -> Vec<bool> {
        let mut dense = vec![false; self.width()];
        for bit in self.encode(value) {
            dense[bit] = true;
        }
        dense
    }
}

/// A stateless encoder for characters. Every character deterministically maps
/// to the same sparse pattern across instances and runs.
#[derive(Clone, Copy, Debug)]
pub struct CharacterEncoder {
    width: usize,
    active_bits: usize,
}

impl CharacterEncoder {
    /// Builds an encoder emitting `active_bits` ON bits out of `width`.
    pub fn new(width: usize, active_bits: usize) -> Result<Self> {
        if width == 0 {
            return Err(RegionError::InvalidParameter {
                name: "width",
                message: "must be positive".to_string(),
            });
        }
        if active_bits == 0 || active_bits > width {
            return Err(RegionError::InvalidParameter {
                name: "active_bits",
                message: "must lie in 1..=width".to_string(),
            });
        }
        Ok(Self { width, active_bits })
    }
}

impl Default for CharacterEncoder {
    /// 2048 bits with 37 ON, matching the default spatial pooler input width.
    fn default() -> Self {
        Self {
            width: 2048,
            active_bits: 37,
        }
    }
}

impl Encoder<char> for CharacterEncoder {
    #[inline]
    fn width(&self) -> usize {
        self.width
    }

    #[inline]
    fn active_bits(&self) -> usize {
        self.active_bits
    }

    /// Samples the ON bits from a generator seeded with the character's hash,
    /// so the pattern depends only on the character and the encoder shape.
    fn encode(&self, value: char) -> Vec<usize> {
        let mut rand = StdRng::seed_from_u64(fxhash::hash64(&value));
        let mut bits = (0..self.width).choose_multiple(&mut rand, self.active_bits);
        bits.sort_unstable();
        bits
    }
}
