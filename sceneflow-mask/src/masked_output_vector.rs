// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use alloc::vec::Vec;
use core::hash::{Hash, Hasher};

use crate::MaskedOutput;

/// An ordered sequence of [`MaskedOutput`]s: a request.
///
/// Equality and ordering are the natural `Vec` ones (order matters: a
/// request is ordered because callback invocation order for already-cached
/// outputs must match request order).
pub type MaskedOutputVector = Vec<MaskedOutput>;

/// Computes a cheap hash for a [`MaskedOutputVector`], designed for keying
/// request caches without hashing the entire (potentially large) vector.
///
/// Ground-truthed from `VdfMaskedOutputVector_Hash`: combine the vector's
/// length, the first three entries, and the last entry if the vector holds
/// more than three. This means two distinct vectors that agree on those
/// sampled positions hash-collide; callers must still fall back to full
/// `==` on hash collision, exactly as a `HashMap` keyed on this hash would.
#[must_use]
pub fn hash_masked_output_vector(vector: &MaskedOutputVector) -> u64 {
    let mut hasher = SampledHasher::default();
    vector.len().hash(&mut hasher);

    let sampled = vector.len().min(3);
    for entry in &vector[..sampled] {
        entry.hash(&mut hasher);
    }
    if vector.len() > 3 {
        vector[vector.len() - 1].hash(&mut hasher);
    }

    hasher.finish()
}

#[derive(Default)]
struct SampledHasher {
    state: u64,
}

impl Hasher for SampledHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        let mut hash = self.state ^ 0x9E37_79B9_7F4A_7C15;
        for &byte in bytes {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
        }
        self.state = hash;
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::{Mask, MaskedOutput, OutputId};

    fn mo(node: u32) -> MaskedOutput {
        MaskedOutput::new(OutputId::new(node, 0), Mask::empty(4))
    }

    #[test]
    fn hash_is_stable_for_equal_vectors() {
        let a = vec![mo(0), mo(1), mo(2), mo(3), mo(4)];
        let b = vec![mo(0), mo(1), mo(2), mo(3), mo(4)];
        assert_eq!(hash_masked_output_vector(&a), hash_masked_output_vector(&b));
    }

    #[test]
    fn hash_ignores_middle_entries_beyond_sample() {
        // Differs only in index 3, which is sampled neither as "first three"
        // nor as "last" when len > 3... actually index 3 *is* the last for
        // a 4-element vector, so use a 5-element vector to hit a true gap.
        let a = vec![mo(0), mo(1), mo(2), mo(99), mo(4)];
        let b = vec![mo(0), mo(1), mo(2), mo(100), mo(4)];
        assert_eq!(hash_masked_output_vector(&a), hash_masked_output_vector(&b));
    }
}
