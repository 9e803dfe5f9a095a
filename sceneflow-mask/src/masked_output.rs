// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::hash::{Hash, Hasher};

use crate::Mask;

/// Identifies a single output within a network: `(nodeIndex, outputIndex)`.
///
/// This is the dense, `Copy` identity every cache and traversal keys on. It
/// is intentionally defined here (rather than in `sceneflow-network`) so
/// that `Mask`/`MaskedOutput` stay free of a dependency on the network
/// crate, keeping both to a plain arena-of-indices representation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct OutputId {
    node: u32,
    output: u16,
}

impl OutputId {
    /// Creates an output id from a dense node index and a per-node output
    /// index.
    #[must_use]
    #[inline]
    pub const fn new(node_index: u32, output_index: u16) -> Self {
        Self { node: node_index, output: output_index }
    }

    /// Returns the dense node index component.
    #[must_use]
    #[inline]
    pub const fn node_index(self) -> u32 {
        self.node
    }

    /// Returns the per-node output index component.
    #[must_use]
    #[inline]
    pub const fn output_index(self) -> u16 {
        self.output
    }
}

/// A pair of `(Output, Mask)`: the unit of request and dependency-tracking
/// currency throughout the execution core.
///
/// Hashable and structurally comparable: two `MaskedOutput`s are equal iff
/// their output ids are equal and their masks are equal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MaskedOutput {
    output: OutputId,
    mask: Mask,
}

impl MaskedOutput {
    /// Creates a new masked output.
    #[must_use]
    #[inline]
    pub const fn new(output: OutputId, mask: Mask) -> Self {
        Self { output, mask }
    }

    /// Returns the output this masked output refers to.
    #[must_use]
    #[inline]
    pub const fn output(&self) -> OutputId {
        self.output
    }

    /// Returns the mask selecting elements of [`Self::output`].
    #[must_use]
    #[inline]
    pub const fn mask(&self) -> &Mask {
        &self.mask
    }
}

impl Hash for MaskedOutput {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.output.hash(state);
        // `Mask::fast_hash` keeps this cheap even for wide masks; full
        // structural equality is still used for `PartialEq`.
        self.mask.fast_hash().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_structural_over_output_and_mask() {
        let mut m1 = Mask::empty(4);
        m1.set(1);
        let mut m2 = Mask::empty(4);
        m2.set(1);

        let a = MaskedOutput::new(OutputId::new(0, 0), m1);
        let b = MaskedOutput::new(OutputId::new(0, 0), m2);
        assert_eq!(a, b);

        let c = MaskedOutput::new(OutputId::new(1, 0), Mask::empty(4));
        assert_ne!(a, c);
    }
}
