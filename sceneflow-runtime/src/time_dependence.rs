// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use sceneflow_mask::OutputId;

use crate::time::Time;

/// The collaborator a time change queries to decide which outputs actually
/// need invalidating: which outputs vary with time at all, and whether a
/// specific pair of times produces different values for a given one.
///
/// A node's time dependency is lazily re-derived by the implementor when
/// its declaring flag changes; this trait only exposes the already-current
/// result, it never triggers the re-derivation itself.
pub trait TimeDependentInputs: Send + Sync {
    /// Returns every output currently flagged as time-dependent.
    fn time_dependent_outputs(&self) -> &[OutputId];

    /// Returns `true` if `output`'s value at `old` differs from its value
    /// at `new`. Called only for outputs [`Self::time_dependent_outputs`]
    /// already named; a caller must never ask about an output this trait
    /// doesn't consider time-dependent.
    fn differs_between(&self, output: OutputId, old: Time, new: Time) -> bool;
}
