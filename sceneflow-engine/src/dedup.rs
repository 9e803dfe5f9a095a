// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::sync::atomic::{AtomicU8, Ordering};

/// The outcome of attempting to install an entry in a [`DedupTable`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DedupOutcome {
    /// This caller is the first to reach the entry; it must run the work
    /// and the result will be shared with every other caller for this key.
    Install,
    /// Another caller already installed an entry for this key; this
    /// caller's duplicate invocation can be skipped.
    AlreadyInstalled,
}

const UNDECIDED: u8 = 0;
const INSTALLED: u8 = 1;

/// A lock-free byte array that lets independent task branches invoking the
/// same input dependency agree on exactly one of them doing the work.
/// Indexed by [`Schedule::unique_index`], sized to
/// [`Schedule::num_unique_input_dependencies`].
///
/// [`Schedule::unique_index`]: sceneflow_schedule::Schedule::unique_index
/// [`Schedule::num_unique_input_dependencies`]: sceneflow_schedule::Schedule::num_unique_input_dependencies
#[derive(Debug)]
pub struct DedupTable {
    entries: Vec<AtomicU8>,
}

impl DedupTable {
    /// Creates a table with `len` undecided entries.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self { entries: (0..len).map(|_| AtomicU8::new(UNDECIDED)).collect() }
    }

    /// Attempts to claim `index` for this caller. Only the first caller for
    /// a given index observes [`DedupOutcome::Install`]; every later caller,
    /// even if concurrent, observes [`DedupOutcome::AlreadyInstalled`].
    pub fn claim(&self, index: usize) -> DedupOutcome {
        match self.entries[index].compare_exchange(UNDECIDED, INSTALLED, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => DedupOutcome::Install,
            Err(_) => DedupOutcome::AlreadyInstalled,
        }
    }

    /// Returns whether `index` has already been installed by some caller.
    #[must_use]
    pub fn is_installed(&self, index: usize) -> bool {
        self.entries[index].load(Ordering::Acquire) == INSTALLED
    }
}
