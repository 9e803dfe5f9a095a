// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::sync::atomic::{AtomicBool, Ordering};

use sceneflow_network::NodeId;

/// Detects evaluation cycles in the schedule being run. A derived engine
/// (parallel, pull, speculation) supplies its own detector; the base engine
/// only ever polls it at stage boundaries.
pub trait CycleDetector: Send + Sync {
    /// Returns `true` if visiting `node` at this point in the evaluation
    /// would close a cycle.
    fn detect(&self, node: NodeId) -> bool;
}

/// A detector that never reports a cycle, for schedules already known to be
/// acyclic (the common case: schedules are built from an acyclic network).
#[derive(Debug, Default)]
pub struct NoCycles;

impl CycleDetector for NoCycles {
    fn detect(&self, _node: NodeId) -> bool {
        false
    }
}

/// The single atomic interruption flag every task observes at stage
/// boundaries, set by either an external interruption hook or cycle
/// detection.
#[derive(Debug, Default)]
pub struct Interruption {
    flag: AtomicBool,
}

impl Interruption {
    /// Creates a non-interrupted flag.
    #[must_use]
    pub const fn new() -> Self {
        Self { flag: AtomicBool::new(false) }
    }

    /// Returns whether interruption has been observed.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Sets the interruption flag. Idempotent.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Polls `hook` and the cycle detector for `node`; sets and returns the
    /// interruption flag if either fires.
    pub fn poll(&self, hook: &dyn Fn() -> bool, detector: &dyn CycleDetector, node: NodeId) -> bool {
        if self.is_interrupted() {
            return true;
        }
        if hook() || detector.detect(node) {
            self.interrupt();
            return true;
        }
        false
    }
}
