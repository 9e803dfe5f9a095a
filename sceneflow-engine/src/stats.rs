// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters accumulated over one `run_schedule` call, for callers measuring
/// how much of a schedule actually ran versus was served from cache.
///
/// Every field is a plain atomic counter bumped by worker threads during
/// evaluation; `snapshot` reads them once evaluation has finished.
#[derive(Debug, Default)]
pub struct ExecutionStats {
    compute_tasks_invoked: AtomicUsize,
    compute_tasks_deduped: AtomicUsize,
    input_dependencies_deduped: AtomicUsize,
    keep_tasks_run: AtomicUsize,
    speculated_outputs: AtomicUsize,
}

impl ExecutionStats {
    /// Creates a zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one compute task invocation actually running its node's
    /// callback.
    pub fn record_compute_task_invoked(&self) {
        self.compute_tasks_invoked.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a compute task whose evaluate stage was skipped because the
    /// dependency cache already held a current result.
    pub fn record_compute_task_deduped(&self) {
        self.compute_tasks_deduped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an input-dependency invocation skipped because another
    /// branch had already claimed it this evaluation.
    pub fn record_input_dependency_deduped(&self) {
        self.input_dependencies_deduped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a keep task running to preserve multi-invocation scratch
    /// data into a node's public buffer.
    pub fn record_keep_task_run(&self) {
        self.keep_tasks_run.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an output pulled through the speculation sub-executor rather
    /// than the main schedule.
    pub fn record_speculated_output(&self) {
        self.speculated_outputs.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns an immutable snapshot of every counter.
    #[must_use]
    pub fn snapshot(&self) -> ExecutionStatsSnapshot {
        ExecutionStatsSnapshot {
            compute_tasks_invoked: self.compute_tasks_invoked.load(Ordering::Relaxed),
            compute_tasks_deduped: self.compute_tasks_deduped.load(Ordering::Relaxed),
            input_dependencies_deduped: self.input_dependencies_deduped.load(Ordering::Relaxed),
            keep_tasks_run: self.keep_tasks_run.load(Ordering::Relaxed),
            speculated_outputs: self.speculated_outputs.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time read of [`ExecutionStats`], returned to a caller
/// alongside the result of `run_schedule`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ExecutionStatsSnapshot {
    /// Number of compute tasks whose evaluate stage actually ran.
    pub compute_tasks_invoked: usize,
    /// Number of compute tasks skipped because the cache was current.
    pub compute_tasks_deduped: usize,
    /// Number of input-dependency invocations skipped via the dedup table.
    pub input_dependencies_deduped: usize,
    /// Number of keep tasks that ran.
    pub keep_tasks_run: usize,
    /// Number of outputs resolved via speculative pull rather than the
    /// scheduled task graph.
    pub speculated_outputs: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_counts() {
        let stats = ExecutionStats::new();
        stats.record_compute_task_invoked();
        stats.record_compute_task_invoked();
        stats.record_compute_task_deduped();
        stats.record_keep_task_run();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.compute_tasks_invoked, 2);
        assert_eq!(snapshot.compute_tasks_deduped, 1);
        assert_eq!(snapshot.keep_tasks_run, 1);
        assert_eq!(snapshot.speculated_outputs, 0);
    }
}
