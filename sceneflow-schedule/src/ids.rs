// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

/// Identifies a task within one of the engine's four per-kind task tables
/// (compute, inputs, prep, keep).
///
/// `TaskId`s are only comparable within the table they came from: a
/// compute-task id and a keep-task id drawn from the same number never mean
/// the same task. Which table an id belongs to is implied by how the
/// schedule returned it (`compute_task_for_output` returns a compute-table
/// id, `keep_task_of` a keep-table id, and so on).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TaskId(u32);

impl TaskId {
    /// Creates a task id from a dense table index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the dense table index this id refers to.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Identifies one input dependency of a compute task: a single `(source
/// output, consuming input)` edge the engine must resolve before the
/// consuming task's evaluate stage runs.
///
/// Carries a *unique index* in `[0, Schedule::num_unique_input_dependencies)`
/// used by the engine's input-dependency dedup table, so that compute tasks
/// sharing the same dependency make the cache-or-compute decision once
/// instead of once per consumer.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct InputDependencyId(u32);

impl InputDependencyId {
    /// Creates an input-dependency id from its unique index.
    #[must_use]
    pub const fn new(unique_index: u32) -> Self {
        Self(unique_index)
    }

    /// Returns the unique index this id carries.
    #[must_use]
    pub const fn unique_index(self) -> u32 {
        self.0
    }
}
