// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use sceneflow_mask::OutputId;
use sceneflow_network::NodeId;
use sceneflow_schedule::{InputDependencyId, TaskId};

/// Which stage of a compute task's lifecycle a [`Task::Compute`] represents:
/// first its inputs task, then once-per-node prep, then the node's own
/// evaluate callback.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ComputeStage {
    /// Run (or wait on) this compute task's inputs task, if it has one.
    Inputs,
    /// Run (or wait on) this compute task's node's prep task, if it has one.
    PrepNode,
    /// Join on every required input dependency's producer before the node's
    /// callback can run.
    EvaluateNode,
    /// Every required input dependency has resolved; invoke the node's
    /// `compute` callback across its scheduled invocations and publish its
    /// outputs. Kept distinct from `EvaluateNode` so a join resumption never
    /// re-enters the same dependency check it was waiting on.
    RunCallback,
}

/// Which stage of an inputs task's lifecycle a [`Task::Inputs`] represents
/// ("task inversion"): prerequisites run unconditionally, then the node's
/// `required_inputs` predicate decides which optional dependencies to
/// invoke.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InputsStage {
    /// Invoke every prerequisite input dependency.
    Prereqs,
    /// Ask the node's `required_inputs` predicate which optional
    /// dependencies to invoke, then invoke those.
    Optionals,
    /// Every prereq and required optional has resolved; mark the inputs
    /// task done. Kept distinct from `Optionals` so a join resumption never
    /// re-enters the predicate it was waiting on.
    Finish,
}

/// Which stage of a keep task's lifecycle a [`Task::Keep`] represents: a
/// keep task accumulates every contributing invocation's keep-mask
/// selection into scratch before publishing it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeepStage {
    /// Wait on every contributing compute task, merging each into scratch
    /// as it finishes.
    RunContributors,
    /// Publish the accumulated scratch buffer as the output's public
    /// buffer.
    PublishScratch,
}

/// Which stage of a leaf task's lifecycle a [`Task::Leaf`] represents: one
/// leaf task exists per requested output, purely to invoke the caller's
/// completion callback once that output's value is ready.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LeafStage {
    /// Spawn the task that produces the requested output, if it has one.
    SpawnRequested,
    /// The producer (if any) has finished; invoke the completion callback.
    InvokeCallback,
}

/// One unit of scheduled work the driver loop claims, runs a stage of, and
/// resumes.
///
/// A `Task` is cheap to clone and move between worker deques: it names what
/// to do, it does not own any buffer data (that lives in `DataManager`,
/// keyed by output).
#[derive(Clone, Copy, Debug)]
pub enum Task {
    /// Realizes one scheduled compute task, across every invocation its
    /// node was scheduled for. `ComputeStage::EvaluateNode` iterates every
    /// set bit of the node's scheduled request mask internally rather than
    /// each invocation being its own `Task`, matching a compute task being
    /// the unit `TaskSyncTable` deduplicates.
    Compute { task_id: TaskId, node: NodeId, stage: ComputeStage },
    /// Realizes one scheduled inputs task.
    Inputs { task_id: TaskId, node: NodeId, stage: InputsStage },
    /// Realizes one scheduled prep task (runs at most once per node per
    /// evaluation).
    Prep { task_id: TaskId, node: NodeId },
    /// Realizes one scheduled keep task.
    Keep { task_id: TaskId, node: NodeId, stage: KeepStage },
    /// Realizes one requested output's completion: forces `output`'s
    /// producer to run (if it has one), then invokes the caller's callback
    /// with `request_index` identifying which entry of the request this
    /// was. Not a structural node task, so it carries an output rather than
    /// a `NodeId`/`TaskId` of its own.
    Leaf { output: OutputId, request_index: usize, stage: LeafStage },
    /// Invokes a single input dependency's producer on behalf of an inputs
    /// task, deduped against every other branch invoking the same
    /// dependency this evaluation.
    InvokeDependency { dependency: InputDependencyId, parent: TaskId },
}

impl Task {
    /// Returns the node this task runs against, if it names one directly.
    /// A [`Task::Leaf`] names an output rather than a node, and an
    /// [`Task::InvokeDependency`]'s node is resolved through the schedule
    /// by the driver loop instead.
    #[must_use]
    pub const fn node(&self) -> Option<NodeId> {
        match self {
            Self::Compute { node, .. } | Self::Inputs { node, .. } | Self::Prep { node, .. } | Self::Keep { node, .. } => {
                Some(*node)
            }
            Self::Leaf { .. } | Self::InvokeDependency { .. } => None,
        }
    }

    /// Returns this task's schedule-assigned id, if it has one of its own
    /// rather than borrowing its parent's. A [`Task::Leaf`] is keyed by
    /// request index rather than a schedule-assigned `TaskId`.
    #[must_use]
    pub const fn task_id(&self) -> Option<TaskId> {
        match self {
            Self::Compute { task_id, .. }
            | Self::Inputs { task_id, .. }
            | Self::Prep { task_id, .. }
            | Self::Keep { task_id, .. } => Some(*task_id),
            Self::Leaf { .. } | Self::InvokeDependency { .. } => None,
        }
    }
}
