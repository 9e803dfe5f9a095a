// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use sceneflow_mask::{Mask, OutputId};
use sceneflow_network::NodeId;

use crate::ids::{InputDependencyId, TaskId};

/// The plan the executor engine runs against: which outputs of which nodes
/// are scheduled, what each one's masks and buffer routing are, and the
/// task graph (compute/inputs/prep/keep) that realizes the plan.
///
/// A `Schedule` is produced by a collaborator outside this crate (typically
/// from a higher-level query against the network and a request); the
/// engine only ever reads it during one evaluation and never mutates it.
pub trait Schedule: Send + Sync {
    /// Returns every output of `node` this schedule has scheduled.
    fn scheduled_outputs_of(&self, node: NodeId) -> Vec<OutputId>;

    /// Returns the mask of elements `output` must produce.
    fn request_mask(&self, output: OutputId) -> Mask;

    /// Returns the mask of elements a multi-invocation compute task must
    /// preserve into scratch for `output`.
    fn keep_mask(&self, output: OutputId) -> Mask;

    /// Returns the mask of elements of `output` an invocation's compute is
    /// expected to affect (as opposed to merely pass through).
    fn affects_mask(&self, output: OutputId) -> Mask;

    /// Returns the alternate source `output`'s private buffer should be
    /// initialized from, if the schedule routes one.
    fn from_buffer_output(&self, output: OutputId) -> Option<OutputId>;

    /// Returns the output `output`'s computed data should be passed to
    /// rather than published locally, if the schedule routes one.
    fn pass_to_output(&self, output: OutputId) -> Option<OutputId>;

    /// Returns every compute-task id scheduled for `node`'s invocations.
    fn compute_tasks_for_node(&self, node: NodeId) -> Vec<TaskId>;

    /// Returns the compute task that produces `output`, if scheduled.
    fn compute_task_for_output(&self, output: OutputId) -> Option<TaskId>;

    /// Returns the node `compute_task` runs against.
    ///
    /// The driver loop only ever learns of a dependency's producer as a bare
    /// `TaskId` (from [`Self::compute_tasks_for_input_dependency`] or
    /// [`Self::compute_tasks_for_node`]); it needs the owning node back to
    /// build the `Task::Compute` that actually runs it.
    fn node_of_compute_task(&self, compute_task: TaskId) -> NodeId;

    /// Returns every compute task fed by `dep`, used to invoke a
    /// dependency's producer before its consumer's evaluate stage.
    fn compute_tasks_for_input_dependency(&self, dep: InputDependencyId) -> Vec<TaskId>;

    /// Returns the output `dep` resolves to, i.e. the dependency's source.
    fn input_dependency_source(&self, dep: InputDependencyId) -> OutputId;

    /// Returns `node`'s keep task, if the schedule gave it one.
    fn keep_task_of(&self, node: NodeId) -> Option<TaskId>;

    /// Returns `compute_task`'s inputs task, if it has prereqs or optionals.
    fn inputs_task_of(&self, compute_task: TaskId) -> Option<TaskId>;

    /// Returns `compute_task`'s prep task, if its node needs once-per-node
    /// preparation.
    fn prep_task_of(&self, compute_task: TaskId) -> Option<TaskId>;

    /// Returns the prereq input dependencies an inputs task must invoke
    /// unconditionally before the optionals stage.
    fn prereq_input_dependencies(&self, inputs_task: TaskId) -> Vec<InputDependencyId>;

    /// Returns the optional input dependencies an inputs task may invoke,
    /// subject to the node's `requiredInputsPredicate`.
    fn optional_input_dependencies(&self, inputs_task: TaskId) -> Vec<InputDependencyId>;

    /// Returns the input dependencies a compute task's evaluate stage
    /// requires to have completed.
    fn required_input_dependencies(&self, compute_task: TaskId) -> Vec<InputDependencyId>;

    /// Returns `output`'s position in the schedule's unique-index space,
    /// used to key the input-dependency dedup table.
    fn unique_index(&self, output: OutputId) -> usize;

    /// Returns the size of the unique-index space: every dedup table the
    /// engine builds against this schedule has this many entries.
    fn num_unique_input_dependencies(&self) -> usize;

    /// Returns whether the pull engine should apply sparse mung-buffer
    /// locking while running this schedule.
    fn has_smbl(&self) -> bool {
        false
    }
}
