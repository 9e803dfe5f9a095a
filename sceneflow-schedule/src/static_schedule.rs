// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::HashMap;

use sceneflow_mask::{Mask, OutputId};
use sceneflow_network::NodeId;

use crate::ids::{InputDependencyId, TaskId};
use crate::schedule::Schedule;

/// A plain, fully materialized [`Schedule`] backed by hash maps, for tests
/// and demo programs that need a concrete schedule without a real query
/// planner.
#[derive(Debug, Default)]
pub struct StaticSchedule {
    outputs_of_node: HashMap<NodeId, Vec<OutputId>>,
    request_masks: HashMap<OutputId, Mask>,
    keep_masks: HashMap<OutputId, Mask>,
    affects_masks: HashMap<OutputId, Mask>,
    from_buffer: HashMap<OutputId, OutputId>,
    pass_to: HashMap<OutputId, OutputId>,
    compute_tasks_of_node: HashMap<NodeId, Vec<TaskId>>,
    compute_task_of_output: HashMap<OutputId, TaskId>,
    node_of_compute_task: HashMap<TaskId, NodeId>,
    compute_tasks_of_dependency: HashMap<InputDependencyId, Vec<TaskId>>,
    dependency_source: HashMap<InputDependencyId, OutputId>,
    keep_task_of_node: HashMap<NodeId, TaskId>,
    inputs_task_of_compute: HashMap<TaskId, TaskId>,
    prep_task_of_compute: HashMap<TaskId, TaskId>,
    prereqs_of_inputs: HashMap<TaskId, Vec<InputDependencyId>>,
    optionals_of_inputs: HashMap<TaskId, Vec<InputDependencyId>>,
    requireds_of_compute: HashMap<TaskId, Vec<InputDependencyId>>,
    unique_index: HashMap<OutputId, usize>,
    num_unique_input_dependencies: usize,
    has_smbl: bool,
}

impl Schedule for StaticSchedule {
    fn scheduled_outputs_of(&self, node: NodeId) -> Vec<OutputId> {
        self.outputs_of_node.get(&node).cloned().unwrap_or_default()
    }

    fn request_mask(&self, output: OutputId) -> Mask {
        self.request_masks.get(&output).cloned().unwrap_or_else(|| Mask::empty(0))
    }

    fn keep_mask(&self, output: OutputId) -> Mask {
        self.keep_masks.get(&output).cloned().unwrap_or_else(|| Mask::empty(0))
    }

    fn affects_mask(&self, output: OutputId) -> Mask {
        self.affects_masks.get(&output).cloned().unwrap_or_else(|| Mask::empty(0))
    }

    fn from_buffer_output(&self, output: OutputId) -> Option<OutputId> {
        self.from_buffer.get(&output).copied()
    }

    fn pass_to_output(&self, output: OutputId) -> Option<OutputId> {
        self.pass_to.get(&output).copied()
    }

    fn compute_tasks_for_node(&self, node: NodeId) -> Vec<TaskId> {
        self.compute_tasks_of_node.get(&node).cloned().unwrap_or_default()
    }

    fn compute_task_for_output(&self, output: OutputId) -> Option<TaskId> {
        self.compute_task_of_output.get(&output).copied()
    }

    fn node_of_compute_task(&self, compute_task: TaskId) -> NodeId {
        self.node_of_compute_task[&compute_task]
    }

    fn compute_tasks_for_input_dependency(&self, dep: InputDependencyId) -> Vec<TaskId> {
        self.compute_tasks_of_dependency.get(&dep).cloned().unwrap_or_default()
    }

    fn input_dependency_source(&self, dep: InputDependencyId) -> OutputId {
        self.dependency_source[&dep]
    }

    fn keep_task_of(&self, node: NodeId) -> Option<TaskId> {
        self.keep_task_of_node.get(&node).copied()
    }

    fn inputs_task_of(&self, compute_task: TaskId) -> Option<TaskId> {
        self.inputs_task_of_compute.get(&compute_task).copied()
    }

    fn prep_task_of(&self, compute_task: TaskId) -> Option<TaskId> {
        self.prep_task_of_compute.get(&compute_task).copied()
    }

    fn prereq_input_dependencies(&self, inputs_task: TaskId) -> Vec<InputDependencyId> {
        self.prereqs_of_inputs.get(&inputs_task).cloned().unwrap_or_default()
    }

    fn optional_input_dependencies(&self, inputs_task: TaskId) -> Vec<InputDependencyId> {
        self.optionals_of_inputs.get(&inputs_task).cloned().unwrap_or_default()
    }

    fn required_input_dependencies(&self, compute_task: TaskId) -> Vec<InputDependencyId> {
        self.requireds_of_compute.get(&compute_task).cloned().unwrap_or_default()
    }

    fn unique_index(&self, output: OutputId) -> usize {
        self.unique_index[&output]
    }

    fn num_unique_input_dependencies(&self) -> usize {
        self.num_unique_input_dependencies
    }

    fn has_smbl(&self) -> bool {
        self.has_smbl
    }
}

/// Incrementally assembles a [`StaticSchedule`].
#[derive(Debug, Default)]
pub struct StaticScheduleBuilder {
    schedule: StaticSchedule,
}

impl StaticScheduleBuilder {
    /// Starts an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `output` on `node` with the given request/keep/affects
    /// masks, assigning it `unique_index` in the dedup table.
    #[must_use]
    pub fn schedule_output(
        mut self,
        node: NodeId,
        output: OutputId,
        request_mask: Mask,
        keep_mask: Mask,
        affects_mask: Mask,
        unique_index: usize,
    ) -> Self {
        self.schedule.outputs_of_node.entry(node).or_default().push(output);
        self.schedule.request_masks.insert(output, request_mask);
        self.schedule.keep_masks.insert(output, keep_mask);
        self.schedule.affects_masks.insert(output, affects_mask);
        self.schedule.unique_index.insert(output, unique_index);
        self.schedule.num_unique_input_dependencies =
            self.schedule.num_unique_input_dependencies.max(unique_index + 1);
        self
    }

    /// Routes `output`'s private-buffer initial contents from
    /// `from_buffer`.
    #[must_use]
    pub fn with_from_buffer(mut self, output: OutputId, from_buffer: OutputId) -> Self {
        self.schedule.from_buffer.insert(output, from_buffer);
        self
    }

    /// Routes `output`'s computed data to `pass_to` instead of publishing
    /// locally.
    #[must_use]
    pub fn with_pass_to(mut self, output: OutputId, pass_to: OutputId) -> Self {
        self.schedule.pass_to.insert(output, pass_to);
        self
    }

    /// Registers `compute_task` as one of `node`'s compute tasks, and as
    /// the producer of `output`.
    #[must_use]
    pub fn with_compute_task(mut self, node: NodeId, output: OutputId, compute_task: TaskId) -> Self {
        let tasks = self.schedule.compute_tasks_of_node.entry(node).or_default();
        if !tasks.contains(&compute_task) {
            tasks.push(compute_task);
        }
        self.schedule.compute_task_of_output.insert(output, compute_task);
        self.schedule.node_of_compute_task.insert(compute_task, node);
        self
    }

    /// Gives `node` a keep task.
    #[must_use]
    pub fn with_keep_task(mut self, node: NodeId, keep_task: TaskId) -> Self {
        self.schedule.keep_task_of_node.insert(node, keep_task);
        self
    }

    /// Gives `compute_task` an inputs task.
    #[must_use]
    pub fn with_inputs_task(mut self, compute_task: TaskId, inputs_task: TaskId) -> Self {
        self.schedule.inputs_task_of_compute.insert(compute_task, inputs_task);
        self
    }

    /// Gives `compute_task` a prep task.
    #[must_use]
    pub fn with_prep_task(mut self, compute_task: TaskId, prep_task: TaskId) -> Self {
        self.schedule.prep_task_of_compute.insert(compute_task, prep_task);
        self
    }

    /// Adds `dep` as one of `inputs_task`'s unconditional prereqs, and
    /// registers `dep`'s producing output as `source`.
    #[must_use]
    pub fn with_prereq(mut self, inputs_task: TaskId, dep: InputDependencyId, source: OutputId) -> Self {
        self.schedule.prereqs_of_inputs.entry(inputs_task).or_default().push(dep);
        self.schedule.dependency_source.insert(dep, source);
        self
    }

    /// Adds `dep` as one of `inputs_task`'s optionals, and registers `dep`'s
    /// producing output as `source`.
    #[must_use]
    pub fn with_optional(mut self, inputs_task: TaskId, dep: InputDependencyId, source: OutputId) -> Self {
        self.schedule.optionals_of_inputs.entry(inputs_task).or_default().push(dep);
        self.schedule.dependency_source.insert(dep, source);
        self
    }

    /// Adds `dep` as one of `compute_task`'s required dependencies, and
    /// registers `dep`'s producing output as `source`.
    #[must_use]
    pub fn with_required(mut self, compute_task: TaskId, dep: InputDependencyId, source: OutputId) -> Self {
        self.schedule.requireds_of_compute.entry(compute_task).or_default().push(dep);
        self.schedule.dependency_source.insert(dep, source);
        self
    }

    /// Records which compute tasks `dep` feeds, for the engine to invoke
    /// before the consuming task's evaluate stage.
    #[must_use]
    pub fn with_dependency_consumers(mut self, dep: InputDependencyId, consumers: Vec<TaskId>) -> Self {
        self.schedule.compute_tasks_of_dependency.insert(dep, consumers);
        self
    }

    /// Enables sparse mung-buffer-locking for the built schedule.
    #[must_use]
    pub const fn with_smbl(mut self, enabled: bool) -> Self {
        self.schedule.has_smbl = enabled;
        self
    }

    /// Finishes building the schedule.
    #[must_use]
    pub fn build(self) -> StaticSchedule {
        self.schedule
    }
}

#[cfg(test)]
mod tests {
    use sceneflow_mask::OutputId;
    use sceneflow_network::Network;

    use super::*;

    #[test]
    fn builder_roundtrips_every_query() {
        let mut net = Network::new();
        let node = net.create_node(vec![], vec![sceneflow_network::OutputSpec::new("out")], None);
        let output = OutputId::new(node.index(), 0);
        let compute_task = TaskId::new(0);
        let dep = InputDependencyId::new(0);

        let schedule = StaticScheduleBuilder::new()
            .schedule_output(node, output, Mask::all_ones(4), Mask::empty(4), Mask::all_ones(4), 0)
            .with_compute_task(node, output, compute_task)
            .with_required(compute_task, dep, output)
            .with_dependency_consumers(dep, std::vec![compute_task])
            .build();

        assert_eq!(schedule.scheduled_outputs_of(node), std::vec![output]);
        assert_eq!(schedule.request_mask(output).count(), 4);
        assert_eq!(schedule.compute_task_for_output(output), Some(compute_task));
        assert_eq!(schedule.required_input_dependencies(compute_task), std::vec![dep]);
        assert_eq!(schedule.input_dependency_source(dep), output);
        assert_eq!(schedule.compute_tasks_for_input_dependency(dep), std::vec![compute_task]);
        assert_eq!(schedule.unique_index(output), 0);
        assert_eq!(schedule.num_unique_input_dependencies(), 1);
        assert!(!schedule.has_smbl());
    }
}
