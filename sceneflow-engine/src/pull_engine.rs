// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::cell::RefCell;
use std::collections::HashSet;

use parking_lot::Mutex;
use sceneflow_data::DataManager;
use sceneflow_mask::{MaskedOutput, MaskedOutputVector, OutputId};
use sceneflow_network::{Network, Node, NodeId};
use sceneflow_schedule::{InputDependencyId, Schedule, TaskId};

use crate::completion::CompletionCallback;
use crate::error::EngineError;
use crate::error_logger::ErrorLogger;
use crate::error_transport::ErrorTransport;
use crate::executor_engine::ExecutorEngine;
use crate::interruption::{CycleDetector, Interruption};
use crate::options::EngineOptions;
use crate::routing::{evaluate_node, required_optional_dependencies};
use crate::stats::{ExecutionStats, ExecutionStatsSnapshot};
use crate::task::{ComputeStage, InputsStage, KeepStage, LeafStage, Task};
use crate::value::FallbackRegistry;

/// A single-threaded executor that realizes the task graph by plain
/// recursion instead of work-stealing, selected by
/// [`EngineOptions::parallel_evaluation`] returning `false`.
///
/// `ParallelExecutorEngine` and `PullExecutorEngine` run the exact same
/// `Task`/stage vocabulary from `task.rs`; the pull engine just drives it by
/// recursive descent with a per-kind "already done" set standing in for the
/// parallel engine's join tables, rather than by claiming ids into a shared
/// deque. This makes it a natural reference implementation to check the
/// parallel engine's results against, and a cheaper choice when a caller
/// only needs a handful of outputs from an otherwise large network.
pub struct PullExecutorEngine {
    data: DataManager,
    fallback: FallbackRegistry,
}

impl PullExecutorEngine {
    /// Creates an engine whose buffers are sized to `capacity` elements
    /// until an output's first write grows them, with no fallback values
    /// registered for missing inputs.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { data: DataManager::new(capacity), fallback: FallbackRegistry::new() }
    }

    /// Registers `fallback` as the value this engine's computations fall
    /// back to when a required input's producer left it unwritten.
    #[must_use]
    pub fn with_fallback_registry(mut self, fallback: FallbackRegistry) -> Self {
        self.fallback = fallback;
        self
    }

    /// Returns the buffer store this engine publishes results into.
    #[must_use]
    pub const fn data(&self) -> &DataManager {
        &self.data
    }

    /// Pulls `leaf_node`'s single requested input to completion without
    /// running the rest of a schedule.
    ///
    /// A leaf node (zero outputs, one read input named `"in"`) is never a
    /// scheduled compute task of its own — it has no output for
    /// `Schedule::compute_task_for_output` to name — so nothing in
    /// `run_schedule`'s own root discovery ever reaches it. This entry point
    /// lets a caller that already knows about a leaf node (a page-cache
    /// write sink, an export node) force its upstream to run on demand.
    ///
    /// Unlike [`Task::Leaf`], which names a requested *output* and exists to
    /// fire a completion callback, this runs a structural leaf *node*'s
    /// upstream producer directly and fires no callback of its own.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Interrupted`] or [`EngineError::Diagnostics`]
    /// under the same conditions as [`ExecutorEngine::run_schedule`].
    pub fn pull_leaf(
        &self,
        network: &Network,
        schedule: &dyn Schedule,
        leaf_node: NodeId,
    ) -> Result<ExecutionStatsSnapshot, EngineError> {
        let ctx = self.fresh_ctx(network, schedule, EngineOptions::new(), CompletionCallback::new(None));
        if let Some(connection) = ctx.node(leaf_node).incoming_named("in").first() {
            if let Some(producer) = ctx.schedule.compute_task_for_output(connection.source()) {
                let producer_node = ctx.schedule.node_of_compute_task(producer);
                run_task(&ctx, Task::Compute { task_id: producer, node: producer_node, stage: ComputeStage::Inputs });
            }
        }
        self.finish(&ctx)
    }

    fn fresh_ctx<'a, 'b>(
        &'a self,
        network: &'a Network,
        schedule: &'a dyn Schedule,
        options: EngineOptions,
        callback: CompletionCallback<'b>,
    ) -> RunCtx<'a, 'b> {
        RunCtx {
            network,
            schedule,
            data: &self.data,
            fallback: &self.fallback,
            logger: ErrorLogger::new(),
            transport: ErrorTransport::new(),
            stats: ExecutionStats::new(),
            interruption: Interruption::new(),
            active: ActiveStack::default(),
            compute_done: RefCell::new(HashSet::new()),
            inputs_done: RefCell::new(HashSet::new()),
            prep_done: RefCell::new(HashSet::new()),
            keep_done: RefCell::new(HashSet::new()),
            seen_dependencies: RefCell::new(HashSet::new()),
            options,
            callback,
        }
    }

    fn finish(&self, ctx: &RunCtx<'_, '_>) -> Result<ExecutionStatsSnapshot, EngineError> {
        if ctx.interruption.is_interrupted() {
            return Err(EngineError::Interrupted);
        }
        let diagnostics = ctx.transport.drain();
        if !diagnostics.is_empty() {
            return Err(EngineError::Diagnostics(diagnostics));
        }
        Ok(ctx.stats.snapshot())
    }
}

impl ExecutorEngine for PullExecutorEngine {
    fn run_schedule(
        &self,
        network: &Network,
        schedule: &dyn Schedule,
        request: &MaskedOutputVector,
        callback: Option<&mut (dyn FnMut(MaskedOutput, usize) + Send)>,
        options: &EngineOptions,
    ) -> Result<ExecutionStatsSnapshot, EngineError> {
        let ctx = self.fresh_ctx(network, schedule, options.clone(), CompletionCallback::new(callback));

        for node in network.nodes() {
            let node_id = node.id();
            if let Some(keep_task) = ctx.schedule.keep_task_of(node_id) {
                run_task(&ctx, Task::Keep { task_id: keep_task, node: node_id, stage: KeepStage::RunContributors });
                continue;
            }
            for output in ctx.schedule.scheduled_outputs_of(node_id) {
                let Some(compute_task) = ctx.schedule.compute_task_for_output(output) else { continue };
                run_task(&ctx, Task::Compute { task_id: compute_task, node: node_id, stage: ComputeStage::Inputs });
            }
        }

        for (request_index, masked_output) in request.iter().enumerate() {
            run_task(&ctx, Task::Leaf { output: masked_output.output(), request_index, stage: LeafStage::SpawnRequested });
        }

        self.finish(&ctx)
    }
}

/// Tracks which nodes are currently mid-evaluation on the recursion stack,
/// so a node that recurses back into itself through its own dependency
/// chain is caught as a cycle rather than overflowing the stack.
#[derive(Default)]
struct ActiveStack {
    nodes: Mutex<HashSet<NodeId>>,
}

impl ActiveStack {
    fn push(&self, node: NodeId) {
        self.nodes.lock().insert(node);
    }

    fn pop(&self, node: NodeId) {
        self.nodes.lock().remove(&node);
    }
}

impl CycleDetector for ActiveStack {
    fn detect(&self, node: NodeId) -> bool {
        self.nodes.lock().contains(&node)
    }
}

struct RunCtx<'a, 'b> {
    network: &'a Network,
    schedule: &'a dyn Schedule,
    data: &'a DataManager,
    fallback: &'a FallbackRegistry,
    logger: ErrorLogger,
    transport: ErrorTransport,
    stats: ExecutionStats,
    interruption: Interruption,
    active: ActiveStack,
    compute_done: RefCell<HashSet<TaskId>>,
    inputs_done: RefCell<HashSet<TaskId>>,
    prep_done: RefCell<HashSet<TaskId>>,
    keep_done: RefCell<HashSet<TaskId>>,
    seen_dependencies: RefCell<HashSet<usize>>,
    options: EngineOptions,
    callback: CompletionCallback<'b>,
}

impl<'a, 'b> RunCtx<'a, 'b> {
    fn node(&self, id: NodeId) -> &'a Node {
        self.network.node(id).expect("task named a node absent from the network")
    }
}

/// Runs one task to completion, recursing into whatever it depends on along
/// the way.
///
/// Unlike the parallel engine's `run_task`, this never returns pending
/// children: by the time it returns, `task`'s own dependencies (and
/// everything *they* depend on) have already been run.
fn run_task(ctx: &RunCtx<'_, '_>, task: Task) {
    match task {
        Task::Compute { task_id, node, stage } => run_compute(ctx, task_id, node, stage),
        Task::Inputs { task_id, node, stage } => run_inputs(ctx, task_id, node, stage),
        Task::Prep { task_id, node } => run_prep(ctx, task_id, node),
        Task::Keep { task_id, node, stage } => run_keep(ctx, task_id, node, stage),
        Task::Leaf { output, request_index, stage } => run_leaf(ctx, output, request_index, stage),
        Task::InvokeDependency { dependency, parent } => run_invoke_dependency(ctx, dependency, parent),
    }
}

fn is_interrupted(ctx: &RunCtx<'_, '_>, node: NodeId) -> bool {
    ctx.interruption.poll(&|| ctx.options.poll_interruption_hook(), &ctx.active, node)
}

fn run_compute(ctx: &RunCtx<'_, '_>, task_id: TaskId, node: NodeId, stage: ComputeStage) {
    if ctx.compute_done.borrow().contains(&task_id) {
        return;
    }
    if is_interrupted(ctx, node) {
        ctx.compute_done.borrow_mut().insert(task_id);
        return;
    }

    match stage {
        ComputeStage::Inputs => {
            if let Some(inputs_task) = ctx.schedule.inputs_task_of(task_id) {
                run_task(ctx, Task::Inputs { task_id: inputs_task, node, stage: InputsStage::Prereqs });
            }
            run_compute(ctx, task_id, node, ComputeStage::PrepNode);
        }
        ComputeStage::PrepNode => {
            if let Some(prep_task) = ctx.schedule.prep_task_of(task_id) {
                run_task(ctx, Task::Prep { task_id: prep_task, node });
            }
            run_compute(ctx, task_id, node, ComputeStage::EvaluateNode);
        }
        ComputeStage::EvaluateNode => {
            let deps = ctx.schedule.required_input_dependencies(task_id);
            resolve_and_run_producers(ctx, &deps);
            run_compute(ctx, task_id, node, ComputeStage::RunCallback);
        }
        ComputeStage::RunCallback => {
            ctx.active.push(node);
            let node_ref = ctx.node(node);
            evaluate_node(ctx.schedule, ctx.data, &ctx.logger, &ctx.transport, &ctx.stats, ctx.fallback, node, node_ref, task_id);
            ctx.active.pop(node);
            ctx.compute_done.borrow_mut().insert(task_id);
        }
    }
}

fn run_inputs(ctx: &RunCtx<'_, '_>, task_id: TaskId, node: NodeId, stage: InputsStage) {
    if ctx.inputs_done.borrow().contains(&task_id) {
        return;
    }
    if is_interrupted(ctx, node) {
        ctx.inputs_done.borrow_mut().insert(task_id);
        return;
    }

    match stage {
        InputsStage::Prereqs => {
            let deps = ctx.schedule.prereq_input_dependencies(task_id);
            resolve_and_run_producers(ctx, &deps);
            run_inputs(ctx, task_id, node, InputsStage::Optionals);
        }
        InputsStage::Optionals => {
            let node_ref = ctx.node(node);
            let deps = required_optional_dependencies(ctx.schedule, ctx.data, &ctx.logger, ctx.fallback, node_ref, task_id);
            resolve_and_run_producers(ctx, &deps);
            run_inputs(ctx, task_id, node, InputsStage::Finish);
        }
        InputsStage::Finish => {
            ctx.inputs_done.borrow_mut().insert(task_id);
        }
    }
}

fn run_prep(ctx: &RunCtx<'_, '_>, task_id: TaskId, node: NodeId) {
    if !ctx.prep_done.borrow_mut().insert(task_id) {
        return;
    }
    for output in ctx.schedule.scheduled_outputs_of(node) {
        let keep_mask = ctx.schedule.keep_mask(output);
        if !keep_mask.is_empty() {
            ctx.data.reset_scratch(output, &keep_mask);
        }
    }
}

fn run_keep(ctx: &RunCtx<'_, '_>, task_id: TaskId, node: NodeId, stage: KeepStage) {
    if ctx.keep_done.borrow().contains(&task_id) {
        return;
    }
    if is_interrupted(ctx, node) {
        ctx.keep_done.borrow_mut().insert(task_id);
        return;
    }

    match stage {
        KeepStage::RunContributors => {
            for output in ctx.schedule.scheduled_outputs_of(node) {
                ctx.data.reset_scratch(output, &ctx.schedule.keep_mask(output));
            }
            for contributor in ctx.schedule.compute_tasks_for_node(node) {
                let producer_node = ctx.schedule.node_of_compute_task(contributor);
                run_task(ctx, Task::Compute { task_id: contributor, node: producer_node, stage: ComputeStage::Inputs });
            }
            run_keep(ctx, task_id, node, KeepStage::PublishScratch);
        }
        KeepStage::PublishScratch => {
            for output in ctx.schedule.scheduled_outputs_of(node) {
                ctx.data.publish_scratch(output);
            }
            ctx.stats.record_keep_task_run();
            ctx.keep_done.borrow_mut().insert(task_id);
        }
    }
}

/// Runs a leaf task: forces `output`'s producer to run (if the schedule
/// names one), then invokes the completion callback for `request_index`.
fn run_leaf(ctx: &RunCtx<'_, '_>, output: OutputId, request_index: usize, stage: LeafStage) {
    if let LeafStage::SpawnRequested = stage {
        if let Some(producer) = ctx.schedule.compute_task_for_output(output) {
            let producer_node = ctx.schedule.node_of_compute_task(producer);
            run_task(ctx, Task::Compute { task_id: producer, node: producer_node, stage: ComputeStage::Inputs });
        }
    }
    let mask = ctx.data.public_mask(output);
    ctx.callback.invoke(MaskedOutput::new(output, mask), request_index);
}

fn run_invoke_dependency(ctx: &RunCtx<'_, '_>, dependency: InputDependencyId, _parent: TaskId) {
    resolve_and_run_producers(ctx, std::slice::from_ref(&dependency));
}

/// Runs every producer of `deps` to completion, consulting a seen-dependency
/// set purely for stats parity with the parallel engine's dedup table: a
/// recursive pull naturally dedups for free through each task kind's "done"
/// set, so this never needs to gate the actual recursive call on it.
fn resolve_and_run_producers(ctx: &RunCtx<'_, '_>, deps: &[InputDependencyId]) {
    for &dep in deps {
        let source = ctx.schedule.input_dependency_source(dep);
        let index = ctx.schedule.unique_index(source);
        if !ctx.seen_dependencies.borrow_mut().insert(index) {
            ctx.stats.record_input_dependency_deduped();
        }
        for producer in ctx.schedule.compute_tasks_for_input_dependency(dep) {
            let producer_node = ctx.schedule.node_of_compute_task(producer);
            run_task(ctx, Task::Compute { task_id: producer, node: producer_node, stage: ComputeStage::Inputs });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sceneflow_mask::Mask;
    use sceneflow_network::{InputSpec, OutputSpec};
    use sceneflow_schedule::{InputDependencyId as Dep, StaticScheduleBuilder};
    use std::sync::atomic::{AtomicI32, Ordering};

    struct Double(&'static AtomicI32);

    impl sceneflow_network::Compute for Double {
        fn compute(&self, ctx: &mut dyn sceneflow_network::ComputeContext) {
            let input = ctx.input("in").and_then(|v| v.downcast_ref::<i32>()).copied().unwrap_or(0);
            self.0.fetch_add(1, Ordering::SeqCst);
            ctx.set_output("out", Box::new(input * 2));
        }
    }

    struct Source(i32);

    impl sceneflow_network::Compute for Source {
        fn compute(&self, ctx: &mut dyn sceneflow_network::ComputeContext) {
            ctx.set_output("out", Box::new(self.0));
        }
    }

    #[test]
    fn a_chain_of_two_nodes_runs_through_the_scheduled_compute_tasks() {
        static CALLS: AtomicI32 = AtomicI32::new(0);
        let mut network = Network::new();
        let source = network.create_node(vec![], vec![OutputSpec::new("out")], Some(Box::new(Source(9))));
        let doubler =
            network.create_node(vec![InputSpec::read("in")], vec![OutputSpec::new("out")], Some(Box::new(Double(&CALLS))));
        network.connect(source, "out", doubler, "in", Mask::all_ones(1)).unwrap();

        let source_output = network.node(source).unwrap().output_id_named("out").unwrap();
        let doubler_output = network.node(doubler).unwrap().output_id_named("out").unwrap();
        let source_task = TaskId::new(0);
        let doubler_task = TaskId::new(1);
        let dep = Dep::new(0);

        let schedule = StaticScheduleBuilder::new()
            .schedule_output(source, source_output, Mask::all_ones(1), Mask::empty(1), Mask::all_ones(1), 0)
            .schedule_output(doubler, doubler_output, Mask::all_ones(1), Mask::empty(1), Mask::all_ones(1), 1)
            .with_compute_task(source, source_output, source_task)
            .with_compute_task(doubler, doubler_output, doubler_task)
            .with_required(doubler_task, dep, source_output)
            .with_dependency_consumers(dep, std::vec![source_task])
            .build();

        let engine = PullExecutorEngine::new(1);
        let request = std::vec![MaskedOutput::new(doubler_output, Mask::all_ones(1))];
        let mut completions = Vec::new();
        let mut record = |output: MaskedOutput, index: usize| completions.push((output.output(), index));
        let snapshot = engine.run_schedule(&network, &schedule, &request, Some(&mut record), &EngineOptions::new()).unwrap();

        assert_eq!(snapshot.compute_tasks_invoked, 2);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(engine.data().public_mask(doubler_output).count(), 1);
        assert_eq!(completions, std::vec![(doubler_output, 0)]);
    }

    #[test]
    fn pull_leaf_forces_its_upstream_producer_to_run() {
        let mut network = Network::new();
        let producer = network.create_node(vec![], vec![OutputSpec::new("out")], Some(Box::new(Source(3))));
        let sink = network.create_node(vec![InputSpec::read("in")], vec![], None);
        network.connect(producer, "out", sink, "in", Mask::all_ones(1)).unwrap();

        let producer_output = network.node(producer).unwrap().output_id_named("out").unwrap();
        let producer_task = TaskId::new(0);

        let schedule = StaticScheduleBuilder::new()
            .schedule_output(producer, producer_output, Mask::all_ones(1), Mask::empty(1), Mask::all_ones(1), 0)
            .with_compute_task(producer, producer_output, producer_task)
            .build();

        let engine = PullExecutorEngine::new(1);
        engine.pull_leaf(&network, &schedule, sink).unwrap();

        assert_eq!(engine.data().public_mask(producer_output).count(), 1);
    }

    #[test]
    fn repeated_demand_for_the_same_compute_task_invokes_it_only_once() {
        static CALLS: AtomicI32 = AtomicI32::new(0);
        let mut network = Network::new();
        let source = network.create_node(vec![], vec![OutputSpec::new("out")], Some(Box::new(Source(1))));
        let a = network.create_node(vec![InputSpec::read("in")], vec![OutputSpec::new("out")], Some(Box::new(Double(&CALLS))));
        let b = network.create_node(vec![InputSpec::read("in")], vec![OutputSpec::new("out")], Some(Box::new(Double(&CALLS))));
        network.connect(source, "out", a, "in", Mask::all_ones(1)).unwrap();
        network.connect(source, "out", b, "in", Mask::all_ones(1)).unwrap();

        let source_output = network.node(source).unwrap().output_id_named("out").unwrap();
        let a_output = network.node(a).unwrap().output_id_named("out").unwrap();
        let b_output = network.node(b).unwrap().output_id_named("out").unwrap();
        let source_task = TaskId::new(0);
        let a_task = TaskId::new(1);
        let b_task = TaskId::new(2);
        let dep_a = Dep::new(0);
        let dep_b = Dep::new(1);

        let schedule = StaticScheduleBuilder::new()
            .schedule_output(source, source_output, Mask::all_ones(1), Mask::empty(1), Mask::all_ones(1), 0)
            .schedule_output(a, a_output, Mask::all_ones(1), Mask::empty(1), Mask::all_ones(1), 1)
            .schedule_output(b, b_output, Mask::all_ones(1), Mask::empty(1), Mask::all_ones(1), 2)
            .with_compute_task(source, source_output, source_task)
            .with_compute_task(a, a_output, a_task)
            .with_compute_task(b, b_output, b_task)
            .with_required(a_task, dep_a, source_output)
            .with_required(b_task, dep_b, source_output)
            .with_dependency_consumers(dep_a, std::vec![source_task])
            .with_dependency_consumers(dep_b, std::vec![source_task])
            .build();

        let engine = PullExecutorEngine::new(1);
        let snapshot = engine.run_schedule(&network, &schedule, &Vec::new(), None, &EngineOptions::new()).unwrap();

        assert_eq!(snapshot.compute_tasks_invoked, 3);
        assert_eq!(snapshot.input_dependencies_deduped, 1);
    }
}
