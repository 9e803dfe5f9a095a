// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::cell::RefCell;
use std::collections::HashSet;

use sceneflow_data::{DataManager, ErasedBuffer};
use sceneflow_mask::{Mask, MaskedOutput, MaskedOutputVector, OutputId};
use sceneflow_network::{InputKind, Network, Node, NodeId, RequiredInputs};
use sceneflow_schedule::Schedule;

use crate::completion::CompletionCallback;
use crate::context::EngineComputeContext;
use crate::error::EngineError;
use crate::error_logger::ErrorLogger;
use crate::error_transport::ErrorTransport;
use crate::executor_engine::ExecutorEngine;
use crate::interruption::{Interruption, NoCycles};
use crate::options::EngineOptions;
use crate::routing::evaluate_node;
use crate::stats::{ExecutionStats, ExecutionStatsSnapshot};
use crate::value::FallbackRegistry;

/// An auxiliary pull evaluator spun up when a node's compute callback asks
/// for a value the main evaluation can't provide without first resolving a
/// value that node itself is currently in the process of producing — a
/// speculative read of one of the node's own outputs.
///
/// Seeded with the node that triggered speculation: any traversal that
/// walks back into that same node is the cycle closing, and is never
/// computed. Every node downstream of a node that closed a cycle this way
/// is itself marked speculated and skipped rather than run against
/// incomplete data. Shares `sceneflow-engine`'s node-evaluation plumbing
/// (`routing::evaluate_node`) with the parallel and pull engines; what is
/// unique to this executor is the stack-based traversal deciding whether a
/// node is safe to run at all.
pub struct SpeculationExecutor<'a> {
    speculation_node: NodeId,
    write_back: &'a DataManager,
    data: DataManager,
    fallback: FallbackRegistry,
}

impl<'a> SpeculationExecutor<'a> {
    /// Creates a speculation executor seeded with `speculation_node`: the
    /// node whose compute callback is blocked on the value being
    /// speculated. Results that resolve without closing a cycle are
    /// written back to `write_back` (the executor that triggered
    /// speculation), so a later, non-speculative read of the same output
    /// hits its cache instead of speculating again.
    #[must_use]
    pub fn new(capacity: usize, speculation_node: NodeId, write_back: &'a DataManager) -> Self {
        Self { speculation_node, write_back, data: DataManager::new(capacity), fallback: FallbackRegistry::new() }
    }

    /// Supplies the missing-value fallback registry a node's inputs are
    /// resolved against during this speculation, mirroring the main
    /// evaluator that triggered it.
    #[must_use]
    pub fn with_fallback_registry(mut self, fallback: FallbackRegistry) -> Self {
        self.fallback = fallback;
        self
    }

    /// Returns this executor's own buffer store. Distinct from
    /// [`Self::write_back`]'s store: a speculated output is published here
    /// but never there.
    #[must_use]
    pub const fn data(&self) -> &DataManager {
        &self.data
    }

    /// Pulls `output` to completion, running every upstream node it
    /// transitively needs, short of closing a cycle back through
    /// `speculation_node`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Interrupted`] or [`EngineError::Diagnostics`]
    /// under the same conditions as [`ExecutorEngine::run_schedule`].
    pub fn speculate(
        &self,
        network: &Network,
        schedule: &dyn Schedule,
        output: OutputId,
    ) -> Result<ExecutionStatsSnapshot, EngineError> {
        let ctx = self.fresh_ctx(network, schedule);
        run_output(&ctx, output);
        finish(&ctx)
    }

    fn fresh_ctx<'b>(&'b self, network: &'b Network, schedule: &'b dyn Schedule) -> RunCtx<'b> {
        RunCtx {
            network,
            schedule,
            data: &self.data,
            write_back: self.write_back,
            fallback: &self.fallback,
            speculation_node: self.speculation_node,
            logger: ErrorLogger::new(),
            transport: ErrorTransport::new(),
            stats: ExecutionStats::new(),
            interruption: Interruption::new(),
            options: EngineOptions::new(),
            executed_nodes: RefCell::new(HashSet::new()),
            speculated_nodes: RefCell::new(HashSet::new()),
        }
    }
}

impl ExecutorEngine for SpeculationExecutor<'_> {
    /// Speculates every output the schedule names, rather than a single
    /// caller-chosen one. Exists so a `SpeculationExecutor` can stand in
    /// wherever code is already written against `&dyn ExecutorEngine`;
    /// most callers want [`Self::speculate`] for a single output instead.
    /// `request`/`callback` are honored the same way [`Self::speculate`]
    /// would for each of `request`'s entries, once that output resolves.
    fn run_schedule(
        &self,
        network: &Network,
        schedule: &dyn Schedule,
        request: &MaskedOutputVector,
        callback: Option<&mut (dyn FnMut(MaskedOutput, usize) + Send)>,
        _options: &EngineOptions,
    ) -> Result<ExecutionStatsSnapshot, EngineError> {
        let ctx = self.fresh_ctx(network, schedule);
        for node in network.nodes() {
            for output in schedule.scheduled_outputs_of(node.id()) {
                run_output(&ctx, output);
            }
        }
        let callback = CompletionCallback::new(callback);
        for (request_index, masked_output) in request.iter().enumerate() {
            let output = masked_output.output();
            run_output(&ctx, output);
            callback.invoke(MaskedOutput::new(output, ctx.data.public_mask(output)), request_index);
        }
        finish(&ctx)
    }
}

fn finish(ctx: &RunCtx<'_>) -> Result<ExecutionStatsSnapshot, EngineError> {
    if ctx.interruption.is_interrupted() {
        return Err(EngineError::Interrupted);
    }
    let diagnostics = ctx.transport.drain();
    if !diagnostics.is_empty() {
        return Err(EngineError::Diagnostics(diagnostics));
    }
    Ok(ctx.stats.snapshot())
}

/// Which phase of resolving one stack entry's output has been reached.
/// Matches the order a node's evaluate stage itself runs in: prerequisites,
/// then required reads, then the read/write pool chain, then the callback.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Stage {
    Start,
    PreRequisitesDone,
    ReadsDone,
    Compute,
}

struct StackEntry {
    output: OutputId,
    node: NodeId,
    stage: Stage,
    num_pushed: usize,
    inputs_speculate: bool,
}

struct RunCtx<'a> {
    network: &'a Network,
    schedule: &'a dyn Schedule,
    data: &'a DataManager,
    write_back: &'a DataManager,
    fallback: &'a FallbackRegistry,
    speculation_node: NodeId,
    logger: ErrorLogger,
    transport: ErrorTransport,
    stats: ExecutionStats,
    interruption: Interruption,
    options: EngineOptions,
    /// Nodes whose evaluate stage has run (or been skipped as speculated)
    /// this call, keyed by node rather than by output: a node with several
    /// scheduled outputs is still run at most once.
    executed_nodes: RefCell<HashSet<NodeId>>,
    /// Which of `executed_nodes` turned out to have speculated inputs.
    speculated_nodes: RefCell<HashSet<NodeId>>,
}

impl<'a> RunCtx<'a> {
    fn node(&self, id: NodeId) -> &'a Node {
        self.network.node(id).expect("schedule named a node absent from the network")
    }
}

/// Pulls a single top-level output to completion using a fresh stack; the
/// per-evaluation `executed_nodes`/`speculated_nodes` state in `ctx` is
/// shared across every call this makes against the same [`RunCtx`], so a
/// node reached from two different top-level outputs still only runs once.
fn run_output(ctx: &RunCtx<'_>, output: OutputId) {
    let mut stack = Vec::new();
    let mut speculated = Vec::new();
    if !try_push(ctx, &mut stack, output) {
        return;
    }

    while let Some(top) = stack.last() {
        if ctx.interruption.poll(&|| ctx.options.poll_interruption_hook(), &NoCycles, top.node) {
            break;
        }
        step(ctx, &mut stack, &mut speculated);
    }
}

/// Pushes a stack entry for `output`, if the schedule actually scheduled a
/// compute task for it. An output the schedule never needed is guaranteed
/// never to be read, so it is simply dropped rather than pushed.
fn try_push(ctx: &RunCtx<'_>, stack: &mut Vec<StackEntry>, output: OutputId) -> bool {
    let Some(task) = ctx.schedule.compute_task_for_output(output) else { return false };
    let node = ctx.schedule.node_of_compute_task(task);
    stack.push(StackEntry { output, node, stage: Stage::Start, num_pushed: 0, inputs_speculate: false });
    true
}

/// Advances the top stack entry by exactly one "visit": first unwinding the
/// return values of whatever it pushed last visit, then running however
/// many of `Start`/`PreRequisitesDone`/`ReadsDone`/`Compute` fall through
/// without pushing new work of their own.
fn step(ctx: &RunCtx<'_>, stack: &mut Vec<StackEntry>, speculated: &mut Vec<bool>) {
    let idx = stack.len() - 1;

    let mut previous_speculated = false;
    while stack[idx].num_pushed > 0 {
        stack[idx].num_pushed -= 1;
        previous_speculated |= speculated.pop().expect("a pushed child always leaves a return value");
    }

    let node = stack[idx].node;
    let output = stack[idx].output;
    let mut stage = stack[idx].stage;

    if stage == Stage::Start {
        if node == ctx.speculation_node {
            speculated.push(true);
            stack.pop();
            return;
        }
        if ctx.executed_nodes.borrow().contains(&node) {
            speculated.push(ctx.speculated_nodes.borrow().contains(&node));
            stack.pop();
            return;
        }
        if mirror_if_cached(ctx, output) {
            speculated.push(false);
            stack.pop();
            return;
        }

        push_prerequisites(ctx, stack, idx);
        stack[idx].stage = Stage::PreRequisitesDone;
        if stack[idx].num_pushed > 0 {
            return;
        }
        stage = Stage::PreRequisitesDone;
    }

    if stage == Stage::PreRequisitesDone {
        stack[idx].inputs_speculate |= previous_speculated;
        if !previous_speculated {
            push_required_reads(ctx, stack, idx);
        }
        stack[idx].stage = Stage::ReadsDone;
        if stack[idx].num_pushed > 0 {
            return;
        }
        stage = Stage::ReadsDone;
    }

    if stage == Stage::ReadsDone {
        stack[idx].inputs_speculate |= previous_speculated;
        push_pool_chain_sources(ctx, stack, idx);
        stack[idx].stage = Stage::Compute;
        if stack[idx].num_pushed > 0 {
            return;
        }
    }

    // Stage::Compute
    stack[idx].inputs_speculate |= previous_speculated;
    let inputs_speculate = stack[idx].inputs_speculate;

    ctx.executed_nodes.borrow_mut().insert(node);
    if inputs_speculate {
        ctx.speculated_nodes.borrow_mut().insert(node);
        ctx.stats.record_speculated_output();
    } else {
        let task = ctx
            .schedule
            .compute_task_for_output(output)
            .expect("a pushed entry's output is always a scheduled compute task");
        let node_ref = ctx.node(node);
        evaluate_node(ctx.schedule, ctx.data, &ctx.logger, &ctx.transport, &ctx.stats, ctx.fallback, node, node_ref, task);
    }

    if !inputs_speculate && !ctx.interruption.is_interrupted() {
        for touched in ctx.schedule.scheduled_outputs_of(node) {
            write_back(ctx, touched);
        }
    }

    speculated.push(inputs_speculate);
    stack.pop();
}

/// Returns `true` if `output` is already resolved without needing to
/// compute anything: either this executor's own buffer already covers the
/// request, or the write-back executor's does, in which case its value is
/// copied down so the rest of this traversal only ever has to read from
/// `ctx.data`.
///
/// The two buffer stores are never locked at the same time: the write-back
/// lookup finishes (and its lock is dropped) before the result is written
/// into `ctx.data`.
fn mirror_if_cached(ctx: &RunCtx<'_>, output: OutputId) -> bool {
    let request = ctx.schedule.request_mask(output);
    if request.difference(&ctx.data.public_mask(output)).is_empty() {
        return true;
    }

    let mirrored = ctx.write_back.with_entry(output, |write_back| {
        let covered = write_back.public_mask();
        if request.difference(covered).is_empty() {
            write_back.public_values().map(|values| (copy_selected(values, covered), covered.clone()))
        } else {
            None
        }
    });

    let Some((values, mask)) = mirrored else { return false };
    ctx.data.set_private(output, values, mask);
    ctx.data.publish_private(output);
    true
}

fn copy_selected(values: &dyn ErasedBuffer, mask: &Mask) -> Box<dyn ErasedBuffer> {
    let mut copy = values.empty_like();
    copy.merge_from(values, mask);
    copy
}

fn push_prerequisites(ctx: &RunCtx<'_>, stack: &mut Vec<StackEntry>, idx: usize) {
    let node = ctx.node(stack[idx].node);
    let mut pushed = 0;
    for spec in node.input_specs() {
        if !spec.is_prerequisite() {
            continue;
        }
        for connection in node.incoming_named(spec.name()) {
            if try_push(ctx, stack, connection.source()) {
                pushed += 1;
            }
        }
    }
    stack[idx].num_pushed += pushed;
}

/// Pushes every non-prerequisite `Read` input the node's `required_inputs`
/// predicate says it needs, evaluated now that prerequisites have resolved
/// (task inversion, same predicate `routing::required_optional_dependencies`
/// asks on behalf of the main engines' inputs tasks).
fn push_required_reads(ctx: &RunCtx<'_>, stack: &mut Vec<StackEntry>, idx: usize) {
    let node = ctx.node(stack[idx].node);
    let Some(compute) = node.compute() else { return };

    let probe = EngineComputeContext::new(ctx.data, &ctx.logger, ctx.fallback, node, 0);
    let required = compute.required_inputs(&probe);

    let mut pushed = 0;
    for spec in node.input_specs() {
        if spec.is_prerequisite() || !matches!(spec.kind(), InputKind::Read) {
            continue;
        }
        let wanted = match &required {
            RequiredInputs::NoReads => false,
            RequiredInputs::AllReads => true,
            RequiredInputs::OneRead(name) => spec.name() == name,
        };
        if !wanted {
            continue;
        }
        for connection in node.incoming_named(spec.name()) {
            if try_push(ctx, stack, connection.source()) {
                pushed += 1;
            }
        }
    }
    stack[idx].num_pushed += pushed;
}

/// Pushes the sources feeding every read/write input's pool chain: either
/// the schedule's `from_buffer_output` routing, if it scheduled one, or the
/// input's own connected source otherwise.
fn push_pool_chain_sources(ctx: &RunCtx<'_>, stack: &mut Vec<StackEntry>, idx: usize) {
    let node = ctx.node(stack[idx].node);
    let mut pushed = 0;
    for spec in node.input_specs() {
        let InputKind::ReadWrite { associated_output } = spec.kind() else { continue };
        let assoc_output = OutputId::new(node.id().index(), associated_output);

        if let Some(from_buffer) = ctx.schedule.from_buffer_output(assoc_output) {
            if try_push(ctx, stack, from_buffer) {
                pushed += 1;
            }
            continue;
        }
        for connection in node.incoming_named(spec.name()) {
            if try_push(ctx, stack, connection.source()) {
                pushed += 1;
            }
        }
    }
    stack[idx].num_pushed += pushed;
}

/// Writes a just-computed output back to the write-back executor, so a
/// later non-speculative read of it hits a real cache instead of
/// speculating again.
///
/// The write into `ctx.write_back` happens inside one `with_entry` call:
/// setting the private buffer, absorbing whatever the current public mask
/// doesn't cover, and publishing the result all run under that output's
/// single entry lock rather than as several separate `DataManager` calls.
/// `TaskSyncTable` only dedupes callers inside one evaluation's own task
/// graph; it has no way to know about a concurrently-running
/// `SpeculationExecutor` writing into the same `write_back` store from
/// outside that graph, so without this the main evaluation's own publish of
/// `output` (`routing::route_computed_output`) could land in the gap
/// between this function's absorb check and its publish, and get
/// overwritten by a decision made against a mask that's no longer current.
/// Sharing the entry lock with `route_computed_output` is what actually
/// closes that window, not any dedup bookkeeping.
///
/// Open question, left unresolved: when `output` passes its data to another
/// output, writing back the full computed mask is only safe if the
/// write-back executor's invalidation timestamp for the pass-to output
/// matches its own (otherwise the old value could already be stale
/// downstream, the "mung buffer lock" case) — a comparison this crate has
/// no invalidation-timestamp machinery to perform yet. This always writes
/// only the keep mask instead, which is safe (the keep mask is always a
/// subset of what must survive) but may under-write relative to what a
/// timestamp comparison would have allowed.
fn write_back(ctx: &RunCtx<'_>, output: OutputId) {
    let Some((values, mask)) = ctx.data.with_entry(output, |data| {
        let mask = data.public_mask();
        if mask.is_empty() { None } else { data.public_values().map(|values| (copy_selected(values, mask), mask.clone())) }
    }) else {
        return;
    };

    let write_mask = if ctx.schedule.pass_to_output(output).is_some() {
        mask.intersect(&ctx.schedule.keep_mask(output))
    } else {
        mask
    };
    if write_mask.is_empty() {
        return;
    }

    let selected = copy_selected(values.as_ref(), &write_mask);
    ctx.write_back.with_entry(output, |buffer| {
        buffer.set_private(selected, write_mask.clone());
        let absorbed = buffer.absorb_uncovered_public(&write_mask);
        if absorbed.is_empty() {
            buffer.publish_private();
        } else {
            buffer.merge_into_scratch(&write_mask);
            buffer.publish_scratch();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use sceneflow_network::{Compute, ComputeContext, InputSpec, OutputSpec};
    use sceneflow_schedule::{StaticScheduleBuilder, TaskId};
    use std::sync::atomic::{AtomicI32, Ordering};

    struct Source(i32);

    impl Compute for Source {
        fn compute(&self, ctx: &mut dyn ComputeContext) {
            ctx.set_output("out", Box::new(self.0));
        }
    }

    struct Double(&'static AtomicI32);

    impl Compute for Double {
        fn compute(&self, ctx: &mut dyn ComputeContext) {
            self.0.fetch_add(1, Ordering::SeqCst);
            let input = ctx.input("in").and_then(|v| v.downcast_ref::<i32>()).copied().unwrap_or(0);
            ctx.set_output("out", Box::new(input * 2));
        }
    }

    #[test]
    fn a_cycle_back_to_the_speculation_node_marks_its_consumer_speculated_and_skips_it() {
        let mut network = Network::new();
        let a = network.create_node(vec![], vec![OutputSpec::new("out")], Some(Box::new(Source(1))));
        static CALLS: AtomicI32 = AtomicI32::new(0);
        let b = network.create_node(vec![InputSpec::read("in")], vec![OutputSpec::new("out")], Some(Box::new(Double(&CALLS))));
        network.connect(a, "out", b, "in", Mask::all_ones(1)).unwrap();

        let a_output = network.node(a).unwrap().output_id_named("out").unwrap();
        let b_output = network.node(b).unwrap().output_id_named("out").unwrap();

        let schedule = StaticScheduleBuilder::new()
            .schedule_output(a, a_output, Mask::all_ones(1), Mask::empty(1), Mask::all_ones(1), 0)
            .schedule_output(b, b_output, Mask::all_ones(1), Mask::empty(1), Mask::all_ones(1), 1)
            .with_compute_task(a, a_output, TaskId::new(0))
            .with_compute_task(b, b_output, TaskId::new(1))
            .build();

        let write_back = DataManager::new(1);
        let executor = SpeculationExecutor::new(1, a, &write_back);
        let snapshot = executor.speculate(&network, &schedule, b_output).unwrap();

        assert_eq!(snapshot.speculated_outputs, 1);
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);
        assert!(executor.data().public_mask(b_output).is_empty());
        assert!(write_back.public_mask(b_output).is_empty());
    }

    #[test]
    fn a_chain_with_no_cycle_runs_through_and_writes_back_to_the_parent_executor() {
        let mut network = Network::new();
        let source = network.create_node(vec![], vec![OutputSpec::new("out")], Some(Box::new(Source(5))));
        static CALLS: AtomicI32 = AtomicI32::new(0);
        let doubler =
            network.create_node(vec![InputSpec::read("in")], vec![OutputSpec::new("out")], Some(Box::new(Double(&CALLS))));
        network.connect(source, "out", doubler, "in", Mask::all_ones(1)).unwrap();

        let source_output = network.node(source).unwrap().output_id_named("out").unwrap();
        let doubler_output = network.node(doubler).unwrap().output_id_named("out").unwrap();
        let unrelated = network.create_node(vec![], vec![], None);

        let schedule = StaticScheduleBuilder::new()
            .schedule_output(source, source_output, Mask::all_ones(1), Mask::empty(1), Mask::all_ones(1), 0)
            .schedule_output(doubler, doubler_output, Mask::all_ones(1), Mask::empty(1), Mask::all_ones(1), 1)
            .with_compute_task(source, source_output, TaskId::new(0))
            .with_compute_task(doubler, doubler_output, TaskId::new(1))
            .build();

        let write_back = DataManager::new(1);
        let executor = SpeculationExecutor::new(1, unrelated, &write_back);
        let snapshot = executor.speculate(&network, &schedule, doubler_output).unwrap();

        assert_eq!(snapshot.speculated_outputs, 0);
        assert_eq!(snapshot.compute_tasks_invoked, 2);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(executor.data().public_mask(doubler_output).count(), 1);
        assert_eq!(write_back.public_mask(doubler_output).count(), 1);
        assert_eq!(write_back.public_mask(source_output).count(), 1);
    }

    #[test]
    fn an_output_already_cached_upstream_is_mirrored_instead_of_recomputed() {
        let mut network = Network::new();
        static CALLS: AtomicI32 = AtomicI32::new(0);
        let source = network.create_node(vec![], vec![OutputSpec::new("out")], Some(Box::new(Double(&CALLS))));
        let source_output = network.node(source).unwrap().output_id_named("out").unwrap();
        let unrelated = network.create_node(vec![], vec![], None);

        let schedule = StaticScheduleBuilder::new()
            .schedule_output(source, source_output, Mask::all_ones(1), Mask::empty(1), Mask::all_ones(1), 0)
            .with_compute_task(source, source_output, TaskId::new(0))
            .build();

        let write_back = DataManager::new(1);
        write_back.set_private(source_output, Box::new(sceneflow_data::TypedBuffer::from_vec(std::vec![42])), Mask::all_ones(1));
        write_back.publish_private(source_output);

        let executor = SpeculationExecutor::new(1, unrelated, &write_back);
        let snapshot = executor.speculate(&network, &schedule, source_output).unwrap();

        assert_eq!(snapshot.compute_tasks_invoked, 0);
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);
        assert_eq!(executor.data().public_mask(source_output).count(), 1);
    }
}
