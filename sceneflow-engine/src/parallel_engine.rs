// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_deque::{Injector, Steal, Worker};
use sceneflow_data::DataManager;
use sceneflow_mask::{MaskedOutput, MaskedOutputVector, OutputId};
use sceneflow_network::{Network, Node, NodeId};
use sceneflow_schedule::{InputDependencyId, Schedule, TaskId};

use crate::completion::CompletionCallback;
use crate::dedup::{DedupOutcome, DedupTable};
use crate::error::EngineError;
use crate::error_logger::ErrorLogger;
use crate::error_transport::ErrorTransport;
use crate::executor_engine::ExecutorEngine;
use crate::interruption::{CycleDetector, Interruption, NoCycles};
use crate::options::EngineOptions;
use crate::routing::{evaluate_node, required_optional_dependencies};
use crate::stats::{ExecutionStats, ExecutionStatsSnapshot};
use crate::sync::{Claim, TaskSyncTable};
use crate::task::{ComputeStage, InputsStage, KeepStage, LeafStage, Task};
use crate::value::FallbackRegistry;

/// The work-stealing executor engine: runs a schedule's task graph across a
/// fixed pool of worker threads confined to one `run_schedule` call.
///
/// Only the buffer store and the fallback registry outlive a single
/// evaluation; every synchronization table (`TaskSyncTable` per task kind,
/// the input-dependency dedup table, the error logger/transport, the stats
/// counters, the interruption flag) is built fresh inside `run_schedule`,
/// since task ids are only meaningful for the schedule that produced them.
pub struct ParallelExecutorEngine {
    data: DataManager,
    fallback: FallbackRegistry,
}

impl ParallelExecutorEngine {
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
}

/// Everything a worker thread needs to run one step of the task graph,
/// borrowed for the duration of one `run_schedule` call.
struct RunCtx<'a, 'b> {
    network: &'a Network,
    schedule: &'a dyn Schedule,
    data: &'a DataManager,
    fallback: &'a FallbackRegistry,
    logger: &'a ErrorLogger,
    transport: &'a ErrorTransport,
    stats: &'a ExecutionStats,
    interruption: &'a Interruption,
    dedup: &'a DedupTable,
    compute_sync: &'a TaskSyncTable,
    inputs_sync: &'a TaskSyncTable,
    prep_sync: &'a TaskSyncTable,
    keep_sync: &'a TaskSyncTable,
    options: &'a EngineOptions,
    cycle_detector: &'a dyn CycleDetector,
    callback: &'a CompletionCallback<'b>,
}

impl<'a, 'b> RunCtx<'a, 'b> {
    fn node(&self, id: NodeId) -> &'a Node {
        self.network.node(id).expect("task named a node absent from the network")
    }

    fn is_interrupted(&self, node: NodeId) -> bool {
        self.interruption.poll(&|| self.options.poll_interruption_hook(), self.cycle_detector, node)
    }
}

impl ExecutorEngine for ParallelExecutorEngine {
    fn run_schedule(
        &self,
        network: &Network,
        schedule: &dyn Schedule,
        request: &MaskedOutputVector,
        callback: Option<&mut (dyn FnMut(MaskedOutput, usize) + Send)>,
        options: &EngineOptions,
    ) -> Result<ExecutionStatsSnapshot, EngineError> {
        let logger = ErrorLogger::new();
        let transport = ErrorTransport::new();
        let stats = ExecutionStats::new();
        let interruption = Interruption::new();
        let dedup = DedupTable::new(schedule.num_unique_input_dependencies());
        let compute_sync = TaskSyncTable::new();
        let inputs_sync = TaskSyncTable::new();
        let prep_sync = TaskSyncTable::new();
        let keep_sync = TaskSyncTable::new();
        let no_cycles = NoCycles;
        let callback = CompletionCallback::new(callback);

        let ctx = RunCtx {
            network,
            schedule,
            data: &self.data,
            fallback: &self.fallback,
            logger: &logger,
            transport: &transport,
            stats: &stats,
            interruption: &interruption,
            dedup: &dedup,
            compute_sync: &compute_sync,
            inputs_sync: &inputs_sync,
            prep_sync: &prep_sync,
            keep_sync: &keep_sync,
            options,
            cycle_detector: &no_cycles,
            callback: &callback,
        };

        let roots = discover_roots(&ctx, request);
        run_workers(&ctx, roots, options.concurrency_limit());

        if interruption.is_interrupted() {
            return Err(EngineError::Interrupted);
        }
        let diagnostics = transport.drain();
        if !diagnostics.is_empty() {
            return Err(EngineError::Diagnostics(diagnostics));
        }
        Ok(stats.snapshot())
    }
}

/// Finds every root task this evaluation must run to completion: every
/// scheduled output's producer (or, if its node has a keep task, the keep
/// task standing in for all of that node's producers), plus one leaf task
/// per entry of `request` so its completion callback fires exactly once per
/// requested output.
fn discover_roots(ctx: &RunCtx<'_, '_>, request: &MaskedOutputVector) -> Vec<Task> {
    let mut roots = Vec::new();
    let mut seen_compute = HashSet::new();
    let mut seen_keep = HashSet::new();

    for node in ctx.network.nodes() {
        let node_id = node.id();
        if let Some(keep_task) = ctx.schedule.keep_task_of(node_id) {
            if seen_keep.insert(keep_task) {
                match ctx.keep_sync.claim(keep_task) {
                    Claim::Claimed => {
                        roots.push(Task::Keep { task_id: keep_task, node: node_id, stage: KeepStage::RunContributors });
                    }
                    Claim::Wait | Claim::Done => ctx.stats.record_compute_task_deduped(),
                }
            }
            continue;
        }

        for output in ctx.schedule.scheduled_outputs_of(node_id) {
            let Some(compute_task) = ctx.schedule.compute_task_for_output(output) else { continue };
            if !seen_compute.insert(compute_task) {
                continue;
            }
            match ctx.compute_sync.claim(compute_task) {
                Claim::Claimed => {
                    roots.push(Task::Compute { task_id: compute_task, node: node_id, stage: ComputeStage::Inputs });
                }
                Claim::Wait | Claim::Done => ctx.stats.record_compute_task_deduped(),
            }
        }
    }

    for (request_index, masked_output) in request.iter().enumerate() {
        roots.push(Task::Leaf { output: masked_output.output(), request_index, stage: LeafStage::SpawnRequested });
    }

    roots
}

/// Runs every root task to completion, work-stealing across `concurrency`
/// threads confined to this call.
///
/// Task ids are claimed exactly once (`discover_roots`, and every
/// `TaskSyncTable::join` call downstream), so the outstanding-task counter
/// this function maintains only ever reaches zero once no task can spawn
/// further work: a worker always accounts for a task's children before it
/// accounts for the task's own completion, so the counter never observes a
/// false zero while children are still being materialized.
fn run_workers(ctx: &RunCtx<'_, '_>, roots: Vec<Task>, concurrency: usize) {
    if roots.is_empty() {
        return;
    }

    let injector = Injector::new();
    let pending = AtomicUsize::new(roots.len());
    for root in roots {
        injector.push(root);
    }

    let workers: Vec<Worker<Task>> = (0..concurrency.max(1)).map(|_| Worker::new_fifo()).collect();
    let stealers: Vec<_> = workers.iter().map(Worker::stealer).collect();

    std::thread::scope(|scope| {
        for local in workers {
            let injector = &injector;
            let stealers = &stealers;
            let pending = &pending;
            scope.spawn(move || worker_loop(ctx, &local, injector, stealers, pending));
        }
    });
}

fn worker_loop(
    ctx: &RunCtx<'_, '_>,
    local: &Worker<Task>,
    injector: &Injector<Task>,
    stealers: &[crossbeam_deque::Stealer<Task>],
    pending: &AtomicUsize,
) {
    loop {
        let Some(task) = find_task(local, injector, stealers) else {
            if pending.load(Ordering::Acquire) == 0 {
                return;
            }
            std::thread::yield_now();
            continue;
        };

        let children = run_task(ctx, local, task);
        if !children.is_empty() {
            pending.fetch_add(children.len(), Ordering::AcqRel);
            for child in children {
                local.push(child);
            }
        }
        pending.fetch_sub(1, Ordering::AcqRel);
    }
}

fn find_task(
    local: &Worker<Task>,
    injector: &Injector<Task>,
    stealers: &[crossbeam_deque::Stealer<Task>],
) -> Option<Task> {
    if let Some(task) = local.pop() {
        return Some(task);
    }
    loop {
        match injector.steal_batch_and_pop(local) {
            Steal::Success(task) => return Some(task),
            Steal::Retry => continue,
            Steal::Empty => break,
        }
    }
    for stealer in stealers {
        loop {
            match stealer.steal() {
                Steal::Success(task) => return Some(task),
                Steal::Retry => continue,
                Steal::Empty => break,
            }
        }
    }
    None
}

/// Runs one task to whatever extent it can make progress without blocking,
/// returning the new tasks this step produced: either this task's own
/// dependencies (not yet satisfied) or downstream tasks released because
/// this was the last dependency they were waiting on.
fn run_task(ctx: &RunCtx<'_, '_>, local: &Worker<Task>, task: Task) -> Vec<Task> {
    match task {
        Task::Compute { task_id, node, stage } => run_compute(ctx, local, task_id, node, stage),
        Task::Inputs { task_id, node, stage } => run_inputs(ctx, local, task_id, node, stage),
        Task::Prep { task_id, node } => run_prep(ctx, task_id, node),
        Task::Keep { task_id, node, stage } => run_keep(ctx, local, task_id, node, stage),
        Task::Leaf { output, request_index, stage } => run_leaf(ctx, local, output, request_index, stage),
        Task::InvokeDependency { dependency, parent } => run_invoke_dependency(ctx, local, dependency, parent),
    }
}

/// Joins `dependencies` through `table`, recursing into the successor
/// inline if every dependency was already settled, or spawning whichever
/// dependencies this caller newly claimed.
fn continue_after(
    ctx: &RunCtx<'_, '_>,
    local: &Worker<Task>,
    table: &TaskSyncTable,
    dependencies: &[TaskId],
    successor: Task,
    spawn_dep: impl Fn(TaskId) -> Task,
) -> Vec<Task> {
    let (to_run, resumed) = table.join(dependencies, successor);
    let mut spawned: Vec<Task> = to_run.into_iter().map(spawn_dep).collect();
    if let Some(ready) = resumed {
        spawned.extend(run_task(ctx, local, ready));
    }
    spawned
}

fn run_compute(ctx: &RunCtx<'_, '_>, local: &Worker<Task>, task_id: TaskId, node: NodeId, stage: ComputeStage) -> Vec<Task> {
    if ctx.is_interrupted(node) {
        return ctx.compute_sync.mark_done(task_id);
    }

    match stage {
        ComputeStage::Inputs => match ctx.schedule.inputs_task_of(task_id) {
            Some(inputs_task) => continue_after(
                ctx,
                local,
                ctx.inputs_sync,
                &[inputs_task],
                Task::Compute { task_id, node, stage: ComputeStage::PrepNode },
                |id| Task::Inputs { task_id: id, node, stage: InputsStage::Prereqs },
            ),
            None => run_task(ctx, local, Task::Compute { task_id, node, stage: ComputeStage::PrepNode }),
        },
        ComputeStage::PrepNode => match ctx.schedule.prep_task_of(task_id) {
            Some(prep_task) => continue_after(
                ctx,
                local,
                ctx.prep_sync,
                &[prep_task],
                Task::Compute { task_id, node, stage: ComputeStage::EvaluateNode },
                |id| Task::Prep { task_id: id, node },
            ),
            None => run_task(ctx, local, Task::Compute { task_id, node, stage: ComputeStage::EvaluateNode }),
        },
        ComputeStage::EvaluateNode => {
            let deps = ctx.schedule.required_input_dependencies(task_id);
            let producers = resolve_producer_tasks(ctx, &deps);
            continue_after(
                ctx,
                local,
                ctx.compute_sync,
                &producers,
                Task::Compute { task_id, node, stage: ComputeStage::RunCallback },
                |id| Task::Compute { task_id: id, node: ctx.schedule.node_of_compute_task(id), stage: ComputeStage::Inputs },
            )
        }
        ComputeStage::RunCallback => {
            let node_ref = ctx.node(node);
            evaluate_node(ctx.schedule, ctx.data, ctx.logger, ctx.transport, ctx.stats, ctx.fallback, node, node_ref, task_id);
            ctx.compute_sync.mark_done(task_id)
        }
    }
}

fn run_inputs(ctx: &RunCtx<'_, '_>, local: &Worker<Task>, task_id: TaskId, node: NodeId, stage: InputsStage) -> Vec<Task> {
    if ctx.is_interrupted(node) {
        return ctx.inputs_sync.mark_done(task_id);
    }

    match stage {
        InputsStage::Prereqs => {
            let deps = ctx.schedule.prereq_input_dependencies(task_id);
            let producers = resolve_producer_tasks(ctx, &deps);
            continue_after(
                ctx,
                local,
                ctx.compute_sync,
                &producers,
                Task::Inputs { task_id, node, stage: InputsStage::Optionals },
                |id| Task::Compute { task_id: id, node: ctx.schedule.node_of_compute_task(id), stage: ComputeStage::Inputs },
            )
        }
        InputsStage::Optionals => {
            let node_ref = ctx.node(node);
            let deps = required_optional_dependencies(ctx.schedule, ctx.data, ctx.logger, ctx.fallback, node_ref, task_id);
            let producers = resolve_producer_tasks(ctx, &deps);
            continue_after(
                ctx,
                local,
                ctx.compute_sync,
                &producers,
                Task::Inputs { task_id, node, stage: InputsStage::Finish },
                |id| Task::Compute { task_id: id, node: ctx.schedule.node_of_compute_task(id), stage: ComputeStage::Inputs },
            )
        }
        InputsStage::Finish => ctx.inputs_sync.mark_done(task_id),
    }
}

/// Resolves `deps` to the compute tasks that produce them, consulting the
/// dedup table purely to skip redundant bookkeeping: the actual join still
/// goes through `TaskSyncTable`, which already guarantees a shared producer
/// runs exactly once regardless of how many callers discover it.
fn resolve_producer_tasks(ctx: &RunCtx<'_, '_>, deps: &[InputDependencyId]) -> Vec<TaskId> {
    let mut producers = Vec::new();
    for &dep in deps {
        let source = ctx.schedule.input_dependency_source(dep);
        let index = ctx.schedule.unique_index(source);
        if ctx.dedup.claim(index) == DedupOutcome::AlreadyInstalled {
            ctx.stats.record_input_dependency_deduped();
        }
        producers.extend(ctx.schedule.compute_tasks_for_input_dependency(dep));
    }
    producers.sort_unstable();
    producers.dedup();
    producers
}

fn run_invoke_dependency(
    ctx: &RunCtx<'_, '_>,
    local: &Worker<Task>,
    dependency: InputDependencyId,
    parent: TaskId,
) -> Vec<Task> {
    let _ = parent;
    let producers = resolve_producer_tasks(ctx, std::slice::from_ref(&dependency));
    producers
        .into_iter()
        .filter_map(|id| match ctx.compute_sync.claim(id) {
            Claim::Claimed => Some(Task::Compute { task_id: id, node: ctx.schedule.node_of_compute_task(id), stage: ComputeStage::Inputs }),
            Claim::Wait | Claim::Done => None,
        })
        .flat_map(|task| run_task(ctx, local, task))
        .collect()
}

fn run_prep(ctx: &RunCtx<'_, '_>, task_id: TaskId, node: NodeId) -> Vec<Task> {
    for output in ctx.schedule.scheduled_outputs_of(node) {
        let keep_mask = ctx.schedule.keep_mask(output);
        if !keep_mask.is_empty() {
            ctx.data.reset_scratch(output, &keep_mask);
        }
    }
    ctx.prep_sync.mark_done(task_id)
}

fn run_keep(ctx: &RunCtx<'_, '_>, local: &Worker<Task>, task_id: TaskId, node: NodeId, stage: KeepStage) -> Vec<Task> {
    if ctx.is_interrupted(node) {
        return ctx.keep_sync.mark_done(task_id);
    }

    match stage {
        KeepStage::RunContributors => {
            for output in ctx.schedule.scheduled_outputs_of(node) {
                ctx.data.reset_scratch(output, &ctx.schedule.keep_mask(output));
            }
            let contributors = ctx.schedule.compute_tasks_for_node(node);
            continue_after(
                ctx,
                local,
                ctx.compute_sync,
                &contributors,
                Task::Keep { task_id, node, stage: KeepStage::PublishScratch },
                |id| Task::Compute { task_id: id, node: ctx.schedule.node_of_compute_task(id), stage: ComputeStage::Inputs },
            )
        }
        KeepStage::PublishScratch => {
            for output in ctx.schedule.scheduled_outputs_of(node) {
                ctx.data.publish_scratch(output);
            }
            ctx.stats.record_keep_task_run();
            ctx.keep_sync.mark_done(task_id)
        }
    }
}

/// Runs a leaf task: forces `output`'s producer to run (if the schedule
/// names one), then invokes the completion callback for `request_index`.
///
/// One of these is seeded by `discover_roots` for every entry of the
/// `request` vector passed to `run_schedule`, so the callback fires exactly
/// once per requested output regardless of how many other tasks also
/// happen to depend on the same producer.
fn run_leaf(ctx: &RunCtx<'_, '_>, local: &Worker<Task>, output: OutputId, request_index: usize, stage: LeafStage) -> Vec<Task> {
    match stage {
        LeafStage::SpawnRequested => {
            let Some(producer) = ctx.schedule.compute_task_for_output(output) else {
                invoke_leaf_callback(ctx, output, request_index);
                return Vec::new();
            };
            continue_after(
                ctx,
                local,
                ctx.compute_sync,
                &[producer],
                Task::Leaf { output, request_index, stage: LeafStage::InvokeCallback },
                |id| Task::Compute { task_id: id, node: ctx.schedule.node_of_compute_task(id), stage: ComputeStage::Inputs },
            )
        }
        LeafStage::InvokeCallback => {
            invoke_leaf_callback(ctx, output, request_index);
            Vec::new()
        }
    }
}

fn invoke_leaf_callback(ctx: &RunCtx<'_, '_>, output: OutputId, request_index: usize) {
    let mask = ctx.data.public_mask(output);
    ctx.callback.invoke(MaskedOutput::new(output, mask), request_index);
}
