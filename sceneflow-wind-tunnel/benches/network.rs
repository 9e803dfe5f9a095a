// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use sceneflow_depcache::LeafNodeCache;
use sceneflow_engine::EngineOptions;
use sceneflow_mask::{Mask, MaskedOutput, OutputId};
use sceneflow_network::{Compute, ComputeContext, InputSpec, Network, OutputSpec};
use sceneflow_runtime::{NullPageCacheStore, Runtime, Time, TimeDependentInputs};
use sceneflow_schedule::{InputDependencyId, StaticSchedule, StaticScheduleBuilder, TaskId};

/// Entry point for `sceneflow` wind-tunnel benchmarks.
///
/// Registers scenarios that highlight how the cost of running and
/// invalidating a schedule scales with the shape of the network it runs
/// against: chains, fanout, and a time change that does or doesn't
/// actually touch anything.
fn bench_network(c: &mut Criterion) {
    bench_chain_compute(c);
    bench_fanout_invalidate(c);
    bench_chain_time_change_all_differ(c);
    bench_chain_time_change_none_differ(c);
}

struct Increment;

impl Compute for Increment {
    fn compute(&self, ctx: &mut dyn ComputeContext) {
        let input = ctx.input("in").and_then(|v| v.downcast_ref::<i64>()).copied().unwrap_or(0);
        ctx.set_output("out", Box::new(input + 1));
    }
}

fn build_chain(len: usize) -> (Network, Vec<OutputId>, StaticSchedule) {
    let mut network = Network::new();
    let root = network.create_node(Vec::new(), vec![OutputSpec::new("out")], Some(Box::new(Increment)));
    let root_output = network.node(root).unwrap().output_id_named("out").unwrap();

    let mut builder = StaticScheduleBuilder::new().schedule_output(
        root,
        root_output,
        Mask::all_ones(1),
        Mask::empty(1),
        Mask::all_ones(1),
        0,
    );
    builder = builder.with_compute_task(root, root_output, TaskId::new(0));

    let mut outputs = vec![root_output];
    let mut prev_node = root;
    let mut prev_output = root_output;
    let mut prev_task = TaskId::new(0);

    for index in 1..len {
        let node = network.create_node(
            vec![InputSpec::read("in")],
            vec![OutputSpec::new("out")],
            Some(Box::new(Increment)),
        );
        network.connect(prev_node, "out", node, "in", Mask::all_ones(1)).unwrap();
        let output = network.node(node).unwrap().output_id_named("out").unwrap();
        let task = TaskId::new(u32::try_from(index).expect("bench chain length fits in u32"));
        let dep = InputDependencyId::new(task.index());

        builder = builder
            .schedule_output(node, output, Mask::all_ones(1), Mask::empty(1), Mask::all_ones(1), index)
            .with_compute_task(node, output, task)
            .with_required(task, dep, prev_output)
            .with_dependency_consumers(dep, vec![prev_task]);

        outputs.push(output);
        prev_node = node;
        prev_output = output;
        prev_task = task;
    }

    (network, outputs, builder.build())
}

/// Linear chain of `len` compute nodes, each depending on the previous
/// node's output.
///
/// Measures the cost of running the full schedule end to end, which this
/// crate's executor always does (there is no cross-run memoization below
/// the point where a caller decides a schedule doesn't need to run at
/// all).
fn bench_chain_compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_compute");
    for &len in &[10_usize, 100, 1_000] {
        let (network, _outputs, schedule) = build_chain(len);
        let runtime = Runtime::new(1, Box::new(NullPageCacheStore));
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| {
                black_box(runtime.compute_values(&network, &schedule, &Vec::new(), None, &EngineOptions::new()).unwrap());
            });
        });
    }
    group.finish();
}

fn build_fanout(fanout: usize) -> (Network, OutputId) {
    let mut network = Network::new();
    let root = network.create_node(Vec::new(), vec![OutputSpec::new("out")], Some(Box::new(Increment)));
    let root_output = network.node(root).unwrap().output_id_named("out").unwrap();

    for _ in 0..fanout {
        let leaf = network.create_node(
            vec![InputSpec::read("in")],
            vec![OutputSpec::new("out")],
            Some(Box::new(Increment)),
        );
        network.connect(root, "out", leaf, "in", Mask::all_ones(1)).unwrap();
    }

    (network, root_output)
}

/// Star/fanout network where a single root feeds `fanout` independent
/// leaves.
///
/// Measures `Runtime::invalidate_executor`'s forward walk: every leaf's
/// own output must be visited once, so this should scale linearly with
/// `fanout`.
fn bench_fanout_invalidate(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout_invalidate_executor");
    for &fanout in &[10_usize, 100, 1_000] {
        let (network, root_output) = build_fanout(fanout);
        let runtime = Runtime::new(1, Box::new(NullPageCacheStore));
        let request = vec![MaskedOutput::new(root_output, Mask::all_ones(1))];
        group.bench_with_input(BenchmarkId::from_parameter(fanout), &fanout, |b, _| {
            b.iter(|| {
                runtime.invalidate_executor(black_box(&network), black_box(&request));
            });
        });
    }
    group.finish();
}

struct AllDiffer(Vec<OutputId>);

impl TimeDependentInputs for AllDiffer {
    fn time_dependent_outputs(&self) -> &[OutputId] {
        &self.0
    }

    fn differs_between(&self, _output: OutputId, _old: Time, _new: Time) -> bool {
        true
    }
}

struct NoneDiffer(Vec<OutputId>);

impl TimeDependentInputs for NoneDiffer {
    fn time_dependent_outputs(&self) -> &[OutputId] {
        &self.0
    }

    fn differs_between(&self, _output: OutputId, _old: Time, _new: Time) -> bool {
        false
    }
}

/// Time change where every declared time-dependent output actually
/// differs between the old and new time.
///
/// Measures the worst case: every output is invalidated and the leaf
/// cache must resolve reachability for the whole set.
fn bench_chain_time_change_all_differ(c: &mut Criterion) {
    let mut group = c.benchmark_group("time_change_all_differ");
    for &len in &[10_usize, 100, 1_000] {
        let (network, outputs, _schedule) = build_chain(len);
        let leaf_cache = LeafNodeCache::new();
        let time_inputs = AllDiffer(outputs);
        let runtime = Runtime::new(1, Box::new(NullPageCacheStore));
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            let mut frame = 0.0_f64;
            b.iter(|| {
                frame += 1.0;
                black_box(runtime.time_change(&time_inputs, &network, &leaf_cache, Time::frame(black_box(frame))));
            });
        });
    }
    group.finish();
}

/// Same network and declared time-dependent set, but nothing actually
/// differs between the old and new time.
///
/// Isolates the framework overhead of a time change from the cost of
/// invalidating and re-resolving leaves: this should be near-constant
/// regardless of chain length.
fn bench_chain_time_change_none_differ(c: &mut Criterion) {
    let mut group = c.benchmark_group("time_change_none_differ");
    for &len in &[10_usize, 100, 1_000] {
        let (network, outputs, _schedule) = build_chain(len);
        let leaf_cache = LeafNodeCache::new();
        let time_inputs = NoneDiffer(outputs);
        let runtime = Runtime::new(1, Box::new(NullPageCacheStore));
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            let mut frame = 0.0_f64;
            b.iter(|| {
                frame += 1.0;
                black_box(runtime.time_change(&time_inputs, &network, &leaf_cache, Time::frame(black_box(frame))));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_network);
criterion_main!(benches);
