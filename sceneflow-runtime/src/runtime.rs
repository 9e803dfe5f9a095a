// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use sceneflow_data::DataManager;
use sceneflow_depcache::LeafNodeCache;
use sceneflow_engine::{EngineError, EngineOptions, ExecutionStatsSnapshot, ExecutorEngine, ParallelExecutorEngine};
use sceneflow_mask::{Mask, MaskedOutput, MaskedOutputVector, OutputId};
use sceneflow_network::{Network, Node, NodeId};
use sceneflow_schedule::Schedule;

use crate::page_cache::PageCacheStore;
use crate::time::{Time, TimeInterval};
use crate::time_dependence::TimeDependentInputs;

/// Owns the one [`ParallelExecutorEngine`] a program computes values
/// through, and everything invalidation touches besides the compute
/// callbacks themselves: the current time, the topological-state version,
/// and the page-cache collaborator.
///
/// A thin coordinator: it delegates computation to its executor and
/// dependency discovery to a [`LeafNodeCache`] passed in by the caller at
/// each invalidation site, rather than owned here, since the cache is
/// expected to outlive any one runtime instance across hot-reloads.
pub struct Runtime {
    executor: ParallelExecutorEngine,
    topological_state_version: AtomicUsize,
    cache_storage: Box<dyn PageCacheStore>,
    current_time: Mutex<Time>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("topological_state_version", &self.topological_state_version.load(Ordering::Relaxed))
            .field("current_time", &*self.current_time.lock())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Creates a runtime whose executor's data manager sizes buffers to
    /// `capacity` elements until grown.
    #[must_use]
    pub fn new(capacity: usize, cache_storage: Box<dyn PageCacheStore>) -> Self {
        Self {
            executor: ParallelExecutorEngine::new(capacity),
            topological_state_version: AtomicUsize::new(0),
            cache_storage,
            current_time: Mutex::new(Time::default()),
        }
    }

    /// Returns the data manager backing this runtime's cached values.
    #[must_use]
    pub const fn data(&self) -> &DataManager {
        self.executor.data()
    }

    /// Returns the time this runtime is currently evaluating at.
    #[must_use]
    pub fn current_time(&self) -> Time {
        *self.current_time.lock()
    }

    /// Records `new_time` as the runtime's current time, without
    /// invalidating anything. Returns whether the time actually changed and
    /// what it changed from, so a caller can decide whether to follow up
    /// with [`Self::time_change`].
    pub fn set_time(&self, new_time: Time) -> (bool, Time) {
        let mut guard = self.current_time.lock();
        let old_time = *guard;
        *guard = new_time;
        (old_time != new_time, old_time)
    }

    /// Bumps the topological-state version, so executors and caches keyed
    /// on it know their prior results no longer apply to the network's
    /// current shape.
    pub fn invalidate_topological_state(&self) {
        self.topological_state_version.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns the current topological-state version.
    #[must_use]
    pub fn topological_state_version(&self) -> usize {
        self.topological_state_version.load(Ordering::Acquire)
    }

    /// Drops the cached data of `request`'s outputs and every output
    /// reachable by walking forward from them through the network's
    /// connections.
    ///
    /// Walks conservatively at node granularity: a downstream node that
    /// consumes any invalidated output has every one of its own outputs
    /// invalidated, rather than narrowing to the specific elements the
    /// connection's mask would let through. Precise element-level
    /// propagation would need an affects-map this runtime doesn't keep.
    pub fn invalidate_executor(&self, network: &Network, request: &MaskedOutputVector) {
        let mut queue: VecDeque<OutputId> = request.iter().map(MaskedOutput::output).collect();
        let mut visited = HashSet::new();

        while let Some(output) = queue.pop_front() {
            if !visited.insert(output) {
                continue;
            }
            self.data().invalidate(output);

            for (target, _connection) in network.connections_from(output) {
                let Some(node) = network.node(target) else { continue };
                for index in 0..node.output_specs().len() {
                    queue.push_back(OutputId::new(target.index(), index as u16));
                }
            }
        }
    }

    /// Drops every one of `node`'s own outputs, without walking to its
    /// consumers. Used when a node is about to be deleted or rewired and
    /// its stale values must not outlive it.
    pub fn delete_data(&self, node: &Node) {
        for index in 0..node.output_specs().len() {
            self.data().invalidate(OutputId::new(node.id().index(), index as u16));
        }
    }

    /// Invalidates the page cache's samples of `request`'s dependent
    /// outputs that fall within `interval`, via [`LeafNodeCache::find_outputs`]
    /// to resolve `request` to the terminal outputs it actually depends on.
    pub fn invalidate_page_cache(
        &self,
        network: &Network,
        leaf_cache: &LeafNodeCache,
        request: &MaskedOutputVector,
        interval: &TimeInterval,
    ) {
        let output_deps = leaf_cache.find_outputs(network, request, true);
        let masked: Vec<MaskedOutput> =
            output_deps.into_iter().map(|(output, mask)| MaskedOutput::new(output, mask)).collect();
        self.cache_storage.invalidate(&masked, interval);
    }

    /// Runs `schedule` against `network` through this runtime's executor.
    /// `request` names the outputs the caller wants a completion
    /// notification for; see [`ExecutorEngine::run_schedule`] for the exact
    /// `callback` contract.
    #[tracing::instrument(skip_all)]
    pub fn compute_values(
        &self,
        network: &Network,
        schedule: &dyn Schedule,
        request: &MaskedOutputVector,
        callback: Option<&mut (dyn FnMut(MaskedOutput, usize) + Send)>,
        options: &EngineOptions,
    ) -> Result<ExecutionStatsSnapshot, EngineError> {
        self.executor.run_schedule(network, schedule, request, callback, options)
    }

    /// Moves the runtime to `new_time`, invalidating exactly the outputs
    /// `time_inputs` reports as varying between the old and new time, and
    /// returns the leaf nodes reachable from them.
    ///
    /// Three steps: filter `time_inputs`'s declared time-dependent outputs
    /// down to the ones that actually differ between the two times (in
    /// parallel, since
    /// the probe can be arbitrarily expensive per output); invalidate those
    /// outputs' cached data while concurrently asking the leaf cache which
    /// leaves they reach; then commit the new time.
    ///
    /// Crossing into or out of [`Time::Default`] invalidates every declared
    /// time-dependent output unconditionally, without probing: default
    /// time isn't a point on the same timeline the probe's continuity
    /// assumptions apply to.
    #[tracing::instrument(skip(self, time_inputs, network, leaf_cache))]
    pub fn time_change(
        &self,
        time_inputs: &dyn TimeDependentInputs,
        network: &Network,
        leaf_cache: &LeafNodeCache,
        new_time: Time,
    ) -> Vec<NodeId> {
        let outputs = time_inputs.time_dependent_outputs();
        let old_time = self.current_time();
        let crosses_default_boundary = old_time.is_default() != new_time.is_default();

        let differing: Vec<OutputId> = if crosses_default_boundary || outputs.is_empty() {
            outputs.to_vec()
        } else {
            let threads = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get).clamp(1, 8);
            let chunk_size = outputs.len().div_ceil(threads).max(1);

            std::thread::scope(|scope| {
                outputs
                    .chunks(chunk_size)
                    .map(|chunk| {
                        scope.spawn(move || {
                            chunk
                                .iter()
                                .copied()
                                .filter(|&output| time_inputs.differs_between(output, old_time, new_time))
                                .collect::<Vec<_>>()
                        })
                    })
                    .collect::<Vec<_>>()
                    .into_iter()
                    .flat_map(|handle| handle.join().expect("time-dependence probe thread never panics"))
                    .collect()
            })
        };

        let request: MaskedOutputVector =
            differing.iter().map(|&output| MaskedOutput::new(output, Mask::all_ones(1))).collect();

        let leaves = std::thread::scope(|scope| {
            let invalidation = scope.spawn(|| {
                for &output in &differing {
                    self.data().invalidate(output);
                }
            });
            let leaves = leaf_cache.find_nodes(network, &request, true);
            invalidation.join().expect("invalidation thread never panics");
            leaves
        });

        *self.current_time.lock() = new_time;
        leaves
    }
}

#[cfg(test)]
mod tests {
    use sceneflow_data::TypedBuffer;
    use sceneflow_engine::EngineOptions;
    use sceneflow_mask::Mask;
    use sceneflow_network::{Compute, InputSpec, OutputSpec};
    use sceneflow_schedule::{StaticScheduleBuilder, TaskId};

    use super::*;

    struct Constant(i64);

    impl Compute for Constant {
        fn compute(&self, ctx: &mut dyn sceneflow_network::ComputeContext) {
            ctx.set_output("out", Box::new(self.0));
        }
    }

    struct RecordingTimeInputs {
        outputs: Vec<OutputId>,
    }

    impl TimeDependentInputs for RecordingTimeInputs {
        fn time_dependent_outputs(&self) -> &[OutputId] {
            &self.outputs
        }

        fn differs_between(&self, _output: OutputId, old: Time, new: Time) -> bool {
            old.frame_value() != new.frame_value()
        }
    }

    fn one_node_network() -> (Network, NodeId, OutputId) {
        let mut network = Network::new();
        let id = network.create_node(std::vec![], std::vec![OutputSpec::new("out")], Some(Box::new(Constant(7))));
        let output = network.node(id).unwrap().output_id_named("out").unwrap();
        (network, id, output)
    }

    #[test]
    fn set_time_reports_whether_the_time_actually_changed() {
        let runtime = Runtime::new(1, Box::new(crate::page_cache::NullPageCacheStore));
        let (changed, old) = runtime.set_time(Time::frame(1.0));
        assert!(changed);
        assert!(old.is_default());
        let (changed_again, _) = runtime.set_time(Time::frame(1.0));
        assert!(!changed_again);
    }

    #[test]
    fn invalidate_topological_state_bumps_the_version_monotonically() {
        let runtime = Runtime::new(1, Box::new(crate::page_cache::NullPageCacheStore));
        assert_eq!(runtime.topological_state_version(), 0);
        runtime.invalidate_topological_state();
        runtime.invalidate_topological_state();
        assert_eq!(runtime.topological_state_version(), 2);
    }

    #[test]
    fn compute_values_runs_the_schedule_through_the_owned_executor() {
        let (network, node, output) = one_node_network();
        let compute_task = TaskId::new(0);
        let schedule = StaticScheduleBuilder::new()
            .schedule_output(node, output, Mask::all_ones(1), Mask::empty(1), Mask::all_ones(1), 0)
            .with_compute_task(node, output, compute_task)
            .build();
        let runtime = Runtime::new(1, Box::new(crate::page_cache::NullPageCacheStore));

        let snapshot = runtime.compute_values(&network, &schedule, &std::vec![], None, &EngineOptions::new()).unwrap();
        assert_eq!(snapshot.compute_tasks_invoked, 1);
        assert_eq!(runtime.data().public_mask(output).count(), 1);
    }

    #[test]
    fn invalidate_executor_drops_the_requested_output_and_its_consumers() {
        let mut network = Network::new();
        let source = network.create_node(std::vec![], std::vec![OutputSpec::new("out")], Some(Box::new(Constant(1))));
        let source_output = network.node(source).unwrap().output_id_named("out").unwrap();
        let sink = network.create_node(
            std::vec![InputSpec::read("in")],
            std::vec![OutputSpec::new("out")],
            Some(Box::new(Constant(2))),
        );
        network.connect(source, "out", sink, "in", Mask::all_ones(1)).unwrap();
        let sink_output = network.node(sink).unwrap().output_id_named("out").unwrap();

        let runtime = Runtime::new(1, Box::new(crate::page_cache::NullPageCacheStore));
        runtime.data().set_private(source_output, Box::new(TypedBuffer::from_vec(std::vec![1i64])), Mask::all_ones(1));
        runtime.data().publish_private(source_output);
        runtime.data().set_private(sink_output, Box::new(TypedBuffer::from_vec(std::vec![2i64])), Mask::all_ones(1));
        runtime.data().publish_private(sink_output);

        runtime.invalidate_executor(&network, &std::vec![MaskedOutput::new(source_output, Mask::all_ones(1))]);

        assert_eq!(runtime.data().public_mask(source_output).count(), 0);
        assert_eq!(runtime.data().public_mask(sink_output).count(), 0);
    }

    #[test]
    fn delete_data_clears_only_the_deleted_nodes_own_outputs() {
        let (network, node, output) = one_node_network();
        let runtime = Runtime::new(1, Box::new(crate::page_cache::NullPageCacheStore));
        runtime.data().set_private(output, Box::new(TypedBuffer::from_vec(std::vec![7i64])), Mask::all_ones(1));
        runtime.data().publish_private(output);

        runtime.delete_data(network.node(node).unwrap());

        assert_eq!(runtime.data().public_mask(output).count(), 0);
    }

    #[test]
    fn time_change_invalidates_only_outputs_that_differ_and_returns_reachable_leaves() {
        let (network, _node, output) = one_node_network();
        let leaf_cache = LeafNodeCache::new();
        let runtime = Runtime::new(1, Box::new(crate::page_cache::NullPageCacheStore));
        runtime.data().set_private(output, Box::new(TypedBuffer::from_vec(std::vec![7i64])), Mask::all_ones(1));
        runtime.data().publish_private(output);

        let time_inputs = RecordingTimeInputs { outputs: std::vec![output] };
        let leaves = runtime.time_change(&time_inputs, &network, &leaf_cache, Time::frame(1.0));

        assert_eq!(runtime.data().public_mask(output).count(), 0);
        assert!(leaves.is_empty());
        assert_eq!(runtime.current_time(), Time::frame(1.0));
    }
}
