// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use sceneflow_mask::{Mask, MaskedOutput, MaskedOutputVector, OutputId};
use sceneflow_network::{Connection, EditObserver, Network, Node, NodeId};

use crate::dependency_cache::{DependencyCache, TraversalPredicate};
use crate::leaf_indexer::LeafNodeIndexer;

/// Traversal predicate stopping at leaf nodes: every leaf reached is
/// recorded into `node_deps`, and traversal never continues past it (leaf
/// nodes have no outputs to continue to anyway).
struct LeafStopPredicate;

impl TraversalPredicate for LeafStopPredicate {
    fn visit(&self, node: &Node, _output_deps: &mut HashMap<OutputId, Mask>, node_deps: &mut Vec<NodeId>) -> bool {
        if node.is_leaf() {
            node_deps.push(node.id());
            false
        } else {
            true
        }
    }
}

struct VectorizedEntry {
    /// One leaf-index bit set per entry of the owning request, in request
    /// order.
    per_output: Vec<Mask>,
    /// Combined leaf sets already computed for a given `outputs_mask`
    /// (itself a bit set over request-vector positions, not over an
    /// output's elements).
    combined: Mutex<HashMap<Mask, Mask>>,
}

#[derive(Clone)]
struct SparseEntry {
    leaves: Vec<NodeId>,
    output_deps: HashMap<OutputId, Mask>,
}

/// A thin layer atop [`DependencyCache`] adding leaf-indexed caches: the
/// *vectorized* entry (per-output leaf bit sets for a request) and the
/// *sparse* entry (the terminal leaf nodes and output dependencies for a
/// request or a masked-out sub-request).
///
/// `version` is a monotonic counter; two observers comparing equal versions
/// may assume no leaf-dependency-affecting edit occurred between their
/// observations.
pub struct LeafNodeCache {
    indexer: LeafNodeIndexer,
    depcache: DependencyCache<LeafStopPredicate>,
    vectorized_cache: RwLock<HashMap<MaskedOutputVector, VectorizedEntry>>,
    sparse_cache: RwLock<HashMap<MaskedOutputVector, SparseEntry>>,
    version: AtomicUsize,
    caches_are_invalid: AtomicBool,
}

impl std::fmt::Debug for LeafNodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeafNodeCache").field("version", &self.version()).finish_non_exhaustive()
    }
}

impl Default for LeafNodeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LeafNodeCache {
    /// Creates an empty leaf-node cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            indexer: LeafNodeIndexer::new(),
            depcache: DependencyCache::new(LeafStopPredicate),
            vectorized_cache: RwLock::new(HashMap::new()),
            sparse_cache: RwLock::new(HashMap::new()),
            version: AtomicUsize::new(0),
            caches_are_invalid: AtomicBool::new(false),
        }
    }

    /// Returns the underlying leaf-node indexer.
    #[must_use]
    pub const fn indexer(&self) -> &LeafNodeIndexer {
        &self.indexer
    }

    /// Returns the current version counter.
    #[must_use]
    pub fn version(&self) -> usize {
        self.version.load(Ordering::Acquire)
    }

    /// Returns the terminal output-dependency map for `request`, checking
    /// the sparse cache before delegating to the dependency cache.
    pub fn find_outputs(
        &self,
        network: &Network,
        request: &MaskedOutputVector,
        incremental: bool,
    ) -> HashMap<OutputId, Mask> {
        self.clear_if_invalid();
        if let Some(entry) = self.sparse_cache.read().get(request) {
            return entry.output_deps.clone();
        }
        let output_deps = self.depcache.find_outputs(network, request, incremental);
        let leaves = self.depcache.find_nodes(network, request, incremental);
        self.sparse_cache
            .write()
            .insert(request.clone(), SparseEntry { leaves, output_deps: output_deps.clone() });
        output_deps
    }

    /// Returns the terminal leaf-node sequence for `request`, checking the
    /// sparse cache before delegating to the dependency cache.
    pub fn find_nodes(&self, network: &Network, request: &MaskedOutputVector, incremental: bool) -> Vec<NodeId> {
        self.clear_if_invalid();
        if let Some(entry) = self.sparse_cache.read().get(request) {
            return entry.leaves.clone();
        }
        let leaves = self.depcache.find_nodes(network, request, incremental);
        let output_deps = self.depcache.find_outputs(network, request, incremental);
        self.sparse_cache
            .write()
            .insert(request.clone(), SparseEntry { leaves: leaves.clone(), output_deps });
        leaves
    }

    /// Returns the combined bit set (over the leaf-index space) of every
    /// leaf reached by the entries of `request` selected by `outputs_mask`
    /// (a bit set over request-vector positions).
    pub fn leaf_set(&self, network: &Network, request: &MaskedOutputVector, outputs_mask: &Mask) -> Mask {
        self.clear_if_invalid();
        self.build_vectorized_entry(network, request);

        let vectorized = self.vectorized_cache.read();
        let entry = vectorized.get(request).expect("just built above");

        if let Some(cached) = entry.combined.lock().get(outputs_mask) {
            return cached.clone();
        }

        let capacity = entry.per_output.first().map_or(1, Mask::capacity);
        let selected: Vec<usize> = outputs_mask.iter_set().filter(|&i| i < entry.per_output.len()).collect();
        let combined = self.union_selected(capacity, &entry.per_output, &selected);

        entry.combined.lock().insert(outputs_mask.clone(), combined.clone());
        combined
    }

    /// Returns `(leaves, output_deps)` for the sub-request of `request`
    /// selected by `outputs_mask`, checking the sparse cache keyed on that
    /// sub-request before delegating to the dependency cache.
    pub fn find_nodes_for_outputs_mask(
        &self,
        network: &Network,
        request: &MaskedOutputVector,
        outputs_mask: &Mask,
        incremental: bool,
    ) -> (Vec<NodeId>, HashMap<OutputId, Mask>) {
        let sub_request: MaskedOutputVector = outputs_mask
            .iter_set()
            .filter_map(|i| request.get(i))
            .cloned()
            .collect::<Vec<MaskedOutput>>();

        let leaves = self.find_nodes(network, &sub_request, incremental);
        let output_deps = self.find_outputs(network, &sub_request, incremental);
        (leaves, output_deps)
    }

    /// Wipes the indexer, the dependency cache, and the vectorized/sparse
    /// caches, and bumps `version`.
    pub fn clear(&self) {
        self.indexer.invalidate();
        self.depcache.invalidate();
        self.vectorized_cache.write().clear();
        self.sparse_cache.write().clear();
        self.caches_are_invalid.store(false, Ordering::Release);
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    fn build_vectorized_entry(&self, network: &Network, request: &MaskedOutputVector) {
        if self.vectorized_cache.read().contains_key(request) {
            return;
        }

        let mut per_output = Vec::with_capacity(request.len());
        for masked_output in request {
            let single = std::vec![masked_output.clone()];
            let leaves = self.depcache.find_nodes(network, &single, false);
            let mut bits = Mask::empty(self.indexer.capacity().max(1));
            for leaf in leaves {
                if let Some(index) = self.indexer.get_index(leaf) {
                    let index = index as usize;
                    if index < bits.capacity() {
                        bits.set(index);
                    }
                }
            }
            per_output.push(bits);
        }

        self.vectorized_cache
            .write()
            .entry(request.clone())
            .or_insert_with(|| VectorizedEntry { per_output, combined: Mutex::new(HashMap::new()) });
    }

    /// Unions the selected per-output leaf bit sets using a work-stealing
    /// split across threads with thread-local accumulators, then combines
    /// the per-thread results linearly.
    fn union_selected(&self, capacity: usize, per_output: &[Mask], selected: &[usize]) -> Mask {
        let capacity = capacity.max(1);
        if selected.len() <= 1 {
            return selected.first().map_or_else(|| Mask::empty(capacity), |&i| per_output[i].clone());
        }

        let thread_count = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get).min(8).max(1);
        let chunk_size = selected.len().div_ceil(thread_count).max(1);

        let partials: Vec<Mask> = std::thread::scope(|scope| {
            selected
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        let mut local = Mask::empty(capacity);
                        for &i in chunk {
                            local.union_with(&per_output[i]);
                        }
                        local
                    })
                })
                .collect::<Vec<_>>()
                .into_iter()
                .map(|handle| handle.join().expect("accumulator thread never panics"))
                .collect()
        });

        let mut combined = Mask::empty(capacity);
        for partial in partials {
            combined.union_with(&partial);
        }
        combined
    }

    fn clear_if_invalid(&self) {
        if self.caches_are_invalid.swap(false, Ordering::AcqRel) {
            self.vectorized_cache.write().clear();
            self.sparse_cache.write().clear();
        }
    }

    fn mark_caches_invalid(&self) {
        let non_empty =
            !self.vectorized_cache.read().is_empty() || !self.sparse_cache.read().is_empty();
        if non_empty {
            self.caches_are_invalid.store(true, Ordering::Release);
        }
    }
}

impl EditObserver for LeafNodeCache {
    fn did_connect(&mut self, network: &Network, connection: &Connection) {
        self.version.fetch_add(1, Ordering::AcqRel);
        self.mark_caches_invalid();

        let target_node = connection.target().node();
        if let Some(node) = network.node(target_node)
            && node.is_leaf()
        {
            self.indexer.did_connect(target_node, connection.source(), connection.mask().clone());
        }

        self.depcache.did_connect(network, target_node, connection.target().input_index(), connection);
    }

    fn will_delete_connection(&mut self, network: &Network, connection: &Connection) {
        self.version.fetch_add(1, Ordering::AcqRel);
        self.mark_caches_invalid();

        let target_node = connection.target().node();
        if let Some(node) = network.node(target_node)
            && node.is_leaf()
        {
            self.indexer.did_disconnect(target_node);
        }

        self.depcache.will_delete_connection(target_node, connection);
    }

    fn will_clear(&mut self, _network: &Network) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use sceneflow_network::{Compute, ComputeContext, InputSpec, OutputSpec};

    use super::*;

    struct NoopCompute;
    impl Compute for NoopCompute {
        fn compute(&self, _ctx: &mut dyn ComputeContext) {}
    }

    fn source_node(net: &mut Network) -> NodeId {
        net.create_node(vec![], vec![OutputSpec::new("out")], Some(Box::new(NoopCompute)))
    }

    fn leaf_node(net: &mut Network) -> NodeId {
        net.create_node(vec![InputSpec::read("in")], vec![], None)
    }

    fn request_for(output: OutputId, capacity: usize) -> MaskedOutputVector {
        std::vec![MaskedOutput::new(output, Mask::all_ones(capacity))]
    }

    #[test]
    fn observer_wiring_indexes_leaf_on_connect() {
        let mut net = Network::new();
        let cache = LeafNodeCache::new();
        net.add_observer(Box::new(cache));

        let src = source_node(&mut net);
        let leaf = leaf_node(&mut net);
        net.connect(src, "out", leaf, "in", Mask::empty(4)).unwrap();

        assert!(net.node(leaf).unwrap().is_leaf());
    }

    #[test]
    fn leaf_indexer_and_depcache_agree_on_leaf_reachability() {
        let mut net = Network::new();
        let src = source_node(&mut net);
        let leaf = leaf_node(&mut net);

        let mut cache = LeafNodeCache::new();
        net.connect(src, "out", leaf, "in", Mask::empty(4)).unwrap();
        let conn = net.node(leaf).unwrap().incoming_named("in")[0].clone();
        cache.did_connect(&net, &conn);

        let src_output = net.node(src).unwrap().output_id_named("out").unwrap();
        let request = request_for(src_output, 4);
        let nodes = cache.find_nodes(&net, &request, false);
        assert_eq!(nodes, vec![leaf]);

        let leaf_set = cache.leaf_set(&net, &request, &Mask::all_ones(1));
        assert_eq!(leaf_set.count(), 1);
    }
}
