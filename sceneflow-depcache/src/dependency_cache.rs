// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_queue::SegQueue;
use parking_lot::{Mutex, RwLock};
use sceneflow_mask::{Mask, MaskedOutputVector, OutputId};
use sceneflow_network::{Connection, Network, Node, NodeId};

use crate::connection_descriptor::ConnectionDescriptor;

/// User-supplied traversal logic: decides, for each node reached while
/// walking forward from a request, whether to keep walking past it and
/// which outputs/nodes to record as the request's dependencies.
///
/// Returning `false` stops traversal down that branch; the node (and the
/// output that led to it) is recorded as a terminal dependency. Returning
/// `true` continues the walk to the node's own outputs.
pub trait TraversalPredicate: Send + Sync {
    /// Visits `node`, optionally recording entries into `output_deps`/
    /// `node_deps`, and returns whether traversal should continue past it.
    fn visit(&self, node: &Node, output_deps: &mut HashMap<OutputId, Mask>, node_deps: &mut Vec<NodeId>) -> bool;
}

#[derive(Default)]
struct EntryState {
    output_deps: HashMap<OutputId, Mask>,
    node_deps: Vec<NodeId>,
    output_refs: HashMap<OutputId, Mask>,
    node_refs: HashSet<u32>,
    continued: HashSet<u32>,
    node_num_outputs: HashMap<u32, usize>,
    // Every mask in one traversal is assumed to share the element capacity
    // of the request masks that seeded it; this stands in for a full
    // output-to-output affects map, which is out of scope here.
    traversal_capacity: Option<usize>,
}

struct Entry {
    state: Mutex<EntryState>,
    valid: AtomicBool,
    new_connections: SegQueue<ConnectionDescriptor>,
    update_incrementally: bool,
}

/// Caches, per request (`MaskedOutputVector`), the set of dependent outputs
/// and nodes a [`TraversalPredicate`] finds by walking forward through the
/// network from the request.
///
/// `find_outputs`/`find_nodes` are not thread-safe with respect to other
/// *mutating* queries on the same cache. `did_connect`/
/// `will_delete_connection` are safe to call concurrently with each other
/// and with in-flight `find_*` calls, provided no single `(source output,
/// target input)` pair is concurrently connected and disconnected: they
/// never touch an entry's traversal state, only its atomic `valid` flag and
/// lock-free `new_connections` queue.
pub struct DependencyCache<P: TraversalPredicate> {
    predicate: P,
    cache: RwLock<HashMap<MaskedOutputVector, Arc<Entry>>>,
}

impl<P: TraversalPredicate> std::fmt::Debug for DependencyCache<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyCache").field("entries", &self.cache.read().len()).finish_non_exhaustive()
    }
}

impl<P: TraversalPredicate> DependencyCache<P> {
    /// Creates a cache that visits nodes using `predicate`.
    pub fn new(predicate: P) -> Self {
        Self { predicate, cache: RwLock::new(HashMap::new()) }
    }

    /// Returns the dependent-output map for `request`, building or repairing
    /// the cache entry as needed.
    pub fn find_outputs(
        &self,
        network: &Network,
        request: &MaskedOutputVector,
        incremental: bool,
    ) -> HashMap<OutputId, Mask> {
        let entry = self.resolve(network, request, incremental);
        entry.state.lock().output_deps.clone()
    }

    /// Returns the dependent-node sequence for `request`, building or
    /// repairing the cache entry as needed.
    pub fn find_nodes(&self, network: &Network, request: &MaskedOutputVector, incremental: bool) -> Vec<NodeId> {
        let entry = self.resolve(network, request, incremental);
        entry.state.lock().node_deps.clone()
    }

    /// Wipes every cached entry. Not thread-safe with respect to any other
    /// call on this cache.
    pub fn invalidate(&self) {
        self.cache.write().clear();
    }

    /// Notified after a connection is added to the network.
    /// `target_input_index` is the per-node index of the input
    /// `conn` now feeds.
    pub fn did_connect(&self, network: &Network, target_node: NodeId, target_input_index: u16, conn: &Connection) {
        let map = self.cache.read();
        for entry in map.values() {
            if entry.update_incrementally {
                if let Some(descriptor) =
                    ConnectionDescriptor::resolve_from(network, target_node, target_input_index, conn.source())
                {
                    entry.new_connections.push(descriptor);
                }
                continue;
            }

            let should_invalidate = {
                let state = entry.state.lock();
                let source_referenced = state.output_refs.contains_key(&conn.source());
                let gained_outputs = state.node_refs.contains(&target_node.index())
                    && state
                        .node_num_outputs
                        .get(&target_node.index())
                        .is_some_and(|&recorded| {
                            network.node(target_node).is_some_and(|n| n.output_specs().len() > recorded)
                        });
                source_referenced || gained_outputs
            };
            if should_invalidate {
                entry.valid.store(false, Ordering::Release);
            }
        }
    }

    /// Notified before a connection is removed from the network.
    /// `target_node` is the connection's target.
    pub fn will_delete_connection(&self, target_node: NodeId, conn: &Connection) {
        let map = self.cache.read();
        for entry in map.values() {
            let state = entry.state.lock();
            let touched = if entry.update_incrementally {
                state.output_refs.get(&conn.source()).is_some_and(|recorded| recorded.intersects(conn.mask()))
            } else {
                state.output_refs.contains_key(&conn.source()) || state.node_refs.contains(&target_node.index())
            };
            drop(state);
            if touched {
                entry.valid.store(false, Ordering::Release);
            }
        }
    }

    fn resolve(&self, network: &Network, request: &MaskedOutputVector, incremental: bool) -> Arc<Entry> {
        if let Some(entry) = self.cache.read().get(request) {
            if entry.valid.load(Ordering::Acquire) {
                if incremental {
                    self.apply_partial_traversal(network, entry);
                }
                return Arc::clone(entry);
            }
        }

        let mut state = EntryState::default();
        self.traverse(network, request, &mut state);
        let entry = Arc::new(Entry {
            state: Mutex::new(state),
            valid: AtomicBool::new(true),
            new_connections: SegQueue::new(),
            update_incrementally: incremental,
        });
        self.cache.write().insert(request.clone(), Arc::clone(&entry));
        entry
    }

    fn traverse(&self, network: &Network, request: &MaskedOutputVector, state: &mut EntryState) {
        let mut queue: VecDeque<(OutputId, Mask)> =
            request.iter().map(|mo| (mo.output(), mo.mask().clone())).collect();
        if let Some(first) = request.first() {
            state.traversal_capacity = Some(first.mask().capacity());
        }
        self.drain_queue(network, &mut queue, state);
    }

    fn drain_queue(&self, network: &Network, queue: &mut VecDeque<(OutputId, Mask)>, state: &mut EntryState) {
        while let Some((output, mask)) = queue.pop_front() {
            state.output_refs.entry(output).and_modify(|m| m.union_with(&mask)).or_insert_with(|| mask.clone());

            for (target_id, conn) in network.connections_from(output) {
                let propagated = mask.intersect(conn.mask());
                if propagated.is_empty() {
                    continue;
                }
                let Some(node) = network.node(target_id) else { continue };

                state.node_refs.insert(target_id.index());
                state.node_num_outputs.insert(target_id.index(), node.output_specs().len());

                let should_continue = self.predicate.visit(node, &mut state.output_deps, &mut state.node_deps);
                if should_continue {
                    state.continued.insert(target_id.index());
                    for output_index in 0..node.output_specs().len() {
                        let dep_output = OutputId::new(target_id.index(), output_index as u16);
                        queue.push_back((dep_output, propagated.clone()));
                    }
                }
            }
        }
    }

    /// Replays `entry.new_connections` ("partial traversal on hit"):
    /// resolves each recorded descriptor against the live network,
    /// and for connections whose source is already referenced, continues
    /// the traversal downstream from the new edge. Also catches up nodes
    /// whose output count grew since they were last visited.
    fn apply_partial_traversal(&self, network: &Network, entry: &Entry) {
        if entry.new_connections.is_empty() {
            return;
        }

        let mut descriptors = Vec::new();
        while let Some(descriptor) = entry.new_connections.pop() {
            descriptors.push(descriptor);
        }

        let mut state = entry.state.lock();

        for descriptor in descriptors {
            let Some((source_output, _target_input_index, mask)) = descriptor.resolve(network) else { continue };
            let Some(recorded) = state.output_refs.get(&source_output).cloned() else { continue };
            let propagated = recorded.intersect(&mask);
            if propagated.is_empty() {
                continue;
            }

            let target_node = descriptor.target_node();
            let Some(node) = network.node(target_node) else { continue };

            state.node_refs.insert(target_node.index());
            state.node_num_outputs.insert(target_node.index(), node.output_specs().len());

            let state = &mut *state;
            let should_continue = self.predicate.visit(node, &mut state.output_deps, &mut state.node_deps);
            let mut queue = VecDeque::new();
            if should_continue {
                state.continued.insert(target_node.index());
                for output_index in 0..node.output_specs().len() {
                    let dep_output = OutputId::new(target_node.index(), output_index as u16);
                    queue.push_back((dep_output, propagated.clone()));
                }
            }
            self.drain_queue(network, &mut queue, state);
        }

        let Some(capacity) = state.traversal_capacity else { return };
        let grown: Vec<(u32, usize, usize)> = state
            .node_refs
            .iter()
            .copied()
            .filter(|idx| state.continued.contains(idx))
            .filter_map(|idx| {
                let recorded = *state.node_num_outputs.get(&idx)?;
                let node = network.nodes().find(|n| n.id().index() == idx)?;
                let current = node.output_specs().len();
                (current > recorded).then_some((idx, recorded, current))
            })
            .collect();

        for (node_index, recorded, current) in grown {
            let mut queue = VecDeque::new();
            for output_index in recorded..current {
                queue.push_back((OutputId::new(node_index, output_index as u16), Mask::all_ones(capacity)));
            }
            self.drain_queue(network, &mut queue, &mut state);
            state.node_num_outputs.insert(node_index, current);
        }
    }
}
