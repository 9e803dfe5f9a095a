// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::HashMap;

use crossbeam_queue::SegQueue;
use parking_lot::RwLock;
use sceneflow_mask::{Mask, OutputId};
use sceneflow_network::NodeId;

/// Dense index into the leaf-node index space. [`INVALID_INDEX`] marks a
/// node that was indexed once but is currently disconnected.
pub type LeafIndex = u32;

/// Sentinel stored for a node whose leaf index has been freed.
pub const INVALID_INDEX: LeafIndex = u32::MAX;

/// What was published for one leaf index: the leaf node itself and the
/// single source feeding it.
#[derive(Clone, Debug)]
pub struct LeafNodeEntry {
    leaf_node: NodeId,
    source_output: OutputId,
    source_mask: Mask,
}

impl LeafNodeEntry {
    /// Returns the indexed leaf node.
    #[must_use]
    pub const fn leaf_node(&self) -> NodeId {
        self.leaf_node
    }

    /// Returns the output feeding the leaf.
    #[must_use]
    pub const fn source_output(&self) -> OutputId {
        self.source_output
    }

    /// Returns the mask selecting the elements of `source_output` the leaf
    /// depends on.
    #[must_use]
    pub const fn source_mask(&self) -> &Mask {
        &self.source_mask
    }
}

/// A dense, monotonically-growing index space over leaf nodes.
///
/// Downstream consumers (the leaf-node cache, and ultimately the executor
/// engine) traverse the network once per request but then work over bit
/// sets sized to the number of leaves rather than the number of nodes — in a
/// typical scene this is a 10-100x reduction in index-space width.
///
/// `did_connect`/`did_disconnect` may run concurrently with each other and
/// with readers, provided no single `(source output, target input)` pair is
/// concurrently connected and disconnected. A disconnected slot's payload in
/// `nodes` is left in place rather than cleared: a reader that already holds
/// the old index must never observe a half-written entry, so the slot is
/// only ever overwritten by a later `did_connect` that reclaims it from
/// `free_list`.
#[derive(Default)]
pub struct LeafNodeIndexer {
    indices: RwLock<HashMap<u32, LeafIndex>>,
    nodes: RwLock<Vec<LeafNodeEntry>>,
    free_list: SegQueue<LeafIndex>,
}

impl std::fmt::Debug for LeafNodeIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeafNodeIndexer")
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

impl LeafNodeIndexer {
    /// Creates an empty indexer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `{leaf_node, source_output, source_mask}`, allocating a
    /// fresh index or reusing one from the free list. Returns the assigned
    /// index.
    pub fn did_connect(&self, leaf_node: NodeId, source_output: OutputId, source_mask: Mask) -> LeafIndex {
        let entry = LeafNodeEntry { leaf_node, source_output, source_mask };
        let index = if let Some(free) = self.free_list.pop() {
            self.nodes.write()[free as usize] = entry;
            free
        } else {
            let mut nodes = self.nodes.write();
            let index = LeafIndex::try_from(nodes.len()).expect("leaf index space exhausted");
            nodes.push(entry);
            index
        };
        self.indices.write().insert(leaf_node.index(), index);
        index
    }

    /// Marks `leaf_node`'s index invalid and returns it to the free list.
    /// A no-op if the node was never indexed or is already disconnected.
    pub fn did_disconnect(&self, leaf_node: NodeId) {
        let mut indices = self.indices.write();
        if let Some(slot) = indices.get_mut(&leaf_node.index())
            && *slot != INVALID_INDEX
        {
            self.free_list.push(*slot);
            *slot = INVALID_INDEX;
        }
    }

    /// Wipes all state: indices, published entries, and the free list.
    pub fn invalidate(&self) {
        self.indices.write().clear();
        self.nodes.write().clear();
        while self.free_list.pop().is_some() {}
    }

    /// Returns the current leaf index of `node`, if it is indexed and live.
    #[must_use]
    pub fn get_index(&self, node: NodeId) -> Option<LeafIndex> {
        self.indices.read().get(&node.index()).copied().filter(|&i| i != INVALID_INDEX)
    }

    /// Returns the leaf node published at `index`.
    #[must_use]
    pub fn get_node(&self, index: LeafIndex) -> Option<NodeId> {
        self.nodes.read().get(index as usize).map(LeafNodeEntry::leaf_node)
    }

    /// Returns the source output published at `index`.
    #[must_use]
    pub fn get_source_output(&self, index: LeafIndex) -> Option<OutputId> {
        self.nodes.read().get(index as usize).map(LeafNodeEntry::source_output)
    }

    /// Returns the source mask published at `index`.
    #[must_use]
    pub fn get_source_mask(&self, index: LeafIndex) -> Option<Mask> {
        self.nodes.read().get(index as usize).map(|e| e.source_mask.clone())
    }

    /// Returns the high-water mark of leaf indices ever published; readers
    /// may size temporary bit sets to this.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.nodes.read().len()
    }
}

#[cfg(test)]
mod tests {
    use sceneflow_network::{Network, NodeId};

    use super::*;

    fn leaf_node(net: &mut Network) -> NodeId {
        net.create_node(vec![sceneflow_network::InputSpec::read("in")], vec![], None)
    }

    #[test]
    fn connect_assigns_and_reuses_indices() {
        let mut net = Network::new();
        let indexer = LeafNodeIndexer::new();
        let a = leaf_node(&mut net);
        let b = leaf_node(&mut net);

        let ia = indexer.did_connect(a, OutputId::new(10, 0), Mask::empty(4));
        let ib = indexer.did_connect(b, OutputId::new(11, 0), Mask::empty(4));
        assert_ne!(ia, ib);
        assert_eq!(indexer.get_index(a), Some(ia));
        assert_eq!(indexer.get_index(b), Some(ib));

        indexer.did_disconnect(a);
        assert_eq!(indexer.get_index(a), None);

        let c = leaf_node(&mut net);
        let ic = indexer.did_connect(c, OutputId::new(12, 0), Mask::empty(4));
        assert_eq!(ic, ia, "freed index should be reused");
        assert_eq!(indexer.capacity(), 2);
    }

    #[test]
    fn invalidate_wipes_all_state() {
        let mut net = Network::new();
        let indexer = LeafNodeIndexer::new();
        let a = leaf_node(&mut net);
        indexer.did_connect(a, OutputId::new(10, 0), Mask::empty(4));
        indexer.invalidate();
        assert_eq!(indexer.get_index(a), None);
        assert_eq!(indexer.capacity(), 0);
    }

    #[test]
    fn disconnect_is_a_noop_when_never_connected() {
        let mut net = Network::new();
        let indexer = LeafNodeIndexer::new();
        let a = leaf_node(&mut net);
        indexer.did_disconnect(a);
        assert_eq!(indexer.capacity(), 0);
    }
}
