// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use sceneflow_mask::{Mask, OutputId};
use sceneflow_network::{Network, NodeId};

/// A connection identified by `{source node, source output name, target
/// node, target input name}` rather than by a pointer or index into the
/// network's internal storage.
///
/// Dependency-cache entries outlive individual connections (a connection may
/// be deleted and later re-added between two nodes that are still live), so
/// every reference the cache keeps into the network is resolved through this
/// descriptor against the *current* network rather than cached as a raw
/// [`sceneflow_network::Connection`]. A descriptor that no longer resolves
/// (the connection was deleted, or a node was deleted and its slot reused)
/// is skipped, never treated as an error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectionDescriptor {
    source_node: NodeId,
    source_output: String,
    target_node: NodeId,
    target_input: String,
}

impl ConnectionDescriptor {
    /// Builds a descriptor for `target_node`'s `target_input_index`'th
    /// input, fed from `source_output` by `conn`. Returns `None` if either
    /// node, or either named slot, no longer resolves.
    #[must_use]
    pub fn resolve_from(
        network: &Network,
        target_node: NodeId,
        target_input_index: u16,
        source: OutputId,
    ) -> Option<Self> {
        let source_node_id = network
            .nodes()
            .find(|n| n.id().index() == source.node_index())
            .map(sceneflow_network::Node::id)?;
        let source_node = network.node(source_node_id)?;
        let source_output = source_node.output_specs().get(source.output_index() as usize)?.name().to_owned();

        let target = network.node(target_node)?;
        let target_input = target.input_specs().get(target_input_index as usize)?.name().to_owned();

        Some(Self { source_node: source_node_id, source_output, target_node, target_input })
    }

    /// Resolves this descriptor against `network`, returning the current
    /// `(source output, target input index, mask)` if the connection still
    /// exists.
    #[must_use]
    pub fn resolve(&self, network: &Network) -> Option<(OutputId, u16, Mask)> {
        let source_node = network.node(self.source_node)?;
        let source_output = source_node.output_id_named(&self.source_output)?;

        let target_node = network.node(self.target_node)?;
        let target_input_index =
            target_node.input_specs().iter().position(|i| i.name() == self.target_input)? as u16;

        let connection = target_node
            .incoming_named(&self.target_input)
            .iter()
            .find(|c| c.source() == source_output)?;

        Some((source_output, target_input_index, connection.mask().clone()))
    }

    /// Returns the source output this descriptor names, resolved against
    /// `network`, regardless of whether the connection still exists.
    #[must_use]
    pub fn source_output(&self, network: &Network) -> Option<OutputId> {
        network.node(self.source_node)?.output_id_named(&self.source_output)
    }

    /// Returns the target node this descriptor names.
    #[must_use]
    pub const fn target_node(&self) -> NodeId {
        self.target_node
    }
}
