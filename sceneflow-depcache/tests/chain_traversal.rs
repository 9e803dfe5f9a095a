// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end scenarios over a chained network: a source/mover/sink tuple
//! repeated four times with the movers themselves chained together, so a
//! single source's reach fans out through the whole mover chain to every
//! downstream sink.

use sceneflow_depcache::LeafNodeCache;
use sceneflow_mask::{Mask, MaskedOutput, MaskedOutputVector, OutputId};
use sceneflow_network::{Compute, ComputeContext, EditObserver, InputSpec, Network, NodeId, OutputSpec};

struct NoopCompute;

impl Compute for NoopCompute {
    fn compute(&self, _ctx: &mut dyn ComputeContext) {}
}

/// Four `source_i -> mover_i -> sink_i` tuples with `mover0 -> mover1 ->
/// mover2 -> mover3` chained on top, connected through `cache` so its
/// dependency state tracks every edge as it's made.
struct Chain {
    network: Network,
    cache: LeafNodeCache,
    sources: Vec<NodeId>,
    movers: Vec<NodeId>,
    sinks: Vec<NodeId>,
}

impl Chain {
    fn build() -> Self {
        let mut network = Network::new();
        let mut cache = LeafNodeCache::new();

        let sources: Vec<NodeId> =
            (0..4).map(|_| network.create_node(vec![], vec![OutputSpec::new("out")], Some(Box::new(NoopCompute)))).collect();
        let movers: Vec<NodeId> = (0..4)
            .map(|i| {
                let mut inputs = vec![InputSpec::read("from_source")];
                if i > 0 {
                    inputs.push(InputSpec::read("from_prev"));
                }
                network.create_node(inputs, vec![OutputSpec::new("out")], Some(Box::new(NoopCompute)))
            })
            .collect();
        let sinks: Vec<NodeId> =
            (0..4).map(|_| network.create_node(vec![InputSpec::read("in")], vec![], None)).collect();

        for i in 0..4 {
            network.connect(sources[i], "out", movers[i], "from_source", Mask::all_ones(1)).unwrap();
            Self::track(&mut cache, &network, movers[i], "from_source");

            network.connect(movers[i], "out", sinks[i], "in", Mask::all_ones(1)).unwrap();
            Self::track(&mut cache, &network, sinks[i], "in");

            if i > 0 {
                network.connect(movers[i - 1], "out", movers[i], "from_prev", Mask::all_ones(1)).unwrap();
                Self::track(&mut cache, &network, movers[i], "from_prev");
            }
        }

        Self { network, cache, sources, movers, sinks }
    }

    fn track(cache: &mut LeafNodeCache, network: &Network, target: NodeId, input_name: &str) {
        let connection = network.node(target).unwrap().incoming_named(input_name).last().unwrap().clone();
        cache.did_connect(network, &connection);
    }

    fn request(&self, output: OutputId) -> MaskedOutputVector {
        std::vec![MaskedOutput::new(output, Mask::all_ones(1))]
    }

    fn source_output(&self, i: usize) -> OutputId {
        self.network.node(self.sources[i]).unwrap().output_id_named("out").unwrap()
    }

    fn mover_output(&self, i: usize) -> OutputId {
        self.network.node(self.movers[i]).unwrap().output_id_named("out").unwrap()
    }
}

#[test]
fn chain_traversal_reaches_every_downstream_sink() {
    let chain = Chain::build();

    let request = chain.request(chain.source_output(0));
    let mut nodes = chain.cache.find_nodes(&chain.network, &request, true);
    nodes.sort_by_key(|id| chain.sinks.iter().position(|s| s == id).unwrap());
    assert_eq!(nodes, chain.sinks);

    let output_deps = chain.cache.find_outputs(&chain.network, &request, true);
    let mut expected: Vec<OutputId> = (0..4).map(|i| chain.mover_output(i)).collect();
    expected.sort();
    let mut actual: Vec<OutputId> = output_deps.keys().copied().collect();
    actual.sort();
    assert_eq!(actual, expected);
}

#[test]
fn incremental_delete_drops_only_the_disconnected_sink() {
    let mut chain = Chain::build();
    let request = chain.request(chain.source_output(0));
    chain.cache.find_nodes(&chain.network, &request, true);

    let connection =
        chain.network.disconnect_index(chain.sinks[0], 0, 0).expect("mover0 -> sink0 is live");
    chain.cache.will_delete_connection(&chain.network, &connection);

    let mut nodes = chain.cache.find_nodes(&chain.network, &request, true);
    nodes.sort_by_key(|id| chain.sinks.iter().position(|s| s == id).unwrap());
    assert_eq!(nodes, &chain.sinks[1..]);

    for i in 1..4 {
        let other_request = chain.request(chain.source_output(i));
        let other_nodes = chain.cache.find_nodes(&chain.network, &other_request, true);
        assert_eq!(other_nodes, vec![chain.sinks[i]]);
    }
}

#[test]
fn incremental_reconnect_restores_the_original_reach() {
    let mut chain = Chain::build();
    let request = chain.request(chain.source_output(0));
    chain.cache.find_nodes(&chain.network, &request, true);

    let connection = chain.network.disconnect_index(chain.sinks[0], 0, 0).unwrap();
    chain.cache.will_delete_connection(&chain.network, &connection);
    chain.cache.find_nodes(&chain.network, &request, true);

    let restored =
        chain.network.connect(chain.movers[0], "out", chain.sinks[0], "in", Mask::all_ones(1)).unwrap();
    chain.cache.did_connect(&chain.network, &restored);

    let mut nodes = chain.cache.find_nodes(&chain.network, &request, true);
    nodes.sort_by_key(|id| chain.sinks.iter().position(|s| s == id).unwrap());
    assert_eq!(nodes, chain.sinks);
}

/// Scaled down from the operational batch size this invariant is meant to
/// hold at, but large enough to exercise version monotonicity and the
/// Bernoulli disconnect/reconnect round trip without a slow test.
#[test]
fn leaf_cache_version_increases_monotonically_under_batched_edits() {
    const TRIPLES: usize = 200;

    let mut network = Network::new();
    let mut cache = LeafNodeCache::new();
    let mut roots = Vec::with_capacity(TRIPLES);
    let mut leaves = Vec::with_capacity(TRIPLES);

    let mut last_version = cache.version();
    for _ in 0..TRIPLES {
        let root = network.create_node(vec![], vec![OutputSpec::new("out")], Some(Box::new(NoopCompute)));
        let middle = network.create_node(
            vec![InputSpec::read("in")],
            vec![OutputSpec::new("out")],
            Some(Box::new(NoopCompute)),
        );
        let leaf = network.create_node(vec![InputSpec::read("in")], vec![], None);

        let root_conn = network.connect(root, "out", middle, "in", Mask::all_ones(1)).unwrap();
        cache.did_connect(&network, &root_conn);
        let version_after_root = cache.version();
        assert!(version_after_root > last_version);
        last_version = version_after_root;

        let leaf_conn = network.connect(middle, "out", leaf, "in", Mask::all_ones(1)).unwrap();
        cache.did_connect(&network, &leaf_conn);
        let version_after_leaf = cache.version();
        assert!(version_after_leaf > last_version);
        last_version = version_after_leaf;

        roots.push(root);
        leaves.push(leaf);
    }

    let requests: MaskedOutputVector = roots
        .iter()
        .map(|&root| {
            let output = network.node(root).unwrap().output_id_named("out").unwrap();
            MaskedOutput::new(output, Mask::all_ones(1))
        })
        .collect();
    let reached = cache.find_nodes(&network, &requests, true);
    assert_eq!(reached.len(), TRIPLES);

    let mut disconnected = 0;
    for (i, &leaf) in leaves.iter().enumerate() {
        if i % 2 == 0 {
            let connection = network.disconnect_index(leaf, 0, 0).unwrap();
            cache.will_delete_connection(&network, &connection);
            disconnected += 1;
        }
    }

    let reached_after_disconnect = cache.find_nodes(&network, &requests, true);
    assert_eq!(reached_after_disconnect.len(), TRIPLES - disconnected);

    for (i, &leaf) in leaves.iter().enumerate() {
        if i % 2 == 0 {
            let root_output = network.node(roots[i]).unwrap().output_id_named("out").unwrap();
            let middle_id = network.connections_from(root_output).next().unwrap().0;
            let connection = network.connect(middle_id, "out", leaf, "in", Mask::all_ones(1)).unwrap();
            cache.did_connect(&network, &connection);
        }
    }

    let reached_after_reconnect = cache.find_nodes(&network, &requests, true);
    assert_eq!(reached_after_reconnect.len(), TRIPLES);
}
