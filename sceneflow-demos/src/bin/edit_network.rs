// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deletes a node out of a small network, showing the two invalidation
//! steps a structural edit needs: dropping the deleted node's own cached
//! data, and bumping the topological-state version so the executor knows
//! its prior task-graph assumptions about this network no longer hold.

use sceneflow_data::TypedBuffer;
use sceneflow_mask::Mask;
use sceneflow_network::{InputSpec, Network, OutputSpec};
use sceneflow_runtime::{NullPageCacheStore, Runtime};

fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let mut network = Network::new();
    let source = network.create_node(vec![], vec![OutputSpec::new("out")], None);
    let middle = network.create_node(vec![InputSpec::read("in")], vec![OutputSpec::new("out")], None);
    network.connect(source, "out", middle, "in", Mask::all_ones(1)).unwrap();
    let middle_output = network.node(middle).unwrap().output_id_named("out").unwrap();

    let runtime = Runtime::new(1, Box::new(NullPageCacheStore));
    runtime.data().set_private(middle_output, Box::new(TypedBuffer::from_vec(vec![42_i64])), Mask::all_ones(1));
    runtime.data().publish_private(middle_output);
    println!("before delete: {} elements published", runtime.data().public_mask(middle_output).count());

    runtime.delete_data(network.node(middle).unwrap());
    println!("after delete_data: {} elements published", runtime.data().public_mask(middle_output).count());

    network.delete_node(middle).expect("middle is live");
    runtime.invalidate_topological_state();
    println!("topological state version is now {}", runtime.topological_state_version());
}
