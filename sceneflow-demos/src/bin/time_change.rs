// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Moves a network's evaluation time forward twice: once across a range
//! its single time-varying output actually differs over, and once to a
//! time it happens to agree with, showing that the second move reaches no
//! leaves.

use sceneflow_depcache::LeafNodeCache;
use sceneflow_mask::{Mask, OutputId};
use sceneflow_network::{InputSpec, Network, OutputSpec};
use sceneflow_runtime::{NullPageCacheStore, Runtime, Time, TimeDependentInputs};

struct Oscillator {
    outputs: Vec<OutputId>,
}

impl TimeDependentInputs for Oscillator {
    fn time_dependent_outputs(&self) -> &[OutputId] {
        &self.outputs
    }

    fn differs_between(&self, _output: OutputId, old: Time, new: Time) -> bool {
        match (old.frame_value(), new.frame_value()) {
            (Some(old), Some(new)) => old.floor() as i64 % 2 != new.floor() as i64 % 2,
            _ => true,
        }
    }
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let mut network = Network::new();
    let node = network.create_node(vec![], vec![OutputSpec::new("out")], None);
    let leaf = network.create_node(vec![InputSpec::read("in")], vec![], None);
    network.connect(node, "out", leaf, "in", Mask::all_ones(1)).unwrap();
    let output = network.node(node).unwrap().output_id_named("out").unwrap();

    let runtime = Runtime::new(1, Box::new(NullPageCacheStore));
    let leaf_cache = LeafNodeCache::new();
    let time_inputs = Oscillator { outputs: vec![output] };

    let reached = runtime.time_change(&time_inputs, &network, &leaf_cache, Time::frame(1.0));
    println!("frame 0 -> 1 (parity flips): {} leaves reached", reached.len());

    let reached = runtime.time_change(&time_inputs, &network, &leaf_cache, Time::frame(3.0));
    println!("frame 1 -> 3 (parity unchanged): {} leaves reached", reached.len());
}
