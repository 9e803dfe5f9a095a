// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A wide fan-out (one root feeding 1024 independent leaves) run under an
//! interruption hook that trips once 100 leaves have actually computed,
//! checking that publication tracks completion exactly: every leaf whose
//! callback ran ends up with a full public buffer, nothing partially
//! written, and the run stops well short of all 1024.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use sceneflow_engine::{EngineError, EngineOptions, ExecutorEngine, ParallelExecutorEngine};
use sceneflow_mask::{Mask, OutputId};
use sceneflow_network::{Compute, ComputeContext, InputSpec, Network, OutputSpec};
use sceneflow_schedule::{InputDependencyId, StaticScheduleBuilder, TaskId};

const LEAF_COUNT: usize = 1024;
const INTERRUPT_AFTER: usize = 100;

struct RootCompute;

impl Compute for RootCompute {
    fn compute(&self, ctx: &mut dyn ComputeContext) {
        ctx.set_output("out", Box::new(1_i64));
    }
}

struct LeafCompute {
    computed: Arc<AtomicUsize>,
}

impl Compute for LeafCompute {
    fn compute(&self, ctx: &mut dyn ComputeContext) {
        let input = ctx.input("in").and_then(|v| v.downcast_ref::<i64>()).copied().unwrap_or(0);
        ctx.set_output("out", Box::new(input + 1));
        self.computed.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn interruption_stops_the_fan_out_without_leaving_a_partial_publish() {
    let computed = Arc::new(AtomicUsize::new(0));

    let mut network = Network::new();
    let root = network.create_node(vec![], vec![OutputSpec::new("out")], Some(Box::new(RootCompute)));
    let root_output = root_output_of(&network, root);
    let root_task = TaskId::new(0);

    let mut builder = StaticScheduleBuilder::new()
        .schedule_output(root, root_output, Mask::all_ones(1), Mask::empty(1), Mask::all_ones(1), 0)
        .with_compute_task(root, root_output, root_task);

    let mut leaf_outputs = Vec::with_capacity(LEAF_COUNT);
    for i in 0..LEAF_COUNT {
        let leaf = network.create_node(
            vec![InputSpec::read("in")],
            vec![OutputSpec::new("out")],
            Some(Box::new(LeafCompute { computed: Arc::clone(&computed) })),
        );
        network.connect(root, "out", leaf, "in", Mask::all_ones(1)).unwrap();
        let leaf_output = root_output_of(&network, leaf);
        let leaf_task = TaskId::new((i + 1) as u32);
        let dep = InputDependencyId::new(i as u32);

        builder = builder
            .schedule_output(leaf, leaf_output, Mask::all_ones(1), Mask::empty(1), Mask::all_ones(1), i + 1)
            .with_compute_task(leaf, leaf_output, leaf_task)
            .with_required(leaf_task, dep, root_output)
            .with_dependency_consumers(dep, vec![root_task]);

        leaf_outputs.push(leaf_output);
    }
    let schedule = builder.build();

    let hook_counter = Arc::clone(&computed);
    let options = EngineOptions::new()
        .with_concurrency_limit(4)
        .with_interruption_hook(move || hook_counter.load(Ordering::SeqCst) >= INTERRUPT_AFTER);

    let engine = ParallelExecutorEngine::new(1);
    let result = engine.run_schedule(&network, &schedule, &Vec::new(), None, &options);
    assert!(matches!(result, Err(EngineError::Interrupted)));

    let published = leaf_outputs.iter().filter(|&&output| engine.data().public_mask(output).count() == 1).count();
    let completed = computed.load(Ordering::SeqCst);

    assert_eq!(published, completed, "every completed callback publishes exactly once, and only completed ones do");
    assert!(completed >= INTERRUPT_AFTER, "the hook only trips once the threshold is reached");
    assert!(completed < LEAF_COUNT, "interruption must cut the fan-out short of running every leaf");

    for &output in &leaf_outputs {
        let mask = engine.data().public_mask(output);
        assert!(mask.count() == 0 || mask.count() == 1, "a one-element output is never partially published");
    }
}

fn root_output_of(network: &Network, node: sceneflow_network::NodeId) -> OutputId {
    network.node(node).unwrap().output_id_named("out").unwrap()
}
