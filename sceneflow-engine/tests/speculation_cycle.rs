// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A speculation node whose own pool-chain input reads its own output: any
//! traversal that pulls it closes a cycle immediately. Its sole consumer's
//! sub-request reaches that same node, so the consumer is itself marked
//! speculated and skipped — neither node is ever computed or written back.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use sceneflow_data::DataManager;
use sceneflow_engine::SpeculationExecutor;
use sceneflow_mask::Mask;
use sceneflow_network::{Compute, ComputeContext, InputSpec, Network, OutputSpec};
use sceneflow_schedule::{StaticScheduleBuilder, TaskId};

struct CountingCompute {
    calls: Arc<AtomicUsize>,
}

impl Compute for CountingCompute {
    fn compute(&self, ctx: &mut dyn ComputeContext) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ctx.set_output("out", Box::new(0_i64));
    }
}

#[test]
fn a_self_referential_node_speculates_and_its_consumer_is_skipped_too() {
    let loop_node_calls = Arc::new(AtomicUsize::new(0));
    let consumer_calls = Arc::new(AtomicUsize::new(0));

    let mut network = Network::new();
    let loop_node = network.create_node(
        vec![InputSpec::read_write("in", 0)],
        vec![OutputSpec::new("out")],
        Some(Box::new(CountingCompute { calls: Arc::clone(&loop_node_calls) })),
    );
    network.connect(loop_node, "out", loop_node, "in", Mask::all_ones(1)).unwrap();

    let consumer = network.create_node(
        vec![InputSpec::read("in")],
        vec![OutputSpec::new("out")],
        Some(Box::new(CountingCompute { calls: Arc::clone(&consumer_calls) })),
    );
    network.connect(loop_node, "out", consumer, "in", Mask::all_ones(1)).unwrap();

    let loop_output = network.node(loop_node).unwrap().output_id_named("out").unwrap();
    let consumer_output = network.node(consumer).unwrap().output_id_named("out").unwrap();
    let loop_task = TaskId::new(0);
    let consumer_task = TaskId::new(1);

    let schedule = StaticScheduleBuilder::new()
        .schedule_output(loop_node, loop_output, Mask::all_ones(1), Mask::empty(1), Mask::all_ones(1), 0)
        .schedule_output(consumer, consumer_output, Mask::all_ones(1), Mask::empty(1), Mask::all_ones(1), 1)
        .with_compute_task(loop_node, loop_output, loop_task)
        .with_compute_task(consumer, consumer_output, consumer_task)
        .build();

    let write_back = DataManager::new(1);
    let executor = SpeculationExecutor::new(1, loop_node, &write_back);

    let snapshot = executor
        .speculate(&network, &schedule, consumer_output)
        .expect("a closed cycle is reported as speculated, not as an error");

    assert_eq!(loop_node_calls.load(Ordering::SeqCst), 0, "the cycle-closing node is never computed");
    assert_eq!(consumer_calls.load(Ordering::SeqCst), 0, "a consumer of a speculated value is skipped, not computed");

    assert_eq!(executor.data().public_mask(loop_output).count(), 0);
    assert_eq!(executor.data().public_mask(consumer_output).count(), 0);
    assert_eq!(write_back.public_mask(loop_output).count(), 0, "no write-back occurs for a speculated output");
    assert_eq!(write_back.public_mask(consumer_output).count(), 0);

    assert!(snapshot.speculated_outputs >= 1);
}
