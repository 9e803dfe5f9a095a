// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Builds a three-node chain (`root -> doubler -> stringify`), computes it
//! once, edits the root's authored value, and recomputes after
//! invalidating only what the edit could have affected.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use sceneflow_engine::EngineOptions;
use sceneflow_mask::{Mask, MaskedOutput};
use sceneflow_network::{Compute, ComputeContext, InputSpec, Network, OutputSpec};
use sceneflow_runtime::{NullPageCacheStore, Runtime};
use sceneflow_schedule::{InputDependencyId, StaticScheduleBuilder, TaskId};

struct Root(Arc<AtomicI64>);

impl Compute for Root {
    fn compute(&self, ctx: &mut dyn ComputeContext) {
        ctx.set_output("out", Box::new(self.0.load(Ordering::Relaxed)));
    }
}

struct Doubler;

impl Compute for Doubler {
    fn compute(&self, ctx: &mut dyn ComputeContext) {
        let input = ctx.input("in").and_then(|v| v.downcast_ref::<i64>()).copied().unwrap_or(0);
        ctx.set_output("out", Box::new(input * 2));
    }
}

struct Stringify;

impl Compute for Stringify {
    fn compute(&self, ctx: &mut dyn ComputeContext) {
        let input = ctx.input("in").and_then(|v| v.downcast_ref::<i64>()).copied().unwrap_or(0);
        ctx.set_output("out", Box::new(format!("value is {input}")));
    }
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let root_value = Arc::new(AtomicI64::new(21));

    let mut network = Network::new();
    let root = network.create_node(vec![], vec![OutputSpec::new("out")], Some(Box::new(Root(Arc::clone(&root_value)))));
    let doubler = network.create_node(vec![InputSpec::read("in")], vec![OutputSpec::new("out")], Some(Box::new(Doubler)));
    let stringify =
        network.create_node(vec![InputSpec::read("in")], vec![OutputSpec::new("out")], Some(Box::new(Stringify)));
    network.connect(root, "out", doubler, "in", Mask::all_ones(1)).unwrap();
    network.connect(doubler, "out", stringify, "in", Mask::all_ones(1)).unwrap();

    let root_output = network.node(root).unwrap().output_id_named("out").unwrap();
    let doubler_output = network.node(doubler).unwrap().output_id_named("out").unwrap();
    let stringify_output = network.node(stringify).unwrap().output_id_named("out").unwrap();

    let root_task = TaskId::new(0);
    let doubler_task = TaskId::new(1);
    let stringify_task = TaskId::new(2);
    let root_doubler_dep = InputDependencyId::new(0);
    let doubler_stringify_dep = InputDependencyId::new(1);

    let schedule = StaticScheduleBuilder::new()
        .schedule_output(root, root_output, Mask::all_ones(1), Mask::empty(1), Mask::all_ones(1), 0)
        .schedule_output(doubler, doubler_output, Mask::all_ones(1), Mask::empty(1), Mask::all_ones(1), 1)
        .schedule_output(stringify, stringify_output, Mask::all_ones(1), Mask::empty(1), Mask::all_ones(1), 2)
        .with_compute_task(root, root_output, root_task)
        .with_compute_task(doubler, doubler_output, doubler_task)
        .with_compute_task(stringify, stringify_output, stringify_task)
        .with_required(doubler_task, root_doubler_dep, root_output)
        .with_dependency_consumers(root_doubler_dep, vec![root_task])
        .with_required(stringify_task, doubler_stringify_dep, doubler_output)
        .with_dependency_consumers(doubler_stringify_dep, vec![doubler_task])
        .build();

    let runtime = Runtime::new(1, Box::new(NullPageCacheStore));

    runtime.compute_values(&network, &schedule, &vec![], None, &EngineOptions::new()).expect("first run has no diagnostics");
    println!("root=21, published mask after first run: {:?}", runtime.data().public_mask(stringify_output));

    root_value.store(99, Ordering::Relaxed);
    runtime.invalidate_executor(&network, &vec![MaskedOutput::new(root_output, Mask::all_ones(1))]);
    runtime.compute_values(&network, &schedule, &vec![], None, &EngineOptions::new()).expect("second run has no diagnostics");
    println!("root=99, published mask after invalidated re-run: {:?}", runtime.data().public_mask(stringify_output));
}
