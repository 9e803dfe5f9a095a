// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::panic::AssertUnwindSafe;

use sceneflow_data::DataManager;
use sceneflow_mask::{Mask, OutputId};
use sceneflow_network::{Node, NodeId, RequiredInputs};
use sceneflow_schedule::{InputDependencyId, Schedule, TaskId};

use crate::context::EngineComputeContext;
use crate::error::Diagnostic;
use crate::error_logger::ErrorLogger;
use crate::error_transport::ErrorTransport;
use crate::stats::ExecutionStats;
use crate::value::FallbackRegistry;

/// Invokes `node`'s compute callback across every invocation `task_id` was
/// scheduled for, then routes each produced output.
///
/// Shared between the parallel and pull executors: both reach this only
/// once a compute task's required input dependencies have already
/// resolved, so by construction it runs exactly once per compute task per
/// evaluation.
pub fn evaluate_node(
    schedule: &dyn Schedule,
    data: &DataManager,
    logger: &ErrorLogger,
    transport: &ErrorTransport,
    stats: &ExecutionStats,
    fallback: &FallbackRegistry,
    node_id: NodeId,
    node: &Node,
    task_id: TaskId,
) {
    let outputs: Vec<OutputId> = schedule
        .scheduled_outputs_of(node_id)
        .into_iter()
        .filter(|&output| schedule.compute_task_for_output(output) == Some(task_id))
        .collect();

    if let Some(compute) = node.compute() {
        let invocation_mask = outputs.iter().fold(None::<Mask>, |acc, &output| {
            let mask = schedule.request_mask(output);
            Some(match acc {
                Some(acc) => acc.union(&mask),
                None => mask,
            })
        });

        if let Some(invocation_mask) = invocation_mask {
            for index in invocation_mask.iter_set() {
                let mut invocation_ctx = EngineComputeContext::new(data, logger, fallback, node, index as u32);
                let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| compute.compute(&mut invocation_ctx)));
                if let Err(payload) = outcome {
                    let message = panic_message(&payload);
                    logger.report_diagnostic(transport, Diagnostic::new(node_id, message));
                }
            }
        }
        stats.record_compute_task_invoked();
    }

    for &output in &outputs {
        route_computed_output(schedule, data, node_id, output);
    }
}

/// Asks `node`'s `required_inputs` predicate which of `task_id`'s optional
/// input dependencies must actually be invoked.
///
/// The predicate is evaluated once per inputs task, against a representative
/// invocation-0 context, rather than once per invocation: by the time the
/// optionals stage runs, every prerequisite's producer is already done, but
/// a single inputs task now stands for every invocation of its node, so
/// there is no single "the" invocation to evaluate it against.
pub fn required_optional_dependencies(
    schedule: &dyn Schedule,
    data: &DataManager,
    logger: &ErrorLogger,
    fallback: &FallbackRegistry,
    node: &Node,
    task_id: TaskId,
) -> Vec<InputDependencyId> {
    let optionals = schedule.optional_input_dependencies(task_id);
    if optionals.is_empty() {
        return Vec::new();
    }
    let Some(compute) = node.compute() else { return Vec::new() };
    let probe = EngineComputeContext::new(data, logger, fallback, node, 0);

    match compute.required_inputs(&probe) {
        RequiredInputs::NoReads => Vec::new(),
        RequiredInputs::AllReads => optionals,
        RequiredInputs::OneRead(name) => optionals
            .into_iter()
            .filter(|&dep| {
                let source = schedule.input_dependency_source(dep);
                node.input_specs().iter().any(|spec| spec.name() == name && connects_to(node, &name, source))
            })
            .collect(),
    }
}

/// Routes one compute task's just-produced output to wherever the schedule
/// says it belongs: passed straight through to another output, merged into
/// a keep task's scratch accumulation, or published (directly, or by first
/// absorbing the portion of the old public buffer a sparse invocation left
/// untouched) as the engine's own public result.
///
/// The publish branch resolves and acts on the absorbed mask inside a
/// single `with_entry` call rather than as two separate `DataManager`
/// calls: a speculative evaluator may be writing this same output back into
/// this same `data` concurrently (`speculation::write_back`), and splitting
/// the absorb check from the publish that follows it would leave a window
/// where that write-back lands in between, publishing over a decision made
/// against a mask that's no longer current.
pub fn route_computed_output(schedule: &dyn Schedule, data: &DataManager, node_id: NodeId, output: OutputId) {
    if let Some(target) = schedule.pass_to_output(output) {
        if let Some((values, mask)) = data.take_private(output) {
            data.set_private(target, values, mask);
        }
        return;
    }

    if schedule.keep_task_of(node_id).is_some() {
        data.merge_into_scratch(output, &schedule.keep_mask(output));
        return;
    }

    let affects = schedule.affects_mask(output);
    let request_mask = schedule.request_mask(output);
    data.with_entry(output, |buffer| {
        let absorbed = buffer.absorb_uncovered_public(&affects);
        if absorbed.is_empty() {
            buffer.publish_private();
        } else {
            buffer.merge_into_scratch(&request_mask);
            buffer.publish_scratch();
        }
    });
}

/// Turns a caught panic payload from a node's `compute` callback into a
/// human-readable diagnostic message.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "node callback panicked".to_owned()
    }
}

/// Returns whether `input_name` on `node` is fed by `source`.
pub fn connects_to(node: &Node, input_name: &str, source: OutputId) -> bool {
    node.incoming_named(input_name).iter().any(|connection| connection.source() == source)
}
