// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use sceneflow_data::DataManager;
use sceneflow_mask::{Mask, OutputId};
use sceneflow_network::{ComputeContext, Node};

use crate::error_logger::ErrorLogger;
use crate::value::{clone_element, new_output_buffer, witness_type_id, write_element, FallbackRegistry};

/// The `ComputeContext` a node's `compute` callback runs against: reads come
/// from its inputs' connected source outputs' public buffers, writes go
/// into the node's own output's private buffer, both at this invocation's
/// element index, during a compute task's evaluate stage.
///
/// Input values are resolved once, at construction, into an owned map of
/// `Arc` clones: `ComputeContext::input` returns `&dyn Any` tied to `&self`,
/// which a value locked behind a `DataManager` entry's mutex cannot satisfy
/// directly (the guard does not outlive the call). Cloning the `Arc` is the
/// same cost the erased-value design already pays for every read. Writes go
/// straight through to the `DataManager` entry, since `set_output` returns
/// nothing and so never needs to hold a reference past the call.
pub struct EngineComputeContext<'a> {
    node: &'a Node,
    invocation: u32,
    data: &'a DataManager,
    logger: &'a ErrorLogger,
    inputs: HashMap<String, Arc<dyn Any + Send + Sync>>,
    output_for_name: HashMap<String, OutputId>,
}

impl<'a> EngineComputeContext<'a> {
    /// Creates a context for one invocation of `node`'s compute callback,
    /// resolving every read input's current value up front.
    #[must_use]
    pub fn new(
        data: &'a DataManager,
        logger: &'a ErrorLogger,
        fallback: &FallbackRegistry,
        node: &'a Node,
        invocation: u32,
    ) -> Self {
        let index = invocation as usize;

        let inputs = node
            .input_specs()
            .iter()
            .filter_map(|spec| {
                let connection = node.incoming_named(spec.name()).iter().find(|c| c.mask().test(index))?;
                let value = Self::resolve_input(data, fallback, connection.source(), index).or_else(|| {
                    logger.warn(
                        node.id(),
                        format!("input {:?} connected but missing value at index {index}; no fallback available", spec.name()),
                    );
                    None
                });
                Some((spec.name().to_owned(), value?))
            })
            .collect();

        let output_for_name = node
            .output_specs()
            .iter()
            .filter_map(|spec| node.output_id_named(spec.name()).map(|id| (spec.name().to_owned(), id)))
            .collect();

        Self { node, invocation, data, logger, inputs, output_for_name }
    }

    /// Resolves one connection's value at `index`, falling back to a
    /// registered default when the producer left that index unwritten (the
    /// connection's mask selects it, but the source's public buffer does
    /// not). The fallback is keyed off any other value already written
    /// anywhere in the source buffer, since the buffer's element type is
    /// never known ahead of time.
    fn resolve_input(
        data: &DataManager,
        fallback: &FallbackRegistry,
        source: OutputId,
        index: usize,
    ) -> Option<Arc<dyn Any + Send + Sync>> {
        data.with_entry(source, |buffer_data| {
            let values = buffer_data.public_values()?;
            clone_element(values, index)
                .or_else(|| fallback.fallback_for(witness_type_id(values)?).map(Arc::from))
        })
    }
}

impl ComputeContext for EngineComputeContext<'_> {
    fn input(&self, input_name: &str) -> Option<&dyn Any> {
        self.inputs.get(input_name).map(|value| value.as_ref() as &dyn Any)
    }

    fn invocation_index(&self) -> u32 {
        self.invocation
    }

    fn set_output(&mut self, output_name: &str, value: Box<dyn Any + Send + Sync>) {
        let Some(&output) = self.output_for_name.get(output_name) else {
            self.logger.warn(self.node.id(), format!("set_output called for unknown output {output_name:?}"));
            return;
        };
        let index = self.invocation as usize;

        self.data.with_entry(output, |buffer_data| {
            let capacity = buffer_data.public_mask().capacity();
            let (mut values, mut mask) =
                buffer_data.take_private().unwrap_or_else(|| (new_output_buffer(), Mask::empty(capacity)));
            write_element(values.as_mut(), index, value);
            mask.set(index);
            buffer_data.set_private(values, mask);
        });
    }

    fn warn(&mut self, message: &str) {
        self.logger.warn(self.node.id(), message.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sceneflow_mask::Mask;
    use sceneflow_network::{InputSpec, Network, OutputSpec};

    #[test]
    fn set_output_then_read_back_through_a_connection() {
        let mut network = Network::new();
        let producer = network.create_node(vec![], vec![OutputSpec::new("out")], None);
        let consumer = network.create_node(vec![InputSpec::read("in")], vec![], None);
        network.connect(producer, "out", consumer, "in", Mask::all_ones(1)).unwrap();

        let data = DataManager::new(1);
        let logger = ErrorLogger::new();
        let fallback = FallbackRegistry::new();
        let producer_output = network.node(producer).unwrap().output_id_named("out").unwrap();

        {
            let producer_node = network.node(producer).unwrap();
            let mut ctx = EngineComputeContext::new(&data, &logger, &fallback, producer_node, 0);
            ctx.set_output("out", Box::new(7_i32));
        }
        data.publish_private(producer_output);

        let consumer_node = network.node(consumer).unwrap();
        let ctx = EngineComputeContext::new(&data, &logger, &fallback, consumer_node, 0);
        assert_eq!(ctx.input("in").unwrap().downcast_ref::<i32>(), Some(&7));
    }

    #[test]
    fn set_output_on_unknown_name_warns_instead_of_panicking() {
        let mut network = Network::new();
        let node_id = network.create_node(vec![], vec![OutputSpec::new("out")], None);
        let data = DataManager::new(1);
        let logger = ErrorLogger::new();
        let fallback = FallbackRegistry::new();
        let node = network.node(node_id).unwrap();

        let mut ctx = EngineComputeContext::new(&data, &logger, &fallback, node, 0);
        ctx.set_output("nonexistent", Box::new(1_i32));

        assert_eq!(logger.report_warnings()[&node_id].len(), 1);
    }

    #[test]
    fn missing_value_falls_back_to_a_witnessed_type() {
        let mut network = Network::new();
        let producer = network.create_node(vec![], vec![OutputSpec::new("out")], None);
        let consumer = network.create_node(vec![InputSpec::read("in")], vec![], None);
        network.connect(producer, "out", consumer, "in", Mask::all_ones(2)).unwrap();

        let data = DataManager::new(2);
        let logger = ErrorLogger::new();
        let mut fallback = FallbackRegistry::new();
        fallback.register(|| 0_i32);
        let producer_output = network.node(producer).unwrap().output_id_named("out").unwrap();

        {
            let producer_node = network.node(producer).unwrap();
            let mut ctx = EngineComputeContext::new(&data, &logger, &fallback, producer_node, 0);
            ctx.set_output("out", Box::new(9_i32));
        }
        data.publish_private(producer_output);

        let consumer_node = network.node(consumer).unwrap();
        let ctx = EngineComputeContext::new(&data, &logger, &fallback, consumer_node, 1);
        assert_eq!(ctx.input("in").unwrap().downcast_ref::<i32>(), Some(&0));
    }

    #[test]
    fn missing_value_without_a_witness_warns_and_drops_the_input() {
        let mut network = Network::new();
        let producer = network.create_node(vec![], vec![OutputSpec::new("out")], None);
        let consumer = network.create_node(vec![InputSpec::read("in")], vec![], None);
        network.connect(producer, "out", consumer, "in", Mask::all_ones(1)).unwrap();

        let data = DataManager::new(1);
        let logger = ErrorLogger::new();
        let fallback = FallbackRegistry::new();

        let consumer_node = network.node(consumer).unwrap();
        let ctx = EngineComputeContext::new(&data, &logger, &fallback, consumer_node, 0);

        assert!(ctx.input("in").is_none());
        assert_eq!(logger.report_warnings()[&consumer].len(), 1);
    }
}
