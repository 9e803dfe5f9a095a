// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::any::Any;
use core::fmt;

use crate::ids::NodeId;
use sceneflow_mask::OutputId;

/// Whether an input is read-only, or read/write and paired with an
/// associated output via the pool chain.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InputKind {
    /// The input's buffer is read but never mutated or forwarded.
    Read,
    /// The input's buffer may be mutated and is forwarded to the named
    /// associated output (the pool-chain linkage).
    ReadWrite {
        /// Index of the output (within the same node) that receives this
        /// input's buffer.
        associated_output: u16,
    },
}

/// Declares one input slot of a node.
#[derive(Clone, Debug)]
pub struct InputSpec {
    name: String,
    kind: InputKind,
    prerequisite: bool,
}

impl InputSpec {
    /// Creates a read-only input spec.
    #[must_use]
    pub fn read(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: InputKind::Read, prerequisite: false }
    }

    /// Creates a read/write input spec paired with `associated_output`.
    #[must_use]
    pub fn read_write(name: impl Into<String>, associated_output: u16) -> Self {
        Self {
            name: name.into(),
            kind: InputKind::ReadWrite { associated_output },
            prerequisite: false,
        }
    }

    /// Marks this input as a prerequisite: its value must be computed before
    /// the node's `required_inputs` predicate can be evaluated.
    #[must_use]
    pub fn as_prerequisite(mut self) -> Self {
        self.prerequisite = true;
        self
    }

    /// Returns the input's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the input's read/read-write kind.
    #[must_use]
    pub const fn kind(&self) -> InputKind {
        self.kind
    }

    /// Returns `true` if this input must be computed before other inputs
    /// can be decided as required.
    #[must_use]
    pub const fn is_prerequisite(&self) -> bool {
        self.prerequisite
    }
}

/// Declares one output slot of a node.
#[derive(Clone, Debug)]
pub struct OutputSpec {
    name: String,
    associated_input: Option<u16>,
}

impl OutputSpec {
    /// Creates an output spec with no associated (pool-chain) input.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), associated_input: None }
    }

    /// Creates an output spec that is the pool-chain destination of
    /// `associated_input`.
    #[must_use]
    pub fn with_associated_input(name: impl Into<String>, associated_input: u16) -> Self {
        Self { name: name.into(), associated_input: Some(associated_input) }
    }

    /// Returns the output's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the pool-chain source input index, if any.
    #[must_use]
    pub const fn associated_input(&self) -> Option<u16> {
        self.associated_input
    }
}

/// What a node's compute callback needs when it runs: reading inputs by
/// name, reading the current invocation index, and writing outputs.
///
/// This is an interface seam: `sceneflow-network` only defines the
/// contract, and `sceneflow-engine` supplies the implementation backed by
/// `sceneflow-data` buffers. Keeping it a trait (rather than a concrete
/// struct) avoids a dependency from the network crate onto the data/engine
/// crates, matching the "virtual node hierarchy" redesign note: compute is a
/// function pointer plus an immutable spec, not a deep class hierarchy.
pub trait ComputeContext {
    /// Returns the input value bound to `input_name`, if present.
    fn input(&self, input_name: &str) -> Option<&dyn Any>;

    /// Returns the zero-based invocation index of this compute call (a node
    /// may be scheduled for multiple invocations within one evaluation).
    fn invocation_index(&self) -> u32;

    /// Writes the value for `output_name`.
    fn set_output(&mut self, output_name: &str, value: Box<dyn Any + Send + Sync>);

    /// Records a non-fatal warning attributed to the currently executing
    /// node (surfaced later via the error logger's `report_warnings`).
    fn warn(&mut self, message: &str);
}

/// The outcome of a node's `required_inputs` predicate: which
/// non-prerequisite inputs must be read before this node can correctly
/// decide what to compute.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RequiredInputs {
    /// No further reads are required.
    NoReads,
    /// Every optional input must be read.
    AllReads,
    /// Exactly one named optional input must be read.
    OneRead(String),
}

/// The user-supplied behavior of a node: what it computes, and optionally
/// which of its non-prerequisite inputs are actually required for a given
/// run ("task inversion").
pub trait Compute: Send + Sync {
    /// Runs the node's computation for the current invocation.
    fn compute(&self, ctx: &mut dyn ComputeContext);

    /// Returns which non-prerequisite inputs are required, given the
    /// prerequisite inputs already computed. Defaults to "all reads are
    /// required", matching a node that never declared any optionality.
    fn required_inputs(&self, _ctx: &dyn ComputeContext) -> RequiredInputs {
        RequiredInputs::AllReads
    }
}

/// A node in the network: its declared inputs/outputs and its compute
/// callback.
///
/// A *leaf node* is a node with zero outputs and exactly one
/// read input named `"in"`; its compute is never invoked. Leaf nodes exist
/// solely as invalidation sinks and are recognized structurally by
/// [`Node::is_leaf`], not by a separate node kind.
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) inputs: Vec<InputSpec>,
    pub(crate) outputs: Vec<OutputSpec>,
    pub(crate) compute: Option<Box<dyn Compute>>,
    pub(crate) incoming: Vec<Vec<Connection>>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("incoming", &self.incoming)
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Returns this node's stable id.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the node's input specs, in declaration order.
    #[must_use]
    pub fn input_specs(&self) -> &[InputSpec] {
        &self.inputs
    }

    /// Returns the node's output specs, in declaration order.
    #[must_use]
    pub fn output_specs(&self) -> &[OutputSpec] {
        &self.outputs
    }

    /// Returns `true` if this node is a leaf node: zero
    /// outputs and exactly one read input named `"in"`.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.outputs.is_empty()
            && self.inputs.len() == 1
            && self.inputs[0].name() == "in"
            && matches!(self.inputs[0].kind(), InputKind::Read)
    }

    /// Returns the node's compute callback, if it has one (leaf nodes never
    /// do).
    #[must_use]
    pub fn compute(&self) -> Option<&dyn Compute> {
        self.compute.as_deref()
    }

    /// Returns the output id for the named output, if present.
    #[must_use]
    pub fn output_id_named(&self, name: &str) -> Option<OutputId> {
        self.outputs
            .iter()
            .position(|o| o.name() == name)
            .map(|i| OutputId::new(self.id.index(), i as u16))
    }

    /// Returns the incoming connections of the named input, in insertion
    /// order.
    #[must_use]
    pub fn incoming_named(&self, name: &str) -> &[Connection] {
        self.inputs
            .iter()
            .position(|i| i.name() == name)
            .and_then(|i| self.incoming.get(i))
            .map_or(&[], Vec::as_slice)
    }
}

/// A single edge: a source output feeding a target input, selecting
/// `mask`'s elements.
#[derive(Clone, Debug)]
pub struct Connection {
    pub(crate) source: OutputId,
    pub(crate) target: crate::ids::InputId,
    pub(crate) mask: sceneflow_mask::Mask,
}

impl Connection {
    /// Returns the source output.
    #[must_use]
    pub const fn source(&self) -> OutputId {
        self.source
    }

    /// Returns the target input.
    #[must_use]
    pub const fn target(&self) -> crate::ids::InputId {
        self.target
    }

    /// Returns the mask selecting which elements of the source output this
    /// connection carries.
    #[must_use]
    pub const fn mask(&self) -> &sceneflow_mask::Mask {
        &self.mask
    }
}
