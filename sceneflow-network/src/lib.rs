// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A mutable typed DAG of compute nodes connected by masked edges.
//!
//! [`Network`] owns nodes with stable, versioned [`NodeId`]s, supports
//! connecting/disconnecting typed inputs and outputs, and maintains a
//! pool-chain index over read/write output chains. Structural edits notify
//! registered [`EditObserver`]s so higher layers (the leaf-node indexer, the
//! dependency cache) can stay current without polling.

#![no_std]
#![cfg_attr(not(any(test, feature = "std")), doc(hidden))]

extern crate alloc;
#[cfg(any(test, feature = "std"))]
extern crate std;

mod ids;
mod network;
mod node;

pub use ids::{ConnectionId, InputId, NodeId};
pub use network::{EditObserver, GraphError, Network};
pub use node::{Compute, ComputeContext, Connection, InputKind, InputSpec, Node, OutputSpec, RequiredInputs};

pub use sceneflow_mask::OutputId;
