// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dependency tracking atop [`sceneflow_network::Network`]: a dense leaf-node
//! index space, a masked-output dependency cache keyed by user predicate,
//! and a leaf-node cache layered on both.
//!
//! These three pieces are a concurrency-sensitive seam: `did_connect`/
//! `will_delete_connection` may run concurrently with each other and with
//! in-flight reads, as long as no single `(source output, target input)`
//! pair is concurrently connected and deleted. `find_outputs`/`find_nodes`
//! are not safe against other mutating queries on the same cache.

mod connection_descriptor;
mod dependency_cache;
mod leaf_indexer;
mod leaf_node_cache;

pub use connection_descriptor::ConnectionDescriptor;
pub use dependency_cache::{DependencyCache, TraversalPredicate};
pub use leaf_indexer::{INVALID_INDEX, LeafIndex, LeafNodeEntry, LeafNodeIndexer};
pub use leaf_node_cache::LeafNodeCache;
