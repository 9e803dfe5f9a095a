// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use parking_lot::Mutex;
use std::collections::HashMap;

use sceneflow_network::NodeId;
use tracing::warn;

use crate::error::Diagnostic;
use crate::error_transport::ErrorTransport;

/// Collects the non-fatal `ComputeContext::warn` calls a node's callback
/// makes during one evaluation, keyed by node, and forwards fatal
/// diagnostics to the [`ErrorTransport`] for re-posting on the caller's
/// thread.
///
/// Warnings are logged immediately through `tracing` as they arrive (a
/// worker thread's callback is in the best position to say what it was
/// doing) and also retained so `report_warnings` can hand the caller a
/// structured summary once evaluation finishes.
#[derive(Default)]
pub struct ErrorLogger {
    warnings: Mutex<HashMap<NodeId, Vec<String>>>,
}

impl ErrorLogger {
    /// Creates an empty logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a warning from `node`'s callback, logging it immediately.
    pub fn warn(&self, node: NodeId, message: impl Into<String>) {
        let message = message.into();
        warn!(?node, %message, "node callback warning");
        self.warnings.lock().entry(node).or_default().push(message);
    }

    /// Forwards a fatal diagnostic to `transport` for re-posting on the
    /// caller's thread, logging it immediately.
    pub fn report_diagnostic(&self, transport: &ErrorTransport, diagnostic: Diagnostic) {
        warn!(node = ?diagnostic.node(), message = diagnostic.message(), "node callback diagnostic");
        transport.post(diagnostic);
    }

    /// Returns every warning recorded this evaluation, grouped by node.
    #[must_use]
    pub fn report_warnings(&self) -> HashMap<NodeId, Vec<String>> {
        self.warnings.lock().clone()
    }
}
