// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt;

use sceneflow_network::NodeId;

/// A diagnostic a node's `compute` callback raised, captured during
/// evaluation and re-posted on the calling thread once the root task
/// finishes.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    node: NodeId,
    message: String,
}

impl Diagnostic {
    /// Creates a diagnostic attributed to `node`.
    #[must_use]
    pub fn new(node: NodeId, message: impl Into<String>) -> Self {
        Self { node, message: message.into() }
    }

    /// Returns the node this diagnostic is attributed to.
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    /// Returns the diagnostic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {:?}: {}", self.node, self.message)
    }
}

/// Errors `run_schedule` can return.
#[derive(Clone, Debug)]
pub enum EngineError {
    /// Evaluation was interrupted (external hook or cycle detection) before
    /// it could complete; no partial results were published.
    Interrupted,
    /// One or more node callbacks raised a diagnostic during this
    /// evaluation.
    Diagnostics(Vec<Diagnostic>),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted => write!(f, "evaluation was interrupted before completion"),
            Self::Diagnostics(diagnostics) => {
                write!(f, "{} node callback diagnostic(s):", diagnostics.len())?;
                for diagnostic in diagnostics {
                    write!(f, "\n  {diagnostic}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for EngineError {}
