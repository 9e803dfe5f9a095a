// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crossbeam_queue::SegQueue;

use crate::error::Diagnostic;

/// Carries diagnostics raised by node callbacks running on worker threads
/// back to the thread that called `run_schedule`, without those workers
/// ever taking a lock.
///
/// Diagnostics accumulate for the lifetime of one evaluation and are
/// drained once, after `wait_for_all` returns and every worker thread has
/// rejoined the scope.
#[derive(Default)]
pub struct ErrorTransport {
    queue: SegQueue<Diagnostic>,
}

impl ErrorTransport {
    /// Creates an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self { queue: SegQueue::new() }
    }

    /// Posts a diagnostic from a worker thread.
    pub fn post(&self, diagnostic: Diagnostic) {
        self.queue.push(diagnostic);
    }

    /// Returns `true` if no diagnostics have been posted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drains every posted diagnostic, in post order, for use by the
    /// calling thread once evaluation has finished.
    pub fn drain(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::with_capacity(self.queue.len());
        while let Some(diagnostic) = self.queue.pop() {
            diagnostics.push(diagnostic);
        }
        diagnostics
    }
}
