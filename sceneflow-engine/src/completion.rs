// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use parking_lot::Mutex;
use sceneflow_mask::MaskedOutput;

/// The per-requested-output completion notification a caller of
/// [`crate::ExecutorEngine::run_schedule`] optionally supplies.
///
/// The parallel engine's worker threads share one `RunCtx` immutably, so a
/// bare `&mut dyn FnMut` cannot be invoked from whichever thread's leaf task
/// happens to resolve it; this wraps the callback in a mutex so any worker
/// can take it for the duration of one invocation. The pull engine never
/// contends on it, but uses the same type so both executors thread one
/// `request`/`callback` pair through `ExecutorEngine` uniformly.
pub struct CompletionCallback<'a> {
    callback: Option<Mutex<&'a mut (dyn FnMut(MaskedOutput, usize) + Send + 'a)>>,
}

impl<'a> CompletionCallback<'a> {
    /// Wraps `callback`, or builds a no-op completion callback if `None`.
    pub fn new(callback: Option<&'a mut (dyn FnMut(MaskedOutput, usize) + Send + 'a)>) -> Self {
        Self { callback: callback.map(Mutex::new) }
    }

    /// Invokes the wrapped callback with `output` at `request_index`, if one
    /// was supplied.
    pub fn invoke(&self, output: MaskedOutput, request_index: usize) {
        if let Some(callback) = &self.callback {
            (callback.lock())(output, request_index);
        }
    }
}
