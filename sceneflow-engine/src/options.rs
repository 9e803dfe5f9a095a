// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt;
use std::sync::Arc;

/// The recognized-option table as a plain builder struct: in-process knobs
/// are more naturally expressed as a config struct than a config-file
/// format, since there's no process boundary for a file to cross.
#[derive(Clone)]
pub struct EngineOptions {
    parallel_evaluation: bool,
    concurrency_limit: usize,
    enable_smbl: bool,
    interruption_hook: Option<Arc<dyn Fn() -> bool + Send + Sync>>,
}

impl fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOptions")
            .field("parallel_evaluation", &self.parallel_evaluation)
            .field("concurrency_limit", &self.concurrency_limit)
            .field("enable_smbl", &self.enable_smbl)
            .field("interruption_hook", &self.interruption_hook.is_some())
            .finish()
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            parallel_evaluation: true,
            concurrency_limit: std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
            enable_smbl: false,
            interruption_hook: None,
        }
    }
}

impl EngineOptions {
    /// Starts from the default option set: parallel evaluation enabled,
    /// concurrency limit at the available parallelism, SMBL disabled, no
    /// interruption hook.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the parallel engine (`true`) or the single-threaded pull
    /// engine (`false`).
    #[must_use]
    pub const fn with_parallel_evaluation(mut self, enabled: bool) -> Self {
        self.parallel_evaluation = enabled;
        self
    }

    /// Caps the number of task-arena worker threads the parallel engine
    /// spawns. Clamped to at least 1.
    #[must_use]
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }

    /// Enables sparse mung-buffer-locking in the pull engine.
    #[must_use]
    pub const fn with_smbl(mut self, enabled: bool) -> Self {
        self.enable_smbl = enabled;
        self
    }

    /// Installs an external predicate polled at task-stage boundaries;
    /// returning `true` requests interruption.
    #[must_use]
    pub fn with_interruption_hook(mut self, hook: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.interruption_hook = Some(Arc::new(hook));
        self
    }

    /// Returns whether the parallel engine should be used.
    #[must_use]
    pub const fn parallel_evaluation(&self) -> bool {
        self.parallel_evaluation
    }

    /// Returns the worker-thread cap.
    #[must_use]
    pub const fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Returns whether SMBL is enabled.
    #[must_use]
    pub const fn enable_smbl(&self) -> bool {
        self.enable_smbl
    }

    /// Polls the installed interruption hook, if any.
    #[must_use]
    pub fn poll_interruption_hook(&self) -> bool {
        self.interruption_hook.as_ref().is_some_and(|hook| hook())
    }
}
