// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use sceneflow_mask::{MaskedOutput, MaskedOutputVector};
use sceneflow_network::Network;
use sceneflow_schedule::Schedule;

use crate::error::EngineError;
use crate::options::EngineOptions;
use crate::stats::ExecutionStatsSnapshot;

/// The surface shared by every concrete executor (parallel, pull,
/// speculation sub-executor): a concrete engine owns its own task tables
/// and buffers, and this trait is only the seam `sceneflow-runtime`
/// programs against.
pub trait ExecutorEngine {
    /// Runs `schedule` to completion against `network`, publishing every
    /// scheduled output's result into this engine's data manager.
    ///
    /// `request` names the outputs the caller actually wants a completion
    /// notification for; `callback`, if supplied, is invoked exactly once
    /// per entry of `request`, in no particular order, once that entry's
    /// value has been published. `schedule` may (and generally does) run
    /// more tasks than strictly needed for `request` alone, since it also
    /// encodes whatever else this evaluation keeps current.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Interrupted`] if evaluation was interrupted
    /// before every scheduled task finished, or
    /// [`EngineError::Diagnostics`] if any node callback raised one or more
    /// fatal diagnostics.
    fn run_schedule(
        &self,
        network: &Network,
        schedule: &dyn Schedule,
        request: &MaskedOutputVector,
        callback: Option<&mut (dyn FnMut(MaskedOutput, usize) + Send)>,
        options: &EngineOptions,
    ) -> Result<ExecutionStatsSnapshot, EngineError>;
}
