// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use sceneflow_mask::MaskedOutput;

use crate::time::TimeInterval;

/// Storage for time-sample-scoped cached values, owned and implemented by a
/// collaborator outside this crate; no persisted state is owned by the
/// core. The runtime only calls through this interface during
/// `invalidate_page_cache`.
pub trait PageCacheStore: Send + Sync {
    /// Invalidates every cached sample of `request`'s outputs that falls
    /// within `interval`.
    fn invalidate(&self, request: &[MaskedOutput], interval: &TimeInterval);
}

/// A page cache store that retains nothing, for runtimes with no page
/// cache configured.
#[derive(Debug, Default)]
pub struct NullPageCacheStore;

impl PageCacheStore for NullPageCacheStore {
    fn invalidate(&self, _request: &[MaskedOutput], _interval: &TimeInterval) {}
}
