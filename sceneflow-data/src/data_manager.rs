// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use sceneflow_mask::{Mask, OutputId};

use crate::buffer::BufferData;
use crate::typed_buffer::ErasedBuffer;

/// Owns one [`BufferData`] per output, allocated lazily on first touch.
///
/// Entries are independently locked so that the compute tasks of unrelated
/// outputs never contend on each other; looking an entry up only takes the
/// map's read lock unless the entry doesn't exist yet.
pub struct DataManager {
    entries: RwLock<HashMap<OutputId, Arc<Mutex<BufferData>>>>,
    capacity: usize,
}

impl std::fmt::Debug for DataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataManager")
            .field("capacity", &self.capacity)
            .field("outputs", &self.entries.read().len())
            .finish()
    }
}

impl DataManager {
    /// Creates a data manager whose buffers are sized to `capacity`
    /// elements until an output's first write grows them.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { entries: RwLock::new(HashMap::new()), capacity }
    }

    fn entry(&self, output: OutputId) -> Arc<Mutex<BufferData>> {
        if let Some(entry) = self.entries.read().get(&output) {
            return Arc::clone(entry);
        }
        let mut entries = self.entries.write();
        Arc::clone(entries.entry(output).or_insert_with(|| Arc::new(Mutex::new(BufferData::new(self.capacity)))))
    }

    /// Runs `f` against `output`'s buffer data, creating it if this is the
    /// first touch.
    pub fn with_entry<R>(&self, output: OutputId, f: impl FnOnce(&mut BufferData) -> R) -> R {
        let entry = self.entry(output);
        let mut guard = entry.lock();
        f(&mut guard)
    }

    /// Writes `values`/`mask` as `output`'s private buffer.
    pub fn set_private(&self, output: OutputId, values: Box<dyn ErasedBuffer>, mask: Mask) {
        self.with_entry(output, |data| data.set_private(values, mask));
    }

    /// Takes `output`'s private buffer out by ownership transfer, leaving
    /// it empty.
    pub fn take_private(&self, output: OutputId) -> Option<(Box<dyn ErasedBuffer>, Mask)> {
        self.with_entry(output, BufferData::take_private)
    }

    /// Publishes `output`'s private buffer as its public buffer.
    pub fn publish_private(&self, output: OutputId) {
        self.with_entry(output, BufferData::publish_private);
    }

    /// Publishes `output`'s scratch buffer as its public buffer.
    pub fn publish_scratch(&self, output: OutputId) {
        self.with_entry(output, BufferData::publish_scratch);
    }

    /// Merges `output`'s private buffer, selected by `mask`, into scratch.
    pub fn merge_into_scratch(&self, output: OutputId, mask: &Mask) {
        self.with_entry(output, |data| data.merge_into_scratch(mask));
    }

    /// Absorbs the portion of `output`'s public buffer not covered by
    /// `private_mask` into scratch, returning the absorbed mask.
    pub fn absorb_uncovered_public(&self, output: OutputId, private_mask: &Mask) -> Mask {
        self.with_entry(output, |data| data.absorb_uncovered_public(private_mask))
    }

    /// Pre-sizes `output`'s scratch buffer for `keep_mask` ahead of
    /// concurrent merges into it.
    pub fn reset_scratch(&self, output: OutputId, keep_mask: &Mask) {
        self.with_entry(output, |data| data.reset_scratch(keep_mask));
    }

    /// Returns `output`'s currently published mask.
    pub fn public_mask(&self, output: OutputId) -> Mask {
        self.with_entry(output, |data| data.public_mask().clone())
    }

    /// Drops `output`'s buffer data entirely, so its next touch starts from
    /// empty private/public/scratch buffers.
    ///
    /// Used by invalidation: unlike `publish_private`/`publish_scratch`,
    /// which replace the public buffer with new contents, this removes the
    /// entry outright, since invalidation has no replacement value to
    /// publish.
    pub fn invalidate(&self, output: OutputId) {
        self.entries.write().remove(&output);
    }

    /// Drops every output's buffer data.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
