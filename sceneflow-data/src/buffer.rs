// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use sceneflow_mask::Mask;

use crate::typed_buffer::ErasedBuffer;

/// One of an output's three buffer slots: a type-erased element vector
/// paired with the mask of elements it currently holds valid data for.
pub struct Buffer {
    values: Option<Box<dyn ErasedBuffer>>,
    mask: Mask,
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.values.as_deref().map_or(0, ErasedBuffer::len))
            .field("mask", &self.mask)
            .finish()
    }
}

impl Buffer {
    /// Creates an empty buffer over `capacity` elements.
    #[must_use]
    pub fn empty(capacity: usize) -> Self {
        Self { values: None, mask: Mask::empty(capacity) }
    }

    /// Returns the mask of elements this buffer holds valid data for.
    #[must_use]
    pub const fn mask(&self) -> &Mask {
        &self.mask
    }

    /// Returns the backing value vector, if any has been written yet.
    #[must_use]
    pub fn values(&self) -> Option<&dyn ErasedBuffer> {
        self.values.as_deref()
    }

    /// Replaces this buffer's contents wholesale.
    pub fn set(&mut self, values: Box<dyn ErasedBuffer>, mask: Mask) {
        self.values = Some(values);
        self.mask = mask;
    }

    /// Takes the backing value vector out of this buffer, leaving it empty
    /// at the same capacity. Used to pass private buffer data down the pool
    /// chain by ownership transfer rather than by copy.
    pub fn take(&mut self) -> Option<(Box<dyn ErasedBuffer>, Mask)> {
        let values = self.values.take()?;
        let capacity = self.mask.capacity();
        let mask = std::mem::replace(&mut self.mask, Mask::empty(capacity));
        Some((values, mask))
    }

    /// Clears this buffer back to empty at the same capacity.
    pub fn reset(&mut self) {
        self.values = None;
        self.mask = Mask::empty(self.mask.capacity());
    }
}

/// The three buffer slots a single output carries.
///
/// - `private` is written by the task evaluating the output this
///   invocation; its contents move down the pool chain by ownership
///   transfer where possible.
/// - `public` is the last-published value visible to consumers; only the
///   output itself ever writes it.
/// - `scratch` accumulates data kept across multiple invocations of the
///   same node, or residual public data absorbed before a later publish.
pub struct BufferData {
    private: Buffer,
    public: Buffer,
    scratch: Buffer,
}

impl std::fmt::Debug for BufferData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferData")
            .field("private", &self.private)
            .field("public", &self.public)
            .field("scratch", &self.scratch)
            .finish()
    }
}

impl BufferData {
    /// Creates a fresh set of buffers over `capacity` elements.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { private: Buffer::empty(capacity), public: Buffer::empty(capacity), scratch: Buffer::empty(capacity) }
    }

    /// Returns the public buffer's mask: the elements currently visible to
    /// consumers.
    #[must_use]
    pub const fn public_mask(&self) -> &Mask {
        self.public.mask()
    }

    /// Returns the public buffer's values, if any have been published.
    #[must_use]
    pub fn public_values(&self) -> Option<&dyn ErasedBuffer> {
        self.public.values()
    }

    /// Writes `values`/`mask` as this output's private buffer.
    pub fn set_private(&mut self, values: Box<dyn ErasedBuffer>, mask: Mask) {
        self.private.set(values, mask);
    }

    /// Takes private buffer ownership out, leaving it empty. Used by the
    /// compute task to pass its evaluated buffer down the pool chain
    /// without copying.
    pub fn take_private(&mut self) -> Option<(Box<dyn ErasedBuffer>, Mask)> {
        self.private.take()
    }

    /// Moves the private buffer's contents into the public buffer,
    /// overwriting whatever was previously published.
    pub fn publish_private(&mut self) {
        if let Some((values, mask)) = self.private.take() {
            self.public.set(values, mask);
        } else {
            self.public.reset();
        }
    }

    /// Moves the scratch buffer's contents into the public buffer, then
    /// clears scratch.
    pub fn publish_scratch(&mut self) {
        if let Some((values, mask)) = self.scratch.take() {
            self.public.set(values, mask);
        } else {
            self.public.reset();
        }
    }

    /// Merges the elements of the private buffer selected by `mask` into
    /// the scratch buffer, growing scratch's value vector as needed and
    /// extending its mask to include `mask`.
    ///
    /// Used by a multi-invocation compute task to accumulate its
    /// keep-mask-selected contribution into scratch before a later publish
    /// (one invocation's private buffer never reaches `public` directly).
    pub fn merge_into_scratch(&mut self, mask: &Mask) {
        if mask.is_empty() {
            return;
        }
        let Some(private_values) = self.private.values() else { return };
        let scratch_values: &mut dyn ErasedBuffer = match &mut self.scratch.values {
            Some(values) => &mut **values,
            slot @ None => &mut **slot.insert(private_values.empty_like()),
        };
        scratch_values.merge_from(private_values, mask);
        self.scratch.mask.union_with(mask);
    }

    /// Absorbs the portion of the current public buffer *not* covered by
    /// `private_mask` into scratch, returning the absorbed mask.
    ///
    /// Used before publishing scratch over private when the evaluated
    /// output does not pass its buffer: without this, elements the new
    /// invocation didn't touch would otherwise vanish from the published
    /// result instead of carrying forward the last-known-good value.
    pub fn absorb_uncovered_public(&mut self, private_mask: &Mask) -> Mask {
        let uncovered = self.public.mask.difference(private_mask);
        if uncovered.is_empty() {
            return uncovered;
        }
        if let Some(public_values) = self.public.values() {
            let scratch_values: &mut dyn ErasedBuffer = match &mut self.scratch.values {
                Some(values) => &mut **values,
                slot @ None => &mut **slot.insert(public_values.empty_like()),
            };
            scratch_values.merge_from(public_values, &uncovered);
            self.scratch.mask.union_with(&uncovered);
        }
        uncovered
    }

    /// Resets the scratch buffer to empty, pre-sized for `keep_mask`, ahead
    /// of concurrent keep-mask merges into it. Pre-sizing avoids a resize
    /// race when multiple invocations merge into scratch concurrently.
    pub fn reset_scratch(&mut self, keep_mask: &Mask) {
        self.scratch.reset();
        if let Some(public_values) = self.public.values() {
            self.scratch.values = Some(public_values.empty_like());
        }
        self.scratch.mask = Mask::empty(keep_mask.capacity());
    }
}

#[cfg(test)]
mod tests {
    use crate::typed_buffer::TypedBuffer;

    use super::*;

    fn buf(values: Vec<i32>, set: &[usize], capacity: usize) -> (Box<dyn ErasedBuffer>, Mask) {
        let mut mask = Mask::empty(capacity);
        for &i in set {
            mask.set(i);
        }
        (Box::new(TypedBuffer::from_vec(values)), mask)
    }

    #[test]
    fn publish_private_moves_into_public_and_empties_private() {
        let mut data = BufferData::new(3);
        let (values, mask) = buf(std::vec![1, 2, 3], &[0, 2], 3);
        data.set_private(values, mask);

        data.publish_private();
        assert_eq!(data.public_mask().count(), 2);
        assert!(data.take_private().is_none());
    }

    #[test]
    fn merge_into_scratch_then_publish_accumulates_across_invocations() {
        let mut data = BufferData::new(4);

        let (values, mask) = buf(std::vec![10, 0, 0, 0], &[0], 4);
        data.set_private(values, mask);
        let mut first_keep = Mask::empty(4);
        first_keep.set(0);
        data.merge_into_scratch(&first_keep);

        let (values, mask) = buf(std::vec![0, 20, 0, 0], &[1], 4);
        data.set_private(values, mask);
        let mut second_keep = Mask::empty(4);
        second_keep.set(1);
        data.merge_into_scratch(&second_keep);

        data.publish_scratch();
        let published = data.public_values().unwrap().as_any().downcast_ref::<TypedBuffer<i32>>().unwrap();
        assert_eq!(published.as_slice(), &[10, 20, 0, 0]);
        assert_eq!(data.public_mask().count(), 2);
    }

    #[test]
    fn absorb_uncovered_public_preserves_elements_outside_new_private_mask() {
        let mut data = BufferData::new(3);
        let (values, mask) = buf(std::vec![1, 1, 1], &[0, 1, 2], 3);
        data.set_private(values, mask);
        data.publish_private();

        let mut new_private_mask = Mask::empty(3);
        new_private_mask.set(0);
        let absorbed = data.absorb_uncovered_public(&new_private_mask);
        assert_eq!(absorbed.count(), 2);

        let scratch = data.scratch.values().unwrap().as_any().downcast_ref::<TypedBuffer<i32>>().unwrap();
        assert_eq!(scratch.as_slice(), &[0, 1, 1]);
    }
}
