// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::any::Any;

use sceneflow_mask::Mask;

/// A type-erased element vector behind which node-authored `compute`
/// callbacks store their own value type.
///
/// This crate never names a concrete value type: what a node computes is
/// explicitly out of scope here. `merge_from`/`empty_like` let the data
/// manager absorb and size buffers without knowing the element type, while
/// `as_any`/`as_any_mut` let a `compute` callback downcast back to its own
/// type once it holds the buffer.
pub trait ErasedBuffer: Send + Sync {
    /// Returns the buffer as `&dyn Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Returns the buffer as `&mut dyn Any` for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Returns the number of elements currently allocated.
    fn len(&self) -> usize;

    /// Returns `true` if no elements are allocated.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the elements selected by `mask` from `source` into `self`,
    /// growing `self` if `source` is longer.
    ///
    /// # Panics
    ///
    /// Panics if `source` is not the same concrete type as `self`: merging
    /// buffers of mismatched element type is a programming error, not a
    /// recoverable condition.
    fn merge_from(&mut self, source: &dyn ErasedBuffer, mask: &Mask);

    /// Returns a new, empty buffer of the same concrete element type.
    fn empty_like(&self) -> Box<dyn ErasedBuffer>;

    /// Returns the element at `index` as `&dyn Any`, for a `compute`
    /// callback reading a single invocation's input value.
    fn get_any(&self, index: usize) -> Option<&dyn Any>;

    /// Writes `value` at `index`, growing the buffer if needed.
    ///
    /// # Panics
    ///
    /// Panics if `value`'s concrete type does not match this buffer's
    /// element type.
    fn set_any(&mut self, index: usize, value: Box<dyn Any + Send + Sync>);
}

/// The concrete `ErasedBuffer` every node-authored value vector is stored
/// behind; `T` is chosen by the node author, never by this crate.
pub struct TypedBuffer<T> {
    elements: Vec<T>,
}

impl<T: Clone + Default + Send + Sync + 'static> TypedBuffer<T> {
    /// Creates an empty typed buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self { elements: Vec::new() }
    }

    /// Creates a typed buffer from an existing element vector.
    #[must_use]
    pub const fn from_vec(elements: Vec<T>) -> Self {
        Self { elements }
    }

    /// Returns the backing element slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.elements
    }

    /// Returns the backing element slice, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.elements
    }

    fn ensure_len(&mut self, len: usize) {
        if self.elements.len() < len {
            self.elements.resize(len, T::default());
        }
    }
}

impl<T: Clone + Default + Send + Sync + 'static> Default for TypedBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Default + Send + Sync + 'static> ErasedBuffer for TypedBuffer<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn len(&self) -> usize {
        self.elements.len()
    }

    fn merge_from(&mut self, source: &dyn ErasedBuffer, mask: &Mask) {
        let source =
            source.as_any().downcast_ref::<Self>().expect("merge_from called with mismatched buffer element type");
        self.ensure_len(source.elements.len());
        for index in mask.iter_set() {
            if let Some(value) = source.elements.get(index) {
                self.elements[index] = value.clone();
            }
        }
    }

    fn empty_like(&self) -> Box<dyn ErasedBuffer> {
        Box::new(Self::new())
    }

    fn get_any(&self, index: usize) -> Option<&dyn Any> {
        self.elements.get(index).map(|value| value as &dyn Any)
    }

    fn set_any(&mut self, index: usize, value: Box<dyn Any + Send + Sync>) {
        let value = *value.downcast::<T>().expect("set_any called with mismatched element type");
        self.ensure_len(index + 1);
        self.elements[index] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_from_copies_only_masked_elements() {
        let mut dest = TypedBuffer::<i32>::from_vec(std::vec![0, 0, 0]);
        let source = TypedBuffer::<i32>::from_vec(std::vec![1, 2, 3]);

        let mut mask = Mask::empty(3);
        mask.set(0);
        mask.set(2);

        dest.merge_from(&source, &mask);
        assert_eq!(dest.as_slice(), &[1, 0, 3]);
    }

    #[test]
    fn merge_from_grows_destination_to_source_length() {
        let mut dest = TypedBuffer::<i32>::new();
        let source = TypedBuffer::<i32>::from_vec(std::vec![9, 9]);

        let mut mask = Mask::empty(2);
        mask.set(1);

        dest.merge_from(&source, &mask);
        assert_eq!(dest.as_slice(), &[0, 9]);
    }

    #[test]
    #[should_panic(expected = "mismatched buffer element type")]
    fn merge_from_panics_on_type_mismatch() {
        let mut dest = TypedBuffer::<i32>::new();
        let source = TypedBuffer::<&str>::from_vec(std::vec!["a"]);
        dest.merge_from(&source, &Mask::empty(1));
    }

    #[test]
    fn set_any_then_get_any_roundtrips_a_single_element() {
        let mut buffer = TypedBuffer::<i32>::new();
        buffer.set_any(2, Box::new(42_i32));
        assert_eq!(buffer.get_any(2).unwrap().downcast_ref::<i32>(), Some(&42));
        assert_eq!(buffer.as_slice(), &[0, 0, 42]);
    }
}
