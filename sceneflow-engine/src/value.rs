// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use sceneflow_data::{ErasedBuffer, TypedBuffer};

/// The one concrete element type every output buffer this engine manages is
/// instantiated with.
///
/// `sceneflow-data`'s `TypedBuffer<T>` needs `T` fixed before a buffer can be
/// created, but a node's `compute` callback hands `set_output` a
/// `Box<dyn Any + Send + Sync>` whose concrete type is never known to the
/// engine. Rather than threading a per-output type factory through the
/// schedule, every buffer here is a `TypedBuffer<ErasedValue>`: one more
/// level of erasure that is itself `Clone + Default`, so a brand-new output
/// buffer can always be created with `TypedBuffer::new()` with no factory at
/// all. `read_element`/`write_element` peel this wrapper back off so callers
/// on both sides see the node author's original value type.
#[derive(Clone, Default)]
pub(crate) struct ErasedValue(Option<Arc<dyn Any + Send + Sync>>);

impl ErasedValue {
    fn from_any(value: Box<dyn Any + Send + Sync>) -> Self {
        Self(Some(Arc::from(value)))
    }

    fn as_any(&self) -> Option<&dyn Any> {
        self.0.as_deref().map(|value| value as &dyn Any)
    }
}

/// Creates an empty buffer ready to receive values through
/// [`write_element`].
pub(crate) fn new_output_buffer() -> Box<dyn ErasedBuffer> {
    Box::new(TypedBuffer::<ErasedValue>::new())
}

/// Reads the node-authored value at `index` out of an output's buffer.
pub(crate) fn read_element(buffer: &dyn ErasedBuffer, index: usize) -> Option<&dyn Any> {
    buffer.get_any(index)?.downcast_ref::<ErasedValue>()?.as_any()
}

/// Clones the `Arc` backing the node-authored value at `index`, so a caller
/// can retain it after the buffer's lock is released.
pub(crate) fn clone_element(buffer: &dyn ErasedBuffer, index: usize) -> Option<Arc<dyn Any + Send + Sync>> {
    buffer.get_any(index)?.downcast_ref::<ErasedValue>()?.0.clone()
}

/// Writes a node-authored value at `index` into an output's buffer.
pub(crate) fn write_element(buffer: &mut dyn ErasedBuffer, index: usize, value: Box<dyn Any + Send + Sync>) {
    buffer.set_any(index, Box::new(ErasedValue::from_any(value)));
}

/// Finds the concrete type of any already-written element in `buffer`, used
/// to decide which [`FallbackRegistry`] entry applies to a buffer whose
/// element type the engine never declares ahead of time.
pub(crate) fn witness_type_id(buffer: &dyn ErasedBuffer) -> Option<TypeId> {
    (0..buffer.len()).find_map(|index| read_element(buffer, index)).map(Any::type_id)
}

/// Factories for the value a required input should fall back to when its
/// producer left it unwritten (an empty mask at the requested index).
///
/// Keyed by the node-authored value's `TypeId` rather than by input name or
/// output id: a fallback is a property of a value's type ("an unset color is
/// black"), not of any one wire in the network, so one registration covers
/// every input of that type anywhere in the network. Consulted only when a
/// [`witness_type_id`] of the same output already exists elsewhere in the
/// buffer, since the registry has no way to pick a factory for a buffer that
/// has never been written to at all.
#[derive(Default)]
pub struct FallbackRegistry {
    factories: HashMap<TypeId, Box<dyn Fn() -> Box<dyn Any + Send + Sync> + Send + Sync>>,
}

impl FallbackRegistry {
    /// Creates a registry with no fallbacks registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` as the fallback value for type `T`.
    pub fn register<T>(&mut self, factory: impl Fn() -> T + Send + Sync + 'static)
    where
        T: Send + Sync + 'static,
    {
        self.factories.insert(TypeId::of::<T>(), Box::new(move || Box::new(factory()) as Box<dyn Any + Send + Sync>));
    }

    /// Returns `true` if no fallbacks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Builds a fresh fallback value for `type_id`, if one is registered.
    pub(crate) fn fallback_for(&self, type_id: TypeId) -> Option<Box<dyn Any + Send + Sync>> {
        self.factories.get(&type_id).map(|factory| factory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_roundtrips_the_original_value() {
        let mut buffer = new_output_buffer();
        write_element(buffer.as_mut(), 3, Box::new(42_i32));

        let read = read_element(buffer.as_ref(), 3).unwrap();
        assert_eq!(read.downcast_ref::<i32>(), Some(&42));
    }

    #[test]
    fn unwritten_element_reads_as_none() {
        let mut buffer = new_output_buffer();
        write_element(buffer.as_mut(), 1, Box::new(1_i32));

        assert!(read_element(buffer.as_ref(), 0).is_none());
    }

    #[test]
    fn witness_type_id_finds_any_written_element() {
        let mut buffer = new_output_buffer();
        assert!(witness_type_id(buffer.as_ref()).is_none());

        write_element(buffer.as_mut(), 5, Box::new(7_i32));
        assert_eq!(witness_type_id(buffer.as_ref()), Some(TypeId::of::<i32>()));
    }

    #[test]
    fn fallback_registry_builds_a_fresh_value_per_call() {
        let mut registry = FallbackRegistry::new();
        assert!(registry.is_empty());
        registry.register(|| 42_i32);
        assert!(!registry.is_empty());

        let value = registry.fallback_for(TypeId::of::<i32>()).unwrap();
        assert_eq!(value.downcast_ref::<i32>(), Some(&42));
        assert!(registry.fallback_for(TypeId::of::<f64>()).is_none());
    }
}
