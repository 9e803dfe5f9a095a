// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-output buffer storage: a type-erased private/public/scratch triple
//! per output, and a [`DataManager`] that owns one such triple per output
//! and exposes the publish/merge operations the executor engine drives.

mod buffer;
mod data_manager;
mod typed_buffer;

pub use buffer::{Buffer, BufferData};
pub use data_manager::DataManager;
pub use typed_buffer::{ErasedBuffer, TypedBuffer};
