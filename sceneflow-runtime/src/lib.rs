// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Owns the main executor a program computes values through, and drives
//! time/topological/authored-value invalidation against it.
//!
//! This crate sits above `sceneflow-engine`: it never defines compute
//! callbacks or schedules itself, it only decides *when* cached values stop
//! being valid and hands the resulting requests down to an executor engine
//! and a leaf-node cache it does not own.

mod page_cache;
mod runtime;
mod time;
mod time_dependence;

pub use page_cache::{NullPageCacheStore, PageCacheStore};
pub use runtime::Runtime;
pub use time::{Time, TimeInterval};
pub use time_dependence::TimeDependentInputs;
