// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The `Schedule` collaborator interface the parallel executor engine runs
//! against, plus a minimal concrete [`StaticSchedule`] for tests and demos
//! that don't need a real query planner.

mod ids;
mod schedule;
mod static_schedule;

pub use ids::{InputDependencyId, TaskId};
pub use schedule::Schedule;
pub use static_schedule::{StaticSchedule, StaticScheduleBuilder};
