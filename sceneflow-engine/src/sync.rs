// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use sceneflow_schedule::TaskId;

use crate::task::Task;

const UNDECIDED: u8 = 0;
const CLAIMED: u8 = 1;
const DONE: u8 = 2;

/// What a caller should do after attempting to claim a task id.
#[derive(Debug)]
pub enum Claim {
    /// The caller is the first to reach this task; it must run it.
    Claimed,
    /// The task is already claimed and not yet done; the caller must not
    /// run the task itself and instead joins it through [`TaskSyncTable::join`].
    Wait,
    /// The task already finished; the caller may proceed immediately.
    Done,
}

/// A join counter shared by every branch waiting on the same set of task
/// ids, modeled on TBB's reference-counted continuation.
///
/// A literal reading of "one waiters list per task id" would resume a task
/// joining on N dependencies N times, once per completing dependency. This
/// type makes that safe: every dependency's waiters list stores a clone of
/// the *same* `Continuation`, and only the call that decrements `remaining`
/// to zero returns the resumed task, so a multi-dependency join still
/// resumes exactly once.
struct Continuation {
    remaining: AtomicUsize,
    task: Mutex<Option<Task>>,
}

impl Continuation {
    fn new(remaining: usize, task: Task) -> Arc<Self> {
        Arc::new(Self { remaining: AtomicUsize::new(remaining), task: Mutex::new(Some(task)) })
    }

    /// Releases one dependency; returns the joined task if this was the
    /// last one.
    fn release(&self) -> Option<Task> {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 { self.task.lock().take() } else { None }
    }
}

#[derive(Default)]
struct Entry {
    state: AtomicU8,
    waiters: Mutex<Vec<Arc<Continuation>>>,
}

/// Tracks the Undecided/Claimed/Done state of task ids for one evaluation,
/// and the continuations waiting to resume once a given id reaches `Done`.
///
/// One `TaskSyncTable` covers a single task-id namespace (compute tasks,
/// inputs tasks, prep tasks, or keep tasks each get their own table, per
/// `Schedule`'s documented id-comparability rule). Entries are created
/// lazily on first touch, the same lazy-map pattern used elsewhere in this
/// crate family, since `Schedule` exposes no total task count to pre-size a
/// dense array with.
#[derive(Default)]
pub struct TaskSyncTable {
    entries: RwLock<HashMap<TaskId, Arc<Entry>>>,
}

impl TaskSyncTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: TaskId) -> Arc<Entry> {
        if let Some(entry) = self.entries.read().get(&id) {
            return Arc::clone(entry);
        }
        let mut entries = self.entries.write();
        Arc::clone(entries.entry(id).or_default())
    }

    /// Attempts to claim `id` on behalf of the caller.
    pub fn claim(&self, id: TaskId) -> Claim {
        let entry = self.entry(id);
        match entry.state.compare_exchange(UNDECIDED, CLAIMED, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => Claim::Claimed,
            Err(DONE) => Claim::Done,
            Err(_) => Claim::Wait,
        }
    }

    /// Registers `continuation` to resume once `id` reaches `Done`. Only
    /// call this after [`Self::claim`] returned [`Claim::Wait`] for `id`.
    ///
    /// The done-check and the push happen under the entry's own lock, the
    /// same lock `mark_done` drains under, so the two never race: either
    /// this sees `id` already `Done` and releases `continuation` itself
    /// without pushing, or it pushes before `mark_done` takes the lock and
    /// is guaranteed to be found by that drain. Without this, a
    /// check-then-push done outside the lock could have `mark_done` drain
    /// an empty list moments before the push lands, leaving `continuation`
    /// waiting forever.
    fn register_waiter(&self, id: TaskId, continuation: &Arc<Continuation>) -> Option<Task> {
        let entry = self.entry(id);
        let mut waiters = entry.waiters.lock();
        if entry.state.load(Ordering::Acquire) == DONE {
            drop(waiters);
            return continuation.release();
        }
        waiters.push(Arc::clone(continuation));
        None
    }

    /// Builds a join across `dependencies` for `successor`, claiming every
    /// id that is still Undecided and registering the rest as waiters.
    ///
    /// Returns the ids the caller must itself run (the Claimed ones) and,
    /// if every dependency resolved immediately, `successor` ready to run.
    pub fn join(&self, dependencies: &[TaskId], successor: Task) -> (Vec<TaskId>, Option<Task>) {
        if dependencies.is_empty() {
            return (Vec::new(), Some(successor));
        }

        let continuation = Continuation::new(dependencies.len(), successor);
        let mut to_run = Vec::new();
        let mut resumed = None;

        for &id in dependencies {
            match self.claim(id) {
                Claim::Claimed => to_run.push(id),
                Claim::Done => {
                    if let Some(task) = continuation.release() {
                        resumed = Some(task);
                    }
                }
                Claim::Wait => {
                    if let Some(task) = self.register_waiter(id, &continuation) {
                        resumed = Some(task);
                    }
                }
            }
        }

        (to_run, resumed)
    }

    /// Marks `id` as Done and returns every task newly ready to resume
    /// because this was the last dependency it was waiting on.
    pub fn mark_done(&self, id: TaskId) -> Vec<Task> {
        let entry = self.entry(id);
        entry.state.store(DONE, Ordering::Release);
        let waiters = std::mem::take(&mut *entry.waiters.lock());
        waiters.into_iter().filter_map(|w| w.release()).collect()
    }

    /// Returns whether `id` has finished.
    #[must_use]
    pub fn is_done(&self, id: TaskId) -> bool {
        self.entry(id).state.load(Ordering::Acquire) == DONE
    }
}
