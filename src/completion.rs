//! Completion tracking for the reader and worker threads.
//!
//! Each task registers before it starts and receives a `TaskHandle`. The
//! handle flips its slot from running to completed exactly once, either via
//! `complete()` or when dropped, so an early return still counts. A panic
//! counts the same way only in builds that unwind; with `panic = "abort"`
//! (the release profile) the process ends instead. `wait_all` blocks until
//! no registered task is left running; a task that finished before the wait
//! began is observed as finished.
//!
//! `state`, `is_completed`, `running` and `wait_all_timeout` only inspect the
//! slots. The pipeline itself needs `wait_all` alone; workers learn that the
//! reader finished from the queue closing.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Reader,
    Worker(usize),
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Reader => write!(f, "reader"),
            TaskKind::Worker(id) => write!(f, "worker {}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Completed,
}

#[derive(Debug, Default)]
struct Slots {
    tasks: Vec<(TaskKind, TaskState)>,
    running: usize,
}

#[derive(Debug, Default)]
pub struct Completion {
    slots: Mutex<Slots>,
    done: Condvar,
}

impl Completion {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a running task. Register every task before calling `wait_all`.
    pub fn register(self: &Arc<Self>, kind: TaskKind) -> TaskHandle {
        let mut slots = self.lock();
        let id = TaskId(slots.tasks.len());
        slots.tasks.push((kind, TaskState::Running));
        slots.running += 1;
        TaskHandle {
            id,
            kind,
            completion: Arc::clone(self),
            finished: false,
        }
    }

    /// Current state of `id`, or `None` if it was never registered here.
    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.lock().tasks.get(id.0).map(|(_, state)| *state)
    }

    pub fn is_completed(&self, id: TaskId) -> bool {
        self.state(id) == Some(TaskState::Completed)
    }

    pub fn running(&self) -> usize {
        self.lock().running
    }

    /// Block until every registered task has completed.
    pub fn wait_all(&self) {
        let slots = self.lock();
        let _slots = self
            .done
            .wait_while(slots, |s| s.running > 0)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Like `wait_all`, giving up after `timeout`. Returns whether all tasks finished.
    pub fn wait_all_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut slots = self.lock();
        while slots.running > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            slots = self
                .done
                .wait_timeout(slots, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    fn finish(&self, id: TaskId) {
        let mut slots = self.lock();
        let Some(slot) = slots.tasks.get_mut(id.0) else {
            return;
        };
        if slot.1 == TaskState::Completed {
            return;
        }
        slot.1 = TaskState::Completed;
        slots.running -= 1;
        if slots.running == 0 {
            self.done.notify_all();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Write-once completion signal owned by one task.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    kind: TaskKind,
    completion: Arc<Completion>,
    finished: bool,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn complete(mut self) {
        self.mark();
    }

    fn mark(&mut self) {
        if !self.finished {
            self.finished = true;
            log::debug!("{} completed", self.kind);
            self.completion.finish(self.id);
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.mark();
    }
}
