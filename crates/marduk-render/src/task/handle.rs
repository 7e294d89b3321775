use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};

use crate::device::GpuContext;

use super::{EvaluationType, PendingUpdate, Task, TaskState};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a task; used for queue membership.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

pub(crate) struct TaskCell<T: ?Sized> {
    id: TaskId,
    state: AtomicU8,
    updates: AtomicU64,
    pending: Mutex<PendingUpdate>,
    task: Mutex<T>,
}

/// Caller-owned handle to a task.
///
/// Clones share the task. The renderer keeps a clone only while the task is
/// queued or in flight, plus a weak reference while the task holds GPU
/// resources, so dropping every caller handle after `release` frees it.
///
/// The task itself is reached through [`lock`](Self::lock). Never hold the
/// guard across a renderer call that waits on the worker (`release`,
/// `wait_events`, `wait_idle`, `shutdown`): the worker needs the lock to run
/// the task's stages.
pub struct TaskHandle<T: ?Sized> {
    cell: Arc<TaskCell<T>>,
}

pub(crate) type ErasedTask<C> = TaskHandle<dyn Task<C>>;

impl<T> TaskHandle<T> {
    pub fn new(task: T) -> Self {
        Self {
            cell: Arc::new(TaskCell {
                id: TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)),
                state: AtomicU8::new(TaskState::Idle.to_u8()),
                updates: AtomicU64::new(0),
                pending: Mutex::new(PendingUpdate::default()),
                task: Mutex::new(task),
            }),
        }
    }

    pub(crate) fn erase<C>(&self) -> ErasedTask<C>
    where
        C: GpuContext,
        T: Task<C>,
    {
        let cell: Arc<TaskCell<dyn Task<C>>> = self.cell.clone();
        TaskHandle { cell }
    }
}

impl<T: ?Sized> TaskHandle<T> {
    pub fn id(&self) -> TaskId {
        self.cell.id
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.cell.state.load(Ordering::Acquire))
    }

    /// Number of completed `finish()` calls.
    pub fn updates(&self) -> u64 {
        self.cell.updates.load(Ordering::Acquire)
    }

    /// Locks the task for direct access (results, inputs).
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.cell.task.lock()
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.cell.task.try_lock()
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.cell.state.store(state.to_u8(), Ordering::Release);
    }

    pub(crate) fn mark_finished(&self) {
        self.cell.updates.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn merge_pending(&self, items_changed: bool, evaluation: EvaluationType) {
        self.cell.pending.lock().merge(items_changed, evaluation);
    }

    pub(crate) fn take_pending(&self) -> Option<(bool, EvaluationType)> {
        self.cell.pending.lock().take()
    }

    pub(crate) fn clear_pending(&self) {
        let _ = self.take_pending();
    }

    pub(crate) fn downgrade(&self) -> Weak<TaskCell<T>> {
        Arc::downgrade(&self.cell)
    }

    pub(crate) fn from_cell(cell: Arc<TaskCell<T>>) -> Self {
        Self { cell }
    }
}

impl<T: ?Sized> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: ?Sized> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("updates", &self.updates())
            .finish()
    }
}
