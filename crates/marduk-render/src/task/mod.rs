//! Render task lifecycle contract.
//!
//! A task is driven through its stages by the [`Renderer`](crate::renderer::Renderer)
//! and its worker, never by the task itself:
//!
//! | stage        | thread | when                                           |
//! |--------------|--------|------------------------------------------------|
//! | `prepare`    | UI     | on `Renderer::update`, before queueing         |
//! | `configure`  | worker | when dispatched                                |
//! | `configured` | UI     | after `configure`, before `render` is sent     |
//! | `render`     | worker | after `configured`                             |
//! | `finish`     | UI     | after `render`; frees the renderer             |
//! | `release`    | worker | on `Renderer::release` or renderer shutdown    |

mod handle;

pub use handle::{TaskHandle, TaskId};
pub(crate) use handle::{ErasedTask, TaskCell};

use crate::device::{Diagnostic, GpuContext};

/// How eagerly the task should re-evaluate its inputs.
///
/// Ordered by strength; coalesced updates keep the strongest request.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum EvaluationType {
    /// Inputs unchanged; re-render with the existing snapshot.
    #[default]
    Steady,
    /// Periodic re-evaluation (animation, auto evaluation).
    Automatic,
    /// Explicitly requested by the user.
    Manual,
    /// Discard accumulated state and evaluate from scratch.
    Reset,
}

/// Where a task is in its lifecycle.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TaskState {
    Idle,
    Queued,
    Configuring,
    RenderPending,
    Rendering,
    Finishing,
}

impl TaskState {
    /// Between dispatch and the end of `finish()`.
    pub fn is_in_flight(self) -> bool {
        !matches!(self, TaskState::Idle | TaskState::Queued)
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            TaskState::Idle => 0,
            TaskState::Queued => 1,
            TaskState::Configuring => 2,
            TaskState::RenderPending => 3,
            TaskState::Rendering => 4,
            TaskState::Finishing => 5,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => TaskState::Queued,
            2 => TaskState::Configuring,
            3 => TaskState::RenderPending,
            4 => TaskState::Rendering,
            5 => TaskState::Finishing,
            _ => TaskState::Idle,
        }
    }
}

/// A unit of GPU work with a fixed multi-stage lifecycle.
///
/// Stages must not panic; failures (shader compile errors, fence exhaustion)
/// are recorded inside the task and reported from `finish`. The renderer
/// never interprets them and always moves on to the next task.
///
/// Worker-side stages receive the context only for the duration of the call.
/// UI-side stages must not block on the worker.
pub trait Task<C: GpuContext>: Send + 'static {
    /// Snapshots whatever UI-owned state later stages need. Must not touch the GPU.
    fn prepare(&mut self, items_changed: bool, evaluation: EvaluationType) {
        let _ = (items_changed, evaluation);
    }

    /// Allocates or validates GPU objects needed for rendering.
    fn configure(&mut self, ctx: &mut C) {
        let _ = ctx;
    }

    /// Reacts to configuration results before GPU work begins. Must be fast.
    fn configured(&mut self) {}

    /// Submits the GPU work.
    fn render(&mut self, ctx: &mut C);

    /// Publishes results. `diagnostic` carries the first high severity debug
    /// message observed during `configure`/`render`.
    fn finish(&mut self, diagnostic: Option<Diagnostic>);

    /// Frees all GPU objects owned by the task.
    fn release(&mut self, ctx: &mut C);
}

/// Updates requested while the task was queued or in flight.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub(crate) struct PendingUpdate {
    items_changed: bool,
    evaluation: Option<EvaluationType>,
}

impl PendingUpdate {
    pub(crate) fn merge(&mut self, items_changed: bool, evaluation: EvaluationType) {
        self.items_changed |= items_changed;
        if evaluation != EvaluationType::Steady {
            self.evaluation = self.evaluation.max(Some(evaluation));
        }
    }

    pub(crate) fn take(&mut self) -> Option<(bool, EvaluationType)> {
        let pending = std::mem::take(self);
        (pending.items_changed || pending.evaluation.is_some()).then(|| {
            (
                pending.items_changed,
                pending.evaluation.unwrap_or(EvaluationType::Steady),
            )
        })
    }
}
