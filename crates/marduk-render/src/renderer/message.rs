use crate::device::{Diagnostic, GpuContext};
use crate::sync::SignalOnDrop;
use crate::task::{ErasedTask, TaskId};

/// UI thread → worker.
pub(crate) enum Request<C: GpuContext> {
    Configure(ErasedTask<C>),
    Render(ErasedTask<C>),
    /// Signals the rendezvous once the task's resources are gone.
    Release(ErasedTask<C>, SignalOnDrop),
    Stop,
}

/// Worker → UI thread.
#[derive(Debug)]
pub(crate) enum Reply {
    Configured(TaskId),
    Rendered(TaskId, Option<Diagnostic>),
}
