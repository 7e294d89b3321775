use super::{ContextError, DebugMessage, FenceError};

/// Fence operations of a GPU context.
///
/// A fence marks a point in a context's command stream. Another context that
/// waits on it will not execute later work before everything submitted ahead
/// of the fence has completed on the GPU.
///
/// Contexts that share resources must agree on the fence type; a
/// [`ShareSynchronizer`](crate::sync::ShareSynchronizer) is generic over it.
pub trait FenceContext {
    type Fence: Send + 'static;

    /// Inserts a fence after all previously submitted commands.
    fn insert_fence(&mut self) -> Result<Self::Fence, FenceError>;

    /// Makes subsequent work of this context wait for `fence`.
    ///
    /// Blocks the calling thread only as long as the backend needs to
    /// establish GPU-side ordering.
    fn wait_fence(&mut self, fence: &Self::Fence);

    /// Destroys a fence that is no longer waited on.
    fn delete_fence(&mut self, fence: Self::Fence);

    /// Pushes recorded commands to the GPU so inserted fences eventually signal.
    fn flush(&mut self);
}

/// The context owned by the render worker.
///
/// The context (and the surface it is bound to) is created by the caller and
/// moved into the worker thread; the worker hands it back when the renderer
/// shuts down. It is only ever touched from one thread at a time.
pub trait GpuContext: FenceContext + Send + 'static {
    /// Binds the context (and its surface) to the calling thread.
    fn make_current(&mut self) -> Result<(), ContextError>;

    /// Unbinds the context from the calling thread.
    fn done_current(&mut self);

    /// One-time setup performed before the first render: function loading,
    /// debug message hookup.
    fn initialize(&mut self) -> Result<(), ContextError>;

    /// Returns debug messages collected since the previous call.
    fn take_debug_messages(&mut self) -> Vec<DebugMessage>;

    /// Detaches debug hooks before the context migrates back to its owner.
    fn shutdown(&mut self) {}
}
