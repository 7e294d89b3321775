use std::fmt;

/// Failure to create a GPU fence.
///
/// Fence exhaustion is never treated as "already signaled": the caller of
/// `end_update`/`end_usage` receives this error and must report it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FenceError {
    /// The backend ran out of sync objects.
    Exhausted,
    /// The context was lost; no further GPU work can be recorded.
    ContextLost,
}

impl fmt::Display for FenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FenceError::Exhausted => f.write_str("out of GPU sync objects"),
            FenceError::ContextLost => f.write_str("GPU context lost while creating a fence"),
        }
    }
}

impl std::error::Error for FenceError {}

/// Failure to bind or initialize the worker's GPU context.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ContextError {
    /// The device was lost; stages are skipped until the renderer is rebuilt.
    Lost,
    /// One-time initialization (function loading, debug hookup) failed.
    Initialization(String),
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::Lost => f.write_str("GPU context lost"),
            ContextError::Initialization(msg) => {
                write!(f, "GPU context initialization failed: {msg}")
            }
        }
    }
}

impl std::error::Error for ContextError {}
