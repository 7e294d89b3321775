//! GPU context contract and the wgpu backend.
//!
//! This module is responsible for:
//! - the `GpuContext`/`FenceContext` traits the render worker drives
//! - debug messages and the per-render `Diagnostic`
//! - creating the wgpu Instance/Adapter/Device/Queue and offscreen surface

mod context;
mod debug;
mod error;
mod gpu;
mod init;
mod surface;

pub use context::{FenceContext, GpuContext};
pub use debug::{DebugMessage, Diagnostic, Severity};
pub use error::{ContextError, FenceError};
pub use gpu::{WgpuContext, WgpuFence};
pub use init::GpuInit;
pub use surface::OffscreenSurface;
