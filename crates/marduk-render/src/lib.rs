//! Marduk render scheduler.
//!
//! Runs render tasks one at a time on a dedicated GPU worker thread:
//!
//! - `device`: the GPU context contract and its wgpu backend
//! - `task`: the multi-stage task lifecycle
//! - `renderer`: the UI-thread scheduler and its worker
//! - `sync`: fence ordering for resources shared between contexts, and the
//!   release rendezvous
//! - `texture`: a shared texture and a task that uploads into it

pub mod device;
pub mod logging;
pub mod renderer;
pub mod sync;
pub mod task;
pub mod texture;

#[cfg(test)]
mod testing;

pub use device::{GpuContext, WgpuContext};
pub use renderer::{Renderer, RendererConfig};
pub use task::{EvaluationType, Task, TaskHandle, TaskState};
