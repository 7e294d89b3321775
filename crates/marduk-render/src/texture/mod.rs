//! Textures written by the render worker and read by other contexts.
//!
//! - `SharedTexture` pairs a wgpu texture with the fences that order its
//!   writes against reads from contexts created with `WgpuContext::share`.
//! - `TextureUpload` is a task that uploads CPU pixels into one.

mod shared;
mod upload;

pub use shared::SharedTexture;
pub use upload::{Image, Rgba8, TextureUpload};
