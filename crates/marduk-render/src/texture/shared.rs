use crate::device::{FenceError, WgpuContext, WgpuFence};
use crate::sync::{ShareSynchronizer, UpdateScope, UsageScope};

/// A texture written by the worker context and sampled by other contexts on
/// the same device.
///
/// Readers bracket their use with [`begin_usage`](Self::begin_usage) /
/// `UsageScope::end_usage`; the writer does the same with
/// [`begin_update`](Self::begin_update).
pub struct SharedTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    size: (u32, u32),
    sync: ShareSynchronizer<WgpuFence>,
}

impl SharedTexture {
    pub fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        size: (u32, u32),
        label: &str,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.0.max(1),
                height: size.1.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            format,
            size,
            sync: ShareSynchronizer::new(),
        }
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn begin_update(&self, ctx: &mut WgpuContext) -> UpdateScope<'_, WgpuFence> {
        self.sync.begin_update(ctx)
    }

    pub fn begin_usage(&self, ctx: &mut WgpuContext) -> UsageScope<'_, WgpuFence> {
        self.sync.begin_usage(ctx)
    }

    /// Runs `read` between `begin_usage` and `end_usage`.
    pub fn with_usage<R>(
        &self,
        ctx: &mut WgpuContext,
        read: impl FnOnce(&mut WgpuContext, &wgpu::TextureView) -> R,
    ) -> Result<R, FenceError> {
        let scope = self.begin_usage(ctx);
        let result = read(ctx, &self.view);
        scope.end_usage(ctx)?;
        Ok(result)
    }

    /// Deletes outstanding fences and frees the GPU memory.
    pub fn destroy(&self, ctx: &mut WgpuContext) {
        self.sync.cleanup(ctx);
        self.texture.destroy();
    }
}
