/// Offscreen render target the worker context is bound to.
///
/// Created together with the context on the owning thread and moved with it.
pub struct OffscreenSurface {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    size: (u32, u32),
}

impl OffscreenSurface {
    pub(crate) fn new(device: &wgpu::Device, format: wgpu::TextureFormat, size: (u32, u32)) -> Self {
        let (texture, view) = create_target(device, format, size);
        Self {
            texture,
            view,
            format,
            size,
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

    /// Current size in physical pixels.
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Recreates the target after a resize.
    ///
    /// A 0x0 target cannot be created; in that case only the recorded size is
    /// updated and recreation is deferred.
    pub fn resize(&mut self, device: &wgpu::Device, new_size: (u32, u32)) {
        self.size = new_size;
        if new_size.0 == 0 || new_size.1 == 0 {
            return;
        }

        let (texture, view) = create_target(device, self.format, new_size);
        self.texture = texture;
        self.view = view;
    }
}

pub(crate) fn choose_surface_format(prefer_srgb: bool) -> wgpu::TextureFormat {
    if prefer_srgb {
        wgpu::TextureFormat::Rgba8UnormSrgb
    } else {
        wgpu::TextureFormat::Rgba8Unorm
    }
}

fn create_target(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    size: (u32, u32),
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("marduk offscreen surface"),
        size: wgpu::Extent3d {
            width: size.0.max(1),
            height: size.1.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}
