use std::sync::Arc;

use anyhow::{Result, ensure};
use bytemuck::{Pod, Zeroable};

use crate::device::{Diagnostic, WgpuContext};
use crate::task::{EvaluationType, Task};

use super::SharedTexture;

/// One RGBA8 texel.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Pod, Zeroable)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Row-major RGBA8 pixels.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Image {
    size: (u32, u32),
    pixels: Vec<Rgba8>,
}

impl Image {
    pub fn new(size: (u32, u32), pixels: Vec<Rgba8>) -> Result<Self> {
        ensure!(size.0 > 0 && size.1 > 0, "image has zero size");
        let expected = size.0 as usize * size.1 as usize;
        ensure!(
            pixels.len() == expected,
            "{}x{} image needs {expected} pixels, got {}",
            size.0,
            size.1,
            pixels.len()
        );
        Ok(Self { size, pixels })
    }

    pub fn filled(size: (u32, u32), color: Rgba8) -> Result<Self> {
        Self::new(size, vec![color; size.0 as usize * size.1 as usize])
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn pixels(&self) -> &[Rgba8] {
        &self.pixels
    }
}

/// Uploads an [`Image`] into a [`SharedTexture`] on the render worker.
///
/// The UI thread edits the image through [`set_image`](Self::set_image) and
/// calls `Renderer::update`; the upload snapshots it in `prepare`, so later
/// edits do not race the worker. Readers pick up the texture from
/// [`shared`](Self::shared) after `finish`.
pub struct TextureUpload {
    label: String,
    format: wgpu::TextureFormat,

    image: Option<Image>,
    snapshot: Option<Image>,
    recreate: bool,

    shared: Option<Arc<SharedTexture>>,
    failure: Option<String>,
    last_error: Option<String>,
    uploads: u64,
}

impl TextureUpload {
    pub fn new(label: impl Into<String>, format: wgpu::TextureFormat) -> Self {
        Self {
            label: label.into(),
            format,
            image: None,
            snapshot: None,
            recreate: false,
            shared: None,
            failure: None,
            last_error: None,
            uploads: 0,
        }
    }

    /// Replaces the image; takes effect on the next update with
    /// `items_changed`.
    pub fn set_image(&mut self, image: Image) {
        self.image = Some(image);
    }

    /// Texture of the most recent successful upload.
    ///
    /// A reader may keep the returned texture across updates; it stays valid
    /// until the reader drops it, but a resize or reset uploads into a new
    /// texture, so re-fetch after each `finish`.
    pub fn shared(&self) -> Option<Arc<SharedTexture>> {
        self.shared.clone()
    }

    /// Error reported by the most recent run, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Number of completed uploads.
    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    fn needs_new_texture(&self, size: (u32, u32)) -> bool {
        self.recreate
            || self
                .shared
                .as_ref()
                .is_none_or(|shared| shared.size() != size || shared.format() != self.format)
    }
}

impl Task<WgpuContext> for TextureUpload {
    fn prepare(&mut self, items_changed: bool, evaluation: EvaluationType) {
        if items_changed || self.snapshot.is_none() {
            self.snapshot = self.image.clone();
        }
        self.recreate = evaluation == EvaluationType::Reset;
    }

    fn configure(&mut self, ctx: &mut WgpuContext) {
        let Some(size) = self.snapshot.as_ref().map(Image::size) else {
            return;
        };
        if !self.needs_new_texture(size) {
            return;
        }

        if let Some(old) = self.shared.take() {
            retire(old, |texture| texture.destroy(ctx));
        }
        log::debug!("{}: creating {}x{} shared texture", self.label, size.0, size.1);
        self.shared = Some(Arc::new(SharedTexture::new(
            ctx.device(),
            self.format,
            size,
            &self.label,
        )));
    }

    fn render(&mut self, ctx: &mut WgpuContext) {
        let (Some(shared), Some(image)) = (self.shared.clone(), self.snapshot.as_ref()) else {
            return;
        };
        let (width, height) = image.size();

        let scope = shared.begin_update(ctx);
        ctx.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: shared.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(image.pixels()),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        if let Err(err) = scope.end_update(ctx) {
            self.failure = Some(format!("{}: upload not fenced: {err}", self.label));
        }
    }

    fn finish(&mut self, diagnostic: Option<Diagnostic>) {
        self.last_error = self
            .failure
            .take()
            .or_else(|| diagnostic.map(|d| d.to_string()));

        match &self.last_error {
            Some(err) => log::warn!("{}: {err}", self.label),
            None if self.shared.is_some() => self.uploads += 1,
            None => {}
        }
    }

    fn release(&mut self, ctx: &mut WgpuContext) {
        if let Some(shared) = self.shared.take() {
            retire(shared, |texture| texture.destroy(ctx));
        }
        self.recreate = false;
    }
}

/// Destroys `shared` now if nobody else holds it; otherwise the last reader
/// frees it on drop. Returns whether it was destroyed.
fn retire<T>(shared: Arc<T>, destroy: impl FnOnce(T)) -> bool {
    match Arc::try_unwrap(shared) {
        Ok(texture) => {
            destroy(texture);
            true
        }
        Err(_) => {
            log::debug!("shared texture still read elsewhere; freed with its last reference");
            false
        }
    }
}
