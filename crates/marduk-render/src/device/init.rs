/// Initialization parameters for the worker's wgpu context.
///
/// There is no window: the context renders into an offscreen surface, and
/// previews display results through contexts created with
/// `WgpuContext::share`.
#[derive(Debug, Clone)]
pub struct GpuInit {
    /// Prefer an sRGB format for the offscreen surface.
    pub prefer_srgb: bool,

    /// Adapter selection preference.
    pub power_preference: wgpu::PowerPreference,

    /// Required wgpu features. Empty by default.
    pub required_features: wgpu::Features,

    /// Limits requested from the adapter/device.
    pub required_limits: wgpu::Limits,

    /// Size of the offscreen surface in physical pixels.
    pub surface_size: (u32, u32),

    /// Debug label applied to the device.
    pub label: &'static str,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            prefer_srgb: true,
            power_preference: wgpu::PowerPreference::HighPerformance,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            surface_size: (1, 1),
            label: "marduk-render device",
        }
    }
}
