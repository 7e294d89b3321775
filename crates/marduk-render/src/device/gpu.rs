use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{Context, Result};
use parking_lot::Mutex;

use super::surface::{self, OffscreenSurface};
use super::{ContextError, DebugMessage, FenceContext, FenceError, GpuContext, GpuInit, Severity};

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

/// Fence of a [`WgpuContext`].
///
/// Signaled from the queue's work-done callback. wgpu resources cannot cross
/// devices, so fences are only exchanged between contexts created with
/// [`WgpuContext::share`], whose submissions the common queue already orders.
pub struct WgpuFence {
    queue_id: u64,
    signaled: Arc<AtomicBool>,
}

impl WgpuFence {
    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }
}

/// How a context waits on a fence.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum FenceWait {
    /// Same queue: later submissions already execute after the fence.
    Ordered,
    /// Another device; nothing of this context can depend on it.
    Foreign,
}

fn fence_wait(own_queue: u64, fence_queue: u64) -> FenceWait {
    if own_queue == fence_queue {
        FenceWait::Ordered
    } else {
        FenceWait::Foreign
    }
}

/// Owns wgpu core objects and the offscreen surface of the render worker.
///
/// This type is the low-level rendering context:
/// - creates and stores Instance/Adapter/Device/Queue
/// - creates the offscreen surface the worker renders into
/// - implements fences and debug message collection for the worker
pub struct WgpuContext {
    /// wgpu instance used to create the adapter.
    instance: Arc<wgpu::Instance>,

    /// Selected adapter.
    adapter: Arc<wgpu::Adapter>,

    /// Logical device.
    device: Arc<wgpu::Device>,

    /// Command queue.
    queue: Arc<wgpu::Queue>,

    /// Identifies the queue for fence ordering; shared by `share()`d contexts.
    queue_id: u64,

    /// Render target the context is bound to.
    surface: OffscreenSurface,

    /// Uncaptured device errors, drained by the worker after each render.
    messages: Arc<Mutex<Vec<DebugMessage>>>,

    /// Set by the device-lost callback.
    lost: Arc<AtomicBool>,

    debug_hooked: bool,
}

impl WgpuContext {
    /// Creates a context on the calling thread, blocking on adapter/device
    /// acquisition.
    pub fn new(init: GpuInit) -> Result<Self> {
        pollster::block_on(Self::request(init))
    }

    /// Creates a context.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn request(init: GpuInit) -> Result<Self> {
        let (width, height) = init.surface_size;
        anyhow::ensure!(width > 0 && height > 0, "offscreen surface has zero size");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(init.label),
                required_features: init.required_features,
                required_limits: init.required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let format = surface::choose_surface_format(init.prefer_srgb);
        let surface = OffscreenSurface::new(&device, format, init.surface_size);

        log::info!(
            "created wgpu context on {:?} ({width}x{height} {format:?})",
            adapter.get_info().backend
        );

        Ok(Self {
            instance: Arc::new(instance),
            adapter: Arc::new(adapter),
            device: Arc::new(device),
            queue: Arc::new(queue),
            queue_id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            surface,
            messages: Arc::new(Mutex::new(Vec::new())),
            lost: Arc::new(AtomicBool::new(false)),
            debug_hooked: false,
        })
    }

    /// Creates a second context on the same device and queue with its own
    /// surface, e.g. for a preview that displays textures the worker renders.
    ///
    /// Fences of shared contexts are interchangeable.
    pub fn share(&self, surface_size: (u32, u32)) -> Self {
        let surface = OffscreenSurface::new(&self.device, self.surface.format(), surface_size);
        Self {
            instance: Arc::clone(&self.instance),
            adapter: Arc::clone(&self.adapter),
            device: Arc::clone(&self.device),
            queue: Arc::clone(&self.queue),
            queue_id: self.queue_id,
            surface,
            messages: Arc::clone(&self.messages),
            lost: Arc::clone(&self.lost),
            debug_hooked: false,
        }
    }

    /// Returns a reference to the logical device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the command queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    pub fn surface(&self) -> &OffscreenSurface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> (&wgpu::Device, &mut OffscreenSurface) {
        (&self.device, &mut self.surface)
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }
}

impl FenceContext for WgpuContext {
    type Fence = WgpuFence;

    fn insert_fence(&mut self) -> Result<WgpuFence, FenceError> {
        if self.is_lost() {
            return Err(FenceError::ContextLost);
        }

        // Flushes pending queue writes; the callback fires once this
        // submission completes.
        self.queue.submit(std::iter::empty());

        let signaled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&signaled);
        self.queue
            .on_submitted_work_done(move || flag.store(true, Ordering::Release));

        Ok(WgpuFence {
            queue_id: self.queue_id,
            signaled,
        })
    }

    fn wait_fence(&mut self, fence: &WgpuFence) {
        if fence_wait(self.queue_id, fence.queue_id) == FenceWait::Foreign {
            log::warn!("ignoring fence from another device; share contexts with WgpuContext::share");
        }
    }

    fn delete_fence(&mut self, fence: WgpuFence) {
        drop(fence);
    }

    fn flush(&mut self) {
        // Drives work-done callbacks.
        if let Err(err) = self.device.poll(wgpu::PollType::Poll) {
            log::debug!("poll after flush failed: {err}");
        }
    }
}

impl GpuContext for WgpuContext {
    fn make_current(&mut self) -> Result<(), ContextError> {
        if self.is_lost() {
            return Err(ContextError::Lost);
        }
        Ok(())
    }

    fn done_current(&mut self) {}

    fn initialize(&mut self) -> Result<(), ContextError> {
        if self.debug_hooked {
            return Ok(());
        }

        let messages = Arc::clone(&self.messages);
        self.device.on_uncaptured_error(Arc::new(move |error: wgpu::Error| {
            messages
                .lock()
                .push(DebugMessage::new(Severity::High, error.to_string()));
        }));

        let lost = Arc::clone(&self.lost);
        self.device
            .set_device_lost_callback(move |reason, message| {
                log::error!("wgpu device lost ({reason:?}): {message}");
                lost.store(true, Ordering::Release);
            });

        self.debug_hooked = true;
        log::debug!("wgpu debug output attached");
        Ok(())
    }

    fn take_debug_messages(&mut self) -> Vec<DebugMessage> {
        std::mem::take(&mut *self.messages.lock())
    }

    fn shutdown(&mut self) {
        if std::mem::replace(&mut self.debug_hooked, false) {
            self.messages.lock().clear();
            log::debug!("wgpu debug output detached");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_queue_fences_need_no_wait() {
        assert_eq!(fence_wait(3, 3), FenceWait::Ordered);
    }

    #[test]
    fn fences_of_another_device_are_foreign() {
        assert_eq!(fence_wait(3, 4), FenceWait::Foreign);
    }
}
