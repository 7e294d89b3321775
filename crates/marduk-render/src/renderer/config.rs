use std::fmt;
use std::sync::Arc;

/// Callback invoked on the worker thread after each reply is posted.
///
/// Lets an event loop (e.g. through a winit `EventLoopProxy`) schedule a
/// call to `Renderer::process_events` on the UI thread.
pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// Renderer configuration.
#[derive(Clone)]
pub struct RendererConfig {
    /// Name of the worker thread.
    pub thread_name: String,

    /// Optional wake-up hook for the owning event loop.
    pub waker: Option<Waker>,
}

pub(crate) const DEFAULT_THREAD_NAME: &str = "marduk-render";

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            waker: None,
        }
    }
}

impl RendererConfig {
    pub fn with_waker(mut self, waker: impl Fn() + Send + Sync + 'static) -> Self {
        self.waker = Some(Arc::new(waker));
        self
    }
}

impl fmt::Debug for RendererConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererConfig")
            .field("thread_name", &self.thread_name)
            .field("waker", &self.waker.is_some())
            .finish()
    }
}
