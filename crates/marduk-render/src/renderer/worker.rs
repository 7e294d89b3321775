use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

use crate::device::{DebugMessage, Diagnostic, GpuContext, Severity};
use crate::sync::SignalOnDrop;
use crate::task::{ErasedTask, TaskId};

use super::config::Waker;
use super::message::{Reply, Request};

/// Render-thread side of the renderer.
///
/// Owns the GPU context for the lifetime of the thread and hands it back
/// through the join handle on `Stop`. Requests are served strictly in
/// arrival order; the renderer guarantees at most one configure/render
/// request is outstanding.
pub(crate) struct Worker<C: GpuContext> {
    context: C,
    initialized: bool,
    /// Debug output of the current task's `configure`, reported with its render.
    carried: Vec<DebugMessage>,
    replies: Sender<Reply>,
    waker: Option<Waker>,
}

impl<C: GpuContext> Worker<C> {
    pub(crate) fn spawn(
        context: C,
        thread_name: String,
        requests: Receiver<Request<C>>,
        replies: Sender<Reply>,
        waker: Option<Waker>,
    ) -> std::io::Result<JoinHandle<C>> {
        thread::Builder::new().name(thread_name).spawn(move || {
            let worker = Worker {
                context,
                initialized: false,
                carried: Vec::new(),
                replies,
                waker,
            };
            worker.run(requests)
        })
    }

    fn run(mut self, requests: Receiver<Request<C>>) -> C {
        log::info!("render worker started");

        for request in requests.iter() {
            match request {
                Request::Configure(task) => self.configure(task),
                Request::Render(task) => self.render(task),
                Request::Release(task, done) => self.release(task, done),
                Request::Stop => break,
            }
        }

        self.stop()
    }

    fn configure(&mut self, task: ErasedTask<C>) {
        let id = task.id();
        log::trace!("configure {id}");

        self.carried.clear();
        match self.context.make_current() {
            Ok(()) => {
                let context = &mut self.context;
                run_stage(id, "configure", || task.lock().configure(context));
                self.carried = self.context.take_debug_messages();
                self.context.done_current();
            }
            Err(err) => {
                log::error!("skipping configure of {id}: {err}");
                self.carried
                    .push(DebugMessage::new(Severity::High, err.to_string()));
            }
        }

        drop(task);
        self.reply(Reply::Configured(id));
    }

    fn render(&mut self, task: ErasedTask<C>) {
        let id = task.id();
        log::trace!("render {id}");

        let mut messages = std::mem::take(&mut self.carried);
        match self.context.make_current() {
            Ok(()) => {
                if !std::mem::replace(&mut self.initialized, true) {
                    self.initialize();
                }

                let context = &mut self.context;
                run_stage(id, "render", || task.lock().render(context));
                messages.extend(self.context.take_debug_messages());
                self.context.done_current();
            }
            Err(err) => {
                log::error!("skipping render of {id}: {err}");
                messages.push(DebugMessage::new(Severity::High, err.to_string()));
            }
        }

        // The renderer may drop its last handle as soon as the reply lands.
        drop(task);
        self.reply(Reply::Rendered(id, Diagnostic::from_messages(messages)));
    }

    fn release(&mut self, task: ErasedTask<C>, done: SignalOnDrop) {
        let id = task.id();
        log::trace!("release {id}");

        match self.context.make_current() {
            Ok(()) => {
                let context = &mut self.context;
                run_stage(id, "release", || task.lock().release(context));
                if let Some(diag) = Diagnostic::from_messages(self.context.take_debug_messages()) {
                    log::warn!("while releasing {id}: {diag}");
                }
                self.context.done_current();
            }
            Err(err) => log::error!("releasing {id} without a context: {err}"),
        }

        // Dropping the task clone before signaling lets the caller destroy it.
        drop(task);
        drop(done);
    }

    fn initialize(&mut self) {
        match self.context.initialize() {
            Ok(()) => log::debug!("render context initialized"),
            Err(err) => log::error!("render context initialization failed: {err}"),
        }
    }

    fn stop(mut self) -> C {
        if self.context.make_current().is_ok() {
            self.context.shutdown();
            self.context.done_current();
        }
        log::info!("render worker stopped");
        self.context
    }

    fn reply(&self, reply: Reply) {
        if self.replies.send(reply).is_err() {
            log::debug!("renderer gone; reply dropped");
            return;
        }
        if let Some(waker) = &self.waker {
            waker();
        }
    }
}

/// Runs a task stage, containing panics so the worker keeps serving.
fn run_stage(id: TaskId, stage: &str, f: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        log::error!("{stage} of {id} panicked: {msg}");
    }
}
