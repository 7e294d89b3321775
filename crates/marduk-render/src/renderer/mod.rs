//! Render task scheduler.
//!
//! The `Renderer` lives on the UI thread and owns one worker thread, which in
//! turn owns the GPU context. Tasks are dispatched one at a time in FIFO
//! order:
//!
//! ```text
//! submit ─► pending ─► Configure ─► (worker) configure ─► Configured
//!                                                            │
//!                 finish ◄─ Rendered ◄─ (worker) render ◄─ configured, Render
//!                   │
//!                   └─► next pending task
//! ```
//!
//! Replies are plain channel messages; the owner delivers them by calling
//! [`Renderer::process_events`] from its event loop (optionally woken by
//! [`RendererConfig::waker`]) or by blocking in [`Renderer::wait_events`].

mod config;
mod message;
mod worker;

pub use config::{RendererConfig, Waker};

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::device::GpuContext;
use crate::sync::{Rendezvous, SignalOnDrop};
use crate::task::{ErasedTask, EvaluationType, Task, TaskCell, TaskHandle, TaskId, TaskState};

use message::{Reply, Request};
use worker::Worker;

struct InFlight<C: GpuContext> {
    task: ErasedTask<C>,
    /// A release is waiting for this task; its UI-side stages are skipped.
    releasing: bool,
}

/// UI-thread façade over the render worker.
pub struct Renderer<C: GpuContext> {
    requests: Option<Sender<Request<C>>>,
    replies: Receiver<Reply>,
    worker: Option<JoinHandle<C>>,

    pending: VecDeque<ErasedTask<C>>,
    current: Option<InFlight<C>>,

    /// Tasks that reached the worker and were not released yet.
    resident: HashMap<TaskId, Weak<TaskCell<dyn Task<C>>>>,

    shut_down: bool,
}

impl<C: GpuContext> Renderer<C> {
    /// Moves `context` (created and configured by the caller) onto a new
    /// worker thread.
    pub fn new(context: C, config: RendererConfig) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::channel();
        let (reply_tx, reply_rx) = mpsc::channel();

        let worker = Worker::spawn(context, config.thread_name, request_rx, reply_tx, config.waker)
            .context("failed to spawn render worker thread")?;

        Ok(Self {
            requests: Some(request_tx),
            replies: reply_rx,
            worker: Some(worker),
            pending: VecDeque::new(),
            current: None,
            resident: HashMap::new(),
            shut_down: false,
        })
    }

    // ── submission ────────────────────────────────────────────────────────

    /// Prepares and queues `task`, dispatching it if nothing is in flight.
    /// Never blocks.
    ///
    /// The task is prepared as if its items had changed.
    ///
    /// # Panics
    /// Panics if the task is already queued or in flight.
    pub fn submit<T: Task<C>>(&mut self, task: &TaskHandle<T>) {
        let task: ErasedTask<C> = task.erase();
        if self.shut_down {
            log::debug!("renderer shut down; ignoring submission of {}", task.id());
            return;
        }

        let id = task.id();
        assert!(
            !self.is_scheduled(id),
            "{id} submitted while already queued or in flight"
        );

        task.lock().prepare(true, EvaluationType::Steady);
        self.enqueue(task);
    }

    /// Prepares and submits `task`, or, if it is already queued or in flight,
    /// records the request so the task restarts once it finishes.
    ///
    /// Requests arriving meanwhile are coalesced: `items_changed` is OR'd and
    /// the strongest evaluation kept.
    pub fn update<T: Task<C>>(
        &mut self,
        task: &TaskHandle<T>,
        items_changed: bool,
        evaluation: EvaluationType,
    ) {
        self.update_erased(task.erase(), items_changed, evaluation);
    }

    fn update_erased(&mut self, task: ErasedTask<C>, items_changed: bool, evaluation: EvaluationType) {
        if self.shut_down {
            log::debug!("renderer shut down; ignoring update of {}", task.id());
            return;
        }

        if task.state() != TaskState::Idle {
            task.merge_pending(items_changed, evaluation);
            return;
        }

        task.lock().prepare(items_changed, evaluation);
        self.enqueue(task);
    }

    fn enqueue(&mut self, task: ErasedTask<C>) {
        task.set_state(TaskState::Queued);
        self.pending.push_back(task);
        self.dispatch_next();
    }

    fn dispatch_next(&mut self) {
        if self.current.is_some() {
            return;
        }
        let Some(task) = self.pending.pop_front() else {
            return;
        };

        log::trace!("dispatching {}", task.id());
        task.set_state(TaskState::Configuring);
        // tasks dropped without a release leave dead entries behind
        self.resident.retain(|_, weak| weak.strong_count() > 0);
        self.resident.insert(task.id(), task.downgrade());
        self.current = Some(InFlight {
            task: task.clone(),
            releasing: false,
        });
        self.send(Request::Configure(task));
    }

    // ── replies ───────────────────────────────────────────────────────────

    /// Handles every reply that has arrived, without blocking.
    ///
    /// Returns the number of replies handled.
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        loop {
            match self.replies.try_recv() {
                Ok(reply) => {
                    self.handle_reply(reply);
                    handled += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.current.is_some() {
                        self.worker_lost();
                    }
                    break;
                }
            }
        }
        handled
    }

    /// Blocks until at least one reply arrived (or `timeout` elapsed), then
    /// handles all available replies.
    ///
    /// Returns immediately when nothing is in flight.
    pub fn wait_events(&mut self, timeout: Option<Duration>) -> usize {
        if self.current.is_none() {
            return self.process_events();
        }

        let first = match timeout {
            Some(timeout) => self.replies.recv_timeout(timeout),
            None => self
                .replies
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        };

        match first {
            Ok(reply) => {
                self.handle_reply(reply);
                1 + self.process_events()
            }
            Err(RecvTimeoutError::Timeout) => 0,
            Err(RecvTimeoutError::Disconnected) => {
                self.worker_lost();
                0
            }
        }
    }

    /// Blocks until the queue is drained and nothing is in flight.
    pub fn wait_idle(&mut self) {
        while self.current.is_some() {
            self.wait_events(None);
        }
    }

    fn handle_reply(&mut self, reply: Reply) {
        match reply {
            Reply::Configured(id) => self.handle_configured(id),
            Reply::Rendered(id, diagnostic) => {
                let Some(flight) = self.take_current(id) else {
                    return;
                };
                let task = flight.task;

                if flight.releasing {
                    task.set_state(TaskState::Idle);
                    self.dispatch_next();
                    return;
                }

                task.set_state(TaskState::Finishing);
                task.lock().finish(diagnostic);
                task.set_state(TaskState::Idle);
                task.mark_finished();

                // restart when the task was updated in the meantime
                if let Some((items_changed, evaluation)) = task.take_pending() {
                    self.update_erased(task, items_changed, evaluation);
                }
                self.dispatch_next();
            }
        }
    }

    fn handle_configured(&mut self, id: TaskId) {
        let Some(flight) = self.current.as_ref().filter(|f| f.task.id() == id) else {
            log::warn!("configured reply for {id}, which is not in flight");
            return;
        };

        if flight.releasing {
            // Render is never dispatched for a task being released.
            if let Some(flight) = self.current.take() {
                flight.task.set_state(TaskState::Idle);
            }
            self.dispatch_next();
            return;
        }

        let task = flight.task.clone();
        task.set_state(TaskState::RenderPending);
        task.lock().configured();

        task.set_state(TaskState::Rendering);
        self.send(Request::Render(task));
    }

    fn take_current(&mut self, id: TaskId) -> Option<InFlight<C>> {
        match &self.current {
            Some(flight) if flight.task.id() == id => self.current.take(),
            _ => {
                log::warn!("rendered reply for {id}, which is not in flight");
                None
            }
        }
    }

    // ── release ───────────────────────────────────────────────────────────

    /// Releases the GPU resources of `task` and returns once they are gone.
    ///
    /// A queued task is dropped from the queue. A task in flight is first
    /// allowed to complete its current stage (its `configured`/`finish` are
    /// skipped). Other tasks keep being dispatched. Releasing twice, or after
    /// shutdown, is a no-op.
    pub fn release<T: Task<C>>(&mut self, task: &TaskHandle<T>) {
        self.release_erased(task.erase());
    }

    fn release_erased(&mut self, task: ErasedTask<C>) {
        let id = task.id();
        if self.shut_down {
            log::debug!("renderer shut down; release of {id} ignored");
            return;
        }

        task.clear_pending();
        self.pending.retain(|t| t.id() != id);

        if let Some(flight) = self.current.as_mut().filter(|f| f.task.id() == id) {
            flight.releasing = true;
        }
        while self.is_current(id) {
            match self.replies.recv() {
                Ok(reply) => self.handle_reply(reply),
                Err(_) => {
                    self.worker_lost();
                    break;
                }
            }
        }
        task.set_state(TaskState::Idle);

        if self.resident.remove(&id).is_none() {
            log::debug!("{id} holds no GPU resources; nothing to release");
            return;
        }
        self.release_on_worker(task);
    }

    fn release_on_worker(&mut self, task: ErasedTask<C>) {
        let rendezvous = Arc::new(Rendezvous::new());
        let signal = SignalOnDrop::new(Arc::clone(&rendezvous));
        if !self.send(Request::Release(task, signal)) {
            return;
        }

        // block until the render thread finished releasing the task
        rendezvous.wait();
    }

    // ── inspection ────────────────────────────────────────────────────────

    pub fn state_of<T: ?Sized>(&self, task: &TaskHandle<T>) -> TaskState {
        task.state()
    }

    /// Task currently between dispatch and `finish`.
    pub fn current_task(&self) -> Option<TaskId> {
        self.current.as_ref().map(|f| f.task.id())
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.pending.is_empty()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    fn is_current(&self, id: TaskId) -> bool {
        self.current.as_ref().is_some_and(|f| f.task.id() == id)
    }

    fn is_scheduled(&self, id: TaskId) -> bool {
        self.is_current(id) || self.pending.iter().any(|t| t.id() == id)
    }

    // ── teardown ──────────────────────────────────────────────────────────

    /// Stops the worker and returns the GPU context to the calling thread.
    ///
    /// Pending tasks are dropped, the in-flight stage completes (without its
    /// UI-side follow-up), every task still holding resources is released,
    /// then the worker thread is joined. Later calls return `None`.
    pub fn shutdown(&mut self) -> Option<C> {
        let worker = self.worker.take()?;
        self.shut_down = true;

        for task in self.pending.drain(..) {
            task.clear_pending();
            task.set_state(TaskState::Idle);
        }

        if let Some(flight) = self.current.as_mut() {
            flight.releasing = true;
        }
        while self.current.is_some() {
            match self.replies.recv() {
                Ok(reply) => self.handle_reply(reply),
                Err(_) => {
                    self.worker_lost();
                    break;
                }
            }
        }

        let resident: Vec<_> = self
            .resident
            .drain()
            .filter_map(|(_, weak)| weak.upgrade())
            .collect();
        for cell in resident {
            self.release_on_worker(TaskHandle::from_cell(cell));
        }

        self.send(Request::Stop);
        self.requests = None;

        match worker.join() {
            Ok(context) => Some(context),
            Err(_) => {
                log::error!("render worker panicked; GPU context lost");
                None
            }
        }
    }

    // ── plumbing ──────────────────────────────────────────────────────────

    fn send(&mut self, request: Request<C>) -> bool {
        let sent = match &self.requests {
            Some(tx) => tx.send(request).is_ok(),
            None => false,
        };
        if !sent {
            self.worker_lost();
        }
        sent
    }

    /// The worker thread is gone; no replies will come.
    fn worker_lost(&mut self) {
        if !self.shut_down {
            log::error!("render worker terminated unexpectedly");
        }
        self.shut_down = true;
        self.requests = None;

        if let Some(flight) = self.current.take() {
            flight.task.set_state(TaskState::Idle);
        }
        for task in self.pending.drain(..) {
            task.set_state(TaskState::Idle);
        }
    }
}

impl<C: GpuContext> Drop for Renderer<C> {
    fn drop(&mut self) {
        // The returned context is destroyed here, on the owning thread.
        drop(self.shutdown());
    }
}
