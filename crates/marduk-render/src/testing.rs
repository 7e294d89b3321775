//! CPU-only doubles for the GPU context and tasks.
//!
//! Everything observable goes to a shared [`Journal`], so tests can assert
//! the exact interleaving of fence operations and task stages across threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use parking_lot::Mutex;

use crate::device::{
    ContextError, DebugMessage, Diagnostic, FenceContext, FenceError, GpuContext, Severity,
};
use crate::renderer::RendererConfig;
use crate::sync::Rendezvous;
use crate::task::{EvaluationType, Task};

const FENCE_OPS: [&str; 4] = [":insert#", ":wait#", ":delete#", ":flush"];

#[derive(Default)]
struct JournalInner {
    entries: Vec<String>,
    next_fence: u64,
    misplaced: Vec<String>,
}

/// Append-only, thread-safe event log.
#[derive(Clone, Default)]
pub(crate) struct Journal {
    inner: Arc<Mutex<JournalInner>>,
}

impl Journal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, entry: &str) {
        self.inner.lock().entries.push(entry.to_string());
    }

    /// Drops the entries; fence numbering continues.
    pub(crate) fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.inner.lock().entries.clone()
    }

    pub(crate) fn fence_ops(&self) -> Vec<String> {
        self.filtered(|e| FENCE_OPS.iter().any(|op| e.contains(op)))
    }

    pub(crate) fn fence_ops_and(&self, extra: &str) -> Vec<String> {
        self.filtered(|e| e == extra || FENCE_OPS.iter().any(|op| e.contains(op)))
    }

    /// Task stages only (`"A.render"`), in execution order.
    pub(crate) fn stages(&self) -> Vec<String> {
        self.filtered(|e| !e.contains(':'))
    }

    /// Task stages from dispatch on, leaving out `prepare`.
    ///
    /// `prepare` runs on the submitting thread while the worker may already
    /// be configuring an earlier task, so its position is not fixed.
    pub(crate) fn dispatched_stages(&self) -> Vec<String> {
        self.filtered(|e| !e.contains(':') && !e.ends_with(".prepare"))
    }

    /// Stages that ran on the wrong thread.
    pub(crate) fn misplaced(&self) -> Vec<String> {
        self.inner.lock().misplaced.clone()
    }

    fn filtered(&self, keep: impl Fn(&str) -> bool) -> Vec<String> {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|e| keep(e))
            .cloned()
            .collect()
    }

    fn next_fence(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.next_fence += 1;
        inner.next_fence
    }

    fn stage(&self, task: &str, stage: &str, on_worker: bool) {
        let entry = format!("{task}.{stage}");
        let mut inner = self.inner.lock();
        if on_worker_thread() != on_worker {
            inner.misplaced.push(entry.clone());
        }
        inner.entries.push(entry);
    }
}

fn on_worker_thread() -> bool {
    thread::current().name() == Some(RendererConfig::default().thread_name.as_str())
}

// ── context ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct CpuFence {
    pub(crate) id: u64,
}

/// Switches shared with a [`RecordingContext`] after it moved to the worker.
#[derive(Default)]
pub(crate) struct ContextControl {
    lost: AtomicBool,
}

impl ContextControl {
    pub(crate) fn set_lost(&self, lost: bool) {
        self.lost.store(lost, Ordering::SeqCst);
    }
}

pub(crate) struct RecordingContext {
    name: &'static str,
    journal: Journal,
    exhausted: bool,
    messages: Vec<DebugMessage>,
    control: Arc<ContextControl>,
}

impl RecordingContext {
    pub(crate) fn new(name: &'static str, journal: Journal) -> Self {
        Self {
            name,
            journal,
            exhausted: false,
            messages: Vec::new(),
            control: Arc::default(),
        }
    }

    pub(crate) fn control(&self) -> Arc<ContextControl> {
        Arc::clone(&self.control)
    }

    pub(crate) fn set_fences_exhausted(&mut self, exhausted: bool) {
        self.exhausted = exhausted;
    }

    /// Queues a message for the next `take_debug_messages`.
    pub(crate) fn emit(&mut self, severity: Severity, message: &str) {
        self.messages.push(DebugMessage::new(severity, message));
    }

    fn record(&self, op: impl std::fmt::Display) {
        self.journal.push(&format!("{}:{op}", self.name));
    }
}

impl FenceContext for RecordingContext {
    type Fence = CpuFence;

    fn insert_fence(&mut self) -> Result<CpuFence, FenceError> {
        if self.control.lost.load(Ordering::SeqCst) {
            return Err(FenceError::ContextLost);
        }
        if self.exhausted {
            return Err(FenceError::Exhausted);
        }
        let fence = CpuFence {
            id: self.journal.next_fence(),
        };
        self.record(format_args!("insert#{}", fence.id));
        Ok(fence)
    }

    fn wait_fence(&mut self, fence: &CpuFence) {
        self.record(format_args!("wait#{}", fence.id));
    }

    fn delete_fence(&mut self, fence: CpuFence) {
        self.record(format_args!("delete#{}", fence.id));
    }

    fn flush(&mut self) {
        self.record("flush");
    }
}

impl GpuContext for RecordingContext {
    fn make_current(&mut self) -> Result<(), ContextError> {
        if self.control.lost.load(Ordering::SeqCst) {
            return Err(ContextError::Lost);
        }
        Ok(())
    }

    fn done_current(&mut self) {}

    fn initialize(&mut self) -> Result<(), ContextError> {
        self.record("initialize");
        Ok(())
    }

    fn take_debug_messages(&mut self) -> Vec<DebugMessage> {
        std::mem::take(&mut self.messages)
    }

    fn shutdown(&mut self) {
        self.record("shutdown");
    }
}

// ── task ──────────────────────────────────────────────────────────────────

/// Records each stage as `"<name>.<stage>"` and checks its thread.
pub(crate) struct RecordingTask {
    name: &'static str,
    journal: Journal,

    /// `render` blocks until this is signaled.
    pub(crate) gate: Option<Arc<Rendezvous>>,
    /// Stage that panics instead of recording.
    pub(crate) panic_in: Option<&'static str>,
    /// Emitted as a debug message during `render`.
    pub(crate) render_message: Option<(Severity, &'static str)>,

    pub(crate) prepared: Vec<(bool, EvaluationType)>,
    pub(crate) diagnostics: Vec<Option<Diagnostic>>,
}

impl RecordingTask {
    pub(crate) fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            journal: journal.clone(),
            gate: None,
            panic_in: None,
            render_message: None,
            prepared: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn stage(&self, stage: &'static str, on_worker: bool) {
        if self.panic_in == Some(stage) {
            panic!("{}.{stage} failed", self.name);
        }
        self.journal.stage(self.name, stage, on_worker);
    }
}

impl Task<RecordingContext> for RecordingTask {
    fn prepare(&mut self, items_changed: bool, evaluation: EvaluationType) {
        self.stage("prepare", false);
        self.prepared.push((items_changed, evaluation));
    }

    fn configure(&mut self, _ctx: &mut RecordingContext) {
        self.stage("configure", true);
    }

    fn configured(&mut self) {
        self.stage("configured", false);
    }

    fn render(&mut self, ctx: &mut RecordingContext) {
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        if let Some((severity, message)) = self.render_message {
            ctx.emit(severity, message);
        }
        self.stage("render", true);
    }

    fn finish(&mut self, diagnostic: Option<Diagnostic>) {
        self.stage("finish", false);
        self.diagnostics.push(diagnostic);
    }

    fn release(&mut self, _ctx: &mut RecordingContext) {
        self.stage("release", true);
    }
}
