use parking_lot::{Mutex, MutexGuard};

use crate::device::{FenceContext, FenceError};

/// Guards a GPU resource shared between an updating context and reading
/// contexts.
///
/// - An update waits (GPU-side) until every reader that finished since the
///   previous update is done, then records an update fence.
/// - A usage waits (GPU-side) for the most recent update fence, then records
///   a usage fence when done.
///
/// One exclusive lock is held from `begin_*` until the scope ends, so two
/// updates or two usages never interleave. The lock is held by CPU threads
/// only for as long as fence bookkeeping takes; GPU ordering is left to the
/// fences.
///
/// ```ignore
/// let scope = sync.begin_update(ctx);
/// // ... write the resource ...
/// scope.end_update(ctx)?;
/// ```
pub struct ShareSynchronizer<F> {
    state: Mutex<FenceState<F>>,
}

struct FenceState<F> {
    update: Option<F>,
    usages: Vec<F>,
}

impl<F: Send + 'static> ShareSynchronizer<F> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FenceState {
                update: None,
                usages: Vec::new(),
            }),
        }
    }

    /// Starts writing the resource from `ctx`.
    ///
    /// Blocks while another scope is open. Waits on and deletes all usage
    /// fences so earlier readers finish before new writes execute.
    pub fn begin_update<C>(&self, ctx: &mut C) -> UpdateScope<'_, F>
    where
        C: FenceContext<Fence = F>,
    {
        let mut state = self.state.lock();
        for fence in state.usages.drain(..) {
            ctx.wait_fence(&fence);
            ctx.delete_fence(fence);
        }
        UpdateScope { state, ended: false }
    }

    /// Starts reading the resource from `ctx`.
    ///
    /// Blocks while another scope is open. Makes `ctx` wait for the latest
    /// update so it never observes a write in progress.
    pub fn begin_usage<C>(&self, ctx: &mut C) -> UsageScope<'_, F>
    where
        C: FenceContext<Fence = F>,
    {
        let state = self.state.lock();
        if let Some(fence) = &state.update {
            ctx.wait_fence(fence);
        }
        UsageScope { state, ended: false }
    }

    /// Deletes every outstanding fence.
    ///
    /// Called when the resource is destroyed or the owning context is torn
    /// down. Must not be called while a scope of this synchronizer is open on
    /// the same thread.
    pub fn cleanup<C>(&self, ctx: &mut C)
    where
        C: FenceContext<Fence = F>,
    {
        let mut state = self.state.lock();
        if let Some(fence) = state.update.take() {
            ctx.delete_fence(fence);
        }
        for fence in state.usages.drain(..) {
            ctx.delete_fence(fence);
        }
    }

    /// Whether an update fence is recorded.
    pub fn has_update(&self) -> bool {
        self.state.lock().update.is_some()
    }

    /// Number of usage fences the next update will wait on.
    pub fn pending_usages(&self) -> usize {
        self.state.lock().usages.len()
    }

    /// No fences are outstanding.
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.update.is_none() && state.usages.is_empty()
    }
}

impl<F: Send + 'static> Default for ShareSynchronizer<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// Open update of a [`ShareSynchronizer`]. Holds its lock.
#[must_use = "an update scope must be ended with `end_update`"]
pub struct UpdateScope<'a, F> {
    state: MutexGuard<'a, FenceState<F>>,
    ended: bool,
}

impl<F> UpdateScope<'_, F> {
    /// Records the end of the update, flushes and releases the lock.
    ///
    /// On fence failure the previous update fence is kept and the error is
    /// returned; the lock is released either way.
    pub fn end_update<C>(mut self, ctx: &mut C) -> Result<(), FenceError>
    where
        C: FenceContext<Fence = F>,
    {
        self.ended = true;
        let fence = ctx.insert_fence();
        ctx.flush();

        let fence = fence?;
        if let Some(previous) = self.state.update.replace(fence) {
            ctx.delete_fence(previous);
        }
        Ok(())
    }
}

impl<F> Drop for UpdateScope<'_, F> {
    fn drop(&mut self) {
        if !self.ended {
            log::warn!("shared resource update dropped without end_update; no fence recorded");
        }
    }
}

/// Open usage of a [`ShareSynchronizer`]. Holds its lock.
#[must_use = "a usage scope must be ended with `end_usage`"]
pub struct UsageScope<'a, F> {
    state: MutexGuard<'a, FenceState<F>>,
    ended: bool,
}

impl<F> UsageScope<'_, F> {
    /// Records the end of this usage, flushes and releases the lock.
    pub fn end_usage<C>(mut self, ctx: &mut C) -> Result<(), FenceError>
    where
        C: FenceContext<Fence = F>,
    {
        self.ended = true;
        let fence = ctx.insert_fence();
        ctx.flush();

        self.state.usages.push(fence?);
        Ok(())
    }
}

impl<F> Drop for UsageScope<'_, F> {
    fn drop(&mut self) {
        if !self.ended {
            log::warn!("shared resource usage dropped without end_usage; no fence recorded");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::testing::{CpuFence, Journal, RecordingContext};

    fn pair() -> (Journal, RecordingContext, RecordingContext) {
        let journal = Journal::new();
        let worker = RecordingContext::new("worker", journal.clone());
        let preview = RecordingContext::new("preview", journal.clone());
        (journal, worker, preview)
    }

    // ── update / usage ordering ───────────────────────────────────────────

    #[test]
    fn first_usage_without_update_waits_on_nothing() {
        let (journal, _worker, mut preview) = pair();
        let sync = ShareSynchronizer::<CpuFence>::new();

        let scope = sync.begin_usage(&mut preview);
        scope.end_usage(&mut preview).unwrap();

        assert_eq!(
            journal.fence_ops(),
            vec!["preview:insert#1", "preview:flush"]
        );
        assert_eq!(sync.pending_usages(), 1);
    }

    #[test]
    fn usage_waits_on_latest_update() {
        let (journal, mut worker, mut preview) = pair();
        let sync = ShareSynchronizer::<CpuFence>::new();

        sync.begin_update(&mut worker).end_update(&mut worker).unwrap();
        sync.begin_update(&mut worker).end_update(&mut worker).unwrap();
        journal.clear();

        sync.begin_usage(&mut preview).end_usage(&mut preview).unwrap();

        // Update fence #1 was replaced by #2; only the latest is waited on.
        assert_eq!(
            journal.fence_ops(),
            vec!["preview:wait#2", "preview:insert#3", "preview:flush"]
        );
    }

    #[test]
    fn update_drains_all_usages_before_writing() {
        let (journal, mut worker, mut preview) = pair();
        let sync = ShareSynchronizer::<CpuFence>::new();

        sync.begin_update(&mut worker).end_update(&mut worker).unwrap(); // #1
        sync.begin_usage(&mut preview).end_usage(&mut preview).unwrap(); // #2
        sync.begin_usage(&mut preview).end_usage(&mut preview).unwrap(); // #3
        assert_eq!(sync.pending_usages(), 2);
        journal.clear();

        let scope = sync.begin_update(&mut worker);
        journal.push("write");
        scope.end_update(&mut worker).unwrap();

        assert_eq!(
            journal.fence_ops_and("write"),
            vec![
                "worker:wait#2",
                "worker:delete#2",
                "worker:wait#3",
                "worker:delete#3",
                "write",
                "worker:insert#4",
                "worker:flush",
                "worker:delete#1",
            ]
        );
        assert_eq!(sync.pending_usages(), 0);
        assert!(sync.has_update());
    }

    #[test]
    fn cleanup_deletes_everything() {
        let (journal, mut worker, mut preview) = pair();
        let sync = ShareSynchronizer::<CpuFence>::new();

        sync.begin_update(&mut worker).end_update(&mut worker).unwrap();
        sync.begin_usage(&mut preview).end_usage(&mut preview).unwrap();
        journal.clear();

        sync.cleanup(&mut worker);

        assert!(sync.is_idle());
        assert_eq!(journal.fence_ops(), vec!["worker:delete#1", "worker:delete#2"]);
    }

    // ── failure ───────────────────────────────────────────────────────────

    #[test]
    fn fence_exhaustion_is_reported_and_releases_lock() {
        let (_journal, mut worker, mut preview) = pair();
        let sync = ShareSynchronizer::<CpuFence>::new();

        sync.begin_update(&mut worker).end_update(&mut worker).unwrap();

        worker.set_fences_exhausted(true);
        let err = sync.begin_update(&mut worker).end_update(&mut worker).unwrap_err();
        assert_eq!(err, FenceError::Exhausted);

        // The old update fence is kept and the lock is free again.
        assert!(sync.has_update());
        sync.begin_usage(&mut preview).end_usage(&mut preview).unwrap();
    }

    #[test]
    fn dropped_scope_releases_lock_without_fence() {
        let (_journal, mut worker, _preview) = pair();
        let sync = ShareSynchronizer::<CpuFence>::new();

        drop(sync.begin_update(&mut worker));

        assert!(!sync.has_update());
        sync.begin_update(&mut worker).end_update(&mut worker).unwrap();
        assert!(sync.has_update());
    }

    // ── cross-thread exclusion ────────────────────────────────────────────

    #[test]
    fn usage_blocks_while_update_is_open() {
        let (_journal, mut worker, mut preview) = pair();
        let sync = Arc::new(ShareSynchronizer::<CpuFence>::new());
        let writing = Arc::new(AtomicBool::new(false));

        let scope = sync.begin_update(&mut worker);
        writing.store(true, Ordering::SeqCst);

        let reader = {
            let sync = Arc::clone(&sync);
            let writing = Arc::clone(&writing);
            thread::spawn(move || {
                let scope = sync.begin_usage(&mut preview);
                let observed_writing = writing.load(Ordering::SeqCst);
                scope.end_usage(&mut preview).unwrap();
                observed_writing
            })
        };

        thread::sleep(Duration::from_millis(50));
        writing.store(false, Ordering::SeqCst);
        scope.end_update(&mut worker).unwrap();

        assert!(!reader.join().unwrap(), "reader entered during an open update");
        assert_eq!(sync.pending_usages(), 1);
    }

    #[test]
    fn update_blocks_while_usage_is_open() {
        let (journal, mut worker, mut preview) = pair();
        let sync = Arc::new(ShareSynchronizer::<CpuFence>::new());
        let reading = Arc::new(AtomicBool::new(false));

        let scope = sync.begin_usage(&mut preview);
        reading.store(true, Ordering::SeqCst);

        let writer = {
            let sync = Arc::clone(&sync);
            let reading = Arc::clone(&reading);
            thread::spawn(move || {
                let scope = sync.begin_update(&mut worker);
                let observed_reading = reading.load(Ordering::SeqCst);
                scope.end_update(&mut worker).unwrap();
                observed_reading
            })
        };

        thread::sleep(Duration::from_millis(50));
        reading.store(false, Ordering::SeqCst);
        scope.end_usage(&mut preview).unwrap();

        assert!(!writer.join().unwrap(), "writer entered during an open usage");
        // the writer waited on the usage fence recorded when the reader ended
        assert_eq!(
            journal.fence_ops(),
            vec![
                "preview:insert#1",
                "preview:flush",
                "worker:wait#1",
                "worker:delete#1",
                "worker:insert#2",
                "worker:flush",
            ]
        );
        assert!(sync.has_update());
    }
}
