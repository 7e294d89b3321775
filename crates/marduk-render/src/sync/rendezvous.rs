use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// One-shot handoff between the thread requesting a release and the worker
/// performing it.
#[derive(Debug, Default)]
pub struct Rendezvous {
    done: Mutex<bool>,
    cond: Condvar,
}

impl Rendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the handoff complete and wakes the waiting thread.
    pub fn signal(&self) {
        let mut done = self.done.lock();
        *done = true;
        self.cond.notify_all();
    }

    /// Blocks until [`signal`](Self::signal) was called.
    pub fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.cond.wait(&mut done);
        }
    }

    /// Like [`wait`](Self::wait) with an upper bound. Returns whether the
    /// handoff completed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut done = self.done.lock();
        if !*done {
            let _ = self.cond.wait_while_for(&mut done, |done| !*done, timeout);
        }
        *done
    }

    pub fn is_signaled(&self) -> bool {
        *self.done.lock()
    }
}

/// Signals its rendezvous when dropped.
///
/// Travels with the release request, so the waiting thread is woken even if
/// the worker panics or the request is dropped unprocessed.
pub(crate) struct SignalOnDrop(Arc<Rendezvous>);

impl SignalOnDrop {
    pub(crate) fn new(rendezvous: Arc<Rendezvous>) -> Self {
        Self(rendezvous)
    }
}

impl Drop for SignalOnDrop {
    fn drop(&mut self) {
        self.0.signal();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn wait_returns_after_signal_from_other_thread() {
        let rendezvous = Arc::new(Rendezvous::new());
        let remote = Arc::clone(&rendezvous);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.signal();
        });

        rendezvous.wait();
        assert!(rendezvous.is_signaled());
        handle.join().unwrap();
    }

    #[test]
    fn signal_before_wait_does_not_block() {
        let rendezvous = Rendezvous::new();
        rendezvous.signal();
        rendezvous.wait();
    }

    #[test]
    fn wait_timeout_expires_without_signal() {
        let rendezvous = Rendezvous::new();
        assert!(!rendezvous.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn dropped_guard_signals() {
        let rendezvous = Arc::new(Rendezvous::new());
        let guard = SignalOnDrop::new(Arc::clone(&rendezvous));
        assert!(!rendezvous.is_signaled());
        drop(guard);
        assert!(rendezvous.is_signaled());
    }
}
