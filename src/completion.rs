use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Pending {
    count: Mutex<usize>,
    landed: Condvar,
}

/// Tracks the asynchronous remote writes a rank has issued.
///
/// Every write registers a [`Completion`] before it is handed to the progress engine and signals
/// it once the data is in place. [`drain`](CompletionTracker::drain) blocks until every registered
/// write has landed. Draining does not close the tracker: writes issued afterwards are tracked
/// for the next drain.
///
/// A drain only covers the writes of the rank that owns the tracker. Before any rank reads data
/// written by others, every rank has to drain and then meet at a barrier.
#[derive(Debug, Default)]
pub struct CompletionTracker {
    pending: Arc<Pending>,
}

impl CompletionTracker {
    /// An empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one in-flight write. The write counts as landed when the returned token is
    /// completed or dropped.
    pub fn register(&self) -> Completion {
        *self.pending.count.lock() += 1;
        Completion {
            pending: Arc::clone(&self.pending),
        }
    }

    /// Number of registered writes that have not landed yet.
    pub fn pending(&self) -> usize {
        *self.pending.count.lock()
    }

    /// Blocks until every registered write has landed.
    pub fn drain(&self) {
        let mut count = self.pending.count.lock();
        while *count != 0 {
            self.pending.landed.wait(&mut count);
        }
    }
}

/// Token for one in-flight write, created by [`CompletionTracker::register`].
#[derive(Debug)]
#[must_use = "the write counts as landed as soon as the token is dropped"]
pub struct Completion {
    pending: Arc<Pending>,
}

impl Completion {
    /// Marks the write as landed.
    pub fn complete(self) {
        // the work happens in Drop
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        let mut count = self.pending.count.lock();
        *count -= 1;
        if *count == 0 {
            self.pending.landed.notify_all();
        }
    }
}

/// A value produced on another thread, waited for by exactly one receiver.
#[derive(Debug)]
pub(crate) struct Reply<T> {
    value: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T> Reply<T> {
    pub(crate) fn new() -> Self {
        Self {
            value: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    pub(crate) fn fulfill(&self, value: T) {
        *self.value.lock() = Some(value);
        self.ready.notify_one();
    }

    pub(crate) fn wait(&self) -> T {
        let mut value = self.value.lock();
        loop {
            if let Some(v) = value.take() {
                return v;
            }
            self.ready.wait(&mut value);
        }
    }
}
