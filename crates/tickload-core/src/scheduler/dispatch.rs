//! Primary-tick dispatch queue
//!
//! Any thread may post an action; the thread that drives the scheduler runs
//! the pending actions in posting order once per tick. Actions posted while a
//! drain is running wait for the next drain.

use parking_lot::Mutex;
use std::collections::VecDeque;

/// Deferred unit of work
pub type Action = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
pub struct DispatchQueue {
    pending: Mutex<VecDeque<Action>>,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an action for the next drain
    pub fn post<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pending.lock().push_back(Box::new(action));
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Run every action queued before this call. Returns how many ran.
    pub fn drain(&self) -> usize {
        let batch = std::mem::take(&mut *self.pending.lock());
        let count = batch.len();
        for action in batch {
            action();
        }
        count
    }

    /// Drop pending actions without running them
    pub fn clear(&self) -> usize {
        let mut pending = self.pending.lock();
        let count = pending.len();
        pending.clear();
        count
    }
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("pending", &self.len())
            .finish()
    }
}
