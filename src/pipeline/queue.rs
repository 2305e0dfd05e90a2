//! Ordered, deduplicated queue of block heights awaiting a scan.

use super::progress::ProgressTracker;
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

struct QueueState {
    pending: VecDeque<u64>,
    members: BTreeSet<u64>,
}

/// FIFO of bare heights fed by the startup backfill and live notifications.
/// Enqueueing a height already pending or at or below the processed floor is
/// a no-op. The queue does not persist; durability lives in the checkpoint.
pub struct BlockQueue {
    state: Mutex<QueueState>,
    progress: Arc<ProgressTracker>,
}

impl BlockQueue {
    pub fn new(progress: Arc<ProgressTracker>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                members: BTreeSet::new(),
            }),
            progress,
        }
    }

    /// Appends `height` unless it is a duplicate or already processed.
    /// Returns true when the height was actually queued.
    pub fn enqueue(&self, height: u64) -> bool {
        if self
            .progress
            .last_processed()
            .is_some_and(|last| height <= last)
        {
            return false;
        }

        let mut state = self.state.lock().expect("block queue poisoned");
        if !state.members.insert(height) {
            return false;
        }
        state.pending.push_back(height);
        true
    }

    /// Puts an abandoned height back at the head so the next drain retries it
    /// before anything newer.
    pub fn requeue_front(&self, height: u64) {
        let mut state = self.state.lock().expect("block queue poisoned");
        if state.members.insert(height) {
            state.pending.push_front(height);
        } else if state.pending.front() != Some(&height) {
            state.pending.retain(|&pending| pending != height);
            state.pending.push_front(height);
        }
    }

    pub fn pop(&self) -> Option<u64> {
        let mut state = self.state.lock().expect("block queue poisoned");
        let height = state.pending.pop_front()?;
        state.members.remove(&height);
        Some(height)
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("block queue poisoned").pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state
            .lock()
            .expect("block queue poisoned")
            .pending
            .is_empty()
    }
}
