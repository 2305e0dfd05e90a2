use std::sync::atomic::{AtomicU64, Ordering};

const UNINITIALIZED: u64 = u64::MAX;

/// In-memory mirror of the checkpoint's last fully processed block height.
/// Written by the driver after each checkpoint save, read by the block queue
/// as its enqueue floor.
#[derive(Debug)]
pub struct ProgressTracker {
    last_processed: AtomicU64,
}

impl ProgressTracker {
    pub fn new(initial: Option<u64>) -> Self {
        Self {
            last_processed: AtomicU64::new(initial.unwrap_or(UNINITIALIZED)),
        }
    }

    pub fn mark_processed(&self, height: u64) {
        self.last_processed.store(height, Ordering::SeqCst);
    }

    pub fn last_processed(&self) -> Option<u64> {
        match self.last_processed.load(Ordering::SeqCst) {
            UNINITIALIZED => None,
            value => Some(value),
        }
    }
}
