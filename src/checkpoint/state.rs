use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Durable record of pipeline progress and the handled-event dedup set.
///
/// `starting_block` is set once when tracking begins and never mutated.
/// `last_processed_block` only moves forward; a block at or below it is
/// guaranteed fully scanned. An event key enters `handled_events` only after
/// its response transaction was confirmed on chain, so a crash between
/// submission and confirmation leaves the event eligible for reprocessing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub starting_block: u64,
    pub last_processed_block: Option<u64>,
    pub handled_events: BTreeSet<String>,
}

impl Checkpoint {
    /// Fresh checkpoint seeded at the current chain height: tracking starts at
    /// `height`, so the previous block counts as already processed. `None`
    /// covers the degenerate first run at height zero.
    pub fn bootstrap(height: u64) -> Self {
        Self {
            starting_block: height,
            last_processed_block: height.checked_sub(1),
            handled_events: BTreeSet::new(),
        }
    }

    /// Height the next scan should begin at.
    pub fn next_height(&self) -> u64 {
        match self.last_processed_block {
            Some(last) => last.saturating_add(1),
            None => self.starting_block,
        }
    }

    pub fn is_processed(&self, height: u64) -> bool {
        self.last_processed_block
            .is_some_and(|last| height <= last)
    }

    /// Marks `height` fully scanned. Progress never moves backwards.
    pub fn advance(&mut self, height: u64) {
        debug_assert!(!self.is_processed(height), "checkpoint must not rewind");
        if !self.is_processed(height) {
            self.last_processed_block = Some(height);
        }
    }

    pub fn is_handled(&self, key: &str) -> bool {
        self.handled_events.contains(key)
    }

    /// Records a confirmed response. Returns false when the key was already
    /// present.
    pub fn mark_handled(&mut self, key: impl Into<String>) -> bool {
        self.handled_events.insert(key.into())
    }
}
