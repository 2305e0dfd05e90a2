//! Single-consumer drain loop over the block queue.
//!
//! The driver is the only writer of the checkpoint. Blocks are processed to
//! completion one at a time, strictly in queue order; events within a block
//! are processed in source order with the checkpoint persisted after every
//! confirmed response, which bounds the replay window on crash to at most one
//! in-flight event.

use crate::checkpoint::{Checkpoint, CheckpointStore, StoreError};
use crate::gateway::{ChainGateway, PendingEvent};
use crate::pipeline::progress::ProgressTracker;
use crate::pipeline::queue::BlockQueue;
use crate::runtime::telemetry::Telemetry;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Drain gate. A request while `Draining` coalesces into the active drain
/// instead of starting a second consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    Idle,
    Draining,
}

/// Why a drain stopped consuming the queue.
enum DrainStop {
    /// Queue ran dry.
    Empty,
    /// A block was abandoned after exhausted retries; it was requeued at the
    /// front and will be retried on the next drain trigger.
    Abandoned,
    /// Shutdown fired mid-drain.
    Cancelled,
}

/// Outcome of a single block scan.
enum BlockOutcome {
    Completed,
    Abandoned,
    Cancelled,
}

enum EventOutcome {
    Handled,
    Skipped,
    Failed,
}

pub struct DriverParams<G, S> {
    pub gateway: Arc<G>,
    pub store: Arc<S>,
    pub queue: Arc<BlockQueue>,
    pub progress: Arc<ProgressTracker>,
    pub telemetry: Arc<Telemetry>,
    pub checkpoint: Checkpoint,
    pub pacing: Duration,
    pub cancellation: CancellationToken,
}

pub struct PipelineDriver<G, S> {
    gateway: Arc<G>,
    store: Arc<S>,
    queue: Arc<BlockQueue>,
    progress: Arc<ProgressTracker>,
    telemetry: Arc<Telemetry>,
    checkpoint: tokio::sync::Mutex<Checkpoint>,
    state: Mutex<DriverState>,
    pacing: Duration,
    cancellation: CancellationToken,
}

impl<G: ChainGateway, S: CheckpointStore> PipelineDriver<G, S> {
    pub fn new(params: DriverParams<G, S>) -> Self {
        let DriverParams {
            gateway,
            store,
            queue,
            progress,
            telemetry,
            checkpoint,
            pacing,
            cancellation,
        } = params;

        Self {
            gateway,
            store,
            queue,
            progress,
            telemetry,
            checkpoint: tokio::sync::Mutex::new(checkpoint),
            state: Mutex::new(DriverState::Idle),
            pacing,
            cancellation,
        }
    }

    /// Current checkpoint contents, for observation only.
    pub async fn checkpoint_snapshot(&self) -> Checkpoint {
        self.checkpoint.lock().await.clone()
    }

    /// Starts a drain unless one is already active. A request arriving while
    /// a drain is in flight returns immediately; the active drain re-checks
    /// queue emptiness before going idle, so coalesced heights are never
    /// lost. Store failures abort the drain and are fatal to the caller.
    pub async fn request_drain(&self) -> Result<(), StoreError> {
        loop {
            if !self.try_begin_drain() {
                return Ok(());
            }

            let outcome = self.drain().await;
            self.finish_drain();

            match outcome {
                Err(err) => return Err(err),
                Ok(DrainStop::Empty) => {
                    // An enqueue may have raced the final pop; pick it up
                    // rather than waiting for the next trigger.
                    if self.queue.is_empty() || self.cancellation.is_cancelled() {
                        return Ok(());
                    }
                }
                Ok(DrainStop::Abandoned) | Ok(DrainStop::Cancelled) => return Ok(()),
            }
        }
    }

    fn try_begin_drain(&self) -> bool {
        let mut state = self.state.lock().expect("driver state poisoned");
        if *state == DriverState::Draining {
            return false;
        }
        *state = DriverState::Draining;
        true
    }

    fn finish_drain(&self) {
        *self.state.lock().expect("driver state poisoned") = DriverState::Idle;
    }

    async fn drain(&self) -> Result<DrainStop, StoreError> {
        while let Some(height) = self.queue.pop() {
            if self.cancellation.is_cancelled() {
                tracing::debug!(height, "drain interrupted by shutdown");
                return Ok(DrainStop::Cancelled);
            }

            {
                let checkpoint = self.checkpoint.lock().await;
                if checkpoint.is_processed(height) {
                    tracing::debug!(height, "skipping already processed block");
                    continue;
                }
            }

            match self.process_block(height).await? {
                BlockOutcome::Completed => {}
                BlockOutcome::Abandoned => {
                    self.queue.requeue_front(height);
                    self.telemetry.record_abandoned_block();
                    return Ok(DrainStop::Abandoned);
                }
                BlockOutcome::Cancelled => return Ok(DrainStop::Cancelled),
            }

            if !self.pace().await {
                return Ok(DrainStop::Cancelled);
            }
        }

        Ok(DrainStop::Empty)
    }

    async fn process_block(&self, height: u64) -> Result<BlockOutcome, StoreError> {
        tracing::info!(height, "processing block");

        let events = match self.gateway.events_in_block(height).await {
            Ok(events) => events,
            Err(err) => {
                tracing::warn!(
                    height,
                    error = %err,
                    "block scan failed; leaving height for a later drain"
                );
                return Ok(BlockOutcome::Abandoned);
            }
        };

        for event in &events {
            if self.cancellation.is_cancelled() {
                return Ok(BlockOutcome::Cancelled);
            }
            match self.process_event(event).await? {
                EventOutcome::Handled | EventOutcome::Skipped => {}
                EventOutcome::Failed => return Ok(BlockOutcome::Abandoned),
            }
        }

        let mut checkpoint = self.checkpoint.lock().await;
        checkpoint.advance(height);
        self.store.save(&checkpoint).await?;
        drop(checkpoint);

        self.progress.mark_processed(height);
        self.telemetry.record_processed_block();
        tracing::info!(height, events = events.len(), "block fully processed");
        Ok(BlockOutcome::Completed)
    }

    async fn process_event(&self, event: &PendingEvent) -> Result<EventOutcome, StoreError> {
        {
            let checkpoint = self.checkpoint.lock().await;
            if checkpoint.is_handled(&event.key) {
                tracing::info!(key = %event.key, "event already handled; skipping");
                self.telemetry.record_skipped_event();
                return Ok(EventOutcome::Skipped);
            }
        }

        match self.gateway.respond(event).await {
            Ok(confirmation) => {
                let mut checkpoint = self.checkpoint.lock().await;
                checkpoint.mark_handled(event.key.clone());
                self.store.save(&checkpoint).await?;
                drop(checkpoint);

                self.telemetry.record_responded_event();
                tracing::info!(
                    key = %event.key,
                    response_tx = %confirmation.response_tx,
                    "response confirmed"
                );
                Ok(EventOutcome::Handled)
            }
            Err(err) => {
                tracing::warn!(
                    key = %event.key,
                    height = event.block_number,
                    error = %err,
                    "response failed; abandoning remainder of block"
                );
                Ok(EventOutcome::Failed)
            }
        }
    }

    /// Fixed inter-block delay bounding the request rate against the gateway.
    /// Returns false when shutdown fired during the wait.
    async fn pace(&self) -> bool {
        if self.pacing.is_zero() {
            return !self.cancellation.is_cancelled();
        }
        tokio::select! {
            _ = self.cancellation.cancelled() => false,
            _ = sleep(self.pacing) => true,
        }
    }
}
