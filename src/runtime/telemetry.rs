use crate::pipeline::progress::ProgressTracker;
use crate::pipeline::queue::BlockQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls
/// back to `info`. Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Lightweight rolling counters used to derive runtime metrics.
#[derive(Default, Debug)]
pub struct Telemetry {
    processed_blocks: AtomicU64,
    responded_events: AtomicU64,
    skipped_events: AtomicU64,
    abandoned_blocks: AtomicU64,
}

impl Telemetry {
    pub fn record_processed_block(&self) {
        self.processed_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_responded_event(&self) {
        self.responded_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_event(&self) {
        self.skipped_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned_block(&self) {
        self.abandoned_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            processed_blocks: self.processed_blocks.load(Ordering::Relaxed),
            responded_events: self.responded_events.load(Ordering::Relaxed),
            skipped_events: self.skipped_events.load(Ordering::Relaxed),
            abandoned_blocks: self.abandoned_blocks.load(Ordering::Relaxed),
        }
    }

    pub fn processed_blocks(&self) -> u64 {
        self.processed_blocks.load(Ordering::Relaxed)
    }

    pub fn responded_events(&self) -> u64 {
        self.responded_events.load(Ordering::Relaxed)
    }

    pub fn skipped_events(&self) -> u64 {
        self.skipped_events.load(Ordering::Relaxed)
    }

    pub fn abandoned_blocks(&self) -> u64 {
        self.abandoned_blocks.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TelemetrySnapshot {
    pub processed_blocks: u64,
    pub responded_events: u64,
    pub skipped_events: u64,
    pub abandoned_blocks: u64,
}

/// Spawns a background task that periodically logs throughput, queue depth,
/// and the processed frontier.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    queue: Arc<BlockQueue>,
    progress: Arc<ProgressTracker>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "pongrelay::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let snapshot = telemetry.snapshot();
                    tracing::info!(
                        target: "pongrelay::metrics",
                        last_processed = ?progress.last_processed(),
                        queue_blocks = queue.len(),
                        processed = snapshot.processed_blocks,
                        responded = snapshot.responded_events,
                        skipped = snapshot.skipped_events,
                        abandoned = snapshot.abandoned_blocks,
                        "runtime metrics snapshot"
                    );
                }
            }
        }
    })
}
