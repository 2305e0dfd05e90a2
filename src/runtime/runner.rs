//! Wires the store, gateway, queue, and driver together and owns the process
//! lifecycle: startup backfill, live block watching, telemetry, shutdown.

use crate::checkpoint::{CheckpointStore, FileCheckpointStore};
use crate::gateway::{ChainGateway, EthGateway, EthGatewayParams};
use crate::pipeline::{BlockQueue, DriverParams, PipelineDriver, ProgressTracker};
use crate::rpc::{EthRpcClient, RpcClientOptions};
use crate::runtime::config::RelayConfig;
use crate::runtime::fatal::FatalErrorHandler;
use crate::runtime::telemetry::{self, Telemetry};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Coordinates the relay lifecycle and handles OS signals for graceful
/// shutdowns. Generic over the gateway and store so tests can substitute
/// scripted collaborators; production wiring goes through
/// [`Runner::from_config`].
pub struct Runner<G, S> {
    config: RelayConfig,
    gateway: Arc<G>,
    store: Arc<S>,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
}

impl Runner<EthGateway, FileCheckpointStore> {
    /// Production wiring: JSON-RPC gateway plus the file-backed checkpoint
    /// store, all derived from a validated configuration.
    pub fn from_config(config: RelayConfig) -> Result<Self> {
        let shutdown = CancellationToken::new();

        let options = RpcClientOptions {
            request_timeout: config.rpc_timeout(),
            max_request_body_bytes: config.max_request_body_bytes(),
            max_response_body_bytes: config.max_response_body_bytes(),
        };
        let client = Arc::new(EthRpcClient::with_options(
            config.rpc_url().to_owned(),
            options,
        )?);
        let gateway = EthGateway::new(
            client,
            EthGatewayParams {
                contract_address: config.contract_address().to_owned(),
                from_address: config.from_address().to_owned(),
                ping_topic: config.ping_topic().to_owned(),
                pong_selector: config.pong_selector().to_owned(),
                retry_policy: config.retry_policy(),
                confirmation_policy: config.confirmation_policy(),
            },
            shutdown.clone(),
        );
        let store = FileCheckpointStore::new(config.state_path());

        Ok(Self::with_collaborators(config, gateway, store, shutdown))
    }
}

impl<G, S> Runner<G, S>
where
    G: ChainGateway + 'static,
    S: CheckpointStore + 'static,
{
    pub fn with_collaborators(
        config: RelayConfig,
        gateway: G,
        store: S,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            gateway: Arc::new(gateway),
            store: Arc::new(store),
            telemetry: Arc::new(Telemetry::default()),
            shutdown,
        }
    }

    /// Returns a clone of the root shutdown token so external callers can
    /// integrate with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Runs until a Ctrl-C (SIGINT) is received, the shutdown token is
    /// cancelled elsewhere, or a fatal error stops the pipeline.
    pub async fn run_until_ctrl_c(&self) -> Result<()> {
        let shutdown = self.shutdown.clone();
        let signal_task = tokio::spawn(async move {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    tracing::info!("Ctrl-C received; initiating shutdown");
                    shutdown.cancel();
                }
                _ = shutdown.cancelled() => {}
            }
        });

        let result = self.run().await;
        self.shutdown.cancel();
        let _ = signal_task.await;
        result
    }

    /// Startup sequence (run once): establish the chain height, load or
    /// initialize the checkpoint, enqueue the backfill gap, drain it, then
    /// follow live blocks until cancelled. Startup failures are fatal.
    pub async fn run(&self) -> Result<()> {
        let current_height = self
            .gateway
            .current_height()
            .await
            .context("cannot establish current chain height at startup")?;
        let checkpoint = self
            .store
            .load_or_init(current_height)
            .await
            .context("cannot establish a durable checkpoint")?;

        tracing::info!(
            starting_block = checkpoint.starting_block,
            last_processed = ?checkpoint.last_processed_block,
            current_height,
            "checkpoint loaded"
        );

        let progress = Arc::new(ProgressTracker::new(checkpoint.last_processed_block));
        let queue = Arc::new(BlockQueue::new(progress.clone()));
        let backfill_from = checkpoint.next_height();
        let driver = Arc::new(PipelineDriver::new(DriverParams {
            gateway: self.gateway.clone(),
            store: self.store.clone(),
            queue: queue.clone(),
            progress: progress.clone(),
            telemetry: self.telemetry.clone(),
            checkpoint,
            pacing: self.config.block_pacing(),
            cancellation: self.shutdown.clone(),
        }));

        let fatal = FatalErrorHandler::new(self.shutdown.clone());
        let reporter = telemetry::spawn_metrics_reporter(
            self.telemetry.clone(),
            queue.clone(),
            progress,
            self.shutdown.clone(),
            self.config.metrics_interval(),
        );

        if backfill_from <= current_height {
            for height in backfill_from..=current_height {
                queue.enqueue(height);
            }
            tracing::info!(
                from = backfill_from,
                to = current_height,
                "backfill range enqueued"
            );
        }

        let mut watcher = None;
        match driver.request_drain().await {
            Err(err) => {
                fatal.trigger("startup drain", err.into());
            }
            Ok(()) => {
                tracing::info!("startup drain finished; following live blocks");
                watcher = Some(spawn_block_watcher(WatcherParams {
                    gateway: self.gateway.clone(),
                    queue,
                    driver,
                    fatal: fatal.clone(),
                    shutdown: self.shutdown.clone(),
                    poll_interval: self.config.poll_interval(),
                    last_seen: current_height,
                }));
            }
        }

        self.shutdown.cancelled().await;

        if let Some(handle) = watcher {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "block watcher task panicked");
            }
        }
        if let Err(err) = reporter.await {
            tracing::warn!(error = %err, "metrics reporter task panicked");
        }

        match fatal.error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

struct WatcherParams<G, S> {
    gateway: Arc<G>,
    queue: Arc<BlockQueue>,
    driver: Arc<PipelineDriver<G, S>>,
    fatal: FatalErrorHandler,
    shutdown: CancellationToken,
    poll_interval: Duration,
    last_seen: u64,
}

/// Polls the chain height on an interval, enqueues every height observed
/// since the last poll, and triggers a coalesced drain. Transient poll
/// failures are logged and skipped; only store failures are fatal.
fn spawn_block_watcher<G, S>(params: WatcherParams<G, S>) -> JoinHandle<()>
where
    G: ChainGateway + 'static,
    S: CheckpointStore + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(params.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_seen = params.last_seen;

        loop {
            tokio::select! {
                _ = params.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match params.gateway.current_height().await {
                        Ok(tip) => {
                            if tip > last_seen {
                                let mut queued = 0u64;
                                for height in (last_seen + 1)..=tip {
                                    if params.queue.enqueue(height) {
                                        queued += 1;
                                    }
                                }
                                tracing::debug!(tip, queued, "live blocks observed");
                                last_seen = tip;
                            }
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to poll chain height");
                        }
                    }

                    // Drain on every tick: a previously abandoned height may
                    // still be queued even when the tip did not move.
                    if let Err(err) = params.driver.request_drain().await {
                        params.fatal.trigger("live drain", err.into());
                        break;
                    }
                }
            }
        }

        tracing::info!("block watcher stopped");
    })
}
