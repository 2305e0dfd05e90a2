use std::{
    path::Path,
    time::{Duration, Instant},
};

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use pongrelay::{Checkpoint, RelayConfig, Runner};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

pub fn contract_address() -> String {
    format!("0x{}", "11".repeat(20))
}

pub fn from_address() -> String {
    format!("0x{}", "22".repeat(20))
}

pub fn ping_topic() -> String {
    format!("0x{}", "33".repeat(32))
}

pub const PONG_SELECTOR: &str = "0x11223344";

/// Configuration tuned for fast test turnaround: short retries, a 50 ms tip
/// poll, and millisecond pacing.
pub fn test_config(url: &str, state_path: &Path) -> RelayConfig {
    RelayConfig::builder()
        .rpc_url(url)
        .contract_address(contract_address())
        .from_address(from_address())
        .ping_topic(ping_topic())
        .pong_selector(PONG_SELECTOR)
        .state_path(state_path)
        .rpc_timeout(Duration::from_secs(2))
        .retry_max_attempts(2)
        .retry_delay(Duration::from_millis(10))
        .confirm_max_attempts(5)
        .confirm_delay(Duration::from_millis(10))
        .block_pacing(Duration::from_millis(5))
        .poll_interval(Duration::from_millis(50))
        .metrics_interval(Duration::from_secs(1))
        .build()
        .expect("test config must build")
}

/// A relay running in a background task until stopped.
pub struct RunningRelay {
    handle: JoinHandle<Result<()>>,
    shutdown: CancellationToken,
}

impl RunningRelay {
    pub async fn stop(self) -> Result<()> {
        self.shutdown.cancel();
        self.handle.await.expect("relay task must not panic")
    }
}

pub fn start_relay(config: RelayConfig) -> Result<RunningRelay> {
    let runner = Runner::from_config(config)?;
    let shutdown = runner.cancellation_token();
    let handle = tokio::spawn(async move { runner.run().await });
    Ok(RunningRelay { handle, shutdown })
}

/// Polls the checkpoint file until `pred` holds or the timeout expires.
pub async fn wait_for_checkpoint<F>(
    path: &Path,
    timeout: Duration,
    pred: F,
) -> Result<Checkpoint>
where
    F: Fn(&Checkpoint) -> bool,
{
    let start = Instant::now();
    loop {
        if let Ok(bytes) = tokio::fs::read(path).await {
            if let Ok(checkpoint) = serde_json::from_slice::<Checkpoint>(&bytes) {
                if pred(&checkpoint) {
                    return Ok(checkpoint);
                }
            }
        }

        if start.elapsed() > timeout {
            bail!(
                "checkpoint at {} did not reach the expected state within {:?}",
                path.display(),
                timeout
            );
        }

        sleep(Duration::from_millis(20)).await;
    }
}
