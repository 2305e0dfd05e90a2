//! Bounded fixed-delay retry executor wrapping every remote interaction.

use anyhow::{anyhow, Result};
use std::time::Duration;
use tokio::task::yield_now;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_RETRY_MAX_ATTEMPTS: usize = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(2_000);

/// Retry schedule: at most `max_attempts` tries with a fixed `delay` between
/// them. The delay is constant, not exponential; callers that need a longer
/// window raise the attempt count instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// Invokes `operation` until it succeeds or the attempt bound is reached.
///
/// `on_retry(attempt, delay, err)` runs before each inter-attempt sleep so
/// callers can log with their own context. After the final failed attempt the
/// last error is returned unchanged, never a synthetic one.
pub async fn retry_with_policy<'a, T, F, Fut, L>(
    policy: RetryPolicy,
    cancellation: Option<&'a CancellationToken>,
    mut operation: F,
    mut on_retry: L,
) -> Result<T>
where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
    L: FnMut(usize, Duration, &anyhow::Error),
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        if let Some(token) = cancellation {
            if token.is_cancelled() {
                return Err(anyhow!("retry cancelled"));
            }
        }

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_attempts {
                    return Err(err);
                }
                on_retry(attempt, policy.delay, &err);
                sleep_with_cancellation(policy.delay, cancellation).await?;
            }
        }
    }
}

async fn sleep_with_cancellation(
    delay: Duration,
    cancellation: Option<&CancellationToken>,
) -> Result<()> {
    if delay.is_zero() {
        yield_now().await;
        return Ok(());
    }

    if let Some(token) = cancellation {
        tokio::select! {
            _ = token.cancelled() => Err(anyhow!("retry cancelled")),
            _ = sleep(delay) => Ok(()),
        }
    } else {
        sleep(delay).await;
        Ok(())
    }
}
