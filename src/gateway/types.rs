use futures::future::BoxFuture;

/// Notification event awaiting a response, normalized at the gateway boundary
/// so no transport-specific shapes ever reach the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    /// Height of the block the event was observed in.
    pub block_number: u64,
    /// Triggering transaction hash; the durable dedup key.
    pub key: String,
    /// Fully encoded calldata for the response transaction.
    pub call_data: String,
}

/// Handle returned once a response transaction is confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseConfirmation {
    /// Hash of the confirmed response transaction.
    pub response_tx: String,
}

/// Failure surfaced by a gateway operation after the retry executor gives up.
/// All variants are non-fatal at the pipeline level: the driver abandons the
/// current block and leaves the checkpoint untouched.
#[derive(Debug)]
pub enum GatewayError {
    RetryExhausted {
        operation: &'static str,
        source: anyhow::Error,
    },
    SubmissionFailed {
        source: anyhow::Error,
    },
    ConfirmationTimedOut {
        response_tx: String,
        source: anyhow::Error,
    },
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::RetryExhausted { operation, source } => {
                write!(f, "{operation} failed after retries: {source}")
            }
            GatewayError::SubmissionFailed { source } => {
                write!(f, "response submission failed: {source}")
            }
            GatewayError::ConfirmationTimedOut {
                response_tx,
                source,
            } => {
                write!(
                    f,
                    "response {response_tx} was not confirmed in time: {source}"
                )
            }
        }
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GatewayError::RetryExhausted { source, .. }
            | GatewayError::SubmissionFailed { source }
            | GatewayError::ConfirmationTimedOut { source, .. } => Some(source.as_ref()),
        }
    }
}

/// Narrow façade over the chain: height queries, single-block event scans,
/// and confirmed response submission.
pub trait ChainGateway: Send + Sync {
    fn current_height(&self) -> BoxFuture<'_, Result<u64, GatewayError>>;

    /// Events of interest in exactly one block, in source order.
    fn events_in_block(
        &self,
        height: u64,
    ) -> BoxFuture<'_, Result<Vec<PendingEvent>, GatewayError>>;

    /// Submits the response for `event` and suspends until the chain confirms
    /// it. Submission and confirmation fail independently.
    fn respond<'a>(
        &'a self,
        event: &'a PendingEvent,
    ) -> BoxFuture<'a, Result<ResponseConfirmation, GatewayError>>;
}
