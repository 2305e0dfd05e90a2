//! Ethereum gateway: wraps the JSON-RPC client with the retry executor and
//! normalizes raw logs into [`PendingEvent`]s before they reach the driver.

use super::types::{ChainGateway, GatewayError, PendingEvent, ResponseConfirmation};
use crate::rpc::client::EthRpcClient;
use crate::rpc::payload::{encode_response_call, LogFilter, TransactionRequest};
use crate::rpc::retry::{retry_with_policy, RetryPolicy};
use anyhow::{anyhow, Context, Result};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct EthGatewayParams {
    /// Contract emitting the notification event and receiving responses.
    pub contract_address: String,
    /// Account the node signs response transactions with.
    pub from_address: String,
    /// topic0 of the notification event.
    pub ping_topic: String,
    /// 4-byte selector of the response function.
    pub pong_selector: String,
    /// Policy for height queries, event scans, and submission.
    pub retry_policy: RetryPolicy,
    /// Policy for the confirmation wait; one attempt per receipt poll.
    pub confirmation_policy: RetryPolicy,
}

pub struct EthGateway {
    client: Arc<EthRpcClient>,
    params: EthGatewayParams,
    cancellation: CancellationToken,
}

impl EthGateway {
    pub fn new(
        client: Arc<EthRpcClient>,
        params: EthGatewayParams,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            client,
            params,
            cancellation,
        }
    }

    async fn retried<T, F, Fut>(
        &self,
        operation: &'static str,
        policy: RetryPolicy,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        retry_with_policy(
            policy,
            Some(&self.cancellation),
            |_| op(),
            |attempt, delay, err| {
                tracing::warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "chain operation failed; retrying"
                );
            },
        )
        .await
    }
}

impl ChainGateway for EthGateway {
    fn current_height(&self) -> BoxFuture<'_, Result<u64, GatewayError>> {
        Box::pin(async move {
            self.retried("eth_blockNumber", self.params.retry_policy, move || {
                self.client.block_number()
            })
            .await
            .map_err(|source| GatewayError::RetryExhausted {
                operation: "height query",
                source,
            })
        })
    }

    fn events_in_block(
        &self,
        height: u64,
    ) -> BoxFuture<'_, Result<Vec<PendingEvent>, GatewayError>> {
        Box::pin(async move {
            let filter = LogFilter::single_block(
                height,
                &self.params.contract_address,
                &self.params.ping_topic,
            );
            let logs = {
                let filter = &filter;
                self.retried("eth_getLogs", self.params.retry_policy, move || {
                    self.client.logs(filter)
                })
                .await
            }
            .map_err(|source| GatewayError::RetryExhausted {
                operation: "event scan",
                source,
            })?;

            let mut events = Vec::with_capacity(logs.len());
            for log in logs {
                if log.removed {
                    tracing::debug!(height, tx = %log.transaction_hash, "skipping removed log");
                    continue;
                }
                let call_data =
                    encode_response_call(&self.params.pong_selector, &log.transaction_hash)
                        .context("failed to build response call data")
                        .map_err(|source| GatewayError::RetryExhausted {
                            operation: "event scan",
                            source,
                        })?;
                events.push(PendingEvent {
                    block_number: height,
                    key: log.transaction_hash,
                    call_data,
                });
            }
            Ok(events)
        })
    }

    fn respond<'a>(
        &'a self,
        event: &'a PendingEvent,
    ) -> BoxFuture<'a, Result<ResponseConfirmation, GatewayError>> {
        Box::pin(async move {
            let response_tx = self
                .retried(
                    "eth_sendTransaction",
                    self.params.retry_policy,
                    move || async move {
                        // Gas price is fetched fresh for every attempt.
                        let gas_price = self
                            .client
                            .gas_price()
                            .await
                            .context("failed to fetch gas price")?;
                        let request = TransactionRequest {
                            from: self.params.from_address.clone(),
                            to: self.params.contract_address.clone(),
                            data: event.call_data.clone(),
                            gas_price: Some(gas_price),
                        };
                        self.client.send_transaction(&request).await
                    },
                )
                .await
                .map_err(|source| GatewayError::SubmissionFailed { source })?;

            tracing::debug!(
                key = %event.key,
                response_tx = %response_tx,
                "response submitted; awaiting confirmation"
            );

            let receipt = {
                let response_tx = &response_tx;
                self.retried(
                    "eth_getTransactionReceipt",
                    self.params.confirmation_policy,
                    move || async move {
                        match self.client.transaction_receipt(response_tx).await? {
                            Some(receipt) => Ok(receipt),
                            None => Err(anyhow!("response {response_tx} is not yet mined")),
                        }
                    },
                )
                .await
            }
            .map_err(|source| GatewayError::ConfirmationTimedOut {
                response_tx: response_tx.clone(),
                source,
            })?;

            if !receipt.succeeded() {
                return Err(GatewayError::SubmissionFailed {
                    source: anyhow!(
                        "response {response_tx} reverted with status {}",
                        receipt.status
                    ),
                });
            }

            Ok(ResponseConfirmation { response_tx })
        })
    }
}
