//! Ethereum JSON-RPC client used by the chain gateway. Houses the
//! `EthRpcClient`, its error type, and per-call timeout/metrics plumbing.
//!
//! Calls are single-shot on purpose: bounded retries belong to the gateway
//! layer so each operation can pick its own policy and error class.

use crate::rpc::metrics::{RpcMetrics, RpcMetricsSnapshot};
use crate::rpc::options::RpcClientOptions;
use crate::rpc::payload::{
    parse_quantity, LogEntry, LogFilter, TransactionReceipt, TransactionRequest,
};
use anyhow::{anyhow, Context, Result};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::time::{timeout, Instant};

#[derive(Debug)]
pub enum RpcError {
    Timeout { method: &'static str },
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::Timeout { method } => write!(f, "rpc method {method} timed out"),
        }
    }
}

impl std::error::Error for RpcError {}

#[derive(Debug, Clone)]
pub struct EthRpcClient {
    rpc_url: Arc<String>,
    client: HttpClient,
    options: RpcClientOptions,
    metrics: Arc<RpcMetrics>,
}

impl EthRpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_options(url, RpcClientOptions::default())
    }

    pub fn with_options(url: impl Into<String>, options: RpcClientOptions) -> Result<Self> {
        options.validate()?;

        let rpc_url = url.into();
        let max_request_body_size = options.max_request_body_bytes.min(u32::MAX as usize) as u32;
        let max_response_body_size = options.max_response_body_bytes.min(u32::MAX as usize) as u32;

        let client = HttpClientBuilder::default()
            .request_timeout(options.request_timeout)
            .max_request_size(max_request_body_size)
            .max_response_size(max_response_body_size)
            .build(&rpc_url)
            .map_err(|err| anyhow!("failed to build RPC client: {err}"))?;

        Ok(Self {
            rpc_url: Arc::new(rpc_url),
            client,
            options,
            metrics: Arc::new(RpcMetrics::default()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.rpc_url
    }

    pub fn metrics(&self) -> RpcMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Current chain height via `eth_blockNumber`.
    pub async fn block_number(&self) -> Result<u64> {
        let raw: String = self.execute("eth_blockNumber", rpc_params![]).await?;
        parse_quantity(&raw).context("eth_blockNumber returned a malformed quantity")
    }

    /// Logs matching `filter` via `eth_getLogs`.
    pub async fn logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>> {
        self.execute("eth_getLogs", rpc_params![filter]).await
    }

    /// Current gas price quantity via `eth_gasPrice`.
    pub async fn gas_price(&self) -> Result<String> {
        self.execute("eth_gasPrice", rpc_params![]).await
    }

    /// Submits `request` via `eth_sendTransaction`; returns the transaction hash.
    pub async fn send_transaction(&self, request: &TransactionRequest) -> Result<String> {
        self.execute("eth_sendTransaction", rpc_params![request])
            .await
    }

    /// Receipt for `tx_hash`, or `None` while the transaction is unmined.
    pub async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TransactionReceipt>> {
        self.execute("eth_getTransactionReceipt", rpc_params![tx_hash])
            .await
    }

    async fn execute<R>(&self, method: &'static str, params: ArrayParams) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let start = Instant::now();

        match timeout(
            self.options.request_timeout,
            self.client.request(method, params),
        )
        .await
        {
            Err(_) => {
                self.metrics.record_timeout(start.elapsed());
                Err(RpcError::Timeout { method }.into())
            }
            Ok(Err(err)) => {
                self.metrics.record_failure(start.elapsed());
                Err(anyhow!("rpc {method} call failed: {err}"))
            }
            Ok(Ok(value)) => {
                self.metrics.record_success(start.elapsed());
                tracing::trace!(method, "rpc call completed");
                Ok(value)
            }
        }
    }
}
