use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Scriptable in-memory chain served over Ethereum JSON-RPC: a movable tip,
/// per-height Ping logs, and transactions that mine after a configurable
/// number of receipt polls.
#[derive(Clone)]
pub struct MockChain {
    inner: Arc<RwLock<MockChainInner>>,
    tip: Arc<AtomicU64>,
    fail_sends: Arc<AtomicBool>,
}

struct MockChainInner {
    contract: String,
    topic: String,
    logs: HashMap<u64, Vec<Value>>,
    receipts: HashMap<String, PendingReceipt>,
    sent: Vec<Value>,
    next_nonce: u64,
    receipt_delay: u32,
}

struct PendingReceipt {
    polls_remaining: u32,
    mined_in: u64,
}

impl MockChain {
    pub fn new(tip: u64, contract: &str, topic: &str) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MockChainInner {
                contract: contract.to_owned(),
                topic: topic.to_owned(),
                logs: HashMap::new(),
                receipts: HashMap::new(),
                sent: Vec::new(),
                next_nonce: 0,
                receipt_delay: 1,
            })),
            tip: Arc::new(AtomicU64::new(tip)),
            fail_sends: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn tip(&self) -> u64 {
        self.tip.load(Ordering::SeqCst)
    }

    pub fn advance_tip_to(&self, height: u64) {
        self.tip.store(height, Ordering::SeqCst);
    }

    /// Plants a Ping log in `height` and returns its event key.
    pub fn add_ping(&self, height: u64, seed: u8) -> String {
        let mut inner = self.inner.write().expect("mock chain poisoned");
        let key = make_key(seed);
        let log = json!({
            "address": inner.contract,
            "topics": [inner.topic],
            "data": "0x",
            "blockNumber": format!("{height:#x}"),
            "transactionHash": key,
            "transactionIndex": "0x0",
            "blockHash": format!("0x{height:064x}"),
            "logIndex": "0x0",
            "removed": false,
        });
        inner.logs.entry(height).or_default().push(log);
        key
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn set_receipt_delay(&self, polls: u32) {
        self.inner
            .write()
            .expect("mock chain poisoned")
            .receipt_delay = polls;
    }

    /// Successfully accepted `eth_sendTransaction` payloads, in order.
    pub fn sent_transactions(&self) -> Vec<Value> {
        self.inner
            .read()
            .expect("mock chain poisoned")
            .sent
            .clone()
    }

    pub fn sent_count(&self) -> usize {
        self.inner.read().expect("mock chain poisoned").sent.len()
    }
}

/// Deterministic 32-byte event key derived from a seed byte.
pub fn make_key(seed: u8) -> String {
    format!("0x{}", format!("{seed:02x}").repeat(32))
}

pub struct MockRpcServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockRpcServer {
    pub async fn start(chain: MockChain) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock RPC listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let chain = chain.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| serve_request(chain.clone(), req)))
            }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock RPC server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{}", addr),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn serve_request(chain: MockChain, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::POST {
        let mut response = Response::new(Body::from("Unsupported method"));
        *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
        return Ok(response);
    }

    let bytes = match body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let mut response = Response::new(Body::from(format!("failed to read body: {err}")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => {
            let mut response = Response::new(Body::from(format!("invalid JSON payload: {err}")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    let response_value = if payload.is_array() {
        Value::Array(
            payload
                .as_array()
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|call| handle_call(&chain, call))
                .collect(),
        )
    } else {
        handle_call(&chain, payload)
    };

    let mut response = Response::new(Body::from(response_value.to_string()));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

fn handle_call(chain: &MockChain, call: Value) -> Value {
    let id = call.get("id").cloned().unwrap_or(Value::Null);
    let method = call
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let params = call
        .get("params")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));

    match method.as_str() {
        "eth_blockNumber" => success(id, json!(format!("{:#x}", chain.tip()))),
        "eth_gasPrice" => success(id, json!("0x3b9aca00")),
        "eth_getLogs" => handle_get_logs(chain, id, &params),
        "eth_sendTransaction" => handle_send_transaction(chain, id, &params),
        "eth_getTransactionReceipt" => handle_receipt(chain, id, &params),
        _ => error(id, -32601, format!("unknown method {method}")),
    }
}

fn handle_get_logs(chain: &MockChain, id: Value, params: &Value) -> Value {
    let filter = match params.as_array().and_then(|arr| arr.first()) {
        Some(filter) => filter,
        None => return error(id, -32602, "missing filter object"),
    };

    let from_block = filter
        .get("fromBlock")
        .and_then(Value::as_str)
        .and_then(parse_hex_quantity);
    let to_block = filter
        .get("toBlock")
        .and_then(Value::as_str)
        .and_then(parse_hex_quantity);
    let (from_block, to_block) = match (from_block, to_block) {
        (Some(from), Some(to)) => (from, to),
        _ => return error(id, -32602, "malformed block range"),
    };

    let address = filter.get("address").and_then(Value::as_str);
    let topic = filter
        .get("topics")
        .and_then(Value::as_array)
        .and_then(|topics| topics.first())
        .and_then(Value::as_str);

    let inner = chain.inner.read().expect("mock chain poisoned");
    let mut matches = Vec::new();
    for height in from_block..=to_block {
        if let Some(logs) = inner.logs.get(&height) {
            for log in logs {
                let address_matches =
                    address.is_none() || log.get("address").and_then(Value::as_str) == address;
                let topic_matches = topic.is_none()
                    || log
                        .get("topics")
                        .and_then(Value::as_array)
                        .and_then(|topics| topics.first())
                        .and_then(Value::as_str)
                        == topic;
                if address_matches && topic_matches {
                    matches.push(log.clone());
                }
            }
        }
    }

    success(id, Value::Array(matches))
}

fn handle_send_transaction(chain: &MockChain, id: Value, params: &Value) -> Value {
    if chain.fail_sends.load(Ordering::SeqCst) {
        return error(id, -32000, "transaction rejected");
    }

    let request = match params.as_array().and_then(|arr| arr.first()) {
        Some(request) => request.clone(),
        None => return error(id, -32602, "missing transaction object"),
    };

    let mined_in = chain.tip();
    let mut inner = chain.inner.write().expect("mock chain poisoned");
    inner.next_nonce += 1;
    let hash = format!("0x{:064x}", 0xf00d_0000_u64 + inner.next_nonce);
    let polls_remaining = inner.receipt_delay;
    inner.receipts.insert(
        hash.clone(),
        PendingReceipt {
            polls_remaining,
            mined_in,
        },
    );
    inner.sent.push(request);

    success(id, Value::String(hash))
}

fn handle_receipt(chain: &MockChain, id: Value, params: &Value) -> Value {
    let hash = match params
        .as_array()
        .and_then(|arr| arr.first())
        .and_then(Value::as_str)
    {
        Some(hash) => hash.to_owned(),
        None => return error(id, -32602, "missing transaction hash"),
    };

    let mut inner = chain.inner.write().expect("mock chain poisoned");
    match inner.receipts.get_mut(&hash) {
        None => success(id, Value::Null),
        Some(receipt) if receipt.polls_remaining > 0 => {
            receipt.polls_remaining -= 1;
            success(id, Value::Null)
        }
        Some(receipt) => {
            let mined_in = receipt.mined_in;
            success(
                id,
                json!({
                    "transactionHash": hash,
                    "blockNumber": format!("{mined_in:#x}"),
                    "status": "0x1",
                }),
            )
        }
    }
}

fn parse_hex_quantity(value: &str) -> Option<u64> {
    let digits = value.strip_prefix("0x")?;
    u64::from_str_radix(digits, 16).ok()
}

fn success(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    })
}

fn error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code,
            "message": message.into(),
        },
        "id": id,
    })
}
