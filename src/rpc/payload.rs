//! Ethereum JSON-RPC wire shapes plus the quantity and call-data helpers
//! shared by the client and the gateway.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Filter object accepted by `eth_getLogs`, always scoped to a single block
/// so a scan never re-fetches heights the checkpoint already covers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    pub from_block: String,
    pub to_block: String,
    pub address: String,
    pub topics: Vec<String>,
}

impl LogFilter {
    pub fn single_block(height: u64, address: &str, topic: &str) -> Self {
        let block = format_quantity(height);
        Self {
            from_block: block.clone(),
            to_block: block,
            address: address.to_owned(),
            topics: vec![topic.to_owned()],
        }
    }
}

/// Log entry returned by `eth_getLogs`. Only the fields the pipeline reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub transaction_hash: String,
    pub block_number: String,
    #[serde(default)]
    pub removed: bool,
}

/// Parameters for `eth_sendTransaction`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub from: String,
    pub to: String,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
}

/// Receipt returned by `eth_getTransactionReceipt` once a transaction mines.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    pub block_number: String,
    pub status: String,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        self.status == "0x1"
    }
}

/// Parses a 0x-prefixed hex quantity into a `u64`.
pub fn parse_quantity(value: &str) -> Result<u64> {
    let digits = value
        .strip_prefix("0x")
        .with_context(|| format!("quantity {value:?} is missing the 0x prefix"))?;
    if digits.is_empty() {
        bail!("quantity {value:?} has no digits");
    }
    u64::from_str_radix(digits, 16).with_context(|| format!("quantity {value:?} is not valid hex"))
}

/// Formats a `u64` as a 0x-prefixed hex quantity without leading zeros.
pub fn format_quantity(value: u64) -> String {
    format!("{value:#x}")
}

/// Decodes a 0x-prefixed hex string, enforcing an exact byte width.
pub fn decode_fixed_hex(value: &str, width: usize) -> Result<Vec<u8>> {
    let digits = value
        .strip_prefix("0x")
        .with_context(|| format!("hex value {value:?} is missing the 0x prefix"))?;
    let bytes =
        hex::decode(digits).with_context(|| format!("hex value {value:?} is not valid hex"))?;
    if bytes.len() != width {
        bail!(
            "hex value {value:?} must be {width} bytes, got {}",
            bytes.len()
        );
    }
    Ok(bytes)
}

/// Assembles response call data: the 4-byte selector followed by the 32-byte
/// event key.
pub fn encode_response_call(selector: &str, key: &str) -> Result<String> {
    let selector_bytes = decode_fixed_hex(selector, 4).context("invalid response selector")?;
    let key_bytes = decode_fixed_hex(key, 32).context("invalid event key")?;

    let mut data = Vec::with_capacity(selector_bytes.len() + key_bytes.len());
    data.extend_from_slice(&selector_bytes);
    data.extend_from_slice(&key_bytes);
    Ok(format!("0x{}", hex::encode(data)))
}
