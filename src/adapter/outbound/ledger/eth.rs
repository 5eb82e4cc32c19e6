//! Typed helpers for the `eth_*` calls the keeper uses.
//!
//! Quantities arrive hex-encoded; `alloy-primitives` serde support decodes
//! them directly into `U256`/`U64`/`B256`.

use alloy_primitives::{Address, Bytes, B256, U256, U64};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::domain::ReceiptSummary;
use crate::error::LedgerError;
use crate::port::LedgerRpc;

fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, LedgerError> {
    serde_json::from_value(value).map_err(|e| LedgerError::Decode(format!("{method}: {e}")))
}

fn u64_from(method: &str, value: Value) -> Result<u64, LedgerError> {
    let quantity: U64 = decode(method, value)?;
    Ok(quantity.to::<u64>())
}

/// Execute a read-only call against `to` at the latest block.
///
/// # Errors
///
/// Returns any node error or a decode error for a non-hex result.
pub async fn call<R: LedgerRpc + ?Sized>(rpc: &R, to: Address, data: &[u8]) -> Result<Bytes, LedgerError> {
    let params = json!([{ "to": to, "data": Bytes::copy_from_slice(data) }, "latest"]);
    let result = rpc.call("eth_call", params).await?;
    decode("eth_call", result)
}

/// # Errors
///
/// Returns any node or decode error.
pub async fn block_number<R: LedgerRpc + ?Sized>(rpc: &R) -> Result<u64, LedgerError> {
    let result = rpc.call("eth_blockNumber", json!([])).await?;
    u64_from("eth_blockNumber", result)
}

/// Pending-inclusive transaction count of `account`, used as the next nonce.
///
/// # Errors
///
/// Returns any node or decode error.
pub async fn transaction_count<R: LedgerRpc + ?Sized>(rpc: &R, account: Address) -> Result<u64, LedgerError> {
    let result = rpc
        .call("eth_getTransactionCount", json!([account, "pending"]))
        .await?;
    u64_from("eth_getTransactionCount", result)
}

/// # Errors
///
/// Returns any node or decode error.
pub async fn gas_price<R: LedgerRpc + ?Sized>(rpc: &R) -> Result<u128, LedgerError> {
    let result = rpc.call("eth_gasPrice", json!([])).await?;
    let price: U256 = decode("eth_gasPrice", result)?;
    u128::try_from(price).map_err(|e| LedgerError::Decode(format!("eth_gasPrice: {e}")))
}

/// Broadcast a signed, encoded transaction and return its hash.
///
/// # Errors
///
/// Returns the node's rejection (e.g. nonce too low) as [`LedgerError::Rpc`].
pub async fn send_raw_transaction<R: LedgerRpc + ?Sized>(rpc: &R, raw: &[u8]) -> Result<B256, LedgerError> {
    let result = rpc
        .call("eth_sendRawTransaction", json!([Bytes::copy_from_slice(raw)]))
        .await?;
    decode("eth_sendRawTransaction", result)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: B256,
    block_number: Option<U64>,
    gas_used: U64,
    status: Option<U64>,
}

/// Mined receipt for `hash`, or `None` while the transaction is pending.
///
/// # Errors
///
/// Returns any node or decode error.
pub async fn transaction_receipt<R: LedgerRpc + ?Sized>(
    rpc: &R,
    hash: B256,
) -> Result<Option<ReceiptSummary>, LedgerError> {
    let result = rpc.call("eth_getTransactionReceipt", json!([hash])).await?;
    if result.is_null() {
        return Ok(None);
    }
    let raw: RawReceipt = decode("eth_getTransactionReceipt", result)?;
    let Some(block_number) = raw.block_number else {
        return Ok(None);
    };
    Ok(Some(ReceiptSummary {
        hash: raw.transaction_hash,
        block_number: block_number.to::<u64>(),
        gas_used: raw.gas_used.to::<u64>(),
        success: raw.status.is_some_and(|s| s == U64::from(1)),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlockHeader {
    number: U64,
    gas_limit: U64,
}

/// Latest block's `(number, gas_limit)`.
///
/// # Errors
///
/// Returns any node error, or a decode error if the node has no latest block.
pub async fn latest_block<R: LedgerRpc + ?Sized>(rpc: &R) -> Result<(u64, u64), LedgerError> {
    let result = rpc
        .call("eth_getBlockByNumber", json!(["latest", false]))
        .await?;
    if result.is_null() {
        return Err(LedgerError::Decode("eth_getBlockByNumber: no latest block".to_string()));
    }
    let header: RawBlockHeader = decode("eth_getBlockByNumber", result)?;
    Ok((header.number.to::<u64>(), header.gas_limit.to::<u64>()))
}

/// # Errors
///
/// Returns any node or decode error.
pub async fn accounts<R: LedgerRpc + ?Sized>(rpc: &R) -> Result<Vec<Address>, LedgerError> {
    let result = rpc.call("eth_accounts", json!([])).await?;
    decode("eth_accounts", result)
}

/// # Errors
///
/// Returns any node or decode error.
pub async fn chain_id<R: LedgerRpc + ?Sized>(rpc: &R) -> Result<u64, LedgerError> {
    let result = rpc.call("eth_chainId", json!([])).await?;
    u64_from("eth_chainId", result)
}

/// Network id from `net_version`, which nodes return as a decimal string.
///
/// # Errors
///
/// Returns any node or decode error.
pub async fn network_id<R: LedgerRpc + ?Sized>(rpc: &R) -> Result<String, LedgerError> {
    let result = rpc.call("net_version", json!([])).await?;
    match result {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(LedgerError::Decode(format!("net_version: unexpected {other}"))),
    }
}

/// # Errors
///
/// Returns any node or decode error.
pub async fn net_listening<R: LedgerRpc + ?Sized>(rpc: &R) -> Result<bool, LedgerError> {
    let result = rpc.call("net_listening", json!([])).await?;
    decode("net_listening", result)
}
