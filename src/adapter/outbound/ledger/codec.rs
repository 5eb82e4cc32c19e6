//! JSON-RPC 2.0 framing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LedgerError;

const JSONRPC_VERSION: &str = "2.0";

/// Outgoing request frame.
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a Value,
}

impl<'a> RpcRequest<'a> {
    #[must_use]
    pub fn new(id: u64, method: &'a str, params: &'a Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionParams {
    subscription: String,
    result: Value,
}

/// Any frame the node may send.
#[derive(Debug, Deserialize)]
struct RawFrame {
    id: Option<u64>,
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorObject>,
    method: Option<String>,
    params: Option<SubscriptionParams>,
}

/// Decoded incoming frame.
#[derive(Debug)]
pub enum Incoming {
    Response {
        id: u64,
        result: Result<Value, LedgerError>,
    },
    Notification {
        subscription: String,
        result: Value,
    },
    Other,
}

/// Decode a text frame received from the node.
///
/// # Errors
///
/// Returns an error if the frame is not valid JSON-RPC.
pub fn parse_incoming(text: &str) -> Result<Incoming, serde_json::Error> {
    let frame: RawFrame = serde_json::from_str(text)?;

    if let Some(id) = frame.id {
        let result = match frame.error {
            Some(err) => Err(LedgerError::Rpc {
                code: err.code,
                message: err.message,
            }),
            None => Ok(frame.result),
        };
        return Ok(Incoming::Response { id, result });
    }

    match (frame.method.as_deref(), frame.params) {
        (Some("eth_subscription"), Some(params)) => Ok(Incoming::Notification {
            subscription: params.subscription,
            result: params.result,
        }),
        _ => Ok(Incoming::Other),
    }
}
