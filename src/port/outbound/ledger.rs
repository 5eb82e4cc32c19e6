//! Ledger node ports.
//!
//! A [`RpcTransport`] opens duplex sessions with the node. Each
//! [`RpcSession`] lives until the underlying connection ends; subscriptions
//! belong to the session that created them and die with it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::domain::CloseReason;
use crate::error::LedgerError;

/// Live server-side subscription.
#[derive(Debug)]
pub struct Subscription {
    /// Node-assigned subscription id.
    pub id: String,
    /// Notification payloads (the `result` field of `eth_subscription`).
    pub notifications: mpsc::Receiver<Value>,
}

/// One open duplex session with the node.
#[async_trait]
pub trait RpcSession: Send + Sync {
    /// Send a JSON-RPC request and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Rpc`] for node-side errors and
    /// [`LedgerError::Closed`] if the session ends before a response arrives.
    async fn request(&self, method: &str, params: Value) -> Result<Value, LedgerError>;

    /// Open an `eth_subscribe` subscription with the given params.
    ///
    /// # Errors
    ///
    /// Returns an error if the node rejects the subscription.
    async fn subscribe(&self, params: Value) -> Result<Subscription, LedgerError>;

    /// Resolve once the session has ended, with the reason.
    async fn closed(&self) -> CloseReason;

    /// Request a normal closure. Completion is observed through [`closed`](Self::closed).
    async fn close(&self);
}

/// Factory for node sessions.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Open a fresh session.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Connect`] if the transport cannot be established.
    async fn open(&self) -> Result<Arc<dyn RpcSession>, LedgerError>;

    /// Endpoint description for logs.
    fn endpoint(&self) -> String;
}

/// Minimal capability to issue calls against the node.
///
/// Contract bindings and the transaction pipeline depend on this rather than
/// on the connection type.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Issue a JSON-RPC call on the current session.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotConnected`] when no session is open.
    async fn call(&self, method: &str, params: Value) -> Result<Value, LedgerError>;
}
