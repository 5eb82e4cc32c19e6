//! In-memory ledger node doubles.
//!
//! - [`StaticRpc`]: [`LedgerRpc`] answering from per-method handlers and
//!   one-shot queues. Best for: contract bindings and the transaction
//!   pipeline.
//!
//! - [`ScriptedNode`]: [`RpcTransport`] whose sessions are served by a
//!   shared [`StaticRpc`] and can be dropped, silenced or refused on demand.
//!   Best for: connection state machine and reconnect scenarios.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};

use crate::domain::CloseReason;
use crate::error::LedgerError;
use crate::port::{LedgerRpc, RpcSession, RpcTransport, Subscription};

/// Account reported by the scripted node.
pub const NODE_ACCOUNT: &str = "0x00000000000000000000000000000000000000a1";

type Handler = Arc<dyn Fn(&Value) -> Result<Value, LedgerError> + Send + Sync>;

// ---------------------------------------------------------------------------
// StaticRpc
// ---------------------------------------------------------------------------

/// Scripted JSON-RPC responder.
///
/// Queued one-shot results for a method are served first; afterwards the
/// method's handler answers. Unknown methods fail with `-32601`.
#[derive(Default)]
pub struct StaticRpc {
    handlers: RwLock<HashMap<String, Handler>>,
    queued: Mutex<HashMap<String, VecDeque<Result<Value, LedgerError>>>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl StaticRpc {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `method` with `value`.
    #[must_use]
    pub fn with(self, method: &str, value: Value) -> Self {
        self.set(method, value);
        self
    }

    /// Always fail `method` with `error`.
    #[must_use]
    pub fn with_error(self, method: &str, error: LedgerError) -> Self {
        self.set_handler(method, move |_| Err(error.clone()));
        self
    }

    #[must_use]
    pub fn with_handler<F>(self, method: &str, handler: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, LedgerError> + Send + Sync + 'static,
    {
        self.set_handler(method, handler);
        self
    }

    pub fn set(&self, method: &str, value: Value) {
        self.set_handler(method, move |_| Ok(value.clone()));
    }

    pub fn set_handler<F>(&self, method: &str, handler: F)
    where
        F: Fn(&Value) -> Result<Value, LedgerError> + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .insert(method.to_string(), Arc::new(handler));
    }

    /// Serve `result` for the next call of `method` only.
    pub fn push(&self, method: &str, result: Result<Value, LedgerError>) {
        self.queued
            .lock()
            .entry(method.to_string())
            .or_default()
            .push_back(result);
    }

    /// Number of calls made to `method`.
    #[must_use]
    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|(m, _)| m == method).count()
    }

    /// Params of every call made to `method`, in order.
    #[must_use]
    pub fn requests(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    /// Answer one request.
    ///
    /// # Errors
    ///
    /// Returns the scripted error, or `-32601` for unknown methods.
    pub fn respond(&self, method: &str, params: &Value) -> Result<Value, LedgerError> {
        self.calls.lock().push((method.to_string(), params.clone()));

        if let Some(result) = self
            .queued
            .lock()
            .get_mut(method)
            .and_then(VecDeque::pop_front)
        {
            return result;
        }

        let handler = self.handlers.read().get(method).cloned();
        match handler {
            Some(handler) => handler(params),
            None => Err(LedgerError::Rpc {
                code: -32601,
                message: format!("method {method} not found"),
            }),
        }
    }
}

#[async_trait]
impl LedgerRpc for StaticRpc {
    async fn call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        self.respond(method, &params)
    }
}

/// Hash returned for every transaction accepted by [`mine_transactions`].
pub const MINED_HASH: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";

/// Accept every raw transaction and mine it in block 1 with `success`
/// status; the chain head sits far enough ahead to confirm immediately.
pub fn mine_transactions(rpc: &StaticRpc, success: bool) {
    rpc.set("eth_getTransactionCount", json!("0x0"));
    rpc.set("eth_gasPrice", json!("0x3b9aca00"));
    rpc.set("eth_sendRawTransaction", json!(MINED_HASH));
    rpc.set(
        "eth_getTransactionReceipt",
        json!({
            "transactionHash": MINED_HASH,
            "blockNumber": "0x1",
            "gasUsed": "0x5208",
            "status": if success { "0x1" } else { "0x0" },
        }),
    );
    rpc.set("eth_blockNumber", json!("0x64"));
}

// ---------------------------------------------------------------------------
// ScriptedNode
// ---------------------------------------------------------------------------

/// Controllable in-memory node.
///
/// Comes preloaded with the calls a connect handshake makes: network id
/// `999`, chain id `0x3e7`, a latest block with a 7,000,000 gas limit, one
/// account, and `net_listening = true`.
pub struct ScriptedNode {
    rpc: Arc<StaticRpc>,
    reachable: AtomicBool,
    unresponsive: Arc<AtomicBool>,
    opens: AtomicUsize,
    current: Mutex<Option<Arc<ScriptedSession>>>,
}

impl ScriptedNode {
    #[must_use]
    pub fn new() -> Arc<Self> {
        let rpc = StaticRpc::new()
            .with("net_version", json!("999"))
            .with("eth_chainId", json!("0x3e7"))
            .with(
                "eth_getBlockByNumber",
                json!({"number": "0x1", "gasLimit": "0x6acfc0"}),
            )
            .with("eth_accounts", json!([NODE_ACCOUNT]))
            .with("net_listening", json!(true))
            .with("eth_unsubscribe", json!(true));
        Arc::new(Self {
            rpc: Arc::new(rpc),
            reachable: AtomicBool::new(true),
            unresponsive: Arc::new(AtomicBool::new(false)),
            opens: AtomicUsize::new(0),
            current: Mutex::new(None),
        })
    }

    /// Responder shared by every session.
    #[must_use]
    pub fn rpc(&self) -> &StaticRpc {
        &self.rpc
    }

    /// Refuse new sessions while `false`.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Leave every request unanswered while `true`.
    pub fn set_unresponsive(&self, unresponsive: bool) {
        self.unresponsive.store(unresponsive, Ordering::SeqCst);
    }

    /// Sessions opened so far, including failed handshakes.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn current_session(&self) -> Option<Arc<ScriptedSession>> {
        self.current.lock().clone()
    }

    /// Close the current session from the node side.
    pub fn drop_connection(&self, code: Option<u16>, reason: &str) {
        if let Some(session) = self.current.lock().take() {
            session.finish(CloseReason::new(code, reason));
        }
    }

    /// Deliver a notification to every subscription of the current session.
    pub fn notify(&self, payload: Value) {
        if let Some(session) = self.current_session() {
            session.notify(payload);
        }
    }
}

#[async_trait]
impl RpcTransport for ScriptedNode {
    async fn open(&self) -> Result<Arc<dyn RpcSession>, LedgerError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(LedgerError::Connect("connection refused".to_string()));
        }
        let (closed_tx, _) = watch::channel(None);
        let session = Arc::new(ScriptedSession {
            rpc: Arc::clone(&self.rpc),
            unresponsive: Arc::clone(&self.unresponsive),
            closed_tx,
            subscriptions: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        });
        *self.current.lock() = Some(Arc::clone(&session));
        Ok(session)
    }

    fn endpoint(&self) -> String {
        "scripted://node".to_string()
    }
}

/// One session of a [`ScriptedNode`].
pub struct ScriptedSession {
    rpc: Arc<StaticRpc>,
    unresponsive: Arc<AtomicBool>,
    closed_tx: watch::Sender<Option<CloseReason>>,
    subscriptions: Mutex<Vec<mpsc::Sender<Value>>>,
    next_subscription: AtomicU64,
}

impl ScriptedSession {
    fn finish(&self, reason: CloseReason) {
        self.subscriptions.lock().clear();
        self.closed_tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    fn is_closed(&self) -> bool {
        self.closed_tx.borrow().is_some()
    }

    fn notify(&self, payload: Value) {
        for sender in self.subscriptions.lock().iter() {
            let _ = sender.try_send(payload.clone());
        }
    }

    /// Number of live subscriptions on this session.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

#[async_trait]
impl RpcSession for ScriptedSession {
    async fn request(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        if self.is_closed() {
            return Err(LedgerError::Closed("session closed".to_string()));
        }
        if self.unresponsive.load(Ordering::SeqCst) {
            let reason = self.closed().await;
            return Err(LedgerError::Closed(reason.to_string()));
        }
        self.rpc.respond(method, &params)
    }

    async fn subscribe(&self, params: Value) -> Result<Subscription, LedgerError> {
        self.request("eth_subscribe", params).await.or_else(|e| match e {
            LedgerError::Rpc { code: -32601, .. } => Ok(Value::Null),
            other => Err(other),
        })?;
        let id = format!("0x{:x}", self.next_subscription.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::channel(64);
        self.subscriptions.lock().push(tx);
        Ok(Subscription {
            id,
            notifications: rx,
        })
    }

    async fn closed(&self) -> CloseReason {
        let mut rx = self.closed_tx.subscribe();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone().unwrap_or_else(CloseReason::normal),
            Err(_) => CloseReason::new(None, "session dropped"),
        };
        reason
    }

    async fn close(&self) {
        self.finish(CloseReason::normal());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_results_precede_handler() {
        let rpc = StaticRpc::new().with("eth_blockNumber", json!("0x2"));
        rpc.push("eth_blockNumber", Ok(json!("0x1")));

        assert_eq!(rpc.call("eth_blockNumber", json!([])).await.unwrap(), json!("0x1"));
        assert_eq!(rpc.call("eth_blockNumber", json!([])).await.unwrap(), json!("0x2"));
        assert_eq!(rpc.calls("eth_blockNumber"), 2);
    }

    #[tokio::test]
    async fn dropped_session_reports_reason() {
        let node = ScriptedNode::new();
        let session = node.open().await.unwrap();
        node.drop_connection(Some(1006), "abnormal");

        let reason = session.closed().await;
        assert_eq!(reason.code, Some(1006));
        assert!(session.request("net_version", json!([])).await.is_err());
    }
}
