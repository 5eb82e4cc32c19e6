//! JSON-RPC over WebSocket transport to the ledger node.
//!
//! Each [`WsTransport::open`] call establishes a new WebSocket connection and
//! spawns two tasks: a writer draining an outgoing queue into the socket and
//! a reader routing responses to their waiting requests and subscription
//! notifications to their receivers. When the socket ends, every pending
//! request fails with [`LedgerError::Closed`] and every subscription receiver
//! is closed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, trace, warn};

use super::codec::{parse_incoming, Incoming, RpcRequest};
use crate::domain::CloseReason;
use crate::error::LedgerError;
use crate::port::{RpcSession, RpcTransport, Subscription};

/// Buffered notifications per subscription before new ones are dropped.
const SUBSCRIPTION_BUFFER: usize = 256;

/// A request waiting for its response.
struct Waiter {
    reply: oneshot::Sender<Result<Value, LedgerError>>,
    /// Set for `eth_subscribe`: the reader registers it under the returned id
    /// before routing the next frame.
    subscription: Option<mpsc::Sender<Value>>,
}

type PendingMap = DashMap<u64, Waiter>;

/// Opens WebSocket sessions against a node URL.
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl RpcTransport for WsTransport {
    async fn open(&self) -> Result<Arc<dyn RpcSession>, LedgerError> {
        debug!(url = %self.url, "Opening node WebSocket");
        let (ws, response) = connect_async(&self.url)
            .await
            .map_err(|e| LedgerError::Connect(e.to_string()))?;
        info!(status = %response.status(), "Node WebSocket connected");

        let (mut sink, mut stream) = ws.split();
        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let (closed_tx, closed_rx) = watch::channel(None);

        let shared = Arc::new(SessionShared {
            pending: DashMap::new(),
            subscriptions: DashMap::new(),
            closing: AtomicBool::new(false),
            closed_tx,
        });

        tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                let is_close = matches!(msg, Message::Close(_));
                if let Err(e) = sink.send(msg).await {
                    debug!(error = %e, "Node WebSocket write failed");
                    break;
                }
                if is_close {
                    break;
                }
            }
        });

        let reader_shared = Arc::clone(&shared);
        let pong_tx = outgoing_tx.clone();
        tokio::spawn(async move {
            let reason = loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        trace!(bytes = text.len(), "Received node frame");
                        reader_shared.dispatch(&text);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = pong_tx.send(Message::Pong(data));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => {
                                CloseReason::new(Some(u16::from(frame.code)), frame.reason.to_string())
                            }
                            None => CloseReason::new(None, "closed without frame"),
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break CloseReason::new(None, e.to_string()),
                    None => break CloseReason::new(None, "stream ended"),
                }
            };
            reader_shared.finish(reason);
        });

        Ok(Arc::new(WsSession {
            next_id: AtomicU64::new(1),
            outgoing: outgoing_tx,
            shared,
            closed_rx,
        }))
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

struct SessionShared {
    pending: PendingMap,
    subscriptions: DashMap<String, mpsc::Sender<Value>>,
    closing: AtomicBool,
    closed_tx: watch::Sender<Option<CloseReason>>,
}

impl SessionShared {
    fn dispatch(&self, text: &str) {
        match parse_incoming(text) {
            Ok(Incoming::Response { id, result }) => {
                if let Some((_, waiter)) = self.pending.remove(&id) {
                    if let (Some(sender), Ok(Value::String(subscription))) =
                        (waiter.subscription, &result)
                    {
                        self.subscriptions.insert(subscription.clone(), sender);
                    }
                    let _ = waiter.reply.send(result);
                } else {
                    debug!(id, "Response for unknown request");
                }
            }
            Ok(Incoming::Notification {
                subscription,
                result,
            }) => {
                let receiver_gone = match self.subscriptions.get(&subscription) {
                    Some(sender) => match sender.try_send(result) {
                        Ok(()) => false,
                        Err(TrySendError::Full(_)) => {
                            warn!(subscription = %subscription, "Subscription buffer full, dropping notification");
                            false
                        }
                        Err(TrySendError::Closed(_)) => true,
                    },
                    None => false,
                };
                if receiver_gone {
                    debug!(subscription = %subscription, "Subscription receiver dropped");
                    self.subscriptions.remove(&subscription);
                }
            }
            Ok(Incoming::Other) => {}
            Err(e) => warn!(error = %e, bytes = text.len(), "Failed to parse node frame"),
        }
    }

    fn finish(&self, reason: CloseReason) {
        // A requested close that ends without a frame still counts as normal.
        let reason = if self.closing.load(Ordering::SeqCst) && !reason.is_normal() {
            CloseReason::normal()
        } else {
            reason
        };
        debug!(reason = %reason, "Node session ended");

        // Mark closed before draining so a request registered after the
        // drain sees the mark on its re-check.
        self.closed_tx.send_replace(Some(reason.clone()));
        self.subscriptions.clear();
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, waiter)) = self.pending.remove(&id) {
                let _ = waiter.reply.send(Err(LedgerError::Closed(reason.to_string())));
            }
        }
    }
}

/// Removes a pending request entry when the waiting future is dropped.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

/// One WebSocket session.
pub struct WsSession {
    next_id: AtomicU64,
    outgoing: mpsc::UnboundedSender<Message>,
    shared: Arc<SessionShared>,
    closed_rx: watch::Receiver<Option<CloseReason>>,
}

impl WsSession {
    fn closed_reason(&self) -> Option<CloseReason> {
        self.closed_rx.borrow().clone()
    }

    async fn send_request(
        &self,
        method: &str,
        params: Value,
        subscription: Option<mpsc::Sender<Value>>,
    ) -> Result<Value, LedgerError> {
        if let Some(reason) = self.closed_reason() {
            return Err(LedgerError::Closed(reason.to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let text = serde_json::to_string(&RpcRequest::new(id, method, &params))
            .map_err(|e| LedgerError::Decode(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.shared.pending.insert(
            id,
            Waiter {
                reply: tx,
                subscription,
            },
        );
        let _guard = PendingGuard {
            pending: &self.shared.pending,
            id,
        };
        if let Some(reason) = self.closed_reason() {
            return Err(LedgerError::Closed(reason.to_string()));
        }

        trace!(id, method, "Sending node request");
        self.outgoing
            .send(Message::Text(text))
            .map_err(|_| LedgerError::Closed("writer stopped".to_string()))?;

        rx.await
            .map_err(|_| LedgerError::Closed("response channel dropped".to_string()))?
    }
}

#[async_trait]
impl RpcSession for WsSession {
    async fn request(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        self.send_request(method, params, None).await
    }

    async fn subscribe(&self, params: Value) -> Result<Subscription, LedgerError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let result = self.send_request("eth_subscribe", params, Some(tx)).await?;
        let id = result
            .as_str()
            .ok_or_else(|| LedgerError::Decode(format!("subscription id not a string: {result}")))?
            .to_string();
        debug!(subscription = %id, "Subscribed");

        Ok(Subscription {
            id,
            notifications: rx,
        })
    }

    async fn closed(&self) -> CloseReason {
        let mut rx = self.closed_rx.clone();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone().unwrap_or_else(CloseReason::normal),
            Err(_) => CloseReason::new(None, "session dropped"),
        };
        reason
    }

    async fn close(&self) {
        self.shared.closing.store(true, Ordering::SeqCst);
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        if self.outgoing.send(Message::Close(Some(frame))).is_err() {
            debug!("Close requested on finished session");
        }
    }
}

impl Drop for WsSession {
    fn drop(&mut self) {
        if self.closed_reason().is_none() {
            self.shared.closing.store(true, Ordering::SeqCst);
            let _ = self.outgoing.send(Message::Close(None));
        }
    }
}

/// Params for an `eth_subscribe("logs")` filter on one contract.
#[must_use]
pub fn logs_subscription_params(address: &str, topics: &[String]) -> Value {
    json!(["logs", { "address": address, "topics": [topics] }])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_params_nest_topic_alternatives() {
        let params = logs_subscription_params("0xabc", &["0x01".to_string(), "0x02".to_string()]);
        assert_eq!(
            params,
            json!(["logs", {"address": "0xabc", "topics": [["0x01", "0x02"]]}])
        );
    }

    fn shared(closing: bool) -> (SessionShared, watch::Receiver<Option<CloseReason>>) {
        let (closed_tx, closed_rx) = watch::channel(None);
        let shared = SessionShared {
            pending: DashMap::new(),
            subscriptions: DashMap::new(),
            closing: AtomicBool::new(closing),
            closed_tx,
        };
        (shared, closed_rx)
    }

    fn waiter(
        subscription: Option<mpsc::Sender<Value>>,
    ) -> (Waiter, oneshot::Receiver<Result<Value, LedgerError>>) {
        let (reply, rx) = oneshot::channel();
        (
            Waiter {
                reply,
                subscription,
            },
            rx,
        )
    }

    #[test]
    fn finish_fails_pending_requests() {
        let (shared, closed_rx) = shared(false);
        let (waiter, mut rx) = waiter(None);
        shared.pending.insert(1, waiter);

        shared.finish(CloseReason::new(Some(1006), "abnormal"));

        assert!(matches!(rx.try_recv(), Ok(Err(LedgerError::Closed(_)))));
        assert_eq!(
            closed_rx.borrow().clone(),
            Some(CloseReason::new(Some(1006), "abnormal"))
        );
    }

    #[test]
    fn finish_after_requested_close_is_normal() {
        let (shared, closed_rx) = shared(true);

        shared.finish(CloseReason::new(None, "stream ended"));

        assert!(closed_rx.borrow().as_ref().is_some_and(CloseReason::is_normal));
    }

    #[test]
    fn dispatch_routes_response_to_waiter() {
        let (shared, _closed_rx) = shared(false);
        let (waiter, mut rx) = waiter(None);
        shared.pending.insert(9, waiter);

        shared.dispatch(r#"{"jsonrpc":"2.0","id":9,"result":"0x2a"}"#);

        assert_eq!(rx.try_recv().unwrap().unwrap(), json!("0x2a"));
        assert!(shared.pending.is_empty());
        assert!(shared.subscriptions.is_empty());
    }

    #[test]
    fn notification_right_after_subscribe_response_is_delivered() {
        let (shared, _closed_rx) = shared(false);
        let (tx, mut notifications) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (waiter, mut rx) = waiter(Some(tx));
        shared.pending.insert(3, waiter);

        // Both frames are dispatched before the subscriber task runs again.
        shared.dispatch(r#"{"jsonrpc":"2.0","id":3,"result":"0xabc"}"#);
        shared.dispatch(
            r#"{"jsonrpc":"2.0","method":"eth_subscription","params":{"subscription":"0xabc","result":{"data":"0x01"}}}"#,
        );

        assert_eq!(rx.try_recv().unwrap().unwrap(), json!("0xabc"));
        assert_eq!(notifications.try_recv().unwrap(), json!({"data": "0x01"}));
    }

    #[test]
    fn rejected_subscribe_registers_nothing() {
        let (shared, _closed_rx) = shared(false);
        let (tx, _notifications) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (waiter, mut rx) = waiter(Some(tx));
        shared.pending.insert(4, waiter);

        shared.dispatch(
            r#"{"jsonrpc":"2.0","id":4,"error":{"code":-32601,"message":"not supported"}}"#,
        );

        assert!(matches!(rx.try_recv(), Ok(Err(LedgerError::Rpc { .. }))));
        assert!(shared.subscriptions.is_empty());
    }

    #[test]
    fn dropped_subscription_receiver_is_unregistered() {
        let (shared, _closed_rx) = shared(false);
        let (tx, notifications) = mpsc::channel(SUBSCRIPTION_BUFFER);
        shared.subscriptions.insert("0xabc".to_string(), tx);
        drop(notifications);

        shared.dispatch(
            r#"{"jsonrpc":"2.0","method":"eth_subscription","params":{"subscription":"0xabc","result":{}}}"#,
        );

        assert!(shared.subscriptions.is_empty());
    }

    #[tokio::test]
    async fn request_on_finished_session_fails_without_sending() {
        let (shared, closed_rx) = shared(false);
        let shared = Arc::new(shared);
        let (outgoing, mut written) = mpsc::unbounded_channel();
        let session = WsSession {
            next_id: AtomicU64::new(1),
            outgoing,
            shared: Arc::clone(&shared),
            closed_rx,
        };
        shared.finish(CloseReason::new(Some(1006), "abnormal"));

        let result = session.request("eth_blockNumber", json!([])).await;

        assert!(matches!(result, Err(LedgerError::Closed(_))));
        assert!(written.try_recv().is_err());
        assert!(shared.pending.is_empty());
    }
}
