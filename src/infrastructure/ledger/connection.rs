//! Resilient connection to the ledger node.
//!
//! [`LedgerConnection`] owns the current transport session and keeps it
//! alive: an unexpected close or a failed liveness check moves the
//! connection to `Reconnecting`, emits a single `ConnectionLost`, and starts
//! a retry loop that re-attempts `connect()` at a fixed delay until it
//! succeeds or `stop()` is called. Every successful connect emits
//! `Connected`; subscriptions do not survive a reconnect.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::adapter::outbound::ledger::{eth, logs_subscription_params};
use crate::domain::{CloseReason, ConnectionEvent, ConnectionState};
use crate::error::LedgerError;
use crate::infrastructure::config::ledger::LedgerConfig;
use crate::port::{LedgerRpc, RpcSession, RpcTransport, Subscription};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Node metadata captured when a session is established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub network_id: String,
    pub chain_id: u64,
    pub block_gas_limit: u64,
    /// 90% of `block_gas_limit`, rounded.
    pub safe_block_gas_limit: u64,
    pub accounts: Vec<Address>,
}

/// 90% of a block gas limit, rounded half up.
#[must_use]
pub fn safe_gas_limit(block_gas_limit: u64) -> u64 {
    let scaled = u128::from(block_gas_limit) * 9 + 5;
    u64::try_from(scaled / 10).unwrap_or(u64::MAX)
}

struct Inner {
    transport: Arc<dyn RpcTransport>,
    config: LedgerConfig,
    state: RwLock<ConnectionState>,
    session: RwLock<Option<Arc<dyn RpcSession>>>,
    info: RwLock<Option<ConnectionInfo>>,
    events: broadcast::Sender<ConnectionEvent>,
    reconnecting: AtomicBool,
    stopping: AtomicBool,
    watcher: Mutex<Option<JoinHandle<()>>>,
    liveness: Mutex<Option<JoinHandle<()>>>,
    retry: Mutex<Option<JoinHandle<()>>>,
    reconnect_attempts: AtomicU64,
    session_generation: AtomicU64,
}

/// Cheap-clone handle to the node connection.
#[derive(Clone)]
pub struct LedgerConnection {
    inner: Arc<Inner>,
}

/// Request adapter bound to one session, used while a session is being
/// established and not yet installed.
struct SessionRpc<'a> {
    session: &'a dyn RpcSession,
    timeout: Duration,
}

#[async_trait]
impl LedgerRpc for SessionRpc<'_> {
    async fn call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        timeout(self.timeout, self.session.request(method, params))
            .await
            .map_err(|_| LedgerError::RequestTimeout {
                method: method.to_string(),
            })?
    }
}

impl LedgerConnection {
    #[must_use]
    pub fn new(transport: Arc<dyn RpcTransport>, config: LedgerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                state: RwLock::new(ConnectionState::Disconnected),
                session: RwLock::new(None),
                info: RwLock::new(None),
                events,
                reconnecting: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                watcher: Mutex::new(None),
                liveness: Mutex::new(None),
                retry: Mutex::new(None),
                reconnect_attempts: AtomicU64::new(0),
                session_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribe to connection notifications.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    /// Metadata of the current (or last) session.
    #[must_use]
    pub fn info(&self) -> Option<ConnectionInfo> {
        self.inner.info.read().clone()
    }

    #[must_use]
    pub fn accounts(&self) -> Vec<Address> {
        self.info().map(|i| i.accounts).unwrap_or_default()
    }

    #[must_use]
    pub fn network_id(&self) -> Option<String> {
        self.info().map(|i| i.network_id)
    }

    #[must_use]
    pub fn chain_id(&self) -> Option<u64> {
        self.info().map(|i| i.chain_id)
    }

    #[must_use]
    pub fn safe_block_gas_limit(&self) -> Option<u64> {
        self.info().map(|i| i.safe_block_gas_limit)
    }

    /// Reconnect attempts made since the connection was created.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u64 {
        self.inner.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Sessions established so far, 0 before the first. Bumped before the
    /// matching `Connected` is emitted.
    #[must_use]
    pub fn session_generation(&self) -> u64 {
        self.inner.session_generation.load(Ordering::SeqCst)
    }

    /// Endpoint description for logs.
    #[must_use]
    pub fn endpoint(&self) -> String {
        self.inner.transport.endpoint()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = std::mem::replace(&mut *self.inner.state.write(), state);
        if previous != state {
            debug!(from = %previous, to = %state, "Connection state changed");
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        // No receivers is fine.
        let _ = self.inner.events.send(event);
    }

    fn session(&self) -> Option<Arc<dyn RpcSession>> {
        self.inner.session.read().clone()
    }

    /// Open a session and confirm the node is live.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ConnectTimeout`] if liveness is not confirmed
    /// within the connect timeout, or the transport/RPC error that failed it.
    pub async fn connect(&self) -> Result<(), LedgerError> {
        self.inner.stopping.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Connecting);
        info!(endpoint = %self.endpoint(), "Connecting to node");

        let result = self.establish().await;
        if let Err(e) = &result {
            warn!(error = %e, "Node connect failed");
            self.set_state(ConnectionState::Disconnected);
        }
        result
    }

    async fn establish(&self) -> Result<(), LedgerError> {
        let connect_timeout = self.inner.config.connect_timeout();
        let (session, info) = timeout(connect_timeout, self.open_session())
            .await
            .map_err(|_| LedgerError::ConnectTimeout {
                timeout_ms: self.inner.config.connect_timeout_ms,
            })??;

        if self.inner.stopping.load(Ordering::SeqCst) {
            session.close().await;
            return Err(LedgerError::Closed("stopped while connecting".to_string()));
        }

        info!(
            network_id = %info.network_id,
            chain_id = info.chain_id,
            block_gas_limit = info.block_gas_limit,
            safe_block_gas_limit = info.safe_block_gas_limit,
            accounts = info.accounts.len(),
            "Connected to node"
        );

        *self.inner.info.write() = Some(info);
        *self.inner.session.write() = Some(Arc::clone(&session));
        self.inner.session_generation.fetch_add(1, Ordering::SeqCst);
        self.inner.reconnecting.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Connected);

        let watcher = self.spawn_close_watcher(session);
        if let Some(old) = self.inner.watcher.lock().replace(watcher) {
            old.abort();
        }
        self.ensure_liveness_poll();

        self.emit(ConnectionEvent::Connected);
        Ok(())
    }

    async fn open_session(&self) -> Result<(Arc<dyn RpcSession>, ConnectionInfo), LedgerError> {
        let session = self.inner.transport.open().await?;
        let rpc = SessionRpc {
            session: session.as_ref(),
            timeout: self.inner.config.request_timeout(),
        };

        let fetched = tokio::try_join!(
            eth::network_id(&rpc),
            eth::chain_id(&rpc),
            eth::latest_block(&rpc),
            eth::accounts(&rpc),
        );
        match fetched {
            Ok((network_id, chain_id, (_, block_gas_limit), accounts)) => {
                let info = ConnectionInfo {
                    network_id,
                    chain_id,
                    block_gas_limit,
                    safe_block_gas_limit: safe_gas_limit(block_gas_limit),
                    accounts,
                };
                Ok((session, info))
            }
            Err(e) => {
                session.close().await;
                Err(e)
            }
        }
    }

    fn spawn_close_watcher(&self, session: Arc<dyn RpcSession>) -> JoinHandle<()> {
        let conn = self.clone();
        tokio::spawn(async move {
            let reason = session.closed().await;
            conn.on_session_closed(&session, reason);
        })
    }

    fn on_session_closed(&self, session: &Arc<dyn RpcSession>, reason: CloseReason) {
        {
            let mut slot = self.inner.session.write();
            match slot.as_ref() {
                Some(current) if Arc::ptr_eq(current, session) => {
                    *slot = None;
                }
                // A session we already replaced or dropped.
                _ => return,
            }
        }

        if self.inner.stopping.load(Ordering::SeqCst) {
            return;
        }
        if reason.is_normal() {
            info!(reason = %reason, "Node connection closed");
            self.set_state(ConnectionState::Disconnected);
            self.emit(ConnectionEvent::Disconnected);
            return;
        }
        self.connection_lost(reason.to_string());
    }

    /// Enter `Reconnecting` once per loss and start the retry loop.
    fn connection_lost(&self, reason: String) {
        if self.inner.stopping.load(Ordering::SeqCst) {
            return;
        }
        if self
            .inner
            .reconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(reason = %reason, "Connection loss already being handled");
            return;
        }

        warn!(
            reason = %reason,
            retry_delay_ms = self.inner.config.reconnect_delay_ms,
            "Node connection lost, reconnecting"
        );
        self.set_state(ConnectionState::Reconnecting);

        if let Some(stale) = self.inner.session.write().take() {
            tokio::spawn(async move { stale.close().await });
        }

        self.emit(ConnectionEvent::ConnectionLost { reason });

        let conn = self.clone();
        let handle = tokio::spawn(async move { conn.retry_loop().await });
        if let Some(old) = self.inner.retry.lock().replace(handle) {
            old.abort();
        }
    }

    async fn retry_loop(&self) {
        let delay = self.inner.config.reconnect_delay();
        loop {
            sleep(delay).await;
            if self.inner.stopping.load(Ordering::SeqCst) {
                return;
            }

            let attempt = self.inner.reconnect_attempts.fetch_add(1, Ordering::Relaxed) + 1;
            info!(attempt, "Reconnecting to node");
            match self.establish().await {
                Ok(()) => {
                    info!(attempt, "Reconnected to node");
                    return;
                }
                Err(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        retry_delay_ms = delay.as_millis() as u64,
                        "Reconnect attempt failed"
                    );
                }
            }
        }
    }

    fn ensure_liveness_poll(&self) {
        let Some(interval) = self.inner.config.connection_check_interval() else {
            return;
        };
        let mut slot = self.inner.liveness.lock();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let conn = self.clone();
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if conn.state() != ConnectionState::Connected {
                    continue;
                }
                if !conn.is_connected().await && conn.state() == ConnectionState::Connected {
                    conn.connection_lost("liveness check failed".to_string());
                }
            }
        }));
    }

    /// Probe the node with `net_listening`.
    ///
    /// Returns `false` on timeout, error, or when no session is open.
    pub async fn is_connected(&self) -> bool {
        let Some(session) = self.session() else {
            return false;
        };
        match timeout(
            self.inner.config.is_listening_timeout(),
            session.request("net_listening", json!([])),
        )
        .await
        {
            Ok(Ok(value)) => value.as_bool().unwrap_or(false),
            Ok(Err(e)) => {
                debug!(error = %e, "net_listening failed");
                false
            }
            Err(_) => {
                debug!("net_listening timed out");
                false
            }
        }
    }

    /// Close the connection and suppress further reconnects.
    pub async fn stop(&self) {
        if self.inner.stopping.swap(true, Ordering::SeqCst) && self.state() == ConnectionState::Disconnected {
            return;
        }
        self.set_state(ConnectionState::Stopping);
        info!("Stopping node connection");

        for slot in [&self.inner.liveness, &self.inner.retry, &self.inner.watcher] {
            if let Some(handle) = slot.lock().take() {
                handle.abort();
            }
        }

        let session = self.inner.session.write().take();
        if let Some(session) = session {
            session.close().await;
            if timeout(self.inner.config.close_timeout(), session.closed())
                .await
                .is_err()
            {
                error!(
                    timeout_ms = self.inner.config.close_timeout_ms,
                    "Node did not acknowledge close in time"
                );
            }
        }

        self.inner.reconnecting.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected);
        self.emit(ConnectionEvent::Disconnected);
        info!("Node connection stopped");
    }

    /// Issue a JSON-RPC request on the current session.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotConnected`] without a session and
    /// [`LedgerError::RequestTimeout`] if the node does not answer in time.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let session = self.session().ok_or(LedgerError::NotConnected)?;
        timeout(self.inner.config.request_timeout(), session.request(method, params))
            .await
            .map_err(|_| LedgerError::RequestTimeout {
                method: method.to_string(),
            })?
    }

    /// Subscribe to logs of `address` matching any of `topics` on the current
    /// session.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotConnected`] without a session or the node's
    /// rejection.
    pub async fn subscribe_logs(
        &self,
        address: Address,
        topics: &[String],
    ) -> Result<Subscription, LedgerError> {
        let session = self.session().ok_or(LedgerError::NotConnected)?;
        let params = logs_subscription_params(&format!("{address:#x}"), topics);
        timeout(self.inner.config.request_timeout(), session.subscribe(params))
            .await
            .map_err(|_| LedgerError::RequestTimeout {
                method: "eth_subscribe".to_string(),
            })?
    }

    /// Cancel a subscription. Errors are logged, not returned.
    pub async fn unsubscribe(&self, id: &str) {
        if let Err(e) = self.request("eth_unsubscribe", json!([id])).await {
            debug!(subscription = %id, error = %e, "eth_unsubscribe failed");
        }
    }
}

#[async_trait]
impl LedgerRpc for LedgerConnection {
    async fn call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        self.request(method, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::ledger::ScriptedNode;

    fn config() -> LedgerConfig {
        LedgerConfig {
            url: "ws://scripted".into(),
            connection_check_interval_ms: 0,
            ..LedgerConfig::default()
        }
    }

    #[test]
    fn safe_limit_is_ninety_percent_rounded() {
        assert_eq!(safe_gas_limit(7_000_000), 6_300_000);
        assert_eq!(safe_gas_limit(15), 14);
        assert_eq!(safe_gas_limit(0), 0);
    }

    #[tokio::test]
    async fn connect_loads_metadata_and_emits_connected() {
        let node = ScriptedNode::new();
        let conn = LedgerConnection::new(node.clone(), config());
        let mut events = conn.events();

        conn.connect().await.unwrap();

        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Connected);
        assert_eq!(conn.network_id().as_deref(), Some("999"));
        assert_eq!(conn.safe_block_gas_limit(), Some(6_300_000));
        assert_eq!(conn.accounts().len(), 1);
        assert!(conn.is_connected().await);
    }

    #[tokio::test]
    async fn unreachable_node_fails_connect() {
        let node = ScriptedNode::new();
        node.set_reachable(false);
        let conn = LedgerConnection::new(node.clone(), config());

        assert!(matches!(conn.connect().await, Err(LedgerError::Connect(_))));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_node_times_out_connect() {
        let node = ScriptedNode::new();
        node.set_unresponsive(true);
        let conn = LedgerConnection::new(node.clone(), config());

        assert!(matches!(
            conn.connect().await,
            Err(LedgerError::ConnectTimeout { timeout_ms: 10_000 })
        ));
    }

    #[tokio::test]
    async fn request_without_session_fails_fast() {
        let node = ScriptedNode::new();
        let conn = LedgerConnection::new(node.clone(), config());
        assert!(matches!(
            conn.request("eth_blockNumber", json!([])).await,
            Err(LedgerError::NotConnected)
        ));
        assert!(!conn.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn liveness_check_does_not_hang_on_silent_session() {
        let node = ScriptedNode::new();
        let conn = LedgerConnection::new(node.clone(), config());
        conn.connect().await.unwrap();

        node.set_unresponsive(true);
        assert!(!conn.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn liveness_poll_detects_silent_node_and_reconnects() {
        let node = ScriptedNode::new();
        let conn = LedgerConnection::new(
            node.clone(),
            LedgerConfig {
                connection_check_interval_ms: 1_000,
                ..config()
            },
        );
        let mut events = conn.events();
        conn.connect().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Connected);

        node.set_unresponsive(true);
        assert_eq!(
            events.recv().await.unwrap(),
            ConnectionEvent::ConnectionLost {
                reason: "liveness check failed".to_string()
            }
        );

        // Attempts keep timing out without further notifications.
        sleep(Duration::from_secs(30)).await;
        assert!(conn.reconnect_attempts() >= 2);
        assert_eq!(conn.state(), ConnectionState::Reconnecting);
        assert!(events.try_recv().is_err());

        node.set_unresponsive(false);
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Connected);
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(conn.session_generation(), 2);
        assert!(conn.is_connected().await);
    }

    #[tokio::test]
    async fn normal_close_emits_disconnected_without_retry() {
        let node = ScriptedNode::new();
        let conn = LedgerConnection::new(node.clone(), config());
        let mut events = conn.events();
        conn.connect().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Connected);

        node.drop_connection(Some(CloseReason::NORMAL), "bye");

        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Disconnected);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(node.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_closes_session_and_suppresses_retries() {
        let node = ScriptedNode::new();
        let conn = LedgerConnection::new(node.clone(), config());
        let mut events = conn.events();
        conn.connect().await.unwrap();
        let _ = events.recv().await;

        conn.stop().await;

        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Disconnected);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        sleep(Duration::from_secs(5)).await;
        assert_eq!(node.open_count(), 1);
    }
}
