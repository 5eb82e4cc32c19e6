//! Node connection and transaction tracking configuration.

use std::time::Duration;

use serde::Deserialize;

/// Node connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// WebSocket JSON-RPC endpoint, e.g. `ws://localhost:8545`.
    #[serde(default)]
    pub url: String,
    /// Time allowed for `connect()` to confirm liveness (milliseconds).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Timeout of the `net_listening` liveness check (milliseconds).
    #[serde(default = "default_is_listening_timeout_ms")]
    pub is_listening_timeout_ms: u64,
    /// Time `stop()` waits for the close acknowledgment (milliseconds).
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
    /// Liveness poll interval (milliseconds). 0 disables the poll.
    #[serde(default = "default_connection_check_interval_ms")]
    pub connection_check_interval_ms: u64,
    /// Fixed delay between reconnect attempts (milliseconds).
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Timeout of a single RPC request (milliseconds).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_is_listening_timeout_ms() -> u64 {
    1_000
}

fn default_close_timeout_ms() -> u64 {
    10_000
}

fn default_connection_check_interval_ms() -> u64 {
    1_000
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            is_listening_timeout_ms: default_is_listening_timeout_ms(),
            close_timeout_ms: default_close_timeout_ms(),
            connection_check_interval_ms: default_connection_check_interval_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl LedgerConfig {
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub fn is_listening_timeout(&self) -> Duration {
        Duration::from_millis(self.is_listening_timeout_ms)
    }

    #[must_use]
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    /// `None` when the liveness poll is disabled.
    #[must_use]
    pub fn connection_check_interval(&self) -> Option<Duration> {
        (self.connection_check_interval_ms > 0)
            .then(|| Duration::from_millis(self.connection_check_interval_ms))
    }

    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Transaction confirmation tracking.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionConfig {
    /// Blocks on top of the receipt block before a transaction is confirmed.
    #[serde(default = "default_success_confirmations")]
    pub success_confirmations: u64,
    /// Overall time allowed for a submission to reach a terminal state.
    #[serde(default = "default_tx_timeout_secs")]
    pub timeout_secs: u64,
    /// Receipt and block number poll interval (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_success_confirmations() -> u64 {
    12
}

fn default_tx_timeout_secs() -> u64 {
    600
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            success_confirmations: default_success_confirmations(),
            timeout_secs: default_tx_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl TransactionConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
