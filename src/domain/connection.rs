//! Ledger connection state and notifications.

use std::fmt;

use serde::Serialize;

/// Lifecycle state of the node connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Stopping,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Notification broadcast by the connection.
///
/// Every `Connected` marks a fresh session: subscriptions made on an earlier
/// session are gone and must be re-established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    ConnectionLost { reason: String },
    Disconnected,
}

/// Why a transport session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// WebSocket close code, if one was received.
    pub code: Option<u16>,
    pub reason: String,
}

impl CloseReason {
    /// Close code of a normal, requested closure.
    pub const NORMAL: u16 = 1000;

    #[must_use]
    pub fn new(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn normal() -> Self {
        Self::new(Some(Self::NORMAL), "normal closure")
    }

    #[must_use]
    pub fn is_normal(&self) -> bool {
        self.code == Some(Self::NORMAL)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "code {code}: {}", self.reason),
            None => f.write_str(&self.reason),
        }
    }
}
