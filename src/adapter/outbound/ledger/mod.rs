//! Ledger node adapter: JSON-RPC over WebSocket.

mod codec;
pub mod eth;
mod websocket;

pub use websocket::{logs_subscription_params, WsSession, WsTransport};
