//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! Ports define the extension points in the hexagonal architecture.
//! They are traits that adapters implement to integrate with external
//! systems (the ledger node, ticker feeds).
//!
//! # Architecture
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │      Application        │
//!                    │                         │
//!     ┌──────────────┤  Domain + Port          ├──────────────┐
//!     │              │                         │              │
//!     │              └─────────────────────────┘              │
//!     ▼                                                       ▼
//! ┌──────────────┐                                     ┌─────────────┐
//! │ Ledger node  │                                     │   Ticker    │
//! │ (WebSocket)  │                                     │   feeds     │
//! └──────────────┘                                     └─────────────┘
//! ```
//!
//! # Available Ports
//!
//! - [`RpcTransport`], [`RpcSession`] - Duplex JSON-RPC sessions with the node
//! - [`LedgerRpc`] - Minimal call capability used by contract bindings
//! - [`TickerFeed`] - Latest price sample from an external market

pub mod outbound;

pub use outbound::ledger::{LedgerRpc, RpcSession, RpcTransport, Subscription};
pub use outbound::ticker::TickerFeed;
