//! Node connection lifecycle.

mod connection;

pub use connection::{safe_gas_limit, ConnectionInfo, LedgerConnection};
