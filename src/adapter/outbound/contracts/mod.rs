//! Exchange and Rates contract bindings.
//!
//! Calls are ABI-encoded with `alloy-sol-types` and issued through the
//! [`LedgerRpc`](crate::port::LedgerRpc) port, so the bindings work over any
//! session the connection currently holds.

mod call;
pub mod exchange;
pub mod rates;

pub use call::symbol_bytes;
