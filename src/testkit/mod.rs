//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`ledger`]: In-memory node: `ScriptedNode` (transport + sessions) and
//!   `StaticRpc` (canned JSON-RPC answers).
//! - [`contracts`]: `MarketFixture` answering Exchange/Rates view calls and
//!   decoders for submitted transactions.
//! - [`ticker`]: `StaticTicker` feeds with settable prices.
//! - [`domain`]: Builders for orders and ticker samples.
//! - [`config`]: Canonical test configurations.

pub mod config;
pub mod contracts;
pub mod domain;
pub mod ledger;
pub mod ticker;
