//! Infrastructure layer.
//!
//! Provides technical concerns that support the application without containing
//! business logic. This layer handles configuration, the node connection
//! lifecycle, and process orchestration.
//!
//! # Submodules
//!
//! - [`config`] - Configuration loading and validation
//! - [`ledger`] - Node connection state machine
//! - [`orchestration`] - Component wiring, signals and shutdown

pub mod config;
pub mod ledger;
pub mod orchestration;
