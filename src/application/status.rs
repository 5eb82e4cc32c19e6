//! Status report for external monitoring.
//!
//! [`StatusReporter`] assembles a point-in-time view of the connection and
//! both jobs. [`StatusWriter`] persists it as a JSON file that external tools
//! can poll.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::matching::{MatchingScheduler, MatchingStatus};
use super::rates::{RateScheduler, RatesStatus};
use crate::domain::ConnectionState;
use crate::error::Result;
use crate::infrastructure::ledger::LedgerConnection;

/// Current status file format version.
const STATUS_VERSION: &str = "1";

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub pid: u32,
    pub updated_at: DateTime<Utc>,
    pub connection: ConnectionStatus,
    pub matching: Option<MatchingStatus>,
    pub rates: Option<RatesStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub endpoint: String,
    pub network_id: Option<String>,
    pub chain_id: Option<u64>,
    /// First account reported by the node.
    pub account: Option<Address>,
    pub safe_block_gas_limit: Option<u64>,
    pub reconnect_attempts: u64,
}

/// Builds [`StatusReport`]s from live components.
pub struct StatusReporter {
    started_at: DateTime<Utc>,
    connection: LedgerConnection,
    matching: Option<Arc<MatchingScheduler>>,
    rates: Option<Arc<RateScheduler>>,
}

impl StatusReporter {
    #[must_use]
    pub fn new(
        connection: LedgerConnection,
        matching: Option<Arc<MatchingScheduler>>,
        rates: Option<Arc<RateScheduler>>,
    ) -> Self {
        Self {
            started_at: Utc::now(),
            connection,
            matching,
            rates,
        }
    }

    #[must_use]
    pub fn report(&self) -> StatusReport {
        StatusReport {
            version: STATUS_VERSION.to_string(),
            started_at: self.started_at,
            pid: std::process::id(),
            updated_at: Utc::now(),
            connection: ConnectionStatus {
                state: self.connection.state(),
                endpoint: self.connection.endpoint(),
                network_id: self.connection.network_id(),
                chain_id: self.connection.chain_id(),
                account: self.connection.accounts().first().copied(),
                safe_block_gas_limit: self.connection.safe_block_gas_limit(),
                reconnect_attempts: self.connection.reconnect_attempts(),
            },
            matching: self.matching.as_ref().map(|m| m.status()),
            rates: self.rates.as_ref().map(|r| r.status()),
        }
    }
}

/// Writer for the status file.
pub struct StatusWriter {
    path: PathBuf,
}

impl StatusWriter {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `report` atomically: temp file, then rename.
    ///
    /// # Errors
    ///
    /// Returns serialization or filesystem errors.
    pub fn write(&self, report: &StatusReport) -> Result<()> {
        let json = serde_json::to_string_pretty(report)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)?;

        let cleanup_and_err = |e| {
            let _ = fs::remove_file(&temp_path);
            e
        };

        file.write_all(json.as_bytes()).map_err(cleanup_and_err)?;
        file.sync_all().map_err(cleanup_and_err)?;
        fs::rename(&temp_path, &self.path).map_err(cleanup_and_err)?;

        Ok(())
    }

    /// Rewrite the file every `interval` until `shutdown` flips to `true`,
    /// then once more.
    pub fn spawn(
        self,
        reporter: Arc<StatusReporter>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.write_logged(&reporter.report()),
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            self.write_logged(&reporter.report());
            debug!(path = %self.path.display(), "Status writer stopped");
        })
    }

    fn write_logged(&self, report: &StatusReport) {
        if let Err(e) = self.write(report) {
            warn!(path = %self.path.display(), error = %e, "Failed to write status file");
        }
    }
}

/// Read a status file written by [`StatusWriter`].
///
/// # Errors
///
/// Returns an error if the file is missing or not JSON.
pub fn read_status(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::config;
    use crate::testkit::ledger::ScriptedNode;

    #[tokio::test]
    async fn report_reflects_connection() {
        let node = ScriptedNode::new();
        let connection = LedgerConnection::new(node.clone(), config::ledger());
        let reporter = StatusReporter::new(connection.clone(), None, None);

        let before = reporter.report();
        assert_eq!(before.connection.state, ConnectionState::Disconnected);
        assert!(before.connection.network_id.is_none());

        connection.connect().await.unwrap();
        let after = reporter.report();
        assert_eq!(after.connection.state, ConnectionState::Connected);
        assert_eq!(after.connection.network_id.as_deref(), Some("999"));
        assert!(after.connection.account.is_some());
        assert!(after.matching.is_none());
    }

    #[tokio::test]
    async fn write_is_atomic_and_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("status.json");
        let node = ScriptedNode::new();
        let reporter = StatusReporter::new(LedgerConnection::new(node, config::ledger()), None, None);
        let writer = StatusWriter::new(path.clone());

        writer.write(&reporter.report()).unwrap();

        let value = read_status(&path).unwrap();
        assert_eq!(value["version"], "1");
        assert_eq!(value["connection"]["state"], "disconnected");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn missing_status_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_status(&dir.path().join("absent.json")).is_err());
    }
}
