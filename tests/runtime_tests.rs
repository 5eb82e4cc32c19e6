//! Process lifecycle: startup failure and bounded shutdown.

mod support;

use std::time::Duration;

use augmint_keeper::error::{Error, LedgerError, Result};
use augmint_keeper::infrastructure::orchestration::{run_until, shutdown_within};
use support::keeper::{config, within};

async fn never_signalled() -> Result<&'static str> {
    std::future::pending().await
}

#[tokio::test]
async fn unreachable_node_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.ledger.url = "ws://127.0.0.1:1".to_string();
    config.ledger.connect_timeout_ms = 2_000;
    config.rates.enabled = false;
    let status_path = config.status.path.clone();

    let result = within("startup failure", run_until(config, never_signalled())).await;

    assert!(matches!(result, Err(Error::Ledger(_))));
    // Shutdown still ran and left a final status behind.
    assert!(status_path.exists());
}

#[tokio::test]
async fn missing_signing_key_fails_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.keys.matchmaker = None;

    let result = within("wiring failure", run_until(config, never_signalled())).await;

    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test(start_paused = true)]
async fn slow_shutdown_overruns_exit_timeout() {
    let result = shutdown_within(
        Duration::from_secs(10),
        tokio::time::sleep(Duration::from_secs(60)),
    )
    .await;

    assert!(matches!(
        result,
        Err(Error::ShutdownTimeout { timeout_ms: 10_000 })
    ));
}

#[test]
fn connect_errors_stay_ledger_errors() {
    let error: Error = LedgerError::ConnectTimeout { timeout_ms: 10 }.into();
    assert!(matches!(
        error,
        Error::Ledger(LedgerError::ConnectTimeout { timeout_ms: 10 })
    ));
}
