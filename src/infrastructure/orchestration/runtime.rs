//! Keeper runtime lifecycle.

use std::future::Future;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};

use super::keeper::Keeper;
use crate::error::{Error, Result};
use crate::infrastructure::config::Config;

/// Run until SIGINT, SIGTERM, SIGQUIT or SIGHUP.
///
/// # Errors
///
/// Returns an error if wiring or the first connect fails, or if shutdown
/// overruns the configured exit timeout.
pub async fn run(config: Config) -> Result<()> {
    run_until(config, wait_for_signal()).await
}

/// Run until `stop` resolves.
///
/// # Errors
///
/// See [`run`].
pub async fn run_until<F>(config: Config, stop: F) -> Result<()>
where
    F: Future<Output = Result<&'static str>>,
{
    info!(
        endpoint = %config.ledger.url,
        matching = config.matching.enabled,
        rates = config.rates.enabled,
        "Starting augmint-keeper"
    );

    let keeper = Keeper::from_config(&config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks = keeper.spawn(&shutdown_rx);

    let outcome = match keeper.connect().await {
        Ok(()) => match stop.await {
            Ok(reason) => {
                info!(signal = reason, "Shutdown signal received");
                Ok(())
            }
            Err(e) => Err(e),
        },
        Err(e) => {
            error!(error = %e, "Initial node connection failed");
            Err(e.into())
        }
    };

    let _ = shutdown_tx.send(true);
    shutdown_within(config.exit_timeout(), keeper.shutdown(tasks)).await?;

    info!("augmint-keeper stopped");
    outcome
}

/// Await `shutdown`, failing if it overruns `limit`.
///
/// # Errors
///
/// Returns [`Error::ShutdownTimeout`] on overrun.
pub async fn shutdown_within<F>(limit: Duration, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    if tokio::time::timeout(limit, shutdown).await.is_err() {
        let timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
        error!(timeout_ms, "Shutdown did not finish in time");
        return Err(Error::ShutdownTimeout { timeout_ms });
    }
    Ok(())
}

async fn wait_for_signal() -> Result<&'static str> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut hangup = signal(SignalKind::hangup())?;

    let name = tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = quit.recv() => "SIGQUIT",
        _ = hangup.recv() => "SIGHUP",
    };
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn shutdown_overrun_is_an_error() {
        let result = shutdown_within(
            Duration::from_millis(100),
            tokio::time::sleep(Duration::from_secs(5)),
        )
        .await;
        assert!(matches!(result, Err(Error::ShutdownTimeout { timeout_ms: 100 })));
    }

    #[tokio::test]
    async fn prompt_shutdown_is_ok() {
        assert!(shutdown_within(Duration::from_secs(1), async {}).await.is_ok());
    }
}
