//! Single-flight execution guard.
//!
//! Wraps a unit of work so that at most one run is in flight. A trigger that
//! arrives while a run is active is remembered (once) and causes exactly one
//! follow-up run when the active one finishes. Further triggers during that
//! window are absorbed.
//!
//! ```text
//! trigger ──> idle?  ── yes ──> busy = true, spawn run
//!               │
//!               no ──> pending_retrigger = true
//!
//! run done ──> pending_retrigger? ── yes ──> clear flag, run again
//!                    │
//!                    no ──> busy = false
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::error::Result;

/// Factory for one run of the guarded work.
pub type Job = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// What a call to [`SingleFlight::trigger`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The guard was idle; a run was started.
    Started,
    /// A run is active; one follow-up run is now scheduled.
    Coalesced,
    /// A run is active and a follow-up was already scheduled.
    Absorbed,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RunResult {
    Completed,
    Failed(String),
    TimedOut,
    Panicked(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub result: RunResult,
}

#[derive(Debug, Default)]
struct GuardState {
    busy: bool,
    pending_retrigger: bool,
}

pub struct SingleFlight {
    name: &'static str,
    timeout: Duration,
    job: Job,
    state: Mutex<GuardState>,
    last_run: RwLock<Option<RunRecord>>,
    run_count: Mutex<u64>,
    idle: Notify,
}

impl SingleFlight {
    #[must_use]
    pub fn new(name: &'static str, timeout: Duration, job: Job) -> Arc<Self> {
        Arc::new(Self {
            name,
            timeout,
            job,
            state: Mutex::new(GuardState::default()),
            last_run: RwLock::new(None),
            run_count: Mutex::new(0),
            idle: Notify::new(),
        })
    }

    /// Request a run.
    pub fn trigger(self: &Arc<Self>) -> Trigger {
        let outcome = {
            let mut state = self.state.lock();
            if !state.busy {
                state.busy = true;
                Trigger::Started
            } else if !state.pending_retrigger {
                state.pending_retrigger = true;
                Trigger::Coalesced
            } else {
                Trigger::Absorbed
            }
        };

        match outcome {
            Trigger::Started => {
                let guard = Arc::clone(self);
                tokio::spawn(async move { guard.drive().await });
            }
            Trigger::Coalesced => debug!(job = self.name, "Run in progress, retrigger scheduled"),
            Trigger::Absorbed => debug!(job = self.name, "Run in progress, retrigger already pending"),
        }
        outcome
    }

    async fn drive(self: Arc<Self>) {
        loop {
            self.run_once().await;

            let rerun = {
                let mut state = self.state.lock();
                if state.pending_retrigger {
                    state.pending_retrigger = false;
                    true
                } else {
                    state.busy = false;
                    false
                }
            };
            if rerun {
                debug!(job = self.name, "Running scheduled retrigger");
                continue;
            }
            self.idle.notify_waiters();
            return;
        }
    }

    async fn run_once(&self) {
        let started_at = Utc::now();
        *self.run_count.lock() += 1;

        // Building the future runs caller code too, so it sits inside the
        // unwind boundary.
        let run = AssertUnwindSafe(async { (self.job)().await }).catch_unwind();
        let result = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(Ok(()))) => RunResult::Completed,
            Ok(Ok(Err(e))) => {
                error!(job = self.name, error = %e, "Run failed");
                RunResult::Failed(e.to_string())
            }
            Ok(Err(panic)) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(job = self.name, panic = %message, "Run panicked");
                RunResult::Panicked(message)
            }
            Err(_) => {
                warn!(
                    job = self.name,
                    timeout_secs = self.timeout.as_secs(),
                    "Run timed out"
                );
                RunResult::TimedOut
            }
        };

        if result == RunResult::Completed {
            info!(
                job = self.name,
                elapsed_ms = (Utc::now() - started_at).num_milliseconds(),
                "Run finished"
            );
        }

        *self.last_run.write() = Some(RunRecord {
            started_at,
            finished_at: Utc::now(),
            result,
        });
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.state.lock().busy
    }

    /// Runs started since creation.
    #[must_use]
    pub fn run_count(&self) -> u64 {
        *self.run_count.lock()
    }

    #[must_use]
    pub fn last_run(&self) -> Option<RunRecord> {
        self.last_run.read().clone()
    }

    /// Wait until no run is active or scheduled.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_busy() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Semaphore;

    use crate::error::LedgerError;

    fn gated_job(runs: Arc<AtomicUsize>, gate: Arc<Semaphore>) -> Job {
        Arc::new(move || {
            let runs = Arc::clone(&runs);
            let gate = Arc::clone(&gate);
            Box::pin(async move {
                runs.fetch_add(1, Ordering::SeqCst);
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn two_triggers_during_run_yield_two_runs() {
        let runs = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));
        let guard = SingleFlight::new("test", Duration::from_secs(5), gated_job(runs.clone(), gate.clone()));

        assert_eq!(guard.trigger(), Trigger::Started);
        assert_eq!(guard.trigger(), Trigger::Coalesced);
        assert_eq!(guard.trigger(), Trigger::Absorbed);

        gate.add_permits(2);
        guard.wait_idle().await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(guard.run_count(), 2);
        assert!(!guard.is_busy());
    }

    #[tokio::test]
    async fn trigger_after_idle_starts_fresh_run() {
        let runs = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(10));
        let guard = SingleFlight::new("test", Duration::from_secs(5), gated_job(runs.clone(), gate));

        guard.trigger();
        guard.wait_idle().await;
        assert_eq!(guard.trigger(), Trigger::Started);
        guard.wait_idle().await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failure_clears_busy_and_runs_retrigger() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let job: Job = Arc::new(move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Err(LedgerError::NotConnected.into())
            })
        });
        let guard = SingleFlight::new("failing", Duration::from_secs(5), job);

        guard.trigger();
        guard.trigger();
        guard.wait_idle().await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(matches!(
            guard.last_run().map(|r| r.result),
            Some(RunResult::Failed(_))
        ));
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let job: Job = Arc::new(|| Box::pin(async { panic!("boom") }));
        let guard = SingleFlight::new("panicking", Duration::from_secs(5), job);

        guard.trigger();
        guard.wait_idle().await;

        assert_eq!(
            guard.last_run().map(|r| r.result),
            Some(RunResult::Panicked("boom".to_string()))
        );
        assert_eq!(guard.trigger(), Trigger::Started);
    }

    #[tokio::test]
    async fn panic_while_building_run_is_contained() {
        let job: Job = Arc::new(|| -> BoxFuture<'static, Result<()>> { panic!("build") });
        let guard = SingleFlight::new("panicking", Duration::from_secs(5), job);

        assert_eq!(guard.trigger(), Trigger::Started);
        guard.wait_idle().await;

        assert_eq!(
            guard.last_run().map(|r| r.result),
            Some(RunResult::Panicked("build".to_string()))
        );
        assert!(!guard.is_busy());
        assert_eq!(guard.trigger(), Trigger::Started);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_releases_guard() {
        let job: Job = Arc::new(|| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
        });
        let guard = SingleFlight::new("slow", Duration::from_secs(1), job);

        guard.trigger();
        guard.wait_idle().await;

        assert_eq!(guard.last_run().map(|r| r.result), Some(RunResult::TimedOut));
    }
}
