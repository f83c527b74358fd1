//! Run handles: observe a run and stop it within a bounded grace period.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::pipeline::types::{RunReport, RunState, RunStats, StatsSnapshot};

/// Cancellation tokens shared by a run task and its handle.
///
/// `dispatch` is a child of `force`: forcing also stops dispatch.
#[derive(Clone)]
pub(crate) struct RunControl {
    pub force: CancellationToken,
    pub dispatch: CancellationToken,
}

impl RunControl {
    pub fn new() -> Self {
        let force = CancellationToken::new();
        let dispatch = force.child_token();
        Self { force, dispatch }
    }
}

/// Read-only view of a run, cheap to clone into other tasks.
#[derive(Clone)]
pub struct RunMonitor {
    run_id: Uuid,
    stats: Arc<RunStats>,
    state: watch::Receiver<RunState>,
    report: Arc<Mutex<Option<RunReport>>>,
}

impl RunMonitor {
    pub(crate) fn new(
        run_id: Uuid,
        stats: Arc<RunStats>,
        state: watch::Receiver<RunState>,
        report: Arc<Mutex<Option<RunReport>>>,
    ) -> Self {
        Self {
            run_id,
            stats,
            state,
            report,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Final report, once the run has stopped.
    pub fn report(&self) -> Option<RunReport> {
        self.report
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Resolve once the run reaches `Stopped`.
    pub async fn stopped(&self) {
        let mut state = self.state.clone();
        // An Err means the run task is gone, which only happens after Stopped
        // or on an abnormal exit; either way there is nothing left to wait for.
        let _ = state.wait_for(|s| *s == RunState::Stopped).await;
    }
}

/// Owner's handle to a started run.
pub struct RunHandle {
    monitor: RunMonitor,
    control: RunControl,
    grace: Duration,
    task: JoinHandle<Result<RunReport, PipelineError>>,
}

impl RunHandle {
    pub(crate) fn new(
        monitor: RunMonitor,
        control: RunControl,
        grace: Duration,
        task: JoinHandle<Result<RunReport, PipelineError>>,
    ) -> Self {
        Self {
            monitor,
            control,
            grace,
            task,
        }
    }

    pub fn monitor(&self) -> RunMonitor {
        self.monitor.clone()
    }

    pub fn state(&self) -> RunState {
        self.monitor.state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.monitor.stats()
    }

    /// Resolve once the run reaches `Stopped`, without consuming the handle.
    pub async fn stopped(&self) {
        self.monitor.stopped().await
    }

    /// Stop the run.
    ///
    /// Dispatch stops at once. In-flight pipelines get `grace` to finish,
    /// then the rest are aborted and counted as cancelled. Returns when the
    /// run is `Stopped`. Calling it again is a no-op.
    pub async fn stop(&self) {
        if self.state() == RunState::Stopped {
            return;
        }
        if !self.control.dispatch.is_cancelled() {
            info!(run_id = %self.monitor.run_id, "Stopping ingestion run");
        }
        self.control.dispatch.cancel();

        if tokio::time::timeout(self.grace, self.monitor.stopped())
            .await
            .is_err()
        {
            warn!(
                run_id = %self.monitor.run_id,
                grace_ms = self.grace.as_millis() as u64,
                in_flight = self.in_flight(),
                "Grace period elapsed, aborting in-flight pipelines"
            );
            self.control.force.cancel();
            self.monitor.stopped().await;
        }
    }

    /// Wait for the run to end on its own and return its report.
    ///
    /// Fails only when the first fetch failed before anything was dispatched.
    pub async fn wait(self) -> Result<RunReport, PipelineError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(PipelineError::RunAborted(e.to_string())),
        }
    }

    fn in_flight(&self) -> u64 {
        let stats = self.stats();
        stats.dispatched.saturating_sub(stats.finished())
    }
}
